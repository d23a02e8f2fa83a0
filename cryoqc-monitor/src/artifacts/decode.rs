//! Micrograph and power-spectrum decoding
//!
//! Pipeline images are usually MRC files. Only the first section is previewed;
//! its values are min-max scaled to 8-bit grayscale. Any other format is handed
//! to the `image` crate.
//!
//! MRC layout used here:
//! - 1024-byte main header; `nx`, `ny`, `nz`, `mode` are the first four i32
//! - extended header length `nsymbt` (i32) at byte 92
//! - machine stamp at byte 212 (`0x44 0x44` little endian, `0x11 0x11` big endian)
//! - data follows at `1024 + nsymbt`

use image::GrayImage;
use std::path::Path;
use thiserror::Error;

const MRC_HEADER_LEN: usize = 1024;
const MRC_NSYMBT_OFFSET: usize = 92;
const MRC_STAMP_OFFSET: usize = 212;

/// Extensions decoded as MRC
pub const MRC_EXTENSIONS: [&str; 3] = ["mrc", "mrcs", "psd"];

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MRC header: {0}")]
    Header(String),

    #[error("Unsupported MRC mode {0}")]
    UnsupportedMode(i32),

    #[error("MRC data truncated: need {needed} bytes, have {available}")]
    Truncated { needed: usize, available: usize },

    #[error("Image decode failed: {0}")]
    Image(#[from] image::ImageError),
}

/// Decodes an image file into an 8-bit grayscale raster
pub trait ImageDecoder: Send + Sync {
    fn decode(&self, path: &Path) -> Result<GrayImage, DecodeError>;
}

/// MRC first, `image` crate for everything else
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrographDecoder;

impl ImageDecoder for MicrographDecoder {
    fn decode(&self, path: &Path) -> Result<GrayImage, DecodeError> {
        let is_mrc = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| MRC_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);

        if is_mrc {
            let bytes = std::fs::read(path)?;
            decode_mrc(&bytes)
        } else {
            Ok(image::open(path)?.into_luma8())
        }
    }
}

/// Decode the first section of an in-memory MRC file
pub fn decode_mrc(bytes: &[u8]) -> Result<GrayImage, DecodeError> {
    if bytes.len() < MRC_HEADER_LEN {
        return Err(DecodeError::Header(format!(
            "file is {} bytes, header needs {}",
            bytes.len(),
            MRC_HEADER_LEN
        )));
    }

    let big_endian = bytes[MRC_STAMP_OFFSET] == 0x11 && bytes[MRC_STAMP_OFFSET + 1] == 0x11;
    let read_i32 = |offset: usize| -> i32 {
        let raw = [
            bytes[offset],
            bytes[offset + 1],
            bytes[offset + 2],
            bytes[offset + 3],
        ];
        if big_endian {
            i32::from_be_bytes(raw)
        } else {
            i32::from_le_bytes(raw)
        }
    };

    let nx = read_i32(0);
    let ny = read_i32(4);
    let mode = read_i32(12);
    let nsymbt = read_i32(MRC_NSYMBT_OFFSET);

    if nx <= 0 || ny <= 0 {
        return Err(DecodeError::Header(format!("invalid dimensions {}x{}", nx, ny)));
    }
    if nsymbt < 0 {
        return Err(DecodeError::Header(format!("negative extended header {}", nsymbt)));
    }

    let width = nx as usize;
    let height = ny as usize;
    let bytes_per_value = match mode {
        0 => 1,
        1 | 6 => 2,
        2 => 4,
        other => return Err(DecodeError::UnsupportedMode(other)),
    };

    let start = MRC_HEADER_LEN + nsymbt as usize;
    let needed = width
        .checked_mul(height)
        .and_then(|pixels| pixels.checked_mul(bytes_per_value))
        .and_then(|len| len.checked_add(start))
        .ok_or_else(|| {
            DecodeError::Header(format!(
                "section size overflows for {}x{} mode {}",
                nx, ny, mode
            ))
        })?;
    if bytes.len() < needed {
        return Err(DecodeError::Truncated {
            needed,
            available: bytes.len(),
        });
    }
    let data = &bytes[start..needed];

    let values: Vec<f32> = match mode {
        0 => data.iter().map(|b| *b as i8 as f32).collect(),
        1 => data
            .chunks_exact(2)
            .map(|c| {
                let raw = [c[0], c[1]];
                if big_endian {
                    i16::from_be_bytes(raw) as f32
                } else {
                    i16::from_le_bytes(raw) as f32
                }
            })
            .collect(),
        6 => data
            .chunks_exact(2)
            .map(|c| {
                let raw = [c[0], c[1]];
                if big_endian {
                    u16::from_be_bytes(raw) as f32
                } else {
                    u16::from_le_bytes(raw) as f32
                }
            })
            .collect(),
        _ => data
            .chunks_exact(4)
            .map(|c| {
                let raw = [c[0], c[1], c[2], c[3]];
                if big_endian {
                    f32::from_be_bytes(raw)
                } else {
                    f32::from_le_bytes(raw)
                }
            })
            .collect(),
    };

    let scaled = scale_to_u8(&values);
    GrayImage::from_raw(nx as u32, ny as u32, scaled)
        .ok_or_else(|| DecodeError::Header("pixel buffer does not match dimensions".to_string()))
}

/// Min-max scale to 0..=255; non-finite values map to 0
fn scale_to_u8(values: &[f32]) -> Vec<u8> {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    let span = max - min;

    values
        .iter()
        .map(|v| {
            if !v.is_finite() || !span.is_finite() || span <= 0.0 {
                0
            } else {
                (((v - min) / span) * 255.0).round().clamp(0.0, 255.0) as u8
            }
        })
        .collect()
}
