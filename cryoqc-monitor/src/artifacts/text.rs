//! Chart captions
//!
//! Glyphs are rasterized with `fontdue` from an embedded DejaVu Sans Mono and
//! alpha-blended onto the chart. If the font cannot be parsed, captions are
//! skipped and the charts are still drawn.

use fontdue::{Font, FontSettings};
use image::{Rgb, RgbImage};
use std::sync::OnceLock;

const EMBEDDED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSansMono.ttf");

/// Caption height in pixels
pub const CAPTION_PX: f32 = 14.0;

fn font() -> Option<&'static Font> {
    static FONT: OnceLock<Option<Font>> = OnceLock::new();
    FONT.get_or_init(|| match Font::from_bytes(EMBEDDED_FONT, FontSettings::default()) {
        Ok(font) => Some(font),
        Err(e) => {
            tracing::warn!(error = e, "Chart font unavailable, captions disabled");
            None
        }
    })
    .as_ref()
}

/// Draw `text` with its baseline at `baseline`, starting at `x`
///
/// Returns the advance in pixels; 0 when no font is available.
pub fn draw_text(img: &mut RgbImage, x: i64, baseline: i64, text: &str, color: Rgb<u8>) -> i64 {
    let Some(font) = font() else {
        return 0;
    };

    let mut pen = x as f32;
    for ch in text.chars() {
        let (metrics, coverage) = font.rasterize(ch, CAPTION_PX);
        let left = pen.round() as i64 + metrics.xmin as i64;
        let top = baseline - metrics.height as i64 - metrics.ymin as i64;

        for (row, line) in coverage.chunks(metrics.width.max(1)).enumerate() {
            for (col, alpha) in line.iter().enumerate() {
                if *alpha > 0 {
                    blend(img, left + col as i64, top + row as i64, color, *alpha);
                }
            }
        }
        pen += metrics.advance_width;
    }

    (pen - x as f32).round() as i64
}

fn blend(img: &mut RgbImage, x: i64, y: i64, color: Rgb<u8>, alpha: u8) {
    if x < 0 || y < 0 || x as u32 >= img.width() || y as u32 >= img.height() {
        return;
    }
    let pixel = img.get_pixel_mut(x as u32, y as u32);
    let a = alpha as u32;
    for (dst, src) in pixel.0.iter_mut().zip(color.0) {
        *dst = ((src as u32 * a + *dst as u32 * (255 - a)) / 255) as u8;
    }
}
