//! EPA curve files
//!
//! CTF estimation writes `<psd stem>_EPA.txt` next to each power spectrum:
//! one header line, then whitespace-delimited rows of
//! `resolution ctfSim epaLnF epaLnFBg ccc`, ordered by increasing spatial
//! frequency. Rows are kept in file order.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Suffix replacing the PSD file extension
pub const EPA_SUFFIX: &str = "_EPA.txt";

#[derive(Debug, Error)]
pub enum EpaParseError {
    #[error("Read {0} failed: {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("Line {line}: expected 5 fields, found {found}")]
    FieldCount { line: usize, found: usize },

    #[error("Line {line}: invalid number '{value}'")]
    InvalidNumber { line: usize, value: String },

    #[error("Line {line}: resolution must be positive, got {value}")]
    NonPositiveResolution { line: usize, value: f64 },
}

/// One sample of an EPA curve
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EpaSample {
    /// Resolution in Å
    pub resolution: f64,
    /// Simulated CTF, already on a 0..1 scale
    pub ctf_sim: f64,
    pub epa_ln_f: f64,
    /// Background-corrected amplitude
    pub epa_ln_f_bg: f64,
    /// Cross-correlation coefficient
    pub ccc: f64,
}

impl EpaSample {
    /// Spatial frequency (1/Å), the plotting axis
    pub fn frequency(&self) -> f64 {
        1.0 / self.resolution
    }
}

/// Path of the EPA file belonging to a PSD file
pub fn epa_path_for_psd(psd: &Path) -> PathBuf {
    let stem = psd
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    psd.with_file_name(format!("{}{}", stem, EPA_SUFFIX))
}

/// Parse EPA curve text; the first line is a header and is ignored
pub fn parse_epa(text: &str) -> Result<Vec<EpaSample>, EpaParseError> {
    let mut samples = Vec::new();

    for (idx, line) in text.lines().enumerate().skip(1) {
        let line_no = idx + 1;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != 5 {
            return Err(EpaParseError::FieldCount {
                line: line_no,
                found: fields.len(),
            });
        }

        let mut values = [0.0f64; 5];
        for (slot, field) in values.iter_mut().zip(&fields) {
            *slot = field.parse().map_err(|_| EpaParseError::InvalidNumber {
                line: line_no,
                value: field.to_string(),
            })?;
        }

        let [resolution, ctf_sim, epa_ln_f, epa_ln_f_bg, ccc] = values;
        if resolution <= 0.0 {
            return Err(EpaParseError::NonPositiveResolution {
                line: line_no,
                value: resolution,
            });
        }

        samples.push(EpaSample {
            resolution,
            ctf_sim,
            epa_ln_f,
            epa_ln_f_bg,
            ccc,
        });
    }

    Ok(samples)
}

/// Read and parse an EPA file
pub fn read_epa_file(path: &Path) -> Result<Vec<EpaSample>, EpaParseError> {
    let text =
        std::fs::read_to_string(path).map_err(|e| EpaParseError::Io(path.to_path_buf(), e))?;
    parse_epa(&text)
}
