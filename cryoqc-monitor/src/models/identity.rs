//! Movie identity derivation
//!
//! Every source names the same physical movie differently: the import store holds
//! the raw movie path, the alignment store holds `<movie>_aligned_mic.<ext>`, and a
//! CTF result references that aligned micrograph. Stripping the source-specific
//! suffix from the base file name yields one key for all of them.

use std::fmt;
use std::path::Path;

/// Suffix the alignment stage appends to a movie's base name
pub const ALIGNED_MIC_SUFFIX: &str = "_aligned_mic";

/// Normalized key joining records about the same physical movie
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MovieIdentity(String);

impl MovieIdentity {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Identity of a raw movie file: base name without its extension
    ///
    /// Returns `None` for paths without a usable file name.
    pub fn from_movie_path(path: &str) -> Option<Self> {
        let stem = Path::new(path.trim()).file_stem()?.to_str()?;
        (!stem.is_empty()).then(|| Self(stem.to_string()))
    }

    /// Identity of an aligned micrograph (also used for CTF results)
    ///
    /// `movie_0001_aligned_mic.mrc` → `movie_0001`. Names without the aligned
    /// suffix fall back to the raw-movie rule.
    pub fn from_micrograph_path(path: &str) -> Option<Self> {
        let name = Path::new(path.trim()).file_name()?.to_str()?;
        if let Some(idx) = name.rfind(ALIGNED_MIC_SUFFIX) {
            let rest = &name[idx + ALIGNED_MIC_SUFFIX.len()..];
            if rest.is_empty() || rest.starts_with('.') {
                let base = &name[..idx];
                return (!base.is_empty()).then(|| Self(base.to_string()));
            }
        }
        Self::from_movie_path(path)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MovieIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
