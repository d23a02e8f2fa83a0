//! Data models for the QC monitor
//!
//! - [`MovieIdentity`]: join key shared by every metadata source
//! - [`MovieRecord`]: sparse per-movie row of the consolidated table

pub mod identity;
pub mod record;

pub use identity::{MovieIdentity, ALIGNED_MIC_SUFFIX};
pub use record::{FieldValue, MovieRecord, RecordField, RawRow};
