//! Per-stage metadata sources
//!
//! Each pipeline stage leaves a structured store behind: the import stage a
//! `movies.sqlite`, alignment a `micrographs.sqlite` (plus a `movies.sqlite` carrying
//! the alignment shifts) and CTF estimation a `ctfs.sqlite`. [`SourceKind`] selects
//! how rows of each store are keyed and which fields they contribute to the
//! consolidated record.

pub mod labels;
pub mod locator;
pub mod reader;

pub use labels::normalize_label;
pub use locator::{locate_stores, locate_stores_of_kind, StoreHandle};
pub use reader::SourceReader;

use crate::models::{FieldValue, MovieIdentity, RawRow, RecordField};
use std::collections::BTreeMap;

/// Normalized labels referenced outside the field projections
pub mod label {
    pub const FILENAME: &str = "Filename";
    pub const MIC_FILENAME: &str = "Mic Obj Filename";
    pub const PSD_FILE: &str = "Psd File";
    pub const DOSE_INITIAL: &str = "Acquisition Dose Initial";
    pub const DOSE_PER_FRAME: &str = "Acquisition Dose Per Frame";
    pub const FRAMES: &str = "Frames";
    pub const X_SHIFTS: &str = "Alignment Xshifts";
    pub const Y_SHIFTS: &str = "Alignment Yshifts";
    /// Unmapped native column of the data table
    pub const CREATION: &str = "creation";
}

/// Kind of metadata store
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SourceKind {
    Movies,
    Micrographs,
    Ctfs,
}

impl SourceKind {
    pub const ALL: [SourceKind; 3] = [SourceKind::Movies, SourceKind::Micrographs, SourceKind::Ctfs];

    /// File name the pipeline gives this kind of store
    pub fn store_file_name(self) -> &'static str {
        match self {
            SourceKind::Movies => "movies.sqlite",
            SourceKind::Micrographs => "micrographs.sqlite",
            SourceKind::Ctfs => "ctfs.sqlite",
        }
    }

    pub fn from_store_file_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.store_file_name() == name)
    }

    /// Label holding the path the identity is derived from
    pub fn identity_label(self) -> &'static str {
        match self {
            SourceKind::Movies | SourceKind::Micrographs => label::FILENAME,
            SourceKind::Ctfs => label::MIC_FILENAME,
        }
    }

    /// Derive the movie identity from the identity label's value
    pub fn derive_identity(self, value: &str) -> Option<MovieIdentity> {
        match self {
            SourceKind::Movies => MovieIdentity::from_movie_path(value),
            SourceKind::Micrographs | SourceKind::Ctfs => {
                MovieIdentity::from_micrograph_path(value)
            }
        }
    }

    /// Fields of interest: normalized source label → record field
    pub fn field_map(self) -> &'static [(&'static str, RecordField)] {
        match self {
            SourceKind::Movies => &[
                (label::FILENAME, RecordField::Movie),
                (label::CREATION, RecordField::Date),
                ("Acquisition Magnification", RecordField::Magnification),
                ("Acquisition Voltage", RecordField::Voltage),
                ("Sampling Rate", RecordField::PixelSize),
            ],
            SourceKind::Micrographs => &[(label::FILENAME, RecordField::Micrograph)],
            SourceKind::Ctfs => &[
                ("Defocus U", RecordField::Df1),
                ("Defocus V", RecordField::Df2),
                ("Defocus Angle", RecordField::Angast),
                ("Ctffind4 Cross Correlation", RecordField::Ccc),
            ],
        }
    }

    /// Project the fields of interest out of a raw row
    pub fn project_fields(self, raw: &RawRow) -> BTreeMap<RecordField, FieldValue> {
        self.field_map()
            .iter()
            .filter_map(|(source, target)| raw.get(*source).map(|v| (*target, v.clone())))
            .collect()
    }
}

/// One row produced by a [`SourceReader`]
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRow {
    pub kind: SourceKind,
    pub identity: MovieIdentity,
    pub fields: BTreeMap<RecordField, FieldValue>,
    pub raw: RawRow,
}
