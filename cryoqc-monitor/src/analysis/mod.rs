//! Numeric analysis of pipeline outputs: EPA curves, shift traces and
//! resolution limits

pub mod epa;
pub mod resolution;
pub mod shifts;

pub use epa::{epa_path_for_psd, parse_epa, read_epa_file, EpaParseError, EpaSample};
pub use resolution::{
    analyze, analyze_panels, normalize_unit, BandPoints, ConfidenceBand, CurvePoint, Panel,
    ResolutionAnalysis, ResolutionLimits, ResolutionRange, PANELS,
};
pub use shifts::ShiftTrace;
