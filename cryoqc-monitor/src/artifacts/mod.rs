//! Per-movie diagnostic images

pub mod charts;
pub mod composite;
pub mod decode;
pub mod generator;
pub mod text;

pub use charts::{ChartRenderer, RasterCharts};
pub use decode::{decode_mrc, DecodeError, ImageDecoder, MicrographDecoder};
pub use generator::{ArtifactError, ArtifactGenerator, ArtifactJob, ArtifactPaths, GenerationSummary};
