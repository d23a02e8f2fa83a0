//! Artifact generator
//!
//! Per movie identity, once the upstream inputs exist:
//! - `<id>_aligned_mic.png`: aligned micrograph preview
//! - `<id>.shift_plot.png`: per-frame shift deltas
//! - `<id>_aligned_mic_PSD.png`: power spectrum preview
//! - `<id>_aligned_mic_EPAplot.png`: resolution analysis
//! - `<id>_quad.png`: composite of the four above, once all four exist
//!
//! An existing output file is never rendered again, so a second pass over
//! unchanged inputs does no rendering work. The existence check is not
//! exclusive: two racing passes render the same bytes twice, nothing worse.
//!
//! Each decode or render runs on the blocking pool under a deadline; a failure
//! is logged and isolated to that artifact.

use super::charts::{ChartRenderer, RasterCharts};
use super::composite;
use super::decode::{DecodeError, ImageDecoder, MicrographDecoder};
use crate::aggregate::RecordTable;
use crate::analysis::{analyze_panels, epa_path_for_psd, read_epa_file, EpaParseError, ShiftTrace};
use crate::models::{MovieIdentity, ALIGNED_MIC_SUFFIX};
use crate::sources::{label, SourceKind};
use crate::utils::{run_blocking, BlockingError};
use chrono::Utc;
use cryoqc_common::config::{CompositeLayout, QcConfig};
use cryoqc_common::events::{ArtifactKind, EventBus, QcEvent};
use futures::stream::{self, StreamExt};
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Decode failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("EPA curve unreadable: {0}")]
    Epa(#[from] EpaParseError),

    #[error("Image encode failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Blocking(#[from] BlockingError),
}

/// Output locations for one identity
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub micrograph: PathBuf,
    pub shift_plot: PathBuf,
    pub psd: PathBuf,
    pub resolution_plot: PathBuf,
    pub composite: PathBuf,
}

impl ArtifactPaths {
    pub fn new(output_dir: &Path, identity: &MovieIdentity) -> Self {
        let id = identity.as_str();
        Self {
            micrograph: output_dir.join(format!("{}{}.png", id, ALIGNED_MIC_SUFFIX)),
            shift_plot: output_dir.join(format!("{}.shift_plot.png", id)),
            psd: output_dir.join(format!("{}{}_PSD.png", id, ALIGNED_MIC_SUFFIX)),
            resolution_plot: output_dir.join(format!("{}{}_EPAplot.png", id, ALIGNED_MIC_SUFFIX)),
            composite: output_dir.join(format!("{}_quad.png", id)),
        }
    }

    /// Composite inputs in tile order
    pub fn composite_inputs(&self) -> [&Path; 4] {
        [
            &self.micrograph,
            &self.shift_plot,
            &self.psd,
            &self.resolution_plot,
        ]
    }
}

/// Upstream inputs known for one identity
#[derive(Debug, Clone)]
pub struct ArtifactJob {
    pub identity: MovieIdentity,
    pub micrograph: Option<PathBuf>,
    pub shift_trace: Option<ShiftTrace>,
    pub psd: Option<PathBuf>,
}

impl ArtifactJob {
    pub fn new(identity: MovieIdentity) -> Self {
        Self {
            identity,
            micrograph: None,
            shift_trace: None,
            psd: None,
        }
    }

    /// Jobs for every identity in the table; relative paths resolve against `project`
    pub fn from_table(table: &RecordTable, project: &Path) -> Vec<ArtifactJob> {
        let resolve = |kind: SourceKind, id: &MovieIdentity, key: &str| {
            table
                .raw_row(kind, id)
                .and_then(|raw| raw.get(key))
                .map(|v| v.to_string())
                .filter(|s| !s.trim().is_empty())
                .map(|s| resolve_path(project, s.trim()))
        };

        table
            .identities()
            .map(|id| ArtifactJob {
                identity: id.clone(),
                micrograph: resolve(SourceKind::Micrographs, id, label::FILENAME),
                shift_trace: table.shift_trace(id),
                psd: resolve(SourceKind::Ctfs, id, label::PSD_FILE),
            })
            .collect()
    }
}

fn resolve_path(project: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        project.join(path)
    }
}

/// Counts of one generation pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenerationSummary {
    pub rendered: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl GenerationSummary {
    fn record(&mut self, outcome: RenderOutcome) {
        match outcome {
            RenderOutcome::Rendered => self.rendered += 1,
            RenderOutcome::Exists => self.skipped += 1,
            RenderOutcome::Failed => self.failed += 1,
            RenderOutcome::NotReady => {}
        }
    }

    fn absorb(&mut self, other: GenerationSummary) {
        self.rendered += other.rendered;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenderOutcome {
    Rendered,
    Exists,
    NotReady,
    Failed,
}

pub struct ArtifactGenerator {
    output_dir: PathBuf,
    layout: CompositeLayout,
    timeout: Duration,
    concurrency: usize,
    decoder: Arc<dyn ImageDecoder>,
    charts: Arc<dyn ChartRenderer>,
    renders: Arc<AtomicUsize>,
    event_bus: Option<EventBus>,
}

impl ArtifactGenerator {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            layout: CompositeLayout::Row,
            timeout: Duration::from_secs(30),
            concurrency: 4,
            decoder: Arc::new(MicrographDecoder),
            charts: Arc::new(RasterCharts),
            renders: Arc::new(AtomicUsize::new(0)),
            event_bus: None,
        }
    }

    pub fn from_config(config: &QcConfig) -> Self {
        Self::new(config.qc.artifact_dir())
            .with_layout(config.qc.composite_layout)
            .with_timeout(config.qc.collaborator_timeout())
    }

    pub fn with_layout(mut self, layout: CompositeLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Number of identities processed at once
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_decoder(mut self, decoder: Arc<dyn ImageDecoder>) -> Self {
        self.decoder = decoder;
        self
    }

    pub fn with_charts(mut self, charts: Arc<dyn ChartRenderer>) -> Self {
        self.charts = charts;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Total renders started by this generator
    pub fn render_count(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }

    pub fn paths(&self, identity: &MovieIdentity) -> ArtifactPaths {
        ArtifactPaths::new(&self.output_dir, identity)
    }

    /// Generate artifacts for many identities concurrently
    pub async fn generate_all(&self, jobs: Vec<ArtifactJob>) -> GenerationSummary {
        if let Err(e) = tokio::fs::create_dir_all(&self.output_dir).await {
            warn!(dir = %self.output_dir.display(), error = %e, "Cannot create artifact directory");
            return GenerationSummary {
                failed: jobs.len(),
                ..Default::default()
            };
        }

        let results: Vec<GenerationSummary> = stream::iter(jobs)
            .map(|job| async move { self.generate(&job).await })
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        let mut total = GenerationSummary::default();
        for summary in results {
            total.absorb(summary);
        }
        total
    }

    /// Generate whatever is missing for one identity
    pub async fn generate(&self, job: &ArtifactJob) -> GenerationSummary {
        let paths = self.paths(&job.identity);
        let id = &job.identity;
        let mut summary = GenerationSummary::default();

        let outcome = match &job.micrograph {
            Some(source) => {
                let work = decode_to_png(self.decoder.clone(), source.clone());
                self.render(id, ArtifactKind::MicrographPreview, &paths.micrograph, work)
                    .await
            }
            None => RenderOutcome::NotReady,
        };
        summary.record(outcome);

        let outcome = match &job.shift_trace {
            Some(trace) => {
                let (charts, trace) = (self.charts.clone(), trace.clone());
                let work = move |target: &Path| {
                    save_png(&DynamicImage::ImageRgb8(charts.shift_plot(&trace)), target)
                };
                self.render(id, ArtifactKind::ShiftPlot, &paths.shift_plot, work)
                    .await
            }
            None => RenderOutcome::NotReady,
        };
        summary.record(outcome);

        if let Some(psd) = &job.psd {
            let work = decode_to_png(self.decoder.clone(), psd.clone());
            let outcome = self
                .render(id, ArtifactKind::PowerSpectrum, &paths.psd, work)
                .await;
            summary.record(outcome);

            let (charts, epa) = (self.charts.clone(), epa_path_for_psd(psd));
            let work = move |target: &Path| {
                let panels = analyze_panels(&read_epa_file(&epa)?);
                save_png(&DynamicImage::ImageRgb8(charts.resolution_plot(&panels)), target)
            };
            let outcome = self
                .render(id, ArtifactKind::ResolutionPlot, &paths.resolution_plot, work)
                .await;
            summary.record(outcome);
        }

        let inputs: Vec<PathBuf> = paths
            .composite_inputs()
            .iter()
            .map(|p| p.to_path_buf())
            .collect();
        let outcome = if inputs.iter().all(|p| p.is_file()) {
            let layout = self.layout;
            let work = move |target: &Path| {
                let images = inputs
                    .iter()
                    .map(image::open)
                    .collect::<Result<Vec<_>, _>>()?;
                save_png(&DynamicImage::ImageRgb8(composite::compose(&images, layout)), target)
            };
            self.render(id, ArtifactKind::Composite, &paths.composite, work)
                .await
        } else {
            RenderOutcome::NotReady
        };
        summary.record(outcome);

        summary
    }

    async fn render<F>(
        &self,
        identity: &MovieIdentity,
        kind: ArtifactKind,
        target: &Path,
        work: F,
    ) -> RenderOutcome
    where
        F: FnOnce(&Path) -> Result<(), ArtifactError> + Send + 'static,
    {
        if target.exists() {
            return RenderOutcome::Exists;
        }

        self.renders.fetch_add(1, Ordering::SeqCst);
        let owned_target = target.to_path_buf();
        let label = format!("{:?} for {}", kind, identity);

        let result = run_blocking(&label, self.timeout, move || work(&owned_target))
            .await
            .map_err(ArtifactError::from)
            .and_then(|r| r);

        match result {
            Ok(()) => {
                debug!(identity = %identity, kind = ?kind, path = %target.display(), "Artifact rendered");
                if let Some(bus) = &self.event_bus {
                    bus.emit_lossy(QcEvent::ArtifactWritten {
                        identity: identity.to_string(),
                        kind,
                        path: target.to_path_buf(),
                        timestamp: Utc::now(),
                    });
                }
                RenderOutcome::Rendered
            }
            Err(e) => {
                warn!(identity = %identity, kind = ?kind, error = %e, "Artifact generation failed");
                RenderOutcome::Failed
            }
        }
    }
}

fn decode_to_png(
    decoder: Arc<dyn ImageDecoder>,
    source: PathBuf,
) -> impl FnOnce(&Path) -> Result<(), ArtifactError> + Send + 'static {
    move |target| {
        let img = decoder.decode(&source)?;
        save_png(&DynamicImage::ImageLuma8(img), target)
    }
}

/// Encode as PNG into a temp file beside `target`, then rename into place
fn save_png(img: &DynamicImage, target: &Path) -> Result<(), ArtifactError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    img.write_to(tmp.as_file_mut(), ImageFormat::Png)?;
    tmp.persist(target).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_file_names() {
        let paths = ArtifactPaths::new(Path::new("/qc/extra"), &MovieIdentity::new("m_01"));
        assert_eq!(paths.micrograph, PathBuf::from("/qc/extra/m_01_aligned_mic.png"));
        assert_eq!(paths.shift_plot, PathBuf::from("/qc/extra/m_01.shift_plot.png"));
        assert_eq!(paths.psd, PathBuf::from("/qc/extra/m_01_aligned_mic_PSD.png"));
        assert_eq!(
            paths.resolution_plot,
            PathBuf::from("/qc/extra/m_01_aligned_mic_EPAplot.png")
        );
        assert_eq!(paths.composite, PathBuf::from("/qc/extra/m_01_quad.png"));
    }

    #[test]
    fn test_relative_inputs_resolve_against_project() {
        assert_eq!(
            resolve_path(Path::new("/proj"), "Runs/2/extra/m_aligned_mic.mrc"),
            PathBuf::from("/proj/Runs/2/extra/m_aligned_mic.mrc")
        );
        assert_eq!(
            resolve_path(Path::new("/proj"), "/abs/m.mrc"),
            PathBuf::from("/abs/m.mrc")
        );
    }
}
