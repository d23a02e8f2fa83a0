//! External per-movie pipeline
//!
//! The numerical work (import, motion alignment, CTF estimation) happens in
//! external programs. [`ExternalPipeline`] runs the configured stage commands in
//! order for one movie and stops at the first failing stage. Stage outputs are
//! not returned here: they land in metadata stores below the project directory,
//! where the source locator finds them.
//!
//! # Argument placeholders
//!
//! `{movie}`, `{movie_dir}`, `{movie_name}`, `{project}`, `{voltage}`,
//! `{sampling_rate}`

use async_trait::async_trait;
use cryoqc_common::config::{AcquisitionConfig, QcConfig, StageCommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("No pipeline stages configured")]
    NoStages,

    #[error("Stage '{stage}' failed to start: {source}")]
    Spawn {
        stage: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Stage '{stage}' exited with {status}: {stderr}")]
    StageFailed {
        stage: String,
        status: String,
        stderr: String,
    },

    #[error("Stage '{stage}' timed out after {timeout:?}")]
    TimedOut { stage: String, timeout: Duration },
}

impl PipelineError {
    /// Stage the error belongs to, if any
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::NoStages => None,
            PipelineError::Spawn { stage, .. }
            | PipelineError::StageFailed { stage, .. }
            | PipelineError::TimedOut { stage, .. } => Some(stage),
        }
    }
}

/// Successful pipeline invocation
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOutcome {
    pub movie: PathBuf,
    pub stages_run: usize,
    pub elapsed: Duration,
}

/// Last known state of a movie's pipeline invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    Unknown,
    Running { stage: String },
    Succeeded,
    Failed { stage: String, reason: String },
}

/// Runs the processing pipeline for one movie
#[async_trait]
pub trait PipelineRunner: Send + Sync {
    async fn run(&self, movie: &Path) -> Result<PipelineOutcome, PipelineError>;

    fn status(&self, movie: &Path) -> RunStatus;
}

/// Values substituted into stage arguments
#[derive(Debug, Clone)]
pub struct StageContext<'a> {
    pub movie: &'a Path,
    pub project: &'a Path,
    pub acquisition: &'a AcquisitionConfig,
}

/// Replace placeholders in every argument
pub fn expand_args(args: &[String], ctx: &StageContext<'_>) -> Vec<String> {
    let movie_dir = ctx
        .movie
        .parent()
        .map(|p| p.display().to_string())
        .unwrap_or_default();
    let movie_name = ctx
        .movie
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let substitutions = [
        ("{movie_dir}", movie_dir),
        ("{movie_name}", movie_name),
        ("{movie}", ctx.movie.display().to_string()),
        ("{project}", ctx.project.display().to_string()),
        ("{voltage}", ctx.acquisition.voltage.to_string()),
        ("{sampling_rate}", ctx.acquisition.sampling_rate.to_string()),
    ];

    args.iter()
        .map(|arg| {
            substitutions
                .iter()
                .fold(arg.clone(), |acc, (key, value)| acc.replace(key, value))
        })
        .collect()
}

/// Runs configured stage commands as child processes
pub struct ExternalPipeline {
    stages: Vec<StageCommand>,
    stage_timeout: Option<Duration>,
    project: PathBuf,
    acquisition: AcquisitionConfig,
    statuses: Mutex<HashMap<PathBuf, RunStatus>>,
}

impl ExternalPipeline {
    pub fn new(
        stages: Vec<StageCommand>,
        project: impl Into<PathBuf>,
        acquisition: AcquisitionConfig,
    ) -> Self {
        Self {
            stages,
            stage_timeout: None,
            project: project.into(),
            acquisition,
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &QcConfig, project: impl Into<PathBuf>) -> Self {
        Self::new(
            config.pipeline.stages.clone(),
            project,
            config.acquisition.clone(),
        )
        .with_stage_timeout(config.pipeline.stage_timeout())
    }

    pub fn with_stage_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stage_timeout = timeout;
        self
    }

    fn set_status(&self, movie: &Path, status: RunStatus) {
        if let Ok(mut statuses) = self.statuses.lock() {
            statuses.insert(movie.to_path_buf(), status);
        }
    }

    async fn run_stage(&self, stage: &StageCommand, movie: &Path) -> Result<(), PipelineError> {
        let ctx = StageContext {
            movie,
            project: &self.project,
            acquisition: &self.acquisition,
        };
        let args = expand_args(&stage.args, &ctx);

        debug!(stage = %stage.name, program = %stage.program, ?args, "Starting stage");

        let child = Command::new(&stage.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                stage: stage.name.clone(),
                source,
            })?;

        let output = match self.stage_timeout {
            Some(timeout) => tokio::time::timeout(timeout, child.wait_with_output())
                .await
                .map_err(|_| PipelineError::TimedOut {
                    stage: stage.name.clone(),
                    timeout,
                })?,
            None => child.wait_with_output().await,
        }
        .map_err(|source| PipelineError::Spawn {
            stage: stage.name.clone(),
            source,
        })?;

        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PipelineError::StageFailed {
            stage: stage.name.clone(),
            status: output.status.to_string(),
            stderr: stderr.lines().last().unwrap_or_default().trim().to_string(),
        })
    }
}

#[async_trait]
impl PipelineRunner for ExternalPipeline {
    async fn run(&self, movie: &Path) -> Result<PipelineOutcome, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::NoStages);
        }

        let start = Instant::now();
        for stage in &self.stages {
            self.set_status(
                movie,
                RunStatus::Running {
                    stage: stage.name.clone(),
                },
            );

            if let Err(e) = self.run_stage(stage, movie).await {
                warn!(movie = %movie.display(), stage = %stage.name, error = %e, "Pipeline stage failed");
                self.set_status(
                    movie,
                    RunStatus::Failed {
                        stage: stage.name.clone(),
                        reason: e.to_string(),
                    },
                );
                return Err(e);
            }
        }

        self.set_status(movie, RunStatus::Succeeded);
        let elapsed = start.elapsed();
        info!(
            movie = %movie.display(),
            stages = self.stages.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Pipeline finished"
        );

        Ok(PipelineOutcome {
            movie: movie.to_path_buf(),
            stages_run: self.stages.len(),
            elapsed,
        })
    }

    fn status(&self, movie: &Path) -> RunStatus {
        self.statuses
            .lock()
            .ok()
            .and_then(|s| s.get(movie).cloned())
            .unwrap_or(RunStatus::Unknown)
    }
}
