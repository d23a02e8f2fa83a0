//! Configuration loading and validation
//!
//! Configuration is resolved once at startup into an immutable [`QcConfig`] that is
//! handed to the dispatcher, the QC monitor and the transfer monitor.
//!
//! # Config file priority
//!
//! 1. Command-line argument (`--config`)
//! 2. Environment variable (`CRYOQC_CONFIG`)
//! 3. `<config_dir>/cryoqc/config.toml`
//! 4. Built-in defaults
//!
//! A missing config file is never fatal: a warning is logged and defaults apply.
//! Launch parameters given on the command line are layered on top afterwards.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "CRYOQC_CONFIG";

/// Complete monitor configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QcConfig {
    /// Project directory; pipeline stages write their metadata stores below it
    pub project: Option<PathBuf>,

    /// Incoming-files directory watched for new movies
    pub watch_directory: Option<PathBuf>,

    pub acquisition: AcquisitionConfig,
    pub dispatch: DispatchConfig,
    pub pipeline: PipelineConfig,
    pub qc: SummaryConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

/// Acquisition parameters forwarded to the import stage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Microscope voltage in kV
    pub voltage: f64,
    /// Sampling rate in Å/pixel
    pub sampling_rate: f64,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            voltage: 200.0,
            sampling_rate: 1.0,
        }
    }
}

/// Dispatch pool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Maximum concurrent pipeline invocations
    pub workers: usize,
    /// Accepted movie extensions (case-sensitive, no leading dot)
    pub accepted_extensions: Vec<String>,
    /// Interval between the two size checks of the stability test
    pub stability_interval_ms: u64,
    /// Delay between submissions of pre-existing files at startup
    pub backlog_stagger_ms: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            accepted_extensions: ["mrcs", "mrc", "dm4", "dm3"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            stability_interval_ms: 1000,
            backlog_stagger_ms: 100,
        }
    }
}

impl DispatchConfig {
    pub fn stability_interval(&self) -> Duration {
        Duration::from_millis(self.stability_interval_ms)
    }

    pub fn backlog_stagger(&self) -> Duration {
        Duration::from_millis(self.backlog_stagger_ms)
    }
}

/// One external pipeline stage (import, alignment, CTF estimation, ...)
///
/// `args` may contain the placeholders `{movie}`, `{movie_dir}`, `{movie_name}`,
/// `{project}`, `{voltage}` and `{sampling_rate}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageCommand {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

/// External pipeline settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stages run in order for every accepted movie
    pub stages: Vec<StageCommand>,
    /// Optional per-stage wall-clock limit
    pub stage_timeout_secs: Option<u64>,
}

impl PipelineConfig {
    pub fn stage_timeout(&self) -> Option<Duration> {
        self.stage_timeout_secs.map(Duration::from_secs)
    }
}

/// Composite tile arrangement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompositeLayout {
    /// Four thumbnails side by side (1600×400)
    #[default]
    Row,
    /// 2×2 grid (800×800)
    Grid,
}

/// QC aggregation and artifact settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryConfig {
    /// Directory receiving the consolidated table and the `extra/` artifacts
    pub working_dir: PathBuf,
    /// Sleep between poll cycles
    pub sampling_interval_secs: u64,
    /// Total run time; 0 runs until cancelled
    pub monitor_time_secs: u64,
    /// File name of the consolidated table inside `working_dir`
    pub table_name: String,
    pub composite_layout: CompositeLayout,
    /// Upper bound for each blocking collaborator call (decode, render)
    pub collaborator_timeout_secs: u64,
    /// How long to keep retrying a store that reports "database is locked"
    pub store_lock_wait_ms: u64,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            working_dir: PathBuf::from("qc"),
            sampling_interval_secs: 60,
            monitor_time_secs: 0,
            table_name: "qc_summary.csv".to_string(),
            composite_layout: CompositeLayout::Row,
            collaborator_timeout_secs: 30,
            store_lock_wait_ms: 2000,
        }
    }
}

impl SummaryConfig {
    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    pub fn monitor_time(&self) -> Option<Duration> {
        (self.monitor_time_secs > 0).then(|| Duration::from_secs(self.monitor_time_secs))
    }

    pub fn collaborator_timeout(&self) -> Duration {
        Duration::from_secs(self.collaborator_timeout_secs)
    }

    pub fn table_path(&self) -> PathBuf {
        self.working_dir.join(&self.table_name)
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.working_dir.join("extra")
    }
}

/// Remote copy program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferMethod {
    #[default]
    Scp,
    Bbcp,
}

/// Remote transfer settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    pub method: TransferMethod,
    /// Gzip movies before sending
    pub compress: bool,
    pub host: Option<String>,
    pub user: Option<String>,
    /// Destination directory; empty means the remote home directory
    pub directory: String,
    /// Name of the environment variable holding the remote credential
    pub credential_env: Option<String>,
    pub command_timeout_secs: u64,
    /// Sleep between transfer poll cycles
    pub sampling_interval_secs: u64,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            method: TransferMethod::Scp,
            compress: true,
            host: None,
            user: None,
            directory: String::new(),
            credential_env: None,
            command_timeout_secs: 3600,
            sampling_interval_secs: 60,
        }
    }
}

impl TransferConfig {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn sampling_interval(&self) -> Duration {
        Duration::from_secs(self.sampling_interval_secs)
    }

    /// Read the credential from the configured environment variable, if any
    pub fn credential(&self) -> Option<String> {
        self.credential_env
            .as_deref()
            .and_then(|name| std::env::var(name).ok())
            .filter(|value| !value.is_empty())
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Resolve which config file to read, following the documented priority
pub fn resolve_config_path(cli_arg: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config directory
    dirs::config_dir()
        .map(|d| d.join("cryoqc").join("config.toml"))
        .filter(|p| p.exists())
}

impl QcConfig {
    /// Load configuration from a TOML file, falling back to defaults when absent
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            info!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        if !path.exists() {
            warn!(
                path = %path.display(),
                "Config file not found, using built-in defaults"
            );
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        let config = Self::from_toml_str(&content)?;
        info!(path = %path.display(), "Configuration loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
    }

    /// Checks shared by every subcommand
    pub fn validate(&self) -> Result<()> {
        if self.dispatch.workers == 0 {
            return Err(Error::Config("dispatch.workers must be at least 1".to_string()));
        }
        if self.dispatch.accepted_extensions.is_empty() {
            return Err(Error::Config(
                "dispatch.accepted_extensions must not be empty".to_string(),
            ));
        }
        if let Some(ext) = self
            .dispatch
            .accepted_extensions
            .iter()
            .find(|e| e.is_empty() || e.starts_with('.'))
        {
            return Err(Error::Config(format!(
                "accepted extension '{}' must be non-empty without a leading dot",
                ext
            )));
        }
        if self.dispatch.stability_interval_ms == 0 {
            return Err(Error::Config(
                "dispatch.stability_interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.qc.sampling_interval_secs == 0 {
            return Err(Error::Config(
                "qc.sampling_interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.qc.collaborator_timeout_secs == 0 {
            return Err(Error::Config(
                "qc.collaborator_timeout_secs must be greater than 0".to_string(),
            ));
        }
        if self.qc.table_name.trim().is_empty() {
            return Err(Error::Config("qc.table_name must not be empty".to_string()));
        }
        Ok(())
    }

    /// Additional checks for the directory watcher / dispatcher
    pub fn validate_for_dispatch(&self) -> Result<()> {
        self.validate()?;
        if self.watch_directory.is_none() {
            return Err(Error::Config("watch directory not configured".to_string()));
        }
        if self.project.is_none() {
            return Err(Error::Config("project not configured".to_string()));
        }
        if self.pipeline.stages.is_empty() {
            return Err(Error::Config(
                "at least one [[pipeline.stages]] entry is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Additional checks for the remote transfer monitor
    pub fn validate_for_transfer(&self) -> Result<()> {
        self.validate()?;
        if self.project.is_none() {
            return Err(Error::Config("project not configured".to_string()));
        }
        if self.transfer.host.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("transfer.host not configured".to_string()));
        }
        if self.transfer.user.as_deref().map_or(true, str::is_empty) {
            return Err(Error::Config("transfer.user not configured".to_string()));
        }
        if self.transfer.sampling_interval_secs == 0 {
            return Err(Error::Config(
                "transfer.sampling_interval_secs must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
