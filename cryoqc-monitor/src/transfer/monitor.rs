//! Transfer polling loop
//!
//! Every cycle, each movie known to the movie stores is (optionally) gzipped
//! once into the artifact directory and copied to the remote destination if the
//! remote existence check reports it absent. There is no retry counter: a failed
//! copy is simply attempted again on the next cycle while the remote file is
//! still missing.

use super::remote::{RemoteCopy, TransferError};
use crate::models::MovieIdentity;
use crate::monitor::{deadline_passed, sleep_or_cancel};
use crate::sources::{label, locate_stores_of_kind, SourceKind, SourceReader};
use chrono::Utc;
use cryoqc_common::config::QcConfig;
use cryoqc_common::events::{EventBus, QcEvent};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Counts of one transfer cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransferSummary {
    pub movies: usize,
    pub copied: usize,
    pub present: usize,
    pub failed: usize,
}

pub struct TransferMonitor {
    project: PathBuf,
    staging_dir: PathBuf,
    compress: bool,
    remote: Arc<dyn RemoteCopy>,
    lock_wait_ms: u64,
    command_timeout: Duration,
    sampling_interval: Duration,
    monitor_time: Option<Duration>,
    event_bus: Option<EventBus>,
}

impl TransferMonitor {
    pub fn new(
        project: impl Into<PathBuf>,
        staging_dir: impl Into<PathBuf>,
        remote: Arc<dyn RemoteCopy>,
    ) -> Self {
        Self {
            project: project.into(),
            staging_dir: staging_dir.into(),
            compress: true,
            remote,
            lock_wait_ms: 2000,
            command_timeout: Duration::from_secs(3600),
            sampling_interval: Duration::from_secs(60),
            monitor_time: None,
            event_bus: None,
        }
    }

    pub fn from_config(
        config: &QcConfig,
        project: impl Into<PathBuf>,
        remote: Arc<dyn RemoteCopy>,
    ) -> Self {
        let mut monitor = Self::new(project, config.qc.artifact_dir(), remote);
        monitor.compress = config.transfer.compress;
        monitor.lock_wait_ms = config.qc.store_lock_wait_ms;
        monitor.command_timeout = config.transfer.command_timeout();
        monitor.sampling_interval = config.transfer.sampling_interval();
        monitor.monitor_time = config.qc.monitor_time();
        monitor
    }

    pub fn with_compress(mut self, compress: bool) -> Self {
        self.compress = compress;
        self
    }

    pub fn with_sampling_interval(mut self, interval: Duration) -> Self {
        self.sampling_interval = interval;
        self
    }

    pub fn with_monitor_time(mut self, monitor_time: Option<Duration>) -> Self {
        self.monitor_time = monitor_time;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Movie files named by the movie stores, one per identity
    pub async fn movies(&self) -> BTreeMap<MovieIdentity, PathBuf> {
        let mut movies = BTreeMap::new();

        for store in locate_stores_of_kind(&self.project, SourceKind::Movies) {
            let reader = SourceReader::for_store(&store).with_lock_wait_ms(self.lock_wait_ms);
            let rows = match reader.read().await {
                Ok(rows) => rows,
                Err(e) => {
                    warn!(store = %store.path.display(), error = %e, "Store read failed");
                    continue;
                }
            };

            for row in rows {
                let Some(filename) = row.raw.get(label::FILENAME).map(|v| v.to_string()) else {
                    continue;
                };
                let path = Path::new(filename.trim());
                let path = if path.is_absolute() {
                    path.to_path_buf()
                } else {
                    self.project.join(path)
                };
                movies.entry(row.identity).or_insert(path);
            }
        }

        movies
    }

    /// One pass over all known movies
    pub async fn step(&self) -> TransferSummary {
        let movies = self.movies().await;
        let mut summary = TransferSummary {
            movies: movies.len(),
            ..Default::default()
        };

        for (identity, movie) in movies {
            match self.transfer_one(&identity, &movie).await {
                Ok(true) => summary.copied += 1,
                Ok(false) => summary.present += 1,
                Err(e) => {
                    summary.failed += 1;
                    warn!(identity = %identity, movie = %movie.display(), error = %e, "Transfer failed");
                }
            }
        }

        info!(
            movies = summary.movies,
            copied = summary.copied,
            failed = summary.failed,
            "Transfer cycle complete"
        );
        summary
    }

    /// Returns true if a copy was made, false if the remote already had it
    async fn transfer_one(&self, identity: &MovieIdentity, movie: &Path) -> Result<bool, TransferError> {
        let local = if self.compress {
            let target = self.staging_dir.join(format!("{}.gz", identity));
            if !target.is_file() {
                info!(movie = %movie.display(), "Compressing with gzip");
                gzip_file(movie, &target, self.command_timeout).await?;
            }
            target
        } else {
            movie.to_path_buf()
        };

        let remote_path = self.remote.remote_path_for(&local);
        if self.remote.exists(&remote_path).await? {
            debug!(identity = %identity, remote = %remote_path, "Already on remote");
            return Ok(false);
        }

        info!(file = %local.display(), destination = %self.remote.destination(), "Sending");
        self.remote.copy(&local).await?;

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(QcEvent::TransferCompleted {
                path: local,
                destination: self.remote.destination(),
                timestamp: Utc::now(),
            });
        }
        Ok(true)
    }

    /// Repeat [`step`](Self::step) until the run time is spent or `cancel` fires
    pub async fn run(&self, cancel: CancellationToken) -> usize {
        let deadline = self.monitor_time.map(|t| Instant::now() + t);
        let mut cycles = 0usize;

        loop {
            if cancel.is_cancelled() {
                break;
            }
            self.step().await;
            cycles += 1;

            if deadline_passed(deadline) || sleep_or_cancel(self.sampling_interval, &cancel).await {
                break;
            }
        }

        info!(cycles, "Transfer monitor stopped");
        cycles
    }
}

/// `gzip -c source > target`, published by rename once gzip succeeds
pub async fn gzip_file(source: &Path, target: &Path, timeout: Duration) -> Result<(), TransferError> {
    let dir = target.parent().unwrap_or_else(|| Path::new("."));
    tokio::fs::create_dir_all(dir).await?;

    let tmp = NamedTempFile::new_in(dir)?;
    let out = tmp.reopen()?;

    let child = Command::new("gzip")
        .arg("-c")
        .arg(source)
        .stdin(Stdio::null())
        .stdout(Stdio::from(out))
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| TransferError::Spawn {
            program: "gzip".to_string(),
            source,
        })?;

    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| TransferError::TimedOut {
            program: "gzip".to_string(),
            timeout,
        })??;

    if !output.status.success() {
        return Err(TransferError::Failed {
            program: "gzip".to_string(),
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    tmp.persist(target).map_err(|e| TransferError::Io(e.error))?;
    Ok(())
}
