//! Directory ingestion loop
//!
//! Connects the watched directory to the dispatch pool:
//!
//! 1. Start the watcher first so nothing arriving during the backlog scan is lost
//! 2. Enumerate pre-existing files once and queue each of them
//! 3. For every new path, wait for the file to become stable, then submit it
//!
//! On cancellation the watcher is dropped, pending stability waits are
//! abandoned and the pool is drained before returning.

use super::backlog::{scan_backlog, ScanError};
use super::dispatch::{DispatchPool, SubmitOutcome};
use super::stable_file::{wait_until_stable, StabilityError};
use super::watcher::DirectoryWatcher;
use cryoqc_common::config::DispatchConfig;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("Cannot watch directory: {0}")]
    Watch(#[from] notify::Error),

    #[error(transparent)]
    Scan(#[from] ScanError),
}

/// Totals reported when ingestion stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub backlog: usize,
    pub arrivals: usize,
}

/// Watch `dir` and feed stable movie files into `pool` until `cancel` fires
pub async fn run_watch(
    dir: &Path,
    pool: Arc<DispatchPool>,
    config: &DispatchConfig,
    cancel: CancellationToken,
) -> Result<IngestSummary, IngestError> {
    let (watcher, mut arrivals) = DirectoryWatcher::start(dir)?;
    let backlog = scan_backlog(dir, &config.accepted_extensions)?;

    let interval = config.stability_interval();
    let pending = TaskTracker::new();
    let waits = cancel.child_token();
    let seen = SeenPaths::default();
    let mut summary = IngestSummary {
        backlog: backlog.len(),
        ..Default::default()
    };

    info!(
        dir = %dir.display(),
        backlog = backlog.len(),
        workers = pool.workers(),
        "Ingestion started"
    );

    for path in backlog {
        if cancel.is_cancelled() {
            break;
        }
        seen.insert(&path);
        spawn_stable_submit(&pending, path, pool.clone(), seen.clone(), interval, waits.clone());

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(config.backlog_stagger()) => {}
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            next = arrivals.recv() => {
                let Some(path) = next else {
                    warn!(dir = %dir.display(), "Watcher channel closed");
                    break;
                };
                if !pool.accepts(&path) {
                    debug!(path = %path.display(), "Ignoring file with unaccepted extension");
                    continue;
                }
                if !seen.insert(&path) {
                    continue;
                }
                summary.arrivals += 1;
                spawn_stable_submit(&pending, path, pool.clone(), seen.clone(), interval, waits.clone());
            }
        }
    }

    info!("Stopping ingestion");
    drop(watcher);
    waits.cancel();
    pending.close();
    pending.wait().await;
    pool.shutdown().await;

    Ok(summary)
}

/// Paths with a stability wait pending or already submitted
///
/// A path whose file vanishes before it is stable is forgotten, so a later file
/// arriving under the same name is picked up again.
#[derive(Debug, Clone, Default)]
struct SeenPaths(Arc<Mutex<HashSet<PathBuf>>>);

impl SeenPaths {
    fn insert(&self, path: &Path) -> bool {
        match self.0.lock() {
            Ok(mut seen) => seen.insert(path.to_path_buf()),
            Err(poisoned) => poisoned.into_inner().insert(path.to_path_buf()),
        }
    }

    fn forget(&self, path: &Path) {
        match self.0.lock() {
            Ok(mut seen) => seen.remove(path),
            Err(poisoned) => poisoned.into_inner().remove(path),
        };
    }
}

fn spawn_stable_submit(
    pending: &TaskTracker,
    path: PathBuf,
    pool: Arc<DispatchPool>,
    seen: SeenPaths,
    interval: Duration,
    cancel: CancellationToken,
) {
    pending.spawn(async move {
        match wait_until_stable(&path, interval, &cancel).await {
            Ok(size) => {
                let outcome = pool.submit(path.clone());
                debug!(path = %path.display(), size, ?outcome, "Submitted stable file");
                if outcome == SubmitOutcome::Closed {
                    warn!(path = %path.display(), "File became stable after shutdown began");
                }
            }
            Err(StabilityError::Cancelled(_)) => {
                debug!(path = %path.display(), "Stability wait abandoned");
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "File vanished before it was stable");
                seen.forget(&path);
            }
        }
    });
}
