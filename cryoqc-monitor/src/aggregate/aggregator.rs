//! Record aggregator
//!
//! One poll: locate every metadata store below the project, read each store,
//! merge its rows into the record table, recompute derived fields and republish
//! the consolidated table. A store that fails to read is logged and skipped; the
//! other stores still contribute to the same poll.
//!
//! The aggregator is the only writer of the consolidated table.

use super::{writer, RecordTable};
use crate::sources::{locate_stores, SourceReader};
use chrono::Utc;
use cryoqc_common::config::QcConfig;
use cryoqc_common::events::{EventBus, QcEvent};
use cryoqc_common::Result;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Outcome of one poll
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub stores_read: usize,
    pub stores_failed: usize,
    pub rows_merged: usize,
    pub records: usize,
}

pub struct RecordAggregator {
    project: PathBuf,
    table_path: PathBuf,
    lock_wait_ms: u64,
    table: RecordTable,
    event_bus: Option<EventBus>,
}

impl RecordAggregator {
    pub fn new(project: impl Into<PathBuf>, table_path: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            table_path: table_path.into(),
            lock_wait_ms: 2000,
            table: RecordTable::new(),
            event_bus: None,
        }
    }

    pub fn from_config(config: &QcConfig, project: impl Into<PathBuf>) -> Self {
        Self::new(project, config.qc.table_path()).with_lock_wait_ms(config.qc.store_lock_wait_ms)
    }

    pub fn with_lock_wait_ms(mut self, lock_wait_ms: u64) -> Self {
        self.lock_wait_ms = lock_wait_ms;
        self
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    pub fn project(&self) -> &Path {
        &self.project
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    pub fn table(&self) -> &RecordTable {
        &self.table
    }

    /// Read all stores, merge, derive and rewrite the consolidated table
    pub async fn poll(&mut self) -> Result<PollSummary> {
        let mut summary = PollSummary::default();

        for store in locate_stores(&self.project) {
            let reader = SourceReader::for_store(&store).with_lock_wait_ms(self.lock_wait_ms);
            match reader.read().await {
                Ok(rows) => {
                    summary.stores_read += 1;
                    summary.rows_merged += rows.len();
                    self.table.merge_rows(rows);
                }
                Err(e) => {
                    summary.stores_failed += 1;
                    warn!(
                        store = %store.path.display(),
                        error = %e,
                        "Store read failed, skipping for this poll"
                    );
                }
            }
        }

        self.table.apply_derived();

        let rows = writer::write_table(&self.table, &self.table_path)?;
        summary.records = rows;

        if let Some(bus) = &self.event_bus {
            bus.emit_lossy(QcEvent::TableWritten {
                path: self.table_path.clone(),
                rows,
                timestamp: Utc::now(),
            });
        }

        debug!(
            stores = summary.stores_read,
            failed = summary.stores_failed,
            rows = summary.rows_merged,
            "Poll merged"
        );
        info!(
            table = %self.table_path.display(),
            records = rows,
            "Consolidated table written"
        );

        Ok(summary)
    }
}
