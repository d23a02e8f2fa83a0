//! Event types for the cryoqc event system
//!
//! Components publish progress as [`QcEvent`]s on a shared [`EventBus`]. Emission
//! is lossy: a monitor with nobody listening keeps running.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::broadcast;

/// Kind of per-movie diagnostic artifact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArtifactKind {
    MicrographPreview,
    ShiftPlot,
    PowerSpectrum,
    ResolutionPlot,
    Composite,
}

/// cryoqc event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum QcEvent {
    /// A movie passed the extension filter and was queued for processing
    MovieAccepted {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// A worker picked up the movie and launched the pipeline
    PipelineStarted {
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// Pipeline invocation ended
    PipelineFinished {
        path: PathBuf,
        success: bool,
        timestamp: DateTime<Utc>,
    },

    /// Consolidated table was republished
    TableWritten {
        path: PathBuf,
        rows: usize,
        timestamp: DateTime<Utc>,
    },

    /// An artifact file was rendered
    ArtifactWritten {
        identity: String,
        kind: ArtifactKind,
        path: PathBuf,
        timestamp: DateTime<Utc>,
    },

    /// A file reached the remote destination
    TransferCompleted {
        path: PathBuf,
        destination: String,
        timestamp: DateTime<Utc>,
    },
}

/// Broadcast bus for [`QcEvent`]s
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QcEvent>,
    capacity: usize,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    ///
    /// Slow subscribers lose the oldest events once `capacity` is exceeded.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<QcEvent> {
        self.tx.subscribe()
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: QcEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
