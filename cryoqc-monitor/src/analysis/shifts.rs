//! Alignment shift traces
//!
//! The alignment stage records cumulative (x, y) offsets, one per frame, as two
//! comma-separated lists. Drift statistics are computed from the per-frame deltas.

use crate::models::FieldValue;

/// Cumulative per-frame alignment offsets for one movie
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShiftTrace {
    offsets: Vec<(f64, f64)>,
}

impl ShiftTrace {
    pub fn new(offsets: Vec<(f64, f64)>) -> Self {
        Self { offsets }
    }

    /// Build a trace from the x and y offset lists
    ///
    /// Accepts `"0.0, 1.5, 2.25"` as well as bracketed lists (`"[0.0,1.5]"`).
    /// Returns `None` if either list is unparseable or the lengths differ.
    pub fn parse(xs: &str, ys: &str) -> Option<Self> {
        let xs = parse_list(xs)?;
        let ys = parse_list(ys)?;
        if xs.len() != ys.len() {
            return None;
        }
        Some(Self::new(xs.into_iter().zip(ys).collect()))
    }

    /// Build a trace from stored values; numeric lists are normally stored as text
    pub fn from_values(xs: &FieldValue, ys: &FieldValue) -> Option<Self> {
        Self::parse(&xs.to_string(), &ys.to_string())
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[(f64, f64)] {
        &self.offsets
    }

    /// Consecutive differences of the cumulative offsets
    pub fn deltas(&self) -> Vec<(f64, f64)> {
        self.offsets
            .windows(2)
            .map(|w| (w[1].0 - w[0].0, w[1].1 - w[0].1))
            .collect()
    }

    pub fn x_deltas(&self) -> Vec<f64> {
        self.deltas().into_iter().map(|(dx, _)| dx).collect()
    }

    pub fn y_deltas(&self) -> Vec<f64> {
        self.deltas().into_iter().map(|(_, dy)| dy).collect()
    }

    /// Euclidean magnitude of each per-frame delta
    pub fn drifts(&self) -> Vec<f64> {
        self.deltas()
            .into_iter()
            .map(|(dx, dy)| (dx * dx + dy * dy).sqrt())
            .collect()
    }

    pub fn average_drift(&self) -> Option<f64> {
        let drifts = self.drifts();
        if drifts.is_empty() {
            return None;
        }
        Some(drifts.iter().sum::<f64>() / drifts.len() as f64)
    }

    pub fn maximum_drift(&self) -> Option<f64> {
        self.drifts().into_iter().reduce(f64::max)
    }
}

fn parse_list(text: &str) -> Option<Vec<f64>> {
    let inner = text.trim().trim_start_matches('[').trim_end_matches(']');
    if inner.trim().is_empty() {
        return Some(Vec::new());
    }
    inner
        .split(',')
        .map(|item| item.trim().parse::<f64>().ok())
        .collect()
}
