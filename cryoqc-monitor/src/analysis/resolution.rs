//! Resolution limits from an EPA cross-correlation curve
//!
//! A single forward pass over the samples (increasing spatial frequency) finds
//! the resolutions at which the CCC first drops to 0.8 and to 0.5, and splits
//! the curve into high / medium / low confidence bands for plotting. The sample
//! that triggers a band switch is placed in both bands so the drawn curve stays
//! continuous.
//!
//! Limits that are never reached stay `None`; this is not an error.

use super::epa::EpaSample;

/// CCC at or below which the 0.8 limit is reached
pub const THRESHOLD_HIGH: f64 = 0.8;
/// CCC at or below which the 0.5 limit is reached
pub const THRESHOLD_LOW: f64 = 0.5;

/// Resolutions (Å) at which confidence crossed 0.8 and 0.5
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ResolutionLimits {
    pub at_0_8: Option<f64>,
    pub at_0_5: Option<f64>,
}

/// Confidence band of a curve segment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfidenceBand {
    /// 1.0 ≥ CCC > 0.8
    High,
    /// 0.8 ≥ CCC > 0.5
    Medium,
    /// CCC ≤ 0.5
    Low,
}

impl ConfidenceBand {
    pub const ALL: [ConfidenceBand; 3] =
        [ConfidenceBand::High, ConfidenceBand::Medium, ConfidenceBand::Low];

    pub fn legend(self) -> &'static str {
        match self {
            ConfidenceBand::High => "1.0 >= CCC > 0.8",
            ConfidenceBand::Medium => "0.8 >= CCC > 0.5",
            ConfidenceBand::Low => "0.5 >= CCC > -1.0",
        }
    }
}

/// A plotted CCC point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurvePoint {
    /// 1/Å
    pub frequency: f64,
    pub ccc: f64,
}

/// CCC points split by confidence band
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BandPoints {
    pub high: Vec<CurvePoint>,
    pub medium: Vec<CurvePoint>,
    pub low: Vec<CurvePoint>,
}

impl BandPoints {
    pub fn band(&self, band: ConfidenceBand) -> &[CurvePoint] {
        match band {
            ConfidenceBand::High => &self.high,
            ConfidenceBand::Medium => &self.medium,
            ConfidenceBand::Low => &self.low,
        }
    }

    fn band_mut(&mut self, band: ConfidenceBand) -> &mut Vec<CurvePoint> {
        match band {
            ConfidenceBand::High => &mut self.high,
            ConfidenceBand::Medium => &mut self.medium,
            ConfidenceBand::Low => &mut self.low,
        }
    }
}

/// Inclusive resolution interval in Å
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionRange {
    pub min: f64,
    pub max: f64,
}

impl ResolutionRange {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, resolution: f64) -> bool {
        resolution >= self.min && resolution <= self.max
    }
}

/// One panel of the resolution plot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Panel {
    pub title: &'static str,
    /// `None` covers the whole curve
    pub range: Option<ResolutionRange>,
}

/// Full curve, then three progressively higher-frequency windows
pub const PANELS: [Panel; 4] = [
    Panel {
        title: "Full range",
        range: None,
    },
    Panel {
        title: "20-8 A",
        range: Some(ResolutionRange::new(8.0, 20.0)),
    },
    Panel {
        title: "8-5 A",
        range: Some(ResolutionRange::new(5.0, 8.0)),
    },
    Panel {
        title: "5-3 A",
        range: Some(ResolutionRange::new(3.0, 5.0)),
    },
];

/// Everything needed to draw one panel
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolutionAnalysis {
    pub limits: ResolutionLimits,
    pub bands: BandPoints,
    /// Plot x axis (1/Å) of the in-range samples
    pub frequencies: Vec<f64>,
    pub ctf_sim: Vec<f64>,
    /// Background-corrected amplitude rescaled to [0, 1]
    pub epa_normalized: Vec<f64>,
}

impl ResolutionAnalysis {
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty()
    }

    /// Frequency span of the panel, if it has samples
    pub fn frequency_span(&self) -> Option<(f64, f64)> {
        let min = self.frequencies.iter().copied().reduce(f64::min)?;
        let max = self.frequencies.iter().copied().reduce(f64::max)?;
        Some((min, max))
    }
}

/// Run the analysis over the samples inside `range` (all samples if `None`)
pub fn analyze(samples: &[EpaSample], range: Option<ResolutionRange>) -> ResolutionAnalysis {
    let selected: Vec<&EpaSample> = samples
        .iter()
        .filter(|s| range.map_or(true, |r| r.contains(s.resolution)))
        .collect();

    let mut limits = ResolutionLimits::default();
    let mut bands = BandPoints::default();
    let mut current = ConfidenceBand::High;

    for sample in &selected {
        let point = CurvePoint {
            frequency: sample.frequency(),
            ccc: sample.ccc,
        };

        let next = if limits.at_0_8.is_none() {
            if sample.ccc <= THRESHOLD_LOW {
                // Skipped the medium band at this sampling granularity
                limits.at_0_8 = Some(sample.resolution);
                limits.at_0_5 = Some(sample.resolution);
                Some(ConfidenceBand::Low)
            } else if sample.ccc <= THRESHOLD_HIGH {
                limits.at_0_8 = Some(sample.resolution);
                Some(ConfidenceBand::Medium)
            } else {
                None
            }
        } else if limits.at_0_5.is_none() && sample.ccc <= THRESHOLD_LOW {
            limits.at_0_5 = Some(sample.resolution);
            Some(ConfidenceBand::Low)
        } else {
            None
        };

        if let Some(next) = next {
            bands.band_mut(current).push(point);
            current = next;
        }
        bands.band_mut(current).push(point);
    }

    let amplitudes: Vec<f64> = selected.iter().map(|s| s.epa_ln_f_bg).collect();

    ResolutionAnalysis {
        limits,
        bands,
        frequencies: selected.iter().map(|s| s.frequency()).collect(),
        ctf_sim: selected.iter().map(|s| s.ctf_sim).collect(),
        epa_normalized: normalize_unit(&amplitudes),
    }
}

/// Analyze every panel independently
pub fn analyze_panels(samples: &[EpaSample]) -> Vec<(Panel, ResolutionAnalysis)> {
    PANELS
        .iter()
        .map(|panel| (*panel, analyze(samples, panel.range)))
        .collect()
}

/// Rescale to the unit interval with `(v - min) / (max - min)`
///
/// A constant series maps to all zeros.
pub fn normalize_unit(values: &[f64]) -> Vec<f64> {
    let Some(min) = values.iter().copied().reduce(f64::min) else {
        return Vec::new();
    };
    let max = values.iter().copied().fold(min, f64::max);
    let span = max - min;
    if span <= 0.0 || !span.is_finite() {
        return vec![0.0; values.len()];
    }
    values.iter().map(|v| (v - min) / span).collect()
}
