// Tempo Estimation - BPM detection using inter-onset intervals
// Builds an IOI histogram over the onset frames and picks its strongest peak

use serde::{Deserialize, Serialize};

/// Tempo used when the onsets carry no usable periodicity
pub const FALLBACK_BPM: f64 = 120.0;

/// Tempo estimation result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TempoEstimate {
    /// Estimated beats per minute
    pub bpm: f64,

    /// Confidence in the estimate [0.0, 1.0]
    /// Zero when the fallback tempo was used
    pub confidence: f32,
}

/// Configuration for tempo estimation
#[derive(Debug, Clone)]
pub struct TempoConfig {
    /// Minimum BPM to consider
    pub min_bpm: f64,

    /// Maximum BPM to consider
    pub max_bpm: f64,

    /// Number of bins for IOI histogram
    pub histogram_bins: usize,

    /// Minimum number of onsets required for estimation
    pub min_onsets: usize,
}

impl Default for TempoConfig {
    fn default() -> Self {
        TempoConfig {
            min_bpm: 60.0,
            max_bpm: 180.0,
            histogram_bins: 240,
            min_onsets: 4,
        }
    }
}

/// Estimate tempo from onset times in seconds
///
/// Algorithm:
/// 1. Compute inter-onset intervals (IOIs)
/// 2. Accumulate them, plus half and double intervals, into a histogram
/// 3. Smooth the histogram and pick its strongest bin
pub fn estimate_tempo_from_onsets(onset_times: &[f64], config: &TempoConfig) -> TempoEstimate {
    let fallback = TempoEstimate {
        bpm: FALLBACK_BPM,
        confidence: 0.0,
    };

    if onset_times.len() < config.min_onsets.max(2) {
        log::warn!(
            "Only {} onsets, falling back to {} BPM",
            onset_times.len(),
            FALLBACK_BPM
        );
        return fallback;
    }

    if config.min_bpm <= 0.0 || config.max_bpm <= config.min_bpm || config.histogram_bins == 0 {
        return fallback;
    }

    let iois = compute_iois(onset_times);
    if iois.is_empty() {
        return fallback;
    }

    let histogram = build_ioi_histogram(&iois, config);
    let Some((best_bin, peak)) = strongest_bin(&histogram) else {
        log::warn!("No inter-onset interval in tempo range, falling back to {} BPM", FALLBACK_BPM);
        return fallback;
    };

    let min_interval = 60.0 / config.max_bpm;
    let max_interval = 60.0 / config.min_bpm;
    let bin_width = (max_interval - min_interval) / config.histogram_bins as f64;
    let interval = min_interval + (best_bin as f64 + 0.5) * bin_width;

    let mean = histogram.iter().sum::<f32>() / histogram.len() as f32;
    let confidence = if mean > 0.0 {
        (peak / (mean * 3.0)).min(1.0)
    } else {
        0.0
    };

    TempoEstimate {
        bpm: (60.0 / interval).clamp(config.min_bpm, config.max_bpm),
        confidence,
    }
}

/// Compute inter-onset intervals (time between consecutive onsets)
fn compute_iois(onset_times: &[f64]) -> Vec<f64> {
    onset_times
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .filter(|&interval| interval > 0.0)
        .collect()
}

/// Build histogram of inter-onset intervals
/// Bins are distributed linearly across the interval range of the tempo range
fn build_ioi_histogram(iois: &[f64], config: &TempoConfig) -> Vec<f32> {
    let min_interval = 60.0 / config.max_bpm;
    let max_interval = 60.0 / config.min_bpm;
    let bin_width = (max_interval - min_interval) / config.histogram_bins as f64;
    let mut histogram = vec![0.0f32; config.histogram_bins];

    let mut accumulate = |interval: f64, weight: f32| {
        if interval >= min_interval && interval <= max_interval {
            let bin = ((interval - min_interval) / bin_width) as usize;
            histogram[bin.min(config.histogram_bins - 1)] += weight;
        }
    };

    for &ioi in iois {
        accumulate(ioi, 1.0);
        // Half and double tempo relationships, at lower weight
        accumulate(ioi / 2.0, 0.5);
        accumulate(ioi * 2.0, 0.5);
    }

    smooth_histogram(&histogram, 3)
}

/// Smooth histogram using moving average filter
fn smooth_histogram(histogram: &[f32], window_size: usize) -> Vec<f32> {
    let half_window = window_size / 2;

    (0..histogram.len())
        .map(|i| {
            let start = i.saturating_sub(half_window);
            let end = (i + half_window + 1).min(histogram.len());
            histogram[start..end].iter().sum::<f32>() / (end - start) as f32
        })
        .collect()
}

/// Index and height of the highest bin; lowest index wins ties
fn strongest_bin(histogram: &[f32]) -> Option<(usize, f32)> {
    let mut best: Option<(usize, f32)> = None;
    for (i, &value) in histogram.iter().enumerate() {
        if value > 0.0 && best.map_or(true, |(_, b)| value > b) {
            best = Some((i, value));
        }
    }
    best
}
