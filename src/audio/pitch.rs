// Pitch tracking
// Frame-wise McLeod pitch estimation with voicing, tuning correction and
// rounding to MIDI note numbers

use pitch_detection::detector::mcleod::McLeodDetector;
use pitch_detection::detector::PitchDetector;

use super::{check_signal, centered_frame, frame_count, AnalysisError, PitchTrack};
use crate::notes::hz_to_midi;

/// Frames quieter than this RMS level are never voiced
const SILENCE_RMS: f64 = 0.01;

/// Configuration for the pitch tracker
#[derive(Debug, Clone)]
pub struct PitchConfig {
    /// Lowest accepted frequency in Hz
    pub min_freq: f64,

    /// Highest accepted frequency in Hz
    pub max_freq: f64,

    /// Autocorrelation size including zero padding
    pub frame_length: usize,

    /// Samples analysed per frame
    pub window_length: usize,

    /// Samples between frame centers
    pub hop_length: usize,

    /// Minimum normalized peak height for a voiced frame
    pub clarity_threshold: f64,
}

/// Estimate pitch and voicing for every frame of a mono signal
pub fn track_pitch(
    signal: &[f32],
    sample_rate: u32,
    config: &PitchConfig,
) -> Result<PitchTrack, AnalysisError> {
    check_signal(signal, sample_rate, config.hop_length)?;
    if config.window_length < 4 {
        return Err(AnalysisError::InvalidParameter {
            name: "window_length",
            value: config.window_length as f64,
        });
    }
    if !(config.min_freq > 0.0 && config.max_freq > config.min_freq) {
        return Err(AnalysisError::InvalidParameter {
            name: "min_freq",
            value: config.min_freq,
        });
    }

    let size = config.window_length;
    let padding = if config.frame_length > size {
        config.frame_length - size
    } else {
        size / 2
    };
    let mut detector = McLeodDetector::<f64>::new(size, padding);
    let power_threshold = SILENCE_RMS * SILENCE_RMS * size as f64;

    let n_frames = frame_count(signal.len(), config.hop_length);
    let mut window = vec![0.0f64; size];
    let mut midi: Vec<Option<f64>> = Vec::with_capacity(n_frames);
    let mut voiced_prob = Vec::with_capacity(n_frames);

    for t in 0..n_frames {
        centered_frame(signal, t * config.hop_length, size, &mut window);

        let estimate = detector
            .get_pitch(
                &window,
                sample_rate as usize,
                power_threshold,
                config.clarity_threshold,
            )
            .filter(|p| p.frequency >= config.min_freq && p.frequency <= config.max_freq);

        match estimate {
            Some(p) => {
                midi.push(Some(hz_to_midi(p.frequency)));
                voiced_prob.push(p.clarity.clamp(0.0, 1.0) as f32);
            }
            None => {
                midi.push(None);
                voiced_prob.push(0.0);
            }
        }
    }

    let tuning = estimate_tuning(&midi);
    if tuning.abs() > 0.01 {
        log::debug!("Correcting global tuning offset of {:+.2} semitones", tuning);
    }

    let pitches: Vec<Option<i32>> = midi
        .iter()
        .map(|m| m.map(|m| (m - tuning).round() as i32))
        .collect();
    let voiced = pitches.iter().map(Option::is_some).collect();

    Ok(PitchTrack {
        pitches,
        voiced,
        voiced_prob,
    })
}

/// Median deviation of voiced frames from the equal-tempered grid,
/// in semitones within [-0.5, 0.5)
pub fn estimate_tuning(midi: &[Option<f64>]) -> f64 {
    let mut deviations: Vec<f64> = midi
        .iter()
        .flatten()
        .map(|m| m - m.round())
        .filter(|d| d.is_finite())
        .collect();

    if deviations.is_empty() {
        return 0.0;
    }

    deviations.sort_by(|a, b| a.total_cmp(b));
    deviations[deviations.len() / 2]
}
