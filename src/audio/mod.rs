// Audio processing module
// WAV ingestion and the acoustic analysis collaborator the transcriber
// depends on: pitch tracking, voicing, onsets and tempo

pub mod analyzer;
pub mod ingest;
pub mod onsets;
pub mod pitch;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use analyzer::ReferenceAnalyzer;
pub use ingest::{ingest_wav, read_wav_file, AudioData, AudioError};
pub use onsets::{detect_onset_frames, OnsetConfig};
pub use pitch::{track_pitch, PitchConfig};

/// Errors raised by acoustic analysis
#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("Invalid sample rate: {0}")]
    InvalidSampleRate(u32),

    #[error("Signal is empty")]
    EmptySignal,

    #[error("Invalid analysis parameter {name}: {value}")]
    InvalidParameter { name: &'static str, value: f64 },

    #[error("Pitch track has {pitches} frames but voicing has {voiced}")]
    LengthMismatch { pitches: usize, voiced: usize },

    #[error("FFT failed: {0}")]
    Fft(String),

    #[error("Invalid tempo estimate: {0} BPM")]
    InvalidTempo(f64),

    #[error("Audio error: {0}")]
    Audio(#[from] AudioError),
}

/// Per-frame output of a pitch tracker
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PitchTrack {
    /// Rounded, tuning-corrected MIDI estimate, None for unvoiced frames
    pub pitches: Vec<Option<i32>>,

    /// Voicing decision per frame
    pub voiced: Vec<bool>,

    /// Voicing confidence per frame [0.0, 1.0]
    pub voiced_prob: Vec<f32>,
}

impl PitchTrack {
    pub fn len(&self) -> usize {
        self.pitches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pitches.is_empty()
    }
}

/// Acoustic analysis the transcriber consumes
///
/// Frame `t` of every output is centered on sample `t * hop_length`, so the
/// pitch track and onset indices line up frame for frame.
pub trait AcousticAnalyzer {
    /// Estimate pitch and voicing for every frame
    #[allow(clippy::too_many_arguments)]
    fn pitch_track(
        &self,
        signal: &[f32],
        min_freq: f64,
        max_freq: f64,
        sample_rate: u32,
        frame_length: usize,
        window_length: usize,
        hop_length: usize,
    ) -> Result<PitchTrack, AnalysisError>;

    /// Indices of frames on which a note starts
    fn detect_onsets(
        &self,
        signal: &[f32],
        sample_rate: u32,
        hop_length: usize,
    ) -> Result<Vec<usize>, AnalysisError>;

    /// One tempo for the whole signal, in BPM
    fn estimate_tempo(&self, signal: &[f32], sample_rate: u32) -> Result<f64, AnalysisError>;
}

/// Number of centered frames for a signal, matching `1 + len / hop`
pub fn frame_count(n_samples: usize, hop_length: usize) -> usize {
    if hop_length == 0 {
        return 0;
    }
    1 + n_samples / hop_length
}

/// Copy `length` samples centered on `center`, zero-padded at the edges
pub fn centered_frame(signal: &[f32], center: usize, length: usize, out: &mut [f64]) {
    let half = length / 2;
    for (k, slot) in out.iter_mut().take(length).enumerate() {
        let index = (center + k).checked_sub(half);
        *slot = index
            .and_then(|i| signal.get(i))
            .map_or(0.0, |&s| s as f64);
    }
}

pub(crate) fn check_signal(
    signal: &[f32],
    sample_rate: u32,
    hop_length: usize,
) -> Result<(), AnalysisError> {
    if sample_rate == 0 {
        return Err(AnalysisError::InvalidSampleRate(sample_rate));
    }
    if hop_length == 0 {
        return Err(AnalysisError::InvalidParameter {
            name: "hop_length",
            value: 0.0,
        });
    }
    if signal.is_empty() {
        return Err(AnalysisError::EmptySignal);
    }
    Ok(())
}
