// Transcriber configuration
// Construction-time parameters for one conversion, with defaults and validation

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

use crate::notes::names::note_to_midi;
use crate::notes::NoteRange;

/// Errors for invalid configuration, raised before any matrix work begins
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid note range: minimum {minimum} is above maximum {maximum}")]
    InvalidNoteRange { minimum: i32, maximum: i32 },

    #[error("Note {0} is outside the MIDI range 0-127")]
    NoteOutOfRange(i32),

    #[error("Invalid note name: {0:?}")]
    InvalidNoteName(String),

    #[error("Parameter {name} must lie strictly between 0 and 1, got {value}")]
    ProbabilityOutOfRange { name: &'static str, value: f64 },

    #[error("Parameter {name} must be positive, got {value}")]
    NotPositive { name: &'static str, value: f64 },

    #[error("Velocity {0} is outside the MIDI range 1-127")]
    VelocityOutOfRange(u8),

    #[error("Window length {window_length} exceeds frame length {frame_length}")]
    WindowTooLong {
        frame_length: usize,
        window_length: usize,
    },

    #[error("Failed to read config: {0}")]
    Read(String),
}

/// All parameters recognized by the transcriber
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranscriberConfig {
    /// Lowest note of the state space, in 'A#4' format
    pub minimum_note: String,

    /// Highest note of the state space, in 'A#4' format
    pub maximum_note: String,

    /// Probability of a sustain state returning to itself
    pub p_stay_note: f64,

    /// Probability of the silence state returning to itself
    pub p_stay_silence: f64,

    /// Estimated probability that the pitch estimator is correct
    pub pitch_acc: f64,

    /// Estimated accuracy of the voiced flag
    pub voiced_acc: f64,

    /// Estimated accuracy of the onset detector
    pub onset_acc: f64,

    /// Probability of a one-semitone deviation (vibrato, glissando)
    pub spread: f64,

    /// Samples per analysis frame; the onset FFT size and the padded
    /// autocorrelation size of the pitch tracker
    pub frame_length: usize,

    /// Samples the pitch tracker inspects per frame
    pub window_length: usize,

    /// Samples between consecutive frames
    pub hop_length: usize,

    /// MIDI time resolution
    pub ticks_per_quarter: u16,

    /// Velocity assigned to every emitted note
    pub velocity: u8,

    /// Minimum McLeod clarity for a frame to count as voiced
    pub clarity_threshold: f64,

    /// Adaptive threshold factor for onset peak picking
    /// Threshold = mean(flux) + onset_threshold * std(flux)
    pub onset_threshold: f32,

    /// Fewer onsets than this and tempo falls back to 120 BPM
    pub min_tempo_onsets: usize,
}

impl Default for TranscriberConfig {
    fn default() -> Self {
        TranscriberConfig {
            minimum_note: "A2".to_string(),
            maximum_note: "E6".to_string(),
            p_stay_note: 0.9,
            p_stay_silence: 0.2,
            pitch_acc: 0.99,
            voiced_acc: 0.9,
            onset_acc: 0.8,
            spread: 0.6,
            frame_length: 2048,
            window_length: 1024,
            hop_length: 256,
            ticks_per_quarter: 1024,
            velocity: 100,
            clarity_threshold: 0.6,
            onset_threshold: 1.5,
            min_tempo_onsets: 4,
        }
    }
}

impl TranscriberConfig {
    /// Parse a JSON config; missing fields take their defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Read(e.to_string()))
    }

    /// Read and parse a JSON config file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Read(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&contents)
    }

    /// Resolve the symbolic note bounds into a note range
    pub fn note_range(&self) -> Result<NoteRange, ConfigError> {
        let minimum = note_to_midi(&self.minimum_note)?;
        let maximum = note_to_midi(&self.maximum_note)?;
        NoteRange::new(minimum, maximum)
    }

    /// Emission confidences as used by the prior assembler
    pub fn emission_params(&self) -> Result<crate::hmm::EmissionParams, ConfigError> {
        crate::hmm::EmissionParams::new(self.pitch_acc, self.voiced_acc, self.onset_acc, self.spread)
    }

    /// Check every parameter; returns the resolved note range on success
    pub fn validate(&self) -> Result<NoteRange, ConfigError> {
        let range = self.note_range()?;

        check_probability("p_stay_note", self.p_stay_note)?;
        check_probability("p_stay_silence", self.p_stay_silence)?;
        self.emission_params()?;
        check_probability("clarity_threshold", self.clarity_threshold)?;

        for (name, value) in [
            ("frame_length", self.frame_length),
            ("window_length", self.window_length),
            ("hop_length", self.hop_length),
            ("ticks_per_quarter", self.ticks_per_quarter as usize),
            ("velocity", self.velocity as usize),
        ] {
            if value == 0 {
                return Err(ConfigError::NotPositive { name, value: 0.0 });
            }
        }

        if self.velocity > 127 {
            return Err(ConfigError::VelocityOutOfRange(self.velocity));
        }

        if self.window_length > self.frame_length {
            return Err(ConfigError::WindowTooLong {
                frame_length: self.frame_length,
                window_length: self.window_length,
            });
        }

        if !(self.onset_threshold.is_finite() && self.onset_threshold >= 0.0) {
            return Err(ConfigError::NotPositive {
                name: "onset_threshold",
                value: self.onset_threshold as f64,
            });
        }

        Ok(range)
    }
}

/// Reject anything outside the open interval (0, 1), NaN included
pub fn check_probability(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value > 0.0 && value < 1.0 {
        Ok(())
    } else {
        Err(ConfigError::ProbabilityOutOfRange { name, value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = TranscriberConfig::default();
        let range = config.validate().unwrap();

        // A2 = 45, E6 = 88
        assert_eq!(range.minimum(), 45);
        assert_eq!(range.maximum(), 88);
        assert_eq!(range.n_notes(), 44);
    }

    #[test]
    fn test_rejects_boundary_probabilities() {
        for bad in [0.0, 1.0, -0.1, 1.5, f64::NAN] {
            let config = TranscriberConfig {
                p_stay_note: bad,
                ..Default::default()
            };
            assert!(matches!(
                config.validate(),
                Err(ConfigError::ProbabilityOutOfRange { name: "p_stay_note", .. })
            ));
        }

        let config = TranscriberConfig {
            spread: 1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_inverted_range() {
        let config = TranscriberConfig {
            minimum_note: "C5".to_string(),
            maximum_note: "C4".to_string(),
            ..Default::default()
        };

        assert_eq!(
            config.validate(),
            Err(ConfigError::InvalidNoteRange {
                minimum: 72,
                maximum: 60
            })
        );
    }

    #[test]
    fn test_rejects_zero_hop() {
        let config = TranscriberConfig {
            hop_length: 0,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive { name: "hop_length", .. })
        ));
    }

    #[test]
    fn test_json_partial_override() {
        let config = TranscriberConfig::from_json_str(
            r#"{ "minimum_note": "C4", "maximum_note": "C5", "p_stay_note": 0.95 }"#,
        )
        .unwrap();

        assert_eq!(config.minimum_note, "C4");
        assert_eq!(config.p_stay_note, 0.95);
        // Untouched fields keep their defaults
        assert_eq!(config.hop_length, 256);
        assert_eq!(config.note_range().unwrap().n_notes(), 13);
    }

    #[test]
    fn test_json_malformed() {
        let result = TranscriberConfig::from_json_str("{ not json");
        assert!(matches!(result, Err(ConfigError::Read(_))));
    }
}
