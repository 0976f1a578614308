// Reference acoustic analyzer
// McLeod pitch tracking, spectral-flux onsets and IOI tempo estimation
// behind the AcousticAnalyzer trait

use super::onsets::{detect_onset_frames, OnsetConfig};
use super::pitch::{track_pitch, PitchConfig};
use super::{AcousticAnalyzer, AnalysisError, PitchTrack};
use crate::config::TranscriberConfig;
use crate::groove::{estimate_tempo_from_onsets, TempoConfig};

/// Hop used for the onset envelope feeding the tempo estimate
const TEMPO_HOP: usize = 512;

/// The analyzer used by file conversion
#[derive(Debug, Clone)]
pub struct ReferenceAnalyzer {
    /// Minimum clarity for a voiced frame
    pub clarity_threshold: f64,

    /// Onset detection settings; the hop is supplied per call
    pub onsets: OnsetConfig,

    pub tempo: TempoConfig,
}

impl Default for ReferenceAnalyzer {
    fn default() -> Self {
        Self::from_config(&TranscriberConfig::default())
    }
}

impl ReferenceAnalyzer {
    pub fn from_config(config: &TranscriberConfig) -> Self {
        ReferenceAnalyzer {
            clarity_threshold: config.clarity_threshold,
            onsets: OnsetConfig {
                window_size: config.frame_length,
                hop_size: config.hop_length,
                threshold_factor: config.onset_threshold,
                ..OnsetConfig::default()
            },
            tempo: TempoConfig {
                min_onsets: config.min_tempo_onsets,
                ..TempoConfig::default()
            },
        }
    }
}

impl AcousticAnalyzer for ReferenceAnalyzer {
    fn pitch_track(
        &self,
        signal: &[f32],
        min_freq: f64,
        max_freq: f64,
        sample_rate: u32,
        frame_length: usize,
        window_length: usize,
        hop_length: usize,
    ) -> Result<PitchTrack, AnalysisError> {
        let config = PitchConfig {
            min_freq,
            max_freq,
            frame_length,
            window_length,
            hop_length,
            clarity_threshold: self.clarity_threshold,
        };
        track_pitch(signal, sample_rate, &config)
    }

    fn detect_onsets(
        &self,
        signal: &[f32],
        sample_rate: u32,
        hop_length: usize,
    ) -> Result<Vec<usize>, AnalysisError> {
        let config = OnsetConfig {
            hop_size: hop_length,
            ..self.onsets.clone()
        };
        detect_onset_frames(signal, sample_rate, &config)
    }

    fn estimate_tempo(&self, signal: &[f32], sample_rate: u32) -> Result<f64, AnalysisError> {
        let config = OnsetConfig {
            hop_size: TEMPO_HOP,
            ..self.onsets.clone()
        };
        let frames = detect_onset_frames(signal, sample_rate, &config)?;
        let times: Vec<f64> = frames
            .iter()
            .map(|&f| (f * TEMPO_HOP) as f64 / sample_rate as f64)
            .collect();

        let estimate = estimate_tempo_from_onsets(&times, &self.tempo);
        log::debug!(
            "Tempo estimate {:.2} BPM (confidence {:.2}) from {} onsets",
            estimate.bpm,
            estimate.confidence,
            times.len()
        );
        Ok(estimate.bpm)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groove::FALLBACK_BPM;

    const SAMPLE_RATE: u32 = 22050;

    /// Decaying tone bursts every `period` seconds
    fn clicks(period: f64, count: usize) -> Vec<f32> {
        let step = (period * SAMPLE_RATE as f64) as usize;
        let burst = 2205;
        let mut signal = vec![0.0f32; step * (count + 1)];
        for k in 0..count {
            let start = step * (k + 1) - step / 2;
            for i in 0..burst {
                let phase = 2.0 * std::f64::consts::PI * 440.0 * i as f64 / SAMPLE_RATE as f64;
                let envelope = (-(i as f64) / 441.0).exp();
                signal[start + i] = (0.5 * envelope * phase.sin()) as f32;
            }
        }
        signal
    }

    #[test]
    fn test_from_config() {
        let config = TranscriberConfig {
            clarity_threshold: 0.7,
            onset_threshold: 2.0,
            min_tempo_onsets: 6,
            ..Default::default()
        };
        let analyzer = ReferenceAnalyzer::from_config(&config);

        assert_eq!(analyzer.clarity_threshold, 0.7);
        assert_eq!(analyzer.onsets.threshold_factor, 2.0);
        assert_eq!(analyzer.onsets.window_size, 2048);
        assert_eq!(analyzer.tempo.min_onsets, 6);
    }

    #[test]
    fn test_pitch_track_frame_count() {
        let signal = vec![0.0f32; 5000];
        let track = ReferenceAnalyzer::default()
            .pitch_track(&signal, 99.0, 1450.0, SAMPLE_RATE, 2048, 1024, 256)
            .unwrap();
        assert_eq!(track.len(), 1 + 5000 / 256);
        assert_eq!(track.voiced.len(), track.len());
    }

    #[test]
    fn test_silent_signal_falls_back_to_default_tempo() {
        let signal = vec![0.0f32; SAMPLE_RATE as usize * 2];
        let bpm = ReferenceAnalyzer::default()
            .estimate_tempo(&signal, SAMPLE_RATE)
            .unwrap();
        assert_eq!(bpm, FALLBACK_BPM);
    }

    #[test]
    fn test_regular_bursts_give_plausible_tempo() {
        // One burst every 0.5 s is 120 BPM, or a multiple of it
        let signal = clicks(0.5, 12);
        let bpm = ReferenceAnalyzer::default()
            .estimate_tempo(&signal, SAMPLE_RATE)
            .unwrap();
        assert!((60.0..=180.0).contains(&bpm));
        assert!((bpm - 120.0).abs() < 8.0 || (bpm - 60.0).abs() < 4.0, "{}", bpm);
    }
}
