// Onset detection
// Spectral flux over centered frames, adaptive peak picking and
// backtracking to the start of each rise

use realfft::{RealFftPlanner, RealToComplex};

use super::{centered_frame, check_signal, frame_count, AnalysisError};

/// Configuration for onset detection
#[derive(Debug, Clone)]
pub struct OnsetConfig {
    /// FFT window size in samples
    pub window_size: usize,

    /// Hop size in samples (advance between frames)
    pub hop_size: usize,

    /// Threshold multiplier for adaptive peak picking
    /// Threshold = mean(flux) + threshold_factor * std(flux)
    pub threshold_factor: f32,

    /// Minimum time between onsets in milliseconds
    pub min_onset_gap_ms: f64,

    /// Move each peak back to the preceding flux minimum
    pub backtrack: bool,
}

impl Default for OnsetConfig {
    fn default() -> Self {
        OnsetConfig {
            window_size: 2048,
            hop_size: 256,
            threshold_factor: 1.5,
            min_onset_gap_ms: 30.0,
            backtrack: true,
        }
    }
}

/// Frame indices at which notes start, ascending and deduplicated
pub fn detect_onset_frames(
    signal: &[f32],
    sample_rate: u32,
    config: &OnsetConfig,
) -> Result<Vec<usize>, AnalysisError> {
    check_signal(signal, sample_rate, config.hop_size)?;
    if config.window_size < 2 {
        return Err(AnalysisError::InvalidParameter {
            name: "window_size",
            value: config.window_size as f64,
        });
    }

    let flux = spectral_flux(signal, config)?;
    let peaks = pick_peaks(&flux, sample_rate, config);

    let mut frames: Vec<usize> = if config.backtrack {
        peaks.iter().map(|&p| backtrack(&flux, p)).collect()
    } else {
        peaks
    };
    frames.dedup();

    log::debug!("Detected {} onsets in {} frames", frames.len(), flux.len());
    Ok(frames)
}

/// Sum of positive magnitude differences between consecutive frames
pub fn spectral_flux(signal: &[f32], config: &OnsetConfig) -> Result<Vec<f32>, AnalysisError> {
    let size = config.window_size;
    let n_frames = frame_count(signal.len(), config.hop_size);

    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(size);
    let mut input = fft.make_input_vec();
    let mut spectrum = fft.make_output_vec();
    let window = hann_window(size);

    let mut flux = Vec::with_capacity(n_frames);
    let mut previous: Option<Vec<f64>> = None;

    for t in 0..n_frames {
        centered_frame(signal, t * config.hop_size, size, &mut input);
        for (sample, w) in input.iter_mut().zip(&window) {
            *sample *= w;
        }

        fft.process(&mut input, &mut spectrum)
            .map_err(|e| AnalysisError::Fft(e.to_string()))?;
        let magnitudes: Vec<f64> = spectrum.iter().map(|c| c.norm()).collect();

        let frame_flux = match &previous {
            Some(prev) => magnitudes
                .iter()
                .zip(prev)
                .map(|(curr, prev)| (curr - prev).max(0.0))
                .sum::<f64>(),
            None => 0.0,
        };

        flux.push(frame_flux as f32);
        previous = Some(magnitudes);
    }

    Ok(flux)
}

fn hann_window(n: usize) -> Vec<f64> {
    (0..n)
        .map(|i| 0.5 * (1.0 - (2.0 * std::f64::consts::PI * i as f64 / n as f64).cos()))
        .collect()
}

/// Local maxima above the adaptive threshold, at least the minimum gap apart
fn pick_peaks(flux: &[f32], sample_rate: u32, config: &OnsetConfig) -> Vec<usize> {
    if flux.len() < 3 {
        return Vec::new();
    }

    let mean = flux.iter().sum::<f32>() / flux.len() as f32;
    let variance = flux.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / flux.len() as f32;
    let threshold = mean + config.threshold_factor * variance.sqrt();

    let min_gap_samples = (config.min_onset_gap_ms * sample_rate as f64 / 1000.0) as usize;
    let min_gap_frames = min_gap_samples / config.hop_size;

    let mut peaks = Vec::new();
    let mut last: Option<usize> = None;

    for i in 1..flux.len() - 1 {
        let is_peak = flux[i] > flux[i - 1] && flux[i] >= flux[i + 1];
        let gap_ok = last.map_or(true, |l| i - l >= min_gap_frames);

        if is_peak && flux[i] > threshold && gap_ok {
            peaks.push(i);
            last = Some(i);
        }
    }

    peaks
}

/// Walk back from a peak while the flux keeps falling
fn backtrack(flux: &[f32], peak: usize) -> usize {
    let mut frame = peak;
    while frame > 0 && flux[frame - 1] < flux[frame] {
        frame -= 1;
    }
    frame
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_RATE: u32 = 22050;

    fn tone(freq: f64, n: usize) -> impl Iterator<Item = f32> {
        (0..n).map(move |i| {
            (0.5 * (2.0 * std::f64::consts::PI * freq * i as f64 / SAMPLE_RATE as f64).sin()) as f32
        })
    }

    #[test]
    fn test_hann_window() {
        let window = hann_window(4);
        assert_eq!(window[0], 0.0);
        assert!((window[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_silence_has_no_onsets() {
        let signal = vec![0.0f32; SAMPLE_RATE as usize];
        let onsets = detect_onset_frames(&signal, SAMPLE_RATE, &OnsetConfig::default()).unwrap();
        assert!(onsets.is_empty());
    }

    #[test]
    fn test_detects_note_starts() {
        // Silence, a note at 11264, silence, another note at 22528
        let first = 11264;
        let second = 22528;
        let mut signal = vec![0.0f32; first];
        signal.extend(tone(220.0, 7680));
        signal.resize(second, 0.0);
        signal.extend(tone(330.0, 8192));

        let config = OnsetConfig::default();
        let onsets = detect_onset_frames(&signal, SAMPLE_RATE, &config).unwrap();

        let near = |start: usize| {
            let center = start / config.hop_size;
            onsets.iter().any(|&f| f + 8 >= center && f <= center + 1)
        };
        assert!(near(first), "{:?}", onsets);
        assert!(near(second), "{:?}", onsets);
        assert!(onsets.iter().all(|&f| f >= (first - config.window_size) / config.hop_size));
        assert!(onsets.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_backtrack_stops_at_minimum() {
        let flux = [0.0, 0.5, 0.2, 0.4, 0.9, 1.0, 0.3];
        assert_eq!(backtrack(&flux, 5), 2);
        assert_eq!(backtrack(&flux, 1), 0);
    }

    #[test]
    fn test_pick_peaks_respects_gap() {
        let flux = [0.0, 5.0, 0.0, 5.0, 0.0, 0.0, 0.0, 0.0, 0.0, 5.0, 0.0];
        let config = OnsetConfig {
            hop_size: 256,
            threshold_factor: 0.5,
            // 3 frames at 22050 Hz
            min_onset_gap_ms: 3.0 * 256.0 * 1000.0 / 22050.0 + 0.01,
            ..Default::default()
        };
        assert_eq!(pick_peaks(&flux, SAMPLE_RATE, &config), vec![1, 9]);
    }
}
