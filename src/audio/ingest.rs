// Audio ingestion module
// Reads WAV files, extracts metadata, and normalizes audio samples

use hound::{SampleFormat, WavReader};
use std::io::{Cursor, Read};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AudioError {
    #[error("Failed to read WAV file: {0}")]
    WavReadError(#[from] hound::Error),

    #[error("Unsupported audio format: {0}")]
    UnsupportedFormat(String),

    #[error("Invalid audio data")]
    InvalidData,
}

#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples normalized to f32 in range [-1.0, 1.0], interleaved
    pub samples: Vec<f32>,

    /// Sample rate in Hz (e.g., 22050, 44100)
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Bit depth of original audio (8, 16, 24, 32)
    pub bit_depth: u16,

    /// Total number of frames (samples / channels)
    pub frame_count: usize,
}

impl AudioData {
    /// Get duration in seconds
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.frame_count as f64 / self.sample_rate as f64
    }

    /// Convert to mono by averaging channels
    pub fn to_mono(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let channels = self.channels as usize;
        self.samples
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    }
}

/// Ingest a WAV file from disk
pub fn read_wav_file(path: &Path) -> Result<AudioData, AudioError> {
    let reader = WavReader::open(path)?;
    decode(reader)
}

/// Ingest a WAV file from raw bytes
/// Returns AudioData with normalized samples and metadata
pub fn ingest_wav(data: &[u8]) -> Result<AudioData, AudioError> {
    let reader = WavReader::new(Cursor::new(data))?;
    decode(reader)
}

fn decode<R: Read>(mut reader: WavReader<R>) -> Result<AudioData, AudioError> {
    let spec = reader.spec();
    let sample_rate = spec.sample_rate;
    let channels = spec.channels;
    let bit_depth = spec.bits_per_sample;
    let sample_format = spec.sample_format;

    if channels == 0 || sample_rate == 0 {
        return Err(AudioError::InvalidData);
    }

    // Read and normalize samples to f32 [-1.0, 1.0]
    let samples: Vec<f32> = match (sample_format, bit_depth) {
        (SampleFormat::Int, 8) => {
            // hound yields 8-bit PCM already centered on zero
            reader
                .samples::<i8>()
                .map(|s| s.map(|s| s as f32 / 128.0))
                .collect::<Result<_, _>>()?
        }
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|s| s as f32 / 32768.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 8388608.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|s| s as f32 / 2147483648.0))
            .collect::<Result<_, _>>()?,
        (SampleFormat::Float, 32) => reader.samples::<f32>().collect::<Result<_, _>>()?,
        _ => {
            return Err(AudioError::UnsupportedFormat(format!(
                "{:?} {}-bit audio",
                sample_format, bit_depth
            )));
        }
    };

    let frame_count = samples.len() / channels as usize;

    log::debug!(
        "Ingested WAV: {} Hz, {} channels, {} bit, {} frames",
        sample_rate,
        channels,
        bit_depth,
        frame_count
    );

    Ok(AudioData {
        samples,
        sample_rate,
        channels,
        bit_depth,
        frame_count,
    })
}
