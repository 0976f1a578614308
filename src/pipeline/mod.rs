// Conversion pipeline
// Runs one signal through analysis, decoding, segmentation and quantization,
// attaching the failing stage to every error

pub mod trace;

use serde_json::json;
use std::path::Path;
use thiserror::Error;

use crate::audio::{read_wav_file, AcousticAnalyzer, AnalysisError, AudioError, ReferenceAnalyzer};
use crate::config::{ConfigError, TranscriberConfig};
use crate::hmm::{
    evidence_from_tracks, silence_start, viterbi, DecodeError, FrameEvidence, PriorMatrix,
    StateSequence, TransitionMatrix,
};
use crate::notes::{hop_time, midi_to_hz, segment_states, NoteEvent, NoteRange};
use crate::track::{emit_track, write_midi_file, MidiError, MidiExportOptions, Track};

pub use trace::{read_trace_file, Stage, TraceEntry, TraceError, TraceRecorder, TraceWriter};

/// Pitch search band relative to the note range, as a frequency factor
const BAND_BELOW: f64 = 0.9;
const BAND_ABOVE: f64 = 1.1;

/// A failed conversion, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Acoustic estimation failed during {stage}: {source}")]
    Estimation {
        stage: Stage,
        #[source]
        source: AnalysisError,
    },

    #[error("Decoding failed: {0}")]
    Decode(#[from] DecodeError),

    #[error("Failed to read audio: {0}")]
    Audio(#[from] AudioError),

    #[error("MIDI export failed: {0}")]
    Export(#[from] MidiError),

    #[error("Failed to write trace: {0}")]
    Trace(#[from] TraceError),
}

impl PipelineError {
    /// The stage that raised this error
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::Config(_) => Stage::Config,
            PipelineError::Estimation { stage, .. } => *stage,
            PipelineError::Decode(_) => Stage::Decode,
            PipelineError::Audio(_) => Stage::Ingest,
            PipelineError::Export(_) | PipelineError::Trace(_) => Stage::Export,
        }
    }

    /// True when the input or configuration was at fault rather than the
    /// model itself
    pub fn is_input_error(&self) -> bool {
        !matches!(self, PipelineError::Decode(_) | PipelineError::Trace(_))
    }
}

fn estimation(stage: Stage) -> impl FnOnce(AnalysisError) -> PipelineError {
    move |source| PipelineError::Estimation { stage, source }
}

/// Decoded notes for one signal, before tempo quantization
#[derive(Debug, Clone)]
pub struct Transcription {
    pub range: NoteRange,
    pub states: StateSequence,
    pub notes: Vec<NoteEvent>,
    pub trace: Vec<TraceEntry>,
}

/// Full result of converting one signal
#[derive(Debug, Clone)]
pub struct Conversion {
    pub notes: Vec<NoteEvent>,
    pub bpm: f64,
    pub track: Track,
    pub n_frames: usize,
    pub trace: Vec<TraceEntry>,
}

/// Decode precomputed frame evidence into note events
///
/// `sample_rate` and `config.hop_length` give the duration of one frame.
pub fn transcribe(
    evidence: &[FrameEvidence],
    sample_rate: u32,
    config: &TranscriberConfig,
) -> Result<Transcription, PipelineError> {
    let mut recorder = TraceRecorder::new(None);
    let range = validate(config, &mut recorder)?;
    let (states, notes) = decode(evidence, &range, sample_rate, config, &mut recorder)?;

    Ok(Transcription {
        range,
        states,
        notes,
        trace: recorder.into_entries(),
    })
}

/// Convert a mono signal into a quantized track
pub fn convert<A: AcousticAnalyzer + ?Sized>(
    signal: &[f32],
    sample_rate: u32,
    analyzer: &A,
    config: &TranscriberConfig,
) -> Result<Conversion, PipelineError> {
    convert_traced(signal, sample_rate, analyzer, config, None)
}

/// Convert a mono signal, also appending every trace entry to `writer`
pub fn convert_traced<A: AcousticAnalyzer + ?Sized>(
    signal: &[f32],
    sample_rate: u32,
    analyzer: &A,
    config: &TranscriberConfig,
    writer: Option<&TraceWriter>,
) -> Result<Conversion, PipelineError> {
    let mut recorder = TraceRecorder::new(writer);
    run(signal, sample_rate, analyzer, config, &mut recorder)
}

/// Read a WAV file, convert it with the reference analyzer and write MIDI
pub fn convert_file(
    input: &Path,
    output: &Path,
    config: &TranscriberConfig,
) -> Result<Conversion, PipelineError> {
    convert_file_traced(input, output, config, None)
}

pub fn convert_file_traced(
    input: &Path,
    output: &Path,
    config: &TranscriberConfig,
    writer: Option<&TraceWriter>,
) -> Result<Conversion, PipelineError> {
    log::info!("Converting {} -> {}", input.display(), output.display());

    let mut recorder = TraceRecorder::new(writer);
    let audio = read_wav_file(input)?;
    let signal = audio.to_mono();
    recorder.record(TraceEntry::with_data(
        Stage::Ingest,
        format!("Read {:.2}s of audio", audio.duration_secs()),
        json!({
            "sample_rate": audio.sample_rate,
            "channels": audio.channels,
            "frames": audio.frame_count,
        }),
    ))?;

    let analyzer = ReferenceAnalyzer::from_config(config);
    let mut conversion = run(&signal, audio.sample_rate, &analyzer, config, &mut recorder)?;

    write_midi_file(&conversion.track, output, &MidiExportOptions::default())?;
    recorder.record(TraceEntry::new(
        Stage::Export,
        format!("Wrote {}", output.display()),
    ))?;

    conversion.trace = recorder.into_entries();
    Ok(conversion)
}

fn run<A: AcousticAnalyzer + ?Sized>(
    signal: &[f32],
    sample_rate: u32,
    analyzer: &A,
    config: &TranscriberConfig,
    recorder: &mut TraceRecorder<'_>,
) -> Result<Conversion, PipelineError> {
    let range = validate(config, recorder)?;

    let min_freq = midi_to_hz(range.minimum() as f64) * BAND_BELOW;
    let max_freq = midi_to_hz(range.maximum() as f64) * BAND_ABOVE;
    let pitch = analyzer
        .pitch_track(
            signal,
            min_freq,
            max_freq,
            sample_rate,
            config.frame_length,
            config.window_length,
            config.hop_length,
        )
        .map_err(estimation(Stage::PitchTracking))?;
    let voiced_frames = pitch.voiced.iter().filter(|&&v| v).count();
    recorder.record(TraceEntry::with_data(
        Stage::PitchTracking,
        format!("{} of {} frames voiced", voiced_frames, pitch.len()),
        json!({ "frames": pitch.len(), "voiced": voiced_frames }),
    ))?;

    let onsets = analyzer
        .detect_onsets(signal, sample_rate, config.hop_length)
        .map_err(estimation(Stage::OnsetDetection))?;
    recorder.record(TraceEntry::with_data(
        Stage::OnsetDetection,
        format!("{} onsets", onsets.len()),
        json!({ "onsets": onsets.len() }),
    ))?;

    let evidence = evidence_from_tracks(&pitch.pitches, &pitch.voiced, &onsets)
        .map_err(estimation(Stage::Evidence))?;
    recorder.record(TraceEntry::new(
        Stage::Evidence,
        format!("{} frames of evidence", evidence.len()),
    ))?;

    let (_, notes) = decode(&evidence, &range, sample_rate, config, recorder)?;

    let bpm = analyzer
        .estimate_tempo(signal, sample_rate)
        .map_err(estimation(Stage::TempoEstimation))?;
    if !(bpm.is_finite() && bpm > 0.0) {
        return Err(estimation(Stage::TempoEstimation)(AnalysisError::InvalidTempo(bpm)));
    }
    recorder.record(TraceEntry::with_data(
        Stage::TempoEstimation,
        format!("{:.2} BPM", bpm),
        json!({ "bpm": bpm }),
    ))?;

    let track = emit_track(&notes, bpm, config.ticks_per_quarter, config.velocity)?;
    recorder.record(TraceEntry::with_data(
        Stage::Quantize,
        format!("{} notes over {:.2} quarters", track.notes.len(), track.length_quarters()),
        json!({ "notes": track.notes.len(), "ticks_per_quarter": track.ticks_per_quarter }),
    ))?;

    log::info!(
        "Transcribed {} frames into {} notes at {:.2} BPM",
        evidence.len(),
        track.notes.len(),
        bpm
    );

    Ok(Conversion {
        notes,
        bpm,
        track,
        n_frames: evidence.len(),
        trace: recorder.entries().to_vec(),
    })
}

fn validate(
    config: &TranscriberConfig,
    recorder: &mut TraceRecorder<'_>,
) -> Result<NoteRange, PipelineError> {
    let range = config.validate()?;
    recorder.record(TraceEntry::with_data(
        Stage::Config,
        format!(
            "{} to {}, {} states",
            config.minimum_note,
            config.maximum_note,
            range.n_states()
        ),
        json!({ "minimum": range.minimum(), "maximum": range.maximum() }),
    ))?;
    Ok(range)
}

fn decode(
    evidence: &[FrameEvidence],
    range: &NoteRange,
    sample_rate: u32,
    config: &TranscriberConfig,
    recorder: &mut TraceRecorder<'_>,
) -> Result<(StateSequence, Vec<NoteEvent>), PipelineError> {
    if sample_rate == 0 {
        return Err(PipelineError::Estimation {
            stage: Stage::Segment,
            source: AnalysisError::InvalidSampleRate(sample_rate),
        });
    }

    let transition = TransitionMatrix::build(range, config.p_stay_note, config.p_stay_silence)?;
    recorder.record(TraceEntry::new(
        Stage::Transition,
        format!("{0}x{0} transition matrix", transition.n_states()),
    ))?;

    let priors = PriorMatrix::assemble(evidence, range, &config.emission_params()?);
    recorder.record(TraceEntry::new(
        Stage::Emission,
        format!("{}x{} prior matrix", priors.n_states(), priors.n_frames()),
    ))?;

    let states = viterbi(&transition, &priors, &silence_start(range.n_states()))?;
    recorder.record(TraceEntry::with_data(
        Stage::Decode,
        format!("Decoded {} frames", states.len()),
        json!({ "frames": states.len(), "log_score": states.log_score() }),
    ))?;

    let notes = segment_states(
        states.states(),
        range,
        hop_time(config.hop_length, sample_rate),
    );
    recorder.record(TraceEntry::with_data(
        Stage::Segment,
        format!("{} notes", notes.len()),
        json!({ "notes": notes.len() }),
    ))?;

    Ok((states, notes))
}
