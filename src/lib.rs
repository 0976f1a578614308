// Monoscribe - Monophonic audio to MIDI transcription
// Module declarations and the public surface

pub mod audio;
pub mod config;
pub mod groove;
pub mod hmm;
pub mod notes;
pub mod pipeline;
pub mod track;

pub use audio::{AcousticAnalyzer, AnalysisError, PitchTrack, ReferenceAnalyzer};
pub use config::{ConfigError, TranscriberConfig};
pub use hmm::{DecodeError, FrameEvidence, StateSequence};
pub use notes::{NoteEvent, NoteRange};
pub use pipeline::{
    convert, convert_file, convert_file_traced, convert_traced, transcribe, Conversion,
    PipelineError, Stage, Transcription,
};
pub use track::{export_midi, read_track, MidiError, MidiExportOptions, Track};
