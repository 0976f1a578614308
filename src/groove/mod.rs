// Groove - tempo estimation and tempo quantization
// Maps absolute note timing into tempo-relative quarter-note units

pub mod quantize;
pub mod tempo;

pub use quantize::{quantize_notes, quarter_note_duration, QuantizedNote, DEFAULT_VELOCITY};
pub use tempo::{estimate_tempo_from_onsets, TempoConfig, TempoEstimate, FALLBACK_BPM};
