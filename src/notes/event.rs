// Note event
// A single segmented note in seconds, before tempo quantization

use serde::{Deserialize, Serialize};

use super::names::midi_to_note;

/// A transcribed note with absolute timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Start of the note in seconds from the start of the signal
    pub onset_time: f64,

    /// End of the note in seconds, always after `onset_time`
    pub offset_time: f64,

    /// MIDI note number
    pub pitch: i32,

    /// Pitch name derived from `pitch`, e.g. "A#4"
    pub label: String,
}

impl NoteEvent {
    /// Create an event, deriving the label from the pitch
    pub fn new(onset_time: f64, offset_time: f64, pitch: i32) -> Self {
        NoteEvent {
            onset_time,
            offset_time,
            pitch,
            label: midi_to_note(pitch),
        }
    }

    /// Duration in seconds
    pub fn duration(&self) -> f64 {
        self.offset_time - self.onset_time
    }
}
