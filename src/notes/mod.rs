// Note model
// Note naming, the note range state space, and segmentation into note events

pub mod event;
pub mod names;
pub mod range;
pub mod segment;

pub use event::NoteEvent;
pub use names::{hz_to_midi, midi_to_hz, midi_to_note, note_to_midi};
pub use range::{NoteRange, StateKind};
pub use segment::{hop_time, segment_states};
