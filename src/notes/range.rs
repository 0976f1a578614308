// Note range model
// Maps a contiguous MIDI note range onto the HMM state space:
// state 0 = silence, 2i+1 = onset of note i, 2i+2 = sustain of note i

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;

/// Role of a single HMM state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateKind {
    Silence,
    /// First frame of note `i` (index into the range, not a MIDI number)
    Onset(usize),
    /// Any later frame of note `i`
    Sustain(usize),
}

/// Contiguous range of MIDI notes supported by one model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteRange {
    minimum: i32,
    maximum: i32,
}

impl NoteRange {
    /// Create a range; both bounds are MIDI numbers and inclusive
    pub fn new(minimum: i32, maximum: i32) -> Result<Self, ConfigError> {
        for bound in [minimum, maximum] {
            if !(0..=127).contains(&bound) {
                return Err(ConfigError::NoteOutOfRange(bound));
            }
        }
        if minimum > maximum {
            return Err(ConfigError::InvalidNoteRange { minimum, maximum });
        }
        Ok(NoteRange { minimum, maximum })
    }

    pub fn minimum(&self) -> i32 {
        self.minimum
    }

    pub fn maximum(&self) -> i32 {
        self.maximum
    }

    /// Number of notes in the range (always >= 1)
    pub fn n_notes(&self) -> usize {
        (self.maximum - self.minimum + 1) as usize
    }

    /// Number of HMM states: one silence plus onset/sustain per note
    pub fn n_states(&self) -> usize {
        2 * self.n_notes() + 1
    }

    pub fn onset_state(&self, note_index: usize) -> usize {
        2 * note_index + 1
    }

    pub fn sustain_state(&self, note_index: usize) -> usize {
        2 * note_index + 2
    }

    /// MIDI number of the note at `note_index`
    pub fn pitch_of(&self, note_index: usize) -> i32 {
        self.minimum + note_index as i32
    }

    /// Classify a state index; None when out of bounds
    pub fn state_kind(&self, state: usize) -> Option<StateKind> {
        if state >= self.n_states() {
            return None;
        }
        Some(match state {
            0 => StateKind::Silence,
            s if s % 2 == 1 => StateKind::Onset((s - 1) / 2),
            s => StateKind::Sustain((s - 2) / 2),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_note_range() {
        let range = NoteRange::new(60, 60).unwrap();
        assert_eq!(range.n_notes(), 1);
        assert_eq!(range.n_states(), 3);
        assert_eq!(range.state_kind(0), Some(StateKind::Silence));
        assert_eq!(range.state_kind(1), Some(StateKind::Onset(0)));
        assert_eq!(range.state_kind(2), Some(StateKind::Sustain(0)));
        assert_eq!(range.state_kind(3), None);
    }

    #[test]
    fn test_state_mapping() {
        let range = NoteRange::new(45, 88).unwrap();
        assert_eq!(range.n_notes(), 44);
        assert_eq!(range.n_states(), 89);

        for i in 0..range.n_notes() {
            assert_eq!(range.state_kind(range.onset_state(i)), Some(StateKind::Onset(i)));
            assert_eq!(range.state_kind(range.sustain_state(i)), Some(StateKind::Sustain(i)));
        }
        assert_eq!(range.pitch_of(0), 45);
        assert_eq!(range.pitch_of(43), 88);
    }

    #[test]
    fn test_invalid_ranges() {
        assert_eq!(
            NoteRange::new(61, 60),
            Err(ConfigError::InvalidNoteRange {
                minimum: 61,
                maximum: 60
            })
        );
        assert_eq!(NoteRange::new(-1, 60), Err(ConfigError::NoteOutOfRange(-1)));
        assert_eq!(NoteRange::new(0, 128), Err(ConfigError::NoteOutOfRange(128)));
    }
}
