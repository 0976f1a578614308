// Segmenter
// Walks a decoded state path with a silence/attack/sustain state machine
// and emits one NoteEvent per attacked note

use super::event::NoteEvent;
use super::range::{NoteRange, StateKind};

/// Phase of the segmenter while scanning the path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// No note sounding
    Silence,
    /// The previous frame was an onset frame
    Attack,
    /// A note is sounding past its attack frame
    Sustain,
}

/// Note currently being held open
struct OpenNote {
    onset_time: f64,
    pitch: i32,
}

/// Seconds between two analysis frames
pub fn hop_time(hop_length: usize, sample_rate: u32) -> f64 {
    hop_length as f64 / sample_rate as f64
}

/// Convert a decoded state path into ordered note events
///
/// The frame after an onset always belongs to the attacked note, whatever
/// its state. A silence frame is appended after the last real frame so a
/// note that is still sounding at the end of the path is closed; a note
/// attacked on the final frame ends at `states.len() * hop_time`.
/// State indices outside the range are treated as silence.
pub fn segment_states(states: &[usize], range: &NoteRange, hop_time: f64) -> Vec<NoteEvent> {
    let mut output = Vec::new();
    let mut phase = Phase::Silence;
    let mut open: Option<OpenNote> = None;

    let terminal = std::iter::once(0usize);
    for (frame, state) in states.iter().copied().chain(terminal).enumerate() {
        let time = frame as f64 * hop_time;
        let kind = range.state_kind(state).unwrap_or_else(|| {
            log::warn!("State {} at frame {} is outside the model, treating as silence", state, frame);
            StateKind::Silence
        });

        phase = match (phase, kind) {
            (Phase::Silence, StateKind::Onset(i)) => {
                open = Some(OpenNote {
                    onset_time: time,
                    pitch: range.pitch_of(i),
                });
                Phase::Attack
            }
            (Phase::Silence, _) => Phase::Silence,

            // A second onset right after an attack is ignored
            (Phase::Attack, StateKind::Onset(_)) => Phase::Attack,
            (Phase::Attack, StateKind::Silence | StateKind::Sustain(_)) => Phase::Sustain,

            // Re-attack: close the sounding note and open the new one
            (Phase::Sustain, StateKind::Onset(i)) => {
                if let Some(note) = open.take() {
                    output.push(NoteEvent::new(note.onset_time, time, note.pitch));
                }
                open = Some(OpenNote {
                    onset_time: time,
                    pitch: range.pitch_of(i),
                });
                Phase::Attack
            }

            (Phase::Sustain, StateKind::Silence) => {
                if let Some(note) = open.take() {
                    output.push(NoteEvent::new(note.onset_time, time, note.pitch));
                }
                Phase::Silence
            }

            (Phase::Sustain, StateKind::Sustain(_)) => Phase::Sustain,
        };
    }

    // Attacked on the last real frame; the terminal frame only ended the attack
    if let Some(note) = open {
        output.push(NoteEvent::new(
            note.onset_time,
            states.len() as f64 * hop_time,
            note.pitch,
        ));
    }

    output
}
