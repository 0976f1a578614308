// Tempo quantization
// Converts seconds-based note events into quarter-note units at a single,
// whole-signal tempo

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::notes::NoteEvent;

/// Velocity used when nothing else is specified
pub const DEFAULT_VELOCITY: u8 = 100;

/// A note positioned in quarter notes from the start of the track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedNote {
    /// MIDI note number
    pub pitch: i32,

    /// Start, in quarter notes
    pub onset: f64,

    /// Length, in quarter notes
    pub duration: f64,

    /// MIDI velocity
    pub velocity: u8,
}

impl QuantizedNote {
    /// End, in quarter notes
    pub fn offset(&self) -> f64 {
        self.onset + self.duration
    }
}

/// Length of one quarter note in seconds
pub fn quarter_note_duration(bpm: f64) -> Result<f64, ConfigError> {
    if !(bpm.is_finite() && bpm > 0.0) {
        return Err(ConfigError::NotPositive {
            name: "tempo_bpm",
            value: bpm,
        });
    }
    Ok(60.0 / bpm)
}

/// Quantize note events to quarter-note units, preserving order
pub fn quantize_notes(
    events: &[NoteEvent],
    bpm: f64,
    velocity: u8,
) -> Result<Vec<QuantizedNote>, ConfigError> {
    let quarter = quarter_note_duration(bpm)?;

    Ok(events
        .iter()
        .map(|event| QuantizedNote {
            pitch: event.pitch,
            onset: event.onset_time / quarter,
            duration: event.duration() / quarter,
            velocity,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quarter_note_duration() {
        assert!((quarter_note_duration(120.0).unwrap() - 0.5).abs() < 1e-12);
        assert!((quarter_note_duration(60.0).unwrap() - 1.0).abs() < 1e-12);
        assert!(quarter_note_duration(0.0).is_err());
        assert!(quarter_note_duration(-90.0).is_err());
        assert!(quarter_note_duration(f64::INFINITY).is_err());
    }

    #[test]
    fn test_quantize_at_120_bpm() {
        let events = vec![NoteEvent::new(1.0, 1.5, 64)];
        let notes = quantize_notes(&events, 120.0, DEFAULT_VELOCITY).unwrap();

        assert_eq!(notes.len(), 1);
        assert!((notes[0].onset - 2.0).abs() < 1e-12);
        assert!((notes[0].duration - 1.0).abs() < 1e-12);
        assert_eq!(notes[0].pitch, 64);
        assert_eq!(notes[0].velocity, 100);
    }

    #[test]
    fn test_order_preserved() {
        let events = vec![
            NoteEvent::new(0.0, 0.25, 60),
            NoteEvent::new(0.25, 0.75, 62),
            NoteEvent::new(1.0, 2.0, 59),
        ];
        let notes = quantize_notes(&events, 90.0, 80).unwrap();

        let pitches: Vec<i32> = notes.iter().map(|n| n.pitch).collect();
        assert_eq!(pitches, vec![60, 62, 59]);
        // 90 BPM: quarter = 2/3 s
        assert!((notes[2].onset - 1.5).abs() < 1e-12);
        assert!((notes[2].offset() - 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert!(quantize_notes(&[], 120.0, DEFAULT_VELOCITY).unwrap().is_empty());
    }
}
