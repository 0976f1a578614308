// Track - Quantized, monophonic note track
// The final product of a conversion, consumed by the MIDI encoder

pub mod midi;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::groove::quantize::{quantize_notes, QuantizedNote};
use crate::notes::NoteEvent;

pub use midi::{export_midi, read_track, write_midi_file, MidiError, MidiExportOptions};

/// Default time resolution, matching the MIDI files the tool has always written
pub const DEFAULT_TICKS_PER_QUARTER: u16 = 1024;

/// Tempo meta event; `time` is in quarter notes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TempoEvent {
    pub time: f64,
    pub bpm: f64,
}

/// A monophonic track with one tempo for the whole signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// The single tempo event, always at time 0
    pub tempo: TempoEvent,

    /// Time resolution used when the track is written to MIDI
    pub ticks_per_quarter: u16,

    /// Notes sorted by onset, never overlapping
    pub notes: Vec<QuantizedNote>,
}

impl Track {
    /// An empty track holding only its tempo event
    pub fn new(bpm: f64, ticks_per_quarter: u16) -> Self {
        Track {
            tempo: TempoEvent { time: 0.0, bpm },
            ticks_per_quarter,
            notes: Vec::new(),
        }
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo.bpm
    }

    /// Convert quarter notes into ticks at this track's resolution
    pub fn to_ticks(&self, quarters: f64) -> u32 {
        (quarters * self.ticks_per_quarter as f64).round().max(0.0) as u32
    }

    /// (pitch, onset, duration) of every note, in order
    pub fn note_tuples(&self) -> Vec<(i32, f64, f64)> {
        self.notes
            .iter()
            .map(|n| (n.pitch, n.onset, n.duration))
            .collect()
    }

    /// Check ordering and the one-note-at-a-time invariant
    pub fn is_monophonic(&self) -> bool {
        self.notes
            .windows(2)
            .all(|pair| pair[1].onset >= pair[0].offset() - 1e-9)
    }

    /// Length in quarter notes, up to the end of the last note
    pub fn length_quarters(&self) -> f64 {
        self.notes.last().map_or(0.0, |n| n.offset())
    }
}

/// Build a track from seconds-based note events at one tempo
pub fn emit_track(
    events: &[NoteEvent],
    bpm: f64,
    ticks_per_quarter: u16,
    velocity: u8,
) -> Result<Track, ConfigError> {
    if ticks_per_quarter == 0 {
        return Err(ConfigError::NotPositive {
            name: "ticks_per_quarter",
            value: 0.0,
        });
    }

    let mut track = Track::new(bpm, ticks_per_quarter);
    track.notes = quantize_notes(events, bpm, velocity)?;

    log::debug!(
        "Emitted track: {} notes at {:.2} BPM, {} ticks per quarter",
        track.notes.len(),
        bpm,
        ticks_per_quarter
    );

    Ok(track)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::groove::DEFAULT_VELOCITY;
    use crate::notes::{segment_states, NoteRange};

    #[test]
    fn test_empty_track_has_only_tempo() {
        let track = emit_track(&[], 120.0, DEFAULT_TICKS_PER_QUARTER, DEFAULT_VELOCITY).unwrap();

        assert!(track.notes.is_empty());
        assert_eq!(track.tempo, TempoEvent { time: 0.0, bpm: 120.0 });
        assert_eq!(track.length_quarters(), 0.0);
    }

    #[test]
    fn test_emit_track() {
        let events = vec![NoteEvent::new(1.0, 1.5, 60), NoteEvent::new(1.5, 2.25, 62)];
        let track = emit_track(&events, 120.0, 480, DEFAULT_VELOCITY).unwrap();

        assert_eq!(track.notes.len(), 2);
        assert_eq!(track.note_tuples(), vec![(60, 2.0, 1.0), (62, 3.0, 1.5)]);
        assert!(track.is_monophonic());
        assert_eq!(track.to_ticks(track.notes[1].onset), 1440);
        assert!((track.length_quarters() - 4.5).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_tempo_and_resolution() {
        let events = vec![NoteEvent::new(0.0, 1.0, 60)];
        assert!(emit_track(&events, 0.0, 480, DEFAULT_VELOCITY).is_err());
        assert!(emit_track(&events, 120.0, 0, DEFAULT_VELOCITY).is_err());
    }

    #[test]
    fn test_segmented_notes_round_trip_through_track() {
        let range = NoteRange::new(60, 64).unwrap();
        let states = [0, 1, 2, 2, 2, 5, 6, 6, 0, 0, 9, 10, 10];
        let hop = 0.125;
        let events = segment_states(&states, &range, hop);

        let track = emit_track(&events, 100.0, DEFAULT_TICKS_PER_QUARTER, DEFAULT_VELOCITY).unwrap();
        assert!(track.is_monophonic());

        let quarter = 60.0 / 100.0;
        let expected: Vec<(i32, f64, f64)> = events
            .iter()
            .map(|e| (e.pitch, e.onset_time / quarter, (e.offset_time - e.onset_time) / quarter))
            .collect();
        assert_eq!(track.note_tuples().len(), expected.len());
        for (got, want) in track.note_tuples().iter().zip(&expected) {
            assert_eq!(got.0, want.0);
            assert!((got.1 - want.1).abs() < 1e-12);
            assert!((got.2 - want.2).abs() < 1e-12);
        }
    }
}
