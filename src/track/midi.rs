// MIDI Export - Convert tracks to Standard MIDI Files using midly crate
// Writes a tempo/meta track plus one note track, and parses such files back

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, Track as MidiTrack, TrackEvent,
    TrackEventKind,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use super::Track;
use crate::groove::quantize::QuantizedNote;

/// Errors from encoding or decoding MIDI data
#[derive(Debug, Error)]
pub enum MidiError {
    #[error("Failed to write MIDI: {0}")]
    Write(String),

    #[error("Failed to parse MIDI: {0}")]
    Parse(String),

    #[error("Pitch {0} cannot be encoded as a MIDI key")]
    InvalidPitch(i32),

    #[error("MIDI channel {0} is outside 0-15")]
    InvalidChannel(u8),

    #[error("Unsupported MIDI timing: {0}")]
    UnsupportedTiming(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// MIDI export options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MidiExportOptions {
    /// Name written on the note track, if any
    pub track_name: Option<String>,

    /// MIDI channel (0-15) for the notes
    pub channel: u8,
}

impl Default for MidiExportOptions {
    fn default() -> Self {
        MidiExportOptions {
            track_name: Some("Transcription".to_string()),
            channel: 0,
        }
    }
}

/// Export a track to MIDI file bytes
///
/// Track 0 carries the tempo, track 1 the notes. Note times are rounded to
/// the nearest tick at the track's resolution.
pub fn export_midi(track: &Track, options: &MidiExportOptions) -> Result<Vec<u8>, MidiError> {
    if track.ticks_per_quarter == 0 || track.ticks_per_quarter > 0x7FFF {
        return Err(MidiError::UnsupportedTiming(format!(
            "{} ticks per quarter",
            track.ticks_per_quarter
        )));
    }
    if options.channel > 15 {
        return Err(MidiError::InvalidChannel(options.channel));
    }

    let header = Header {
        format: Format::Parallel,
        timing: Timing::Metrical(track.ticks_per_quarter.into()),
    };

    // Track 0: tempo metadata
    let mut meta_track = MidiTrack::new();
    add_tempo(&mut meta_track, 0, track.tempo_bpm());
    add_end_of_track(&mut meta_track, 0);

    let note_track = create_note_track(track, options)?;

    let smf = Smf {
        header,
        tracks: vec![meta_track, note_track],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| MidiError::Write(e.to_string()))?;

    Ok(bytes)
}

/// Export a track and write it to `path`
pub fn write_midi_file(
    track: &Track,
    path: &Path,
    options: &MidiExportOptions,
) -> Result<(), MidiError> {
    let bytes = export_midi(track, options)?;
    std::fs::write(path, &bytes)?;
    log::info!("Wrote {} bytes of MIDI to {}", bytes.len(), path.display());
    Ok(())
}

/// Create the note track: NoteOn/NoteOff pairs, sorted by absolute tick
fn create_note_track<'a>(
    track: &Track,
    options: &'a MidiExportOptions,
) -> Result<MidiTrack<'a>, MidiError> {
    let channel = options.channel;
    let mut events: Vec<(u32, TrackEventKind<'a>)> = Vec::new();

    if let Some(name) = &options.track_name {
        events.push((0, TrackEventKind::Meta(MetaMessage::TrackName(name.as_bytes()))));
    }

    for note in &track.notes {
        let key = u8::try_from(note.pitch)
            .ok()
            .filter(|k| *k <= 127)
            .ok_or(MidiError::InvalidPitch(note.pitch))?;
        let tick_on = track.to_ticks(note.onset);
        let tick_off = track.to_ticks(note.offset()).max(tick_on + 1);

        events.push((
            tick_on,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOn {
                    key: key.into(),
                    vel: note.velocity.min(127).into(),
                },
            },
        ));
        events.push((
            tick_off,
            TrackEventKind::Midi {
                channel: channel.into(),
                message: MidiMessage::NoteOff {
                    key: key.into(),
                    vel: 0.into(),
                },
            },
        ));
    }

    // Releases sort before attacks on the same tick so a re-attacked key
    // is not cut short
    events.sort_by_key(|(tick, kind)| (*tick, is_note_on(kind)));

    let mut midi_track = MidiTrack::new();
    let mut last_tick = 0;
    for (tick, kind) in events {
        midi_track.push(TrackEvent {
            delta: tick.saturating_sub(last_tick).into(),
            kind,
        });
        last_tick = tick;
    }
    add_end_of_track(&mut midi_track, 0);

    Ok(midi_track)
}

fn is_note_on(kind: &TrackEventKind) -> bool {
    matches!(
        kind,
        TrackEventKind::Midi {
            message: MidiMessage::NoteOn { .. },
            ..
        }
    )
}

/// Add tempo meta message
fn add_tempo(track: &mut MidiTrack<'_>, delta: u32, bpm: f64) {
    // Microseconds per quarter note, clamped to the 24-bit field
    let us_per_quarter = (60_000_000.0 / bpm).round().clamp(1.0, 16_777_215.0) as u32;

    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(us_per_quarter.into())),
    });
}

/// Add end of track message
fn add_end_of_track(track: &mut MidiTrack<'_>, delta: u32) {
    track.push(TrackEvent {
        delta: delta.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });
}

/// Parse MIDI bytes back into a track
///
/// Tempo comes from the first tempo event (120 BPM if there is none). Notes
/// from every track and channel are merged and sorted by onset; a NoteOn with
/// velocity 0 counts as a NoteOff.
pub fn read_track(bytes: &[u8]) -> Result<Track, MidiError> {
    let smf = Smf::parse(bytes).map_err(|e| MidiError::Parse(e.to_string()))?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(fps, sub) => {
            return Err(MidiError::UnsupportedTiming(format!(
                "timecode {:?} fps, {} subframes",
                fps, sub
            )))
        }
    };
    if ticks_per_quarter == 0 {
        return Err(MidiError::UnsupportedTiming("0 ticks per quarter".to_string()));
    }

    let mut tempo_us: Option<u32> = None;
    // (onset tick, offset tick, key, velocity)
    let mut spans: Vec<(u64, u64, u8, u8)> = Vec::new();

    for midi_track in &smf.tracks {
        let mut tick: u64 = 0;
        let mut sounding: HashMap<(u8, u8), (u64, u8)> = HashMap::new();

        for event in midi_track {
            tick += event.delta.as_int() as u64;
            match event.kind {
                TrackEventKind::Meta(MetaMessage::Tempo(us)) => {
                    tempo_us.get_or_insert(us.as_int());
                }
                TrackEventKind::Midi { channel, message } => {
                    let channel = channel.as_int();
                    match message {
                        MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                            sounding.insert((channel, key.as_int()), (tick, vel.as_int()));
                        }
                        MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                            if let Some((start, vel)) = sounding.remove(&(channel, key.as_int())) {
                                spans.push((start, tick, key.as_int(), vel));
                            }
                        }
                        _ => {}
                    }
                }
                _ => {}
            }
        }

        if !sounding.is_empty() {
            log::warn!("{} note(s) never released, dropping them", sounding.len());
        }
    }

    spans.sort_by_key(|&(start, end, key, _)| (start, end, key));

    let bpm = tempo_us.map_or(120.0, |us| 60_000_000.0 / us as f64);
    let tpq = ticks_per_quarter as f64;

    let mut track = Track::new(bpm, ticks_per_quarter);
    track.notes = spans
        .into_iter()
        .map(|(start, end, key, vel)| QuantizedNote {
            pitch: key as i32,
            onset: start as f64 / tpq,
            duration: (end - start) as f64 / tpq,
            velocity: vel,
        })
        .collect();

    Ok(track)
}
