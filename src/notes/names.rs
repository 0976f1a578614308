// Note naming utilities
// Pitch name <-> MIDI number conversion and 12-TET frequency helpers

use crate::config::ConfigError;

/// Sharp spellings, indexed by pitch class
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Parse a pitch name such as "A2", "C#4", "Bb3" or "E-1" into a MIDI number
///
/// The octave is mandatory and follows the C4 = 60 convention. Any number of
/// sharps ('#', '♯') or flats ('b', '♭') may follow the letter.
pub fn note_to_midi(name: &str) -> Result<i32, ConfigError> {
    let invalid = || ConfigError::InvalidNoteName(name.to_string());
    let trimmed = name.trim();

    let mut chars = trimmed.chars().peekable();
    let letter = chars.next().ok_or_else(invalid)?;
    let pitch_class = match letter.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return Err(invalid()),
    };

    let mut offset = 0i32;
    while let Some(&c) = chars.peek() {
        match c {
            '#' | '♯' => offset += 1,
            'b' | '♭' => offset -= 1,
            _ => break,
        }
        chars.next();
    }

    let octave_text: String = chars.collect();
    if octave_text.is_empty() {
        return Err(invalid());
    }
    let octave: i32 = octave_text.parse().map_err(|_| invalid())?;

    let midi = (octave + 1) * 12 + pitch_class + offset;
    if !(0..=127).contains(&midi) {
        return Err(ConfigError::NoteOutOfRange(midi));
    }

    Ok(midi)
}

/// Name a MIDI number with sharp spelling, e.g. 70 -> "A#4"
pub fn midi_to_note(pitch: i32) -> String {
    let pitch_class = pitch.rem_euclid(12) as usize;
    let octave = pitch.div_euclid(12) - 1;
    format!("{}{}", NOTE_NAMES[pitch_class], octave)
}

/// Frequency of a (possibly fractional) MIDI number, A4 = 440 Hz
pub fn midi_to_hz(pitch: f64) -> f64 {
    440.0 * 2.0f64.powf((pitch - 69.0) / 12.0)
}

/// Fractional MIDI number of a frequency, A4 = 440 Hz
pub fn hz_to_midi(freq: f64) -> f64 {
    69.0 + 12.0 * (freq / 440.0).log2()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_note_to_midi() {
        assert_eq!(note_to_midi("C4").unwrap(), 60);
        assert_eq!(note_to_midi("A4").unwrap(), 69);
        assert_eq!(note_to_midi("A2").unwrap(), 45);
        assert_eq!(note_to_midi("E6").unwrap(), 88);
        assert_eq!(note_to_midi("C#4").unwrap(), 61);
        assert_eq!(note_to_midi("Bb3").unwrap(), 58);
        assert_eq!(note_to_midi("c-1").unwrap(), 0);
        assert_eq!(note_to_midi("G9").unwrap(), 127);
    }

    #[test]
    fn test_note_to_midi_rejects_garbage() {
        for bad in ["", "H4", "C", "C#", "Cx4", "4C"] {
            assert!(matches!(
                note_to_midi(bad),
                Err(ConfigError::InvalidNoteName(_))
            ));
        }
        assert_eq!(note_to_midi("G#9"), Err(ConfigError::NoteOutOfRange(128)));
    }

    #[test]
    fn test_midi_to_note() {
        assert_eq!(midi_to_note(60), "C4");
        assert_eq!(midi_to_note(69), "A4");
        assert_eq!(midi_to_note(70), "A#4");
        assert_eq!(midi_to_note(0), "C-1");
    }

    #[test]
    fn test_name_round_trip() {
        for pitch in 0..=127 {
            assert_eq!(note_to_midi(&midi_to_note(pitch)).unwrap(), pitch);
        }
    }

    #[test]
    fn test_frequency_conversion() {
        assert!((midi_to_hz(69.0) - 440.0).abs() < 1e-9);
        assert!((midi_to_hz(60.0) - 261.63).abs() < 0.01);
        assert!((hz_to_midi(440.0) - 69.0).abs() < 1e-9);
        assert!((hz_to_midi(110.0) - 45.0).abs() < 1e-9);
    }
}
