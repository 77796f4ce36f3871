//! Tracker note names (C-4, C#4, Db3) with C4 = MIDI 60

use crate::Note;

const NAMES: [&str; 12] = [
    "C-", "C#", "D-", "D#", "E-", "F-", "F#", "G-", "G#", "A-", "A#", "B-",
];

/// Render a pitch as a three-character tracker name
pub fn note_name(pitch: u8) -> String {
    let octave = (pitch / 12) as i32 - 1;
    format!("{}{}", NAMES[(pitch % 12) as usize], octave)
}

/// Parse a note name into a MIDI pitch
///
/// Accepts `C-4`, `C4`, `c#4`, `Db3` and `C--1`. Returns `None` for anything
/// else or for pitches outside 0-127.
pub fn parse_note_name(name: &str) -> Option<u8> {
    let mut chars = name.trim().chars();
    let semitone: i32 = match chars.next()?.to_ascii_uppercase() {
        'C' => 0,
        'D' => 2,
        'E' => 4,
        'F' => 5,
        'G' => 7,
        'A' => 9,
        'B' => 11,
        _ => return None,
    };

    let rest = chars.as_str();
    let (accidental, octave_str) = match rest.chars().next()? {
        '#' => (1, &rest[1..]),
        'b' => (-1, &rest[1..]),
        '-' if rest.len() > 1 && rest[1..].starts_with('-') => (0, &rest[1..]),
        '-' if rest[1..].chars().all(|c| c.is_ascii_digit()) && rest.len() > 1 => {
            (0, &rest[1..])
        }
        _ => (0, rest),
    };

    let octave: i32 = octave_str.parse().ok()?;
    let pitch = (octave + 1) * 12 + semitone + accidental;
    if (0..=Note::MAX_PITCH as i32).contains(&pitch) {
        Some(pitch as u8)
    } else {
        None
    }
}
