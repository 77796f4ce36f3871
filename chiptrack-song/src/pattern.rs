//! Pattern and cell data structures

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};

use crate::{CHANNEL_COUNT, MAX_PATTERN_LENGTH};

/// Note column of a cell
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Note {
    /// No event on this row
    #[default]
    Empty,
    /// Release the channel's voice
    Off,
    /// Start a note (MIDI pitch, 0-127)
    Pitch(u8),
}

impl Note {
    pub const MAX_PITCH: u8 = 127;

    /// Pitch if this is a note event
    pub fn pitch(&self) -> Option<u8> {
        match self {
            Note::Pitch(p) => Some(*p),
            _ => None,
        }
    }

    pub fn is_off(&self) -> bool {
        matches!(self, Note::Off)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Note::Empty)
    }
}

/// Single cell in a pattern lane
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cell {
    /// Note column
    pub note: Note,
    /// Instrument index (0-based)
    pub instrument: usize,
    /// Volume override (0-15), instrument volume when unset
    pub volume: Option<u8>,
    /// Effect command, carried but not interpreted by playback
    pub effect: Option<String>,
    /// Authored note length in rows
    pub duration: Option<u16>,
}

impl Cell {
    /// Note-on cell
    pub fn note(pitch: u8, instrument: usize) -> Self {
        Self {
            note: Note::Pitch(pitch.min(Note::MAX_PITCH)),
            instrument,
            ..Default::default()
        }
    }

    /// Note-off cell
    pub fn note_off() -> Self {
        Self {
            note: Note::Off,
            ..Default::default()
        }
    }

    pub fn with_volume(mut self, volume: u8) -> Self {
        self.volume = Some(volume.min(crate::MAX_CELL_VOLUME));
        self
    }

    pub fn with_duration(mut self, rows: u16) -> Self {
        self.duration = Some(rows);
        self
    }

    pub fn with_effect(mut self, effect: impl Into<String>) -> Self {
        self.effect = Some(effect.into());
        self
    }

    /// True for a cell that carries nothing at all
    pub fn is_empty(&self) -> bool {
        *self == Cell::default()
    }
}

// Empty cells persist as `null`, everything else as an object with only the
// fields that are set.
impl Serialize for Cell {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.is_empty() {
            return serializer.serialize_none();
        }
        let mut map = serializer.serialize_map(None)?;
        match self.note {
            Note::Empty => {}
            Note::Off => map.serialize_entry("note", "off")?,
            Note::Pitch(pitch) => map.serialize_entry("note", &pitch)?,
        }
        map.serialize_entry("instrument", &self.instrument)?;
        if let Some(volume) = self.volume {
            map.serialize_entry("volume", &volume)?;
        }
        if let Some(effect) = &self.effect {
            map.serialize_entry("effect", effect)?;
        }
        if let Some(duration) = self.duration {
            map.serialize_entry("duration", &duration)?;
        }
        map.end()
    }
}

/// Pattern: a fixed-length grid of rows × 4 channel lanes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Pattern {
    /// Unique id within the song
    pub id: u32,
    /// Display name
    pub name: String,
    /// Number of rows (1-256)
    pub length: usize,
    /// Cell lanes: [channel][row]
    pub channels: [Vec<Cell>; CHANNEL_COUNT],
}

impl Pattern {
    /// Create an empty pattern
    pub fn empty(id: u32, length: usize) -> Self {
        let length = length.clamp(1, MAX_PATTERN_LENGTH);
        Self {
            id,
            name: default_pattern_name(id),
            length,
            channels: std::array::from_fn(|_| vec![Cell::default(); length]),
        }
    }

    /// Get the cell at a channel and row
    pub fn cell(&self, channel: usize, row: usize) -> Option<&Cell> {
        self.channels.get(channel)?.get(row)
    }

    /// Get a mutable cell at a channel and row
    pub fn cell_mut(&mut self, channel: usize, row: usize) -> Option<&mut Cell> {
        self.channels.get_mut(channel)?.get_mut(row)
    }

    /// Change the row count, truncating or padding every lane with empty cells
    pub fn resize(&mut self, length: usize) {
        let length = length.clamp(1, MAX_PATTERN_LENGTH);
        self.length = length;
        for lane in &mut self.channels {
            lane.resize(length, Cell::default());
        }
    }

    /// Check if every cell is empty
    pub fn is_blank(&self) -> bool {
        self.channels.iter().flatten().all(Cell::is_empty)
    }
}

pub(crate) fn default_pattern_name(id: u32) -> String {
    format!("Pattern {:02}", id)
}
