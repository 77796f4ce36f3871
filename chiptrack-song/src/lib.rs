//! Chiptrack-Song: song model for the chiptrack sequencer
//!
//! This crate holds the data side of the tracker: patterns of note cells
//! across four channels, the instrument bank, the arrangement (sequence) and
//! the song loop region. It has no notion of time beyond the tempo fields;
//! playback lives in `chiptrack-engine`.
//!
//! # Design
//!
//! Song documents arrive from many producers with slightly different shapes.
//! Instead of rejecting anything unexpected, [`normalize`] maps every input
//! onto the canonical [`Song`] and falls back to defaults for whatever is
//! missing or invalid, so a loaded song is always playable:
//!
//! ```text
//! ┌──────────────────┐   ┌──────────────────┐   ┌──────────────────┐
//! │ canonical JSON   │   │ sparse events    │   │ compact JSON     │
//! └────────┬─────────┘   └────────┬─────────┘   └────────┬─────────┘
//!          └──────────────────────┼──────────────────────┘
//!                                 ▼
//!                           normalize()
//!                                 │
//!                                 ▼
//!     ┌────────────────────────────────────────────────────────┐
//!     │ Song                                                   │
//!     │  - patterns: Vec<Pattern>   (4 lanes of Cell each)     │
//!     │  - instruments: Vec<Instrument>                        │
//!     │  - sequence: Vec<SequenceRow>                          │
//!     │  - loop_start ..= loop_end                             │
//!     └────────────────────────────────────────────────────────┘
//! ```
//!
//! Cell edits go through [`EditLog`], which keeps bounded undo/redo stacks.

mod compact;
mod history;
mod instrument;
mod io;
mod normalize;
mod note_name;
mod pattern;
mod sequence;

pub use compact::to_compact;
pub use history::{CellEdit, EditLog};
pub use instrument::{Envelope, Filter, FilterKind, Instrument, Waveform};
pub use io::{
    SongIoError, load_song, parse_song, save_compact, save_song, to_compact_json, to_json,
};
pub use normalize::normalize;
pub use note_name::{note_name, parse_note_name};
pub use pattern::{Cell, Note, Pattern};
pub use sequence::SequenceRow;

use serde::Serialize;

// =============================================================================
// Constants
// =============================================================================

/// Number of channels in every pattern and sequence row
pub const CHANNEL_COUNT: usize = 4;

/// Pattern length used when a document gives no usable hint
pub const DEFAULT_PATTERN_LENGTH: usize = 16;

/// Maximum number of rows in a pattern
pub const MAX_PATTERN_LENGTH: usize = 256;

/// Default tempo (BPM)
pub const DEFAULT_BPM: f64 = 120.0;

/// Tempo range accepted by normalization and tempo edits
pub const MIN_BPM: f64 = 20.0;
pub const MAX_BPM: f64 = 999.0;

/// Default rows per beat (4 = sixteenth-note rows in 4/4)
pub const DEFAULT_ROWS_PER_BEAT: u32 = 4;

/// Maximum rows per beat
pub const MAX_ROWS_PER_BEAT: u32 = 64;

/// Maximum per-cell volume override (4-bit)
pub const MAX_CELL_VOLUME: u8 = 15;

/// Default channel names, one per hardware-style voice
pub const DEFAULT_CHANNEL_NAMES: [&str; CHANNEL_COUNT] = ["Pulse 1", "Pulse 2", "Wave", "Noise"];

// =============================================================================
// Song
// =============================================================================

/// Display metadata for one channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChannelInfo {
    pub name: String,
}

impl ChannelInfo {
    pub fn defaults() -> [ChannelInfo; CHANNEL_COUNT] {
        DEFAULT_CHANNEL_NAMES.map(|name| ChannelInfo {
            name: name.to_string(),
        })
    }
}

/// Normalized song
///
/// Invariants established by [`normalize`] and kept by the editing API:
/// - at least one pattern, one instrument and one sequence row
/// - pattern ids are unique and every sequence entry references one of them
/// - every pattern lane holds exactly `length` cells
/// - `loop_start <= loop_end <= sequence.len() - 1`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    /// Song title
    pub title: String,
    /// Tempo in beats per minute
    pub bpm: f64,
    /// Rows per beat (subdivision)
    pub rows_per_beat: u32,
    /// Channel metadata
    pub channels: [ChannelInfo; CHANNEL_COUNT],
    /// Instrument bank (cells reference it by index)
    pub instruments: Vec<Instrument>,
    /// Pattern pool (sequence rows reference it by id)
    pub patterns: Vec<Pattern>,
    /// Arrangement
    pub sequence: Vec<SequenceRow>,
    /// First sequence index of the loop region
    pub loop_start: usize,
    /// Last sequence index of the loop region (inclusive)
    pub loop_end: usize,
}

impl Default for Song {
    fn default() -> Self {
        Self {
            title: "Untitled".to_string(),
            bpm: DEFAULT_BPM,
            rows_per_beat: DEFAULT_ROWS_PER_BEAT,
            channels: ChannelInfo::defaults(),
            instruments: vec![Instrument::default()],
            patterns: vec![Pattern::empty(0, DEFAULT_PATTERN_LENGTH)],
            sequence: vec![SequenceRow::uniform(0)],
            loop_start: 0,
            loop_end: 0,
        }
    }
}

impl Song {
    /// Duration of one row in seconds at the current tempo
    ///
    /// Always derived from the live tempo fields so tempo edits apply to the
    /// next scheduled row.
    ///
    /// Out-of-range tempo fields are read through the same clamps
    /// [`clamp_tempo`](Self::clamp_tempo) applies, so a row always advances
    /// the clock.
    pub fn seconds_per_row(&self) -> f64 {
        let (bpm, rows_per_beat) = self.effective_tempo();
        60.0 / (bpm * f64::from(rows_per_beat))
    }

    /// Pull `bpm` and `rows_per_beat` back into their playable ranges
    ///
    /// A non-finite or non-positive tempo falls back to the default.
    pub fn clamp_tempo(&mut self) {
        (self.bpm, self.rows_per_beat) = self.effective_tempo();
    }

    fn effective_tempo(&self) -> (f64, u32) {
        let bpm = if self.bpm.is_finite() && self.bpm > 0.0 {
            self.bpm.clamp(MIN_BPM, MAX_BPM)
        } else {
            DEFAULT_BPM
        };
        (bpm, self.rows_per_beat.clamp(1, MAX_ROWS_PER_BEAT))
    }

    /// Get a pattern by id
    pub fn pattern(&self, id: u32) -> Option<&Pattern> {
        self.patterns.iter().find(|p| p.id == id)
    }

    /// Get a mutable pattern by id
    pub fn pattern_mut(&mut self, id: u32) -> Option<&mut Pattern> {
        self.patterns.iter_mut().find(|p| p.id == id)
    }

    /// Id of the first pattern in the pool (fallback target for bad references)
    pub fn first_pattern_id(&self) -> Option<u32> {
        self.patterns.first().map(|p| p.id)
    }

    /// Smallest id greater than every id in use
    pub fn next_pattern_id(&self) -> u32 {
        self.patterns
            .iter()
            .map(|p| p.id.saturating_add(1))
            .max()
            .unwrap_or(0)
    }

    /// Get an instrument by index, falling back to the first instrument
    pub fn instrument(&self, index: usize) -> Option<&Instrument> {
        self.instruments
            .get(index)
            .or_else(|| self.instruments.first())
    }

    /// Get a cell
    pub fn cell(&self, pattern_id: u32, channel: usize, row: usize) -> Option<&Cell> {
        self.pattern(pattern_id)?.cell(channel, row)
    }

    /// Get a mutable cell
    pub fn cell_mut(&mut self, pattern_id: u32, channel: usize, row: usize) -> Option<&mut Cell> {
        self.pattern_mut(pattern_id)?.cell_mut(channel, row)
    }

    /// Row count of a sequence row
    ///
    /// Channel 0's pattern is the length reference even when the other
    /// channels reference patterns of different lengths.
    pub fn sequence_row_length(&self, sequence_index: usize) -> Option<usize> {
        let entry = self.sequence.get(sequence_index)?;
        self.pattern(entry.pattern_for(0)).map(|p| p.length)
    }

    /// Clamp the loop region back into the arrangement
    pub fn clamp_loop(&mut self) {
        let last = self.sequence.len().saturating_sub(1);
        self.loop_start = self.loop_start.min(last);
        self.loop_end = self.loop_end.min(last);
        if self.loop_end < self.loop_start {
            self.loop_end = last;
        }
    }

    /// Set the loop region with the same clamping rules as normalization
    pub fn set_loop_range(&mut self, start: usize, end: usize) {
        self.loop_start = start;
        self.loop_end = end;
        self.clamp_loop();
    }

    /// Point any sequence entry with an unknown pattern id at the first pattern
    pub fn repair_sequence(&mut self) {
        let Some(fallback) = self.first_pattern_id() else {
            return;
        };
        let known: Vec<u32> = self.patterns.iter().map(|p| p.id).collect();
        for entry in &mut self.sequence {
            for id in entry.0.iter_mut() {
                if !known.contains(id) {
                    *id = fallback;
                }
            }
        }
        if self.sequence.is_empty() {
            self.sequence.push(SequenceRow::uniform(fallback));
        }
        self.clamp_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_song_is_playable() {
        let song = Song::default();
        assert_eq!(song.patterns.len(), 1);
        assert_eq!(song.instruments.len(), 1);
        assert_eq!(song.sequence.len(), 1);
        assert_eq!(song.sequence_row_length(0), Some(DEFAULT_PATTERN_LENGTH));
    }

    #[test]
    fn test_seconds_per_row() {
        let mut song = Song::default();
        song.bpm = 120.0;
        song.rows_per_beat = 4;
        assert!((song.seconds_per_row() - 0.125).abs() < 1e-12);

        song.bpm = 150.0;
        assert!((song.seconds_per_row() - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_seconds_per_row_clamps_bad_tempo() {
        let mut song = Song::default();
        song.bpm = f64::INFINITY;
        song.rows_per_beat = u32::MAX;
        assert!((song.seconds_per_row() - 60.0 / (DEFAULT_BPM * 64.0)).abs() < 1e-12);

        song.bpm = f64::NAN;
        song.rows_per_beat = 0;
        assert!((song.seconds_per_row() - 0.5).abs() < 1e-12);

        song.bpm = 1e9;
        song.rows_per_beat = 1;
        assert!((song.seconds_per_row() - 60.0 / MAX_BPM).abs() < 1e-12);
    }

    #[test]
    fn test_clamp_tempo_rewrites_fields() {
        let mut song = Song::default();
        song.bpm = f64::INFINITY;
        song.rows_per_beat = u32::MAX;
        song.clamp_tempo();
        assert_eq!(song.bpm, DEFAULT_BPM);
        assert_eq!(song.rows_per_beat, MAX_ROWS_PER_BEAT);

        song.bpm = 5.0;
        song.rows_per_beat = 0;
        song.clamp_tempo();
        assert_eq!(song.bpm, MIN_BPM);
        assert_eq!(song.rows_per_beat, 1);
    }

    #[test]
    fn test_clamp_loop_resets_inverted_end() {
        let mut song = Song::default();
        song.sequence = vec![SequenceRow::uniform(0); 4];
        song.set_loop_range(2, 1);
        assert_eq!((song.loop_start, song.loop_end), (2, 3));

        song.set_loop_range(9, 9);
        assert_eq!((song.loop_start, song.loop_end), (3, 3));
    }

    #[test]
    fn test_repair_sequence_points_at_first_pattern() {
        let mut song = Song::default();
        song.patterns.push(Pattern::empty(7, 8));
        song.sequence = vec![SequenceRow([7, 3, 0, 7])];
        song.repair_sequence();
        assert_eq!(song.sequence[0], SequenceRow([7, 0, 0, 7]));
    }

    #[test]
    fn test_next_pattern_id() {
        let mut song = Song::default();
        song.patterns.push(Pattern::empty(5, 16));
        assert_eq!(song.next_pattern_id(), 6);
    }
}
