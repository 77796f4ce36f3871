//! Offline analysis
//!
//! Runs the scheduler against a [`RecordingSynth`] on a virtual clock, one row
//! at a time, to produce the exact event timeline a live session would send.

use chiptrack_song::{DEFAULT_PATTERN_LENGTH, Song};

use crate::events::TransportEvent;
use crate::scheduler::{PlayMode, Scheduler, Timing};
use crate::synth::{RecordingSynth, SynthCall};

/// Result of an offline run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Timeline {
    /// Synth calls in the order they were issued (times start at 0)
    pub calls: Vec<SynthCall>,
    /// Number of loop wraps
    pub loops: usize,
    /// Time at which the row after the last analyzed one would start
    pub end_time: f64,
}

/// Schedule `rows` rows from the top of the arrangement
pub fn analyze(song: &Song, mode: PlayMode, rows: usize) -> Timeline {
    analyze_from(song, mode, 0, rows)
}

/// Schedule `rows` rows starting at a sequence row
pub fn analyze_from(song: &Song, mode: PlayMode, sequence_row: usize, rows: usize) -> Timeline {
    let mut synth = RecordingSynth::new();
    let mut scheduler = Scheduler::new(Timing {
        lead_in: 0.0,
        ..Timing::default()
    });
    let mut events = Vec::new();

    scheduler.play(song, &mut synth, mode, &mut events);
    scheduler.seek_to(song, &mut synth, sequence_row, &mut events);
    events.clear();

    for _ in 0..rows {
        synth.set_time(scheduler.next_event_time());
        scheduler.step(song, &mut synth, &mut events);
    }

    let loops = events
        .iter()
        .filter(|e| **e == TransportEvent::Looped)
        .count();
    tracing::debug!(rows, loops, calls = synth.calls().len(), "analysis finished");
    Timeline {
        calls: synth.take_calls(),
        loops,
        end_time: scheduler.next_event_time(),
    }
}

/// Seconds for one pass from the first sequence row through the loop end
pub fn song_duration(song: &Song) -> f64 {
    span_duration(song, 0, song.loop_end)
}

/// Seconds for one pass over the loop region
pub fn loop_duration(song: &Song) -> f64 {
    span_duration(song, song.loop_start, song.loop_end)
}

fn span_duration(song: &Song, first: usize, last: usize) -> f64 {
    let rows: usize = (first..=last)
        .take_while(|&index| index < song.sequence.len())
        .map(|index| {
            song.sequence_row_length(index)
                .unwrap_or(DEFAULT_PATTERN_LENGTH)
        })
        .sum();
    rows as f64 * song.seconds_per_row()
}
