//! Lookahead scheduler
//!
//! The host calls [`Scheduler::tick`] on a coarse timer (every 25 ms by
//! default). Each tick schedules every row whose start time falls inside the
//! lookahead window ahead of the synth clock, so a late or starved timer does
//! not cause audible gaps as long as the delay stays under the window.
//!
//! ```text
//!   synth clock ──────────────────────────────────────────────▶
//!        now                 now + lookahead
//!         │◀──── window ────▶│
//!         │  row n   row n+1 │ row n+2 (next tick)
//! ```
//!
//! Position changes are reported once per tick with the final position;
//! wraps are reported as they happen.

use chiptrack_song::{CHANNEL_COUNT, DEFAULT_PATTERN_LENGTH, MAX_CELL_VOLUME, Note, Song};

use crate::events::TransportEvent;
use crate::synth::Synth;
use crate::voice::VoiceTracker;


/// What the transport plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayMode {
    /// Repeat the selected sequence row
    Pattern,
    /// Play the arrangement, wrapping to the loop start
    #[default]
    Song,
}

/// Transport state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlaybackState {
    #[default]
    Stopped,
    Playing(PlayMode),
}

/// Scheduler timing parameters in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Timing {
    /// How far ahead of the synth clock rows are scheduled
    pub lookahead: f64,
    /// Delay between `play`/`seek_to` and the first scheduled row
    pub lead_in: f64,
}

impl Default for Timing {
    fn default() -> Self {
        Self {
            lookahead: 0.1,
            lead_in: 0.05,
        }
    }
}

/// Playback position and voice state
#[derive(Debug, Default, Clone)]
pub struct Scheduler {
    state: PlaybackState,
    timing: Timing,
    row: usize,
    sequence_row: usize,
    next_event_time: f64,
    voices: VoiceTracker,
    muted: [bool; CHANNEL_COUNT],
    rows_scheduled: u64,
}

impl Scheduler {
    pub fn new(timing: Timing) -> Self {
        Self {
            timing,
            ..Default::default()
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, PlaybackState::Playing(_))
    }

    pub fn play_mode(&self) -> Option<PlayMode> {
        match self.state {
            PlaybackState::Playing(mode) => Some(mode),
            PlaybackState::Stopped => None,
        }
    }

    pub fn timing(&self) -> Timing {
        self.timing
    }

    pub fn set_timing(&mut self, timing: Timing) {
        self.timing = timing;
    }

    /// Next row to be scheduled
    pub fn current_row(&self) -> usize {
        self.row
    }

    /// Sequence index of the next row to be scheduled
    pub fn current_sequence_row(&self) -> usize {
        self.sequence_row
    }

    /// Synth-clock time at which the next row will sound
    pub fn next_event_time(&self) -> f64 {
        self.next_event_time
    }

    /// Total rows scheduled since creation
    pub fn rows_scheduled(&self) -> u64 {
        self.rows_scheduled
    }

    pub fn voices(&self) -> &VoiceTracker {
        &self.voices
    }

    pub fn is_channel_muted(&self, channel: usize) -> bool {
        self.muted.get(channel).copied().unwrap_or(false)
    }

    /// Mute or unmute a channel; muting cuts its voice immediately
    pub fn set_channel_muted<S: Synth>(&mut self, synth: &mut S, channel: usize, muted: bool) {
        let Some(flag) = self.muted.get_mut(channel) else {
            return;
        };
        *flag = muted;
        if muted {
            let now = synth.current_time();
            self.voices.cut(synth, channel, now);
        }
    }

    // =========================================================================
    // Transport
    // =========================================================================

    /// Start playback, stopping first if already playing
    ///
    /// Song mode starts from the top of the arrangement. Pattern mode starts at
    /// row 0 of the currently selected sequence row.
    pub fn play<S: Synth>(
        &mut self,
        song: &Song,
        synth: &mut S,
        mode: PlayMode,
        events: &mut Vec<TransportEvent>,
    ) {
        let selected = self.sequence_row.min(song.sequence.len().saturating_sub(1));
        self.stop(synth, events);

        self.sequence_row = match mode {
            PlayMode::Song => 0,
            PlayMode::Pattern => selected,
        };
        self.row = 0;
        self.next_event_time = synth.current_time() + self.timing.lead_in;
        self.state = PlaybackState::Playing(mode);
        tracing::debug!(
            ?mode,
            sequence_row = self.sequence_row,
            start = self.next_event_time,
            "playback started"
        );
    }

    /// Stop playback and silence every channel
    ///
    /// Safe to call at any time. The position resets to the top.
    pub fn stop<S: Synth>(&mut self, synth: &mut S, events: &mut Vec<TransportEvent>) {
        let now = synth.current_time();
        self.voices.release_all(synth, now);
        self.row = 0;
        self.sequence_row = 0;
        if self.is_playing() {
            self.state = PlaybackState::Stopped;
            events.push(TransportEvent::Stopped);
            tracing::debug!(rows_scheduled = self.rows_scheduled, "playback stopped");
        }
    }

    /// Jump to the top of a sequence row
    pub fn seek_to<S: Synth>(
        &mut self,
        song: &Song,
        synth: &mut S,
        sequence_row: usize,
        events: &mut Vec<TransportEvent>,
    ) {
        let now = synth.current_time();
        self.voices.release_all(synth, now);
        self.sequence_row = sequence_row.min(song.sequence.len().saturating_sub(1));
        self.row = 0;
        if self.is_playing() {
            self.next_event_time = now + self.timing.lead_in;
        }
        events.push(TransportEvent::RowChanged {
            row: self.row,
            sequence_row: self.sequence_row,
        });
        tracing::debug!(sequence_row = self.sequence_row, "seek");
    }

    /// Keep the position on the same arrangement slot after a row is inserted
    /// at `index`
    pub fn sequence_row_inserted(&mut self, index: usize) {
        if index <= self.sequence_row {
            self.sequence_row += 1;
        }
    }

    /// Keep the position on the same arrangement slot after the row at `index`
    /// is removed
    ///
    /// Removing the current row leaves the position on its successor.
    pub fn sequence_row_removed(&mut self, index: usize) {
        if index < self.sequence_row {
            self.sequence_row -= 1;
        }
    }

    /// Pull the position back inside the song after a structural edit
    pub fn clamp_position(&mut self, song: &Song) {
        let last = song.sequence.len().saturating_sub(1);
        if self.sequence_row > last {
            self.sequence_row = song.loop_start.min(last);
            self.row = 0;
        }
        let length = song
            .sequence_row_length(self.sequence_row)
            .unwrap_or(DEFAULT_PATTERN_LENGTH);
        if self.row >= length {
            self.row = 0;
        }
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    /// Schedule every row that starts inside the lookahead window
    ///
    /// Returns the number of rows scheduled. Does nothing while stopped.
    pub fn tick<S: Synth>(
        &mut self,
        song: &Song,
        synth: &mut S,
        events: &mut Vec<TransportEvent>,
    ) -> usize {
        if !self.is_playing() {
            return 0;
        }

        let horizon = synth.current_time() + self.timing.lookahead;
        let start = (self.row, self.sequence_row);
        let mut scheduled = 0;
        while self.next_event_time < horizon {
            self.step(song, synth, events);
            scheduled += 1;
        }

        if scheduled > 0 && (self.row, self.sequence_row) != start {
            events.push(TransportEvent::RowChanged {
                row: self.row,
                sequence_row: self.sequence_row,
            });
        }
        scheduled
    }

    /// Schedule the current row at `next_event_time` and advance by one row
    pub(crate) fn step<S: Synth>(
        &mut self,
        song: &Song,
        synth: &mut S,
        events: &mut Vec<TransportEvent>,
    ) {
        if self.sequence_row >= song.sequence.len() {
            self.sequence_row = song.loop_start.min(song.sequence.len().saturating_sub(1));
            self.row = 0;
        }

        let time = self.next_event_time;
        self.schedule_row(song, synth, time);
        self.rows_scheduled += 1;
        self.advance(song, events);
        self.next_event_time += song.seconds_per_row();
    }

    fn schedule_row<S: Synth>(&mut self, song: &Song, synth: &mut S, time: f64) {
        let Some(entry) = song.sequence.get(self.sequence_row) else {
            return;
        };
        tracing::trace!(
            row = self.row,
            sequence_row = self.sequence_row,
            time,
            "schedule row"
        );

        for channel in 0..CHANNEL_COUNT {
            let Some(pattern) = song.pattern(entry.pattern_for(channel)) else {
                continue;
            };
            let Some(cell) = pattern.cell(channel, self.row) else {
                continue;
            };

            match cell.note {
                Note::Empty => {}
                Note::Off => self.voices.release(synth, channel, time),
                Note::Pitch(pitch) => {
                    if self.muted[channel] {
                        continue;
                    }
                    let Some(instrument) = song.instrument(cell.instrument) else {
                        continue;
                    };
                    let volume = cell
                        .volume
                        .map(|v| f64::from(v) / f64::from(MAX_CELL_VOLUME))
                        .unwrap_or(instrument.volume);
                    self.voices
                        .start(synth, channel, pitch, instrument, volume, time);

                    // Durations reaching the end of the pattern get their
                    // note-off now, on the synth clock, at the current tempo.
                    if let Some(duration) = cell.duration
                        && self.row + duration as usize >= pattern.length
                    {
                        let release = time + f64::from(duration) * song.seconds_per_row();
                        self.voices.schedule_release(synth, channel, release);
                    }
                }
            }
        }
    }

    fn advance(&mut self, song: &Song, events: &mut Vec<TransportEvent>) {
        self.row += 1;
        let length = song
            .sequence_row_length(self.sequence_row)
            .unwrap_or(DEFAULT_PATTERN_LENGTH);
        if self.row < length {
            return;
        }

        self.row = 0;
        match self.state {
            PlaybackState::Playing(PlayMode::Song) => {
                let next = self.sequence_row + 1;
                if next > song.loop_end || next >= song.sequence.len() {
                    self.sequence_row = song.loop_start;
                    events.push(TransportEvent::Looped);
                    tracing::debug!(loop_start = song.loop_start, "song looped");
                } else {
                    self.sequence_row = next;
                }
            }
            PlaybackState::Playing(PlayMode::Pattern) => {
                events.push(TransportEvent::Looped);
            }
            PlaybackState::Stopped => {}
        }
    }
}
