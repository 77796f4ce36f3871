//! Real-time player with a logging synth
//!
//! Drives a [`SequencerSession`] from a sleep loop at the configured tick
//! interval. The synth clock is wall time since start, and every note event is
//! logged instead of rendered.

use std::cell::Cell;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, ensure};
use chiptrack_engine::{
    PlayMode, SequencerConfig, SequencerSession, Synth, TransportEvent, VoiceHandle,
};
use chiptrack_song::{CHANNEL_COUNT, Instrument, Song, note_name};

/// Synth that logs events against a wall-clock audio clock
pub struct LoggingSynth {
    start: Instant,
    next_voice: u32,
}

impl LoggingSynth {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            next_voice: 0,
        }
    }

    fn issue(&mut self) -> VoiceHandle {
        let voice = VoiceHandle(self.next_voice);
        self.next_voice = self.next_voice.wrapping_add(1);
        voice
    }
}

impl Default for LoggingSynth {
    fn default() -> Self {
        Self::new()
    }
}

impl Synth for LoggingSynth {
    fn current_time(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }

    fn note_on(
        &mut self,
        channel: usize,
        pitch: u8,
        instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> VoiceHandle {
        let voice = self.issue();
        tracing::info!(
            time = format_args!("{time:.3}"),
            channel,
            note = %note_name(pitch),
            instrument = %instrument.name,
            volume = format_args!("{volume:.2}"),
            voice = voice.0,
            "note on"
        );
        voice
    }

    fn trigger_percussion(
        &mut self,
        channel: usize,
        instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> VoiceHandle {
        let voice = self.issue();
        tracing::info!(
            time = format_args!("{time:.3}"),
            channel,
            instrument = %instrument.name,
            volume = format_args!("{volume:.2}"),
            voice = voice.0,
            "percussion"
        );
        voice
    }

    fn note_off(&mut self, voice: VoiceHandle, time: f64, quick_cut: bool) {
        tracing::debug!(
            time = format_args!("{time:.3}"),
            voice = voice.0,
            quick_cut,
            "note off"
        );
    }
}

/// Playback request from the command line
pub struct PlayOptions {
    pub mode: PlayMode,
    pub start: usize,
    pub seconds: f64,
    pub mute: Vec<usize>,
}

/// Play a song for a fixed wall-clock duration
pub fn run(song: Song, config: SequencerConfig, options: PlayOptions) -> Result<()> {
    let length = Duration::try_from_secs_f64(options.seconds)
        .context("play duration must be a non-negative number of seconds")?;
    for &channel in &options.mute {
        ensure!(
            channel < CHANNEL_COUNT,
            "cannot mute channel {channel}: channels are 0-{}",
            CHANNEL_COUNT - 1
        );
    }

    let mut session = SequencerSession::with_config(LoggingSynth::new(), config);
    session.set_song(song);
    for &channel in &options.mute {
        session.set_channel_muted(channel, true);
    }

    let loops = Rc::new(Cell::new(0usize));
    let loop_count = Rc::clone(&loops);
    session.subscribe(move |event| match event {
        TransportEvent::RowChanged { row, sequence_row } => {
            tracing::debug!(row, sequence_row, "position");
        }
        TransportEvent::Looped => {
            loop_count.set(loop_count.get() + 1);
            tracing::info!(count = loop_count.get(), "looped");
        }
        TransportEvent::Stopped => tracing::info!("stopped"),
    });

    session.play(options.mode);
    if options.start != 0 {
        session.seek_to(options.start);
    }

    let interval = session.tick_interval();
    let deadline = Instant::now()
        .checked_add(length)
        .context("play duration is too long")?;
    while Instant::now() < deadline {
        session.tick();
        thread::sleep(interval);
    }
    session.stop();

    tracing::info!(
        loops = loops.get(),
        rows = session.scheduler().rows_scheduled(),
        "playback finished"
    );
    Ok(())
}
