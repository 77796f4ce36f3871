//! Synthesis collaborator contract
//!
//! The engine never produces audio. It hands timed note events to a [`Synth`]
//! whose clock is the basis for every event time.

use chiptrack_song::Instrument;

/// Opaque handle to a sounding voice, issued by the synth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VoiceHandle(pub u32);

/// Audio backend driven by the scheduler
///
/// All times are seconds on the synth's own monotonic clock. Events are
/// usually scheduled slightly in the future (up to the lookahead window).
pub trait Synth {
    /// Current audio-clock time in seconds
    fn current_time(&self) -> f64;

    /// Start a pitched voice
    fn note_on(
        &mut self,
        channel: usize,
        pitch: u8,
        instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> VoiceHandle;

    /// Start a non-pitched voice (noise instruments)
    fn trigger_percussion(
        &mut self,
        channel: usize,
        instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> VoiceHandle;

    /// Release a voice
    ///
    /// `quick_cut` asks for a very short fade (a few ms) instead of the
    /// instrument's release stage.
    fn note_off(&mut self, voice: VoiceHandle, time: f64, quick_cut: bool);
}

// =============================================================================
// Recording synth
// =============================================================================

/// One call received by a [`RecordingSynth`]
#[derive(Debug, Clone, PartialEq)]
pub enum SynthCall {
    NoteOn {
        channel: usize,
        pitch: u8,
        volume: f64,
        time: f64,
        voice: VoiceHandle,
    },
    Percussion {
        channel: usize,
        volume: f64,
        time: f64,
        voice: VoiceHandle,
    },
    NoteOff {
        voice: VoiceHandle,
        time: f64,
        quick_cut: bool,
    },
}

impl SynthCall {
    /// Scheduled time of the call
    pub fn time(&self) -> f64 {
        match self {
            SynthCall::NoteOn { time, .. }
            | SynthCall::Percussion { time, .. }
            | SynthCall::NoteOff { time, .. } => *time,
        }
    }

    /// Channel of a note start (`None` for note-offs)
    pub fn channel(&self) -> Option<usize> {
        match self {
            SynthCall::NoteOn { channel, .. } | SynthCall::Percussion { channel, .. } => {
                Some(*channel)
            }
            SynthCall::NoteOff { .. } => None,
        }
    }

    pub fn is_note_off(&self) -> bool {
        matches!(self, SynthCall::NoteOff { .. })
    }
}

/// Synth with a manually driven clock that records every call
///
/// Backs offline analysis and the scheduler tests.
#[derive(Debug, Default, Clone)]
pub struct RecordingSynth {
    now: f64,
    next_voice: u32,
    calls: Vec<SynthCall>,
}

impl RecordingSynth {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward
    pub fn advance(&mut self, seconds: f64) {
        self.now += seconds.max(0.0);
    }

    /// Set the clock (never moves backwards)
    pub fn set_time(&mut self, time: f64) {
        self.now = self.now.max(time);
    }

    pub fn calls(&self) -> &[SynthCall] {
        &self.calls
    }

    /// Drain the recorded calls
    pub fn take_calls(&mut self) -> Vec<SynthCall> {
        std::mem::take(&mut self.calls)
    }

    fn issue(&mut self) -> VoiceHandle {
        let voice = VoiceHandle(self.next_voice);
        self.next_voice = self.next_voice.wrapping_add(1);
        voice
    }
}

impl Synth for RecordingSynth {
    fn current_time(&self) -> f64 {
        self.now
    }

    fn note_on(
        &mut self,
        channel: usize,
        pitch: u8,
        _instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> VoiceHandle {
        let voice = self.issue();
        self.calls.push(SynthCall::NoteOn {
            channel,
            pitch,
            volume,
            time,
            voice,
        });
        voice
    }

    fn trigger_percussion(
        &mut self,
        channel: usize,
        _instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> VoiceHandle {
        let voice = self.issue();
        self.calls.push(SynthCall::Percussion {
            channel,
            volume,
            time,
            voice,
        });
        voice
    }

    fn note_off(&mut self, voice: VoiceHandle, time: f64, quick_cut: bool) {
        self.calls.push(SynthCall::NoteOff {
            voice,
            time,
            quick_cut,
        });
    }
}
