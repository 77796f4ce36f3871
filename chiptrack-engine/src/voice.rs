//! Per-channel voice bookkeeping
//!
//! Each channel owns at most one sounding voice. Starting a note on an
//! occupied channel cuts the old voice first.

use chiptrack_song::{CHANNEL_COUNT, Instrument};

use crate::synth::{Synth, VoiceHandle};

/// Active voice on a channel
#[derive(Debug, Clone, Copy, PartialEq)]
struct VoiceSlot {
    handle: VoiceHandle,
    /// Time of an already-sent note-off (cross-boundary durations)
    release_at: Option<f64>,
}

/// One voice slot per channel
#[derive(Debug, Default, Clone)]
pub struct VoiceTracker {
    slots: [Option<VoiceSlot>; CHANNEL_COUNT],
}

impl VoiceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle of the voice sounding on a channel at `time`
    pub fn active(&self, channel: usize, time: f64) -> Option<VoiceHandle> {
        self.slots
            .get(channel)
            .copied()
            .flatten()
            .filter(|slot| !slot.finished_by(time))
            .map(|slot| slot.handle)
    }

    /// Number of channels with a voice sounding at `time`
    pub fn active_count(&self, time: f64) -> usize {
        (0..CHANNEL_COUNT)
            .filter(|&channel| self.active(channel, time).is_some())
            .count()
    }

    /// Start a voice, cutting whatever is sounding on the channel
    ///
    /// Noise instruments are started as percussion and ignore the pitch.
    pub fn start<S: Synth>(
        &mut self,
        synth: &mut S,
        channel: usize,
        pitch: u8,
        instrument: &Instrument,
        volume: f64,
        time: f64,
    ) -> Option<VoiceHandle> {
        self.expire(channel, time);
        let slot = self.slots.get_mut(channel)?;
        if let Some(old) = slot.take() {
            synth.note_off(old.handle, time, true);
        }

        let handle = if instrument.waveform.is_percussive() {
            synth.trigger_percussion(channel, instrument, volume, time)
        } else {
            synth.note_on(channel, pitch, instrument, volume, time)
        };
        *slot = Some(VoiceSlot {
            handle,
            release_at: None,
        });
        Some(handle)
    }

    /// Release the channel's voice with its authored release
    ///
    /// Nothing happens if the channel is silent.
    pub fn release<S: Synth>(&mut self, synth: &mut S, channel: usize, time: f64) {
        self.expire(channel, time);
        if let Some(old) = self.slots.get_mut(channel).and_then(Option::take) {
            synth.note_off(old.handle, time, false);
        }
    }

    /// Send a note-off for a future time right away
    ///
    /// The voice stays in its slot until `time` passes, so it can still be cut
    /// earlier by a new note or a stop.
    pub fn schedule_release<S: Synth>(&mut self, synth: &mut S, channel: usize, time: f64) {
        let Some(slot) = self.slots.get_mut(channel).and_then(Option::as_mut) else {
            return;
        };
        synth.note_off(slot.handle, time, false);
        slot.release_at = Some(time);
    }

    /// Cut every voice immediately and clear all slots
    pub fn release_all<S: Synth>(&mut self, synth: &mut S, time: f64) {
        for channel in 0..CHANNEL_COUNT {
            self.cut(synth, channel, time);
        }
    }

    /// Cut one channel's voice immediately
    pub fn cut<S: Synth>(&mut self, synth: &mut S, channel: usize, time: f64) {
        self.expire(channel, time);
        if let Some(old) = self.slots.get_mut(channel).and_then(Option::take) {
            synth.note_off(old.handle, time, true);
        }
    }

    /// Forget slots whose scheduled note-off has been reached
    fn expire(&mut self, channel: usize, time: f64) {
        if let Some(slot) = self.slots.get_mut(channel)
            && slot.is_some_and(|s| s.finished_by(time))
        {
            *slot = None;
        }
    }
}

impl VoiceSlot {
    fn finished_by(&self, time: f64) -> bool {
        self.release_at.is_some_and(|at| at <= time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synth::{RecordingSynth, SynthCall};
    use chiptrack_song::Waveform;

    #[test]
    fn test_start_cuts_previous_voice() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        let lead = Instrument::default();

        let first = voices.start(&mut synth, 0, 60, &lead, 0.5, 1.0).unwrap();
        let second = voices.start(&mut synth, 0, 62, &lead, 0.5, 1.5).unwrap();

        let calls = synth.calls();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[1],
            SynthCall::NoteOff {
                voice: first,
                time: 1.5,
                quick_cut: true
            }
        );
        assert!(matches!(calls[2], SynthCall::NoteOn { pitch: 62, .. }));
        assert_eq!(voices.active(0, 1.5), Some(second));
    }

    #[test]
    fn test_channels_are_independent() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        let lead = Instrument::default();

        voices.start(&mut synth, 0, 60, &lead, 0.5, 0.0);
        voices.start(&mut synth, 1, 64, &lead, 0.5, 0.0);
        assert_eq!(voices.active_count(0.0), 2);
        assert!(synth.calls().iter().all(|c| !c.is_note_off()));
    }

    #[test]
    fn test_release_on_silent_channel_is_noop() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        voices.release(&mut synth, 2, 0.0);
        assert!(synth.calls().is_empty());
    }

    #[test]
    fn test_release_uses_authored_release() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        let voice = voices
            .start(&mut synth, 0, 60, &Instrument::default(), 0.5, 0.0)
            .unwrap();
        voices.release(&mut synth, 0, 0.25);

        assert_eq!(
            synth.calls().last(),
            Some(&SynthCall::NoteOff {
                voice,
                time: 0.25,
                quick_cut: false
            })
        );
        assert_eq!(voices.active(0, 0.25), None);
    }

    #[test]
    fn test_noise_instrument_triggers_percussion() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        let drum = Instrument::new("Kick", Waveform::Noise);
        voices.start(&mut synth, 3, 36, &drum, 0.8, 0.0);
        assert!(matches!(
            synth.calls()[0],
            SynthCall::Percussion { channel: 3, .. }
        ));
    }

    #[test]
    fn test_scheduled_release_expires_slot() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        let lead = Instrument::default();
        voices.start(&mut synth, 0, 60, &lead, 0.5, 0.0);
        voices.schedule_release(&mut synth, 0, 2.0);
        assert_eq!(synth.calls().len(), 2);

        // Still sounding before the release time
        assert!(voices.active(0, 1.0).is_some());

        // A note after the release time does not cut the finished voice again
        voices.start(&mut synth, 0, 62, &lead, 0.5, 2.5);
        assert_eq!(synth.calls().len(), 3);
        assert!(matches!(synth.calls()[2], SynthCall::NoteOn { pitch: 62, .. }));
    }

    #[test]
    fn test_release_all_cuts_everything() {
        let mut synth = RecordingSynth::new();
        let mut voices = VoiceTracker::new();
        let lead = Instrument::default();
        for channel in 0..CHANNEL_COUNT {
            voices.start(&mut synth, channel, 60, &lead, 0.5, 0.0);
        }
        synth.take_calls();

        voices.release_all(&mut synth, 0.3);
        let calls = synth.take_calls();
        assert_eq!(calls.len(), CHANNEL_COUNT);
        assert!(calls.iter().all(|c| matches!(
            c,
            SynthCall::NoteOff {
                quick_cut: true,
                time,
                ..
            } if *time == 0.3
        )));
        assert_eq!(voices.active_count(0.3), 0);
    }
}
