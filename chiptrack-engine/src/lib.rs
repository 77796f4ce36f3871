//! Chiptrack-Engine: lookahead playback for chiptrack songs
//!
//! The engine turns a [`Song`](chiptrack_song::Song) into timed note events for
//! an external synthesizer. It never renders audio itself.
//!
//! # Architecture
//!
//! ```text
//!   host timer (every ~25 ms)            synth audio clock
//!            │                                  ▲
//!            ▼                                  │ note_on / note_off
//!   ┌──────────────────────────┐       ┌────────┴─────────┐
//!   │ SequencerSession         │       │ VoiceTracker     │
//!   │  - Song + EditLog        │──────▶│ (1 voice/channel)│
//!   │  - Scheduler (lookahead) │       └──────────────────┘
//!   │  - Listeners             │
//!   └────────────┬─────────────┘
//!                │ RowChanged / Looped / Stopped
//!                ▼
//!          UI listeners
//! ```
//!
//! Two clocks are involved: the coarse host timer that calls
//! [`SequencerSession::tick`], and the synth's precise clock that every event
//! is stamped against. Each tick schedules all rows starting within the
//! lookahead window, so timer jitter never reaches the audio.

mod analysis;
mod config;
mod events;
mod scheduler;
mod session;
mod synth;
mod voice;

pub use analysis::{Timeline, analyze, analyze_from, loop_duration, song_duration};
pub use config::{
    CONFIG_FILE, ConfigError, SequencerConfig, config_dir, load as load_config,
    load_from as load_config_from, save_to as save_config_to,
};
pub use events::{Listener, ListenerId, Listeners, TransportEvent};
pub use scheduler::{PlayMode, PlaybackState, Scheduler, Timing};
pub use session::SequencerSession;
pub use synth::{RecordingSynth, Synth, SynthCall, VoiceHandle};
pub use voice::VoiceTracker;
