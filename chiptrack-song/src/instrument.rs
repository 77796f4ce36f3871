//! Instrument definitions
//!
//! Instruments are parameter bags handed to the synthesis layer. Playback only
//! looks at two fields: the waveform (to pick pitched vs percussive triggers)
//! and the base volume (when a cell has no volume override).

use serde::Serialize;

/// Oscillator selector
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Waveform {
    #[default]
    Square,
    Pulse,
    Triangle,
    Sawtooth,
    Sine,
    /// Non-pitched voice, triggered as percussion
    Noise,
}

impl Waveform {
    pub const ALL: [Waveform; 6] = [
        Waveform::Square,
        Waveform::Pulse,
        Waveform::Triangle,
        Waveform::Sawtooth,
        Waveform::Sine,
        Waveform::Noise,
    ];

    /// Parse a waveform name, accepting the usual abbreviations
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "square" | "sq" | "pulse50" => Some(Waveform::Square),
            "pulse" | "pulse25" | "pulse12" | "pwm" => Some(Waveform::Pulse),
            "triangle" | "tri" => Some(Waveform::Triangle),
            "sawtooth" | "saw" => Some(Waveform::Sawtooth),
            "sine" | "sin" => Some(Waveform::Sine),
            "noise" | "drum" | "drums" | "percussion" | "perc" => Some(Waveform::Noise),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Waveform::Square => "square",
            Waveform::Pulse => "pulse",
            Waveform::Triangle => "triangle",
            Waveform::Sawtooth => "sawtooth",
            Waveform::Sine => "sine",
            Waveform::Noise => "noise",
        }
    }

    /// Check if this voice is triggered as percussion instead of a pitched note
    pub fn is_percussive(&self) -> bool {
        matches!(self, Waveform::Noise)
    }
}

/// ADSR envelope
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Envelope {
    /// Attack time in seconds
    pub attack: f64,
    /// Decay time in seconds
    pub decay: f64,
    /// Sustain level (0.0-1.0)
    pub sustain: f64,
    /// Release time in seconds
    pub release: f64,
}

impl Envelope {
    /// Longest stage time accepted by normalization
    pub const MAX_TIME: f64 = 10.0;
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.01,
            decay: 0.1,
            sustain: 0.7,
            release: 0.1,
        }
    }
}

/// Filter mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FilterKind {
    #[default]
    Lowpass,
    Highpass,
    Bandpass,
}

impl FilterKind {
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "lowpass" | "lp" | "low" => Some(FilterKind::Lowpass),
            "highpass" | "hp" | "high" => Some(FilterKind::Highpass),
            "bandpass" | "bp" | "band" => Some(FilterKind::Bandpass),
            _ => None,
        }
    }
}

/// Optional filter stage
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Filter {
    #[serde(rename = "type")]
    pub kind: FilterKind,
    /// Cutoff frequency in Hz (20-20000)
    pub cutoff: f64,
    /// Resonance / Q (0-30)
    pub resonance: f64,
}

impl Default for Filter {
    fn default() -> Self {
        Self {
            kind: FilterKind::Lowpass,
            cutoff: 2000.0,
            resonance: 1.0,
        }
    }
}

/// Instrument parameter bag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Instrument {
    /// Display name
    pub name: String,
    /// Oscillator selector
    pub waveform: Waveform,
    /// Amplitude envelope
    #[serde(flatten)]
    pub envelope: Envelope,
    /// Base volume (0.0-1.0)
    pub volume: f64,
    /// Optional filter stage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Filter>,
    /// Secondary oscillator detune in cents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detune: Option<f64>,
}

impl Instrument {
    pub const DEFAULT_VOLUME: f64 = 0.5;

    /// Detune range in cents
    pub const MAX_DETUNE: f64 = 1200.0;

    pub fn new(name: impl Into<String>, waveform: Waveform) -> Self {
        Self {
            name: name.into(),
            waveform,
            ..Default::default()
        }
    }
}

impl Default for Instrument {
    fn default() -> Self {
        Self {
            name: "Square".to_string(),
            waveform: Waveform::Square,
            envelope: Envelope::default(),
            volume: Self::DEFAULT_VOLUME,
            filter: None,
            detune: None,
        }
    }
}
