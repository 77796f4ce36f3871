//! Compact document for playback-only consumers
//!
//! Short keys, no channel metadata, no effects. Cells are `null`, `"off"`, or
//! `[pitch, instrument]` with the volume and duration appended only when set.
//! [`normalize`](crate::normalize) reads this form back directly.

use serde_json::{Map, Value, json};

use crate::{Cell, Instrument, Note, Pattern, Song};

/// Build the compact document for a song
pub fn to_compact(song: &Song) -> Value {
    json!({
        "t": song.title,
        "b": song.bpm,
        "r": song.rows_per_beat,
        "i": song.instruments.iter().map(compact_instrument).collect::<Vec<_>>(),
        "p": song.patterns.iter().map(compact_pattern).collect::<Vec<_>>(),
        "s": song.sequence.iter().map(|row| row.0.to_vec()).collect::<Vec<_>>(),
        "ls": song.loop_start,
        "le": song.loop_end,
    })
}

fn compact_instrument(instrument: &Instrument) -> Value {
    let env = &instrument.envelope;
    let mut obj = Map::new();
    obj.insert("n".into(), json!(instrument.name));
    obj.insert("w".into(), json!(instrument.waveform.name()));
    obj.insert(
        "adsr".into(),
        json!([env.attack, env.decay, env.sustain, env.release]),
    );
    obj.insert("v".into(), json!(instrument.volume));
    if let Some(filter) = &instrument.filter {
        obj.insert(
            "f".into(),
            json!({"k": filter.kind, "c": filter.cutoff, "q": filter.resonance}),
        );
    }
    if let Some(detune) = instrument.detune {
        obj.insert("dt".into(), json!(detune));
    }
    Value::Object(obj)
}

fn compact_pattern(pattern: &Pattern) -> Value {
    json!({
        "id": pattern.id,
        "l": pattern.length,
        "c": pattern
            .channels
            .iter()
            .map(|lane| lane.iter().map(compact_cell).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    })
}

fn compact_cell(cell: &Cell) -> Value {
    match cell.note {
        Note::Empty => Value::Null,
        Note::Off => json!("off"),
        Note::Pitch(pitch) => {
            let mut parts = vec![json!(pitch), json!(cell.instrument)];
            if cell.volume.is_some() || cell.duration.is_some() {
                parts.push(json!(cell.volume));
            }
            if let Some(duration) = cell.duration {
                parts.push(json!(duration));
            }
            Value::Array(parts)
        }
    }
}
