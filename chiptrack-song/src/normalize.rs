//! Loose document → canonical [`Song`]
//!
//! Producers disagree on field names and shapes: editors save dense lanes,
//! generators emit sparse event lists, playback-only exports use the compact
//! short-key form. Everything is matched here and nothing is an error.
//! Whatever cannot be understood falls back to a default.
//!
//! Pattern length resolution, highest priority first:
//! 1. an explicit length field
//! 2. the longest dense lane
//! 3. the furthest `row + duration` of any sparse event
//! 4. [`DEFAULT_PATTERN_LENGTH`]

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::pattern::default_pattern_name;
use crate::{
    CHANNEL_COUNT, Cell, ChannelInfo, DEFAULT_BPM, DEFAULT_PATTERN_LENGTH, DEFAULT_ROWS_PER_BEAT,
    Envelope, Filter, FilterKind, Instrument, MAX_BPM, MAX_CELL_VOLUME, MAX_PATTERN_LENGTH,
    MAX_ROWS_PER_BEAT, MIN_BPM, Note, Pattern, SequenceRow, Song, Waveform, parse_note_name,
};


// Field aliases, canonical name first
const TITLE: &[&str] = &["title", "name", "t"];
const BPM: &[&str] = &["bpm", "tempo", "b"];
const ROWS_PER_BEAT: &[&str] = &["rowsPerBeat", "rows_per_beat", "rpb", "r"];
const CHANNEL_META: &[&str] = &["channels", "channelNames", "channel_names"];
const INSTRUMENTS: &[&str] = &["instruments", "ins", "i"];
const PATTERNS: &[&str] = &["patterns", "p"];
const SEQUENCE: &[&str] = &["sequence", "order", "orders", "arrangement", "seq", "s"];
const LOOP_START: &[&str] = &["loopStart", "loop_start", "ls"];
const LOOP_END: &[&str] = &["loopEnd", "loop_end", "le"];

const PATTERN_ID: &[&str] = &["id"];
const PATTERN_NAME: &[&str] = &["name", "title"];
const PATTERN_LENGTH: &[&str] = &["length", "rows", "rowCount", "row_count", "len", "l"];
const PATTERN_LANES: &[&str] = &["channels", "tracks", "lanes", "c"];

const NOTE: &[&str] = &["note", "pitch", "n", "p"];
const CELL_INSTRUMENT: &[&str] = &["instrument", "inst", "ins", "i"];
const CELL_VOLUME: &[&str] = &["volume", "vol", "v"];
const CELL_EFFECT: &[&str] = &["effect", "fx", "e"];
const CELL_DURATION: &[&str] = &["duration", "dur", "d"];
const EVENT_ROW: &[&str] = &["row", "r", "step"];
const SPARSE_EVENTS: &[&str] = &["events", "notes"];
const DENSE_CELLS: &[&str] = &["cells", "rows"];

const INSTRUMENT_NAME: &[&str] = &["name", "n"];
const WAVEFORM: &[&str] = &["waveform", "wave", "type", "w"];
const ENVELOPE: &[&str] = &["envelope", "env", "adsr"];
const ATTACK: &[&str] = &["attack", "a"];
const DECAY: &[&str] = &["decay", "d"];
const SUSTAIN: &[&str] = &["sustain", "s"];
const RELEASE: &[&str] = &["release", "r"];
const INSTRUMENT_VOLUME: &[&str] = &["volume", "vol", "v"];
const FILTER: &[&str] = &["filter", "f"];
const FILTER_KIND: &[&str] = &["type", "kind", "k"];
const FILTER_CUTOFF: &[&str] = &["cutoff", "frequency", "freq", "c"];
const FILTER_RESONANCE: &[&str] = &["resonance", "q"];
const DETUNE: &[&str] = &["detune", "dt"];

static NULL: Value = Value::Null;

/// Normalize any song-shaped JSON value into a canonical [`Song`]
///
/// Total: every input, including `null`, produces a playable song.
pub fn normalize(raw: &Value) -> Song {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);

    let title = field(obj, TITLE)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "Untitled".to_string());

    let bpm = field(obj, BPM)
        .and_then(as_f64)
        .filter(|bpm| *bpm > 0.0)
        .map(|bpm| bpm.clamp(MIN_BPM, MAX_BPM))
        .unwrap_or(DEFAULT_BPM);

    let rows_per_beat = field(obj, ROWS_PER_BEAT)
        .and_then(as_f64)
        .map(f64::round)
        .filter(|rpb| *rpb >= 1.0)
        .map(|rpb| rpb.min(MAX_ROWS_PER_BEAT as f64) as u32)
        .unwrap_or(DEFAULT_ROWS_PER_BEAT);

    let channels = normalize_channel_meta(field(obj, CHANNEL_META));

    let mut instruments: Vec<Instrument> = field(obj, INSTRUMENTS)
        .map(list_items)
        .unwrap_or_default()
        .into_iter()
        .enumerate()
        .map(|(index, raw)| normalize_instrument(raw, index))
        .collect();
    if instruments.is_empty() {
        tracing::warn!("song has no instruments, adding a default square instrument");
        instruments.push(Instrument::default());
    }

    let patterns = normalize_patterns(field(obj, PATTERNS), instruments.len());

    let sequence = normalize_sequence(field(obj, SEQUENCE), &patterns);

    let mut song = Song {
        title,
        bpm,
        rows_per_beat,
        channels,
        instruments,
        patterns,
        sequence,
        loop_start: 0,
        loop_end: 0,
    };

    let last = song.sequence.len() - 1;
    song.loop_start = field(obj, LOOP_START)
        .and_then(as_index)
        .unwrap_or(0)
        .min(last);
    song.loop_end = field(obj, LOOP_END)
        .and_then(as_index)
        .unwrap_or(last)
        .min(last);
    if song.loop_end < song.loop_start {
        song.loop_end = last;
    }

    song
}

// =============================================================================
// Field helpers
// =============================================================================

fn field<'a>(obj: &'a Map<String, Value>, names: &[&str]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|name| obj.get(*name))
        .find(|value| !value.is_null())
}

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => s.trim().parse::<f64>().ok().filter(|v| v.is_finite()),
        _ => None,
    }
}

/// Non-negative integer (integral floats accepted)
fn as_index(value: &Value) -> Option<usize> {
    let v = as_f64(value)?;
    if v >= 0.0 && v.fract() == 0.0 && v <= u32::MAX as f64 {
        Some(v as usize)
    } else {
        None
    }
}

/// Array items, or the values of an object keyed by index/id
fn list_items(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => map.values().collect(),
        _ => Vec::new(),
    }
}

// =============================================================================
// Channel metadata
// =============================================================================

fn normalize_channel_meta(raw: Option<&Value>) -> [ChannelInfo; CHANNEL_COUNT] {
    let mut channels = ChannelInfo::defaults();
    let Some(Value::Array(items)) = raw else {
        return channels;
    };
    for (info, item) in channels.iter_mut().zip(items) {
        let name = match item {
            Value::String(s) => Some(s.as_str()),
            Value::Object(obj) => obj.get("name").and_then(Value::as_str),
            _ => None,
        };
        if let Some(name) = name {
            info.name = name.to_string();
        }
    }
    channels
}

// =============================================================================
// Instruments
// =============================================================================

fn normalize_instrument(raw: &Value, index: usize) -> Instrument {
    let empty = Map::new();
    let obj = raw.as_object().unwrap_or(&empty);
    let defaults = Envelope::default();

    let waveform = match field(obj, WAVEFORM) {
        Some(Value::String(name)) => Waveform::from_name(name),
        Some(value) => as_index(value).and_then(|i| Waveform::ALL.get(i).copied()),
        None => None,
    }
    .unwrap_or_default();

    let name = field(obj, INSTRUMENT_NAME)
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| format!("Instrument {:02}", index));

    // Envelope stages may sit on the instrument itself, in a nested object, or
    // in an `[a, d, s, r]` array.
    let nested = field(obj, ENVELOPE);
    let stage = |names: &[&str], position: usize| -> Option<f64> {
        match nested {
            Some(Value::Object(env)) => field(env, names).and_then(as_f64),
            Some(Value::Array(adsr)) => adsr.get(position).and_then(as_f64),
            _ => None,
        }
        .or_else(|| field(obj, names).and_then(as_f64))
    };
    let time = |value: Option<f64>, default: f64| {
        value
            .filter(|v| *v >= 0.0)
            .map(|v| v.min(Envelope::MAX_TIME))
            .unwrap_or(default)
    };
    let envelope = Envelope {
        attack: time(stage(ATTACK, 0), defaults.attack),
        decay: time(stage(DECAY, 1), defaults.decay),
        sustain: stage(SUSTAIN, 2)
            .map(|v| v.clamp(0.0, 1.0))
            .unwrap_or(defaults.sustain),
        release: time(stage(RELEASE, 3), defaults.release),
    };

    let volume = field(obj, INSTRUMENT_VOLUME)
        .and_then(as_f64)
        .map(|v| v.clamp(0.0, 1.0))
        .unwrap_or(Instrument::DEFAULT_VOLUME);

    let filter = field(obj, FILTER).and_then(normalize_filter);

    let detune = field(obj, DETUNE)
        .and_then(as_f64)
        .map(|cents| cents.clamp(-Instrument::MAX_DETUNE, Instrument::MAX_DETUNE));

    Instrument {
        name,
        waveform,
        envelope,
        volume,
        filter,
        detune,
    }
}

fn normalize_filter(raw: &Value) -> Option<Filter> {
    let obj = raw.as_object()?;
    let defaults = Filter::default();
    Some(Filter {
        kind: field(obj, FILTER_KIND)
            .and_then(Value::as_str)
            .and_then(FilterKind::from_name)
            .unwrap_or(defaults.kind),
        cutoff: field(obj, FILTER_CUTOFF)
            .and_then(as_f64)
            .map(|hz| hz.clamp(20.0, 20_000.0))
            .unwrap_or(defaults.cutoff),
        resonance: field(obj, FILTER_RESONANCE)
            .and_then(as_f64)
            .map(|q| q.clamp(0.0, 30.0))
            .unwrap_or(defaults.resonance),
    })
}

// =============================================================================
// Patterns
// =============================================================================

/// Lane as found in the document, before the pattern length is known
enum RawLane<'a> {
    Dense(Vec<&'a Value>),
    Sparse(Vec<&'a Map<String, Value>>),
}

fn is_sparse_event(value: &Value) -> bool {
    value
        .as_object()
        .is_some_and(|obj| field(obj, EVENT_ROW).is_some())
}

fn classify_lane(raw: &Value) -> RawLane<'_> {
    match raw {
        Value::Array(items) if items.iter().any(is_sparse_event) => {
            RawLane::Sparse(items.iter().filter_map(Value::as_object).collect())
        }
        Value::Array(items) => RawLane::Dense(items.iter().collect()),
        Value::Object(obj) => {
            if let Some(Value::Array(events)) = field(obj, SPARSE_EVENTS) {
                RawLane::Sparse(events.iter().filter_map(Value::as_object).collect())
            } else if let Some(Value::Array(cells)) = field(obj, DENSE_CELLS) {
                RawLane::Dense(cells.iter().collect())
            } else {
                RawLane::Dense(Vec::new())
            }
        }
        _ => RawLane::Dense(Vec::new()),
    }
}

/// Lanes of a pattern object: channel-major lanes, or a row-major grid under `rows`
fn raw_lanes(obj: &Map<String, Value>) -> Vec<RawLane<'_>> {
    if let Some(Value::Array(lanes)) = field(obj, PATTERN_LANES) {
        return lanes.iter().take(CHANNEL_COUNT).map(classify_lane).collect();
    }
    if let Some(Value::Array(rows)) = obj.get("rows") {
        let mut lanes: Vec<Vec<&Value>> = vec![Vec::new(); CHANNEL_COUNT];
        for row in rows {
            let cells = row.as_array();
            for (channel, lane) in lanes.iter_mut().enumerate() {
                lane.push(
                    cells
                        .and_then(|cells| cells.get(channel))
                        .unwrap_or(&NULL),
                );
            }
        }
        return lanes.into_iter().map(RawLane::Dense).collect();
    }
    Vec::new()
}

fn normalize_patterns(raw: Option<&Value>, instrument_count: usize) -> Vec<Pattern> {
    let items = raw.map(list_items).unwrap_or_default();

    let mut requested: Vec<Option<u32>> = Vec::with_capacity(items.len());
    let mut patterns: Vec<Pattern> = Vec::with_capacity(items.len());
    for item in &items {
        let empty = Map::new();
        let obj = item.as_object().unwrap_or(&empty);
        requested.push(
            field(obj, PATTERN_ID)
                .and_then(as_index)
                .map(|id| id as u32),
        );
        patterns.push(normalize_pattern(obj, instrument_count));
    }

    // First claim of an id wins; missing and duplicate ids get fresh ones
    let mut used: HashSet<u32> = HashSet::new();
    let mut claimed: Vec<bool> = Vec::with_capacity(requested.len());
    for id in &requested {
        claimed.push(id.is_some_and(|id| used.insert(id)));
    }
    let mut next_id = used.iter().map(|id| id.saturating_add(1)).max().unwrap_or(0);
    for ((pattern, id), claimed) in patterns.iter_mut().zip(&requested).zip(&claimed) {
        pattern.id = match id {
            Some(id) if *claimed => *id,
            _ => {
                let fresh = next_id;
                next_id = next_id.saturating_add(1);
                tracing::warn!(?id, fresh, "pattern id missing or duplicated, reassigned");
                fresh
            }
        };
    }

    for (pattern, item) in patterns.iter_mut().zip(&items) {
        let has_name = item
            .as_object()
            .and_then(|obj| field(obj, PATTERN_NAME))
            .and_then(Value::as_str)
            .is_some();
        if !has_name {
            pattern.name = default_pattern_name(pattern.id);
        }
    }

    if patterns.is_empty() {
        tracing::warn!("song has no patterns, adding an empty one");
        patterns.push(Pattern::empty(0, DEFAULT_PATTERN_LENGTH));
    }
    patterns
}

/// Build a pattern (id assigned later by the caller)
fn normalize_pattern(obj: &Map<String, Value>, instrument_count: usize) -> Pattern {
    let lanes = raw_lanes(obj);

    let explicit = PATTERN_LENGTH
        .iter()
        .filter_map(|name| obj.get(*name))
        .filter_map(as_index)
        .find(|len| *len > 0);
    let dense = lanes
        .iter()
        .filter_map(|lane| match lane {
            RawLane::Dense(cells) if !cells.is_empty() => Some(cells.len()),
            _ => None,
        })
        .max();
    let sparse = lanes
        .iter()
        .filter_map(|lane| match lane {
            RawLane::Sparse(events) => events.iter().filter_map(|e| sparse_event_end(e)).max(),
            RawLane::Dense(_) => None,
        })
        .max();
    let length = explicit
        .or(dense)
        .or(sparse)
        .unwrap_or(DEFAULT_PATTERN_LENGTH)
        .clamp(1, MAX_PATTERN_LENGTH);

    let mut pattern = Pattern::empty(0, length);
    if let Some(name) = field(obj, PATTERN_NAME).and_then(Value::as_str) {
        pattern.name = name.to_string();
    }

    for (lane, raw) in pattern.channels.iter_mut().zip(&lanes) {
        match raw {
            RawLane::Dense(cells) => {
                for (cell, raw) in lane.iter_mut().zip(cells) {
                    *cell = normalize_cell(raw, instrument_count);
                }
            }
            RawLane::Sparse(events) => fill_sparse_lane(lane, events, instrument_count),
        }
    }
    pattern
}

fn sparse_event_end(event: &Map<String, Value>) -> Option<usize> {
    let row = field(event, EVENT_ROW).and_then(as_index)?;
    let duration = field(event, CELL_DURATION)
        .and_then(as_index)
        .filter(|d| *d > 0)
        .unwrap_or(1);
    Some(row.saturating_add(duration))
}

fn fill_sparse_lane(lane: &mut [Cell], events: &[&Map<String, Value>], instrument_count: usize) {
    let mut releases: Vec<usize> = Vec::new();
    for event in events {
        let Some(row) = field(event, EVENT_ROW).and_then(as_index) else {
            continue;
        };
        let Some(slot) = lane.get_mut(row) else {
            continue;
        };
        let cell = cell_from_object(event, instrument_count);
        if let (Note::Pitch(_), Some(duration)) = (cell.note, cell.duration) {
            releases.push(row + duration as usize);
        }
        *slot = cell;
    }

    // Durations become explicit note-offs only where the lane is still empty;
    // ones past the end of the pattern stay as the cell's duration.
    for row in releases {
        if let Some(slot) = lane.get_mut(row)
            && slot.is_empty()
        {
            *slot = Cell::note_off();
        }
    }
}

// =============================================================================
// Cells
// =============================================================================

fn normalize_cell(raw: &Value, instrument_count: usize) -> Cell {
    match raw {
        Value::Null => Cell::default(),
        Value::Number(_) | Value::String(_) => Cell {
            note: parse_note(raw),
            ..Default::default()
        },
        // Compact form: [pitch, instrument, volume?, duration?]
        Value::Array(parts) => {
            let note = parts.first().map(parse_note).unwrap_or_default();
            if note.is_empty() {
                return Cell::default();
            }
            Cell {
                note,
                instrument: parts
                    .get(1)
                    .map(|v| parse_instrument(v, instrument_count))
                    .unwrap_or(0),
                volume: parts.get(2).and_then(parse_volume),
                effect: None,
                duration: parts.get(3).and_then(parse_duration),
            }
        }
        Value::Object(obj) => cell_from_object(obj, instrument_count),
        Value::Bool(_) => Cell::default(),
    }
}

fn cell_from_object(obj: &Map<String, Value>, instrument_count: usize) -> Cell {
    let mut note = field(obj, NOTE).map(parse_note).unwrap_or_default();
    if obj
        .get("noteOff")
        .or_else(|| obj.get("off"))
        .and_then(Value::as_bool)
        == Some(true)
    {
        note = Note::Off;
    }

    let effect = field(obj, CELL_EFFECT).and_then(|v| match v {
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(_) => None,
        other => Some(other.to_string()),
    });

    Cell {
        note,
        instrument: field(obj, CELL_INSTRUMENT)
            .map(|v| parse_instrument(v, instrument_count))
            .unwrap_or(0),
        volume: field(obj, CELL_VOLUME).and_then(parse_volume),
        effect,
        duration: field(obj, CELL_DURATION).and_then(parse_duration),
    }
}

fn parse_note(raw: &Value) -> Note {
    match raw {
        Value::Number(_) => match as_f64(raw) {
            Some(v) if v == -1.0 => Note::Off,
            Some(v) if v.fract() == 0.0 && (0.0..=Note::MAX_PITCH as f64).contains(&v) => {
                Note::Pitch(v as u8)
            }
            _ => Note::Empty,
        },
        Value::String(s) => {
            let token = s.trim();
            match token.to_ascii_lowercase().as_str() {
                "" | "---" | "..." | "none" => Note::Empty,
                "off" | "note-off" | "noteoff" | "===" | "^^^" | "^^" | "oof" => Note::Off,
                _ => match token.parse::<i64>() {
                    Ok(-1) => Note::Off,
                    Ok(v) if (0..=Note::MAX_PITCH as i64).contains(&v) => Note::Pitch(v as u8),
                    Ok(_) => Note::Empty,
                    Err(_) => parse_note_name(token)
                        .map(Note::Pitch)
                        .unwrap_or(Note::Empty),
                },
            }
        }
        _ => Note::Empty,
    }
}

fn parse_instrument(raw: &Value, instrument_count: usize) -> usize {
    as_index(raw)
        .filter(|index| *index < instrument_count)
        .unwrap_or(0)
}

fn parse_volume(raw: &Value) -> Option<u8> {
    let v = as_f64(raw)?;
    Some(v.round().clamp(0.0, MAX_CELL_VOLUME as f64) as u8)
}

fn parse_duration(raw: &Value) -> Option<u16> {
    as_index(raw)
        .filter(|rows| *rows > 0)
        .map(|rows| rows.min(u16::MAX as usize) as u16)
}

// =============================================================================
// Sequence
// =============================================================================

fn normalize_sequence(raw: Option<&Value>, patterns: &[Pattern]) -> Vec<SequenceRow> {
    let fallback = patterns[0].id;
    let resolve = |value: &Value| -> u32 {
        as_index(value)
            .map(|id| id as u32)
            .filter(|id| patterns.iter().any(|p| p.id == *id))
            .unwrap_or(fallback)
    };

    let rows: Vec<SequenceRow> = raw
        .map(list_items)
        .unwrap_or_default()
        .into_iter()
        .map(|entry| normalize_sequence_row(entry, &resolve, fallback))
        .collect();

    if rows.is_empty() {
        tracing::warn!("song has no sequence, playing every pattern once in order");
        return patterns.iter().map(|p| SequenceRow::uniform(p.id)).collect();
    }
    rows
}

fn normalize_sequence_row(
    entry: &Value,
    resolve: &impl Fn(&Value) -> u32,
    fallback: u32,
) -> SequenceRow {
    let channel_ids = |ids: &[Value]| -> SequenceRow {
        let Some(first) = ids.first() else {
            return SequenceRow::uniform(fallback);
        };
        let first = resolve(first);
        SequenceRow(std::array::from_fn(|channel| {
            ids.get(channel).map(resolve).unwrap_or(first)
        }))
    };

    match entry {
        Value::Array(ids) => channel_ids(ids),
        Value::Object(obj) => {
            if let Some(Value::Array(ids)) = field(obj, &["ch", "channels", "patterns", "c"]) {
                channel_ids(ids)
            } else {
                field(obj, &["pattern", "id"])
                    .map(|id| SequenceRow::uniform(resolve(id)))
                    .unwrap_or(SequenceRow::uniform(fallback))
            }
        }
        other => SequenceRow::uniform(resolve(other)),
    }
}
