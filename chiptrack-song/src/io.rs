//! Song documents on disk
//!
//! Reading accepts any JSON the normalizer understands. Only malformed JSON
//! and filesystem failures are errors; odd shapes are repaired.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::{Song, normalize, to_compact};

/// Failure while reading or writing a song document
#[derive(Debug, Error)]
pub enum SongIoError {
    #[error("song file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("song document is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Parse a JSON document into a normalized song
pub fn parse_song(text: &str) -> Result<Song, SongIoError> {
    let raw: serde_json::Value = serde_json::from_str(text)?;
    Ok(normalize(&raw))
}

/// Load and normalize a song file
pub fn load_song(path: impl AsRef<Path>) -> Result<Song, SongIoError> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    let song = parse_song(&text)?;
    tracing::info!(
        path = %path.display(),
        title = %song.title,
        patterns = song.patterns.len(),
        sequence = song.sequence.len(),
        "loaded song"
    );
    Ok(song)
}

/// Serialize the canonical document (pretty-printed)
pub fn to_json(song: &Song) -> Result<String, SongIoError> {
    Ok(serde_json::to_string_pretty(song)?)
}

/// Serialize the compact playback document (single line)
pub fn to_compact_json(song: &Song) -> Result<String, SongIoError> {
    Ok(serde_json::to_string(&to_compact(song))?)
}

/// Write the canonical document
pub fn save_song(song: &Song, path: impl AsRef<Path>) -> Result<(), SongIoError> {
    let path = path.as_ref();
    fs::write(path, to_json(song)?)?;
    tracing::info!(path = %path.display(), "saved song");
    Ok(())
}

/// Write the compact playback document
pub fn save_compact(song: &Song, path: impl AsRef<Path>) -> Result<(), SongIoError> {
    let path = path.as_ref();
    fs::write(path, to_compact_json(song)?)?;
    tracing::info!(path = %path.display(), "saved compact song");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Cell, Pattern, SequenceRow};
    use tempfile::TempDir;

    fn sample_song() -> Song {
        let mut song = Song::default();
        song.title = "Disk".to_string();
        song.rows_per_beat = 8;
        let mut pattern = Pattern::empty(2, 32);
        pattern.name = "Bridge".to_string();
        pattern.channels[1][31] = Cell::note(72, 0).with_duration(4).with_effect("arp");
        song.patterns.push(pattern);
        song.sequence.push(SequenceRow([2, 2, 0, 0]));
        song.set_loop_range(0, 1);
        song
    }

    #[test]
    fn test_save_and_load_canonical() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.json");
        let song = sample_song();

        save_song(&song, &path).unwrap();
        let loaded = load_song(&path).unwrap();
        assert_eq!(loaded, song);
    }

    #[test]
    fn test_save_and_load_compact() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("song.min.json");
        let song = sample_song();

        save_compact(&song, &path).unwrap();
        let loaded = load_song(&path).unwrap();
        assert_eq!(loaded.rows_per_beat, 8);
        assert_eq!(loaded.sequence, song.sequence);
        assert_eq!(
            loaded.cell(2, 1, 31),
            Some(&Cell::note(72, 0).with_duration(4))
        );
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = TempDir::new().unwrap();
        let err = load_song(dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, SongIoError::Io(_)));
    }

    #[test]
    fn test_malformed_json_is_json_error() {
        let err = parse_song("{ not json").unwrap_err();
        assert!(matches!(err, SongIoError::Json(_)));
    }

    #[test]
    fn test_odd_shapes_still_parse() {
        let song = parse_song(r#"{"tempo": 90, "patterns": [[["C-4"]]]}"#).unwrap();
        assert_eq!(song.bpm, 90.0);
        assert_eq!(song.sequence.len(), 1);
    }
}
