//! Chiptrack CLI
//!
//! Checks, converts, analyzes and plays chiptrack song files.

mod cli;
mod player;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;

use chiptrack_engine::{
    PlayMode, SequencerConfig, SynthCall, analyze_from, load_config, load_config_from,
    loop_duration, song_duration,
};
use chiptrack_song::{Song, load_song, note_name, to_compact_json, to_json};

use cli::{Cli, Commands};
use player::PlayOptions;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => load_config(),
    };

    match cli.command {
        Commands::Check { file } => check(&file),
        Commands::Normalize {
            file,
            output,
            compact,
        } => normalize(&file, output.as_deref(), compact),
        Commands::Analyze {
            file,
            rows,
            pattern,
            start,
        } => analyze(&file, rows, mode(pattern), start),
        Commands::Play {
            file,
            pattern,
            start,
            seconds,
            mute,
        } => play(
            &file,
            config,
            PlayOptions {
                mode: mode(pattern),
                start,
                seconds,
                mute,
            },
        ),
    }
}

fn mode(pattern: bool) -> PlayMode {
    if pattern {
        PlayMode::Pattern
    } else {
        PlayMode::Song
    }
}

fn load(path: &Path) -> Result<Song> {
    load_song(path).with_context(|| format!("Failed to load song {}", path.display()))
}

fn check(path: &Path) -> Result<()> {
    let song = load(path)?;

    println!("Title:         {}", song.title);
    println!(
        "Tempo:         {} BPM, {} rows/beat ({:.3} s/row)",
        song.bpm,
        song.rows_per_beat,
        song.seconds_per_row()
    );
    println!(
        "Channels:      {}",
        song.channels
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    );

    println!("Instruments:   {}", song.instruments.len());
    for (index, instrument) in song.instruments.iter().enumerate() {
        println!(
            "  {:02} {:<16} {:<8} vol {:.2}",
            index,
            instrument.name,
            instrument.waveform.name(),
            instrument.volume
        );
    }

    println!("Patterns:      {}", song.patterns.len());
    for pattern in &song.patterns {
        let notes = pattern
            .channels
            .iter()
            .flatten()
            .filter(|cell| cell.note.pitch().is_some())
            .count();
        println!(
            "  #{:<3} {:<16} {:>3} rows {:>4} notes",
            pattern.id, pattern.name, pattern.length, notes
        );
    }

    println!(
        "Sequence:      {} rows, loop {}..={}",
        song.sequence.len(),
        song.loop_start,
        song.loop_end
    );
    for (index, row) in song.sequence.iter().enumerate() {
        let marker = if (song.loop_start..=song.loop_end).contains(&index) {
            '*'
        } else {
            ' '
        };
        println!("  {marker}{index:03} {:?}", row.0);
    }

    println!(
        "Duration:      {:.2} s to loop end, loop {:.2} s",
        song_duration(&song),
        loop_duration(&song)
    );
    Ok(())
}

fn normalize(path: &Path, output: Option<&Path>, compact: bool) -> Result<()> {
    let song = load(path)?;
    let text = if compact {
        to_compact_json(&song)?
    } else {
        to_json(&song)?
    };

    match output {
        Some(out) => {
            std::fs::write(out, text)
                .with_context(|| format!("Failed to write {}", out.display()))?;
            tracing::info!(path = %out.display(), compact, "wrote normalized song");
        }
        None => println!("{text}"),
    }
    Ok(())
}

fn analyze(path: &Path, rows: usize, mode: PlayMode, start: usize) -> Result<()> {
    let song = load(path)?;
    let timeline = analyze_from(&song, mode, start, rows);

    for call in &timeline.calls {
        match call {
            SynthCall::NoteOn {
                channel,
                pitch,
                volume,
                time,
                voice,
            } => println!(
                "{time:9.3}  ch{channel}  on    {}  vol {volume:.2}  v{}",
                note_name(*pitch),
                voice.0
            ),
            SynthCall::Percussion {
                channel,
                volume,
                time,
                voice,
            } => println!(
                "{time:9.3}  ch{channel}  perc  ---  vol {volume:.2}  v{}",
                voice.0
            ),
            SynthCall::NoteOff {
                voice,
                time,
                quick_cut,
            } => println!(
                "{time:9.3}       off   v{}{}",
                voice.0,
                if *quick_cut { " (cut)" } else { "" }
            ),
        }
    }
    println!(
        "{} rows, {} events, {} loops, {:.3} s",
        rows,
        timeline.calls.len(),
        timeline.loops,
        timeline.end_time
    );
    Ok(())
}

fn play(path: &Path, config: SequencerConfig, options: PlayOptions) -> Result<()> {
    let song = load(path)?;
    tracing::info!(
        title = %song.title,
        mode = ?options.mode,
        seconds = options.seconds,
        "starting playback"
    );
    player::run(song, config, options)
}
