//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "chiptrack")]
#[command(about = "Inspect, convert and play chiptrack songs")]
pub struct Cli {
    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a song and print a summary
    Check {
        /// Path to the song JSON
        file: PathBuf,
    },

    /// Write the normalized document
    Normalize {
        /// Path to the song JSON
        file: PathBuf,

        /// Output path (stdout if omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,

        /// Write the compact playback form
        #[arg(long)]
        compact: bool,
    },

    /// Print the scheduled event timeline
    Analyze {
        /// Path to the song JSON
        file: PathBuf,

        /// Number of rows to schedule
        #[arg(long, default_value_t = 64)]
        rows: usize,

        /// Repeat one sequence row instead of playing the arrangement
        #[arg(long)]
        pattern: bool,

        /// Sequence row to start from
        #[arg(long, default_value_t = 0)]
        start: usize,
    },

    /// Play in real time against a logging synth
    Play {
        /// Path to the song JSON
        file: PathBuf,

        /// Repeat one sequence row instead of playing the arrangement
        #[arg(long)]
        pattern: bool,

        /// Sequence row to start from
        #[arg(long, default_value_t = 0)]
        start: usize,

        /// How long to play, in seconds
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,

        /// Channels to mute (0-3), repeatable
        #[arg(long)]
        mute: Vec<usize>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_play() {
        let cli = Cli::try_parse_from([
            "chiptrack",
            "play",
            "song.json",
            "--pattern",
            "--mute",
            "1",
            "--mute",
            "3",
            "--config",
            "custom.toml",
        ])
        .unwrap();

        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        let Commands::Play {
            pattern,
            seconds,
            mute,
            ..
        } = cli.command
        else {
            panic!("expected play command");
        };
        assert!(pattern);
        assert_eq!(seconds, 10.0);
        assert_eq!(mute, vec![1, 3]);
    }

    #[test]
    fn test_parse_normalize_defaults() {
        let cli = Cli::try_parse_from(["chiptrack", "normalize", "in.json", "-o", "out.json"])
            .unwrap();
        let Commands::Normalize {
            output, compact, ..
        } = cli.command
        else {
            panic!("expected normalize command");
        };
        assert_eq!(output, Some(PathBuf::from("out.json")));
        assert!(!compact);
    }
}
