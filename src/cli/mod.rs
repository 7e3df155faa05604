//! CLI Module
//!
//! Command-line interface for crowd generation.

pub mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::config::CrowdConfig;
use crate::error::Result;
use crate::speech::VoiceVariant;

/// Consensus crowd generator - voices of agreement and disagreement
#[derive(Parser, Debug)]
#[command(name = "crowd-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Generate six crowd tracks per issue in a CSV table
    #[command(name = "generate")]
    Generate {
        /// CSV table with issue, statement, scientific_consensus, public_agreement
        #[arg(short, long, default_value = "consensus_data.csv")]
        input: PathBuf,

        /// Output directory for audio files and manifest
        #[arg(short, long, default_value = "audio")]
        output: PathBuf,

        /// Speech backend rendering the utterances
        #[arg(long, value_enum, default_value_t = SpeechBackend::Whisper)]
        speech: SpeechBackend,

        /// Utterance cache directory (default: <output>/temp)
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Do not cache utterances on disk
        #[arg(long)]
        no_cache: bool,

        #[command(flatten)]
        crowd: CrowdArgs,
    },

    /// Print voice counts per issue without rendering audio
    #[command(name = "counts")]
    Counts {
        /// CSV table of issues
        #[arg(short, long, default_value = "consensus_data.csv")]
        input: PathBuf,

        #[command(flatten)]
        crowd: CrowdArgs,
    },

    /// Render a crowd from a single WAV utterance
    #[command(name = "crowd")]
    Crowd {
        /// Base utterance (WAV)
        input: PathBuf,

        /// Number of virtual voices
        #[arg(short, long)]
        size: u32,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        /// Layer copies without random leading silence
        #[arg(long)]
        no_jitter: bool,

        #[command(flatten)]
        crowd: CrowdArgs,
    },

    /// Mix two crowd WAV files with the clipping guard
    #[command(name = "mix")]
    Mix {
        /// First crowd (WAV)
        first: PathBuf,

        /// Second crowd (WAV)
        second: PathBuf,

        /// Output WAV file
        #[arg(short, long)]
        output: PathBuf,

        #[command(flatten)]
        crowd: CrowdArgs,
    },
}

/// Speech backends selectable from the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SpeechBackend {
    /// Offline noise-syllable voices (no service needed)
    Whisper,
    /// HTTP text-to-speech service (CROWD_TTS_URL)
    Http,
}

/// Crowd settings shared by all commands
#[derive(Args, Debug, Clone, Default)]
pub struct CrowdArgs {
    /// JSON config file; flags below override it
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Total voices per perspective
    #[arg(long)]
    pub population: Option<u32>,

    /// Maximum number of real layers per crowd
    #[arg(long)]
    pub layer_cap: Option<usize>,

    /// Maximum random leading silence per copy (ms)
    #[arg(long)]
    pub jitter_ms: Option<u32>,

    /// Peak ceiling in dBFS
    #[arg(long, allow_hyphen_values = true)]
    pub clip_threshold_db: Option<f64>,

    /// Sample rate utterances are conformed to
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Export bit depth (16, 24, 32)
    #[arg(long)]
    pub bit_depth: Option<u16>,

    /// Seed for jitter (random if omitted)
    #[arg(long)]
    pub seed: Option<u64>,

    /// Accent of the agreeing crowd (us, uk, australia, india, canada)
    #[arg(long)]
    pub agree_voice: Option<VoiceVariant>,

    /// Accent of the disagreeing crowd
    #[arg(long)]
    pub disagree_voice: Option<VoiceVariant>,
}

impl CrowdArgs {
    /// Merge config file and flags into a validated configuration
    pub fn resolve(&self) -> Result<CrowdConfig> {
        let mut config = match &self.config {
            Some(path) => CrowdConfig::load(path)?,
            None => CrowdConfig::default(),
        };

        if let Some(v) = self.population {
            config.population = v;
        }
        if let Some(v) = self.layer_cap {
            config.layer_cap = v;
        }
        if let Some(v) = self.jitter_ms {
            config.jitter_ms = v;
        }
        if let Some(v) = self.clip_threshold_db {
            config.clip_threshold_dbfs = v;
        }
        if let Some(v) = self.sample_rate {
            config.sample_rate = v;
        }
        if let Some(v) = self.bit_depth {
            config.bit_depth = v;
        }
        if self.seed.is_some() {
            config.seed = self.seed;
        }
        if let Some(v) = self.agree_voice {
            config.agree_voice = v;
        }
        if let Some(v) = self.disagree_voice {
            config.disagree_voice = v;
        }

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate() {
        let cli = Cli::parse_from([
            "crowd-cli",
            "generate",
            "--input",
            "issues.csv",
            "--population",
            "1000",
            "--clip-threshold-db",
            "-3",
            "--seed",
            "9",
            "--disagree-voice",
            "com.au",
        ]);
        match cli.command {
            Some(Commands::Generate { input, crowd, speech, .. }) => {
                assert_eq!(input, PathBuf::from("issues.csv"));
                assert_eq!(speech, SpeechBackend::Whisper);
                let config = crowd.resolve().unwrap();
                assert_eq!(config.population, 1000);
                assert_eq!(config.clip_threshold_dbfs, -3.0);
                assert_eq!(config.seed, Some(9));
                assert_eq!(config.layer_cap, 50);
                assert_eq!(config.agree_voice, VoiceVariant::Us);
                assert_eq!(config.disagree_voice, VoiceVariant::Australia);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_flags_rejected_on_resolve() {
        let args = CrowdArgs {
            bit_depth: Some(12),
            ..CrowdArgs::default()
        };
        assert!(args.resolve().is_err());
    }

    #[test]
    fn test_unknown_voice_rejected_at_parse() {
        let result = Cli::try_parse_from(["crowd-cli", "counts", "--agree-voice", "klingon"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_crowd() {
        let cli = Cli::parse_from([
            "crowd-cli", "crowd", "base.wav", "--size", "97", "-o", "out.wav", "--no-jitter",
        ]);
        assert!(matches!(
            cli.command,
            Some(Commands::Crowd { size: 97, no_jitter: true, .. })
        ));
    }
}
