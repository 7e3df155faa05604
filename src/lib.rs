//! Consensus Crowd - crowd-voice audio for agreement splits
//!
//! Renders audio "crowds" voicing agreement or disagreement with a
//! statement, with loudness scaled to the share of a population on each
//! side (e.g. "97% of scientists agree").
//!
//! # Architecture
//!
//! - `engine`: immutable audio buffers and WAV I/O
//! - `crowd`: crowd synthesis (bounded layering + intensity gain) and mixing
//! - `speech`: the utterance collaborators behind one trait
//! - `pipeline`: per-record orchestration, file naming and run manifest

pub mod cli;
pub mod config;
pub mod crowd;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod speech;

pub use config::CrowdConfig;
pub use error::{CrowdError, Result};
