//! Crowd synthesis and mixing
//!
//! - [`CrowdSynthesizer`] turns one utterance into a crowd of N voices
//! - [`CrowdMixer`] overlays two crowds with a clipping guard
//! - [`rng`] provides the seeded jitter streams

mod mixer;
pub mod rng;
mod synthesizer;

pub use mixer::{CrowdMixer, DEFAULT_CLIP_THRESHOLD_DBFS};
pub use synthesizer::{
    layer_count, layer_headroom_db, target_gain_db, CrowdSynthesizer, DEFAULT_JITTER_MS,
    DEFAULT_LAYER_CAP,
};
