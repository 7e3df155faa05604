//! Run configuration
//!
//! The documented crowd constants, loadable from a JSON file and
//! overridable from the command line.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::crowd::{DEFAULT_CLIP_THRESHOLD_DBFS, DEFAULT_JITTER_MS, DEFAULT_LAYER_CAP};
use crate::engine::io::SUPPORTED_BIT_DEPTHS;
use crate::engine::DEFAULT_SAMPLE_RATE;
use crate::error::{CrowdError, Result};
use crate::speech::{Stance, VoiceVariant};

/// Total simulated voices per perspective
pub const DEFAULT_POPULATION: u32 = 100;

/// Configuration shared read-only by every record of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdConfig {
    /// Total voices per perspective (scientific, public)
    pub population: u32,
    /// Maximum number of real layers in one crowd
    pub layer_cap: usize,
    /// Upper bound of the per-copy leading silence, in milliseconds
    pub jitter_ms: u32,
    /// Peak ceiling for exported tracks
    pub clip_threshold_dbfs: f64,
    /// Rate utterances are conformed to before layering
    pub sample_rate: u32,
    /// Export bit depth (16, 24 or 32)
    pub bit_depth: u16,
    /// Run seed for jitter; drawn at random when absent
    pub seed: Option<u64>,
    /// Accent of the agreeing crowd
    pub agree_voice: VoiceVariant,
    /// Accent of the disagreeing crowd
    pub disagree_voice: VoiceVariant,
}

impl Default for CrowdConfig {
    fn default() -> Self {
        Self {
            population: DEFAULT_POPULATION,
            layer_cap: DEFAULT_LAYER_CAP,
            jitter_ms: DEFAULT_JITTER_MS,
            clip_threshold_dbfs: DEFAULT_CLIP_THRESHOLD_DBFS,
            sample_rate: DEFAULT_SAMPLE_RATE,
            bit_depth: 16,
            seed: None,
            agree_voice: Stance::Agree.default_voice(),
            disagree_voice: Stance::Disagree.default_voice(),
        }
    }
}

impl CrowdConfig {
    /// Load a configuration file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CrowdError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let text = std::fs::read_to_string(path)?;
        let config: CrowdConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Voice speaking the utterance of `stance`
    pub fn voice_for(&self, stance: Stance) -> VoiceVariant {
        match stance {
            Stance::Agree => self.agree_voice,
            Stance::Disagree => self.disagree_voice,
        }
    }

    /// Check every field is in its usable range
    pub fn validate(&self) -> Result<()> {
        let fail = |reason: String| -> Result<()> { Err(CrowdError::Config { reason }) };

        if self.population == 0 {
            return fail("population must be at least 1".to_string());
        }
        if self.layer_cap == 0 {
            return fail("layer_cap must be at least 1".to_string());
        }
        if !self.clip_threshold_dbfs.is_finite() || self.clip_threshold_dbfs > 0.0 {
            return fail(format!(
                "clip_threshold_dbfs must be at or below 0 dBFS, got {}",
                self.clip_threshold_dbfs
            ));
        }
        if self.sample_rate == 0 {
            return fail("sample_rate must be positive".to_string());
        }
        if !SUPPORTED_BIT_DEPTHS.contains(&self.bit_depth) {
            return fail(format!(
                "bit_depth must be one of {:?}, got {}",
                SUPPORTED_BIT_DEPTHS, self.bit_depth
            ));
        }
        Ok(())
    }
}
