//! Crowd Mixer
//!
//! Overlays two crowds (typically agree and disagree) into one track. The
//! relative loudness of the crowds is already baked in by the synthesizer,
//! so the mixer only aligns lengths and keeps the sum out of clipping.

use log::debug;

use crate::config::CrowdConfig;
use crate::engine::{db_to_linear, AudioBuffer};
use crate::error::Result;

/// Peak ceiling in dBFS enforced on mixed output
pub const DEFAULT_CLIP_THRESHOLD_DBFS: f64 = -1.0;

/// Mixes crowd buffers with a peak ceiling
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrowdMixer {
    clip_threshold_dbfs: f64,
}

impl CrowdMixer {
    pub fn new(clip_threshold_dbfs: f64) -> Self {
        Self {
            clip_threshold_dbfs,
        }
    }

    pub fn from_config(config: &CrowdConfig) -> Self {
        Self::new(config.clip_threshold_dbfs)
    }

    pub fn clip_threshold_dbfs(&self) -> f64 {
        self.clip_threshold_dbfs
    }

    /// Overlay `a` and `b` after padding the shorter one with trailing silence
    ///
    /// The output lasts `max(len(a), len(b))` and its peak never exceeds the
    /// clip threshold.
    ///
    /// # Errors
    /// * `FormatMismatch` - If the buffers differ in sample rate or channel count
    pub fn mix(&self, a: &AudioBuffer, b: &AudioBuffer) -> Result<AudioBuffer> {
        a.ensure_same_format(b)?;

        let length = a.len().max(b.len());
        let mixed = a.padded_to(length).overlay_unchecked(&b.padded_to(length));

        Ok(self.guard(&mixed))
    }

    /// Normalise `buffer` down to the threshold if its peak lies above it
    ///
    /// Buffers at or under the threshold are returned unmodified.
    pub fn guard(&self, buffer: &AudioBuffer) -> AudioBuffer {
        let peak_dbfs = buffer.peak_dbfs();
        if peak_dbfs <= self.clip_threshold_dbfs {
            return buffer.clone();
        }
        debug!(
            "Peak {:.2} dBFS above {:.2} dBFS ceiling, normalising",
            peak_dbfs, self.clip_threshold_dbfs
        );
        buffer.normalized_peak(self.clip_threshold_dbfs)
    }

    /// Guard two related tracks with one shared scale factor
    ///
    /// Used for the single-stance exports of one population: if the louder
    /// of the two peaks above the threshold, both are scaled by the same
    /// amount so their relative loudness survives.
    pub fn guard_pair(&self, a: &AudioBuffer, b: &AudioBuffer) -> (AudioBuffer, AudioBuffer) {
        let peak = a.peak().max(b.peak());
        let ceiling = db_to_linear(self.clip_threshold_dbfs);
        if peak <= ceiling {
            return (a.clone(), b.clone());
        }
        let mut factor = ceiling / peak;
        // Keep f32 rounding from landing a hair over the ceiling
        while (peak as f32 * factor as f32) as f64 > ceiling {
            factor *= 1.0 - f32::EPSILON as f64;
        }
        (a.scaled(factor), b.scaled(factor))
    }
}

impl Default for CrowdMixer {
    fn default() -> Self {
        Self::new(DEFAULT_CLIP_THRESHOLD_DBFS)
    }
}
