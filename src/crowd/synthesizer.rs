//! Crowd Synthesizer
//!
//! Turns one utterance into a "crowd" of `virtual_size` voices without
//! rendering one layer per voice. Loudness follows intensity summation for
//! incoherent sources (`10·log10(N)` dB over a single voice), while texture
//! comes from a bounded number of real, individually jittered layers.

use log::debug;
use rand::Rng;

use crate::config::CrowdConfig;
use crate::engine::AudioBuffer;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of real copies summed for any crowd size
pub const DEFAULT_LAYER_CAP: usize = 50;

/// Upper bound of the random leading silence per copy, in milliseconds
pub const DEFAULT_JITTER_MS: u32 = 30;

// ============================================================================
// Crowd Math
// ============================================================================

/// Number of real layers rendered for a crowd of `virtual_size` voices
///
/// `min(floor(sqrt(virtual_size)), cap)`: grows sub-linearly and never
/// exceeds `cap`.
pub fn layer_count(virtual_size: u32, cap: usize) -> usize {
    (integer_sqrt(virtual_size as u64) as usize).min(cap)
}

/// Loudness gain in dB for `virtual_size` incoherent voices
///
/// Zero voices has no meaningful gain; callers render silence instead.
pub fn target_gain_db(virtual_size: u32) -> f64 {
    if virtual_size == 0 {
        return f64::NEG_INFINITY;
    }
    10.0 * (virtual_size as f64).log10()
}

/// Attenuation in dB applied to every layer after the first
pub fn layer_headroom_db(layers: usize) -> f64 {
    if layers == 0 {
        return 0.0;
    }
    3.0 * (layers as f64).log10()
}

fn integer_sqrt(n: u64) -> u64 {
    let mut root = (n as f64).sqrt() as u64;
    while root * root > n {
        root -= 1;
    }
    while (root + 1) * (root + 1) <= n {
        root += 1;
    }
    root
}

// ============================================================================
// Crowd Synthesizer
// ============================================================================

/// Renders crowd buffers from a single base utterance
///
/// Crowd sizes are unsigned, so a negative size cannot reach the
/// synthesizer; callers derive sizes from [`crate::pipeline::VoiceCounts`].
///
/// # Example
/// ```
/// use consensus_crowd::crowd::CrowdSynthesizer;
/// use consensus_crowd::engine::generate_test_tone;
/// use consensus_crowd::crowd::rng::create_rng;
///
/// let base = generate_test_tone(220.0, 0.5, 24000).gained(-30.0);
/// let synth = CrowdSynthesizer::default();
/// let crowd = synth.synthesize(&base, 100, true, &mut create_rng(1));
/// assert_eq!(synth.layer_count(100), 10);
/// assert!(crowd.len() >= base.len());
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CrowdSynthesizer {
    layer_cap: usize,
    jitter_ms: u32,
}

impl CrowdSynthesizer {
    /// Create a synthesizer with an explicit layer cap and jitter bound
    ///
    /// A cap of zero is raised to one so every non-empty crowd keeps at
    /// least its first copy.
    pub fn new(layer_cap: usize, jitter_ms: u32) -> Self {
        Self {
            layer_cap: layer_cap.max(1),
            jitter_ms,
        }
    }

    /// Create a synthesizer from the run configuration
    pub fn from_config(config: &CrowdConfig) -> Self {
        Self::new(config.layer_cap, config.jitter_ms)
    }

    /// Maximum number of real layers
    pub fn layer_cap(&self) -> usize {
        self.layer_cap
    }

    /// Upper bound of the per-copy leading silence in milliseconds
    pub fn jitter_ms(&self) -> u32 {
        self.jitter_ms
    }

    /// Real layers rendered for `virtual_size` voices under this cap
    pub fn layer_count(&self, virtual_size: u32) -> usize {
        layer_count(virtual_size, self.layer_cap)
    }

    /// Render a crowd of `virtual_size` voices speaking `base`
    ///
    /// * `0` - silence with the duration of `base`
    /// * `1` - `base`, optionally behind a random leading silence
    /// * `n > 1` - `layer_count(n)` jittered copies, all but the first
    ///   attenuated by `layer_headroom_db`, summed and raised by
    ///   `target_gain_db(n)`
    ///
    /// The result keeps the length of the first (accumulator) copy; later
    /// copies that run past it are truncated. Jitter draws come from `rng`
    /// in layer order, one per copy.
    pub fn synthesize<R: Rng + ?Sized>(
        &self,
        base: &AudioBuffer,
        virtual_size: u32,
        jitter: bool,
        rng: &mut R,
    ) -> AudioBuffer {
        match virtual_size {
            0 => AudioBuffer::silent_like(base),
            1 => self.jittered(base, jitter, rng),
            n => {
                let layers = self.layer_count(n);
                let headroom_db = layer_headroom_db(layers);
                let gain_db = target_gain_db(n);

                debug!(
                    "Crowd of {} voices: {} layers, -{:.2} dB per extra layer, +{:.2} dB overall",
                    n, layers, headroom_db, gain_db
                );

                let mut accumulator = self.jittered(base, jitter, rng);
                for _ in 1..layers {
                    let layer = self.jittered(base, jitter, rng).gained(-headroom_db);
                    accumulator = accumulator.overlay_unchecked(&layer);
                }

                accumulator.gained(gain_db)
            }
        }
    }

    fn jittered<R: Rng + ?Sized>(&self, base: &AudioBuffer, jitter: bool, rng: &mut R) -> AudioBuffer {
        if !jitter {
            return base.clone();
        }
        let offset_ms = rng.gen_range(0..=self.jitter_ms);
        base.with_leading_silence(offset_ms)
    }
}

impl Default for CrowdSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_LAYER_CAP, DEFAULT_JITTER_MS)
    }
}

// ============================================================================
// Tests
// ============================================================================
