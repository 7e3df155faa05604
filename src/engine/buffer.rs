//! Audio Buffer
//!
//! Immutable audio value type used by every crowd stage. Operations that
//! change audio (gain, padding, overlay, normalisation) return a new buffer
//! and leave the receiver untouched.

use crate::error::{CrowdError, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default sample rate for synthesized utterances (24kHz speech)
pub const DEFAULT_SAMPLE_RATE: u32 = 24000;

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert decibels to linear amplitude
#[inline]
pub fn db_to_linear(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert linear amplitude to decibels
///
/// Returns `f64::NEG_INFINITY` for zero input.
#[inline]
pub fn linear_to_db(linear: f64) -> f64 {
    if linear <= 0.0 {
        f64::NEG_INFINITY
    } else {
        20.0 * linear.log10()
    }
}

// ============================================================================
// Channel Layout
// ============================================================================

/// Audio channel configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChannelLayout {
    /// Single channel (mono)
    #[default]
    Mono,
    /// Two channels (stereo: left, right)
    Stereo,
}

impl ChannelLayout {
    /// Returns the number of channels for this layout
    pub fn num_channels(&self) -> usize {
        match self {
            ChannelLayout::Mono => 1,
            ChannelLayout::Stereo => 2,
        }
    }

    /// Create a ChannelLayout from a channel count
    pub fn from_count(count: usize) -> Option<Self> {
        match count {
            1 => Some(ChannelLayout::Mono),
            2 => Some(ChannelLayout::Stereo),
            _ => None,
        }
    }
}

// ============================================================================
// Audio Buffer
// ============================================================================

/// Non-interleaved 32-bit float PCM audio at a fixed sample rate
///
/// # Example
/// ```
/// use consensus_crowd::engine::{AudioBuffer, ChannelLayout};
///
/// let silence = AudioBuffer::silent(24000, ChannelLayout::Mono, 24000);
/// let padded = silence.with_leading_silence(500);
/// assert_eq!(silence.len(), 24000);
/// assert_eq!(padded.len(), 36000);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct AudioBuffer {
    /// Outer Vec is channels, inner Vec is samples
    samples: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioBuffer {
    /// Create a silent buffer with the given length and layout
    pub fn silent(num_samples: usize, layout: ChannelLayout, sample_rate: u32) -> Self {
        Self {
            samples: vec![vec![0.0_f32; num_samples]; layout.num_channels()],
            sample_rate,
        }
    }

    /// Create a silent buffer with the same format and duration as `other`
    pub fn silent_like(other: &AudioBuffer) -> Self {
        Self {
            samples: vec![vec![0.0_f32; other.len()]; other.channels()],
            sample_rate: other.sample_rate,
        }
    }

    /// Create a mono buffer from raw samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: vec![samples],
            sample_rate,
        }
    }

    /// Create a buffer from per-channel sample vectors
    ///
    /// All channels must have the same length, and only mono or stereo
    /// layouts are accepted.
    pub fn from_channels(channels: Vec<Vec<f32>>, sample_rate: u32) -> Result<Self> {
        if ChannelLayout::from_count(channels.len()).is_none() {
            return Err(CrowdError::UnsupportedFormat {
                format: format!("{}-channel audio (only mono/stereo supported)", channels.len()),
            });
        }
        let len = channels[0].len();
        if channels.iter().any(|ch| ch.len() != len) {
            return Err(CrowdError::InvalidAudio {
                reason: "channels have different lengths".to_string(),
                source: None,
            });
        }
        Ok(Self {
            samples: channels,
            sample_rate,
        })
    }

    /// Create an audio buffer from interleaved sample data
    pub fn from_interleaved(
        interleaved: &[f32],
        layout: ChannelLayout,
        sample_rate: u32,
    ) -> Result<Self> {
        let num_channels = layout.num_channels();

        if interleaved.len() % num_channels != 0 {
            return Err(CrowdError::InvalidAudio {
                reason: format!(
                    "Interleaved data length {} is not divisible by channel count {}",
                    interleaved.len(),
                    num_channels
                ),
                source: None,
            });
        }

        let num_samples = interleaved.len() / num_channels;
        let mut samples = vec![Vec::with_capacity(num_samples); num_channels];

        for frame in interleaved.chunks_exact(num_channels) {
            for (ch, &sample) in frame.iter().enumerate() {
                samples[ch].push(sample);
            }
        }

        Ok(Self {
            samples,
            sample_rate,
        })
    }

    /// Convert the buffer to interleaved format (L, R, L, R, ... for stereo)
    pub fn to_interleaved(&self) -> Vec<f32> {
        let mut interleaved = Vec::with_capacity(self.channels() * self.len());
        for sample_idx in 0..self.len() {
            for channel in &self.samples {
                interleaved.push(channel[sample_idx]);
            }
        }
        interleaved
    }

    /// Get the number of channels
    #[inline]
    pub fn channels(&self) -> usize {
        self.samples.len()
    }

    /// Get the number of samples per channel
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.first().map(|ch| ch.len()).unwrap_or(0)
    }

    /// Check if the buffer is empty (no samples)
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sample rate in Hz
    #[inline]
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Get the duration in seconds
    #[inline]
    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.len() as f64 / self.sample_rate as f64
    }

    /// Get immutable access to a channel's samples
    ///
    /// # Panics
    /// Panics if the channel index is out of bounds
    #[inline]
    pub fn channel(&self, index: usize) -> &[f32] {
        &self.samples[index]
    }

    /// Get a sample at the specified channel and index
    #[inline]
    pub fn get_sample(&self, channel: usize, index: usize) -> Option<f32> {
        self.samples
            .get(channel)
            .and_then(|ch| ch.get(index).copied())
    }

    /// Number of samples covering `ms` milliseconds at this buffer's rate
    pub fn ms_to_samples(&self, ms: u32) -> usize {
        (ms as u64 * self.sample_rate as u64 / 1000) as usize
    }

    /// Check that `other` can be summed with this buffer
    pub fn ensure_same_format(&self, other: &AudioBuffer) -> Result<()> {
        if self.sample_rate != other.sample_rate || self.channels() != other.channels() {
            return Err(CrowdError::FormatMismatch {
                expected: self.format_label(),
                found: other.format_label(),
            });
        }
        Ok(())
    }

    fn format_label(&self) -> String {
        format!("{} Hz / {} ch", self.sample_rate, self.channels())
    }

    // ------------------------------------------------------------------------
    // Transforms
    // ------------------------------------------------------------------------

    /// Prepend `ms` milliseconds of silence
    pub fn with_leading_silence(&self, ms: u32) -> Self {
        let pad = self.ms_to_samples(ms);
        if pad == 0 {
            return self.clone();
        }
        let samples = self
            .samples
            .iter()
            .map(|ch| {
                let mut out = Vec::with_capacity(pad + ch.len());
                out.resize(pad, 0.0);
                out.extend_from_slice(ch);
                out
            })
            .collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Extend with trailing silence up to `num_samples` per channel
    ///
    /// Buffers already at least that long are returned unchanged.
    pub fn padded_to(&self, num_samples: usize) -> Self {
        if self.len() >= num_samples {
            return self.clone();
        }
        let samples = self
            .samples
            .iter()
            .map(|ch| {
                let mut out = ch.clone();
                out.resize(num_samples, 0.0);
                out
            })
            .collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Multiply every sample by a linear factor
    pub fn scaled(&self, factor: f64) -> Self {
        let factor = factor as f32;
        let samples = self
            .samples
            .iter()
            .map(|ch| ch.iter().map(|&s| s * factor).collect())
            .collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Apply a gain in decibels
    pub fn gained(&self, gain_db: f64) -> Self {
        if gain_db == 0.0 {
            return self.clone();
        }
        self.scaled(db_to_linear(gain_db))
    }

    /// Sum `other` onto this buffer sample by sample
    ///
    /// The result keeps this buffer's length: `other` is truncated if it is
    /// longer and contributes silence past its end if it is shorter.
    pub fn overlay(&self, other: &AudioBuffer) -> Result<Self> {
        self.ensure_same_format(other)?;
        Ok(self.overlay_unchecked(other))
    }

    /// Overlay for buffers already known to share a format
    pub(crate) fn overlay_unchecked(&self, other: &AudioBuffer) -> Self {
        debug_assert_eq!(self.sample_rate, other.sample_rate);
        debug_assert_eq!(self.channels(), other.channels());
        let samples = self
            .samples
            .iter()
            .zip(&other.samples)
            .map(|(base, top)| {
                let mut out = base.clone();
                for (dst, &src) in out.iter_mut().zip(top.iter()) {
                    *dst += src;
                }
                out
            })
            .collect();
        Self {
            samples,
            sample_rate: self.sample_rate,
        }
    }

    /// Downmix to a single channel by averaging
    pub fn to_mono(&self) -> Self {
        if self.channels() <= 1 {
            return self.clone();
        }
        let n = self.channels() as f32;
        let mono = (0..self.len())
            .map(|i| self.samples.iter().map(|ch| ch[i]).sum::<f32>() / n)
            .collect();
        Self::from_mono(mono, self.sample_rate)
    }

    /// Scale the whole buffer so its peak sits exactly at `target_dbfs`
    ///
    /// Silent buffers are returned unchanged. The resulting peak never lies
    /// above the target.
    pub fn normalized_peak(&self, target_dbfs: f64) -> Self {
        let peak = self.peak();
        if peak <= 0.0 {
            return self.clone();
        }
        let target = db_to_linear(target_dbfs);
        let mut normalized = self.scaled(target / peak);
        // f32 rounding can land one ulp above the target
        while normalized.peak() > target {
            normalized = normalized.scaled(1.0 - f32::EPSILON as f64);
        }
        normalized
    }

    // ------------------------------------------------------------------------
    // Metering
    // ------------------------------------------------------------------------

    /// Absolute peak sample value across all channels
    pub fn peak(&self) -> f64 {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|&s| s.abs())
            .fold(0.0_f32, f32::max) as f64
    }

    /// Peak level in dBFS (`-inf` for silence)
    pub fn peak_dbfs(&self) -> f64 {
        linear_to_db(self.peak())
    }

    /// RMS level in dBFS across all channels (`-inf` for silent or empty buffers)
    pub fn rms_dbfs(&self) -> f64 {
        let total = self.channels() * self.len();
        if total == 0 {
            return f64::NEG_INFINITY;
        }
        let sum_squares: f64 = self
            .samples
            .iter()
            .flat_map(|ch| ch.iter())
            .map(|&s| (s as f64) * (s as f64))
            .sum();
        linear_to_db((sum_squares / total as f64).sqrt())
    }

    /// True when every sample is exactly zero
    pub fn is_silent(&self) -> bool {
        self.samples.iter().flat_map(|ch| ch.iter()).all(|&s| s == 0.0)
    }

    /// Check if all samples are finite (not NaN or Infinity)
    pub fn is_finite(&self) -> bool {
        self.samples
            .iter()
            .flat_map(|ch| ch.iter())
            .all(|s| s.is_finite())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ramp(len: usize) -> AudioBuffer {
        AudioBuffer::from_mono((0..len).map(|i| i as f32 / len as f32).collect(), 1000)
    }

    #[test]
    fn test_db_conversions() {
        assert_relative_eq!(db_to_linear(-6.0), 0.501187, epsilon = 1e-5);
        assert_relative_eq!(db_to_linear(20.0), 10.0, epsilon = 1e-9);
        assert_relative_eq!(linear_to_db(0.5), -6.0206, epsilon = 1e-3);
        assert_eq!(linear_to_db(0.0), f64::NEG_INFINITY);
    }

    #[test]
    fn test_channel_layout() {
        assert_eq!(ChannelLayout::Mono.num_channels(), 1);
        assert_eq!(ChannelLayout::from_count(2), Some(ChannelLayout::Stereo));
        assert_eq!(ChannelLayout::from_count(6), None);
    }

    #[test]
    fn test_silent_like_matches_duration() {
        let base = ramp(250);
        let silence = AudioBuffer::silent_like(&base);
        assert_eq!(silence.len(), 250);
        assert_eq!(silence.sample_rate(), 1000);
        assert!(silence.is_silent());
        assert_eq!(silence.peak_dbfs(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_leading_silence_does_not_touch_original() {
        let base = ramp(100);
        let shifted = base.with_leading_silence(30);
        assert_eq!(base.len(), 100);
        assert_eq!(shifted.len(), 130);
        assert_eq!(shifted.get_sample(0, 29), Some(0.0));
        assert_eq!(shifted.get_sample(0, 31), base.get_sample(0, 1));
    }

    #[test]
    fn test_padded_to() {
        let base = ramp(100);
        assert_eq!(base.padded_to(150).len(), 150);
        assert_eq!(base.padded_to(50).len(), 100);
        assert_eq!(base.padded_to(150).get_sample(0, 149), Some(0.0));
    }

    #[test]
    fn test_overlay_keeps_receiver_length() {
        let short = ramp(50);
        let long = ramp(80);
        let a = short.overlay(&long).unwrap();
        assert_eq!(a.len(), 50);
        assert_relative_eq!(a.channel(0)[10], 0.2 + 0.125, epsilon = 1e-6);

        let b = long.overlay(&short).unwrap();
        assert_eq!(b.len(), 80);
        assert_eq!(b.channel(0)[60], long.channel(0)[60]);
    }

    #[test]
    fn test_overlay_rejects_format_mismatch() {
        let a = AudioBuffer::silent(10, ChannelLayout::Mono, 24000);
        let b = AudioBuffer::silent(10, ChannelLayout::Mono, 44100);
        let err = a.overlay(&b).unwrap_err();
        assert_eq!(err.error_code(), "FORMAT_MISMATCH");

        let c = AudioBuffer::silent(10, ChannelLayout::Stereo, 24000);
        assert!(a.overlay(&c).is_err());
    }

    #[test]
    fn test_gained() {
        let base = AudioBuffer::from_mono(vec![0.1; 10], 1000);
        let louder = base.gained(20.0);
        assert_relative_eq!(louder.peak(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(louder.peak_dbfs() - base.peak_dbfs(), 20.0, epsilon = 1e-4);
    }

    #[test]
    fn test_normalized_peak() {
        let loud = AudioBuffer::from_mono(vec![0.0, 3.0, -6.0, 1.0], 1000);
        let normalized = loud.normalized_peak(-1.0);
        assert_relative_eq!(normalized.peak_dbfs(), -1.0, epsilon = 1e-4);
        // Balance between samples is preserved
        assert_relative_eq!(
            normalized.channel(0)[1] / normalized.channel(0)[2],
            -0.5,
            epsilon = 1e-6
        );

        let silence = AudioBuffer::silent(4, ChannelLayout::Mono, 1000);
        assert_eq!(silence.normalized_peak(-1.0), silence);
    }

    #[test]
    fn test_interleave_and_mono() {
        let stereo =
            AudioBuffer::from_interleaved(&[1.0, 0.0, 0.5, 0.5], ChannelLayout::Stereo, 1000)
                .unwrap();
        assert_eq!(stereo.channels(), 2);
        assert_eq!(stereo.len(), 2);
        assert_eq!(stereo.to_interleaved(), vec![1.0, 0.0, 0.5, 0.5]);

        let mono = stereo.to_mono();
        assert_eq!(mono.channels(), 1);
        assert_eq!(mono.channel(0), &[0.5, 0.5]);
    }

    #[test]
    fn test_from_channels_validation() {
        assert!(AudioBuffer::from_channels(vec![vec![0.0; 3], vec![0.0; 4]], 1000).is_err());
        assert!(AudioBuffer::from_channels(vec![vec![0.0; 3]; 3], 1000).is_err());
        assert!(AudioBuffer::from_channels(vec![vec![0.0; 3]; 2], 1000).is_ok());
    }

    #[test]
    fn test_rms_dbfs() {
        let full = AudioBuffer::from_mono(vec![1.0, -1.0, 1.0, -1.0], 1000);
        assert_relative_eq!(full.rms_dbfs(), 0.0, epsilon = 1e-9);
        let empty = AudioBuffer::from_mono(Vec::new(), 1000);
        assert_eq!(empty.rms_dbfs(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_ms_to_samples() {
        let buf = AudioBuffer::silent(0, ChannelLayout::Mono, 24000);
        assert_eq!(buf.ms_to_samples(30), 720);
        assert_eq!(buf.ms_to_samples(0), 0);
    }
}
