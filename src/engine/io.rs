//! WAV file I/O
//!
//! Decodes utterances into float buffers and encodes crowd tracks.
//! Resampling uses linear interpolation, which is adequate for speech
//! conformed between the usual TTS rates.

use std::fs;
use std::io::{Cursor, Read, Seek, Write};
use std::path::Path;

use log::warn;

use hound::{SampleFormat, WavReader, WavSpec, WavWriter};

use crate::engine::buffer::{AudioBuffer, ChannelLayout};
use crate::error::{CrowdError, Result};

/// Bit depths accepted by [`export_wav`]
pub const SUPPORTED_BIT_DEPTHS: [u16; 3] = [16, 24, 32];

/// Import a WAV file as a float buffer at its native rate and layout
///
/// # Errors
/// * `FileNotFound` - If the file does not exist
/// * `InvalidAudio` - If the file is not a valid WAV file
/// * `UnsupportedFormat` - If the audio has more than 2 channels
pub fn import_wav(path: &Path) -> Result<AudioBuffer> {
    if !path.exists() {
        return Err(CrowdError::FileNotFound {
            path: path.display().to_string(),
        });
    }

    let reader = WavReader::open(path).map_err(|e| CrowdError::InvalidAudio {
        reason: format!("Failed to open WAV file {}: {}", path.display(), e),
        source: Some(Box::new(e)),
    })?;

    read_buffer(reader)
}

/// Decode an in-memory WAV payload (e.g. a speech service response)
pub fn decode_wav_bytes(bytes: &[u8]) -> Result<AudioBuffer> {
    let reader = WavReader::new(Cursor::new(bytes)).map_err(|e| CrowdError::InvalidAudio {
        reason: format!("Failed to parse WAV payload: {}", e),
        source: Some(Box::new(e)),
    })?;

    read_buffer(reader)
}

/// Export a buffer to a WAV file
///
/// 16 and 24-bit exports are integer PCM and clamp samples to full scale;
/// 32-bit exports are IEEE float and store samples as-is.
pub fn export_wav(buffer: &AudioBuffer, path: &Path, bit_depth: u16) -> Result<()> {
    let encoding_error = |e: hound::Error| CrowdError::Encoding {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let spec = WavSpec {
        channels: buffer.channels() as u16,
        sample_rate: buffer.sample_rate(),
        bits_per_sample: bit_depth,
        sample_format: if bit_depth == 32 {
            SampleFormat::Float
        } else {
            SampleFormat::Int
        },
    };

    if !SUPPORTED_BIT_DEPTHS.contains(&bit_depth) {
        return Err(CrowdError::UnsupportedFormat {
            format: format!("{}-bit audio (only 16, 24, 32 supported)", bit_depth),
        });
    }

    let writer = WavWriter::create(path, spec).map_err(encoding_error)?;

    // A failed export must not leave a truncated file behind
    if let Err(e) = write_samples(writer, buffer, bit_depth) {
        if let Err(remove_err) = fs::remove_file(path) {
            warn!("Could not remove partial file {}: {}", path.display(), remove_err);
        }
        return Err(encoding_error(e));
    }

    Ok(())
}

fn write_samples<W: Write + Seek>(
    mut writer: WavWriter<W>,
    buffer: &AudioBuffer,
    bit_depth: u16,
) -> std::result::Result<(), hound::Error> {
    let interleaved = buffer.to_interleaved();
    match bit_depth {
        16 => {
            for sample in interleaved {
                let scaled = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
                writer.write_sample(scaled)?;
            }
        }
        24 => {
            for sample in interleaved {
                // 24-bit stored as i32 in hound
                let scaled = (sample * 8388607.0).clamp(-8388608.0, 8388607.0) as i32;
                writer.write_sample(scaled)?;
            }
        }
        _ => {
            for sample in interleaved {
                writer.write_sample(sample)?;
            }
        }
    }
    writer.finalize()
}

/// Bring a decoded utterance to the processing format: mono at `sample_rate`
pub fn conform(buffer: &AudioBuffer, sample_rate: u32) -> AudioBuffer {
    let mono = buffer.to_mono();
    if mono.sample_rate() == sample_rate || mono.is_empty() {
        return AudioBuffer::from_mono(mono.channel(0).to_vec(), sample_rate);
    }
    let ratio = sample_rate as f64 / mono.sample_rate() as f64;
    AudioBuffer::from_mono(resample_linear(mono.channel(0), ratio), sample_rate)
}

/// Generate a mono sine tone
pub fn generate_test_tone(frequency: f32, duration_secs: f32, sample_rate: u32) -> AudioBuffer {
    let num_samples = (duration_secs * sample_rate as f32) as usize;
    let angular_freq = 2.0 * std::f32::consts::PI * frequency / sample_rate as f32;
    let samples = (0..num_samples)
        .map(|i| (angular_freq * i as f32).sin())
        .collect();
    AudioBuffer::from_mono(samples, sample_rate)
}

// ============================================================================
// Internal helper functions
// ============================================================================

fn read_buffer<R: Read>(reader: WavReader<R>) -> Result<AudioBuffer> {
    let spec = reader.spec();
    let layout = ChannelLayout::from_count(spec.channels as usize).ok_or_else(|| {
        CrowdError::UnsupportedFormat {
            format: format!(
                "{}-channel audio (only mono/stereo supported)",
                spec.channels
            ),
        }
    })?;

    let samples = read_samples_as_f32(reader, spec.bits_per_sample, spec.sample_format)?;
    AudioBuffer::from_interleaved(&samples, layout, spec.sample_rate)
}

/// Read samples from WAV reader and convert to f32
fn read_samples_as_f32<R: Read>(
    mut reader: WavReader<R>,
    bits_per_sample: u16,
    sample_format: SampleFormat,
) -> Result<Vec<f32>> {
    let read_error = |e: hound::Error| CrowdError::InvalidAudio {
        reason: format!("Failed to read {}-bit samples: {}", bits_per_sample, e),
        source: Some(Box::new(e)),
    };

    match (sample_format, bits_per_sample) {
        (SampleFormat::Float, _) => reader
            .samples::<f32>()
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_error),
        (SampleFormat::Int, 8) => reader
            .samples::<i8>()
            .map(|s| s.map(|v| v as f32 / 128.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_error),
        (SampleFormat::Int, 16) => reader
            .samples::<i16>()
            .map(|s| s.map(|v| v as f32 / 32768.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_error),
        (SampleFormat::Int, 24) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 8388608.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_error),
        (SampleFormat::Int, 32) => reader
            .samples::<i32>()
            .map(|s| s.map(|v| v as f32 / 2147483648.0))
            .collect::<std::result::Result<Vec<f32>, _>>()
            .map_err(read_error),
        (SampleFormat::Int, bits) => Err(CrowdError::UnsupportedFormat {
            format: format!("{}-bit integer audio", bits),
        }),
    }
}

/// Linear interpolation resampling
fn resample_linear(samples: &[f32], ratio: f64) -> Vec<f32> {
    if samples.is_empty() {
        return Vec::new();
    }

    let source_len = samples.len();
    let target_len = ((source_len as f64) * ratio).ceil() as usize;
    let mut output = Vec::with_capacity(target_len);

    for i in 0..target_len {
        let src_pos = i as f64 / ratio;
        let src_idx = src_pos.floor() as usize;
        let frac = (src_pos - src_idx as f64) as f32;

        let sample = if src_idx + 1 < source_len {
            samples[src_idx] * (1.0 - frac) + samples[src_idx + 1] * frac
        } else if src_idx < source_len {
            samples[src_idx]
        } else {
            0.0
        };

        output.push(sample);
    }

    output
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_generate_test_tone() {
        let buffer = generate_test_tone(440.0, 1.0, 24000);
        assert_eq!(buffer.len(), 24000);
        assert_eq!(buffer.channels(), 1);
        // Near the half-cycle the sine crosses zero
        let half_cycle = (24000.0 / 440.0 / 2.0) as usize;
        assert!(buffer.channel(0)[half_cycle].abs() < 0.1);
    }

    #[test]
    fn test_round_trip_16bit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tone16.wav");
        let original = generate_test_tone(1000.0, 0.2, 24000).gained(-6.0);

        export_wav(&original, &path, 16).unwrap();
        let imported = import_wav(&path).unwrap();

        assert_eq!(imported.len(), original.len());
        assert_eq!(imported.sample_rate(), 24000);
        for (orig, imp) in original.channel(0).iter().zip(imported.channel(0)) {
            assert!((orig - imp).abs() < 0.001, "{} vs {}", orig, imp);
        }
    }

    #[test]
    fn test_round_trip_32bit_float_keeps_overs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loud.wav");
        let loud = AudioBuffer::from_mono(vec![0.0, 2.5, -3.0], 24000);

        export_wav(&loud, &path, 32).unwrap();
        let imported = import_wav(&path).unwrap();
        assert_eq!(imported.channel(0), loud.channel(0));
    }

    #[test]
    fn test_decode_wav_bytes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let stereo =
            AudioBuffer::from_interleaved(&[0.5, -0.5, 0.25, -0.25], ChannelLayout::Stereo, 16000)
                .unwrap();
        export_wav(&stereo, &path, 24).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let decoded = decode_wav_bytes(&bytes).unwrap();
        assert_eq!(decoded.channels(), 2);
        assert_eq!(decoded.len(), 2);

        assert!(decode_wav_bytes(b"not a wav file").is_err());
    }

    #[test]
    fn test_export_rejects_unsupported_bit_depth() {
        let dir = tempdir().unwrap();
        let buffer = generate_test_tone(440.0, 0.1, 24000);
        let err = export_wav(&buffer, &dir.path().join("x.wav"), 12).unwrap_err();
        assert_eq!(err.error_code(), "UNSUPPORTED_FORMAT");
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_failed_export_leaves_no_file() {
        // Writes through a link to /dev/full fail with ENOSPC
        let full = Path::new("/dev/full");
        if !full.exists() {
            return;
        }
        let dir = tempdir().unwrap();
        let path = dir.path().join("00_sci_both.wav");
        std::os::unix::fs::symlink(full, &path).unwrap();

        let buffer = generate_test_tone(440.0, 0.1, 24000);
        let err = export_wav(&buffer, &path, 16).unwrap_err();

        assert_eq!(err.error_code(), "ENCODING");
        assert!(fs::symlink_metadata(&path).is_err());
        assert!(full.exists());
    }

    #[test]
    fn test_import_nonexistent_file() {
        match import_wav(Path::new("/nonexistent/path/audio.wav")).unwrap_err() {
            CrowdError::FileNotFound { path } => assert!(path.contains("nonexistent")),
            other => panic!("Expected FileNotFound error, got: {:?}", other),
        }
    }

    #[test]
    fn test_conform_downmixes_and_resamples() {
        let stereo = AudioBuffer::from_channels(vec![vec![0.5; 100], vec![0.0; 100]], 12000)
            .unwrap();
        let conformed = conform(&stereo, 24000);
        assert_eq!(conformed.channels(), 1);
        assert_eq!(conformed.sample_rate(), 24000);
        assert_eq!(conformed.len(), 200);
        assert!((conformed.channel(0)[10] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_resample_linear_upsample() {
        let resampled = resample_linear(&[0.0, 1.0, 0.0], 2.0);
        assert_eq!(resampled.len(), 6);
        assert!((resampled[1] - 0.5).abs() < 0.01);
    }
}
