//! Offline speech stand-in
//!
//! `WhisperSpeech` does no real text-to-speech. It renders one
//! noise-excited "syllable" per word, coloured per accent and normalised
//! to a fixed speaking level, so the crowd pipeline can run (and be
//! tested) without a speech service. Output is a pure function of the
//! text and voice.

use rand::Rng;

use super::{SpeechError, SpeechSynthesizer, VoiceVariant};
use crate::crowd::rng::create_rng;
use crate::engine::{db_to_linear, AudioBuffer, DEFAULT_SAMPLE_RATE};

/// Speaking level of generated utterances
const TARGET_RMS_DBFS: f64 = -20.0;

const WORD_MS: u32 = 180;
const GAP_MS: u32 = 40;

/// Deterministic noise-syllable speech
#[derive(Debug, Clone)]
pub struct WhisperSpeech {
    sample_rate: u32,
    fail_on: Option<VoiceVariant>,
}

impl WhisperSpeech {
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            fail_on: None,
        }
    }

    /// Simulate a service outage for one voice
    pub fn failing_on(mut self, voice: VoiceVariant) -> Self {
        self.fail_on = Some(voice);
        self
    }

    fn seed_for(text: &str, voice: VoiceVariant) -> u64 {
        let hash = blake3::hash(format!("{}|{}", voice.tld(), text).as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&hash.as_bytes()[0..8]);
        u64::from_le_bytes(bytes)
    }

    /// One-pole low-pass coefficient giving each accent its own colour
    fn smoothing(voice: VoiceVariant) -> f32 {
        match voice {
            VoiceVariant::Us => 0.35,
            VoiceVariant::Uk => 0.55,
            VoiceVariant::Australia => 0.45,
            VoiceVariant::India => 0.25,
            VoiceVariant::Canada => 0.65,
        }
    }
}

impl Default for WhisperSpeech {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_RATE)
    }
}

impl SpeechSynthesizer for WhisperSpeech {
    fn name(&self) -> &str {
        "whisper"
    }

    fn synthesize(&self, text: &str, voice: VoiceVariant) -> Result<AudioBuffer, SpeechError> {
        if self.fail_on == Some(voice) {
            return Err(SpeechError::new(format!(
                "voice '{}' unavailable (simulated outage)",
                voice.tld()
            )));
        }

        let words = text.split_whitespace().count().max(1);
        let word_len = (WORD_MS as u64 * self.sample_rate as u64 / 1000) as usize;
        let gap_len = (GAP_MS as u64 * self.sample_rate as u64 / 1000) as usize;

        let mut rng = create_rng(Self::seed_for(text, voice));
        let smoothing = Self::smoothing(voice);
        let mut samples = Vec::with_capacity(words * (word_len + gap_len) + gap_len);
        let mut state = 0.0_f32;

        samples.resize(gap_len, 0.0);
        for _ in 0..words {
            for i in 0..word_len {
                let noise: f32 = rng.gen_range(-1.0..1.0);
                state = smoothing * state + (1.0 - smoothing) * noise;
                // Hann envelope per syllable
                let phase = i as f32 / word_len.max(1) as f32;
                let envelope = 0.5 - 0.5 * (2.0 * std::f32::consts::PI * phase).cos();
                samples.push(state * envelope);
            }
            samples.resize(samples.len() + gap_len, 0.0);
        }

        let utterance = AudioBuffer::from_mono(samples, self.sample_rate);
        let rms = db_to_linear(utterance.rms_dbfs());
        if rms <= 0.0 {
            return Err(SpeechError::new("generated utterance is silent"));
        }
        Ok(utterance.scaled(db_to_linear(TARGET_RMS_DBFS) / rms))
    }
}
