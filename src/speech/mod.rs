//! Speech collaborators
//!
//! The crowd engine needs exactly two utterances per record: the statement
//! voiced in agreement and in disagreement. This module defines how they
//! are phrased and the [`SpeechSynthesizer`] seam that renders them:
//! - `HttpSpeech` - a text-to-speech service (feature `tts-http`)
//! - `WhisperSpeech` - deterministic offline stand-in
//! - `CachedSpeech` - on-disk utterance cache around any synthesizer

mod cache;
#[cfg(feature = "tts-http")]
mod http;
mod mock;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::AudioBuffer;
use crate::error::CrowdError;

pub use cache::CachedSpeech;
#[cfg(feature = "tts-http")]
pub use http::HttpSpeech;
pub use mock::WhisperSpeech;

/// Longest utterance accepted from a speech collaborator, in seconds
pub const MAX_UTTERANCE_SECS: f64 = 30.0;

// ============================================================================
// Stance
// ============================================================================

/// Which side of a statement a crowd voices
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stance {
    Agree,
    Disagree,
}

impl Stance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stance::Agree => "agree",
            Stance::Disagree => "disagree",
        }
    }

    /// The sentence a crowd of this stance speaks
    pub fn phrase(&self, statement: &str) -> String {
        match self {
            Stance::Agree => format!("I believe {}", statement),
            Stance::Disagree => format!("I don't believe {}", statement),
        }
    }

    /// Voice used for this stance; the two stances get distinct accents
    pub fn default_voice(&self) -> VoiceVariant {
        match self {
            Stance::Agree => VoiceVariant::Us,
            Stance::Disagree => VoiceVariant::Uk,
        }
    }
}

impl fmt::Display for Stance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Voice Variant
// ============================================================================

/// English accents offered by the speech service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VoiceVariant {
    Us,
    Uk,
    Australia,
    India,
    Canada,
}

impl VoiceVariant {
    pub const ALL: [VoiceVariant; 5] = [
        VoiceVariant::Us,
        VoiceVariant::Uk,
        VoiceVariant::Australia,
        VoiceVariant::India,
        VoiceVariant::Canada,
    ];

    /// Regional domain the speech service uses to pick the accent
    pub fn tld(&self) -> &'static str {
        match self {
            VoiceVariant::Us => "com",
            VoiceVariant::Uk => "co.uk",
            VoiceVariant::Australia => "com.au",
            VoiceVariant::India => "co.in",
            VoiceVariant::Canada => "ca",
        }
    }

}

impl FromStr for VoiceVariant {
    type Err = String;

    /// Accepts an accent name (`uk`) or its regional domain (`co.uk`)
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "us" | "com" => Ok(Self::Us),
            "uk" | "co.uk" => Ok(Self::Uk),
            "australia" | "au" | "com.au" => Ok(Self::Australia),
            "india" | "in" | "co.in" => Ok(Self::India),
            "canada" | "ca" => Ok(Self::Canada),
            _ => {
                let known: Vec<&str> = Self::ALL.iter().map(|v| v.tld()).collect();
                Err(format!("unknown voice '{}' (expected one of {})", s, known.join(", ")))
            }
        }
    }
}

impl fmt::Display for VoiceVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tld())
    }
}

// ============================================================================
// Synthesizer Trait
// ============================================================================

/// Failure reported by a speech collaborator
#[derive(Error, Debug)]
#[error("{reason}")]
pub struct SpeechError {
    pub reason: String,
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl SpeechError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            source: None,
        }
    }

    /// Attach the stance whose utterance failed
    pub fn for_stance(self, stance: Stance) -> CrowdError {
        CrowdError::SynthesisService {
            stance,
            reason: self.reason,
            source: self.source,
        }
    }
}

impl From<CrowdError> for SpeechError {
    fn from(err: CrowdError) -> Self {
        Self {
            reason: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

/// Renders text into a decoded utterance
pub trait SpeechSynthesizer {
    /// Short identifier for logs and the run manifest
    fn name(&self) -> &str;

    /// Speak `text` with `voice`, returning decoded PCM
    fn synthesize(&self, text: &str, voice: VoiceVariant) -> Result<AudioBuffer, SpeechError>;
}

impl<S: SpeechSynthesizer + ?Sized> SpeechSynthesizer for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn synthesize(&self, text: &str, voice: VoiceVariant) -> Result<AudioBuffer, SpeechError> {
        (**self).synthesize(text, voice)
    }
}

/// Reject utterances the crowd engine cannot use
pub fn check_utterance(buffer: &AudioBuffer) -> Result<(), SpeechError> {
    if buffer.is_empty() {
        return Err(SpeechError::new("speech service returned an empty utterance"));
    }
    if buffer.duration_secs() > MAX_UTTERANCE_SECS {
        return Err(SpeechError::new(format!(
            "utterance lasts {:.1}s (maximum {:.0}s)",
            buffer.duration_secs(),
            MAX_UTTERANCE_SECS
        )));
    }
    if !buffer.is_finite() {
        return Err(SpeechError::new("utterance contains NaN or infinite samples"));
    }
    Ok(())
}
