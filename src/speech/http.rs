//! Text-to-speech over HTTP
//!
//! Talks to a speech service that accepts `POST {url}/synthesize` with a
//! JSON body `{text, lang, tld}` and answers with a WAV payload.

use std::env;
use std::time::Duration;

use log::debug;
use serde::Serialize;

use super::{check_utterance, SpeechError, SpeechSynthesizer, VoiceVariant};
use crate::engine::{decode_wav_bytes, AudioBuffer};

const DEFAULT_URL: &str = "http://localhost:5002";
const DEFAULT_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Serialize)]
struct SynthesisRequest<'a> {
    text: &'a str,
    lang: &'a str,
    tld: &'a str,
}

/// HTTP text-to-speech client
pub struct HttpSpeech {
    client: reqwest::blocking::Client,
    base_url: String,
    lang: String,
}

impl HttpSpeech {
    /// Create a client from `CROWD_TTS_URL` and `CROWD_TTS_TIMEOUT_MS`
    pub fn from_env() -> Result<Self, SpeechError> {
        let base_url = env::var("CROWD_TTS_URL").unwrap_or_else(|_| DEFAULT_URL.into());
        let timeout_ms = env::var("CROWD_TTS_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_MS);
        Self::with_config(base_url, timeout_ms)
    }

    /// Create a client with an explicit service URL and timeout
    pub fn with_config(base_url: String, timeout_ms: u64) -> Result<Self, SpeechError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_millis(timeout_ms))
            .build()
            .map_err(|e| SpeechError {
                reason: format!("Cannot build HTTP client: {}", e),
                source: Some(Box::new(e)),
            })?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            lang: "en".to_string(),
        })
    }
}

impl SpeechSynthesizer for HttpSpeech {
    fn name(&self) -> &str {
        "http"
    }

    fn synthesize(&self, text: &str, voice: VoiceVariant) -> Result<AudioBuffer, SpeechError> {
        let url = format!("{}/synthesize", self.base_url);
        debug!("POST {} ({} chars, tld {})", url, text.len(), voice.tld());

        let response = self
            .client
            .post(&url)
            .json(&SynthesisRequest {
                text,
                lang: &self.lang,
                tld: voice.tld(),
            })
            .send()
            .map_err(|e| {
                let reason = if e.is_timeout() {
                    format!("speech service timed out: {}", e)
                } else if e.is_connect() {
                    format!("cannot connect to speech service at {}: {}", self.base_url, e)
                } else {
                    e.to_string()
                };
                SpeechError {
                    reason,
                    source: Some(Box::new(e)),
                }
            })?;

        if !response.status().is_success() {
            return Err(SpeechError::new(format!(
                "speech service returned {}",
                response.status()
            )));
        }

        let bytes = response.bytes().map_err(|e| SpeechError {
            reason: format!("failed to read speech payload: {}", e),
            source: Some(Box::new(e)),
        })?;

        let buffer = decode_wav_bytes(&bytes)?;
        check_utterance(&buffer)?;
        Ok(buffer)
    }
}
