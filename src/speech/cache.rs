//! On-disk utterance cache
//!
//! Keeps every rendered utterance as a float WAV in a scratch directory so
//! re-runs (and retries after a failed record) do not hit the speech
//! service again. Entries are keyed by a SHA-256 of backend, voice and
//! text, so backends sharing a directory never serve each other's audio.

use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};
use sha2::{Digest, Sha256};

use super::{SpeechError, SpeechSynthesizer, VoiceVariant};
use crate::engine::{export_wav, import_wav, AudioBuffer};

/// Caching wrapper around any speech synthesizer
pub struct CachedSpeech<S> {
    inner: S,
    dir: PathBuf,
    name: String,
}

impl<S: SpeechSynthesizer> CachedSpeech<S> {
    /// Wrap `inner`, storing utterances under `dir` (created if missing)
    pub fn new(inner: S, dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        let name = format!("cached-{}", inner.name());
        Ok(Self { inner, dir, name })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path an utterance is stored at
    pub fn entry_path(&self, text: &str, voice: VoiceVariant) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(self.inner.name().as_bytes());
        hasher.update(b"\n");
        hasher.update(voice.tld().as_bytes());
        hasher.update(b"\n");
        hasher.update(text.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.dir.join(format!("{}.wav", &digest[..16]))
    }
}

impl<S: SpeechSynthesizer> SpeechSynthesizer for CachedSpeech<S> {
    fn name(&self) -> &str {
        &self.name
    }

    fn synthesize(&self, text: &str, voice: VoiceVariant) -> Result<AudioBuffer, SpeechError> {
        let path = self.entry_path(text, voice);
        if path.exists() {
            match import_wav(&path) {
                Ok(buffer) => {
                    debug!("Utterance cache hit: {}", path.display());
                    return Ok(buffer);
                }
                Err(e) => warn!("Ignoring unreadable cache entry {}: {}", path.display(), e),
            }
        }

        let buffer = self.inner.synthesize(text, voice)?;
        if let Err(e) = export_wav(&buffer, &path, 32) {
            warn!("Could not cache utterance at {}: {}", path.display(), e);
        }
        Ok(buffer)
    }
}
