//! CLI Command Implementations

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{info, warn};
use rand::Rng;

use super::{CrowdArgs, SpeechBackend};
use crate::crowd::rng::create_rng;
use crate::crowd::{CrowdMixer, CrowdSynthesizer};
use crate::engine::{conform, export_wav, import_wav};
use crate::error::{CrowdError, Result};
use crate::pipeline::{load_records, BatchReport, IssueAudioPipeline};
use crate::speech::{CachedSpeech, SpeechSynthesizer, WhisperSpeech};

/// Run the batch over a CSV table.
pub fn generate(
    input: &Path,
    output: &Path,
    backend: SpeechBackend,
    cache_dir: Option<&Path>,
    no_cache: bool,
    args: &CrowdArgs,
) -> Result<BatchReport> {
    let config = args.resolve()?;
    info!("Loading data from {}", input.display());
    let records = load_records(input)?;
    info!("Found {} issues", records.len());

    let speech = speech_backend(backend, config.sample_rate)?;
    let speech: Box<dyn SpeechSynthesizer> = if no_cache {
        speech
    } else {
        let dir = cache_dir
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_cache_dir(output));
        Box::new(CachedSpeech::new(speech, dir)?)
    };

    let pipeline = IssueAudioPipeline::new(speech, config)?;
    let report = pipeline.run_batch(records, output)?;

    println!(
        "Generation complete: {}/{} issues processed",
        report.succeeded(),
        report.total()
    );
    let mut hints: BTreeMap<&str, &[String]> = BTreeMap::new();
    for failed in report.failed() {
        let label = failed.issue.as_deref().unwrap_or("<unparsed row>");
        for error in &failed.errors {
            println!("  {:02} {}: [{}] {}", failed.index, label, error.code, error.message);
            if !error.suggestions.is_empty() {
                hints.entry(&error.code).or_insert(&error.suggestions);
            }
        }
    }
    for (code, suggestions) in hints {
        println!("  {}:", code);
        for suggestion in suggestions {
            println!("    - {}", suggestion);
        }
    }
    println!("Audio files saved to: {}/", output.display());
    println!("Each file simulates {} people speaking", report.config.population);

    Ok(report)
}

fn speech_backend(backend: SpeechBackend, sample_rate: u32) -> Result<Box<dyn SpeechSynthesizer>> {
    match backend {
        SpeechBackend::Whisper => Ok(Box::new(WhisperSpeech::new(sample_rate))),
        #[cfg(feature = "tts-http")]
        SpeechBackend::Http => {
            let speech = crate::speech::HttpSpeech::from_env().map_err(|e| CrowdError::Config {
                reason: e.to_string(),
            })?;
            Ok(Box::new(speech))
        }
        #[cfg(not(feature = "tts-http"))]
        SpeechBackend::Http => Err(CrowdError::Config {
            reason: "HTTP speech support not compiled. Build with --features tts-http".to_string(),
        }),
    }
}

/// Print the voice counts of every record.
pub fn counts(input: &Path, args: &CrowdArgs) -> Result<()> {
    let config = args.resolve()?;
    let records = load_records(input)?;

    println!("Simulating {} voices per perspective", config.population);
    println!("{:-<72}", "");
    println!(
        "{:>3}  {:<32} {:>8} {:>8} {:>8} {:>8}",
        "#", "issue", "sci +", "sci -", "pub +", "pub -"
    );

    for (index, record) in records.iter().enumerate() {
        match record {
            Ok(record) => {
                let counts = record.counts(config.population);
                println!(
                    "{:>3}  {:<32} {:>8} {:>8} {:>8} {:>8}",
                    index,
                    record.issue_id,
                    counts.scientific.agree,
                    counts.scientific.disagree,
                    counts.public.agree,
                    counts.public.disagree
                );
            }
            Err(e) => {
                warn!("Row {} skipped", index);
                println!("{:>3}  {}", index, e);
            }
        }
    }

    Ok(())
}

/// Render one crowd from a WAV utterance.
pub fn crowd(input: &Path, size: u32, output: &Path, jitter: bool, args: &CrowdArgs) -> Result<()> {
    let config = args.resolve()?;
    let base = import_wav(input)?;

    let seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let synthesizer = CrowdSynthesizer::from_config(&config);
    let crowd = synthesizer.synthesize(&base, size, jitter, &mut create_rng(seed));
    let crowd = CrowdMixer::from_config(&config).guard(&crowd);

    export_wav(&crowd, output, config.bit_depth)?;

    println!(
        "Crowd of {} voices ({} layers, seed {}) written to {}",
        size,
        synthesizer.layer_count(size),
        seed,
        output.display()
    );
    Ok(())
}

/// Mix two crowd files.
pub fn mix(first: &Path, second: &Path, output: &Path, args: &CrowdArgs) -> Result<()> {
    let config = args.resolve()?;
    let a = import_wav(first)?;
    let b = import_wav(second)?;

    // Bring both to the first file's rate when formats differ
    let (a, b) = if a.ensure_same_format(&b).is_ok() {
        (a, b)
    } else {
        let rate = a.sample_rate();
        (conform(&a, rate), conform(&b, rate))
    };

    let mixed = CrowdMixer::from_config(&config).mix(&a, &b)?;
    export_wav(&mixed, output, config.bit_depth)?;

    println!(
        "Mixed {:.2}s at {:.1} dBFS peak into {}",
        mixed.duration_secs(),
        mixed.peak_dbfs(),
        output.display()
    );
    Ok(())
}

/// Default location of the utterance cache for an output directory.
pub fn default_cache_dir(output: &Path) -> PathBuf {
    output.join("temp")
}
