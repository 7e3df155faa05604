//! Pipeline Integration Tests
//!
//! Runs whole tables through the issue audio pipeline with the offline
//! speech backend and checks what lands on disk.

use std::fs;
use std::path::Path;

use approx::assert_relative_eq;
use pretty_assertions::assert_eq;
use tempfile::TempDir;

use consensus_crowd::crowd::rng::output_rng;
use consensus_crowd::crowd::CrowdSynthesizer;
use consensus_crowd::engine::{import_wav, AudioBuffer};
use consensus_crowd::pipeline::{
    load_records, output_paths, read_records, BatchReport, IssueAudioPipeline, IssueRecord,
    PopulationAudio, MANIFEST_FILE,
};
use consensus_crowd::speech::{SpeechError, SpeechSynthesizer, VoiceVariant, WhisperSpeech};
use consensus_crowd::CrowdConfig;

// ============================================================================
// Helpers
// ============================================================================

const TABLE: &str = "\
issue,statement,scientific_consensus,public_agreement
Climate change,humans are warming the planet,97%,50%
Vaccines,vaccines are safe,lots,80
Evolution,species evolve over time,98,62
";

fn config(seed: u64) -> CrowdConfig {
    CrowdConfig {
        seed: Some(seed),
        ..CrowdConfig::default()
    }
}

fn pipeline(config: CrowdConfig) -> IssueAudioPipeline<WhisperSpeech> {
    IssueAudioPipeline::new(WhisperSpeech::new(config.sample_rate), config).unwrap()
}

fn record(sci: f64, public: f64) -> IssueRecord {
    IssueRecord {
        issue_id: "Climate change".to_string(),
        statement: "humans are warming the planet".to_string(),
        scientific_agreement_pct: sci,
        public_agreement_pct: public,
    }
}

/// Fails every utterance mentioning `poison`
struct FlakySpeech {
    inner: WhisperSpeech,
    poison: &'static str,
}

impl SpeechSynthesizer for FlakySpeech {
    fn name(&self) -> &str {
        "flaky"
    }

    fn synthesize(&self, text: &str, voice: VoiceVariant) -> Result<AudioBuffer, SpeechError> {
        if text.contains(self.poison) {
            return Err(SpeechError::new("service unavailable"));
        }
        self.inner.synthesize(text, voice)
    }
}

/// RMS (dBFS) of each stance's share of the `both` mix, agree first
///
/// The mix is the padded sum scaled by one guard factor, so each share is
/// the stance crowd under that same factor.
fn stance_shares_in_mix(audio: &PopulationAudio) -> (f64, f64) {
    let len = audio.both.len();
    let agree = audio.agree.padded_to(len);
    let disagree = audio.disagree.padded_to(len);
    let sum = agree.overlay(&disagree).unwrap();
    let scale = audio.both.peak() / sum.peak();

    assert_relative_eq!(
        audio.both.rms_dbfs(),
        sum.scaled(scale).rms_dbfs(),
        epsilon = 1e-3
    );
    (
        agree.scaled(scale).rms_dbfs(),
        disagree.scaled(scale).rms_dbfs(),
    )
}

fn read_manifest(dir: &Path) -> BatchReport {
    let text = fs::read_to_string(dir.join(MANIFEST_FILE)).unwrap();
    serde_json::from_str(&text).unwrap()
}

// ============================================================================
// Rendering
// ============================================================================

#[test]
fn test_counts_for_reference_record() {
    let counts = record(97.0, 50.0).counts(100);
    assert_eq!((counts.scientific.agree, counts.scientific.disagree), (97, 3));
    assert_eq!((counts.public.agree, counts.public.disagree), (50, 50));
}

#[test]
fn test_scientific_agreement_dominates() {
    let audio = pipeline(config(7)).render(0, &record(97.0, 50.0)).unwrap();
    let sci = &audio.scientific;

    // 97 voices against 3: ~15 dB by the intensity law alone
    assert!(
        sci.agree.rms_dbfs() - sci.disagree.rms_dbfs() > 10.0,
        "agree {} dBFS vs disagree {} dBFS",
        sci.agree.rms_dbfs(),
        sci.disagree.rms_dbfs()
    );
    assert_eq!(sci.both.len(), sci.agree.len().max(sci.disagree.len()));
    assert!(sci.both.peak_dbfs() <= -1.0);

    // Inside the mix the agree crowd carries nearly all the energy
    let (agree_share, disagree_share) = stance_shares_in_mix(sci);
    assert!(agree_share - disagree_share > 10.0);
    assert!(
        sci.both.rms_dbfs() - agree_share < 0.5,
        "mix {} dBFS vs agree share {} dBFS",
        sci.both.rms_dbfs(),
        agree_share
    );
}

#[test]
fn test_even_public_split_is_balanced() {
    let audio = pipeline(config(7)).render(0, &record(97.0, 50.0)).unwrap();
    let public = &audio.public;
    assert_eq!(public.counts.agree, public.counts.disagree);
    assert!(
        (public.agree.rms_dbfs() - public.disagree.rms_dbfs()).abs() < 3.0,
        "agree {} dBFS vs disagree {} dBFS",
        public.agree.rms_dbfs(),
        public.disagree.rms_dbfs()
    );

    // Both stances contribute comparable energy to the mix
    let (agree_share, disagree_share) = stance_shares_in_mix(public);
    assert!(
        (agree_share - disagree_share).abs() < 3.0,
        "agree share {} dBFS vs disagree share {} dBFS",
        agree_share,
        disagree_share
    );
    assert!(public.both.rms_dbfs() - agree_share.max(disagree_share) > 1.0);
    assert!(public.both.peak_dbfs() <= -1.0);
}

#[test]
fn test_zero_agreement_gives_silent_agree_crowd() {
    let config = CrowdConfig {
        jitter_ms: 0,
        ..config(11)
    };
    let pipeline = pipeline(config);
    let record = record(0.0, 50.0);
    let utterances = pipeline.utterances(&record).unwrap();
    let audio = pipeline.render(0, &record).unwrap();
    let sci = &audio.scientific;

    assert_eq!(sci.counts.agree, 0);
    assert_eq!(sci.counts.disagree, 100);
    assert!(sci.agree.is_silent());
    assert_eq!(sci.agree.len(), utterances.agree.len());

    // Without jitter the 10 layers are identical: 1 + 9 copies at -3 dB, +20 dB
    let factor = (1.0 + 9.0 * 10f64.powf(-3.0 / 20.0)) * 10.0;
    assert_eq!(sci.disagree.len(), utterances.disagree.len());
    for (crowd, base) in sci.disagree.channel(0).iter().zip(utterances.disagree.channel(0)) {
        assert_relative_eq!(*crowd as f64, *base as f64 * factor, epsilon = 1e-4);
    }

    // The mix is the disagree crowd alone, pulled under the ceiling
    assert!(sci.both.peak_dbfs() <= -1.0);
}

#[test]
fn test_crowds_follow_their_own_seeded_streams() {
    let pipeline = pipeline(config(99));
    let record = record(97.0, 50.0);
    let utterances = pipeline.utterances(&record).unwrap();
    let audio = pipeline.render(4, &record).unwrap();

    let mut rng = output_rng(99, 4, "sci_agree");
    let expected = CrowdSynthesizer::default().synthesize(&utterances.agree, 97, true, &mut rng);
    assert_eq!(audio.scientific.agree, expected);
}

// ============================================================================
// Batch runs
// ============================================================================

#[test]
fn test_batch_writes_outputs_and_manifest() {
    let dir = TempDir::new().unwrap();
    let records = read_records(TABLE.as_bytes());
    let report = pipeline(config(3)).run_batch(records, dir.path()).unwrap();

    assert_eq!(report.total(), 3);
    assert_eq!(report.succeeded(), 2);

    for index in [0, 2] {
        for path in output_paths(dir.path(), index) {
            assert!(path.exists(), "missing {}", path.display());
            let audio = import_wav(&path).unwrap();
            assert!(audio.peak_dbfs() <= -1.0, "{} clips", path.display());
        }
    }
    // Row 1 failed to parse: nothing written, index not reused
    for path in output_paths(dir.path(), 1) {
        assert!(!path.exists());
    }

    let manifest = read_manifest(dir.path());
    assert_eq!(manifest.seed, 3);
    assert_eq!(manifest.speech, "whisper");
    assert_eq!(manifest.records[1].issue, None);
    assert_eq!(manifest.records[1].errors[0].code, "INPUT_PARSE");
    assert_eq!(manifest.records[2].issue.as_deref(), Some("Evolution"));
    assert_eq!(manifest.records[2].outputs[0].file, "02_sci_agree.wav");
    assert_eq!(manifest.records[2].outputs[0].sha256.len(), 64);
}

#[test]
fn test_speech_failure_skips_only_that_record() {
    let dir = TempDir::new().unwrap();
    let config = config(5);
    let speech = FlakySpeech {
        inner: WhisperSpeech::new(config.sample_rate),
        poison: "species",
    };
    let pipeline = IssueAudioPipeline::new(speech, config).unwrap();
    let report = pipeline
        .run_batch(read_records(TABLE.as_bytes()), dir.path())
        .unwrap();

    assert_eq!(report.succeeded(), 1);
    let failed: Vec<usize> = report.failed().map(|r| r.index).collect();
    assert_eq!(failed, vec![1, 2]);
    assert_eq!(report.records[2].errors[0].code, "SYNTHESIS_SERVICE");
    assert!(report.records[2].errors[0].message.contains("agree"));

    assert!(output_paths(dir.path(), 0).iter().all(|p| p.exists()));
    assert!(!output_paths(dir.path(), 2).iter().any(|p| p.exists()));
}

#[test]
fn test_unwritable_output_skips_only_that_file() {
    let dir = TempDir::new().unwrap();
    // A directory squatting on an output path makes that export fail
    let blocked = dir.path().join("00_sci_both.wav");
    fs::create_dir(&blocked).unwrap();

    let report = pipeline(config(8))
        .run_batch(vec![Ok(record(97.0, 50.0))], dir.path())
        .unwrap();
    let record = &report.records[0];

    assert_eq!(report.succeeded(), 0);
    assert_eq!(record.outputs.len(), 5);
    assert_eq!(record.errors.len(), 1);
    assert_eq!(record.errors[0].code, "ENCODING");
    assert!(dir.path().join("00_pub_both.wav").is_file());
}

#[test]
fn test_same_seed_same_files() {
    let first = TempDir::new().unwrap();
    let second = TempDir::new().unwrap();

    let a = pipeline(config(21))
        .run_batch(read_records(TABLE.as_bytes()), first.path())
        .unwrap();
    let b = pipeline(config(21))
        .run_batch(read_records(TABLE.as_bytes()), second.path())
        .unwrap();

    let hashes = |report: &BatchReport| -> Vec<String> {
        report
            .records
            .iter()
            .flat_map(|r| r.outputs.iter().map(|o| o.sha256.clone()))
            .collect()
    };
    assert_eq!(hashes(&a), hashes(&b));
}

#[test]
fn test_missing_table_is_reported() {
    let dir = TempDir::new().unwrap();
    let err = load_records(&dir.path().join("nope.csv")).unwrap_err();
    assert_eq!(err.error_code(), "MISSING_INPUT");
}
