//! Issue audio pipeline
//!
//! Per record: derive voice counts, render the two stance utterances,
//! synthesize an agree and a disagree crowd for each population, mix each
//! pair and export the six tracks. Records are processed one after another;
//! a failed record is reported and skipped.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use log::{info, warn};
use rand::Rng;
use sha2::{Digest, Sha256};

use super::manifest::{BatchReport, ErrorReport, OutputReport, RecordReport, MANIFEST_FILE};
use super::record::{IssueRecord, Population, RecordCounts, VoiceCounts};
use crate::config::CrowdConfig;
use crate::crowd::rng::output_rng;
use crate::crowd::{CrowdMixer, CrowdSynthesizer};
use crate::engine::{conform, export_wav, AudioBuffer};
use crate::error::{CrowdError, Result};
use crate::speech::{check_utterance, SpeechSynthesizer, Stance};

// ============================================================================
// Output naming
// ============================================================================

/// Which track of a population an output holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Agree,
    Disagree,
    Both,
}

impl TrackKind {
    pub const ALL: [TrackKind; 3] = [TrackKind::Agree, TrackKind::Disagree, TrackKind::Both];

    pub fn key(&self) -> &'static str {
        match self {
            TrackKind::Agree => "agree",
            TrackKind::Disagree => "disagree",
            TrackKind::Both => "both",
        }
    }
}

/// File name of one output track, e.g. `03_sci_both.wav`
pub fn output_file_name(index: usize, population: Population, track: TrackKind) -> String {
    format!("{:02}_{}_{}.wav", index, population.key(), track.key())
}

/// Key of the jitter stream for one crowd, e.g. `pub_disagree`
fn crowd_key(population: Population, stance: Stance) -> String {
    format!("{}_{}", population.key(), stance.as_str())
}

// ============================================================================
// In-memory results
// ============================================================================

/// The two base utterances of a record, conformed to the run format
#[derive(Debug, Clone)]
pub struct Utterances {
    pub agree: AudioBuffer,
    pub disagree: AudioBuffer,
}

impl Utterances {
    pub fn get(&self, stance: Stance) -> &AudioBuffer {
        match stance {
            Stance::Agree => &self.agree,
            Stance::Disagree => &self.disagree,
        }
    }
}

/// Crowds and mix for one population
#[derive(Debug, Clone)]
pub struct PopulationAudio {
    pub population: Population,
    pub counts: VoiceCounts,
    pub agree: AudioBuffer,
    pub disagree: AudioBuffer,
    pub both: AudioBuffer,
}

impl PopulationAudio {
    pub fn track(&self, track: TrackKind) -> &AudioBuffer {
        match track {
            TrackKind::Agree => &self.agree,
            TrackKind::Disagree => &self.disagree,
            TrackKind::Both => &self.both,
        }
    }
}

/// Everything rendered for one record
#[derive(Debug, Clone)]
pub struct RecordAudio {
    pub index: usize,
    pub counts: RecordCounts,
    pub scientific: PopulationAudio,
    pub public: PopulationAudio,
}

impl RecordAudio {
    pub fn population(&self, population: Population) -> &PopulationAudio {
        match population {
            Population::Scientific => &self.scientific,
            Population::Public => &self.public,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Batch driver turning issue records into crowd tracks
pub struct IssueAudioPipeline<S> {
    speech: S,
    config: CrowdConfig,
    synthesizer: CrowdSynthesizer,
    mixer: CrowdMixer,
    run_seed: u64,
}

impl<S: SpeechSynthesizer> IssueAudioPipeline<S> {
    /// Create a pipeline; draws a run seed when the config has none
    pub fn new(speech: S, config: CrowdConfig) -> Result<Self> {
        config.validate()?;
        let run_seed = config.seed.unwrap_or_else(|| rand::thread_rng().gen());
        Ok(Self {
            speech,
            synthesizer: CrowdSynthesizer::from_config(&config),
            mixer: CrowdMixer::from_config(&config),
            config,
            run_seed,
        })
    }

    pub fn config(&self) -> &CrowdConfig {
        &self.config
    }

    /// Seed every jitter stream of this run derives from
    pub fn run_seed(&self) -> u64 {
        self.run_seed
    }

    /// Render both stance utterances of a record
    ///
    /// # Errors
    /// * `SynthesisService` - naming the stance whose utterance failed
    pub fn utterances(&self, record: &IssueRecord) -> Result<Utterances> {
        let render = |stance: Stance| -> Result<AudioBuffer> {
            let text = stance.phrase(&record.statement);
            let raw = self
                .speech
                .synthesize(&text, self.config.voice_for(stance))
                .map_err(|e| e.for_stance(stance))?;
            check_utterance(&raw).map_err(|e| e.for_stance(stance))?;
            Ok(conform(&raw, self.config.sample_rate))
        };

        Ok(Utterances {
            agree: render(Stance::Agree)?,
            disagree: render(Stance::Disagree)?,
        })
    }

    /// Synthesize all crowds and mixes of a record in memory
    pub fn render(&self, index: usize, record: &IssueRecord) -> Result<RecordAudio> {
        let counts = record.counts(self.config.population);
        let utterances = self.utterances(record)?;

        let scientific = self.render_population(index, Population::Scientific, &counts, &utterances)?;
        let public = self.render_population(index, Population::Public, &counts, &utterances)?;

        Ok(RecordAudio {
            index,
            counts,
            scientific,
            public,
        })
    }

    fn render_population(
        &self,
        index: usize,
        population: Population,
        counts: &RecordCounts,
        utterances: &Utterances,
    ) -> Result<PopulationAudio> {
        let counts = counts.get(population);
        let crowd = |stance: Stance| {
            let mut rng = output_rng(self.run_seed, index, &crowd_key(population, stance));
            self.synthesizer.synthesize(
                utterances.get(stance),
                counts.for_stance(stance),
                true,
                &mut rng,
            )
        };

        let agree = crowd(Stance::Agree);
        let disagree = crowd(Stance::Disagree);
        let both = self.mixer.mix(&agree, &disagree)?;

        Ok(PopulationAudio {
            population,
            counts,
            agree,
            disagree,
            both,
        })
    }

    /// Render and export one record into `out_dir`
    ///
    /// Never fails as a whole: problems end up in the returned report. An
    /// export failure skips only that file.
    pub fn process_record(&self, index: usize, record: &IssueRecord, out_dir: &Path) -> RecordReport {
        info!("Generating audio for: {}", record.issue_id);
        info!(
            "  Scientific: {}% agree, public: {}% agree",
            record.scientific_agreement_pct, record.public_agreement_pct
        );

        let mut report = RecordReport::new(index, Some(record.issue_id.clone()));

        let audio = match self.render(index, record) {
            Ok(audio) => audio,
            Err(e) => {
                warn!("Skipping '{}': {}", record.issue_id, e);
                report.errors.push(ErrorReport::from(&e));
                return report;
            }
        };
        report.counts = Some(audio.counts);

        for population in Population::ALL {
            let tracks = audio.population(population);
            info!(
                "  {}: {} agree, {} disagree",
                population, tracks.counts.agree, tracks.counts.disagree
            );

            // Single-stance files share one scale so their balance survives
            let (agree, disagree) = self.mixer.guard_pair(&tracks.agree, &tracks.disagree);
            let exports = [
                (TrackKind::Agree, &agree),
                (TrackKind::Disagree, &disagree),
                (TrackKind::Both, &tracks.both),
            ];

            for (track, buffer) in exports {
                let path = out_dir.join(output_file_name(index, population, track));
                match self.export(buffer, &path) {
                    Ok(output) => report.outputs.push(output),
                    Err(e) => {
                        warn!("Skipping output {}: {}", path.display(), e);
                        report.errors.push(ErrorReport::from(&e));
                    }
                }
            }
        }

        report
    }

    fn export(&self, buffer: &AudioBuffer, path: &Path) -> Result<OutputReport> {
        export_wav(buffer, path, self.config.bit_depth)?;

        let bytes = fs::read(path).map_err(|e| CrowdError::Encoding {
            path: path.display().to_string(),
            reason: format!("written file unreadable: {}", e),
        })?;
        let sha256 = format!("{:x}", Sha256::digest(&bytes));

        Ok(OutputReport::new(file_name(path), sha256, buffer))
    }

    /// Process a whole table into `out_dir` and write the run manifest
    ///
    /// Rows that failed to parse are reported with their index and skipped.
    /// Only an unusable output directory or manifest aborts the run.
    pub fn run_batch(
        &self,
        records: Vec<Result<IssueRecord>>,
        out_dir: &Path,
    ) -> Result<BatchReport> {
        fs::create_dir_all(out_dir)?;

        info!(
            "Simulating {} voices per perspective for {} issues (seed {})",
            self.config.population,
            records.len(),
            self.run_seed
        );

        let mut reports = Vec::with_capacity(records.len());
        for (index, record) in records.into_iter().enumerate() {
            let report = match record {
                Ok(record) => self.process_record(index, &record, out_dir),
                Err(e) => {
                    warn!("Skipping row {}: {}", index, e);
                    let mut report = RecordReport::new(index, None);
                    report.errors.push(ErrorReport::from(&e));
                    report
                }
            };
            reports.push(report);
        }

        let batch = BatchReport {
            generated_at: Utc::now(),
            speech: self.speech.name().to_string(),
            seed: self.run_seed,
            config: self.config.clone(),
            records: reports,
        };

        let manifest_path = out_dir.join(MANIFEST_FILE);
        fs::write(&manifest_path, serde_json::to_string_pretty(&batch)?)?;

        info!(
            "Generation complete: {}/{} issues processed",
            batch.succeeded(),
            batch.total()
        );
        info!("Audio files saved to: {}", out_dir.display());

        Ok(batch)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Paths of the six outputs of record `index` under `out_dir`
pub fn output_paths(out_dir: &Path, index: usize) -> Vec<PathBuf> {
    Population::ALL
        .iter()
        .flat_map(|&population| {
            TrackKind::ALL
                .iter()
                .map(move |&track| out_dir.join(output_file_name(index, population, track)))
        })
        .collect()
}
