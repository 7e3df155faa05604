//! Run manifest
//!
//! Written as `manifest.json` next to the audio: what was generated, with
//! which settings, and what went wrong per record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::record::RecordCounts;
use crate::config::CrowdConfig;
use crate::engine::AudioBuffer;
use crate::error::CrowdError;

/// File name of the manifest inside the output directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// One exported track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputReport {
    pub file: String,
    pub sha256: String,
    pub duration_secs: f64,
    /// `None` for silent tracks
    pub peak_dbfs: Option<f64>,
    pub rms_dbfs: Option<f64>,
}

impl OutputReport {
    pub fn new(file: String, sha256: String, buffer: &AudioBuffer) -> Self {
        let finite = |db: f64| db.is_finite().then_some(db);
        Self {
            file,
            sha256,
            duration_secs: buffer.duration_secs(),
            peak_dbfs: finite(buffer.peak_dbfs()),
            rms_dbfs: finite(buffer.rms_dbfs()),
        }
    }
}

/// A failure recorded against a record or output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReport {
    pub code: String,
    pub message: String,
    /// Whether a re-run can be expected to get past this error
    pub recoverable: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

impl From<&CrowdError> for ErrorReport {
    fn from(err: &CrowdError) -> Self {
        Self {
            code: err.error_code().to_string(),
            message: err.to_string(),
            recoverable: err.is_recoverable(),
            suggestions: err
                .recovery_suggestions()
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Outcome of one input row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordReport {
    pub index: usize,
    /// `None` when the row could not be parsed
    pub issue: Option<String>,
    pub counts: Option<RecordCounts>,
    pub outputs: Vec<OutputReport>,
    pub errors: Vec<ErrorReport>,
}

impl RecordReport {
    pub fn new(index: usize, issue: Option<String>) -> Self {
        Self {
            index,
            issue,
            counts: None,
            outputs: Vec::new(),
            errors: Vec::new(),
        }
    }

    /// All six tracks written without error
    pub fn is_success(&self) -> bool {
        self.errors.is_empty() && self.outputs.len() == 6
    }
}

/// Summary of a whole run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    pub speech: String,
    pub seed: u64,
    pub config: CrowdConfig,
    pub records: Vec<RecordReport>,
}

impl BatchReport {
    pub fn total(&self) -> usize {
        self.records.len()
    }

    pub fn succeeded(&self) -> usize {
        self.records.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> impl Iterator<Item = &RecordReport> {
        self.records.iter().filter(|r| !r.is_success())
    }
}
