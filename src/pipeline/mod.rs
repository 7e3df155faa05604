//! Issue audio pipeline
//!
//! Input record → voice counts → per-stance crowds → mixed track → files.

mod manifest;
mod record;
mod run;

pub use manifest::{BatchReport, ErrorReport, OutputReport, RecordReport, MANIFEST_FILE};
pub use record::{
    load_records, parse_percent, read_records, IssueRecord, Population, RawRecord, RecordCounts,
    VoiceCounts,
};
pub use run::{
    output_file_name, output_paths, IssueAudioPipeline, PopulationAudio, RecordAudio, TrackKind,
    Utterances,
};
