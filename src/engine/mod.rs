//! Audio Engine Module
//!
//! Audio value type, level helpers and WAV I/O shared by the crowd stages.

pub mod buffer;
pub mod io;

pub use buffer::{db_to_linear, linear_to_db, AudioBuffer, ChannelLayout, DEFAULT_SAMPLE_RATE};
pub use io::{conform, decode_wav_bytes, export_wav, generate_test_tone, import_wav};
