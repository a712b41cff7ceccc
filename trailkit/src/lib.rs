//! Core library for trail publishing tools: GPX elevation profiles and
//! batch QR-code generation.

use std::path::PathBuf;

use thiserror::Error;

pub mod profile;
pub mod qr;

pub use profile::{elevation_samples, samples_from_path, samples_from_reader, ElevationSample};
pub use qr::{encode_qr, parse_jobs, run_batch, JobOutcome, ParsedLines, QrJob, SkippedLine};

#[derive(Error, Debug)]
pub enum TrailError {
    #[error("file not found: {0}")]
    FileNotFound(PathBuf),
    #[error("failed to parse GPX file: {0}")]
    GpxParse(String),
    #[error("track contains no points")]
    NoData,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode QR payload: {0}")]
    QrEncode(String),
    #[error("failed to write image: {0}")]
    ImageWrite(String),
}
