use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PupilError {
    #[error("Input file not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Failed to ingest gaze data: {0}")]
    Ingestion(String),

    #[error("Malformed input stream: {0}")]
    Segmentation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PupilError>;

/// Reasons a single trial is dropped from aggregated output.
///
/// These never abort a subject; the pipeline records them next to the
/// trials that did make it through.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrialError {
    #[error("no valid samples after artifact detection")]
    NoValidSamples,

    #[error("baseline window has no valid samples")]
    BaselineUndefined,

    #[error("trial has no response-phase samples")]
    NoResponse,
}
