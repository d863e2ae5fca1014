//! Unified error type for the `ta-backend` orchestration facade (`spec.md`
//! §7): one `thiserror` variant per error kind named there, wrapping the
//! lower crates' own error types rather than re-deriving them.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum BackendError {
    #[error("failed to launch verifyta: {0}")]
    LaunchFailed(String),
    #[error("verifyta timed out")]
    Timeout,
    #[error("malformed verifyta output: {0}")]
    MalformedOutput(String),
}

#[derive(Debug, Clone, Error)]
pub enum ExtractionFailed {
    #[error("deterministic trace extraction failed at step {step}: {reason}")]
    Step { step: &'static str, reason: String },
}

#[derive(Debug, Error)]
pub enum MatchError {
    #[error(transparent)]
    Parse(#[from] ta_core::ParseError),
    #[error(transparent)]
    Transform(#[from] ta_transform::TransformError),
    #[error(transparent)]
    Dbm(#[from] ta_dbm::DBMError),
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Extraction(#[from] ExtractionFailed),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace XML error: {0}")]
    TraceXml(String),
    #[error("domain re-projection error: {0}")]
    Reproject(String),
}
