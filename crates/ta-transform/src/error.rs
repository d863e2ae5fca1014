//! Errors surfaced by preprocessing and the model builders.

use thiserror::Error;

/// Preprocessing precondition violation (`spec.md` §4.4, §7).
#[derive(Debug, Clone, Error)]
#[error("transform error in stage {stage}: {details}")]
pub struct TransformError {
    pub stage: &'static str,
    pub details: String,
}

impl TransformError {
    pub fn new(stage: &'static str, details: impl Into<String>) -> Self {
        Self { stage, details: details.into() }
    }
}
