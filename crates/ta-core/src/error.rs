//! Parser-facing error type.
//!
//! The grammar/lexer itself is out of scope (`spec.md` §1); this type is the
//! shape a parser implementation must produce so the rest of the pipeline
//! (which only ever receives already-parsed [`crate::Ast`] values) can
//! propagate a parse failure uniformly.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
#[error("parse error at {position} in {source:?}: {message}")]
pub struct ParseError {
    pub source: String,
    pub position: usize,
    pub message: String,
}

impl ParseError {
    pub fn new(source: impl Into<String>, position: usize, message: impl Into<String>) -> Self {
        Self { source: source.into(), position, message: message.into() }
    }
}
