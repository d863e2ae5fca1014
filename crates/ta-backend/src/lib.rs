//! Trace XML ingest, deterministic trace extraction, domain re-projection,
//! and the external model-checker interface (`spec.md` §4.9-§4.13).
//!
//! - [`trace`]: reified trace data shapes plus XML ingest (§4.10).
//! - [`extract`]: deterministic trace extraction (§4.9).
//! - [`reproject`]: stripping matcher/generator artifacts back out of a
//!   trace (§4.12).
//! - [`backend`]: the `verifyta` child-process interface (§4.11).
//! - [`config`]: `MatcherConfig` (§6).
//! - [`matching`]: the `ObservationMatcher` orchestration facade.

pub mod backend;
pub mod config;
pub mod error;
pub mod extract;
pub mod matching;
pub mod reproject;
pub mod trace;

pub use config::{ConcreteTransitionTimes, MatcherConfig};
pub use error::{BackendError, ExtractionFailed, MatchError};
pub use matching::{MatcherType, MatchResult, ObservationMatcher};
pub use trace::{LocationRef, State, Trace, Transition};
