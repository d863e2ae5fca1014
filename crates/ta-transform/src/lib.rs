//! NTA model, preprocessing, and the matcher/trace-generator/
//! transition-simulator builders.
//!
//! - [`model`]: the NTA Model API (`System`/`Template`/`Location`/`Edge`).
//! - [`preprocess`]: the six-step `PreprocessedModelTransformer`.
//! - [`matcher`]: extended and raw matcher-model construction.
//! - [`tracegen`]: trace-generator model construction.
//! - [`transim`]: transition-simulator model construction.
//! - [`observation`]: projecting a deterministic trace down to an
//!   observation sequence, and perturbing one to force rejection.

pub mod error;
pub mod indexing;
pub mod matcher;
pub mod model;
pub mod observation;
pub mod preprocess;
pub mod tracegen;
pub mod transim;

pub use error::TransformError;
pub use model::{Edge, Id, Location, System, Template};
pub use ta_core::Query;
