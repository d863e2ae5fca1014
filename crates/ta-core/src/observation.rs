//! Observation sequence shapes (`spec.md` §3, §6).
//!
//! An [`Observation`] is the input to the matcher: a finite, ordered list of
//! timed data points. A `None` variable value or location name denotes an
//! unobserved field under partial-matching mode.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Per-process location observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationObservation {
    pub name: Option<String>,
    pub is_committed: bool,
}

/// A single timed data point in an observation sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub t: i64,
    #[serde(default)]
    pub vars: IndexMap<String, Option<i64>>,
    #[serde(default)]
    pub locs: IndexMap<String, LocationObservation>,
}

impl DataPoint {
    pub fn new(t: i64) -> Self {
        Self { t, vars: IndexMap::new(), locs: IndexMap::new() }
    }
}

/// Ordered list of [`DataPoint`]s — the full observation sequence matched
/// against an NTA's reachable behaviors.
pub type Observation = Vec<DataPoint>;
