//! Matcher/generator configuration (`spec.md` §6's key list; SPEC_FULL §6.1).
//!
//! Grounded in `uppyyl_observation_matcher/config.py`'s `configparser`-based
//! loader: the same key set, flattened into a typed struct rather than an
//! INI `ConfigParser` (no INI-parsing crate is in the teacher's stack, and
//! the CLI surface that would read one is out of scope per `spec.md` §1).

use std::path::PathBuf;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// `concrete_transition_times` policy (`spec.md` §4.9/§6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConcreteTransitionTimes {
    Min,
    Max,
    Random,
}

impl Default for ConcreteTransitionTimes {
    fn default() -> Self {
        Self::Min
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    pub verifyta_path: PathBuf,
    pub output_dir_path: PathBuf,
    pub matcher_model_file_path: PathBuf,
    pub matcher_model_trace_file_path: PathBuf,
    pub random_trace_generator_model_file_path: PathBuf,
    pub random_trace_file_path: PathBuf,
    pub transition_simulator_model_file_path: PathBuf,
    pub transition_simulator_trace_file_path: PathBuf,

    #[serde(default)]
    pub support_location_matching: bool,
    #[serde(default)]
    pub support_committed_matching: bool,
    #[serde(default)]
    pub support_shifted_matching: bool,
    #[serde(default)]
    pub support_partial_matching: bool,

    #[serde(default)]
    pub maximum_initial_delay: i64,
    #[serde(default)]
    pub allowed_deviations: IndexMap<String, i64>,
    #[serde(default)]
    pub concrete_transition_times: ConcreteTransitionTimes,
    #[serde(default)]
    pub step_count: i64,

    #[serde(default = "default_true")]
    pub allow_variable_observations: bool,
    #[serde(default = "default_true")]
    pub allow_location_observations: bool,
    #[serde(default = "default_true")]
    pub allow_committed_observations: bool,
    #[serde(default)]
    pub allow_partial_observations: bool,
    #[serde(default)]
    pub observed_variables: Vec<String>,
    #[serde(default)]
    pub observed_processes_for_locations: Vec<String>,
    #[serde(default)]
    pub default_deviation_bounds: (i64, i64),
    #[serde(default)]
    pub allowed_deviations_in_observations: IndexMap<String, i64>,
    #[serde(default)]
    pub time_shift_bounds: (u64, u64),
    #[serde(default)]
    pub observation_count_bounds: (u64, u64),
    #[serde(default = "default_true")]
    pub force_keep_first_observation: bool,
    #[serde(default = "default_true")]
    pub force_keep_last_observation: bool,
}

fn default_true() -> bool {
    true
}

impl MatcherConfig {
    /// Builds a config rooted at `output_dir_path`, deriving the six
    /// well-known model/trace file names the rest of the pipeline expects
    /// (matching the teacher's convention of deriving output paths from a
    /// single output directory rather than requiring six separate flags).
    pub fn with_output_dir(verifyta_path: impl Into<PathBuf>, output_dir_path: impl Into<PathBuf>) -> Self {
        let output_dir_path = output_dir_path.into();
        Self {
            verifyta_path: verifyta_path.into(),
            matcher_model_file_path: output_dir_path.join("matcher_model.xml"),
            matcher_model_trace_file_path: output_dir_path.join("matcher_model-1.xtr"),
            random_trace_generator_model_file_path: output_dir_path.join("trace_generator_model.xml"),
            random_trace_file_path: output_dir_path.join("trace_generator_model-1.xtr"),
            transition_simulator_model_file_path: output_dir_path.join("transition_simulator_model.xml"),
            transition_simulator_trace_file_path: output_dir_path.join("transition_simulator_model-1.xtr"),
            output_dir_path,
            support_location_matching: false,
            support_committed_matching: false,
            support_shifted_matching: false,
            support_partial_matching: false,
            maximum_initial_delay: 0,
            allowed_deviations: IndexMap::new(),
            concrete_transition_times: ConcreteTransitionTimes::default(),
            step_count: 0,
            allow_variable_observations: true,
            allow_location_observations: true,
            allow_committed_observations: true,
            allow_partial_observations: false,
            observed_variables: Vec::new(),
            observed_processes_for_locations: Vec::new(),
            default_deviation_bounds: (0, 0),
            allowed_deviations_in_observations: IndexMap::new(),
            time_shift_bounds: (0, 0),
            observation_count_bounds: (0, 0),
            force_keep_first_observation: true,
            force_keep_last_observation: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let config = MatcherConfig::with_output_dir("/usr/bin/verifyta", "/tmp/out");
        let json = serde_json::to_string(&config).unwrap();
        let back: MatcherConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.verifyta_path, config.verifyta_path);
        assert_eq!(back.matcher_model_file_path, config.matcher_model_file_path);
    }

    #[test]
    fn derived_paths_live_under_output_dir() {
        let config = MatcherConfig::with_output_dir("verifyta", "/tmp/run1");
        assert!(config.matcher_model_file_path.starts_with("/tmp/run1"));
        assert!(config.transition_simulator_trace_file_path.starts_with("/tmp/run1"));
    }
}
