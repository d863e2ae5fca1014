//! Observation generation (`spec.md` §4.13, supplemented — needed for §8's
//! "Matcher equivalence" and "Negative-observation rejection" properties).
//!
//! Grounded in `backend/observation/generator.py` and
//! `backend/transformer/observation/{base_observation_transformer.py,
//! concrete/generated_observation_transformer.py,
//! concrete/negative_observation_transformer.py}`.
//!
//! [`ConcreteState`] stands in for a single step of a deterministic trace
//! (`ta_backend::trace::Trace` in the crate that actually reifies one) —
//! kept local to this crate rather than importing `ta_backend`'s trace
//! type, since `ta-backend` depends on `ta-transform` and not the other
//! way around (see `DESIGN.md`). `ta-backend` maps its own deterministic
//! trace states into this shape before calling [`GeneratedObservationTransformer`].

use indexmap::IndexMap;
use ta_core::observation::{DataPoint, LocationObservation, Observation};

/// One concrete (single-time) state of a run, as needed to project it down
/// to an [`ta_core::observation::DataPoint`].
#[derive(Debug, Clone)]
pub struct ConcreteState {
    pub t: i64,
    pub vars: IndexMap<String, i64>,
    /// Per-process (template instance name) observed location and its
    /// committedness.
    pub locs: IndexMap<String, (String, bool)>,
}

/// Knobs controlling what a [`GeneratedObservationTransformer`] keeps
/// (`spec.md` §6's observation-generator knobs).
#[derive(Debug, Clone)]
pub struct GenerationFlags {
    pub observed_variables: Vec<String>,
    pub observed_processes_for_locations: Vec<String>,
    pub allow_variable_observations: bool,
    pub allow_location_observations: bool,
    pub allow_committed_observations: bool,
    pub allow_partial_observations: bool,
    pub force_keep_first_observation: bool,
    pub force_keep_last_observation: bool,
}

impl Default for GenerationFlags {
    fn default() -> Self {
        Self {
            observed_variables: Vec::new(),
            observed_processes_for_locations: Vec::new(),
            allow_variable_observations: true,
            allow_location_observations: true,
            allow_committed_observations: true,
            allow_partial_observations: false,
            force_keep_first_observation: true,
            force_keep_last_observation: true,
        }
    }
}

pub struct GeneratedObservationTransformer;

impl GeneratedObservationTransformer {
    /// Projects each `states[i]` down to a [`DataPoint`], honoring
    /// `flags`. Without partial-matching, every configured variable/
    /// process must be present at every kept state; under partial
    /// matching an observation with no honored fields is still kept if it
    /// is the first/last and forced.
    pub fn transform(states: &[ConcreteState], flags: &GenerationFlags) -> Observation {
        let mut observation = Vec::with_capacity(states.len());
        let last_idx = states.len().saturating_sub(1);

        for (idx, state) in states.iter().enumerate() {
            let mut dp = DataPoint::new(state.t);

            if flags.allow_variable_observations {
                for name in &flags.observed_variables {
                    let value = state.vars.get(name).copied();
                    if value.is_some() || flags.allow_partial_observations {
                        dp.vars.insert(name.clone(), value);
                    }
                }
            }

            if flags.allow_location_observations {
                for proc in &flags.observed_processes_for_locations {
                    match state.locs.get(proc) {
                        Some((loc_name, committed)) => {
                            if *committed && !flags.allow_committed_observations {
                                continue;
                            }
                            dp.locs.insert(
                                proc.clone(),
                                LocationObservation { name: Some(loc_name.clone()), is_committed: *committed },
                            );
                        }
                        None if flags.allow_partial_observations => {
                            dp.locs.insert(
                                proc.clone(),
                                LocationObservation { name: None, is_committed: false },
                            );
                        }
                        None => {}
                    }
                }
            }

            let is_forced = (idx == 0 && flags.force_keep_first_observation)
                || (idx == last_idx && flags.force_keep_last_observation);
            if is_forced || !dp.vars.is_empty() || !dp.locs.is_empty() {
                observation.push(dp);
            }
        }

        observation
    }
}

/// Deviation bounds used to compute a rejection-guaranteed perturbation
/// (`spec.md` §8).
#[derive(Debug, Clone, Default)]
pub struct DeviationBounds {
    pub time: i64,
    pub variables: IndexMap<String, i64>,
}

pub struct NegativeObservationTransformer;

impl NegativeObservationTransformer {
    /// Shifts the final data point's time by `-(2*DEV_t + 1)`: a step
    /// large enough that no tolerated deviation window can still contain
    /// it.
    pub fn shift_final_time(observation: &Observation, deviations: &DeviationBounds) -> Observation {
        let mut out = observation.to_vec();
        if let Some(last) = out.last_mut() {
            last.t -= 2 * deviations.time + 1;
        }
        out
    }

    /// Perturbs one observed variable's value in the final data point by
    /// `i16::MAX - (DEV_v + 1)`, guaranteed to fall outside any configured
    /// tolerance.
    pub fn perturb_variable(
        observation: &Observation,
        variable: &str,
        deviations: &DeviationBounds,
    ) -> Observation {
        let mut out = observation.to_vec();
        let dev = deviations.variables.get(variable).copied().unwrap_or(0);
        let delta = i64::from(i16::MAX) - (dev + 1);
        if let Some(last) = out.last_mut() {
            if let Some(Some(value)) = last.vars.get_mut(variable) {
                *value += delta;
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(t: i64, x: i64) -> ConcreteState {
        let mut vars = IndexMap::new();
        vars.insert("x".to_string(), x);
        ConcreteState { t, vars, locs: IndexMap::new() }
    }

    #[test]
    fn transform_keeps_observed_variables_at_every_state() {
        let states = vec![state(0, 1), state(10, 2), state(20, 3)];
        let flags = GenerationFlags {
            observed_variables: vec!["x".to_string()],
            ..GenerationFlags::default()
        };
        let obs = GeneratedObservationTransformer::transform(&states, &flags);
        assert_eq!(obs.len(), 3);
        assert_eq!(obs[1].vars["x"], Some(2));
    }

    #[test]
    fn shift_final_time_moves_past_any_tolerance() {
        let obs = vec![ta_core::observation::DataPoint::new(10)];
        let dev = DeviationBounds { time: 2, variables: IndexMap::new() };
        let out = NegativeObservationTransformer::shift_final_time(&obs, &dev);
        assert_eq!(out[0].t, 10 - 5);
    }

    #[test]
    fn perturb_variable_moves_value_far_outside_deviation() {
        let mut dp = ta_core::observation::DataPoint::new(0);
        dp.vars.insert("x".to_string(), Some(10));
        let dev = DeviationBounds { time: 0, variables: IndexMap::from([("x".to_string(), 3)]) };
        let out = NegativeObservationTransformer::perturb_variable(&[dp], "x", &dev);
        assert_eq!(out[0].vars["x"], Some(10 + (i64::from(i16::MAX) - 4)));
    }
}
