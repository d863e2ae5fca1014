//! Deterministic trace extraction (`spec.md` §4.9).
//!
//! Grounded in `backend/observation/generator.py`'s `extract_deterministic_trace`
//! / `extract_data_points_from_deterministic_trace`. UPPAAL's symbolic trace
//! already reports each [`crate::trace::State`]'s DBM as a delay-closed zone
//! (the zone is stable at the moment the edge may fire, time-elapse already
//! folded in) — there is no separate "pre-delay" record to intersect against,
//! so `helper_dbm` here is built directly from the running concrete-trace DBM
//! intersected with the transition's own source zone rather than a distinct
//! `delay_state` the reified [`crate::trace::Trace`] doesn't carry.
//!
//! Two independent draw sites select the final concrete time for a step:
//! [`extract_deterministic_trace`] honors [`ConcreteTransitionTimes`], while
//! [`extract_data_points_from_deterministic_trace`] always draws uniformly at
//! random. This mirrors the Python source's own inconsistency and must not
//! be "fixed" — see `DESIGN.md` Open Question #3.

use rand::Rng;
use ta_dbm::{Bound, DBMEntry, Dbm, Rel};
use ta_transform::observation::ConcreteState;

use crate::config::ConcreteTransitionTimes;
use crate::error::ExtractionFailed;
use crate::trace::Trace;

const GLOBAL_TIME_CLOCK: &str = "sys._TG";
const STEP_REFERENCE_CLOCK: &str = "sys._TR";
const REFERENCE_CLOCK: &str = "T0_REF";

fn step_err(step: &'static str, reason: impl Into<String>) -> ExtractionFailed {
    ExtractionFailed::Step { step, reason: reason.into() }
}

fn close_and_check(step: &'static str, dbm: &mut Dbm) -> Result<(), ExtractionFailed> {
    dbm.close().map_err(|e| step_err(step, e.to_string()))
}

fn require_includes(step: &'static str, outer: &Dbm, inner: &Dbm) -> Result<(), ExtractionFailed> {
    if !outer.includes(inner) {
        return Err(step_err(step, "extracted zone is not included in the symbolic trace's zone"));
    }
    Ok(())
}

/// Lower/upper bound (in whole time units) a clock may take leaving a zone,
/// collapsing strict bounds to the nearest included integer and an open
/// upper bound to ten units past the lower bound.
fn valid_leaving_time_bound(dbm: &Dbm, clock: &str) -> Result<(i64, i64), ExtractionFailed> {
    let (lower, lower_incl, upper, upper_incl) =
        dbm.get_interval(clock).map_err(|e| step_err("valid_time_interval", e.to_string()))?;
    let lower_bound = match lower {
        Bound::Finite(v) => {
            if lower_incl {
                v
            } else {
                v + 1
            }
        }
        Bound::NegInfinity => 0,
        Bound::PosInfinity => return Err(step_err("valid_time_interval", "lower bound is +infinity")),
    };
    let upper_bound = match upper {
        Bound::PosInfinity => lower_bound + 10,
        Bound::Finite(v) => {
            if upper_incl {
                v
            } else {
                v - 1
            }
        }
        Bound::NegInfinity => return Err(step_err("valid_time_interval", "upper bound is -infinity")),
    };
    Ok((lower_bound, upper_bound))
}

fn select_time(policy: ConcreteTransitionTimes, lower: i64, upper: i64) -> i64 {
    match policy {
        ConcreteTransitionTimes::Min => lower,
        ConcreteTransitionTimes::Max => upper,
        ConcreteTransitionTimes::Random => rand::thread_rng().gen_range(lower..=upper),
    }
}

fn reset_clocks_of(target_dbm: &Dbm) -> Vec<String> {
    let Ok(tr_idx) = target_dbm.idx(STEP_REFERENCE_CLOCK) else { return Vec::new() };
    target_dbm
        .clocks()
        .iter()
        .enumerate()
        .filter(|(_, name)| name.as_str() != REFERENCE_CLOCK && name.as_str() != STEP_REFERENCE_CLOCK)
        .filter(|(i, _)| {
            target_dbm.get(*i, tr_idx).bound == Bound::Finite(0) && target_dbm.get(tr_idx, *i).bound == Bound::Finite(0)
        })
        .map(|(_, name)| name.clone())
        .collect()
}

fn concrete_state_from(t: i64, state: &crate::trace::State) -> ConcreteState {
    let mut vars = indexmap::IndexMap::new();
    for (name, value) in &state.vars {
        vars.insert(name.clone(), *value);
    }
    let locs = state
        .locs
        .iter()
        .map(|(proc, loc)| (proc.clone(), (loc.name.clone(), loc.committed)))
        .collect();
    ConcreteState { t, vars, locs }
}

/// Walks `trace` step by step, picking one concrete time per transition per
/// `policy`, and returns the sequence of concrete states reached
/// (`extract_deterministic_trace`).
#[tracing::instrument(name = "extract_deterministic_trace", skip_all)]
pub fn extract_deterministic_trace(
    trace: &Trace,
    policy: ConcreteTransitionTimes,
) -> Result<Vec<ConcreteState>, ExtractionFailed> {
    let mut concrete_states = Vec::with_capacity(trace.transitions.len() + 1);
    let mut current_dbm = trace.init_state.dbm.clone();

    for tr in &trace.transitions {
        let source_dbm = &tr.source.dbm;
        let target_dbm = &tr.target.dbm;

        let helper_dbm = current_dbm
            .intersect(source_dbm)
            .map_err(|e| step_err("intersect_with_source", e.to_string()))?;
        let (lower, upper) = valid_leaving_time_bound(&helper_dbm, GLOBAL_TIME_CLOCK)?;
        if lower > upper {
            return Err(step_err("valid_time_interval", "leaving-time window is empty"));
        }
        let selected_time = select_time(policy, lower, upper);

        let mut leaving = current_dbm.clone();
        leaving
            .conjugate(GLOBAL_TIME_CLOCK, REFERENCE_CLOCK, DBMEntry::new(selected_time, Rel::Le))
            .map_err(|e| step_err("conjugate_leaving_time", e.to_string()))?;
        close_and_check("conjugate_leaving_time", &mut leaving)?;
        require_includes("conjugate_leaving_time", source_dbm, &leaving)?;
        concrete_states.push(concrete_state_from(selected_time, &tr.source));

        let mut entering = helper_dbm;
        entering
            .conjugate(GLOBAL_TIME_CLOCK, REFERENCE_CLOCK, DBMEntry::new(selected_time, Rel::Le))
            .map_err(|e| step_err("conjugate_entering_time", e.to_string()))?;

        let reset_clocks = reset_clocks_of(target_dbm);

        entering
            .conjugate(REFERENCE_CLOCK, GLOBAL_TIME_CLOCK, DBMEntry::new(-selected_time, Rel::Le))
            .map_err(|e| step_err("conjugate_entering_time_lower", e.to_string()))?;
        close_and_check("conjugate_entering_time_lower", &mut entering)?;
        require_includes("conjugate_entering_time_lower", target_dbm, &entering)?;

        for clock in &reset_clocks {
            entering.reset(clock).map_err(|e| step_err("apply_reset", e.to_string()))?;
        }
        entering.delay_future();
        current_dbm = entering.intersect(target_dbm).map_err(|e| step_err("intersect_with_target", e.to_string()))?;
        require_includes("intersect_with_target", target_dbm, &current_dbm)?;
    }

    let _ = &current_dbm;
    if let Some(last) = trace.transitions.last() {
        concrete_states.push(concrete_state_from(0, &last.target));
    } else {
        concrete_states.push(concrete_state_from(0, &trace.init_state));
    }

    Ok(concrete_states)
}

/// Re-derives a concrete time per state directly from each transition's
/// zones, independently of [`extract_deterministic_trace`]'s own draws
/// (`extract_data_points_from_deterministic_trace`) — always via a uniform
/// random draw regardless of the configured policy.
pub fn extract_data_points_from_deterministic_trace(trace: &Trace) -> Result<Vec<i64>, ExtractionFailed> {
    let mut times = Vec::with_capacity(trace.transitions.len());
    let mut current_dbm = trace.init_state.dbm.clone();

    for tr in &trace.transitions {
        let helper_dbm = current_dbm
            .intersect(&tr.source.dbm)
            .map_err(|e| step_err("intersect_with_source", e.to_string()))?;
        let (lower, upper) = valid_leaving_time_bound(&helper_dbm, GLOBAL_TIME_CLOCK)?;
        if lower > upper {
            return Err(step_err("valid_time_interval", "leaving-time window is empty"));
        }
        let selected_time = if lower == upper { lower } else { rand::thread_rng().gen_range(lower..=upper) };
        times.push(selected_time);
        current_dbm = tr.target.dbm.clone();
    }

    Ok(times)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{State, Transition};
    use indexmap::IndexMap;

    fn dbm_with_tg_bound(lower: i64, upper: Option<i64>) -> Dbm {
        let mut dbm = Dbm::unconstrained(&["sys._TG".to_string(), "sys._TR".to_string()], true);
        dbm.conjugate("sys._TG", "T0_REF", DBMEntry::new(upper.unwrap_or(i64::MAX), Rel::Le)).unwrap();
        dbm.conjugate("T0_REF", "sys._TG", DBMEntry::new(-lower, Rel::Le)).unwrap();
        dbm
    }

    fn state_with(dbm: Dbm) -> State {
        State { locs: IndexMap::new(), dbm, vars: IndexMap::new() }
    }

    #[test]
    fn picks_lower_bound_under_min_policy() {
        let init_dbm = dbm_with_tg_bound(0, None);
        let source = state_with(dbm_with_tg_bound(5, Some(5)));
        let target = state_with(dbm_with_tg_bound(5, Some(5)));
        let trace = Trace {
            init_state: state_with(init_dbm),
            transitions: vec![Transition {
                source,
                target,
                intermediate_states: Vec::new(),
                triggered_edges: IndexMap::new(),
            }],
        };
        let states = extract_deterministic_trace(&trace, ConcreteTransitionTimes::Min).unwrap();
        assert_eq!(states.len(), 2);
        assert_eq!(states[0].t, 5);
    }

    #[test]
    fn empty_leaving_window_is_rejected() {
        let init_dbm = dbm_with_tg_bound(10, Some(10));
        let source = state_with(dbm_with_tg_bound(1, Some(2)));
        let target = state_with(dbm_with_tg_bound(1, Some(2)));
        let trace = Trace {
            init_state: state_with(init_dbm),
            transitions: vec![Transition {
                source,
                target,
                intermediate_states: Vec::new(),
                triggered_edges: IndexMap::new(),
            }],
        };
        assert!(extract_deterministic_trace(&trace, ConcreteTransitionTimes::Min).is_err());
    }
}
