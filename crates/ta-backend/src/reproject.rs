//! Domain re-projection (`spec.md` §4.12): strips the matcher/generator
//! machinery back out of an extracted trace so it reads in terms of the
//! original (pre-transform) system.
//!
//! Grounded in `backend/transformer/state/{base_state_transformer.py,
//! concrete/extended_matcher_model_state_transformer.py,
//! concrete/trace_generator_model_state_transformer.py,
//! concrete/transition_simulator_model_state_transformer.py}`. The base
//! transformer runs `transform_clocks -> transform_locations ->
//! transform_variables -> translate_locations_to_target_system` (the last
//! step only when the source and target systems differ); each concrete
//! transformer supplies its own removal predicates for what counts as
//! "matcher-only" state.

use ta_transform::model::System;

use crate::error::MatchError;
use crate::trace::{LocationRef, State};

/// Which family of derived model a [`State`] was produced against, i.e.
/// which machinery `transform` must strip back out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatcherFamily {
    ExtendedMatcher,
    TraceGenerator,
    TransitionSimulator,
}

fn split_var_key(key: &str) -> (&str, &str) {
    key.split_once('.').unwrap_or(("", key))
}

fn keep_variable(family: MatcherFamily, key: &str) -> bool {
    let (proc, var) = split_var_key(key);
    match family {
        MatcherFamily::ExtendedMatcher => {
            !((proc == "sys" && (var.starts_with("LOC") || var.starts_with("COMM") || var.starts_with("_stepped")))
                || proc == "Trace_Matcher"
                || var == "__e")
        }
        MatcherFamily::TraceGenerator => {
            !((proc == "sys" && var == "_SC") || var == "__e" || is_e_numbered(var))
        }
        MatcherFamily::TransitionSimulator => !matches!(var, "TR_idx" | "__e" | "initialized"),
    }
}

/// `e_\d+` — a per-edge select-capture local the trace-generator splices in
/// (`ta_transform::tracegen`'s `sel_<name>` captures are a different, kept
/// shape; this matches only the generator's own `e_<n>` bookkeeping vars).
fn is_e_numbered(var: &str) -> bool {
    var.strip_prefix("e_").is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
}

fn keep_location(family: MatcherFamily, proc: &str) -> bool {
    !matches!(family, MatcherFamily::ExtendedMatcher if proc == "Trace_Matcher")
}

fn keep_clock(family: MatcherFamily, clock: &str) -> bool {
    !matches!(family, MatcherFamily::ExtendedMatcher if clock == "Trace_Matcher.tt")
}

fn remove_variables_from_state(state: &mut State, family: MatcherFamily) {
    state.vars.retain(|key, _| keep_variable(family, key));
}

fn remove_locations_from_state(state: &mut State, family: MatcherFamily) {
    state.locs.retain(|proc, _| keep_location(family, proc));
}

fn remove_clocks_from_state(state: &mut State, family: MatcherFamily) -> Result<(), MatchError> {
    let kept: Vec<String> = state.dbm.clocks().iter().filter(|c| keep_clock(family, c)).cloned().collect();
    let mut rebuilt = ta_dbm::Dbm::zero(&kept, false);
    for (i, ci) in kept.iter().enumerate() {
        for (j, cj) in kept.iter().enumerate() {
            let src_i = state.dbm.idx(ci).map_err(|e| MatchError::Reproject(e.to_string()))?;
            let src_j = state.dbm.idx(cj).map_err(|e| MatchError::Reproject(e.to_string()))?;
            rebuilt.set(i, j, state.dbm.get(src_i, src_j));
        }
    }
    state.dbm = rebuilt;
    Ok(())
}

/// Maps a location active in `source_system` to its counterpart in
/// `target_system` by the same per-template positional index used by trace
/// ingest (`ta_backend::trace::parse`) — not by name, since ordinal-renamed
/// names generally differ between the two systems.
fn translate_location_to_target_system(
    loc: &LocationRef,
    proc_template_name: &str,
    source_system: &System,
    target_system: &System,
) -> Result<LocationRef, MatchError> {
    let source_template = source_system
        .get_template_by_name(proc_template_name)
        .ok_or_else(|| MatchError::Reproject(format!("no source template named {proc_template_name:?}")))?;
    let position = source_template
        .locations
        .iter()
        .position(|(id, _)| *id == loc.id)
        .ok_or_else(|| MatchError::Reproject(format!("location {loc:?} not found in its own template")))?;
    let target_template = target_system
        .get_template_by_name(proc_template_name)
        .ok_or_else(|| MatchError::Reproject(format!("no target template named {proc_template_name:?}")))?;
    target_template
        .locations
        .get_index(position)
        .map(|(_, l)| LocationRef { id: l.id, name: l.name.clone(), committed: l.committed })
        .ok_or_else(|| MatchError::Reproject(format!("position {position} out of range in target template {proc_template_name:?}")))
}

/// Strips matcher/generator-only state out of `state` and, if
/// `target_system` is given, re-expresses each process's active location in
/// terms of `target_system`'s templates (`StateTransformer.transform`).
///
/// `proc_template_name` resolves a process id to its owning template name
/// (the same `{proc_id}_Tmpl` convention trace ingest uses); required only
/// when `target_system` is `Some`.
#[tracing::instrument(name = "reproject", skip_all)]
pub fn transform(
    state: &State,
    family: MatcherFamily,
    source_system: &System,
    target_system: Option<&System>,
    proc_template_name: impl Fn(&str) -> String,
) -> Result<State, MatchError> {
    let mut out = state.clone();
    remove_clocks_from_state(&mut out, family)?;
    remove_locations_from_state(&mut out, family);
    remove_variables_from_state(&mut out, family);

    if let Some(target_system) = target_system {
        let mut translated = indexmap::IndexMap::new();
        for (proc, loc) in &out.locs {
            let template_name = proc_template_name(proc);
            translated.insert(proc.clone(), translate_location_to_target_system(loc, &template_name, source_system, target_system)?);
        }
        out.locs = translated;
    }

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;
    use ta_dbm::Dbm;

    fn state() -> State {
        let mut vars = IndexMap::new();
        vars.insert("sys.LOC_p".to_string(), 1);
        vars.insert("sys.x".to_string(), 2);
        vars.insert("p.__e".to_string(), -1);
        let mut locs = IndexMap::new();
        locs.insert("Trace_Matcher".to_string(), LocationRef { id: 1, name: "m0".to_string(), committed: false });
        locs.insert("p".to_string(), LocationRef { id: 2, name: "l0".to_string(), committed: false });
        State { locs, dbm: Dbm::zero(&["Trace_Matcher.tt".to_string(), "p.c".to_string()], true), vars }
    }

    #[test]
    fn extended_matcher_strips_its_own_artifacts() {
        let mut s = state();
        remove_variables_from_state(&mut s, MatcherFamily::ExtendedMatcher);
        remove_locations_from_state(&mut s, MatcherFamily::ExtendedMatcher);
        remove_clocks_from_state(&mut s, MatcherFamily::ExtendedMatcher).unwrap();
        assert!(!s.vars.contains_key("sys.LOC_p"));
        assert!(s.vars.contains_key("sys.x"));
        assert!(!s.locs.contains_key("Trace_Matcher"));
        assert!(!s.dbm.clocks().contains(&"Trace_Matcher.tt".to_string()));
    }

    #[test]
    fn transition_simulator_keeps_location_and_matcher_state() {
        let mut s = state();
        remove_variables_from_state(&mut s, MatcherFamily::TransitionSimulator);
        remove_locations_from_state(&mut s, MatcherFamily::TransitionSimulator);
        assert!(s.locs.contains_key("Trace_Matcher"));
        assert!(s.vars.contains_key("sys.LOC_p"));
    }
}
