//! Reified trace data shapes (`spec.md` §4.10).
//!
//! Grounded in `backend/data/{state.py,transition.py,trace.py}`. A [`State`]
//! is one reachable configuration: the active location of every process, a
//! DBM over all clocks in scope, and the current value of every variable
//! (keyed `"proc.varname"`, matching the Python source's flat dict keying).

pub mod parse;

use indexmap::IndexMap;
use ta_dbm::Dbm;
use ta_transform::model::Id;

/// A process's active location, carrying what observation generation and
/// deterministic-trace extraction need without looking the id back up
/// against a [`ta_transform::model::System`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocationRef {
    pub id: Id,
    pub name: String,
    pub committed: bool,
}

/// One reachable configuration of a network of timed automata.
#[derive(Debug, Clone)]
pub struct State {
    /// `proc_id -> active location`, one entry per process instance.
    pub locs: IndexMap<String, LocationRef>,
    pub dbm: Dbm,
    /// `"proc.varname" -> value`.
    pub vars: IndexMap<String, i64>,
}

impl State {
    /// `self.includes(other)`: every process is in the same location,
    /// every variable has the same value, and `self`'s clock region is a
    /// (weak) superset of `other`'s (`backend/data/state.py::State.includes`).
    pub fn includes(&self, other: &State) -> bool {
        self.locs == other.locs && self.vars == other.vars && self.dbm.includes(&other.dbm)
    }
}

/// One step of a trace: the triggered edge per participating process, and
/// any intermediate states UPPAAL reports along the way (e.g. committed
/// locations passed through atomically).
#[derive(Debug, Clone)]
pub struct Transition {
    pub source: State,
    pub target: State,
    pub intermediate_states: Vec<State>,
    /// `proc_id -> edge id` that fired in this process during this step.
    pub triggered_edges: IndexMap<String, Id>,
}

#[derive(Debug, Clone)]
pub struct Trace {
    pub init_state: State,
    pub transitions: Vec<Transition>,
}

impl Trace {
    /// Flattens the trace into its full state sequence: `init_state`, then
    /// each transition's intermediate states followed by its target
    /// (`backend/data/trace.py::Trace.get_states`).
    pub fn get_states(&self, include_intermediate_states: bool) -> Vec<&State> {
        let mut out = Vec::with_capacity(self.transitions.len() + 1);
        out.push(&self.init_state);
        for tr in &self.transitions {
            if include_intermediate_states {
                out.extend(tr.intermediate_states.iter());
            }
            out.push(&tr.target);
        }
        out
    }
}
