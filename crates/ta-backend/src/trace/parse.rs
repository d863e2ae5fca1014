//! Trace XML ingest (`spec.md` §4.10).
//!
//! Grounded in `backend/trace/parser.py`'s two-stage `trace_xml_to_dict` /
//! `trace_dict_to_trace` split: first flatten the UPPAAL trace XML into
//! plain dict-shaped records (cheap, no knowledge of the matcher model
//! needed), then resolve those records against the actual [`System`] that
//! produced the trace (location/edge ids, clock order).
//!
//! A location's active name carries an ordinal suffix `loc__k` minted by
//! [`ta_transform::indexing::apply_ordinal_indexing`]; `k` is taken verbatim
//! as the position of that location within its own process template's
//! locations list (`list(template.locations.values())[k]`), not a lookup by
//! name — matching `trace_dict_to_trace`'s `loc_name.rsplit("__", 1)[1]`
//! positional-index convention exactly, which is why the indexing pass
//! numbers each template's locations from `0` independently (see
//! `ta_transform::indexing`'s doc comment).

use indexmap::IndexMap;
use roxmltree::Document;
use ta_dbm::{Bound, DBMEntry, Dbm, Rel};
use ta_transform::model::{Id, System};

use crate::error::MatchError;
use crate::trace::{LocationRef, State, Trace, Transition};

#[derive(Debug, Clone, Default)]
pub struct ProcessDict {
    pub template_name: String,
    /// XML edge id -> index into `template.edges` (§4.10's `original_edge_idxs`).
    pub original_edge_idxs: IndexMap<String, usize>,
}

#[derive(Debug, Clone, Default)]
pub struct SystemDict {
    pub processes: IndexMap<String, ProcessDict>,
}

#[derive(Debug, Clone, Default)]
pub struct LocationVectorDict {
    /// `proc_id -> ordinal-suffixed location name`.
    pub locations: IndexMap<String, String>,
}

#[derive(Debug, Clone)]
pub struct ClockBoundDict {
    pub clock1: String,
    pub clock2: String,
    pub value: String,
    pub comp: String,
}

#[derive(Debug, Clone, Default)]
pub struct StateRecord {
    pub location_vector_id: String,
    pub dbm_instance_id: String,
    pub variable_vector_id: String,
}

#[derive(Debug, Clone, Default)]
pub struct TransitionRecord {
    pub source_state_id: String,
    pub target_state_id: String,
    /// `proc_id -> xml edge id`.
    pub triggered_edges: IndexMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct TraceDict {
    pub system: SystemDict,
    pub location_vectors: IndexMap<String, LocationVectorDict>,
    pub variable_vectors: IndexMap<String, IndexMap<String, String>>,
    pub dbm_instances: IndexMap<String, Vec<ClockBoundDict>>,
    pub states: IndexMap<String, StateRecord>,
    pub transitions: Vec<TransitionRecord>,
}

fn attr<'a>(node: &roxmltree::Node<'a, 'a>, name: &str) -> Result<&'a str, MatchError> {
    node.attribute(name)
        .ok_or_else(|| MatchError::TraceXml(format!("<{}> missing `{name}` attribute", node.tag_name().name())))
}

/// Stage one: flatten the raw trace XML into dict-shaped records
/// (`backend/trace/parser.py::trace_xml_to_dict`).
pub fn trace_xml_to_dict(xml: &str) -> Result<TraceDict, MatchError> {
    let doc = Document::parse(xml).map_err(|e| MatchError::TraceXml(e.to_string()))?;
    let root = doc.root_element();
    let mut dict = TraceDict::default();

    if let Some(system_node) = root.children().find(|n| n.has_tag_name("system")) {
        for process_node in system_node.children().filter(|n| n.has_tag_name("process")) {
            let proc_id = attr(&process_node, "id")?.to_string();
            let template_name = attr(&process_node, "template")?.to_string();
            let mut original_edge_idxs = IndexMap::new();
            for edge_node in process_node.children().filter(|n| n.has_tag_name("edge")) {
                let edge_id = attr(&edge_node, "id")?.to_string();
                let original_idx: usize = attr(&edge_node, "originalIdx")?
                    .parse()
                    .map_err(|_| MatchError::TraceXml("non-numeric originalIdx".into()))?;
                original_edge_idxs.insert(edge_id, original_idx);
            }
            dict.system.processes.insert(proc_id, ProcessDict { template_name, original_edge_idxs });
        }
    }

    if let Some(lvs_node) = root.children().find(|n| n.has_tag_name("locationVectors")) {
        for lv_node in lvs_node.children().filter(|n| n.has_tag_name("locationVector")) {
            let id = attr(&lv_node, "id")?.to_string();
            let mut locations = IndexMap::new();
            for loc_node in lv_node.children().filter(|n| n.has_tag_name("location")) {
                let proc_id = attr(&loc_node, "process")?.to_string();
                let loc_name = loc_node.text().unwrap_or("").trim().to_string();
                locations.insert(proc_id, loc_name);
            }
            dict.location_vectors.insert(id, LocationVectorDict { locations });
        }
    }

    if let Some(vvs_node) = root.children().find(|n| n.has_tag_name("variableVectors")) {
        for vv_node in vvs_node.children().filter(|n| n.has_tag_name("variableVector")) {
            let id = attr(&vv_node, "id")?.to_string();
            let mut vars = IndexMap::new();
            for var_node in vv_node.children().filter(|n| n.has_tag_name("variable")) {
                let name = attr(&var_node, "name")?.to_string();
                let value = attr(&var_node, "value")?.to_string();
                vars.insert(name, value);
            }
            dict.variable_vectors.insert(id, vars);
        }
    }

    if let Some(dbms_node) = root.children().find(|n| n.has_tag_name("dbmInstances")) {
        for dbm_node in dbms_node.children().filter(|n| n.has_tag_name("dbmInstance")) {
            let id = attr(&dbm_node, "id")?.to_string();
            let mut bounds = Vec::new();
            for bound_node in dbm_node.children().filter(|n| n.has_tag_name("bound")) {
                bounds.push(ClockBoundDict {
                    clock1: attr(&bound_node, "clock1")?.to_string(),
                    clock2: attr(&bound_node, "clock2")?.to_string(),
                    value: attr(&bound_node, "value")?.to_string(),
                    comp: attr(&bound_node, "comp")?.to_string(),
                });
            }
            dict.dbm_instances.insert(id, bounds);
        }
    }

    if let Some(states_node) = root.children().find(|n| n.has_tag_name("states")) {
        for state_node in states_node.children().filter(|n| n.has_tag_name("state")) {
            let id = attr(&state_node, "id")?.to_string();
            dict.states.insert(
                id,
                StateRecord {
                    location_vector_id: attr(&state_node, "locationVector")?.to_string(),
                    dbm_instance_id: attr(&state_node, "dbmInstance")?.to_string(),
                    variable_vector_id: attr(&state_node, "variableVector")?.to_string(),
                },
            );
        }
    }

    if let Some(trs_node) = root.children().find(|n| n.has_tag_name("transitions")) {
        for tr_node in trs_node.children().filter(|n| n.has_tag_name("transition")) {
            let mut triggered_edges = IndexMap::new();
            for edge_node in tr_node.children().filter(|n| n.has_tag_name("edge")) {
                let proc_id = attr(&edge_node, "process")?.to_string();
                let edge_id = attr(&edge_node, "id")?.to_string();
                triggered_edges.insert(proc_id, edge_id);
            }
            dict.transitions.push(TransitionRecord {
                source_state_id: attr(&tr_node, "source")?.to_string(),
                target_state_id: attr(&tr_node, "target")?.to_string(),
                triggered_edges,
            });
        }
    }

    Ok(dict)
}

fn parse_bound(value: &str, comp: &str) -> Result<DBMEntry, MatchError> {
    let bound = match value {
        "inf" => Bound::PosInfinity,
        "-inf" => Bound::NegInfinity,
        other => Bound::Finite(
            other.parse::<i64>().map_err(|_| MatchError::TraceXml(format!("non-numeric DBM bound {other:?}")))?,
        ),
    };
    let rel = match comp {
        "<" => Rel::Lt,
        "<=" | "\u{2264}" => Rel::Le,
        other => return Err(MatchError::TraceXml(format!("unknown DBM relation {other:?}"))),
    };
    Ok(DBMEntry { bound, rel })
}

fn reify_dbm(rows: &[ClockBoundDict]) -> Result<Dbm, MatchError> {
    let clock_count = (rows.len() as f64).sqrt().round() as usize;
    if clock_count * clock_count != rows.len() {
        return Err(MatchError::TraceXml("DBM instance is not a square matrix".into()));
    }
    let mut clocks: Vec<String> = rows[..clock_count].iter().map(|b| b.clock2.clone()).collect();
    if let Some(first) = clocks.first_mut() {
        *first = "T0_REF".to_string();
    }
    let mut dbm = Dbm::zero(&clocks, false);
    for (pos, row) in rows.iter().enumerate() {
        let i = pos / clock_count;
        let j = pos % clock_count;
        dbm.set(i, j, parse_bound(&row.value, &row.comp)?);
    }
    dbm.close().map_err(|e| MatchError::TraceXml(e.to_string()))?;
    Ok(dbm)
}

fn location_ordinal(loc_name: &str) -> Result<usize, MatchError> {
    let suffix = loc_name
        .rsplit_once("__")
        .map(|(_, s)| s)
        .ok_or_else(|| MatchError::TraceXml(format!("location name {loc_name:?} has no ordinal suffix")))?;
    suffix.parse().map_err(|_| MatchError::TraceXml(format!("non-numeric ordinal suffix in {loc_name:?}")))
}

fn resolve_location(system: &System, dict: &SystemDict, proc_id: &str, loc_name: &str) -> Result<LocationRef, MatchError> {
    let proc = dict
        .processes
        .get(proc_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown process {proc_id:?} in trace")))?;
    let template = system
        .get_template_by_name(&proc.template_name)
        .ok_or_else(|| MatchError::TraceXml(format!("no template named {:?}", proc.template_name)))?;
    let ordinal = location_ordinal(loc_name)?;
    template
        .locations
        .get_index(ordinal)
        .map(|(_, loc)| LocationRef { id: loc.id, name: loc.name.clone(), committed: loc.committed })
        .ok_or_else(|| MatchError::TraceXml(format!("ordinal {ordinal} out of range for template {:?}", proc.template_name)))
}

fn resolve_edge(system: &System, dict: &SystemDict, proc_id: &str, xml_edge_id: &str) -> Result<Id, MatchError> {
    let proc = dict
        .processes
        .get(proc_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown process {proc_id:?} in trace")))?;
    let template = system
        .get_template_by_name(&proc.template_name)
        .ok_or_else(|| MatchError::TraceXml(format!("no template named {:?}", proc.template_name)))?;
    let idx = *proc
        .original_edge_idxs
        .get(xml_edge_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown edge id {xml_edge_id:?} for process {proc_id:?}")))?;
    template
        .edges
        .get_index(idx)
        .map(|(_, edge)| edge.id)
        .ok_or_else(|| MatchError::TraceXml(format!("edge idx {idx} out of range for template {:?}", proc.template_name)))
}

fn reify_state(dict: &TraceDict, system: &System, state_id: &str) -> Result<State, MatchError> {
    let record = dict
        .states
        .get(state_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown state id {state_id:?}")))?;
    let lv = dict
        .location_vectors
        .get(&record.location_vector_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown location vector {:?}", record.location_vector_id)))?;
    let mut locs = IndexMap::new();
    for (proc_id, loc_name) in &lv.locations {
        locs.insert(proc_id.clone(), resolve_location(system, &dict.system, proc_id, loc_name)?);
    }

    let dbm_rows = dict
        .dbm_instances
        .get(&record.dbm_instance_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown dbm instance {:?}", record.dbm_instance_id)))?;
    let dbm = reify_dbm(dbm_rows)?;

    let var_vector = dict
        .variable_vectors
        .get(&record.variable_vector_id)
        .ok_or_else(|| MatchError::TraceXml(format!("unknown variable vector {:?}", record.variable_vector_id)))?;
    let mut vars = IndexMap::new();
    for (name, value) in var_vector {
        let parsed = value
            .parse::<i64>()
            .map_err(|_| MatchError::TraceXml(format!("non-numeric variable value {value:?}")))?;
        vars.insert(name.clone(), parsed);
    }

    Ok(State { locs, dbm, vars })
}

/// Stage two: resolve a [`TraceDict`] against the [`System`] that produced
/// it into a fully reified [`Trace`] (`trace_dict_to_trace`).
pub fn trace_dict_to_trace(dict: &TraceDict, system: &System) -> Result<Trace, MatchError> {
    let first_transition = dict
        .transitions
        .first()
        .ok_or_else(|| MatchError::TraceXml("trace has no transitions".into()))?;
    let init_state = reify_state(dict, system, &first_transition.source_state_id)?;

    let mut transitions = Vec::with_capacity(dict.transitions.len());
    for tr in &dict.transitions {
        let source = reify_state(dict, system, &tr.source_state_id)?;
        let target = reify_state(dict, system, &tr.target_state_id)?;
        let mut triggered_edges = IndexMap::new();
        for (proc_id, xml_edge_id) in &tr.triggered_edges {
            triggered_edges.insert(proc_id.clone(), resolve_edge(system, &dict.system, proc_id, xml_edge_id)?);
        }
        transitions.push(Transition { source, target, intermediate_states: Vec::new(), triggered_edges });
    }

    Ok(Trace { init_state, transitions })
}

/// Convenience entry point: parse and resolve a trace XML document in one
/// call.
#[tracing::instrument(name = "parse_trace", skip_all)]
pub fn parse_trace(xml: &str, system: &System) -> Result<Trace, MatchError> {
    let dict = trace_xml_to_dict(xml)?;
    trace_dict_to_trace(&dict, system)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn xml_fixture() -> String {
        r#"<trace>
            <system>
                <process id="p" template="P_Tmpl">
                    <edge id="0" originalIdx="0"/>
                    <edge id="1" originalIdx="1"/>
                </process>
            </system>
            <locationVectors>
                <locationVector id="lv0"><location process="p">l0__0</location></locationVector>
                <locationVector id="lv1"><location process="p">l1__1</location></locationVector>
            </locationVectors>
            <variableVectors>
                <variableVector id="vv0"><variable name="p.x" value="0"/></variableVector>
            </variableVectors>
            <dbmInstances>
                <dbmInstance id="d0">
                    <bound clock1="T0_REF" clock2="T0_REF" value="0" comp="<="/>
                    <bound clock1="T0_REF" clock2="p.c" value="0" comp="<="/>
                    <bound clock1="p.c" clock2="T0_REF" value="0" comp="<="/>
                    <bound clock1="p.c" clock2="p.c" value="0" comp="<="/>
                </dbmInstance>
            </dbmInstances>
            <states>
                <state id="s0" locationVector="lv0" dbmInstance="d0" variableVector="vv0"/>
                <state id="s1" locationVector="lv1" dbmInstance="d0" variableVector="vv0"/>
            </states>
            <transitions>
                <transition source="s0" target="s1">
                    <edge process="p" id="0"/>
                </transition>
            </transitions>
        </trace>"#
            .to_string()
    }

    fn fixture_system() -> System {
        let mut sys = System::new();
        let tid = sys.new_template("P_Tmpl");
        let t = sys.get_template_by_id_mut(tid).unwrap();
        let l0 = t.new_location("l0");
        let l1 = t.new_location("l1");
        t.new_edge(l0, l1);
        t.new_edge(l1, l0);
        sys
    }

    #[test]
    fn parses_flat_dict_from_xml() {
        let dict = trace_xml_to_dict(&xml_fixture()).unwrap();
        assert_eq!(dict.states.len(), 2);
        assert_eq!(dict.transitions.len(), 1);
        assert_eq!(dict.system.processes["p"].original_edge_idxs["1"], 1);
    }

    #[test]
    fn resolves_locations_by_per_template_ordinal() {
        let dict = trace_xml_to_dict(&xml_fixture()).unwrap();
        let system = fixture_system();
        let trace = trace_dict_to_trace(&dict, &system).unwrap();
        let template = system.get_template_by_name("P_Tmpl").unwrap();
        let (l0_id, _) = template.locations.get_index(0).unwrap();
        let (l1_id, _) = template.locations.get_index(1).unwrap();
        assert_eq!(trace.init_state.locs["p"].id, *l0_id);
        assert_eq!(trace.transitions[0].target.locs["p"].id, *l1_id);
    }
}
