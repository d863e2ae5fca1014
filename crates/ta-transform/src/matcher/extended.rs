//! Extended matcher model construction (`spec.md` §4.5).
//!
//! Grounded in `extended_matcher_model_transformer.py`. Builds, in order:
//! instance ids, (optional) active-location/committed tracking, the
//! committed sync gate, the matcher template itself (one of four
//! preauthored shapes keyed by `(support_shifted_matching,
//! support_committed_matching)`, baked in as Rust-constructed templates
//! rather than re-parsed from disk per `spec.md` §9), observation arrays,
//! global sync declarations, deviation constants, and finally the ordinal
//! `__k`/`__e` indexing pass shared with the trace-generator and
//! transition-simulator builders.

use indexmap::IndexMap;
use ta_core::ast::{Ast, AssignOp, BinaryOp, TypeId, VariableId};
use ta_core::observation::Observation;

use crate::error::TransformError;
use crate::indexing::apply_ordinal_indexing;
use crate::matcher::{MatcherFlags, NOB, UNNAMED_LOC};
use crate::model::{Id, Sync, SyncKind, System};

pub struct ExtendedMatcherModelTransformer;

impl ExtendedMatcherModelTransformer {
    /// Builds a matcher model for `observation` over the already
    /// preprocessed `model`. `allowed_deviations` maps a variable name (or
    /// the literal key `"t"` for the time observation) to a tolerated
    /// deviation; absence means exact matching for that name.
    pub fn build(
        preprocessed: &System,
        observation: &Observation,
        flags: MatcherFlags,
        allowed_deviations: &IndexMap<String, i64>,
        maximum_initial_delay: i64,
    ) -> Result<System, TransformError> {
        if observation.is_empty() {
            return Err(TransformError::new(
                "build_matcher_model",
                "observation sequence must contain at least one data point",
            ));
        }

        let mut sys = System::assign_from(preprocessed, true);
        let instance_ids = emit_instance_ids(&mut sys);

        let location_ids = if flags.support_location_matching {
            emit_location_tracking(&mut sys, &instance_ids)
        } else {
            IndexMap::new()
        };
        if flags.support_committed_matching {
            emit_committed_tracking(&mut sys, &instance_ids);
            insert_sync_gate(&mut sys);
        }

        let matcher_tid = build_matcher_template(
            &mut sys,
            observation,
            flags,
            allowed_deviations,
            maximum_initial_delay,
            &instance_ids,
        );

        emit_observation_arrays(&mut sys, observation, flags, &location_ids);
        sys.system_declaration.add_instantiation("Trace_Matcher", matcher_tid, vec![]);
        emit_global_sync_decls(&mut sys, flags, maximum_initial_delay);
        emit_deviation_consts(&mut sys, allowed_deviations);

        let accept_id = sys.get_template_by_id(matcher_tid).unwrap().get_location_by_name("S").unwrap().id;
        let renamed = apply_ordinal_indexing(&mut sys);
        let accept_loc_name = renamed.get(&accept_id).cloned().unwrap_or_else(|| "S".to_string());

        sys.queries.clear();
        sys.queries.push(ta_core::Query::reachability(format!("Trace_Matcher.{accept_loc_name}")));

        Ok(sys)
    }
}

/// `const int INST_COUNT = |templates|; const int I_ID = k;` in instance
/// insertion order. Returns the assigned id per instance name.
fn emit_instance_ids(sys: &mut System) -> IndexMap<String, i64> {
    let names: Vec<String> =
        sys.system_declaration.instance_order().map(str::to_string).collect();
    let mut ids = IndexMap::new();
    push_int_const(sys, "INST_COUNT", names.len() as i64);
    for (k, name) in names.iter().enumerate() {
        push_int_const(sys, &format!("{name}_ID"), k as i64);
        ids.insert(name.clone(), k as i64);
    }
    ids
}

/// For each named location of each instantiated template, `const int
/// T_loc = k`; every non-self in-edge gets `LOC[T_ID] = T_loc`. Emits
/// `int LOC[INST_COUNT] = {...}` with each instance's initial location id
/// (or `UNNAMED_LOC`). Returns each instance's `loc_name -> id` map so
/// callers (observation array emission) can resolve an observed location
/// name to the same numeric id `LOC[T_ID]` is compared against, instead of
/// re-deriving it.
fn emit_location_tracking(
    sys: &mut System,
    instance_ids: &IndexMap<String, i64>,
) -> IndexMap<String, IndexMap<String, i64>> {
    let instantiations = sys.system_declaration.instantiations.clone();
    let mut init_ids = vec![UNNAMED_LOC; instance_ids.len()];
    let mut loc_ids_by_instance: IndexMap<String, IndexMap<String, i64>> = IndexMap::new();

    for inst in &instantiations {
        let Some(&inst_id) = instance_ids.get(&inst.instance_name) else { continue };
        let Some(template) = sys.templates.get_mut(&inst.template_id) else { continue };
        let tname = template.name.clone();

        let mut loc_ids = IndexMap::new();
        for (k, loc) in template.named_locations().enumerate() {
            loc_ids.insert(loc.id, (loc.name.clone(), k as i64));
        }
        for (name, id) in loc_ids.values() {
            push_int_const(sys, &format!("{tname}_{name}"), *id);
        }
        let name_to_id: IndexMap<String, i64> =
            loc_ids.values().map(|(name, id)| (name.clone(), *id)).collect();

        let template = sys.templates.get_mut(&inst.template_id).unwrap();
        if let Some(init) = template.initial_location {
            if let Some((_, id)) = loc_ids.get(&init) {
                init_ids[inst_id as usize] = *id;
            }
        }

        for edge in template.edges.values_mut() {
            if edge.is_self_loop() {
                continue;
            }
            if let Some((_, id)) = loc_ids.get(&edge.target) {
                edge.updates.push(assign_array_elem("LOC", inst_id, Ast::Integer { val: *id }));
            }
        }

        loc_ids_by_instance.insert(inst.instance_name.clone(), name_to_id);
    }

    push_int_array_decl(sys, "LOC", "INST_COUNT", init_ids);
    loc_ids_by_instance
}

/// `int COMM[INST_COUNT]`; every non-self in-edge sets
/// `COMM[T_ID] = true|false` per target committedness.
fn emit_committed_tracking(sys: &mut System, instance_ids: &IndexMap<String, i64>) {
    let instantiations = sys.system_declaration.instantiations.clone();
    for inst in &instantiations {
        let Some(&inst_id) = instance_ids.get(&inst.instance_name) else { continue };
        let Some(template) = sys.templates.get_mut(&inst.template_id) else { continue };
        let committed: IndexMap<Id, bool> =
            template.locations.values().map(|l| (l.id, l.committed)).collect();
        for edge in template.edges.values_mut() {
            if edge.is_self_loop() {
                continue;
            }
            let is_committed = committed.get(&edge.target).copied().unwrap_or(false);
            edge.updates.push(assign_array_elem(
                "COMM",
                inst_id,
                Ast::Boolean { val: is_committed },
            ));
        }
    }
    push_int_array_decl(sys, "COMM", "INST_COUNT", vec![0; instance_ids.len()]);
}

/// Insert a fresh urgent intermediate `__h_k` location between every
/// existing edge's source and target, carrying the target's clock
/// invariants; the new edge from `__h_k` synchronizes on the broadcast
/// `_step?` channel. Forces every original transition to be followed by a
/// matcher-driven `_step` before time can pass again.
fn insert_sync_gate(sys: &mut System) {
    let template_ids: Vec<Id> = sys.templates.keys().copied().collect();
    let mut helper_counter: u64 = 0;

    for tid in template_ids {
        let template = sys.templates.get_mut(&tid).unwrap();
        let edge_ids: Vec<Id> = template.edges.keys().copied().collect();

        for eid in edge_ids {
            let (orig_target, target_invariants) = {
                let edge = &template.edges[&eid];
                let target_invariants = template.locations[&edge.target].invariants.clone();
                (edge.target, target_invariants)
            };

            let helper_id = template.new_location(format!("__h_{helper_counter}"));
            helper_counter += 1;
            {
                let h = template.locations.get_mut(&helper_id).unwrap();
                h.urgent = true;
            }

            let edge = template.edges.get_mut(&eid).unwrap();
            edge.target = orig_target;
            let old_in = template.locations.get_mut(&orig_target).unwrap();
            old_in.in_edges.retain(|id| *id != eid);
            template.locations.get_mut(&helper_id).unwrap().in_edges.push(eid);
            let edge = template.edges.get_mut(&eid).unwrap();
            edge.target = helper_id;
            edge.updates.push(assign_bool("_stepped", true));
            edge.variable_guards.push(Ast::UnaryExpr {
                op: ta_core::ast::UnaryOp::LogNot,
                expr: Box::new(Ast::Variable { name: "_stepped".to_string() }),
            });

            let resume_id = template.new_edge(helper_id, orig_target);
            let resume = template.edges.get_mut(&resume_id).unwrap();
            resume.clock_guards = target_invariants.clone();
            resume.sync = Some(Sync { channel: "_step".to_string(), kind: SyncKind::Receive });
            template.locations.get_mut(&orig_target).unwrap().invariants = target_invariants;
        }
    }
}

/// Construct the matcher template. One of four shapes keyed by
/// `(support_shifted_matching, support_committed_matching)`; all four
/// share the same observation-stepping skeleton (`m_0 -> m_1 -> ... ->
/// S`), differing only in the optional initial-delay choice and the
/// optional `_step!` synchronization gate per step.
fn build_matcher_template(
    sys: &mut System,
    observation: &Observation,
    flags: MatcherFlags,
    allowed_deviations: &IndexMap<String, i64>,
    maximum_initial_delay: i64,
    instance_ids: &IndexMap<String, i64>,
) -> Id {
    let n = observation.len();
    let tid = sys.new_template("Trace_Matcher_Tmpl");
    let dev_t = allowed_deviations.get("t").copied();

    let template = sys.templates.get_mut(&tid).unwrap();
    template.declaration.items.push(Ast::VariableDecls {
        ty: Box::new(clock_type()),
        var_data: vec![VariableId { var_name: "tt".into(), array_decl: vec![], init_data: None }],
    });
    template.declaration.items.push(Ast::VariableDecls {
        ty: Box::new(int_type()),
        var_data: vec![VariableId {
            var_name: "i".into(),
            array_decl: vec![],
            init_data: Some(Box::new(Ast::Integer { val: 0 })),
        }],
    });
    template.declaration.items.push(check_vars_function(observation, allowed_deviations, flags));

    let m0 = template.new_location("m_0");
    let _ = instance_ids;
    if flags.support_shifted_matching {
        let h_delay = template.new_location("h_delay");
        let init_edge = template.new_edge(h_delay, m0);
        let guard = Ast::BinaryExpr {
            op: BinaryOp::Le,
            left: Box::new(Ast::Variable { name: "tt".into() }),
            right: Box::new(Ast::Variable { name: "DELAY".into() }),
        };
        template.get_edge_mut(init_edge).unwrap().clock_guards.push(guard);
        template.initial_location = Some(h_delay);
    }

    let mut prev = m0;
    for (idx, point) in observation.iter().enumerate() {
        let m_next = if idx + 1 == n {
            template.new_location("S")
        } else {
            template.new_location(format!("m_{}", idx + 1))
        };

        let time_invariant = time_bound_invariant(point.t, dev_t, true);
        template.locations.get_mut(&prev).unwrap().invariants.push(time_invariant);

        let step_id = template.new_edge(prev, m_next);
        let step = template.get_edge_mut(step_id).unwrap();
        step.clock_guards.push(time_bound_guard(point.t, dev_t, false));
        step.variable_guards.push(Ast::FuncCallExpr { func_name: "check_vars".into(), args: vec![] });
        if flags.support_committed_matching {
            step.sync = Some(Sync { channel: "_step".to_string(), kind: SyncKind::Send });
        }
        step.updates.push(Ast::IncrDecrAssignExpr {
            op: ta_core::ast::IncrDecrOp::PostIncr,
            expr: Box::new(Ast::Variable { name: "i".into() }),
        });
        step.resets.push("tt".to_string());

        prev = m_next;
    }

    tid
}

/// `tt <= OBS_time[i] (+ DEV_time)` style invariant guarding a matcher
/// location from letting time pass beyond the next observation.
fn time_bound_invariant(_t: i64, dev: Option<i64>, upper: bool) -> Ast {
    let bound = Ast::BinaryExpr {
        op: BinaryOp::ArrayAccess,
        left: Box::new(Ast::Variable { name: "OBS_time".into() }),
        right: Box::new(Ast::Variable { name: "i".into() }),
    };
    let bound = match dev {
        Some(_) => Ast::BinaryExpr {
            op: if upper { BinaryOp::Add } else { BinaryOp::Sub },
            left: Box::new(bound),
            right: Box::new(Ast::Variable { name: "DEV_t".into() }),
        },
        None => bound,
    };
    Ast::BinaryExpr {
        op: if upper { BinaryOp::Le } else { BinaryOp::Ge },
        left: Box::new(Ast::Variable { name: "tt".into() }),
        right: Box::new(bound),
    }
}

fn time_bound_guard(t: i64, dev: Option<i64>, upper: bool) -> Ast {
    time_bound_invariant(t, dev, upper)
}

/// `bool check_vars() { return <conjunction>; }` — each observed variable
/// contributes `v == OBS_v[i]` (exact) or a tolerance interval, optionally
/// wrapped as `!HAS_OBS_v[i] || (...)` under partial matching. Location
/// conjuncts compare `LOC[P_ID]` to `OBS_P[i]` the same way.
fn check_vars_function(
    observation: &Observation,
    allowed_deviations: &IndexMap<String, i64>,
    flags: MatcherFlags,
) -> Ast {
    let mut var_names: Vec<String> = Vec::new();
    for point in observation {
        for name in point.vars.keys() {
            if !var_names.contains(name) {
                var_names.push(name.clone());
            }
        }
    }

    let mut conjuncts = Vec::new();
    for name in &var_names {
        let obs_array = Ast::BinaryExpr {
            op: BinaryOp::ArrayAccess,
            left: Box::new(Ast::Variable { name: format!("OBS_{name}") }),
            right: Box::new(Ast::Variable { name: "i".into() }),
        };
        let var = Ast::Variable { name: name.clone() };
        let cmp = match allowed_deviations.get(name) {
            Some(&dev) if dev > 0 => Ast::BinaryExpr {
                op: BinaryOp::LogAnd,
                left: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::Ge,
                    left: Box::new(var.clone()),
                    right: Box::new(Ast::BinaryExpr {
                        op: BinaryOp::Sub,
                        left: Box::new(obs_array.clone()),
                        right: Box::new(Ast::Variable { name: format!("DEV_{name}") }),
                    }),
                }),
                right: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::Le,
                    left: Box::new(var),
                    right: Box::new(Ast::BinaryExpr {
                        op: BinaryOp::Add,
                        left: Box::new(obs_array.clone()),
                        right: Box::new(Ast::Variable { name: format!("DEV_{name}") }),
                    }),
                }),
            },
            _ => Ast::BinaryExpr { op: BinaryOp::Eq, left: Box::new(var), right: Box::new(obs_array.clone()) },
        };
        let conjunct = if flags.support_partial_matching {
            Ast::BinaryExpr {
                op: BinaryOp::LogOr,
                left: Box::new(Ast::UnaryExpr {
                    op: ta_core::ast::UnaryOp::LogNot,
                    expr: Box::new(Ast::BinaryExpr {
                        op: BinaryOp::ArrayAccess,
                        left: Box::new(Ast::Variable { name: format!("HAS_OBS_{name}") }),
                        right: Box::new(Ast::Variable { name: "i".into() }),
                    }),
                }),
                right: Box::new(cmp),
            }
        } else {
            cmp
        };
        conjuncts.push(conjunct);
    }

    if flags.support_location_matching {
        let mut proc_names: Vec<String> = Vec::new();
        for point in observation {
            for name in point.locs.keys() {
                if !proc_names.contains(name) {
                    proc_names.push(name.clone());
                }
            }
        }
        for proc in &proc_names {
            let conjunct = Ast::BinaryExpr {
                op: BinaryOp::Eq,
                left: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::ArrayAccess,
                    left: Box::new(Ast::Variable { name: "LOC".into() }),
                    right: Box::new(Ast::Variable { name: format!("{proc}_ID") }),
                }),
                right: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::ArrayAccess,
                    left: Box::new(Ast::Variable { name: format!("OBS_{proc}") }),
                    right: Box::new(Ast::Variable { name: "i".into() }),
                }),
            };
            conjuncts.push(conjunct);
        }
    }

    let body_expr = conjuncts
        .into_iter()
        .reduce(|acc, c| Ast::BinaryExpr { op: BinaryOp::LogAnd, left: Box::new(acc), right: Box::new(c) })
        .unwrap_or(Ast::Boolean { val: true });

    Ast::Function {
        ty: Box::new(bool_type()),
        name: "check_vars".to_string(),
        params: vec![],
        body: Box::new(Ast::StatementBlock {
            decls: vec![],
            stmts: vec![Ast::ReturnStatement { expr: Some(Box::new(body_expr)) }],
        }),
    }
}

/// `const int OBS_COUNT = n;` plus one `const int OBS_<name>[OBS_COUNT] =
/// {...}` per observed field; missing variable entries serialize as
/// [`NOB`]. Under partial matching, parallel `HAS_OBS_<name>` boolean
/// arrays record presence.
fn emit_observation_arrays(
    sys: &mut System,
    observation: &Observation,
    flags: MatcherFlags,
    location_ids: &IndexMap<String, IndexMap<String, i64>>,
) {
    let n = observation.len();
    push_int_const(sys, "OBS_COUNT", n as i64);
    push_int_array_decl(sys, "OBS_time", "OBS_COUNT", observation.iter().map(|p| p.t).collect());

    let mut var_names: Vec<String> = Vec::new();
    for point in observation {
        for name in point.vars.keys() {
            if !var_names.contains(name) {
                var_names.push(name.clone());
            }
        }
    }
    for name in &var_names {
        let values: Vec<i64> = observation.iter().map(|p| p.vars.get(name).copied().flatten().unwrap_or(NOB)).collect();
        push_int_array_decl(sys, &format!("OBS_{name}"), "OBS_COUNT", values);
        if flags.support_partial_matching {
            let present: Vec<i64> =
                observation.iter().map(|p| i64::from(p.vars.get(name).copied().flatten().is_some())).collect();
            push_bool_array_decl(sys, &format!("HAS_OBS_{name}"), "OBS_COUNT", present);
        }
    }

    if flags.support_location_matching {
        let mut proc_names: Vec<String> = Vec::new();
        for point in observation {
            for name in point.locs.keys() {
                if !proc_names.contains(name) {
                    proc_names.push(name.clone());
                }
            }
        }
        for proc in &proc_names {
            let Some(proc_loc_ids) = location_ids.get(proc) else { continue };
            let values: Vec<i64> = observation
                .iter()
                .map(|p| {
                    p.locs
                        .get(proc)
                        .and_then(|l| l.name.as_ref())
                        .and_then(|name| proc_loc_ids.get(name).copied())
                        .unwrap_or(UNNAMED_LOC)
                })
                .collect();
            push_int_array_decl(sys, &format!("OBS_{proc}"), "OBS_COUNT", values);
        }
    }
}

/// `broadcast chan _step; bool _stepped = true;` (committed);
/// `const int DELAY = maximum_initial_delay;` (shifted);
/// `bool is_committed() { ... }` (committed).
fn emit_global_sync_decls(sys: &mut System, flags: MatcherFlags, maximum_initial_delay: i64) {
    if flags.support_committed_matching {
        sys.global_declaration.items.push(Ast::VariableDecls {
            ty: Box::new(Ast::Type { prefixes: vec!["broadcast".into(), "chan".into()], type_id: Box::new(TypeId::CustomType("chan".into())) }),
            var_data: vec![VariableId { var_name: "_step".into(), array_decl: vec![], init_data: None }],
        });
        sys.global_declaration.items.push(Ast::VariableDecls {
            ty: Box::new(bool_type()),
            var_data: vec![VariableId {
                var_name: "_stepped".into(),
                array_decl: vec![],
                init_data: Some(Box::new(Ast::Boolean { val: true })),
            }],
        });
        let exists_clause = Ast::FuncCallExpr {
            func_name: "exists".to_string(),
            args: vec![
                Ast::Variable { name: "i".into() },
                Ast::BinaryExpr {
                    op: BinaryOp::ArrayAccess,
                    left: Box::new(Ast::Variable { name: "COMM".into() }),
                    right: Box::new(Ast::Variable { name: "i".into() }),
                },
            ],
        };
        sys.global_declaration.items.push(Ast::Function {
            ty: Box::new(bool_type()),
            name: "is_committed".to_string(),
            params: vec![],
            body: Box::new(Ast::StatementBlock {
                decls: vec![],
                stmts: vec![Ast::ReturnStatement { expr: Some(Box::new(exists_clause)) }],
            }),
        });
    }
    if flags.support_shifted_matching {
        push_int_const(sys, "DELAY", maximum_initial_delay);
    }
}

fn emit_deviation_consts(sys: &mut System, allowed_deviations: &IndexMap<String, i64>) {
    for (name, dev) in allowed_deviations {
        if *dev > 0 {
            push_int_const(sys, &format!("DEV_{name}"), *dev);
        }
    }
}

fn assign_array_elem(array: &str, index: i64, value: Ast) -> Ast {
    Ast::AssignExpr {
        op: AssignOp::Assign,
        left: Box::new(Ast::BinaryExpr {
            op: BinaryOp::ArrayAccess,
            left: Box::new(Ast::Variable { name: array.to_string() }),
            right: Box::new(Ast::Integer { val: index }),
        }),
        right: Box::new(value),
    }
}

fn assign_bool(name: &str, value: bool) -> Ast {
    Ast::AssignExpr {
        op: AssignOp::Assign,
        left: Box::new(Ast::Variable { name: name.to_string() }),
        right: Box::new(Ast::Boolean { val: value }),
    }
}

fn push_int_const(sys: &mut System, name: &str, value: i64) {
    sys.global_declaration.items.push(Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec!["const".into()], type_id: Box::new(TypeId::CustomType("int".into())) }),
        var_data: vec![VariableId {
            var_name: name.to_string(),
            array_decl: vec![],
            init_data: Some(Box::new(Ast::Integer { val: value })),
        }],
    });
}

fn push_int_array_decl(sys: &mut System, name: &str, size_const: &str, values: Vec<i64>) {
    sys.global_declaration.items.push(Ast::VariableDecls {
        ty: Box::new(int_type()),
        var_data: vec![VariableId {
            var_name: name.to_string(),
            array_decl: vec![Ast::Variable { name: size_const.to_string() }],
            init_data: Some(Box::new(Ast::InitialiserArray {
                vals: values.into_iter().map(|v| Ast::Integer { val: v }).collect(),
            })),
        }],
    });
}

fn push_bool_array_decl(sys: &mut System, name: &str, size_const: &str, values: Vec<i64>) {
    sys.global_declaration.items.push(Ast::VariableDecls {
        ty: Box::new(bool_type()),
        var_data: vec![VariableId {
            var_name: name.to_string(),
            array_decl: vec![Ast::Variable { name: size_const.to_string() }],
            init_data: Some(Box::new(Ast::InitialiserArray {
                vals: values.into_iter().map(|v| Ast::Boolean { val: v != 0 }).collect(),
            })),
        }],
    });
}

fn int_type() -> Ast {
    Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("int".into())) }
}

fn bool_type() -> Ast {
    Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("bool".into())) }
}

fn clock_type() -> Ast {
    Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("clock".into())) }
}

#[cfg(test)]
mod tests {
    use ta_core::observation::DataPoint;

    use super::*;

    fn obs_with_var(var: &str, values: &[i64]) -> Observation {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let mut dp = DataPoint::new(i as i64 * 10);
                dp.vars.insert(var.to_string(), Some(*v));
                dp
            })
            .collect()
    }

    #[test]
    fn builds_one_location_per_observation_plus_accept() {
        let sys = System::new();
        let obs = obs_with_var("x", &[1, 2, 3]);
        let out = ExtendedMatcherModelTransformer::build(
            &sys,
            &obs,
            MatcherFlags::default(),
            &IndexMap::new(),
            0,
        )
        .unwrap();
        let matcher = out.get_template_by_name("Trace_Matcher_Tmpl").unwrap();
        // 3 observations -> m_0, m_1, m_2, S = 4 locations.
        assert_eq!(matcher.locations.len(), 4);
        assert_eq!(matcher.edges.len(), 3);
    }

    #[test]
    fn query_targets_the_renamed_accept_location() {
        let sys = System::new();
        let obs = obs_with_var("x", &[1]);
        let out = ExtendedMatcherModelTransformer::build(
            &sys,
            &obs,
            MatcherFlags::default(),
            &IndexMap::new(),
            0,
        )
        .unwrap();
        assert_eq!(out.queries.len(), 1);
        match &out.queries[0] {
            ta_core::Query::PropExists { expr } => match expr.as_ref() {
                Ast::Variable { name } => assert!(name.starts_with("Trace_Matcher.S__")),
                other => panic!("expected Variable, got {other:?}"),
            },
            other => panic!("expected PropExists, got {other:?}"),
        }
    }

    /// The values of a pushed `const int NAME[...] = {...}` (or plain
    /// `const int NAME = v`) declaration, by variable name.
    fn find_int_values(sys: &System, name: &str) -> Vec<i64> {
        for item in &sys.global_declaration.items {
            let Ast::VariableDecls { var_data, .. } = item else { continue };
            for v in var_data {
                if v.var_name != name {
                    continue;
                }
                return match v.init_data.as_deref() {
                    Some(Ast::InitialiserArray { vals }) => vals
                        .iter()
                        .map(|a| match a {
                            Ast::Integer { val } => *val,
                            other => panic!("expected Integer, got {other:?}"),
                        })
                        .collect(),
                    Some(Ast::Integer { val }) => vec![*val],
                    other => panic!("expected an int initializer, got {other:?}"),
                };
            }
        }
        panic!("no declaration named {name:?}");
    }

    #[test]
    fn location_observation_resolves_to_the_named_location_id_not_zero() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            t.new_location("l0"); // tracking id 0
            t.new_location("l1"); // tracking id 1
        }
        sys.system_declaration.add_instantiation("p", tid, vec![]);

        let mut dp = DataPoint::new(0);
        dp.locs.insert(
            "p".to_string(),
            ta_core::observation::LocationObservation { name: Some("l1".to_string()), is_committed: false },
        );
        let obs = vec![dp];

        let flags = MatcherFlags { support_location_matching: true, ..MatcherFlags::default() };
        let out =
            ExtendedMatcherModelTransformer::build(&sys, &obs, flags, &IndexMap::new(), 0).unwrap();

        // "l1" is the second named location of "P", so its id is 1, not the
        // hardcoded 0 a stale implementation would emit for any observed name.
        assert_eq!(find_int_values(&out, "OBS_p"), vec![1]);
    }

    #[test]
    fn time_bound_applies_deviation_symmetrically() {
        // Guard (`upper=false`, `tt >= OBS_time[i] (- DEV_t)`):
        let guard = time_bound_guard(0, Some(2), false);
        assert_eq!(
            guard,
            Ast::BinaryExpr {
                op: BinaryOp::Ge,
                left: Box::new(Ast::Variable { name: "tt".into() }),
                right: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::Sub,
                    left: Box::new(Ast::BinaryExpr {
                        op: BinaryOp::ArrayAccess,
                        left: Box::new(Ast::Variable { name: "OBS_time".into() }),
                        right: Box::new(Ast::Variable { name: "i".into() }),
                    }),
                    right: Box::new(Ast::Variable { name: "DEV_t".into() }),
                }),
            }
        );

        // Invariant (`upper=true`, `tt <= OBS_time[i] + DEV_t`):
        let invariant = time_bound_invariant(0, Some(2), true);
        assert_eq!(
            invariant,
            Ast::BinaryExpr {
                op: BinaryOp::Le,
                left: Box::new(Ast::Variable { name: "tt".into() }),
                right: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::Add,
                    left: Box::new(Ast::BinaryExpr {
                        op: BinaryOp::ArrayAccess,
                        left: Box::new(Ast::Variable { name: "OBS_time".into() }),
                        right: Box::new(Ast::Variable { name: "i".into() }),
                    }),
                    right: Box::new(Ast::Variable { name: "DEV_t".into() }),
                }),
            }
        );
    }

    #[test]
    fn empty_observation_is_rejected() {
        let sys = System::new();
        let err = ExtendedMatcherModelTransformer::build(
            &sys,
            &[],
            MatcherFlags::default(),
            &IndexMap::new(),
            0,
        )
        .unwrap_err();
        assert_eq!(err.stage, "build_matcher_model");
    }
}
