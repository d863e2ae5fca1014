//! Transition-Simulator Construction (`spec.md` §4.8).
//!
//! Grounded in `transition_simulator_model_transformer.py`. Replays a
//! fixed edge schedule `TR[steps][INST_COUNT]`: every edge gains the
//! guards `TR[TR_idx][P_ID] == edge_index && initialized`, and
//! non-receiving edges additionally bump `TR_idx`. A committed helper
//! location `__h` is spliced into the first template so the run only
//! starts once `initialized` flips true.

use indexmap::IndexMap;
use ta_core::ast::{Ast, AssignOp, BinaryOp, TypeId, VariableId};

use crate::error::TransformError;
use crate::indexing::apply_ordinal_indexing;
use crate::model::{SyncKind, System};

pub struct TransitionSimulatorModelTransformer;

impl TransitionSimulatorModelTransformer {
    /// `schedule[step][instance_index]` is the edge index the instance at
    /// `instance_index` must take at `step`; `-1` means "don't care" (the
    /// instance is not involved in that step).
    pub fn build(preprocessed: &System, schedule: &[Vec<i64>]) -> Result<System, TransformError> {
        if schedule.is_empty() {
            return Err(TransformError::new(
                "build_transition_simulator_model",
                "edge schedule must contain at least one step",
            ));
        }
        let steps = schedule.len() as i64;
        let mut sys = System::assign_from(preprocessed, true);

        let instance_ids: IndexMap<String, i64> = sys
            .system_declaration
            .instance_order()
            .enumerate()
            .map(|(k, name)| (name.to_string(), k as i64))
            .collect();
        let inst_count = instance_ids.len();
        for (name, id) in &instance_ids {
            push_int_const(&mut sys, &format!("{name}_ID"), *id);
        }
        push_int_const(&mut sys, "INST_COUNT", inst_count as i64);
        push_int_const(&mut sys, "steps", steps);
        push_int_decl(&mut sys, "TR_idx");
        push_bool_decl_init(&mut sys, "initialized", false);
        push_tr_table(&mut sys, schedule);

        let instantiations = sys.system_declaration.instantiations.clone();
        for inst in &instantiations {
            let Some(&inst_id) = instance_ids.get(&inst.instance_name) else { continue };
            let Some(template) = sys.templates.get_mut(&inst.template_id) else { continue };
            for (idx, edge) in template.edges.values_mut().enumerate() {
                edge.variable_guards.push(Ast::Variable { name: "initialized".into() });
                edge.variable_guards.push(Ast::BinaryExpr {
                    op: BinaryOp::Eq,
                    left: Box::new(Ast::BinaryExpr {
                        op: BinaryOp::ArrayAccess,
                        left: Box::new(Ast::BinaryExpr {
                            op: BinaryOp::ArrayAccess,
                            left: Box::new(Ast::Variable { name: "TR".into() }),
                            right: Box::new(Ast::Variable { name: "TR_idx".into() }),
                        }),
                        right: Box::new(Ast::Integer { val: inst_id }),
                    }),
                    right: Box::new(Ast::Integer { val: idx as i64 }),
                });
                let is_non_receiving = !matches!(&edge.sync, Some(s) if s.kind == SyncKind::Receive);
                if is_non_receiving {
                    edge.updates.push(Ast::IncrDecrAssignExpr {
                        op: ta_core::ast::IncrDecrOp::PostIncr,
                        expr: Box::new(Ast::Variable { name: "TR_idx".into() }),
                    });
                }
            }
        }

        if let Some((&first_tid, _)) = sys.templates.iter().next() {
            let template = sys.templates.get_mut(&first_tid).unwrap();
            let old_initial = template.initial_location;
            let helper = template.new_location("__h");
            template.locations.get_mut(&helper).unwrap().committed = true;
            if let Some(old_initial) = old_initial {
                let e = template.new_edge(helper, old_initial);
                let edge = template.get_edge_mut(e).unwrap();
                edge.updates.push(Ast::AssignExpr {
                    op: AssignOp::Assign,
                    left: Box::new(Ast::Variable { name: "initialized".into() }),
                    right: Box::new(Ast::Boolean { val: true }),
                });
            }
            template.initial_location = Some(helper);
        }

        apply_ordinal_indexing(&mut sys);

        sys.queries.clear();
        sys.queries.push(ta_core::Query::PropExists {
            expr: Box::new(Ast::BinaryExpr {
                op: BinaryOp::LogAnd,
                left: Box::new(Ast::Variable { name: "initialized".into() }),
                right: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::Eq,
                    left: Box::new(Ast::Variable { name: "TR_idx".into() }),
                    right: Box::new(Ast::Variable { name: "steps".into() }),
                }),
            }),
        });

        Ok(sys)
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

fn push_int_decl(sys: &mut System, name: &str) {
    sys.global_declaration.items.push(Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("int".into())) }),
        var_data: vec![VariableId { var_name: name.to_string(), array_decl: vec![], init_data: None }],
    });
}

fn push_bool_decl_init(sys: &mut System, name: &str, value: bool) {
    sys.global_declaration.items.push(Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("bool".into())) }),
        var_data: vec![VariableId {
            var_name: name.to_string(),
            array_decl: vec![],
            init_data: Some(Box::new(Ast::Boolean { val: value })),
        }],
    });
}

fn push_tr_table(sys: &mut System, schedule: &[Vec<i64>]) {
    let rows = schedule
        .iter()
        .map(|row| Ast::InitialiserArray { vals: row.iter().map(|v| Ast::Integer { val: *v }).collect() })
        .collect();
    sys.global_declaration.items.push(Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("int".into())) }),
        var_data: vec![VariableId {
            var_name: "TR".to_string(),
            array_decl: vec![
                Ast::Variable { name: "steps".into() },
                Ast::Variable { name: "INST_COUNT".into() },
            ],
            init_data: Some(Box::new(Ast::InitialiserArray { vals: rows })),
        }],
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_template_gains_a_committed_init_helper() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            t.new_location("l0");
        }
        sys.system_declaration.add_instantiation("p", tid, vec![]);
        let out = TransitionSimulatorModelTransformer::build(&sys, &[vec![0]]).unwrap();
        let t = out.get_template_by_name("P").unwrap();
        assert!(t.locations.values().any(|l| l.committed));
    }

    #[test]
    fn empty_schedule_is_rejected() {
        let sys = System::new();
        assert!(TransitionSimulatorModelTransformer::build(&sys, &[]).is_err());
    }
}
