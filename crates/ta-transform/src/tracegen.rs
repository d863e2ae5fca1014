//! Trace-Generator Construction (`spec.md` §4.7).
//!
//! Grounded in `trace_generator_model_transformer.py`. Every edge
//! `e: s -> t` splits into `e1: s -> __h_k` (guards, selects; target
//! committed) and `e2: __h_k -> t` (updates, resets; a plain `sync` label
//! becomes `step{op}`). Non-receiving edges (no sync, or a send `!`)
//! additionally bump the global step counter and reset the global trace
//! clock. Each select's range is captured into a fresh per-edge local
//! variable so its value stays visible on `e2`.

use ta_core::ast::{Ast, TypeId, VariableId};

use crate::error::TransformError;
use crate::indexing::apply_ordinal_indexing;
use crate::model::{Id, Sync, SyncKind, System};

pub struct TraceGeneratorModelTransformer;

impl TraceGeneratorModelTransformer {
    /// `step_count` is the target value of the `_SC == step_count` query;
    /// it must match the number of non-receiving edges the caller intends
    /// to traverse in the generated run (§6 `step_count` config key).
    pub fn build(preprocessed: &System, step_count: i64) -> Result<System, TransformError> {
        let mut sys = System::assign_from(preprocessed, true);

        sys.global_declaration.items.push(clock_decl("_TG"));
        sys.global_declaration.items.push(clock_decl("_TR"));
        sys.global_declaration.items.push(int_decl_init("_SC", 0));
        sys.global_declaration.items.push(Ast::VariableDecls {
            ty: Box::new(Ast::Type {
                prefixes: vec!["broadcast".into(), "chan".into()],
                type_id: Box::new(TypeId::CustomType("chan".into())),
            }),
            var_data: vec![VariableId { var_name: "step".into(), array_decl: vec![], init_data: None }],
        });

        let template_ids: Vec<Id> = sys.templates.keys().copied().collect();
        for tid in template_ids {
            split_edges_with_step_gate(&mut sys, tid, step_count);
        }

        apply_ordinal_indexing(&mut sys);

        sys.queries.clear();
        sys.queries.push(ta_core::Query::PropExists {
            expr: Box::new(Ast::BinaryExpr {
                op: ta_core::ast::BinaryOp::Eq,
                left: Box::new(Ast::Variable { name: "_SC".into() }),
                right: Box::new(Ast::Integer { val: step_count }),
            }),
        });

        Ok(sys)
    }
}

fn split_edges_with_step_gate(sys: &mut System, tid: Id, step_count: i64) {
    let _ = step_count;
    let template = sys.templates.get_mut(&tid).unwrap();
    let edge_ids: Vec<Id> = template.edges.keys().copied().collect();
    let mut helper_counter: u64 = 0;

    for eid in edge_ids {
        let is_non_receiving = {
            let edge = &template.edges[&eid];
            !matches!(&edge.sync, Some(s) if s.kind == SyncKind::Receive)
        };

        let (source, target) = {
            let edge = &template.edges[&eid];
            (edge.source, edge.target)
        };
        let helper_id = template.new_location(format!("__h_{helper_counter}"));
        helper_counter += 1;
        {
            let h = template.locations.get_mut(&helper_id).unwrap();
            h.committed = true;
        }

        // Redirect the original edge's target to the helper; it keeps its
        // guards/selects. Capture each select's value into a fresh local.
        let sel_names: Vec<String> = {
            let edge = template.edges.get_mut(&eid).unwrap();
            edge.target = helper_id;
            edge.selects.iter().map(|s| s.name.clone()).collect()
        };
        let _ = source;
        template.locations.get_mut(&target).unwrap().in_edges.retain(|id| *id != eid);
        template.locations.get_mut(&helper_id).unwrap().in_edges.push(eid);

        for sel in &sel_names {
            let capture_name = format!("sel_{sel}");
            template.declaration.items.push(int_decl(&capture_name));
            let edge = template.edges.get_mut(&eid).unwrap();
            edge.updates.push(Ast::AssignExpr {
                op: ta_core::ast::AssignOp::Assign,
                left: Box::new(Ast::Variable { name: capture_name }),
                right: Box::new(Ast::Variable { name: sel.clone() }),
            });
        }

        // e2: __h_k -> t, carries the original updates/resets/sync.
        let (orig_updates, orig_resets, orig_sync) = {
            let edge = template.edges.get_mut(&eid).unwrap();
            (
                std::mem::take(&mut edge.updates),
                std::mem::take(&mut edge.resets),
                edge.sync.take(),
            )
        };
        let step_edge_id = template.new_edge(helper_id, target);
        let step_edge = template.edges.get_mut(&step_edge_id).unwrap();
        step_edge.updates = orig_updates;
        step_edge.resets = orig_resets;
        step_edge.sync = match orig_sync {
            Some(s) => Some(Sync { channel: format!("step{{{}}}", sync_op(&s)), kind: s.kind }),
            None => Some(Sync { channel: "step".to_string(), kind: SyncKind::Send }),
        };

        if is_non_receiving {
            step_edge.updates.push(Ast::IncrDecrAssignExpr {
                op: ta_core::ast::IncrDecrOp::PostIncr,
                expr: Box::new(Ast::Variable { name: "_SC".into() }),
            });
            step_edge.resets.push("_TR".to_string());
        }
    }
}

fn sync_op(sync: &Sync) -> &'static str {
    match sync.kind {
        SyncKind::Send => "!",
        SyncKind::Receive => "?",
    }
}

fn clock_decl(name: &str) -> Ast {
    Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("clock".into())) }),
        var_data: vec![VariableId { var_name: name.to_string(), array_decl: vec![], init_data: None }],
    }
}

fn int_decl(name: &str) -> Ast {
    Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("int".into())) }),
        var_data: vec![VariableId { var_name: name.to_string(), array_decl: vec![], init_data: None }],
    }
}

fn int_decl_init(name: &str, value: i64) -> Ast {
    Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("int".into())) }),
        var_data: vec![VariableId {
            var_name: name.to_string(),
            array_decl: vec![],
            init_data: Some(Box::new(Ast::Integer { val: value })),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Select, System};

    #[test]
    fn every_edge_gains_a_committed_helper_location() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            let l0 = t.new_location("l0");
            let l1 = t.new_location("l1");
            t.new_edge(l0, l1);
        }
        let out = TraceGeneratorModelTransformer::build(&sys, 1).unwrap();
        let t = out.get_template_by_name("P").unwrap();
        // original 2 + 1 helper = 3 locations; original edge + new step edge = 2.
        assert_eq!(t.locations.len(), 3);
        assert_eq!(t.edges.len(), 2);
        assert!(t.locations.values().any(|l| l.committed));
    }

    #[test]
    fn select_value_is_captured_into_a_fresh_local() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            let l0 = t.new_location("l0");
            let l1 = t.new_location("l1");
            let e = t.new_edge(l0, l1);
            t.get_edge_mut(e).unwrap().selects.push(Select {
                name: "k".to_string(),
                range: Ast::Variable { name: "int_0_3".into() },
            });
        }
        let out = TraceGeneratorModelTransformer::build(&sys, 1).unwrap();
        let t = out.get_template_by_name("P").unwrap();
        assert!(t.declaration.items.iter().any(|item| matches!(
            item,
            Ast::VariableDecls { var_data, .. } if var_data[0].var_name == "sel_k"
        )));
    }
}
