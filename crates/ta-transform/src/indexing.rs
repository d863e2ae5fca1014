//! Shared ordinal `__k`/`__e` indexing pass used by the matcher,
//! trace-generator, and transition-simulator builders (`spec.md` §4.5's
//! "Indexing" bullet, also invoked from §4.7/§4.8).
//!
//! Appends a unique ordinal suffix `__k` to every location name, and emits
//! `int __e = -1;` plus an `__e = idx` update on every edge of every
//! template.
//!
//! The counter resets per template rather than running globally across the
//! system: trace ingest (§4.10) resolves a location by taking the embedded
//! ordinal `k` as a positional index into *that one template's* own
//! locations list (`list(template.locations.values())[k]`), not into a
//! system-wide list. A single global counter would desync from that
//! per-template position the moment more than one template exists, so each
//! template's locations are numbered `0..n` independently; uniqueness only
//! needs to hold within a template; since lookups are always scoped by
//! template name (`{proc_id}_Tmpl`) first, cross-template collisions in the
//! suffix are harmless.

use std::collections::HashMap;

use ta_core::ast::{Ast, AssignOp, TypeId, VariableId};

use crate::model::{Id, System};

/// Runs the indexing pass over every template in `sys`, returning the new
/// name assigned to each location id so callers can resolve a query target
/// (e.g. the matcher's accept location) after renaming.
pub fn apply_ordinal_indexing(sys: &mut System) -> HashMap<Id, String> {
    let mut renamed = HashMap::new();

    let template_ids: Vec<Id> = sys.templates.keys().copied().collect();
    for tid in template_ids {
        let mut counter: u64 = 0;
        let template = sys.templates.get_mut(&tid).unwrap();
        let loc_ids: Vec<Id> = template.locations.keys().copied().collect();
        for lid in loc_ids {
            let loc = template.locations.get_mut(&lid).unwrap();
            let new_name = format!("{}__{counter}", loc.name);
            loc.name = new_name.clone();
            renamed.insert(lid, new_name);
            counter += 1;
        }

        template.declaration.items.push(Ast::VariableDecls {
            ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("int".into())) }),
            var_data: vec![VariableId {
                var_name: "__e".into(),
                array_decl: vec![],
                init_data: Some(Box::new(Ast::Integer { val: -1 })),
            }],
        });
        for (idx, edge) in template.edges.values_mut().enumerate() {
            edge.updates.push(Ast::AssignExpr {
                op: AssignOp::Assign,
                left: Box::new(Ast::Variable { name: "__e".into() }),
                right: Box::new(Ast::Integer { val: idx as i64 }),
            });
        }
    }

    renamed
}
