//! Raw matcher construction (`spec.md` §4.6).
//!
//! Grounded in `raw_matcher_model_transformer.py`. Unlike the extended
//! builder this needs no `_ID`/`LOC`/`COMM` preprocessing infrastructure:
//! it chains five plain locations per observation, resetting a helper
//! clock `k` at the chain's start and gating each step on `tt`'s bounds
//! plus one inequality pair per observed variable. No partial/deviation/
//! committed features.

use ta_core::ast::{Ast, BinaryOp, TypeId, VariableId};
use ta_core::observation::Observation;

use crate::error::TransformError;
use crate::model::{Id, System};

pub struct RawMatcherModelTransformer;

impl RawMatcherModelTransformer {
    pub fn build(preprocessed: &System, observation: &Observation) -> Result<System, TransformError> {
        if observation.is_empty() {
            return Err(TransformError::new(
                "build_raw_matcher_model",
                "observation sequence must contain at least one data point",
            ));
        }

        let mut sys = System::assign_from(preprocessed, true);
        let tid = sys.new_template("Trace_Matcher_Tmpl");
        let template = sys.templates.get_mut(&tid).unwrap();

        template.declaration.items.push(clock_decl("tt"));
        template.declaration.items.push(clock_decl("k"));

        let mut prev = template.new_location("m_0_1");

        for (idx, point) in observation.iter().enumerate() {
            let base = format!("m_{}", idx + 1);
            let chain: Vec<Id> = (1..=5).map(|k| template.new_location(format!("{base}_{k}"))).collect();

            let reset_edge = template.new_edge(prev, chain[0]);
            let reset_edge = template.get_edge_mut(reset_edge).unwrap();
            reset_edge.clock_guards.push(eq_var_zero("k"));
            reset_edge.resets.push("k".to_string());

            let lower_edge = template.new_edge(chain[0], chain[1]);
            template.get_edge_mut(lower_edge).unwrap().clock_guards.push(cmp_var_const("tt", BinaryOp::Ge, point.t));

            let upper_edge = template.new_edge(chain[1], chain[2]);
            template.get_edge_mut(upper_edge).unwrap().clock_guards.push(cmp_var_const("tt", BinaryOp::Le, point.t));

            let mut var_chain_prev = chain[2];
            for (name, value) in point.vars.iter() {
                let Some(value) = value else { continue };
                let next = template.new_location(format!("{base}_var_{name}"));
                let e = template.new_edge(var_chain_prev, next);
                let e = template.get_edge_mut(e).unwrap();
                e.variable_guards.push(cmp_var_const(name, BinaryOp::Ge, *value));
                e.variable_guards.push(cmp_var_const(name, BinaryOp::Le, *value));
                var_chain_prev = next;
            }
            if var_chain_prev != chain[3] {
                template.new_edge(var_chain_prev, chain[3]);
            }
            template.new_edge(chain[3], chain[4]);

            prev = chain[4];
        }

        let template = sys.templates.get_mut(&tid).unwrap();
        template.locations.get_mut(&prev).unwrap().name = "m_T".to_string();

        sys.system_declaration.add_instantiation("Trace_Matcher", tid, vec![]);
        sys.queries.clear();
        sys.queries.push(ta_core::Query::reachability("Trace_Matcher.m_T"));
        Ok(sys)
    }
}

fn clock_decl(name: &str) -> Ast {
    Ast::VariableDecls {
        ty: Box::new(Ast::Type { prefixes: vec![], type_id: Box::new(TypeId::CustomType("clock".into())) }),
        var_data: vec![VariableId { var_name: name.to_string(), array_decl: vec![], init_data: None }],
    }
}

fn eq_var_zero(name: &str) -> Ast {
    cmp_var_const(name, BinaryOp::Eq, 0)
}

fn cmp_var_const(name: &str, op: BinaryOp, value: i64) -> Ast {
    Ast::BinaryExpr {
        op,
        left: Box::new(Ast::Variable { name: name.to_string() }),
        right: Box::new(Ast::Integer { val: value }),
    }
}

#[cfg(test)]
mod tests {
    use ta_core::observation::DataPoint;

    use super::*;

    #[test]
    fn five_location_chain_per_observation() {
        let sys = System::new();
        let mut dp = DataPoint::new(10);
        dp.vars.insert("x".to_string(), Some(5));
        let obs = vec![dp];
        let out = RawMatcherModelTransformer::build(&sys, &obs).unwrap();
        let matcher = out.get_template_by_name("Trace_Matcher_Tmpl").unwrap();
        // m_0_1 (initial) + 5-location chain + one var-guard location.
        assert_eq!(matcher.locations.len(), 7);
        assert!(matcher.get_location_by_name("m_T").is_some());
    }

    #[test]
    fn query_targets_m_t() {
        let sys = System::new();
        let dp = DataPoint::new(0);
        let out = RawMatcherModelTransformer::build(&sys, &[dp]).unwrap();
        match &out.queries[0] {
            ta_core::Query::PropExists { expr } => match expr.as_ref() {
                Ast::Variable { name } => assert_eq!(name, "Trace_Matcher.m_T"),
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }
}
