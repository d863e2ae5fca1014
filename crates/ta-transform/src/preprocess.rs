//! Preprocessing (`PreprocessedModelTransformer`, `spec.md` §4.4).
//!
//! Six ordered steps, grounded in
//! `uppaal_model/backend/models/nta/modifiers/nta_modifier.py`
//! (`SystemModifier.move_sys_vars_to_global_decl`,
//! `convert_instances_to_templates`, `resolve_parameters`,
//! `convert_local_decl_to_global_decl`) and
//! `uppaal_model/backend/models/ta/modifiers/ta_modifier.py`
//! (`TemplateModifier`/`LocationModifier`/`EdgeModifier::adapt_asts`).
//! Sequencing is load-bearing (`spec.md` §5): steps 1-6 are not
//! reorderable.

use std::collections::HashMap;

use ta_core::ast::{Ast, TypeId};
use ta_core::walk::{rename_func, rename_type, rename_var, walk};

use crate::error::TransformError;
use crate::model::{Id, System, Template};

/// Instance data for step 2's implicit-instance expansion: maps a process
/// name appearing bare in the `system` statement to the template it should
/// instantiate and the arguments to pass.
#[derive(Debug, Clone)]
pub struct ImplicitInstance {
    pub template_name: String,
    pub args: Vec<Ast>,
}

pub struct PreprocessedModelTransformer;

impl PreprocessedModelTransformer {
    /// Runs all six steps over a deep copy of `model`, leaving `model`
    /// untouched (`spec.md` §4.3: "copying is required before any
    /// transformation").
    #[tracing::instrument(name = "preprocess", skip_all)]
    pub fn run(
        model: &System,
        instance_data: &HashMap<String, ImplicitInstance>,
    ) -> Result<System, TransformError> {
        let mut sys = System::assign_from(model, true);
        Self::lift_system_decls_to_global(&mut sys);
        Self::expand_implicit_instances(&mut sys, instance_data)?;
        Self::scalars_to_bounded_ints(&mut sys);
        Self::clone_templates_per_instance(&mut sys)?;
        Self::resolve_parameters(&mut sys)?;
        Self::rename_locals_to_global(&mut sys);
        Ok(sys)
    }

    /// Step 1: lift system-declaration variable/type/function decls to
    /// global declarations; `Instantiation`s stay in place.
    fn lift_system_decls_to_global(sys: &mut System) {
        let items = std::mem::take(&mut sys.system_declaration.local_items);
        sys.global_declaration.items.extend(items);
    }

    /// Step 2: the `system` statement may name templates directly; each
    /// such name is replaced in the process-name list with the explicit
    /// instance it denotes per `instance_data`.
    fn expand_implicit_instances(
        sys: &mut System,
        instance_data: &HashMap<String, ImplicitInstance>,
    ) -> Result<(), TransformError> {
        for (instance_name, implicit) in instance_data {
            let already_explicit = sys
                .system_declaration
                .instantiations
                .iter()
                .any(|i| &i.instance_name == instance_name);
            if already_explicit {
                continue;
            }
            let names_template_bare = sys
                .system_declaration
                .process_names
                .iter()
                .any(|group| group.iter().any(|n| n == instance_name));
            if !names_template_bare {
                continue;
            }
            let template_id = sys
                .get_template_by_name(&implicit.template_name)
                .map(|t| t.id)
                .ok_or_else(|| {
                    TransformError::new(
                        "expand_implicit_instances",
                        format!("unknown template {:?}", implicit.template_name),
                    )
                })?;
            sys.system_declaration.instantiations.push(crate::model::Instantiation {
                instance_name: instance_name.clone(),
                template_id,
                args: implicit.args.clone(),
            });
        }
        Ok(())
    }

    /// Step 3: every `ScalarType{expr}` becomes `BoundedIntType{lower: 0,
    /// upper: expr - 1}`.
    fn scalars_to_bounded_ints(sys: &mut System) {
        let rewrite = |item: Ast| -> Ast {
            let mut f = |node: Ast, _acc: &mut Vec<()>| match node {
                Ast::Type { prefixes, type_id } => {
                    let type_id = match *type_id {
                        TypeId::ScalarType { expr } => TypeId::BoundedIntType {
                            lower: Box::new(Ast::Integer { val: 0 }),
                            upper: Box::new(Ast::BinaryExpr {
                                op: ta_core::ast::BinaryOp::Sub,
                                left: expr,
                                right: Box::new(Ast::Integer { val: 1 }),
                            }),
                        },
                        other => other,
                    };
                    Ast::Type { prefixes, type_id: Box::new(type_id) }
                }
                other => other,
            };
            walk(item, &mut f, &mut Vec::new())
        };
        sys.global_declaration.items =
            sys.global_declaration.items.drain(..).map(rewrite).collect();
        for template in sys.templates.values_mut() {
            template.declaration.items =
                template.declaration.items.drain(..).map(&rewrite).collect();
        }
    }

    /// Step 4: for each instance `I` with template `T`, create a fresh
    /// template `I_Tmpl := deep-copy(T)` and point `I`'s `Instantiation` at
    /// it. Original templates not referenced by any remaining
    /// instantiation are dropped.
    fn clone_templates_per_instance(sys: &mut System) -> Result<(), TransformError> {
        let mut new_templates = indexmap::IndexMap::new();
        let mut next_tmpl_id: Id = sys.templates.keys().copied().max().unwrap_or(0) + 1;

        for inst in sys.system_declaration.instantiations.iter_mut() {
            let source = sys.templates.get(&inst.template_id).ok_or_else(|| {
                TransformError::new(
                    "clone_templates_per_instance",
                    format!("instance {:?} references unknown template", inst.instance_name),
                )
            })?;
            let mut cloned = source.deep_copy(next_tmpl_id, true);
            cloned.name = format!("{}_Tmpl", inst.instance_name);
            let new_id = cloned.id;
            next_tmpl_id += 1;
            new_templates.insert(new_id, cloned);
            inst.template_id = new_id;
        }

        sys.templates = new_templates;
        Ok(())
    }

    /// Step 5: resolve each `I_Tmpl`'s parameters against its single
    /// instantiation's arguments.
    ///
    /// By-reference parameters are substituted directly (every `Variable`
    /// reference to the parameter becomes the argument expression) and
    /// removed from both the parameter list and the argument list.
    /// By-value parameters are removed from the parameter/argument lists
    /// and reintroduced as a local declaration statement
    /// `T p = arg;` so initialization is preserved.
    fn resolve_parameters(sys: &mut System) -> Result<(), TransformError> {
        for inst in sys.system_declaration.instantiations.iter_mut() {
            let Some(template) = sys.templates.get_mut(&inst.template_id) else { continue };
            if template.parameters.is_empty() {
                continue;
            }
            if template.parameters.len() != inst.args.len() {
                return Err(TransformError::new(
                    "resolve_parameters",
                    format!(
                        "instance {:?}: {} parameters but {} arguments",
                        inst.instance_name,
                        template.parameters.len(),
                        inst.args.len()
                    ),
                ));
            }

            let params = std::mem::take(&mut template.parameters);
            let args = std::mem::take(&mut inst.args);
            let mut remaining_params = Vec::new();
            let mut remaining_args = Vec::new();

            for (param, arg) in params.into_iter().zip(args.into_iter()) {
                if param.is_ref {
                    substitute_param_by_ref(template, &param.name, &arg);
                } else {
                    let decl_stmt = Ast::VariableDecls {
                        ty: Box::new(param.ty.clone()),
                        var_data: vec![ta_core::ast::VariableId {
                            var_name: param.name.clone(),
                            array_decl: param.array_decl.clone(),
                            init_data: Some(Box::new(arg.clone())),
                        }],
                    };
                    template.declaration.items.insert(0, decl_stmt);
                    remaining_params.push(param);
                    remaining_args.push(arg);
                }
            }

            template.parameters = remaining_params;
            inst.args = remaining_args;
        }
        Ok(())
    }

    /// Step 6: collect local variable/type/function names, rename every
    /// reference to `{T}_{v}` both in the template's own declaration and
    /// in every label of every edge/location, then move the (now globally
    /// unique) declaration into the global section.
    fn rename_locals_to_global(sys: &mut System) {
        let template_ids: Vec<Id> = sys.templates.keys().copied().collect();
        for tid in template_ids {
            let Some(template) = sys.templates.get(&tid) else { continue };
            let tname = template.name.clone();
            let local_names = collect_local_names(template);
            if local_names.is_empty() {
                continue;
            }

            let template = sys.templates.get_mut(&tid).unwrap();
            for name in &local_names {
                let new_name = format!("{tname}_{name}");
                rename_in_template(template, name, &new_name);
            }

            let template = sys.templates.get_mut(&tid).unwrap();
            let items = std::mem::take(&mut template.declaration.items);
            sys.global_declaration.items.extend(items);
        }
    }
}

fn substitute_param_by_ref(template: &mut Template, param_name: &str, arg: &Ast) {
    let rewrite = |item: Ast| -> Ast {
        let mut f = |node: Ast, _acc: &mut Vec<()>| match node {
            Ast::Variable { name } if name == param_name => clone_expr(arg),
            other => other,
        };
        walk(item, &mut f, &mut Vec::new())
    };
    template.declaration.items = template.declaration.items.drain(..).map(&rewrite).collect();
    for loc in template.locations.values_mut() {
        loc.invariants = loc.invariants.drain(..).map(&rewrite).collect();
    }
    for edge in template.edges.values_mut() {
        edge.clock_guards = edge.clock_guards.drain(..).map(&rewrite).collect();
        edge.variable_guards = edge.variable_guards.drain(..).map(&rewrite).collect();
        edge.updates = edge.updates.drain(..).map(&rewrite).collect();
    }
}

fn clone_expr(ast: &Ast) -> Ast {
    ast.clone()
}

/// Every local variable/type/function name declared in a template's own
/// declaration block.
fn collect_local_names(template: &Template) -> Vec<String> {
    let mut names = Vec::new();
    for item in &template.declaration.items {
        match item {
            Ast::VariableDecls { var_data, .. } => {
                for v in var_data {
                    names.push(v.var_name.clone());
                }
            }
            Ast::Function { name, .. } => names.push(name.clone()),
            Ast::Type { type_id, .. } => {
                if let TypeId::CustomType(name) = type_id.as_ref() {
                    names.push(name.clone());
                }
            }
            _ => {}
        }
    }
    names
}

fn rename_in_template(template: &mut Template, old: &str, new: &str) {
    let rewrite_var = |item: Ast| -> Ast {
        let mut f = rename_var::<()>(old.to_string(), new.to_string());
        walk(item, &mut f, &mut Vec::new())
    };
    let rewrite_type = |item: Ast| -> Ast {
        let mut f = rename_type::<()>(old.to_string(), new.to_string());
        walk(item, &mut f, &mut Vec::new())
    };
    let rewrite_func = |item: Ast| -> Ast {
        let mut f = rename_func::<()>(old.to_string(), new.to_string());
        walk(item, &mut f, &mut Vec::new())
    };
    let rewrite_all =
        |item: Ast| -> Ast { rewrite_func(rewrite_type(rewrite_var(item))) };

    template.declaration.items =
        template.declaration.items.drain(..).map(&rewrite_all).collect();
    for loc in template.locations.values_mut() {
        loc.invariants = loc.invariants.drain(..).map(&rewrite_all).collect();
    }
    for edge in template.edges.values_mut() {
        edge.clock_guards = edge.clock_guards.drain(..).map(&rewrite_all).collect();
        edge.variable_guards = edge.variable_guards.drain(..).map(&rewrite_all).collect();
        edge.updates = edge.updates.drain(..).map(&rewrite_all).collect();
        for select in edge.selects.iter_mut() {
            select.range = rewrite_all(select.range.clone());
        }
        if let Some(sync) = edge.sync.as_mut() {
            if sync.channel == old {
                sync.channel = new.to_string();
            }
        }
        for reset in edge.resets.iter_mut() {
            if reset == old {
                *reset = new.to_string();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use ta_core::ast::{Ast, BinaryOp, TypeId, VariableId};

    use super::*;
    use crate::model::{Parameter, System};

    fn int_type() -> Ast {
        Ast::Type {
            prefixes: vec![],
            type_id: Box::new(TypeId::BoundedIntType {
                lower: Box::new(Ast::Integer { val: 0 }),
                upper: Box::new(Ast::Integer { val: 10 }),
            }),
        }
    }

    #[test]
    fn scalar_type_becomes_bounded_int() {
        let mut sys = System::new();
        sys.global_declaration.items.push(Ast::Type {
            prefixes: vec![],
            type_id: Box::new(TypeId::ScalarType { expr: Box::new(Ast::Integer { val: 4 }) }),
        });
        PreprocessedModelTransformer::scalars_to_bounded_ints(&mut sys);
        match &sys.global_declaration.items[0] {
            Ast::Type { type_id, .. } => match type_id.as_ref() {
                TypeId::BoundedIntType { lower, upper } => {
                    assert_eq!(**lower, Ast::Integer { val: 0 });
                    assert_eq!(
                        **upper,
                        Ast::BinaryExpr {
                            op: BinaryOp::Sub,
                            left: Box::new(Ast::Integer { val: 4 }),
                            right: Box::new(Ast::Integer { val: 1 }),
                        }
                    );
                }
                other => panic!("expected BoundedIntType, got {other:?}"),
            },
            other => panic!("expected Type, got {other:?}"),
        }
    }

    #[test]
    fn clone_per_instance_gives_each_instance_its_own_template() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            t.new_location("l0");
        }
        sys.system_declaration.add_instantiation("a", tid, vec![]);
        sys.system_declaration.add_instantiation("b", tid, vec![]);

        PreprocessedModelTransformer::clone_templates_per_instance(&mut sys).unwrap();

        assert_eq!(sys.templates.len(), 2);
        let ids: Vec<Id> =
            sys.system_declaration.instantiations.iter().map(|i| i.template_id).collect();
        assert_ne!(ids[0], ids[1]);
        assert_eq!(sys.get_template_by_id(ids[0]).unwrap().name, "a_Tmpl");
    }

    #[test]
    fn by_ref_parameter_is_substituted_and_removed() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            t.parameters.push(Parameter {
                is_ref: true,
                ty: int_type(),
                name: "x".to_string(),
                array_decl: vec![],
            });
            t.new_location("l0");
            let l0 = t.initial_location.unwrap();
            let l1 = t.new_location("l1");
            let e = t.new_edge(l0, l1);
            t.get_edge_mut(e).unwrap().variable_guards.push(Ast::Variable { name: "x".into() });
        }
        sys.system_declaration.add_instantiation(
            "p",
            tid,
            vec![Ast::Variable { name: "global_y".into() }],
        );
        PreprocessedModelTransformer::clone_templates_per_instance(&mut sys).unwrap();
        PreprocessedModelTransformer::resolve_parameters(&mut sys).unwrap();

        let new_tid = sys.system_declaration.instantiations[0].template_id;
        let t = sys.get_template_by_id(new_tid).unwrap();
        assert!(t.parameters.is_empty());
        let edge = t.edges.values().next().unwrap();
        assert_eq!(edge.variable_guards[0], Ast::Variable { name: "global_y".into() });
    }

    #[test]
    fn by_value_parameter_becomes_local_decl() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            t.parameters.push(Parameter {
                is_ref: false,
                ty: int_type(),
                name: "n".to_string(),
                array_decl: vec![],
            });
        }
        sys.system_declaration.add_instantiation("p", tid, vec![Ast::Integer { val: 3 }]);
        PreprocessedModelTransformer::clone_templates_per_instance(&mut sys).unwrap();
        PreprocessedModelTransformer::resolve_parameters(&mut sys).unwrap();

        let new_tid = sys.system_declaration.instantiations[0].template_id;
        let t = sys.get_template_by_id(new_tid).unwrap();
        assert!(t.parameters.is_empty());
        match &t.declaration.items[0] {
            Ast::VariableDecls { var_data, .. } => {
                assert_eq!(var_data[0].var_name, "n");
                assert_eq!(var_data[0].init_data, Some(Box::new(Ast::Integer { val: 3 })));
            }
            other => panic!("expected VariableDecls, got {other:?}"),
        }
    }

    #[test]
    fn local_to_global_rename_prefixes_with_template_name_and_moves_decl() {
        let mut sys = System::new();
        let tid = sys.new_template("P");
        {
            let t = sys.get_template_by_id_mut(tid).unwrap();
            t.declaration.items.push(Ast::VariableDecls {
                ty: Box::new(int_type()),
                var_data: vec![VariableId { var_name: "x".into(), array_decl: vec![], init_data: None }],
            });
            t.new_location("l0");
            let l0 = t.initial_location.unwrap();
            let l1 = t.new_location("l1");
            let e = t.new_edge(l0, l1);
            t.get_edge_mut(e).unwrap().variable_guards.push(Ast::Variable { name: "x".into() });
        }
        PreprocessedModelTransformer::rename_locals_to_global(&mut sys);

        let t = sys.get_template_by_id(tid).unwrap();
        assert!(t.declaration.items.is_empty());
        let edge = t.edges.values().next().unwrap();
        assert_eq!(edge.variable_guards[0], Ast::Variable { name: "P_x".into() });
        assert!(sys.global_declaration.items.iter().any(|item| matches!(
            item,
            Ast::VariableDecls { var_data, .. } if var_data[0].var_name == "P_x"
        )));
    }
}
