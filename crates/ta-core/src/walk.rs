//! Generic AST rewriting: post-order walk with an accumulator, rotation
//! primitives for associativity/precedence normalization, name-substitution
//! combinators, and variable-value replacement.
//!
//! Grounded in `uppaal_c_language`'s `apply_func_to_ast`/`apply_funcs_to_ast`
//! (post-order recursion with an accumulator threaded through) and
//! `adapt_variable_value_in_declaration`/`atomic_value_to_ast`/
//! `value_data_to_ast`. The dynamic dict traversal of that source becomes an
//! explicit per-variant match here — there is no reflection to fall back
//! on, and `walk` is total by construction (no variant is left unhandled).

use crate::ast::{Ast, TypeId, VariableId};

/// A rewrite function usable with [`walk`]/[`walk_many`]: receives the node
/// (already rewritten in its children) and the shared accumulator, and
/// returns the (possibly replaced) node.
pub type RewriteFn<'a, A> = dyn FnMut(Ast, &mut Vec<A>) -> Ast + 'a;

/// Post-order recursion over `ast`. Descends into every child first
/// (list fields element-wise), then calls `f` on the reconstructed node.
/// `acc` is a shared ordered list `f` may append to.
pub fn walk<A>(ast: Ast, f: &mut RewriteFn<'_, A>, acc: &mut Vec<A>) -> Ast {
    let descended = descend(ast, f, acc);
    f(descended, acc)
}

/// Applies every function in `fs`, in order, at each node — the composed
/// single-pass equivalent of calling [`walk`] once per function.
pub fn walk_many<A>(ast: Ast, fs: &mut [&mut RewriteFn<'_, A>], acc: &mut Vec<A>) -> Ast {
    let mut combined = move |node: Ast, acc: &mut Vec<A>| {
        let mut node = node;
        for f in fs.iter_mut() {
            node = f(node, acc);
        }
        node
    };
    walk(ast, &mut combined, acc)
}

fn box_walk<A>(b: Box<Ast>, f: &mut RewriteFn<'_, A>, acc: &mut Vec<A>) -> Box<Ast> {
    Box::new(walk(*b, f, acc))
}

fn opt_box_walk<A>(
    b: Option<Box<Ast>>,
    f: &mut RewriteFn<'_, A>,
    acc: &mut Vec<A>,
) -> Option<Box<Ast>> {
    b.map(|b| box_walk(b, f, acc))
}

fn vec_walk<A>(v: Vec<Ast>, f: &mut RewriteFn<'_, A>, acc: &mut Vec<A>) -> Vec<Ast> {
    v.into_iter().map(|n| walk(n, f, acc)).collect()
}

/// Rewrites a [`VariableId`]'s children, then runs `var_name` itself through
/// `f` as a synthetic `Ast::Variable` node so a rename combinator sees the
/// declaration site too, not just every later reference to it.
fn var_id_walk<A>(v: VariableId, f: &mut RewriteFn<'_, A>, acc: &mut Vec<A>) -> VariableId {
    let array_decl = vec_walk(v.array_decl, f, acc);
    let init_data = opt_box_walk(v.init_data, f, acc);
    let var_name = match walk(Ast::Variable { name: v.var_name }, f, acc) {
        Ast::Variable { name } => name,
        other => panic!("rewrite function must preserve the Variable shape of a VariableId's name, got {other:?}"),
    };
    VariableId { var_name, array_decl, init_data }
}

fn type_id_walk<A>(t: Box<TypeId>, f: &mut RewriteFn<'_, A>, acc: &mut Vec<A>) -> Box<TypeId> {
    Box::new(match *t {
        TypeId::CustomType(name) => TypeId::CustomType(name),
        TypeId::BoundedIntType { lower, upper } => TypeId::BoundedIntType {
            lower: box_walk(lower, f, acc),
            upper: box_walk(upper, f, acc),
        },
        TypeId::ScalarType { expr } => TypeId::ScalarType { expr: box_walk(expr, f, acc) },
        TypeId::StructType { fields } => TypeId::StructType { fields: vec_walk(fields, f, acc) },
    })
}

/// Descends into every child of `ast` without invoking `f` on `ast` itself
/// (that happens in [`walk`], after this returns).
fn descend<A>(ast: Ast, f: &mut RewriteFn<'_, A>, acc: &mut Vec<A>) -> Ast {
    match ast {
        Ast::Integer { .. } | Ast::Double { .. } | Ast::Boolean { .. } | Ast::Variable { .. } => {
            ast
        }
        Ast::EmptyStatement => ast,
        Ast::UnaryExpr { op, expr } => Ast::UnaryExpr { op, expr: box_walk(expr, f, acc) },
        Ast::BinaryExpr { op, left, right } => Ast::BinaryExpr {
            op,
            left: box_walk(left, f, acc),
            right: box_walk(right, f, acc),
        },
        Ast::TernaryExpr { left, middle, right } => Ast::TernaryExpr {
            left: box_walk(left, f, acc),
            middle: box_walk(middle, f, acc),
            right: box_walk(right, f, acc),
        },
        Ast::AssignExpr { op, left, right } => Ast::AssignExpr {
            op,
            left: box_walk(left, f, acc),
            right: box_walk(right, f, acc),
        },
        Ast::IncrDecrAssignExpr { op, expr } => {
            Ast::IncrDecrAssignExpr { op, expr: box_walk(expr, f, acc) }
        }
        Ast::FuncCallExpr { func_name, args } => {
            Ast::FuncCallExpr { func_name, args: vec_walk(args, f, acc) }
        }
        Ast::VariableDecls { ty, var_data } => Ast::VariableDecls {
            ty: box_walk(ty, f, acc),
            var_data: var_data.into_iter().map(|v| var_id_walk(v, f, acc)).collect(),
        },
        Ast::Type { prefixes, type_id } => {
            Ast::Type { prefixes, type_id: type_id_walk(type_id, f, acc) }
        }
        Ast::Function { ty, name, params, body } => Ast::Function {
            ty: box_walk(ty, f, acc),
            name,
            params: vec_walk(params, f, acc),
            body: box_walk(body, f, acc),
        },
        Ast::Parameter { is_ref, ty, var_data } => Ast::Parameter {
            is_ref,
            ty: box_walk(ty, f, acc),
            var_data: Box::new(var_id_walk(*var_data, f, acc)),
        },
        Ast::StatementBlock { decls, stmts } => Ast::StatementBlock {
            decls: vec_walk(decls, f, acc),
            stmts: vec_walk(stmts, f, acc),
        },
        Ast::ForLoop { init, cond, step, body } => Ast::ForLoop {
            init: box_walk(init, f, acc),
            cond: box_walk(cond, f, acc),
            step: box_walk(step, f, acc),
            body: box_walk(body, f, acc),
        },
        Ast::Iteration { var_name, ty, body } => Ast::Iteration {
            var_name,
            ty: box_walk(ty, f, acc),
            body: box_walk(body, f, acc),
        },
        Ast::WhileLoop { cond, body } => {
            Ast::WhileLoop { cond: box_walk(cond, f, acc), body: box_walk(body, f, acc) }
        }
        Ast::DoWhileLoop { body, cond } => {
            Ast::DoWhileLoop { body: box_walk(body, f, acc), cond: box_walk(cond, f, acc) }
        }
        Ast::IfStatement { cond, then_branch, else_branch } => Ast::IfStatement {
            cond: box_walk(cond, f, acc),
            then_branch: box_walk(then_branch, f, acc),
            else_branch: opt_box_walk(else_branch, f, acc),
        },
        Ast::ReturnStatement { expr } => {
            Ast::ReturnStatement { expr: opt_box_walk(expr, f, acc) }
        }
        Ast::ExprStatement { expr } => Ast::ExprStatement { expr: box_walk(expr, f, acc) },
        Ast::Instantiation { instance_name, params, template_name, args } => Ast::Instantiation {
            instance_name,
            params: vec_walk(params, f, acc),
            template_name,
            args: vec_walk(args, f, acc),
        },
        Ast::System { process_names } => Ast::System { process_names },
        Ast::InitialiserArray { vals } => {
            Ast::InitialiserArray { vals: vec_walk(vals, f, acc) }
        }
    }
}

// ============================================================================
// Rotations
// ============================================================================

/// `rotate_left(n)`: for `n = (L op1 (M op2 R))`, produces `((L op1 M) op2 R)`.
/// For `Unary(op, Binary(L, B, R))`, pulls the binary out and wraps the left
/// subtree in the unary: `Binary(Unary(op, L), B, R)`.
///
/// Purely structural — no precedence/associativity check. Callers must
/// verify operator compatibility themselves (see
/// [`rotate_left_while_assoc_prec`] for the checked variant).
pub fn rotate_left(n: Ast) -> Ast {
    match n {
        Ast::BinaryExpr { op: op1, left, right } => match *right {
            Ast::BinaryExpr { op: op2, left: m, right: r } => Ast::BinaryExpr {
                op: op2,
                left: Box::new(Ast::BinaryExpr { op: op1, left, right: m }),
                right: r,
            },
            other => Ast::BinaryExpr { op: op1, left, right: Box::new(other) },
        },
        Ast::UnaryExpr { op, expr } => match *expr {
            Ast::BinaryExpr { op: b, left, right } => Ast::BinaryExpr {
                op: b,
                left: Box::new(Ast::UnaryExpr { op, expr: left }),
                right,
            },
            other => Ast::UnaryExpr { op, expr: Box::new(other) },
        },
        other => other,
    }
}

/// Inverse of [`rotate_left`].
pub fn rotate_right(n: Ast) -> Ast {
    match n {
        Ast::BinaryExpr { op: op2, left, right } => match *left {
            Ast::BinaryExpr { op: op1, left: l, right: m } => Ast::BinaryExpr {
                op: op1,
                left: l,
                right: Box::new(Ast::BinaryExpr { op: op2, left: m, right }),
            },
            other => Ast::BinaryExpr { op: op2, left: Box::new(other), right },
        },
        other => other,
    }
}

/// Repeatedly rotates left while the root and its right child share the
/// same precedence/associativity group, or rotating would bring a
/// higher-precedence operator upward. Terminates because every rotation
/// strictly decreases right-spine depth.
pub fn rotate_left_while_assoc_prec(n: Ast) -> Ast {
    let mut current = n;
    loop {
        let should_rotate = match &current {
            Ast::BinaryExpr { op: op1, right, .. } => match right.as_ref() {
                Ast::BinaryExpr { op: op2, .. } => {
                    op1.same_group(*op2) || op2.precedence() > op1.precedence()
                }
                _ => false,
            },
            _ => false,
        };
        if !should_rotate {
            return current;
        }
        current = rotate_left(current);
    }
}

// ============================================================================
// Name-substitution combinators
// ============================================================================

/// Returns a rewrite function suitable for [`walk`] that renames every
/// `Variable{name=old}` reference to `new`.
pub fn rename_var<A>(old: String, new: String) -> impl FnMut(Ast, &mut Vec<A>) -> Ast {
    move |node, _acc| match node {
        Ast::Variable { name } if name == old => Ast::Variable { name: new.clone() },
        other => other,
    }
}

/// Returns a rewrite function that renames every `CustomType(old)` to `new`.
pub fn rename_type<A>(old: String, new: String) -> impl FnMut(Ast, &mut Vec<A>) -> Ast {
    move |node, _acc| match node {
        Ast::Type { prefixes, type_id } => {
            let type_id = match *type_id {
                TypeId::CustomType(name) if name == old => {
                    Box::new(TypeId::CustomType(new.clone()))
                }
                other => Box::new(other),
            };
            Ast::Type { prefixes, type_id }
        }
        other => other,
    }
}

/// Returns a rewrite function that renames every `FuncCallExpr`/`Function`
/// reference to `old` to `new`. Per `DESIGN.md`'s Open Question decision,
/// `Function` uses a single `name` field (no `varName`/`name` split).
pub fn rename_func<A>(old: String, new: String) -> impl FnMut(Ast, &mut Vec<A>) -> Ast {
    move |node, _acc| match node {
        Ast::FuncCallExpr { func_name, args } if func_name == old => {
            Ast::FuncCallExpr { func_name: new.clone(), args }
        }
        Ast::Function { ty, name, params, body } if name == old => {
            Ast::Function { ty, name: new.clone(), params, body }
        }
        other => other,
    }
}

// ============================================================================
// Variable value replacement
// ============================================================================

/// An atomic or nested value convertible to an [`Ast`] literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    List(Vec<Value>),
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum ValueToAstError {
    #[error("unsupported atomic value type")]
    UnsupportedAtom,
}

/// `value→AST`: bool→Boolean, int→Integer, float→Double, list→InitialiserArray
/// (recursively). The only rewriter in this module that can fail.
pub fn value_to_ast(value: &Value) -> Result<Ast, ValueToAstError> {
    match value {
        Value::Bool(val) => Ok(Ast::Boolean { val: *val }),
        Value::Int(val) => Ok(Ast::Integer { val: *val }),
        Value::Float(val) => Ok(Ast::Double { val: *val }),
        Value::List(vals) => {
            let vals = vals.iter().map(value_to_ast).collect::<Result<Vec<_>, _>>()?;
            Ok(Ast::InitialiserArray { vals })
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum VarNameError {
    #[error("variable name {0:?} does not match `base(\\[[0-9]+\\])*`")]
    InvalidShape(String),
}

/// Parsed shape of a variable reference like `a[3][12]`: a base identifier
/// plus zero or more bracketed integer indices.
///
/// The source this was distilled from captured indices with a regex whose
/// digit group (`(\d)`) only kept the *last* digit of a multi-digit index —
/// `a[12]` parsed as index `2`. That is fixed here: indices are parsed with
/// an ordinary integer scan, so multi-digit indices round-trip correctly.
/// See `DESIGN.md`'s Open Question decision.
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub base_name: String,
    pub indices: Vec<usize>,
}

pub fn parse_var_ref(var_name: &str) -> Result<VarRef, VarNameError> {
    let bytes = var_name.as_bytes();
    let base_end = bytes.iter().position(|&b| b == b'[').unwrap_or(bytes.len());
    let base_name = var_name[..base_end].to_string();
    if base_name.is_empty() || !base_name.chars().next().unwrap().is_alphabetic() {
        return Err(VarNameError::InvalidShape(var_name.to_string()));
    }

    let mut indices = Vec::new();
    let mut rest = &var_name[base_end..];
    while !rest.is_empty() {
        let Some(close) = rest.find(']') else {
            return Err(VarNameError::InvalidShape(var_name.to_string()));
        };
        if !rest.starts_with('[') {
            return Err(VarNameError::InvalidShape(var_name.to_string()));
        }
        let digits = &rest[1..close];
        let idx: usize =
            digits.parse().map_err(|_| VarNameError::InvalidShape(var_name.to_string()))?;
        indices.push(idx);
        rest = &rest[close + 1..];
    }

    Ok(VarRef { base_name, indices })
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AdaptVariableError {
    #[error(transparent)]
    InvalidShape(#[from] VarNameError),
    #[error(transparent)]
    Value(#[from] ValueToAstError),
    #[error("variable {0:?} not found")]
    NotFound(String),
}

/// `adapt_variable_value_in_declaration`: parse `var_name` as
/// `base(\[idx\])*`; find every `VariableDecls` whose `varData` includes
/// `base`; if no indices, overwrite `init_data` with the AST of `value`;
/// otherwise navigate `init_data`'s nested `InitialiserArray::vals` along
/// all but the last index, and overwrite that position.
pub fn adapt_variable_value_in_declaration(
    ast: Ast,
    var_name: &str,
    value: &Value,
) -> Result<Ast, AdaptVariableError> {
    let var_ref = parse_var_ref(var_name)?;
    let new_val = value_to_ast(value)?;
    let mut found = false;

    let mut f = |node: Ast, _acc: &mut Vec<()>| match node {
        Ast::VariableDecls { ty, var_data } => {
            let var_data = var_data
                .into_iter()
                .map(|v| {
                    if v.var_name == var_ref.base_name {
                        found = true;
                        set_init_data(v, &var_ref.indices, new_val.clone())
                    } else {
                        v
                    }
                })
                .collect();
            Ast::VariableDecls { ty, var_data }
        }
        other => other,
    };

    let mut acc: Vec<()> = Vec::new();
    let result = walk(ast, &mut f, &mut acc);
    if !found {
        return Err(AdaptVariableError::NotFound(var_name.to_string()));
    }
    Ok(result)
}

fn set_init_data(mut v: VariableId, indices: &[usize], new_val: Ast) -> VariableId {
    if indices.is_empty() {
        v.init_data = Some(Box::new(new_val));
        return v;
    }

    let Some(init) = v.init_data.take() else {
        v.init_data = Some(Box::new(new_val));
        return v;
    };

    v.init_data = Some(Box::new(set_nested(*init, indices, new_val)));
    v
}

/// Navigates `InitialiserArray::vals` along all but the last index in
/// `indices`, then overwrites the position named by the last index.
fn set_nested(init: Ast, indices: &[usize], new_val: Ast) -> Ast {
    let Ast::InitialiserArray { mut vals } = init else {
        return init;
    };
    if indices.len() == 1 {
        let idx = indices[0];
        if idx < vals.len() {
            vals[idx] = new_val;
        }
        return Ast::InitialiserArray { vals };
    }
    let idx = indices[0];
    if idx < vals.len() {
        vals[idx] = set_nested(vals[idx].clone(), &indices[1..], new_val);
    }
    Ast::InitialiserArray { vals }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::BinaryOp;

    fn int(n: i64) -> Ast {
        Ast::Integer { val: n }
    }

    #[test]
    fn rotate_left_basic() {
        // (L + (M * R)) --rotate_left--> ((L + M) * R)
        let n = Ast::BinaryExpr {
            op: BinaryOp::Add,
            left: Box::new(int(1)),
            right: Box::new(Ast::BinaryExpr {
                op: BinaryOp::Mul,
                left: Box::new(int(2)),
                right: Box::new(int(3)),
            }),
        };
        let rotated = rotate_left(n);
        let expected = Ast::BinaryExpr {
            op: BinaryOp::Mul,
            left: Box::new(Ast::BinaryExpr {
                op: BinaryOp::Add,
                left: Box::new(int(1)),
                right: Box::new(int(2)),
            }),
            right: Box::new(int(3)),
        };
        assert_eq!(rotated, expected);
    }

    #[test]
    fn rotate_right_inverts_rotate_left() {
        let n = Ast::BinaryExpr {
            op: BinaryOp::Add,
            left: Box::new(int(1)),
            right: Box::new(Ast::BinaryExpr {
                op: BinaryOp::Add,
                left: Box::new(int(2)),
                right: Box::new(int(3)),
            }),
        };
        let roundtrip = rotate_right(rotate_left(n.clone()));
        assert_eq!(roundtrip, n);
    }

    #[test]
    fn rotate_left_lifts_unary_over_binary() {
        let n = Ast::UnaryExpr {
            op: crate::ast::UnaryOp::Minus,
            expr: Box::new(Ast::BinaryExpr {
                op: BinaryOp::Add,
                left: Box::new(int(1)),
                right: Box::new(int(2)),
            }),
        };
        let rotated = rotate_left(n);
        let expected = Ast::BinaryExpr {
            op: BinaryOp::Add,
            left: Box::new(Ast::UnaryExpr {
                op: crate::ast::UnaryOp::Minus,
                expr: Box::new(int(1)),
            }),
            right: Box::new(int(2)),
        };
        assert_eq!(rotated, expected);
    }

    #[test]
    fn rotate_left_while_assoc_prec_is_idempotent() {
        let n = Ast::BinaryExpr {
            op: BinaryOp::Add,
            left: Box::new(int(1)),
            right: Box::new(Ast::BinaryExpr {
                op: BinaryOp::Add,
                left: Box::new(int(2)),
                right: Box::new(Ast::BinaryExpr {
                    op: BinaryOp::Add,
                    left: Box::new(int(3)),
                    right: Box::new(int(4)),
                }),
            }),
        };
        let once = rotate_left_while_assoc_prec(n);
        let twice = rotate_left_while_assoc_prec(once.clone());
        assert_eq!(once, twice);
    }

    #[test]
    fn rename_var_replaces_all_occurrences() {
        let ast = Ast::BinaryExpr {
            op: BinaryOp::Add,
            left: Box::new(Ast::Variable { name: "x".into() }),
            right: Box::new(Ast::Variable { name: "x".into() }),
        };
        let mut acc: Vec<()> = Vec::new();
        let mut f = rename_var("x".to_string(), "y".to_string());
        let renamed = walk(ast, &mut f, &mut acc);
        assert_eq!(
            renamed,
            Ast::BinaryExpr {
                op: BinaryOp::Add,
                left: Box::new(Ast::Variable { name: "y".into() }),
                right: Box::new(Ast::Variable { name: "y".into() }),
            }
        );
    }

    #[test]
    fn value_to_ast_rejects_nothing_else() {
        assert_eq!(value_to_ast(&Value::Bool(true)).unwrap(), Ast::Boolean { val: true });
        assert_eq!(value_to_ast(&Value::Int(5)).unwrap(), Ast::Integer { val: 5 });
        assert_eq!(
            value_to_ast(&Value::List(vec![Value::Int(1), Value::Int(2)])).unwrap(),
            Ast::InitialiserArray { vals: vec![int(1), int(2)] }
        );
    }

    #[test]
    fn parse_var_ref_handles_multidigit_indices() {
        let r = parse_var_ref("a[12][3]").unwrap();
        assert_eq!(r.base_name, "a");
        assert_eq!(r.indices, vec![12, 3]);
    }

    #[test]
    fn adapt_variable_value_overwrites_scalar_init() {
        let decl = Ast::VariableDecls {
            ty: Box::new(Ast::Type {
                prefixes: vec![],
                type_id: Box::new(TypeId::CustomType("int".into())),
            }),
            var_data: vec![VariableId {
                var_name: "a".into(),
                array_decl: vec![],
                init_data: Some(Box::new(int(1))),
            }],
        };
        let updated =
            adapt_variable_value_in_declaration(decl, "a", &Value::Int(5)).unwrap();
        let Ast::VariableDecls { var_data, .. } = updated else { panic!("expected VariableDecls") };
        assert_eq!(var_data[0].init_data, Some(Box::new(int(5))));
    }

    #[test]
    fn adapt_variable_value_not_found_errors() {
        let decl = Ast::VariableDecls {
            ty: Box::new(Ast::Type {
                prefixes: vec![],
                type_id: Box::new(TypeId::CustomType("int".into())),
            }),
            var_data: vec![],
        };
        let err = adapt_variable_value_in_declaration(decl, "a", &Value::Int(5)).unwrap_err();
        assert!(matches!(err, AdaptVariableError::NotFound(_)));
    }
}
