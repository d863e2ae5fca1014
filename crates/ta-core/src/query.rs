//! Query AST: TCTL/SMC property expressions.
//!
//! `spec.md` §3 lists these constructors alongside the expression AST
//! without requiring a specific Rust shape for them; kept as their own enum
//! (rather than folded into [`crate::Ast`]) since every builder in
//! `ta-transform` only ever emits the single reachability form `E<> <loc>`
//! (`Query::PropExists`) — the richer set exists so the query language isn't
//! hard-wired to that one shape.

use serde::{Deserialize, Serialize};

use crate::Ast;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Query {
    /// `A[] expr` — invariantly.
    PropAll { expr: Box<Ast> },
    /// `E<> expr` — reachability.
    PropExists { expr: Box<Ast> },
    /// `expr1 --> expr2` — leads-to.
    PropLeadsTo { left: Box<Ast>, right: Box<Ast> },
    /// `A<> expr` — inevitably.
    PropGlobally { expr: Box<Ast> },
    /// `E[] expr` — potentially always.
    PropFinally { expr: Box<Ast> },
    /// `expr1 U expr2` — until.
    PropUntil { left: Box<Ast>, right: Box<Ast> },
    /// `Pr[bound](expr)` — probability estimation.
    ProbEstimate { bound: Box<Ast>, expr: Box<Ast> },
    /// `Pr[bound](expr) >= p` style hypothesis test.
    HypothesisTest { bound: Box<Ast>, expr: Box<Ast>, p: f64 },
    /// `Pr[..](e1) <op> Pr[..](e2)`.
    ProbCompare { left: Box<Query>, right: Box<Query> },
    /// `E[bound; n](max: expr)` — value estimation.
    ValueEstimate { bound: Box<Ast>, runs: u32, expr: Box<Ast> },
    /// `simulate [bound] { expr, ... }`.
    Sim { bound: Box<Ast>, exprs: Vec<Ast> },
    /// `sup{cond}: expr`.
    Sup { cond: Option<Box<Ast>>, expr: Box<Ast> },
    /// `inf{cond}: expr`.
    Inf { cond: Option<Box<Ast>>, expr: Box<Ast> },
}

impl Query {
    /// Build the single reachability form every builder in `ta-transform`
    /// emits: `E<> <template>.<location>`.
    pub fn reachability(location_path: impl Into<String>) -> Query {
        Query::PropExists {
            expr: Box::new(Ast::Variable { name: location_path.into() }),
        }
    }
}
