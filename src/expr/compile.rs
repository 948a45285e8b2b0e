//! Lowers a parsed [`Expr`] into a canonical term plus the reference sets the
//! static builder needs, and instantiates that term into a [`VerifyExpr`]
//! against a caller-supplied version map.
//!
//! Splitting "compile" from "instantiate" mirrors §4.1/§4.2: the expression
//! compiler runs once per predicate text and is agnostic to SSA version
//! numbers; the builder calls `instantiate` once per classification pass
//! (in practice once, since `B★` is frozen, but keeping the two decoupled
//! means a future incremental re-analysis does not have to re-parse).
//!
//! Compile errors map onto the two structural/per-item families like this:
//!
//! | [`CompileErrorKind`] | Family |
//! |---|---|
//! | `UnknownIdentifier` | structural `UnresolvedIdentifier` — invariant #1 |
//! | `UnsupportedExpression` | structural `UnsupportedExpression` |
//! | `ParseError` | per-item `ParseError` |
//! | `UnknownFunction` | per-item `UnknownFunction` |
//! | `TypeMismatch` | per-item `TypeMismatch` |

use std::collections::BTreeSet;
use std::fmt;

use super::ast::{BinOp, Expr, Lit};
use crate::ir::{VerifyExpr, VerifyOp};

#[derive(Debug, Clone, PartialEq)]
pub enum CompileErrorKind {
    ParseError,
    UnknownIdentifier,
    UnknownFunction,
    UnsupportedExpression,
    TypeMismatch,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CompileError {
    pub item_id: String,
    pub offset: usize,
    pub kind: CompileErrorKind,
    pub message: String,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?} at offset {}: {}", self.item_id, self.kind, self.offset, self.message)
    }
}

impl std::error::Error for CompileError {}

/// Canonical term: `Expr` with identifiers classified but not yet versioned.
#[derive(Debug, Clone, PartialEq)]
pub enum CTerm {
    Int(i64),
    Bool(bool),
    /// A bare local, keyed by name; the builder resolves this to whichever
    /// SSA version is live at this item's position.
    Local(String),
    /// `qid.outcome`.
    Outcome(String),
    /// The auxiliary `visited_<qid>` boolean standing in for `qid.outcome
    /// is not None`.
    Visited(String),
    Not(Box<CTerm>),
    Neg(Box<CTerm>),
    Binary(CBinOp, Box<CTerm>, Box<CTerm>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CBinOp {
    Add,
    Sub,
    Mul,
    FloorDiv,
    Mod,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

/// Result of compiling one predicate/expression text: the canonical term,
/// the set of `qid`s referenced (dependency candidates), the set of bare
/// locals referenced, and any divisor-nonzero guards that must be conjoined
/// onto the enclosing predicate.
pub struct Compiled {
    pub term: CTerm,
    pub outcome_refs: BTreeSet<String>,
    pub local_refs: BTreeSet<String>,
    pub guards: Vec<CTerm>,
}

/// Compile a parsed expression for item `item_id`. `known_qid` reports
/// whether an identifier names a `Question` item in the questionnaire (used
/// to validate `qid.outcome` references eagerly).
pub fn compile(
    expr: &Expr,
    item_id: &str,
    known_qid: &dyn Fn(&str) -> bool,
) -> Result<Compiled, CompileError> {
    let mut st = CompileState {
        item_id,
        known_qid,
        outcome_refs: BTreeSet::new(),
        local_refs: BTreeSet::new(),
        guards: Vec::new(),
    };
    let term = st.go(expr)?;
    Ok(Compiled {
        term,
        outcome_refs: st.outcome_refs,
        local_refs: st.local_refs,
        guards: st.guards,
    })
}

struct CompileState<'a> {
    item_id: &'a str,
    known_qid: &'a dyn Fn(&str) -> bool,
    outcome_refs: BTreeSet<String>,
    local_refs: BTreeSet<String>,
    guards: Vec<CTerm>,
}

impl<'a> CompileState<'a> {
    fn err(&self, offset: usize, kind: CompileErrorKind, message: impl Into<String>) -> CompileError {
        CompileError {
            item_id: self.item_id.to_string(),
            offset,
            kind,
            message: message.into(),
        }
    }

    fn go(&mut self, expr: &Expr) -> Result<CTerm, CompileError> {
        match expr {
            Expr::Lit(Lit::Int(n)) => Ok(CTerm::Int(*n)),
            Expr::Lit(Lit::Bool(b)) => Ok(CTerm::Bool(*b)),
            Expr::Lit(Lit::None) => Err(self.err(
                0,
                CompileErrorKind::TypeMismatch,
                "'None' may only appear as the right-hand side of 'is'/'is not'",
            )),

            Expr::Local { name, .. } => {
                self.local_refs.insert(name.clone());
                Ok(CTerm::Local(name.clone()))
            }

            Expr::Outcome { qid, offset } => {
                if !(self.known_qid)(qid) {
                    return Err(self.err(
                        *offset,
                        CompileErrorKind::UnknownIdentifier,
                        format!("'{}' does not name a Question item", qid),
                    ));
                }
                self.outcome_refs.insert(qid.clone());
                Ok(CTerm::Outcome(qid.clone()))
            }

            Expr::IsNone { target, negated, offset } => {
                let qid = match target.as_ref() {
                    Expr::Outcome { qid, .. } => qid.clone(),
                    _ => {
                        return Err(self.err(
                            *offset,
                            CompileErrorKind::TypeMismatch,
                            "'is None'/'is not None' only applies to 'qid.outcome'",
                        ))
                    }
                };
                if !(self.known_qid)(&qid) {
                    return Err(self.err(
                        *offset,
                        CompileErrorKind::UnknownIdentifier,
                        format!("'{}' does not name a Question item", qid),
                    ));
                }
                self.outcome_refs.insert(qid.clone());
                let visited = CTerm::Visited(qid);
                Ok(if *negated { visited } else { CTerm::Not(Box::new(visited)) })
            }

            Expr::Not(inner) => Ok(CTerm::Not(Box::new(self.go(inner)?))),
            Expr::Neg(inner) => Ok(CTerm::Neg(Box::new(self.go(inner)?))),

            Expr::Binary { op, lhs, rhs, offset } => {
                let l = self.go(lhs)?;
                let r = self.go(rhs)?;

                if *op == BinOp::Mul {
                    let is_lit = |t: &CTerm| matches!(t, CTerm::Int(_));
                    if !is_lit(&l) && !is_lit(&r) {
                        return Err(self.err(
                            *offset,
                            CompileErrorKind::UnsupportedExpression,
                            "multiplication is only supported when one operand is a literal (linear arithmetic only)",
                        ));
                    }
                }

                if matches!(op, BinOp::FloorDiv | BinOp::Mod) {
                    match &r {
                        CTerm::Int(0) => {
                            return Err(self.err(
                                *offset,
                                CompileErrorKind::UnsupportedExpression,
                                "division/modulus by a literal zero",
                            ));
                        }
                        CTerm::Int(_) => {}
                        _ => {
                            self.guards.push(CTerm::Binary(
                                CBinOp::Neq,
                                Box::new(r.clone()),
                                Box::new(CTerm::Int(0)),
                            ));
                        }
                    }
                }

                let cop = match op {
                    BinOp::Add => CBinOp::Add,
                    BinOp::Sub => CBinOp::Sub,
                    BinOp::Mul => CBinOp::Mul,
                    BinOp::FloorDiv => CBinOp::FloorDiv,
                    BinOp::Mod => CBinOp::Mod,
                    BinOp::Eq => CBinOp::Eq,
                    BinOp::Neq => CBinOp::Neq,
                    BinOp::Lt => CBinOp::Lt,
                    BinOp::Le => CBinOp::Le,
                    BinOp::Gt => CBinOp::Gt,
                    BinOp::Ge => CBinOp::Ge,
                    BinOp::And => CBinOp::And,
                    BinOp::Or => CBinOp::Or,
                };
                Ok(CTerm::Binary(cop, Box::new(l), Box::new(r)))
            }

            Expr::Call { name, offset, .. } => Err(self.err(
                *offset,
                CompileErrorKind::UnknownFunction,
                format!("'{}' is not a recognized function", name),
            )),
        }
    }
}

/// Substitute every `Local`/`Outcome`/`Visited` leaf in `term` for the
/// concrete SSA variable name the builder has assigned it, producing the
/// final term the solver encodes.
///
/// `local_version`/`outcome_version`/`visited_var` each return the variable
/// name to emit; a missing mapping is a builder bug (every reference was
/// already recorded during `compile`), so this panics rather than erroring.
pub fn instantiate(
    term: &CTerm,
    local_version: &dyn Fn(&str) -> String,
    outcome_version: &dyn Fn(&str) -> String,
    visited_var: &dyn Fn(&str) -> String,
) -> VerifyExpr {
    match term {
        CTerm::Int(n) => VerifyExpr::int(*n),
        CTerm::Bool(b) => VerifyExpr::bool(*b),
        CTerm::Local(name) => VerifyExpr::var(local_version(name)),
        CTerm::Outcome(qid) => VerifyExpr::var(outcome_version(qid)),
        CTerm::Visited(qid) => VerifyExpr::var(visited_var(qid)),
        CTerm::Not(inner) => VerifyExpr::not(instantiate(inner, local_version, outcome_version, visited_var)),
        CTerm::Neg(inner) => VerifyExpr::binary(
            VerifyOp::Sub,
            VerifyExpr::int(0),
            instantiate(inner, local_version, outcome_version, visited_var),
        ),
        CTerm::Binary(op, l, r) => {
            let lv = instantiate(l, local_version, outcome_version, visited_var);
            let rv = instantiate(r, local_version, outcome_version, visited_var);
            let vop = match op {
                CBinOp::Add => VerifyOp::Add,
                CBinOp::Sub => VerifyOp::Sub,
                CBinOp::Mul => VerifyOp::Mul,
                CBinOp::FloorDiv => VerifyOp::Div,
                CBinOp::Mod => VerifyOp::Mod,
                CBinOp::Eq => VerifyOp::Eq,
                CBinOp::Neq => VerifyOp::Neq,
                CBinOp::Lt => VerifyOp::Lt,
                CBinOp::Le => VerifyOp::Lte,
                CBinOp::Gt => VerifyOp::Gt,
                CBinOp::Ge => VerifyOp::Gte,
                CBinOp::And => VerifyOp::And,
                CBinOp::Or => VerifyOp::Or,
            };
            VerifyExpr::binary(vop, lv, rv)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{lexer::lex, parser::parse};

    fn compile_str(s: &str, item_id: &str, known: &dyn Fn(&str) -> bool) -> Result<Compiled, CompileError> {
        let tokens = lex(s).unwrap();
        let expr = parse(&tokens).unwrap();
        compile(&expr, item_id, known)
    }

    #[test]
    fn records_outcome_reference() {
        let known = |q: &str| q == "q1";
        let c = compile_str("q1.outcome > 5", "q2", &known).unwrap();
        assert!(c.outcome_refs.contains("q1"));
    }

    #[test]
    fn rejects_unknown_outcome() {
        let known = |_: &str| false;
        let err = compile_str("q1.outcome > 5", "q2", &known).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownIdentifier);
    }

    #[test]
    fn rejects_nonlinear_multiplication() {
        let known = |_: &str| true;
        let err = compile_str("q1.outcome * q2.outcome > 0", "q3", &known).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnsupportedExpression);
    }

    #[test]
    fn allows_literal_multiplication() {
        let known = |_: &str| true;
        let c = compile_str("q1.outcome * 2 > 0", "q3", &known).unwrap();
        assert!(c.guards.is_empty());
    }

    #[test]
    fn rejects_literal_zero_division() {
        let known = |_: &str| true;
        let err = compile_str("q1.outcome // 0 > 0", "q3", &known).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnsupportedExpression);
    }

    #[test]
    fn guards_variable_divisor() {
        let known = |_: &str| true;
        let c = compile_str("q1.outcome // q2.outcome > 0", "q3", &known).unwrap();
        assert_eq!(c.guards.len(), 1);
    }

    #[test]
    fn unknown_function_errors() {
        let known = |_: &str| true;
        let err = compile_str("frob(q1.outcome)", "q3", &known).unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnknownFunction);
    }

    #[test]
    fn is_not_none_becomes_visited() {
        let known = |_: &str| true;
        let c = compile_str("q1.outcome is not None", "q3", &known).unwrap();
        assert!(matches!(c.term, CTerm::Visited(ref q) if q == "q1"));
    }

    #[test]
    fn is_none_becomes_not_visited() {
        let known = |_: &str| true;
        let c = compile_str("q1.outcome is None", "q3", &known).unwrap();
        assert!(matches!(c.term, CTerm::Not(ref inner) if matches!(**inner, CTerm::Visited(ref q) if q == "q1")));
    }
}
