//! Z3 solver wrapper for questionnaire analysis verification.
//!
//! [`Encoder`] lowers [`VerifyExpr`] into Z3 ASTs; [`AnalysisContext`] owns
//! the long-lived [`Context`] the questionnaire pipeline shares across its
//! three classification levels, and [`query_scoped`] centralizes the
//! push/assert/check/pop shape those levels all use.

use rustc_hash::FxHashMap as RustcHashMap;
use std::collections::BTreeMap;

use z3::ast::{Ast, Bool, Dynamic, Int};
use z3::{Config, Context, SatResult, Solver};

use crate::ir::{VerifyExpr, VerifyOp, VerifyType};

/// Encoder that converts VerifyExpr to Z3 AST.
///
/// Exposed at `pub(crate)` visibility so `builder`/`classify`/`global`/`path`
/// can all encode against the one long-lived [`Context`] an
/// [`AnalysisContext`] owns. The static builder freezes `B★` once and the
/// pipeline stages share it via push/pop (see §4.2/§5 of SPEC_FULL.md).
pub(crate) struct Encoder<'ctx> {
    ctx: &'ctx Context,
    vars: &'ctx RustcHashMap<String, VerifyType>,
}

impl<'ctx> Encoder<'ctx> {
    pub(crate) fn new(ctx: &'ctx Context, vars: &'ctx RustcHashMap<String, VerifyType>) -> Self {
        Self { ctx, vars }
    }

    pub(crate) fn encode(&self, expr: &VerifyExpr) -> Dynamic<'ctx> {
        match expr {
            VerifyExpr::Int(n) => Dynamic::from_ast(&Int::from_i64(self.ctx, *n)),
            VerifyExpr::Bool(b) => Dynamic::from_ast(&Bool::from_bool(self.ctx, *b)),

            VerifyExpr::Var(name) => {
                let ty = self.vars.get(name).copied().unwrap_or(VerifyType::Int);
                match ty {
                    VerifyType::Int => Dynamic::from_ast(&Int::new_const(self.ctx, name.as_str())),
                    VerifyType::Bool => Dynamic::from_ast(&Bool::new_const(self.ctx, name.as_str())),
                }
            }

            VerifyExpr::Binary { op, left, right } => {
                let l = self.encode(left);
                let r = self.encode(right);
                self.encode_binary(op, l, r)
            }

            VerifyExpr::Not(inner) => {
                let i = self.encode(inner);
                if let Some(b) = i.as_bool() {
                    Dynamic::from_ast(&b.not())
                } else {
                    i
                }
            }
        }
    }

    fn encode_binary(&self, op: &VerifyOp, l: Dynamic<'ctx>, r: Dynamic<'ctx>) -> Dynamic<'ctx> {
        match op {
            // Arithmetic
            VerifyOp::Add => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&(li + ri))
                } else {
                    l
                }
            }
            VerifyOp::Sub => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&(li - ri))
                } else {
                    l
                }
            }
            VerifyOp::Mul => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&(li * ri))
                } else {
                    l
                }
            }
            VerifyOp::Div => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&(li / ri))
                } else {
                    l
                }
            }
            VerifyOp::Mod => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&li.modulo(&ri))
                } else {
                    l
                }
            }

            // Comparison
            VerifyOp::Gt => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&li.gt(&ri))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, false))
                }
            }
            VerifyOp::Lt => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&li.lt(&ri))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, false))
                }
            }
            VerifyOp::Gte => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&li.ge(&ri))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, false))
                }
            }
            VerifyOp::Lte => {
                if let (Some(li), Some(ri)) = (l.as_int(), r.as_int()) {
                    Dynamic::from_ast(&li.le(&ri))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, false))
                }
            }

            // Equality
            VerifyOp::Eq => Dynamic::from_ast(&l._eq(&r)),
            VerifyOp::Neq => Dynamic::from_ast(&l._eq(&r).not()),

            // Logic
            VerifyOp::And => {
                if let (Some(lb), Some(rb)) = (l.as_bool(), r.as_bool()) {
                    Dynamic::from_ast(&Bool::and(self.ctx, &[&lb, &rb]))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, false))
                }
            }
            VerifyOp::Or => {
                if let (Some(lb), Some(rb)) = (l.as_bool(), r.as_bool()) {
                    Dynamic::from_ast(&Bool::or(self.ctx, &[&lb, &rb]))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, false))
                }
            }
            VerifyOp::Implies => {
                if let (Some(lb), Some(rb)) = (l.as_bool(), r.as_bool()) {
                    Dynamic::from_ast(&lb.implies(&rb))
                } else {
                    Dynamic::from_ast(&Bool::from_bool(self.ctx, true))
                }
            }
        }
    }
}

// ============================================================
// Pipeline Analysis Context
// ============================================================

/// A concrete assignment to one outcome variable, ready for JSON serialization.
#[derive(Debug, Clone, PartialEq)]
pub enum WitnessValue {
    Int(i64),
    Bool(bool),
}

/// A SAT witness: the subset of variables a model assigns, keyed by name.
///
/// Kept as a `BTreeMap` so two runs over the same formula produce witnesses
/// in the same iteration order (§5's bit-for-bit determinism guarantee).
pub type Witness = BTreeMap<String, WitnessValue>;

/// Owns one long-lived Z3 [`Context`] for a single analysis pass.
///
/// Built once by the static builder and shared by reference across Level 1,
/// 2 and 3 so that `B★` and the compiled predicate terms are constructed
/// exactly once (§4.2, §5).
pub struct AnalysisContext {
    ctx: Context,
}

impl AnalysisContext {
    /// Create a context with the given solver timeout in milliseconds.
    pub fn new(timeout_ms: u64) -> Self {
        let mut cfg = Config::new();
        cfg.set_param_value("timeout", &timeout_ms.to_string());
        Self {
            ctx: Context::new(&cfg),
        }
    }

    pub fn z3_context(&self) -> &Context {
        &self.ctx
    }

    /// Start a fresh incremental solver asserting nothing yet.
    pub fn solver(&self) -> Solver {
        Solver::new(&self.ctx)
    }

    /// Encode a [`VerifyExpr`] against this context's declared variables.
    pub(crate) fn encoder<'ctx>(
        &'ctx self,
        vars: &'ctx RustcHashMap<String, VerifyType>,
    ) -> Encoder<'ctx> {
        Encoder::new(&self.ctx, vars)
    }

    /// Evaluate a SAT model, reading back every declared variable's value.
    pub(crate) fn extract_witness(
        &self,
        model: &z3::Model,
        vars: &RustcHashMap<String, VerifyType>,
    ) -> Witness {
        let mut out = Witness::new();
        for (name, ty) in vars {
            match ty {
                VerifyType::Int => {
                    let v = Int::new_const(&self.ctx, name.as_str());
                    if let Some(i) = model.eval(&v, true).and_then(|d| d.as_i64()) {
                        out.insert(name.clone(), WitnessValue::Int(i));
                    }
                }
                VerifyType::Bool => {
                    let v = Bool::new_const(&self.ctx, name.as_str());
                    if let Some(b) = model.eval(&v, true).and_then(|d| d.as_bool()) {
                        out.insert(name.clone(), WitnessValue::Bool(b));
                    }
                }
            }
        }
        out
    }
}

/// Outcome of a single push/pop query against an [`AnalysisContext`].
pub enum Query {
    /// The formula is unsatisfiable.
    Unsat,
    /// The formula is satisfiable; carries the requested witness.
    Sat(Witness),
    /// The solver could not decide within its timeout.
    Unknown,
}

/// Run `assertion` (and everything already on `solver`) in a push/pop
/// scope, returning a [`Query`] outcome with a witness extracted from the
/// declared `vars` on SAT.
///
/// This is the query shape Level 1/2/3 share: push, assert, check, extract
/// a witness (or don't), pop. Centralizing it keeps the push/pop discipline
/// exception-safe even when a caller returns early.
pub(crate) fn query_scoped(
    actx: &AnalysisContext,
    solver: &Solver,
    assertion: &Bool,
    vars: &RustcHashMap<String, VerifyType>,
) -> Query {
    solver.push();
    solver.assert(assertion);
    let result = match solver.check() {
        SatResult::Unsat => Query::Unsat,
        SatResult::Sat => match solver.get_model() {
            Some(model) => Query::Sat(actx.extract_witness(&model, vars)),
            None => Query::Sat(Witness::new()),
        },
        SatResult::Unknown => Query::Unknown,
    };
    solver.pop(1);
    result
}

/// Run a named, trackable assertion (`solver.assert_and_track`) so that on
/// UNSAT the caller can read back `solver.get_unsat_core()` to find which
/// tracked assertions participated. Used by Level 2 to report which items'
/// `P_i => Q_i` implications are jointly unsatisfiable.
pub(crate) fn assert_tracked<'ctx>(
    ctx: &'ctx Context,
    solver: &Solver<'ctx>,
    assertion: &Bool<'ctx>,
    track_name: &str,
) {
    let tracker = Bool::new_const(ctx, track_name);
    solver.assert_and_track(assertion, &tracker);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars_of(pairs: &[(&str, VerifyType)]) -> RustcHashMap<String, VerifyType> {
        pairs.iter().map(|(n, t)| (n.to_string(), *t)).collect()
    }

    #[test]
    fn query_scoped_reports_unsat_for_a_valid_assertion() {
        let actx = AnalysisContext::new(5_000);
        let vars = vars_of(&[("x", VerifyType::Int)]);
        let solver = actx.solver();
        let encoder = actx.encoder(&vars);

        // x = 10 |- x > 5, so NOT(x > 5) under that assumption is UNSAT.
        let eq10 = encoder
            .encode(&VerifyExpr::eq(VerifyExpr::var("x"), VerifyExpr::int(10)))
            .as_bool()
            .unwrap();
        solver.assert(&eq10);

        let negated = encoder
            .encode(&VerifyExpr::not(VerifyExpr::gt(VerifyExpr::var("x"), VerifyExpr::int(5))))
            .as_bool()
            .unwrap();

        assert!(matches!(query_scoped(&actx, &solver, &negated, &vars), Query::Unsat));
    }

    #[test]
    fn query_scoped_reports_sat_with_witness_for_a_satisfiable_assertion() {
        let actx = AnalysisContext::new(5_000);
        let vars = vars_of(&[("x", VerifyType::Int)]);
        let solver = actx.solver();
        let encoder = actx.encoder(&vars);

        let gt5 = encoder
            .encode(&VerifyExpr::gt(VerifyExpr::var("x"), VerifyExpr::int(5)))
            .as_bool()
            .unwrap();

        match query_scoped(&actx, &solver, &gt5, &vars) {
            Query::Sat(witness) => {
                let x = witness.get("x").expect("x bound in witness");
                assert!(matches!(x, WitnessValue::Int(n) if *n > 5));
            }
            _ => panic!("expected Sat"),
        }
    }

    #[test]
    fn push_pop_leaves_solver_state_unchanged() {
        let actx = AnalysisContext::new(5_000);
        let vars = vars_of(&[("x", VerifyType::Int)]);
        let solver = actx.solver();
        let encoder = actx.encoder(&vars);

        let gt5 = encoder
            .encode(&VerifyExpr::gt(VerifyExpr::var("x"), VerifyExpr::int(5)))
            .as_bool()
            .unwrap();
        query_scoped(&actx, &solver, &gt5, &vars);

        // The scratch assertion must not have leaked past the pop: an
        // unconstrained `x` is still satisfiable on its own.
        assert!(matches!(solver.check(), SatResult::Sat));
    }

    #[test]
    fn assert_tracked_names_participate_in_the_unsat_core() {
        let actx = AnalysisContext::new(5_000);
        let vars = vars_of(&[("x", VerifyType::Int)]);
        let ctx = actx.z3_context();
        let solver = actx.solver();
        let encoder = actx.encoder(&vars);

        let gt5 = encoder
            .encode(&VerifyExpr::gt(VerifyExpr::var("x"), VerifyExpr::int(5)))
            .as_bool()
            .unwrap();
        let lt0 = encoder
            .encode(&VerifyExpr::lt(VerifyExpr::var("x"), VerifyExpr::int(0)))
            .as_bool()
            .unwrap();

        assert_tracked(ctx, &solver, &gt5, "gt5");
        assert_tracked(ctx, &solver, &lt0, "lt0");

        assert!(matches!(solver.check(), SatResult::Unsat));
        let core = solver.get_unsat_core();
        assert!(!core.is_empty());
    }
}
