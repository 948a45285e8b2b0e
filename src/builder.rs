//! Static builder (§4.2): compiles every item's `P_i`/`Q_i`/`D_i`, threads
//! SSA versions through code-fragment locals, derives the dependency edge
//! set, accumulates `B★`, and freezes it for the classification stages.
//!
//! ## Scoping decision: locals are item-local
//!
//! §3 defines a dependency edge as existing "iff `P_i` or `Q_i` or `code_i`
//! references `S_j`" — outcome variables only — and says explicitly that
//! locals written by a code fragment "are *not* dependencies between
//! items." Taken literally, a bare local therefore never carries
//! information across item boundaries; only `qid.outcome` does. This
//! builder follows that reading: a code fragment's assignments are visible
//! to that same item's own postcondition (evaluated once `code_i` has run)
//! and nowhere else. A bare local referenced anywhere else is a compile-time
//! `UnresolvedIdentifier`.
//!
//! One consequence: since `P_i` gates whether `code_i` ever runs, `code_i`'s
//! writes are unconditionally visible to `Q_i` of the *same* item (it only
//! evaluates once the item has been reached), so no conditional join is
//! needed — the join construction §4.2 describes collapses to "just use the
//! final local version" once cross-item local flow is ruled out.

use std::collections::HashMap;

use rustc_hash::FxHashMap as RustcHashMap;

use crate::error::{ItemError, StructuralError};
use crate::expr::{self, CTerm, CompileErrorKind};
use crate::ir::{VerifyExpr, VerifyType};
use crate::model::{Domain, ItemKind, Questionnaire};
use crate::topology::{self, Edge, Topology};

pub fn visited_var(qid: &str) -> String {
    format!("visited__{}", qid)
}

/// Compiled per-item terms, ready for the classification levels.
pub struct ItemTerms {
    /// `⟦P_i⟧`. `true` when `P_i` is empty.
    pub precondition: VerifyExpr,
    /// `⟦Q_i⟧`. `None` when `Q_i` is empty (§4.4: `post = NONE`).
    pub postcondition: Option<VerifyExpr>,
    /// Compile errors for this item; classification continues for other
    /// items but this one's `reach`/`post` are left unset (§7).
    pub errors: Vec<ItemError>,
}

pub struct Built {
    /// `B★`: the conjunction of every item's domain contribution, frozen
    /// after this pass.
    pub b_star: Vec<VerifyExpr>,
    pub vars: RustcHashMap<String, VerifyType>,
    pub edges: Vec<Edge>,
    pub topology: Topology,
    pub per_item: HashMap<String, ItemTerms>,
}

pub fn build(q: &Questionnaire) -> Result<Built, StructuralError> {
    let known_qid = |name: &str| {
        q.item(name).map(|it| it.kind == ItemKind::Question).unwrap_or(false)
    };

    // Pass 1: compile everything just far enough to know which qids each
    // item references, so the edge set (and hence topology) can be built
    // before SSA versions are assigned.
    let mut compiled_pre = HashMap::new();
    let mut compiled_post = HashMap::new();
    let mut compiled_code = HashMap::new();
    let mut edges_set: std::collections::BTreeSet<(String, String)> = std::collections::BTreeSet::new();
    let mut per_item_errors: HashMap<String, Vec<ItemError>> = HashMap::new();

    for item in &q.items {
        if item.kind != ItemKind::Question {
            continue;
        }

        // `refs` feeds the edge set: every qid any of this item's pre/post/code
        // terms mention. `dependency_refs` is the narrower set used for the
        // self-reference check below — precondition and code only. A
        // postcondition referencing its own item's outcome is not a
        // dependency, it is the normal way a postcondition constrains that
        // item's own `S_i` (the only answer syntax is `qid.outcome`), so it
        // must not trip the self-edge guard.
        let mut refs = std::collections::BTreeSet::new();
        let mut dependency_refs = std::collections::BTreeSet::new();
        let mut errs = Vec::new();

        let pre_terms: Vec<_> = item
            .precondition
            .iter()
            .filter_map(|c| match expr::compile_text(&c.predicate, &item.id, &known_qid) {
                Ok(compiled) => {
                    refs.extend(compiled.outcome_refs.iter().cloned());
                    dependency_refs.extend(compiled.outcome_refs.iter().cloned());
                    Some(compiled)
                }
                Err(e) => {
                    record_compile_error(&item.id, e, &mut errs);
                    None
                }
            })
            .collect();

        let post_terms: Vec<_> = item
            .postcondition
            .iter()
            .filter_map(|c| match expr::compile_text(&c.predicate, &item.id, &known_qid) {
                Ok(compiled) => {
                    refs.extend(compiled.outcome_refs.iter().cloned());
                    Some(compiled)
                }
                Err(e) => {
                    record_compile_error(&item.id, e, &mut errs);
                    None
                }
            })
            .collect();

        let code_assignments = match &item.code {
            Some(text) => match expr::compile_code_fragment(text, &item.id, &known_qid) {
                Ok(assignments) => {
                    for a in &assignments {
                        refs.extend(a.value.outcome_refs.iter().cloned());
                        dependency_refs.extend(a.value.outcome_refs.iter().cloned());
                    }
                    Some(assignments)
                }
                Err(e) => {
                    record_compile_error(&item.id, e, &mut errs);
                    None
                }
            },
            None => None,
        };

        if dependency_refs.contains(item.id.as_str()) {
            return Err(StructuralError::UnresolvedIdentifier {
                item_id: item.id.clone(),
                name: format!(
                    "'{}' references its own outcome in its precondition or code (self-edges are illegal)",
                    item.id
                ),
            });
        }

        for j in &refs {
            if j == item.id.as_str() {
                continue;
            }
            edges_set.insert((j.clone(), item.id.clone()));
        }

        compiled_pre.insert(item.id.clone(), pre_terms);
        compiled_post.insert(item.id.clone(), post_terms);
        compiled_code.insert(item.id.clone(), code_assignments);
        per_item_errors.insert(item.id.clone(), errs);
    }

    // A Free-domain item referenced by anyone else violates §3's domain rule.
    for (j, _i) in &edges_set {
        if let Some(item) = q.item(j) {
            if matches!(item.domain, Some(Domain::Free)) {
                return Err(StructuralError::SchemaError {
                    message: format!(
                        "item '{}' has a Free domain but is referenced by another item's predicate",
                        j
                    ),
                });
            }
        }
    }

    let edges: Vec<Edge> = edges_set.into_iter().map(|(from, to)| Edge { from, to }).collect();
    let topo = topology::analyze(&q.items, &edges)?;

    // Pass 2: declare every variable, accumulate B★, and finish compiling
    // each item's terms now that local SSA names can be assigned.
    let mut vars: RustcHashMap<String, VerifyType> = RustcHashMap::default();
    let mut b_star = Vec::new();

    for item in &q.items {
        if item.kind != ItemKind::Question {
            continue;
        }
        let Some(domain) = &item.domain else { continue };

        let ty = match domain {
            Domain::Boolean => VerifyType::Bool,
            _ => VerifyType::Int,
        };
        vars.insert(item.id.clone(), ty);
        vars.insert(visited_var(&item.id), VerifyType::Bool);

        let d_i = domain_term(&item.id, domain);
        if let Some(d) = d_i {
            b_star.push(d);
        }
    }

    let mut per_item = HashMap::new();

    for item in &q.items {
        if item.kind != ItemKind::Question {
            continue;
        }

        let mut errs = per_item_errors.remove(&item.id).unwrap_or_default();
        let mut local_versions: HashMap<String, String> = HashMap::new();

        if let Some(Some(assignments)) = compiled_code.get(&item.id) {
            for (idx, assignment) in assignments.iter().enumerate() {
                let var_name = format!("{}::{}@{}", item.id, assignment.target, idx);
                match instantiate_fallible(&assignment.value.term, &local_versions, &item.id) {
                    Ok(term) => {
                        vars.insert(var_name.clone(), VerifyType::Int);
                        b_star.push(VerifyExpr::eq(VerifyExpr::var(var_name.clone()), term));
                        local_versions.insert(assignment.target.clone(), var_name);
                    }
                    Err(e) => errs.push(e),
                }
            }
        }

        let pre_terms = compiled_pre.get(&item.id).cloned().unwrap_or_default();
        let mut pre_conjuncts = Vec::new();
        for compiled in &pre_terms {
            match instantiate_fallible(&compiled.term, &local_versions, &item.id) {
                Ok(t) => pre_conjuncts.push(t),
                Err(e) => errs.push(e),
            }
            for guard in &compiled.guards {
                match instantiate_fallible(guard, &local_versions, &item.id) {
                    Ok(t) => pre_conjuncts.push(t),
                    Err(e) => errs.push(e),
                }
            }
        }
        let precondition = conjoin(pre_conjuncts);

        let post_terms = compiled_post.get(&item.id).cloned().unwrap_or_default();
        let mut post_conjuncts = Vec::new();
        for compiled in &post_terms {
            match instantiate_fallible(&compiled.term, &local_versions, &item.id) {
                Ok(t) => post_conjuncts.push(t),
                Err(e) => errs.push(e),
            }
            for guard in &compiled.guards {
                match instantiate_fallible(guard, &local_versions, &item.id) {
                    Ok(t) => post_conjuncts.push(t),
                    Err(e) => errs.push(e),
                }
            }
        }
        let postcondition = if item.postcondition.is_empty() {
            None
        } else {
            Some(conjoin(post_conjuncts))
        };

        per_item.insert(item.id.clone(), ItemTerms { precondition, postcondition, errors: errs });
    }

    Ok(Built { b_star, vars, edges, topology: topo, per_item })
}

fn record_compile_error(item_id: &str, e: expr::CompileError, errs: &mut Vec<ItemError>) {
    match e.kind {
        CompileErrorKind::ParseError | CompileErrorKind::UnknownFunction | CompileErrorKind::TypeMismatch => {
            errs.push(ItemError::from(e));
        }
        CompileErrorKind::UnknownIdentifier | CompileErrorKind::UnsupportedExpression => {
            // Structural at the whole-analysis level; the caller (build())
            // checks `known_qid` itself, so in practice these surface via
            // the explicit checks above. Kept here defensively.
            errs.push(ItemError::ParseError { message: format!("{}: {}", item_id, e.message), offset: e.offset });
        }
    }
}

fn conjoin(terms: Vec<VerifyExpr>) -> VerifyExpr {
    let mut iter = terms.into_iter();
    let Some(first) = iter.next() else { return VerifyExpr::bool(true) };
    iter.fold(first, |acc, t| VerifyExpr::and(acc, t))
}

fn domain_term(id: &str, domain: &Domain) -> Option<VerifyExpr> {
    match domain {
        Domain::Integer { lo, hi } => Some(VerifyExpr::and(
            VerifyExpr::gte(VerifyExpr::var(id), VerifyExpr::int(*lo)),
            VerifyExpr::lte(VerifyExpr::var(id), VerifyExpr::int(*hi)),
        )),
        Domain::Enum(values) => {
            let mut iter = values.iter();
            let first = iter.next()?;
            let disjunction = iter.fold(VerifyExpr::eq(VerifyExpr::var(id), VerifyExpr::int(*first)), |acc, v| {
                VerifyExpr::or(acc, VerifyExpr::eq(VerifyExpr::var(id), VerifyExpr::int(*v)))
            });
            Some(disjunction)
        }
        Domain::Boolean => None,
        Domain::Free => None,
    }
}

fn instantiate_fallible(
    term: &CTerm,
    local_versions: &HashMap<String, String>,
    item_id: &str,
) -> Result<VerifyExpr, ItemError> {
    match term {
        CTerm::Int(n) => Ok(VerifyExpr::int(*n)),
        CTerm::Bool(b) => Ok(VerifyExpr::bool(*b)),
        CTerm::Outcome(qid) => Ok(VerifyExpr::var(qid.clone())),
        CTerm::Visited(qid) => Ok(VerifyExpr::var(visited_var(qid))),
        CTerm::Local(name) => local_versions.get(name).cloned().map(VerifyExpr::var).ok_or_else(|| {
            ItemError::ParseError {
                message: format!("{}: unresolved local '{}' (no prior write in this item)", item_id, name),
                offset: 0,
            }
        }),
        CTerm::Not(inner) => Ok(VerifyExpr::not(instantiate_fallible(inner, local_versions, item_id)?)),
        CTerm::Neg(inner) => Ok(VerifyExpr::binary(
            crate::ir::VerifyOp::Sub,
            VerifyExpr::int(0),
            instantiate_fallible(inner, local_versions, item_id)?,
        )),
        CTerm::Binary(op, l, r) => {
            let lv = instantiate_fallible(l, local_versions, item_id)?;
            let rv = instantiate_fallible(r, local_versions, item_id)?;
            use crate::expr::CBinOp::*;
            use crate::ir::VerifyOp;
            let vop = match op {
                Add => VerifyOp::Add,
                Sub => VerifyOp::Sub,
                Mul => VerifyOp::Mul,
                FloorDiv => VerifyOp::Div,
                Mod => VerifyOp::Mod,
                Eq => VerifyOp::Eq,
                Neq => VerifyOp::Neq,
                Lt => VerifyOp::Lt,
                Le => VerifyOp::Lte,
                Gt => VerifyOp::Gt,
                Ge => VerifyOp::Gte,
                And => VerifyOp::And,
                Or => VerifyOp::Or,
            };
            Ok(VerifyExpr::binary(vop, lv, rv))
        }
    }
}

// `Compiled` doesn't derive Clone (its BTreeSets do, but deriving on the
// whole struct keeps call sites above readable); implemented here to avoid
// widening `expr::Compiled`'s public derive surface for a builder-only need.
impl Clone for expr::Compiled {
    fn clone(&self) -> Self {
        expr::Compiled {
            term: self.term.clone(),
            outcome_refs: self.outcome_refs.clone(),
            local_refs: self.local_refs.clone(),
            guards: self.guards.clone(),
        }
    }
}
