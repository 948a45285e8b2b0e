//! Level 3: path-based dead-code analysis (§4.6).
//!
//! For each item `i`, accumulate the preconditions/postconditions of every
//! predecessor reachable via dependency edges into `A_i := B★ ∧ ⋀_{j∈Pred*(i)}
//! (P_j ⇒ Q_j)`, then test `A_i ∧ P_i` for satisfiability. UNSAT means the
//! item can never actually be reached once its ancestors' contracts hold —
//! dead code, even though Level 1's simpler `B★ ∧ P_i` check alone found it
//! reachable.
//!
//! §9's first open question — whether reachability should also require each
//! ancestor's outcome to be non-`None` — is resolved here by folding
//! `visited__j` into the accumulated antecedent for every ancestor `j`: `A_i`
//! implies every ancestor was actually answered, not merely that its
//! implication holds vacuously. This matches the spec's framing of
//! `visited_i` as the variable that "stands for whether item i's outcome
//! was actually assigned" — an item whose ancestor was skipped has not truly
//! been reached. See `DESIGN.md`.

use std::collections::{HashMap, HashSet};

use z3::ast::Bool;

use crate::builder::{visited_var, Built};
use crate::cancel::CancelToken;
use crate::solver::{query_scoped, AnalysisContext, Query, Witness};
use crate::topology::Edge;

#[derive(Debug, Default)]
pub struct PathVerdict {
    pub dead: bool,
    pub witness: Option<Witness>,
    pub undecided: bool,
}

/// `Pred*(i)`: every item reachable by following edges backwards from `i`.
fn transitive_predecessors(id: &str, edges: &[Edge]) -> HashSet<String> {
    let mut preds: HashMap<&str, Vec<&str>> = HashMap::new();
    for edge in edges {
        preds.entry(edge.to.as_str()).or_default().push(edge.from.as_str());
    }

    let mut seen = HashSet::new();
    let mut stack = vec![id];
    while let Some(cur) = stack.pop() {
        if let Some(ps) = preds.get(cur) {
            for &p in ps {
                if seen.insert(p.to_string()) {
                    stack.push(p);
                }
            }
        }
    }
    seen
}

/// Runs one push/pop query per item, in canonical topological order,
/// checking `cancel` between items (§5).
pub fn analyze_paths(actx: &AnalysisContext, built: &Built, cancel: &CancelToken) -> HashMap<String, PathVerdict> {
    let solver = actx.solver();
    let encoder = actx.encoder(&built.vars);
    for b in &built.b_star {
        if let Some(b) = encoder.encode(b).as_bool() {
            solver.assert(&b);
        }
    }

    let mut out = HashMap::new();

    for id in &built.topology.order {
        if cancel.is_cancelled() {
            break;
        }
        let Some(terms) = built.per_item.get(id) else { continue };
        if !terms.errors.is_empty() {
            out.insert(id.clone(), PathVerdict::default());
            continue;
        }

        let preds = transitive_predecessors(id, &built.edges);

        let mut antecedent_parts: Vec<Bool> = Vec::new();
        for pred_id in &preds {
            let Some(pred_terms) = built.per_item.get(pred_id) else { continue };
            if !pred_terms.errors.is_empty() {
                continue;
            }
            let p = encoder.encode(&pred_terms.precondition).as_bool();
            if let Some(q) = &pred_terms.postcondition {
                let q_ast = encoder.encode(q).as_bool();
                if let (Some(p), Some(q_ast)) = (p, q_ast) {
                    antecedent_parts.push(p.implies(&q_ast));
                }
            }
            let visited = Bool::new_const(actx.z3_context(), visited_var(pred_id));
            antecedent_parts.push(visited);
        }

        let p_i = encoder
            .encode(&terms.precondition)
            .as_bool()
            .unwrap_or_else(|| Bool::from_bool(actx.z3_context(), true));

        let a_i = if antecedent_parts.is_empty() {
            p_i.clone()
        } else {
            let refs: Vec<&Bool> = antecedent_parts.iter().collect();
            let conj = Bool::and(actx.z3_context(), &refs);
            Bool::and(actx.z3_context(), &[&conj, &p_i])
        };

        let verdict = match query_scoped(actx, &solver, &a_i, &built.vars) {
            Query::Unsat => PathVerdict { dead: true, witness: None, undecided: false },
            Query::Sat(w) => PathVerdict { dead: false, witness: Some(w), undecided: false },
            Query::Unknown => PathVerdict { dead: false, witness: None, undecided: true },
        };
        out.insert(id.clone(), verdict);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder, cancel::CancelToken, loader, solver::AnalysisContext};

    fn run(yaml: &str) -> HashMap<String, PathVerdict> {
        let q = loader::load(yaml).unwrap();
        let built = builder::build(&q).unwrap();
        let actx = AnalysisContext::new(10_000);
        analyze_paths(&actx, &built, &CancelToken::new())
    }

    #[test]
    fn finds_dead_item_behind_contradictory_ancestor_chain() {
        let yaml = r#"
questionnaire:
  title: S6
  blocks:
    - id: b1
      items:
        - id: age
          kind: Question
          input: { min: 0, max: 120 }
          postcondition:
            - predicate: "age.outcome > 100"
        - id: senior_discount
          kind: Question
          input: { min: 0, max: 1 }
          precondition:
            - predicate: "age.outcome < 50"
"#;
        let verdicts = run(yaml);
        assert!(verdicts["senior_discount"].dead);
    }

    #[test]
    fn live_item_is_not_dead() {
        let yaml = r#"
questionnaire:
  title: Live
  blocks:
    - id: b1
      items:
        - id: age
          kind: Question
          input: { min: 0, max: 120 }
        - id: experience
          kind: Question
          input: { min: 0, max: 50 }
          precondition:
            - predicate: "age.outcome >= 16"
"#;
        let verdicts = run(yaml);
        assert!(!verdicts["experience"].dead);
    }
}
