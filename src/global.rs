//! Level 2: global satisfiability (§4.5).
//!
//! `F := B★ ∧ ⋀ᵢ (P_i ⇒ Q_i)`. SAT gives `VALID`; UNSAT gives `INCONSISTENT`
//! with an unsat core pointing at the conflicting items, via
//! `solver::assert_tracked`/`get_unsat_core` (the same push/pop + tracked
//! assertion idiom `classify` and `path` use).
//!
//! §9's second open question — whether a `NEVER`-reachable item's
//! `INFEASIBLE` postcondition should count toward global `INCONSISTENT` — is
//! resolved here the conservative way the spec suggests: `NEVER` items are
//! excluded from the conjunction entirely, since their implication `P_i ⇒
//! Q_i` is vacuously true regardless of `Q_i` once `P_i` is unreachable, and
//! including it anyway would make Level 2 sensitive to dead predicates that
//! can never fire. See `DESIGN.md`.

use z3::ast::Bool;

use crate::builder::Built;
use crate::classify::{ItemVerdict, Reach};
use crate::solver::{assert_tracked, AnalysisContext, Witness};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GlobalVerdict {
    Valid,
    Inconsistent { conflict: Vec<String> },
    Undecided,
}

pub struct GlobalResult {
    pub verdict: GlobalVerdict,
    pub witness: Option<Witness>,
}

pub fn check_global(
    actx: &AnalysisContext,
    built: &Built,
    verdicts: &HashMap<String, ItemVerdict>,
) -> GlobalResult {
    let solver = actx.solver();
    let encoder = actx.encoder(&built.vars);
    let ctx = actx.z3_context();

    for b in &built.b_star {
        if let Some(b) = encoder.encode(b).as_bool() {
            solver.assert(&b);
        }
    }

    let mut track_names = Vec::new();

    for (id, terms) in &built.per_item {
        if !terms.errors.is_empty() {
            continue;
        }
        if matches!(verdicts.get(id).and_then(|v| v.reach), Some(Reach::Never)) {
            continue;
        }

        let Some(q) = &terms.postcondition else { continue };

        let p = encoder.encode(&terms.precondition).as_bool().unwrap_or_else(|| Bool::from_bool(ctx, true));
        let q_ast = encoder.encode(q).as_bool().unwrap_or_else(|| Bool::from_bool(ctx, true));
        let implication = p.implies(&q_ast);

        let track_name = format!("impl__{}", id);
        assert_tracked(ctx, &solver, &implication, &track_name);
        track_names.push((track_name, id.clone()));
    }

    match solver.check() {
        z3::SatResult::Sat => {
            let witness = solver.get_model().map(|m| actx.extract_witness(&m, &built.vars));
            GlobalResult { verdict: GlobalVerdict::Valid, witness }
        }
        z3::SatResult::Unsat => {
            let core = solver.get_unsat_core();
            let core_names: std::collections::HashSet<String> =
                core.iter().filter_map(|b| b.to_string().split_whitespace().next().map(str::to_string)).collect();
            let mut conflict: Vec<String> = track_names
                .into_iter()
                .filter(|(track, _)| core_names.contains(track))
                .map(|(_, id)| id)
                .collect();
            conflict.sort();
            GlobalResult { verdict: GlobalVerdict::Inconsistent { conflict }, witness: None }
        }
        z3::SatResult::Unknown => GlobalResult { verdict: GlobalVerdict::Undecided, witness: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder, cancel::CancelToken, classify, loader, solver::AnalysisContext};

    fn run(yaml: &str) -> GlobalResult {
        let q = loader::load(yaml).unwrap();
        let built = builder::build(&q).unwrap();
        let actx = AnalysisContext::new(10_000);
        let verdicts = classify::classify_all(&actx, &built, &CancelToken::new());
        check_global(&actx, &built, &verdicts)
    }

    #[test]
    fn valid_when_tautological() {
        let yaml = r#"
questionnaire:
  title: G1
  blocks:
    - id: b1
      items:
        - id: age
          kind: Question
          input: { min: 0, max: 120 }
"#;
        let result = run(yaml);
        assert_eq!(result.verdict, GlobalVerdict::Valid);
    }

    #[test]
    fn inconsistent_on_conflicting_postconditions() {
        let yaml = r#"
questionnaire:
  title: S2
  blocks:
    - id: b1
      items:
        - id: rating
          kind: Question
          input: { min: 0, max: 100 }
        - id: q1
          kind: Question
          input: { min: 0, max: 1 }
          postcondition:
            - predicate: "rating.outcome > 50"
        - id: q2
          kind: Question
          input: { min: 0, max: 1 }
          postcondition:
            - predicate: "rating.outcome < 30"
"#;
        let result = run(yaml);
        match result.verdict {
            GlobalVerdict::Inconsistent { conflict } => {
                assert!(conflict.contains(&"q1".to_string()));
                assert!(conflict.contains(&"q2".to_string()));
            }
            other => panic!("expected Inconsistent, got {:?}", other),
        }
    }
}
