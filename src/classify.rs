//! Level 1: per-item reachability/postcondition classification (§4.4).

use std::collections::HashMap;

use z3::ast::Bool;

use crate::builder::Built;
use crate::cancel::CancelToken;
use crate::solver::{query_scoped, AnalysisContext, Query, Witness};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reach {
    Always,
    Conditional,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Post {
    Tautological,
    Constraining,
    Infeasible,
    None,
}

#[derive(Debug, Default)]
pub struct ItemVerdict {
    pub reach: Option<Reach>,
    pub post: Option<Post>,
    pub witness: Option<Witness>,
    /// Names of the queries (`"R1"`, `"T2"`, ...) that came back `UNKNOWN`.
    pub undecided: Vec<&'static str>,
}

/// Classify every item, in canonical topological order (§5). Items with
/// compile errors from the builder are skipped — their `reach`/`post` stay
/// `None`, matching §7's "items that fail parse get `reach = post = null`".
///
/// Checks `cancel` between items; on cancellation, stops and returns the
/// verdicts produced so far (§5's cooperative preemption).
pub fn classify_all(actx: &AnalysisContext, built: &Built, cancel: &CancelToken) -> HashMap<String, ItemVerdict> {
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
            out.insert(id.clone(), ItemVerdict::default());
            continue;
        }

        let mut verdict = ItemVerdict::default();

        let p = encoder
            .encode(&terms.precondition)
            .as_bool()
            .unwrap_or_else(|| Bool::from_bool(actx.z3_context(), true));

        verdict.reach = match query_scoped(actx, &solver, &p.not(), &built.vars) {
            Query::Unsat => Some(Reach::Always),
            Query::Sat(w) => {
                verdict.witness = Some(w);
                match query_scoped(actx, &solver, &p, &built.vars) {
                    Query::Unsat => Some(Reach::Never),
                    Query::Sat(w2) => {
                        verdict.witness = Some(w2);
                        Some(Reach::Conditional)
                    }
                    Query::Unknown => {
                        verdict.undecided.push("R2");
                        None
                    }
                }
            }
            Query::Unknown => {
                verdict.undecided.push("R1");
                None
            }
        };

        if let Some(q) = &terms.postcondition {
            let q_ast = encoder.encode(q).as_bool().unwrap_or_else(|| Bool::from_bool(actx.z3_context(), true));
            let p_and_q = Bool::and(actx.z3_context(), &[&p, &q_ast]);
            let p_and_not_q = Bool::and(actx.z3_context(), &[&p, &q_ast.not()]);

            let t1 = query_scoped(actx, &solver, &p_and_q, &built.vars);
            let t2 = query_scoped(actx, &solver, &p_and_not_q, &built.vars);

            verdict.post = match (t1, t2) {
                (Query::Unsat, _) => Some(Post::Infeasible),
                (Query::Sat(_), Query::Unsat) => Some(Post::Tautological),
                (Query::Sat(w), Query::Sat(_)) => {
                    verdict.witness = Some(w);
                    Some(Post::Constraining)
                }
                (Query::Unknown, _) => {
                    verdict.undecided.push("T1");
                    None
                }
                (_, Query::Unknown) => {
                    verdict.undecided.push("T2");
                    None
                }
            };
        } else {
            verdict.post = Some(Post::None);
        }

        out.insert(id.clone(), verdict);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{builder, cancel::CancelToken, loader, solver::AnalysisContext};

    fn classify(yaml: &str) -> HashMap<String, ItemVerdict> {
        let q = loader::load(yaml).unwrap();
        let built = builder::build(&q).unwrap();
        let actx = AnalysisContext::new(10_000);
        classify_all(&actx, &built, &CancelToken::new())
    }

    #[test]
    fn s1_basic_linear_survey() {
        let yaml = r#"
questionnaire:
  title: S1
  blocks:
    - id: b1
      items:
        - id: age
          kind: Question
          input: { min: 0, max: 120 }
        - id: gender
          kind: Question
          input: { options: [{ value: 0 }, { value: 1 }] }
"#;
        let verdicts = classify(yaml);
        assert_eq!(verdicts["age"].reach, Some(Reach::Always));
        assert_eq!(verdicts["age"].post, Some(Post::None));
        assert_eq!(verdicts["gender"].reach, Some(Reach::Always));
    }

    #[test]
    fn s4_driving_experience() {
        let yaml = r#"
questionnaire:
  title: S4
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
          postcondition:
            - predicate: "experience.outcome <= age.outcome - 16"
"#;
        let verdicts = classify(yaml);
        assert_eq!(verdicts["experience"].reach, Some(Reach::Conditional));
        assert_eq!(verdicts["experience"].post, Some(Post::Constraining));
    }

    #[test]
    fn s2_conflicting_postconditions() {
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
        let verdicts = classify(yaml);
        assert_eq!(verdicts["q1"].post, Some(Post::Constraining));
        assert_eq!(verdicts["q2"].post, Some(Post::Constraining));
    }
}
