//! JSON report (§6) and exit code mapping.

use std::collections::HashMap;

use serde::Serialize;

use crate::builder::Built;
use crate::classify::{ItemVerdict, Post, Reach};
use crate::error::{ItemError, StructuralError};
use crate::global::{GlobalResult, GlobalVerdict};
use crate::path::PathVerdict;
use crate::solver::{Witness, WitnessValue};

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReachJson {
    Always,
    Conditional,
    Never,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PostJson {
    Tautological,
    Constraining,
    Infeasible,
    None,
    Undecided,
}

#[derive(Debug, Serialize)]
pub struct ErrorJson {
    pub kind: String,
    pub message: String,
}

impl From<&ItemError> for ErrorJson {
    fn from(e: &ItemError) -> Self {
        let kind = match e {
            ItemError::ParseError { .. } => "ParseError",
            ItemError::UnknownFunction { .. } => "UnknownFunction",
            ItemError::TypeMismatch { .. } => "TypeMismatch",
            ItemError::SolverUndecided { .. } => "SolverUndecided",
        };
        ErrorJson { kind: kind.to_string(), message: e.to_string() }
    }
}

fn witness_to_json(w: &Witness) -> serde_json::Map<String, serde_json::Value> {
    w.iter()
        .map(|(k, v)| {
            let value = match v {
                WitnessValue::Int(i) => serde_json::Value::from(*i),
                WitnessValue::Bool(b) => serde_json::Value::from(*b),
            };
            (k.clone(), value)
        })
        .collect()
}

#[derive(Debug, Serialize)]
pub struct ItemReportJson {
    pub id: String,
    pub reach: Option<ReachJson>,
    pub post: Option<PostJson>,
    pub dead: bool,
    pub witness: Option<serde_json::Map<String, serde_json::Value>>,
    pub errors: Vec<ErrorJson>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GlobalVerdictJson {
    Valid,
    Inconsistent,
    Undecided,
}

#[derive(Debug, Serialize)]
pub struct GlobalReportJson {
    pub verdict: GlobalVerdictJson,
    pub conflict: Option<Vec<String>>,
}

#[derive(Debug, Serialize)]
pub struct Report {
    pub valid: bool,
    pub cycle: Option<Vec<String>>,
    pub items: Vec<ItemReportJson>,
    pub global: GlobalReportJson,
}

/// Assembles the JSON report from every pipeline stage's output, in
/// canonical topological order (§5, §6).
pub fn build_report(
    built: &Built,
    classify: &HashMap<String, ItemVerdict>,
    paths: &HashMap<String, PathVerdict>,
    global: &GlobalResult,
) -> Report {
    let order = &built.topology.order;
    let mut items = Vec::with_capacity(order.len());

    for id in order {
        let verdict = classify.get(id);
        let path = paths.get(id);
        let errors: Vec<ErrorJson> = built
            .per_item
            .get(id)
            .map(|terms| terms.errors.iter().map(ErrorJson::from).collect())
            .unwrap_or_default();

        let reach = verdict.and_then(|v| v.reach).map(|r| match r {
            Reach::Always => ReachJson::Always,
            Reach::Conditional => ReachJson::Conditional,
            Reach::Never => ReachJson::Never,
        });

        let post = match verdict {
            Some(v) => match v.post {
                Some(Post::Tautological) => Some(PostJson::Tautological),
                Some(Post::Constraining) => Some(PostJson::Constraining),
                Some(Post::Infeasible) => Some(PostJson::Infeasible),
                Some(Post::None) => Some(PostJson::None),
                None if !v.undecided.is_empty() => Some(PostJson::Undecided),
                None => None,
            },
            None => None,
        };

        let witness = verdict
            .and_then(|v| v.witness.as_ref())
            .or_else(|| path.and_then(|p| p.witness.as_ref()))
            .map(witness_to_json);

        let dead = path.map(|p| p.dead).unwrap_or(false);

        items.push(ItemReportJson { id: id.clone(), reach, post, dead, witness, errors });
    }

    let (global_json, valid) = match &global.verdict {
        GlobalVerdict::Valid => (
            GlobalReportJson { verdict: GlobalVerdictJson::Valid, conflict: None },
            true,
        ),
        GlobalVerdict::Inconsistent { conflict } => (
            GlobalReportJson { verdict: GlobalVerdictJson::Inconsistent, conflict: Some(conflict.clone()) },
            false,
        ),
        GlobalVerdict::Undecided => (
            GlobalReportJson { verdict: GlobalVerdictJson::Undecided, conflict: None },
            false,
        ),
    };

    Report { valid, cycle: None, items, global: global_json }
}

/// A structural error short-circuits the whole pipeline; this is the report
/// shape for that case (§6: `cycle` populated, empty `items`).
pub fn structural_error_report(err: &StructuralError) -> Report {
    let cycle = match err {
        StructuralError::CycleDetected { path } => Some(path.clone()),
        _ => None,
    };
    Report {
        valid: false,
        cycle,
        items: Vec::new(),
        global: GlobalReportJson { verdict: GlobalVerdictJson::Inconsistent, conflict: None },
    }
}

/// Exit code mapping (§6): 0 all-live+VALID, 1 static errors, 2 cycle,
/// 3 any NEVER/INFEASIBLE/dead, 4 global INCONSISTENT, 5 solver UNDECIDED.
pub fn exit_code(report: &Report, structural_error: Option<&StructuralError>) -> i32 {
    if let Some(err) = structural_error {
        return if matches!(err, StructuralError::CycleDetected { .. }) { 2 } else { 1 };
    }

    let any_item_error = report.items.iter().any(|it| !it.errors.is_empty());
    if any_item_error {
        return 1;
    }

    let any_undecided = report.items.iter().any(|it| matches!(it.post, Some(PostJson::Undecided)));
    if any_undecided || matches!(report.global.verdict, GlobalVerdictJson::Undecided) {
        return 5;
    }

    if matches!(report.global.verdict, GlobalVerdictJson::Inconsistent) {
        return 4;
    }

    let any_dead_or_never_or_infeasible = report.items.iter().any(|it| {
        it.dead || matches!(it.reach, Some(ReachJson::Never)) || matches!(it.post, Some(PostJson::Infeasible))
    });
    if any_dead_or_never_or_infeasible {
        return 3;
    }

    0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_code_zero_when_all_live_and_valid() {
        let report = Report {
            valid: true,
            cycle: None,
            items: vec![ItemReportJson {
                id: "age".into(),
                reach: Some(ReachJson::Always),
                post: Some(PostJson::None),
                dead: false,
                witness: None,
                errors: Vec::new(),
            }],
            global: GlobalReportJson { verdict: GlobalVerdictJson::Valid, conflict: None },
        };
        assert_eq!(exit_code(&report, None), 0);
    }

    #[test]
    fn exit_code_four_on_global_inconsistent() {
        let report = Report {
            valid: false,
            cycle: None,
            items: Vec::new(),
            global: GlobalReportJson {
                verdict: GlobalVerdictJson::Inconsistent,
                conflict: Some(vec!["q1".into(), "q2".into()]),
            },
        };
        assert_eq!(exit_code(&report, None), 4);
    }

    #[test]
    fn exit_code_two_on_cycle() {
        let err = StructuralError::CycleDetected { path: vec!["a".into(), "b".into(), "a".into()] };
        let report = structural_error_report(&err);
        assert_eq!(exit_code(&report, Some(&err)), 2);
    }
}
