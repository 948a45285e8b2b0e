//! Static analysis for YAML-defined questionnaires.
//!
//! Entry point: [`analyze`]. Loads a YAML document, builds the base
//! constraint and per-item terms, runs the three classification levels, and
//! returns a [`report::Report`] in canonical topological order (§2 of
//! SPEC_FULL.md describes the leaves-first data flow this mirrors).

pub mod builder;
pub mod cancel;
pub mod classify;
pub mod error;
pub mod expr;
pub mod global;
pub mod ir;
pub mod loader;
pub mod model;
pub mod path;
pub mod report;
pub mod solver;
pub mod topology;

pub use cancel::CancelToken;
pub use error::StructuralError;
pub use ir::{VerifyExpr, VerifyOp, VerifyType};
pub use report::Report;
pub use solver::AnalysisContext;

/// Run the full pipeline over a YAML document.
///
/// On a structural error the pipeline aborts immediately and returns a
/// report shaped per §6 (`cycle` populated for `CycleDetected`, `items`
/// empty) rather than a bare `Err`, so callers drive the same exit-code
/// logic in both cases; the underlying [`StructuralError`] is still
/// returned alongside for `report::exit_code`.
pub fn analyze(yaml: &str, timeout_ms: u64, cancel: &CancelToken) -> (Report, Option<StructuralError>) {
    let questionnaire = match loader::load(yaml) {
        Ok(q) => q,
        Err(e) => {
            log::warn!("questionnaire failed to load: {}", e);
            let report = report::structural_error_report(&e);
            return (report, Some(e));
        }
    };

    let built = match builder::build(&questionnaire) {
        Ok(b) => b,
        Err(e) => {
            log::warn!("static builder rejected questionnaire: {}", e);
            let report = report::structural_error_report(&e);
            return (report, Some(e));
        }
    };

    log::debug!(
        "built {} items, {} dependency edges, canonical order computed",
        built.per_item.len(),
        built.edges.len()
    );

    let actx = AnalysisContext::new(timeout_ms);

    let classify_verdicts = classify::classify_all(&actx, &built, cancel);
    if cancel.is_cancelled() {
        log::warn!("analysis cancelled during classification");
    }

    let path_verdicts = if cancel.is_cancelled() {
        std::collections::HashMap::new()
    } else {
        path::analyze_paths(&actx, &built, cancel)
    };

    let global_result = if cancel.is_cancelled() {
        global::GlobalResult { verdict: global::GlobalVerdict::Undecided, witness: None }
    } else {
        global::check_global(&actx, &built, &classify_verdicts)
    };

    let report = report::build_report(&built, &classify_verdicts, &path_verdicts, &global_result);
    (report, None)
}
