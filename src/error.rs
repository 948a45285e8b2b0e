//! Crate-wide error types.
//!
//! Two families, per §7 of SPEC_FULL.md: [`StructuralError`] aborts the
//! whole analysis, [`ItemError`] attaches to one item's record without
//! aborting the rest. Both are plain enums with manual `Display`/
//! `std::error::Error` impls, matching the teacher's hand-rolled error style
//! (no `thiserror`).

use std::fmt;

// ============================================================
// Pipeline error families (§7)
// ============================================================

/// Aborts the whole analysis. No partial item records are produced once one
/// of these is raised — the questionnaire as a whole could not be reduced
/// to a well-formed constraint system.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuralError {
    SchemaError { message: String },
    DuplicateItemId { id: String },
    EmptyQuestionnaire,
    CycleDetected { path: Vec<String> },
    UnresolvedIdentifier { item_id: String, name: String },
    UnsupportedExpression { item_id: String, message: String },
    EmptyDomain { item_id: String },
}

impl fmt::Display for StructuralError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StructuralError::SchemaError { message } => write!(f, "schema error: {}", message),
            StructuralError::DuplicateItemId { id } => write!(f, "duplicate item id '{}'", id),
            StructuralError::EmptyQuestionnaire => write!(f, "questionnaire has no items"),
            StructuralError::CycleDetected { path } => {
                write!(f, "dependency cycle: {}", path.join(" -> "))
            }
            StructuralError::UnresolvedIdentifier { item_id, name } => {
                write!(f, "{}: unresolved identifier '{}'", item_id, name)
            }
            StructuralError::UnsupportedExpression { item_id, message } => {
                write!(f, "{}: unsupported expression: {}", item_id, message)
            }
            StructuralError::EmptyDomain { item_id } => {
                write!(f, "{}: declared domain is unsatisfiable", item_id)
            }
        }
    }
}

impl std::error::Error for StructuralError {}

/// Attached to one item's record; does not abort the rest of the analysis.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemError {
    ParseError { message: String, offset: usize },
    UnknownFunction { name: String, offset: usize },
    TypeMismatch { message: String, offset: usize },
    /// The solver returned `UNKNOWN` (timeout) for a query this item needed.
    SolverUndecided { query: String },
}

impl fmt::Display for ItemError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemError::ParseError { message, offset } => {
                write!(f, "parse error at offset {}: {}", offset, message)
            }
            ItemError::UnknownFunction { name, offset } => {
                write!(f, "unknown function '{}' at offset {}", name, offset)
            }
            ItemError::TypeMismatch { message, offset } => {
                write!(f, "type mismatch at offset {}: {}", offset, message)
            }
            ItemError::SolverUndecided { query } => {
                write!(f, "solver could not decide query '{}' within its timeout", query)
            }
        }
    }
}

impl std::error::Error for ItemError {}

impl From<crate::expr::CompileError> for ItemError {
    /// Converts a compiler error that belongs to the per-item family.
    /// Callers must not call this for `UnknownIdentifier`/`UnsupportedExpression`,
    /// which are structural — see [`StructuralError::from_compile_error`].
    fn from(e: crate::expr::CompileError) -> Self {
        use crate::expr::CompileErrorKind::*;
        match e.kind {
            ParseError => ItemError::ParseError { message: e.message, offset: e.offset },
            UnknownFunction => ItemError::UnknownFunction { name: e.message, offset: e.offset },
            TypeMismatch => ItemError::TypeMismatch { message: e.message, offset: e.offset },
            UnknownIdentifier | UnsupportedExpression => {
                // Defensive: these belong to the structural family. Treat as
                // a parse error rather than silently dropping the failure.
                ItemError::ParseError { message: e.message, offset: e.offset }
            }
        }
    }
}

impl StructuralError {
    /// Converts a compiler error that belongs to the structural family.
    pub fn from_compile_error(e: &crate::expr::CompileError) -> Option<Self> {
        use crate::expr::CompileErrorKind::*;
        match e.kind {
            UnknownIdentifier => Some(StructuralError::UnresolvedIdentifier {
                item_id: e.item_id.clone(),
                name: e.message.clone(),
            }),
            UnsupportedExpression => Some(StructuralError::UnsupportedExpression {
                item_id: e.item_id.clone(),
                message: e.message.clone(),
            }),
            _ => None,
        }
    }
}
