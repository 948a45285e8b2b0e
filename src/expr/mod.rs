//! Predicate/code expression compiler (§4.1).
//!
//! `lexer` and `parser` turn expression text into an [`ast::Expr`] tree;
//! `compile` lowers that tree into a canonical [`compile::CTerm`] plus the
//! reference sets the static builder needs; `instantiate` turns a `CTerm`
//! into the final [`crate::ir::VerifyExpr`] once SSA versions are known.

pub mod ast;
pub mod compile;
pub mod lexer;
pub mod parser;

use std::collections::BTreeSet;

pub use ast::Expr;
pub use compile::{CBinOp, CTerm, CompileError, CompileErrorKind, Compiled};

/// Parse and compile one predicate/expression string end to end.
///
/// Parse errors are reported as [`CompileErrorKind::ParseError`] so callers
/// only need to handle one error type per item.
pub fn compile_text(
    text: &str,
    item_id: &str,
    known_qid: &dyn Fn(&str) -> bool,
) -> Result<Compiled, CompileError> {
    let tokens = lexer::lex(text).map_err(|e| CompileError {
        item_id: item_id.to_string(),
        offset: e.offset,
        kind: CompileErrorKind::ParseError,
        message: e.message,
    })?;
    let ast = parser::parse(&tokens).map_err(|e| CompileError {
        item_id: item_id.to_string(),
        offset: e.offset,
        kind: CompileErrorKind::ParseError,
        message: e.message,
    })?;
    compile::compile(&ast, item_id, known_qid)
}

/// One `ident = expression` statement inside a code fragment.
pub struct Assignment {
    pub target: String,
    pub value: Compiled,
}

/// Parse a code fragment as a sequence of `ident = expr` statements
/// separated by `;` or newlines, per §9 ("each code fragment is lowered to
/// a sequence of conditional assignments"). Control flow is not supported —
/// any statement that isn't a plain assignment is `UnsupportedExpression`.
pub fn compile_code_fragment(
    text: &str,
    item_id: &str,
    known_qid: &dyn Fn(&str) -> bool,
) -> Result<Vec<Assignment>, CompileError> {
    let mut out = Vec::new();
    let mut base_offset = 0usize;

    for raw_stmt in text.split(|c| c == ';' || c == '\n') {
        let stmt = raw_stmt.trim();
        if stmt.is_empty() {
            base_offset += raw_stmt.len() + 1;
            continue;
        }

        let eq_pos = stmt.find('=').filter(|&p| {
            // avoid matching ==, !=, <=, >=
            let next = stmt.as_bytes().get(p + 1).copied();
            let prev = if p == 0 { None } else { stmt.as_bytes().get(p - 1).copied() };
            next != Some(b'=') && !matches!(prev, Some(b'=') | Some(b'!') | Some(b'<') | Some(b'>'))
        });

        let Some(eq_pos) = eq_pos else {
            return Err(CompileError {
                item_id: item_id.to_string(),
                offset: base_offset,
                kind: CompileErrorKind::UnsupportedExpression,
                message: format!("code fragment statement is not a plain assignment: '{}'", stmt),
            });
        };

        let target = stmt[..eq_pos].trim();
        if !target.chars().all(|c| c.is_alphanumeric() || c == '_') || target.is_empty() {
            return Err(CompileError {
                item_id: item_id.to_string(),
                offset: base_offset,
                kind: CompileErrorKind::ParseError,
                message: format!("invalid assignment target '{}'", target),
            });
        }

        let rhs_text = &stmt[eq_pos + 1..];
        let value = compile_text(rhs_text, item_id, known_qid)?;
        out.push(Assignment { target: target.to_string(), value });

        base_offset += raw_stmt.len() + 1;
    }

    Ok(out)
}

/// Every local name written by a code fragment, in source order, without
/// attempting to compile the right-hand sides. Used by the builder's first
/// SSA bookkeeping pass, which only needs write positions, not terms.
pub fn write_set(text: &str) -> BTreeSet<String> {
    let mut out = BTreeSet::new();
    for raw_stmt in text.split(|c| c == ';' || c == '\n') {
        let stmt = raw_stmt.trim();
        if let Some(eq_pos) = stmt.find('=') {
            let next = stmt.as_bytes().get(eq_pos + 1).copied();
            if next == Some(b'=') {
                continue;
            }
            let target = stmt[..eq_pos].trim();
            if !target.is_empty() && target.chars().all(|c| c.is_alphanumeric() || c == '_') {
                out.insert(target.to_string());
            }
        }
    }
    out
}
