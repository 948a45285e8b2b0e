//! Questionnaire data model.
//!
//! Produced by `loader`, consumed by every later stage. Once a
//! [`Questionnaire`] is built it is never mutated — the static builder reads
//! it to produce `B★` and the per-item terms, nothing downstream writes
//! back into it.

use std::collections::BTreeMap;

/// The kind of a questionnaire item.
///
/// Only `Question` carries an outcome variable; `Comment` and `Group` exist
/// purely for presentation and contribute nothing to analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Question,
    Comment,
    Group,
}

/// The domain of a `Question`'s outcome variable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Domain {
    /// Inclusive integer range `[lo, hi]`.
    Integer { lo: i64, hi: i64 },
    /// Finite integer-labeled choice set.
    Enum(Vec<i64>),
    /// Boolean.
    Boolean,
    /// Unconstrained integer. Only valid when no predicate references the
    /// item's outcome — the loader does not enforce this; the builder does,
    /// by rejecting a `Free` domain that appears in any edge.
    Free,
}

impl Domain {
    /// The default domain for an `Editbox`/`Slider` control with no
    /// `min`/`max` given: `Integer[-2^31, 2^31-1]`.
    pub fn default_integer() -> Self {
        Domain::Integer {
            lo: i64::from(i32::MIN),
            hi: i64::from(i32::MAX),
        }
    }
}

/// One precondition or postcondition clause: an expression string plus an
/// optional human-readable hint shown alongside classification results.
#[derive(Debug, Clone)]
pub struct PredicateClause {
    pub predicate: String,
    pub hint: Option<String>,
}

/// A single questionnaire item, `i = (id, kind, domain, P_i, Q_i, code_i,
/// origin_index)`.
#[derive(Debug, Clone)]
pub struct Item {
    pub id: String,
    pub kind: ItemKind,
    /// `None` for `Comment`/`Group`.
    pub domain: Option<Domain>,
    /// `P_i`. Empty list means `true`.
    pub precondition: Vec<PredicateClause>,
    /// `Q_i`. Empty list means `true`.
    pub postcondition: Vec<PredicateClause>,
    /// Optional post-response code fragment, analyzed only as a write set.
    pub code: Option<String>,
    /// Position in the source file; topological order tie-breaker.
    pub origin_index: usize,
}

impl Item {
    /// Whether this item carries an outcome variable.
    pub fn has_outcome(&self) -> bool {
        self.kind == ItemKind::Question
    }
}

/// `Q = (I, B★, order)`.
///
/// `order` is filled in by `topology` after construction; a freshly loaded
/// questionnaire carries items in file order only.
#[derive(Debug, Clone)]
pub struct Questionnaire {
    pub title: String,
    /// Optional top-level init code, analyzed for writes only.
    pub code_init: Option<String>,
    pub items: Vec<Item>,
}

impl Questionnaire {
    /// Look up an item by id.
    pub fn item(&self, id: &str) -> Option<&Item> {
        self.items.iter().find(|it| it.id == id)
    }

    /// Index of an item by id, in file order (not topological order).
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.items.iter().position(|it| it.id == id)
    }

    /// Map from item id to its declared `Domain`, for items that have one.
    pub fn domains(&self) -> BTreeMap<&str, &Domain> {
        self.items
            .iter()
            .filter_map(|it| it.domain.as_ref().map(|d| (it.id.as_str(), d)))
            .collect()
    }
}
