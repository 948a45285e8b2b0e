//! YAML → [`Questionnaire`] (§4.7, §6 input format).

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::StructuralError;
use crate::model::{Domain, Item, ItemKind, PredicateClause, Questionnaire};

#[derive(Debug, Deserialize)]
struct Document {
    #[serde(rename = "qmlVersion")]
    qml_version: Option<String>,
    questionnaire: RawQuestionnaire,
}

#[derive(Debug, Deserialize)]
struct RawQuestionnaire {
    title: Option<String>,
    #[serde(rename = "codeInit")]
    code_init: Option<String>,
    blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
struct RawBlock {
    #[allow(dead_code)]
    id: Option<String>,
    #[allow(dead_code)]
    title: Option<String>,
    #[serde(default)]
    items: Vec<RawItem>,
}

#[derive(Debug, Deserialize)]
struct RawItem {
    id: String,
    kind: String,
    #[allow(dead_code)]
    title: Option<String>,
    input: Option<RawInput>,
    #[serde(default)]
    precondition: Vec<RawClause>,
    #[serde(default)]
    postcondition: Vec<RawClause>,
    #[serde(rename = "codeBlock")]
    code_block: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawInput {
    #[allow(dead_code)]
    control: Option<String>,
    min: Option<i64>,
    max: Option<i64>,
    #[allow(dead_code)]
    step: Option<i64>,
    labels: Option<BTreeMap<i64, String>>,
    options: Option<Vec<RawOption>>,
}

#[derive(Debug, Deserialize)]
struct RawOption {
    value: i64,
    #[allow(dead_code)]
    label: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawClause {
    predicate: String,
    hint: Option<String>,
}

/// The only major version this analyzer understands. Unknown majors are a
/// schema error rather than a best-effort parse — the wire format is small
/// enough that silent drift is worse than a hard stop.
const SUPPORTED_QML_MAJOR: &str = "1";

pub fn load(yaml: &str) -> Result<Questionnaire, StructuralError> {
    let doc: Document = serde_yaml::from_str(yaml).map_err(|e| StructuralError::SchemaError {
        message: e.to_string(),
    })?;

    if let Some(version) = &doc.qml_version {
        let major = version.split('.').next().unwrap_or(version);
        if major != SUPPORTED_QML_MAJOR {
            return Err(StructuralError::SchemaError {
                message: format!("unsupported qmlVersion major '{}'", major),
            });
        }
    }

    let mut items = Vec::new();
    let mut origin_index = 0usize;
    for block in &doc.questionnaire.blocks {
        for raw in &block.items {
            items.push(to_item(raw, origin_index)?);
            origin_index += 1;
        }
    }

    if items.is_empty() {
        return Err(StructuralError::EmptyQuestionnaire);
    }

    let mut seen = std::collections::HashSet::new();
    for it in &items {
        if !seen.insert(it.id.clone()) {
            return Err(StructuralError::DuplicateItemId { id: it.id.clone() });
        }
    }

    Ok(Questionnaire {
        title: doc.questionnaire.title.unwrap_or_default(),
        code_init: doc.questionnaire.code_init,
        items,
    })
}

fn to_item(raw: &RawItem, origin_index: usize) -> Result<Item, StructuralError> {
    let kind = match raw.kind.as_str() {
        "Question" => ItemKind::Question,
        "Comment" => ItemKind::Comment,
        "Group" => ItemKind::Group,
        other => {
            return Err(StructuralError::SchemaError {
                message: format!("item '{}': unknown kind '{}'", raw.id, other),
            })
        }
    };

    let domain = if kind == ItemKind::Question {
        Some(domain_from_input(raw)?)
    } else {
        None
    };

    Ok(Item {
        id: raw.id.clone(),
        kind,
        domain,
        precondition: raw.precondition.iter().map(to_clause).collect(),
        postcondition: raw.postcondition.iter().map(to_clause).collect(),
        code: raw.code_block.clone(),
        origin_index,
    })
}

fn to_clause(raw: &RawClause) -> PredicateClause {
    PredicateClause {
        predicate: raw.predicate.clone(),
        hint: raw.hint.clone(),
    }
}

fn domain_from_input(raw: &RawItem) -> Result<Domain, StructuralError> {
    let Some(input) = &raw.input else {
        return Err(StructuralError::SchemaError {
            message: format!("item '{}': Question requires an 'input' block", raw.id),
        });
    };

    if let Some(options) = &input.options {
        let values: Vec<i64> = options.iter().map(|o| o.value).collect();
        if values.is_empty() {
            return Err(StructuralError::EmptyDomain { item_id: raw.id.clone() });
        }
        return Ok(Domain::Enum(values));
    }

    if let Some(labels) = &input.labels {
        let values: Vec<i64> = labels.keys().copied().collect();
        if values.is_empty() {
            return Err(StructuralError::EmptyDomain { item_id: raw.id.clone() });
        }
        return Ok(Domain::Enum(values));
    }

    match (input.min, input.max) {
        (Some(lo), Some(hi)) => {
            if lo > hi {
                return Err(StructuralError::EmptyDomain { item_id: raw.id.clone() });
            }
            Ok(Domain::Integer { lo, hi })
        }
        (None, None) => Ok(Domain::default_integer()),
        _ => Err(StructuralError::SchemaError {
            message: format!("item '{}': 'min' and 'max' must both be present or both absent", raw.id),
        }),
    }
}
