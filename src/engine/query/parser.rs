//! Query Parser
//!
//! Parses the generic nested filter document into the Query AST.
//!
//! ```text
//! { "name": "Hairora", "books.title": { "$in": ["Dune", "Emma"] },
//!   "$or": [ { "rating": { "$gte": 4 } }, { "$not": { "tags": "draft" } } ] }
//! ```

use serde_json::{Map, Value};

use super::ast::{Connective, DocumentOperator, FieldPath, Node, Predicate};
use crate::engine::error::{Result, TranslateError};

/// Letters accepted in `$options`
pub const REGEX_OPTIONS: &str = "imsxu";

const FIELD_OPERATORS: &[&str] = &[
    "$eq", "$ne", "$gt", "$gte", "$lt", "$lte", "$in", "$nin", "$regex", "$options", "$exists", "$type", "$all",
    "$elemMatch", "$size", "$mod",
];

pub struct QueryParser;

impl QueryParser {
    /// Parse a filter document; `{}` is always-true
    pub fn parse(document: &Value) -> Result<Node> {
        match document {
            Value::Object(map) => parse_document(map),
            Value::Null => Ok(Node::always_true()),
            other => Err(TranslateError::MalformedQuery(format!(
                "filter must be an object, got {}",
                other
            ))),
        }
    }

    pub fn parse_str(document: &str) -> Result<Node> {
        let value: Value = serde_json::from_str(document)?;
        Self::parse(&value)
    }
}

fn parse_document(map: &Map<String, Value>) -> Result<Node> {
    let mut children = Vec::with_capacity(map.len());

    for (key, value) in map {
        let node = match key.as_str() {
            "$and" => parse_list(Connective::And, value)?,
            "$or" => parse_list(Connective::Or, value)?,
            "$nor" => parse_list(Connective::Nor, value)?,
            "$not" => match value {
                Value::Object(inner) => Node::not(parse_document(inner)?),
                _ => return Err(malformed("$not expects a single sub-document")),
            },
            key if FIELD_OPERATORS.contains(&key) => {
                return Err(malformed(format!("{} must be applied to a field", key)))
            }
            key if key.starts_with('$') => return Err(TranslateError::UnknownOperator(key.to_string())),
            key => parse_field(FieldPath::parse(key)?, value)?,
        };
        children.push(node);
    }

    Ok(Node::and(children))
}

fn parse_list(connective: Connective, value: &Value) -> Result<Node> {
    let Value::Array(items) = value else {
        return Err(malformed(format!("{} expects a list of sub-documents", connective.operator())));
    };
    if items.is_empty() {
        return Err(malformed(format!("{} expects a non-empty list", connective.operator())));
    }

    let children = items
        .iter()
        .map(|item| match item {
            Value::Object(inner) => parse_document(inner),
            _ => Err(malformed(format!("{} items must be sub-documents", connective.operator()))),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Node::logical(connective, children))
}

fn parse_field(path: FieldPath, value: &Value) -> Result<Node> {
    match value {
        Value::Object(ops) if ops.keys().any(|k| k.starts_with('$')) => {
            if !ops.keys().all(|k| k.starts_with('$')) {
                return Err(malformed(format!(
                    "'{}' mixes operators and field names in one document",
                    path
                )));
            }
            Ok(Node::and(parse_operators(&path, ops)?))
        }
        // Anything else, including nested objects, is a literal for equality
        literal => Ok(Node::compare(path, Predicate::Eq(literal.clone()))),
    }
}

fn parse_operators(path: &FieldPath, ops: &Map<String, Value>) -> Result<Vec<Node>> {
    let mut nodes = Vec::with_capacity(ops.len());

    if ops.contains_key("$options") && !ops.contains_key("$regex") {
        return Err(malformed(format!("'{}' has $options without $regex", path)));
    }

    for (op, value) in ops {
        let predicate = match op.as_str() {
            "$eq" => Predicate::Eq(value.clone()),
            "$ne" => Predicate::Ne(value.clone()),
            "$gt" => Predicate::Gt(ordered(path, op, value)?),
            "$gte" => Predicate::Gte(ordered(path, op, value)?),
            "$lt" => Predicate::Lt(ordered(path, op, value)?),
            "$lte" => Predicate::Lte(ordered(path, op, value)?),
            "$in" => Predicate::In(array(path, op, value)?),
            "$nin" => Predicate::Nin(array(path, op, value)?),
            "$regex" => regex(path, value, ops.get("$options"))?,
            "$options" => continue,
            "$exists" => match value {
                Value::Bool(exists) => Predicate::Exists(*exists),
                _ => return Err(malformed(format!("$exists on '{}' expects true or false", path))),
            },
            "$not" => {
                let Value::Object(inner) = value else {
                    return Err(malformed(format!("$not on '{}' expects an operator document", path)));
                };
                if inner.is_empty() || !inner.keys().all(|k| k.starts_with('$')) {
                    return Err(malformed(format!("$not on '{}' expects an operator document", path)));
                }
                nodes.push(Node::not(Node::and(parse_operators(path, inner)?)));
                continue;
            }
            other => match DocumentOperator::from_str(other) {
                Some(operator) => document_only(path, operator, value)?,
                None => return Err(TranslateError::UnknownOperator(other.to_string())),
            },
        };
        nodes.push(Node::compare(path.clone(), predicate));
    }

    Ok(nodes)
}

fn ordered(path: &FieldPath, op: &str, value: &Value) -> Result<Value> {
    match value {
        Value::Number(_) | Value::String(_) => Ok(value.clone()),
        _ => Err(malformed(format!("{} on '{}' expects a number or string", op, path))),
    }
}

fn array(path: &FieldPath, op: &str, value: &Value) -> Result<Vec<Value>> {
    match value {
        Value::Array(items) => Ok(items.clone()),
        _ => Err(malformed(format!("{} on '{}' expects an array", op, path))),
    }
}

fn regex(path: &FieldPath, pattern: &Value, options: Option<&Value>) -> Result<Predicate> {
    let Value::String(pattern) = pattern else {
        return Err(malformed(format!("$regex on '{}' expects a string", path)));
    };
    let options = match options {
        None => String::new(),
        Some(Value::String(options)) if options.chars().all(|c| REGEX_OPTIONS.contains(c)) => options.clone(),
        Some(other) => {
            return Err(malformed(format!(
                "$options on '{}' must be drawn from '{}', got {}",
                path, REGEX_OPTIONS, other
            )))
        }
    };
    Ok(Predicate::Regex {
        pattern: pattern.clone(),
        options,
    })
}

/// Shape checks only; evaluation is left to the document store
fn document_only(path: &FieldPath, operator: DocumentOperator, value: &Value) -> Result<Predicate> {
    let valid = match operator {
        DocumentOperator::Type => match value {
            Value::Array(items) => !items.is_empty() && items.iter().all(|v| v.is_string() || v.is_number()),
            other => other.is_string() || other.is_number(),
        },
        DocumentOperator::All => value.is_array(),
        DocumentOperator::ElemMatch => value.is_object(),
        DocumentOperator::Size => value.is_u64(),
        DocumentOperator::Mod => {
            matches!(value, Value::Array(items) if items.len() == 2 && items.iter().all(Value::is_number))
        }
    };
    if !valid {
        return Err(malformed(format!("{} on '{}' has an invalid argument {}", operator, path, value)));
    }
    Ok(Predicate::DocumentOnly {
        operator,
        argument: value.clone(),
    })
}

fn malformed(message: impl Into<String>) -> TranslateError {
    TranslateError::MalformedQuery(message.into())
}
