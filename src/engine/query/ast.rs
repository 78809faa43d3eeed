//! Query AST
//!
//! A closed predicate tree. Every backend compiler matches exhaustively on
//! `Predicate`, so adding an operator means handling it everywhere.

use serde::Serialize;
use serde_json::Value;
use std::fmt;

use crate::engine::error::{Result, TranslateError};

/// Dot-separated path into a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self> {
        if path.is_empty() {
            return Err(TranslateError::MalformedQuery("empty field path".to_string()));
        }
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(TranslateError::MalformedQuery(format!("empty segment in path '{}'", path)));
        }
        if let Some(segment) = segments.iter().find(|s| s.starts_with('$')) {
            return Err(TranslateError::MalformedQuery(format!(
                "operator '{}' used as a path segment in '{}'",
                segment, path
            )));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    /// Path without its first segment; `None` for single-segment paths
    pub fn rest(&self) -> Option<FieldPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[1..].to_vec(),
        })
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Equal paths, or one is a prefix of the other
    pub fn overlaps(&self, other: &FieldPath) -> bool {
        self.segments
            .iter()
            .zip(other.segments.iter())
            .all(|(a, b)| a == b)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.segments.join("."))
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Connective {
    And,
    Or,
    /// Exactly one child
    Not,
    Nor,
}

impl Connective {
    pub fn operator(&self) -> &'static str {
        match self {
            Connective::And => "$and",
            Connective::Or => "$or",
            Connective::Not => "$not",
            Connective::Nor => "$nor",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Regex { pattern: String, options: String },
    Exists(bool),
    /// Operator only the document store can evaluate; the argument is kept verbatim
    DocumentOnly { operator: DocumentOperator, argument: Value },
}

impl Predicate {
    pub fn operator(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "$eq",
            Predicate::Ne(_) => "$ne",
            Predicate::Gt(_) => "$gt",
            Predicate::Gte(_) => "$gte",
            Predicate::Lt(_) => "$lt",
            Predicate::Lte(_) => "$lte",
            Predicate::In(_) => "$in",
            Predicate::Nin(_) => "$nin",
            Predicate::Regex { .. } => "$regex",
            Predicate::Exists(_) => "$exists",
            Predicate::DocumentOnly { operator, .. } => operator.as_str(),
        }
    }

    /// `$ne`, `$nin` and `$exists: false`, which also match entities lacking the value
    pub fn is_negative(&self) -> bool {
        matches!(self, Predicate::Ne(_) | Predicate::Nin(_) | Predicate::Exists(false))
    }

    /// Positive counterpart of a negative predicate
    pub fn positive(&self) -> Option<Predicate> {
        match self {
            Predicate::Ne(value) => Some(Predicate::Eq(value.clone())),
            Predicate::Nin(values) => Some(Predicate::In(values.clone())),
            Predicate::Exists(false) => Some(Predicate::Exists(true)),
            _ => None,
        }
    }

    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            Predicate::Gt(_) | Predicate::Gte(_) | Predicate::Lt(_) | Predicate::Lte(_)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentOperator {
    Type,
    All,
    ElemMatch,
    Size,
    Mod,
}

impl DocumentOperator {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "$type" => Some(DocumentOperator::Type),
            "$all" => Some(DocumentOperator::All),
            "$elemMatch" => Some(DocumentOperator::ElemMatch),
            "$size" => Some(DocumentOperator::Size),
            "$mod" => Some(DocumentOperator::Mod),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentOperator::Type => "$type",
            DocumentOperator::All => "$all",
            DocumentOperator::ElemMatch => "$elemMatch",
            DocumentOperator::Size => "$size",
            DocumentOperator::Mod => "$mod",
        }
    }
}

impl fmt::Display for DocumentOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Comparison {
    pub path: FieldPath,
    pub predicate: Predicate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Node {
    Comparison(Comparison),
    Logical { connective: Connective, children: Vec<Node> },
}

impl Node {
    /// Conjunction of nothing
    pub fn always_true() -> Self {
        Node::Logical {
            connective: Connective::And,
            children: Vec::new(),
        }
    }

    pub fn is_always_true(&self) -> bool {
        matches!(self, Node::Logical { connective: Connective::And, children } if children.is_empty())
    }

    pub fn compare(path: FieldPath, predicate: Predicate) -> Self {
        Node::Comparison(Comparison { path, predicate })
    }

    pub fn logical(connective: Connective, children: Vec<Node>) -> Self {
        Node::Logical { connective, children }
    }

    /// Single children are unwrapped
    pub fn and(mut children: Vec<Node>) -> Self {
        if children.len() == 1 {
            return children.remove(0);
        }
        Node::logical(Connective::And, children)
    }

    pub fn not(child: Node) -> Self {
        Node::logical(Connective::Not, vec![child])
    }
}
