//! Update AST
//!
//! Generic `path -> literal` assignments, plus native operator documents
//! that only the document backend accepts.

use serde::Serialize;
use serde_json::{Map, Value};
use std::fmt;

use super::ast::FieldPath;
use crate::engine::error::{Result, TranslateError};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Assignment {
    pub path: FieldPath,
    pub value: Value,
}

/// Native document update operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum UpdateOperator {
    Set,
    Unset,
    Inc,
    Mul,
    Min,
    Max,
    Rename,
    CurrentDate,
    AddToSet,
    Push,
    Pop,
    Pull,
    PullAll,
    SetOnInsert,
}

impl UpdateOperator {
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "$set" => Some(UpdateOperator::Set),
            "$unset" => Some(UpdateOperator::Unset),
            "$inc" => Some(UpdateOperator::Inc),
            "$mul" => Some(UpdateOperator::Mul),
            "$min" => Some(UpdateOperator::Min),
            "$max" => Some(UpdateOperator::Max),
            "$rename" => Some(UpdateOperator::Rename),
            "$currentDate" => Some(UpdateOperator::CurrentDate),
            "$addToSet" => Some(UpdateOperator::AddToSet),
            "$push" => Some(UpdateOperator::Push),
            "$pop" => Some(UpdateOperator::Pop),
            "$pull" => Some(UpdateOperator::Pull),
            "$pullAll" => Some(UpdateOperator::PullAll),
            "$setOnInsert" => Some(UpdateOperator::SetOnInsert),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOperator::Set => "$set",
            UpdateOperator::Unset => "$unset",
            UpdateOperator::Inc => "$inc",
            UpdateOperator::Mul => "$mul",
            UpdateOperator::Min => "$min",
            UpdateOperator::Max => "$max",
            UpdateOperator::Rename => "$rename",
            UpdateOperator::CurrentDate => "$currentDate",
            UpdateOperator::AddToSet => "$addToSet",
            UpdateOperator::Push => "$push",
            UpdateOperator::Pop => "$pop",
            UpdateOperator::Pull => "$pull",
            UpdateOperator::PullAll => "$pullAll",
            UpdateOperator::SetOnInsert => "$setOnInsert",
        }
    }
}

impl fmt::Display for UpdateOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NativeUpdate {
    pub operator: UpdateOperator,
    /// Target paths with their operator arguments, in document order
    pub targets: Vec<(FieldPath, Value)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UpdateDocument {
    pub assignments: Vec<Assignment>,
    pub native: Vec<NativeUpdate>,
}

impl UpdateDocument {
    /// Parse `{"path": literal, "$op": {"path": arg}}`. Top-level `$` keys
    /// are native operators; everything else is a generic assignment.
    pub fn parse(document: &Value) -> Result<Self> {
        let Value::Object(map) = document else {
            return Err(TranslateError::MalformedQuery("update must be an object".to_string()));
        };

        let mut update = UpdateDocument::default();
        for (key, value) in map {
            if key.starts_with('$') {
                let operator =
                    UpdateOperator::from_str(key).ok_or_else(|| TranslateError::UnknownOperator(key.clone()))?;
                update.native.push(NativeUpdate {
                    operator,
                    targets: native_targets(operator, value)?,
                });
            } else {
                update.assignments.push(Assignment {
                    path: FieldPath::parse(key)?,
                    value: value.clone(),
                });
            }
        }
        Ok(update)
    }

    pub fn assign(mut self, path: &str, value: Value) -> Result<Self> {
        self.assignments.push(Assignment {
            path: FieldPath::parse(path)?,
            value,
        });
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty() && self.native.is_empty()
    }

    pub fn has_native(&self) -> bool {
        !self.native.is_empty()
    }

    /// Reject generic assignments where one path equals or contains another
    pub fn check_assignment_conflicts(&self) -> Result<()> {
        let paths: Vec<&FieldPath> = self.assignments.iter().map(|a| &a.path).collect();
        first_overlap(&paths).map_or(Ok(()), |path| Err(TranslateError::ConflictingUpdate(path.to_string())))
    }
}

fn native_targets(operator: UpdateOperator, value: &Value) -> Result<Vec<(FieldPath, Value)>> {
    let Value::Object(targets) = value else {
        return Err(TranslateError::MalformedQuery(format!(
            "{} expects a document of field paths",
            operator
        )));
    };
    targets
        .iter()
        .map(|(path, arg)| Ok((FieldPath::parse(path)?, arg.clone())))
        .collect::<Result<Vec<_>>>()
        .and_then(|targets| check_not_empty(operator, targets))
}

fn check_not_empty(operator: UpdateOperator, targets: Vec<(FieldPath, Value)>) -> Result<Vec<(FieldPath, Value)>> {
    if targets.is_empty() {
        return Err(TranslateError::MalformedQuery(format!("{} has no targets", operator)));
    }
    Ok(targets)
}

/// The later of the first pair of paths that overlap
pub fn first_overlap<'a>(paths: &[&'a FieldPath]) -> Option<&'a FieldPath> {
    for (i, path) in paths.iter().enumerate() {
        if paths[..i].iter().any(|earlier| earlier.overlaps(path)) {
            return Some(*path);
        }
    }
    None
}

/// Render a native update back into its operator document
pub fn native_document(update: &NativeUpdate) -> Map<String, Value> {
    update
        .targets
        .iter()
        .map(|(path, arg)| (path.to_string(), arg.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_mixed_update() {
        let update = UpdateDocument::parse(&json!({
            "name": "Hairora",
            "$inc": {"visits": 1},
            "$push": {"tags": {"$each": ["a", "b"]}}
        }))
        .unwrap();

        assert_eq!(update.assignments.len(), 1);
        assert_eq!(update.assignments[0].path.to_string(), "name");
        assert_eq!(update.native.len(), 2);
        assert_eq!(update.native[0].operator, UpdateOperator::Inc);
        assert_eq!(update.native[1].targets[0].1, json!({"$each": ["a", "b"]}));
    }

    #[test]
    fn test_unknown_update_operator() {
        assert!(matches!(
            UpdateDocument::parse(&json!({"$explode": {"a": 1}})),
            Err(TranslateError::UnknownOperator(_))
        ));
    }

    #[test]
    fn test_operator_requires_document() {
        assert!(matches!(
            UpdateDocument::parse(&json!({"$set": 5})),
            Err(TranslateError::MalformedQuery(_))
        ));
        assert!(matches!(
            UpdateDocument::parse(&json!({"$set": {}})),
            Err(TranslateError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_assignment_prefix_conflict() {
        let update = UpdateDocument::parse(&json!({"address": {"city": "Oslo"}, "address.city": "Bergen"})).unwrap();
        assert!(matches!(
            update.check_assignment_conflicts(),
            Err(TranslateError::ConflictingUpdate(path)) if path == "address.city"
        ));

        let disjoint = UpdateDocument::parse(&json!({"address.city": "Oslo", "address.zip": "0150"})).unwrap();
        assert!(disjoint.check_assignment_conflicts().is_ok());
    }
}
