//! Document store compiler
//!
//! The generic filter language is already document-shaped, so compilation
//! re-serializes the AST with resolved tokens. Updates merge the generic
//! assignments into `$set` next to the caller's native operators.

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use super::{ensure_backend, BackendCompiler};
use crate::engine::error::{Result, TranslateError};
use crate::engine::hybrid::NativeExpression;
use crate::engine::model::{BackendModelDescriptor, MappingKind, Resolved};
use crate::engine::query::{first_overlap, native_document, Connective, FieldPath, Node, Predicate, UpdateDocument, UpdateOperator};
use crate::engine::schema::{BackendKind, FieldType};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct DocumentFilter(pub Value);

impl DocumentFilter {
    pub fn native(document: Value) -> Self {
        Self(document)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    fn is_empty(&self) -> bool {
        matches!(&self.0, Value::Object(map) if map.is_empty())
    }
}

impl NativeExpression for DocumentFilter {
    fn always_true(_model: &BackendModelDescriptor) -> Result<Self> {
        Ok(Self(Value::Object(Map::new())))
    }

    fn and(self, other: Self) -> Result<Self> {
        if self.is_empty() {
            return Ok(other);
        }
        if other.is_empty() {
            return Ok(self);
        }
        Ok(Self(json!({"$and": [self.0, other.0]})))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DocumentUpdate {
    pub filter: DocumentFilter,
    /// Operator document, e.g. `{"$set": {...}, "$inc": {...}}`
    pub update: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DocumentCompiler;

impl DocumentCompiler {
    pub fn new() -> Self {
        Self
    }
}

impl BackendCompiler for DocumentCompiler {
    type Filter = DocumentFilter;
    type Update = DocumentUpdate;

    fn backend(&self) -> BackendKind {
        BackendKind::Document
    }

    fn compile_filter(&self, node: &Node, model: &BackendModelDescriptor) -> Result<DocumentFilter> {
        ensure_backend(model, BackendKind::Document)?;
        let filter = DocumentFilter(Value::Object(document(node, model)?));
        debug!(schema = %model.schema, filter = %filter.0, "Compiled document filter");
        Ok(filter)
    }

    fn compile_update(
        &self,
        update: &UpdateDocument,
        filter: &DocumentFilter,
        model: &BackendModelDescriptor,
    ) -> Result<DocumentUpdate> {
        ensure_backend(model, BackendKind::Document)?;
        if update.is_empty() {
            return Err(TranslateError::MalformedQuery("update has no assignments".to_string()));
        }

        let mut set = Map::new();
        let mut targets: Vec<FieldPath> = Vec::new();
        for assignment in &update.assignments {
            let token = token_path(assignment.path.segments(), model, &assignment.path.to_string(), true)?;
            targets.push(FieldPath::parse(&token)?);
            set.insert(token, assignment.value.clone());
        }

        for native in &update.native {
            for (path, arg) in &native.targets {
                targets.push(path.clone());
                if native.operator == UpdateOperator::Rename {
                    if let Value::String(renamed) = arg {
                        targets.push(FieldPath::parse(renamed)?);
                    }
                }
            }
        }
        let paths: Vec<&FieldPath> = targets.iter().collect();
        if let Some(path) = first_overlap(&paths) {
            return Err(TranslateError::ConflictingUpdate(path.to_string()));
        }

        let mut operators = Map::new();
        for native in &update.native {
            operators.insert(native.operator.to_string(), Value::Object(native_document(native)));
        }
        if !set.is_empty() {
            match operators.get_mut(UpdateOperator::Set.as_str()) {
                Some(Value::Object(existing)) => existing.extend(set),
                _ => {
                    operators.insert(UpdateOperator::Set.to_string(), Value::Object(set));
                }
            }
        }

        debug!(schema = %model.schema, operators = operators.len(), "Compiled document update");
        Ok(DocumentUpdate {
            filter: filter.clone(),
            update: Value::Object(operators),
        })
    }
}

fn document(node: &Node, model: &BackendModelDescriptor) -> Result<Map<String, Value>> {
    match node {
        Node::Comparison(comparison) => {
            let path = comparison.path.to_string();
            let token = token_path(comparison.path.segments(), model, &path, false)?;
            let value = match &comparison.predicate {
                Predicate::Eq(value) if !is_operator_like(value) => value.clone(),
                predicate => Value::Object(operator_document(predicate)),
            };
            Ok(Map::from_iter([(token, value)]))
        }
        Node::Logical { connective, children } => match connective {
            Connective::And => {
                let children = children
                    .iter()
                    .map(|child| document(child, model))
                    .collect::<Result<Vec<_>>>()?;
                Ok(merge(children))
            }
            Connective::Or | Connective::Nor => {
                let children = children
                    .iter()
                    .map(|child| document(child, model).map(Value::Object))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Map::from_iter([(connective.operator().to_string(), Value::Array(children))]))
            }
            Connective::Not => not(children, model),
        },
    }
}

/// Sibling documents merged into one; a repeated key keeps them apart under `$and`
fn merge(children: Vec<Map<String, Value>>) -> Map<String, Value> {
    let mut merged = Map::new();
    for child in &children {
        if child.keys().any(|key| merged.contains_key(key)) {
            return Map::from_iter([(
                "$and".to_string(),
                Value::Array(children.into_iter().map(Value::Object).collect()),
            )]);
        }
        merged.extend(child.clone());
    }
    merged
}

/// Field-level `$not` when every child compares the same path, `$nor` otherwise
fn not(children: &[Node], model: &BackendModelDescriptor) -> Result<Map<String, Value>> {
    let comparisons: Option<Vec<_>> = children
        .iter()
        .map(|child| match child {
            Node::Comparison(comparison) => Some(comparison),
            _ => None,
        })
        .collect();

    if let Some(comparisons) = comparisons {
        if let Some(first) = comparisons.first() {
            if comparisons.iter().all(|c| c.path == first.path) {
                let path = first.path.to_string();
                let token = token_path(first.path.segments(), model, &path, false)?;
                let mut operators = Map::new();
                for comparison in &comparisons {
                    operators.extend(operator_document(&comparison.predicate));
                }
                return Ok(Map::from_iter([(token, json!({"$not": operators}))]));
            }
        }
    }

    let inner = document(&Node::and(children.to_vec()), model)?;
    Ok(Map::from_iter([("$nor".to_string(), json!([inner]))]))
}

fn operator_document(predicate: &Predicate) -> Map<String, Value> {
    let mut operators = Map::new();
    match predicate {
        Predicate::Eq(value)
        | Predicate::Ne(value)
        | Predicate::Gt(value)
        | Predicate::Gte(value)
        | Predicate::Lt(value)
        | Predicate::Lte(value) => {
            operators.insert(predicate.operator().to_string(), value.clone());
        }
        Predicate::In(values) | Predicate::Nin(values) => {
            operators.insert(predicate.operator().to_string(), Value::Array(values.clone()));
        }
        Predicate::Regex { pattern, options } => {
            operators.insert("$regex".to_string(), Value::String(pattern.clone()));
            if !options.is_empty() {
                operators.insert("$options".to_string(), Value::String(options.clone()));
            }
        }
        Predicate::Exists(exists) => {
            operators.insert("$exists".to_string(), Value::Bool(*exists));
        }
        Predicate::DocumentOnly { operator, argument } => {
            operators.insert(operator.to_string(), argument.clone());
        }
    }
    operators
}

/// Literal objects with `$` keys would read as operators in shorthand form
fn is_operator_like(value: &Value) -> bool {
    matches!(value, Value::Object(map) if map.keys().any(|k| k.starts_with('$')))
}

/// Dotted token path; relationships are rejected for filters and read-only for updates
fn token_path(segments: &[String], model: &BackendModelDescriptor, path: &str, updating: bool) -> Result<String> {
    let mut tokens: Vec<String> = Vec::with_capacity(segments.len());
    let mut current = model;

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let field = match current.resolve(segment, path)? {
            Resolved::Identity(identity) => {
                if updating {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Document,
                        "identity cannot be updated",
                    ));
                }
                if !last {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Document,
                        "identity has no sub-fields",
                    ));
                }
                tokens.push(identity.native.clone());
                break;
            }
            Resolved::Field(field) => field,
        };
        tokens.push(field.token.clone());

        match &field.kind {
            MappingKind::Scalar(scalar) => {
                if last {
                    break;
                }
                if scalar.field_type != FieldType::Json {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Document,
                        "scalar fields have no sub-fields",
                    ));
                }
                // Schemaless below a json field
                tokens.extend(segments[i + 1..].iter().cloned());
                break;
            }
            MappingKind::Relation(_) if updating => return Err(TranslateError::ReadOnlyRelationship(path.to_string())),
            MappingKind::Relation(_) => {
                return Err(TranslateError::unsupported_field(
                    path,
                    BackendKind::Document,
                    "related documents are fetched separately and cannot be filtered on",
                ))
            }
            MappingKind::Embedded(embedded) => current = &embedded.model,
        }
    }
    Ok(tokens.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{CompilerOptions, ModelCache, ModelRegistry};
    use crate::engine::query::QueryParser;
    use crate::engine::schema::{
        CanonicalField, Cardinality, EmbeddingField, RelationshipField, SchemaCatalog, SchemaDescriptor,
    };
    use std::sync::Arc;

    fn model() -> Arc<BackendModelDescriptor> {
        let catalog = SchemaCatalog::new()
            .with(
                SchemaDescriptor::new("Book")
                    .field(CanonicalField::new("title", FieldType::String))
                    .field(CanonicalField::new("year", FieldType::Integer)),
            )
            .unwrap()
            .with(SchemaDescriptor::new("Owner").field(CanonicalField::new("email", FieldType::String)))
            .unwrap()
            .with(
                SchemaDescriptor::new("Library")
                    .field(CanonicalField::new("name", FieldType::String))
                    .field(CanonicalField::new("rating", FieldType::Float))
                    .field(CanonicalField::new("extra", FieldType::Json))
                    .field(EmbeddingField::new("books", Cardinality::Many, "Book"))
                    .field(RelationshipField::new("owner", Cardinality::One, "Owner")),
            )
            .unwrap();
        ModelRegistry::with_cache(catalog, CompilerOptions::default(), Arc::new(ModelCache::new()))
            .unwrap()
            .descriptor("Library", BackendKind::Document)
            .unwrap()
    }

    fn compile(query: Value) -> Result<Value> {
        DocumentCompiler::new()
            .compile_filter(&QueryParser::parse(&query)?, &model())
            .map(DocumentFilter::into_value)
    }

    fn update(update: Value) -> Result<Value> {
        let model = model();
        let filter = DocumentFilter::always_true(&model)?;
        DocumentCompiler::new()
            .compile_update(&UpdateDocument::parse(&update)?, &filter, &model)
            .map(|compiled| compiled.update)
    }

    #[test]
    fn test_hairora_dune() {
        assert_eq!(
            compile(json!({"name": {"$eq": "Hairora"}, "books.title": {"$eq": "Dune"}})).unwrap(),
            json!({"name": "Hairora", "books.title": "Dune"})
        );
    }

    #[test]
    fn test_empty_filter() {
        assert_eq!(compile(json!({})).unwrap(), json!({}));
    }

    #[test]
    fn test_identity_and_json_paths() {
        assert_eq!(compile(json!({"id": "abc"})).unwrap(), json!({"_id": "abc"}));
        assert_eq!(
            compile(json!({"extra.colors.primary": "red"})).unwrap(),
            json!({"extra.colors.primary": "red"})
        );
    }

    #[test]
    fn test_repeated_keys_fall_back_to_and() {
        assert_eq!(
            compile(json!({"rating": {"$gt": 3, "$lt": 5}})).unwrap(),
            json!({"$and": [{"rating": {"$gt": 3}}, {"rating": {"$lt": 5}}]})
        );
    }

    #[test]
    fn test_not_forms() {
        assert_eq!(
            compile(json!({"name": {"$not": {"$regex": "^H", "$options": "i"}}})).unwrap(),
            json!({"name": {"$not": {"$regex": "^H", "$options": "i"}}})
        );
        assert_eq!(
            compile(json!({"$not": {"name": "A", "rating": 3}})).unwrap(),
            json!({"$nor": [{"name": "A", "rating": 3}]})
        );
        assert_eq!(
            compile(json!({"$nor": [{"name": "A"}, {"name": "B"}]})).unwrap(),
            json!({"$nor": [{"name": "A"}, {"name": "B"}]})
        );
    }

    #[test]
    fn test_regex_is_native() {
        assert_eq!(
            compile(json!({"books.title": {"$regex": "^Du"}})).unwrap(),
            json!({"books.title": {"$regex": "^Du"}})
        );
    }

    #[test]
    fn test_document_only_operators_pass_through() {
        assert_eq!(
            compile(json!({"name": {"$exists": true}, "books.title": {"$all": ["Dune", "Emma"]}})).unwrap(),
            json!({"name": {"$exists": true}, "books.title": {"$all": ["Dune", "Emma"]}})
        );
        assert_eq!(
            compile(json!({"books": {"$size": 2}, "rating": {"$mod": [2, 0], "$type": "double"}})).unwrap(),
            json!({"books": {"$size": 2}, "$and": [{"rating": {"$mod": [2, 0]}}, {"rating": {"$type": "double"}}]})
        );
        assert_eq!(
            compile(json!({"books": {"$elemMatch": {"year": {"$gt": 1960}}}})).unwrap(),
            json!({"books": {"$elemMatch": {"year": {"$gt": 1960}}}})
        );
        assert_eq!(
            compile(json!({"name": {"$not": {"$exists": true}}})).unwrap(),
            json!({"name": {"$not": {"$exists": true}}})
        );
    }

    #[test]
    fn test_relationship_rejected() {
        assert!(matches!(
            compile(json!({"owner.email": "x"})),
            Err(TranslateError::UnsupportedField { .. })
        ));
    }

    #[test]
    fn test_update_merges_set() {
        assert_eq!(
            update(json!({"name": "Hairora", "$set": {"rating": 5}, "$inc": {"visits": 1}})).unwrap(),
            json!({"$set": {"rating": 5, "name": "Hairora"}, "$inc": {"visits": 1}})
        );
    }

    #[test]
    fn test_update_conflicts() {
        assert!(matches!(
            update(json!({"books": [], "$push": {"books.title": "x"}})),
            Err(TranslateError::ConflictingUpdate(_))
        ));
        assert!(matches!(
            update(json!({"$inc": {"rating": 1}, "$mul": {"rating": 2}})),
            Err(TranslateError::ConflictingUpdate(_))
        ));
        assert!(matches!(
            update(json!({"$rename": {"name": "title"}, "title": "x"})),
            Err(TranslateError::ConflictingUpdate(_))
        ));
    }

    #[test]
    fn test_update_rejections() {
        assert!(matches!(
            update(json!({"owner": "o1"})),
            Err(TranslateError::ReadOnlyRelationship(_))
        ));
        assert!(matches!(
            update(json!({"id": "x"})),
            Err(TranslateError::UnsupportedField { .. })
        ));
        assert!(matches!(update(json!({})), Err(TranslateError::MalformedQuery(_))));
    }
}
