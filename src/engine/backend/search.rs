//! Search store compiler
//!
//! Filters compile to a RediSearch-style query expression over indexed
//! fields. Only fields declared `index` or `full_text_search`, and the
//! identity, can be queried. The field kind decides how a comparison is
//! spelled:
//!
//! - numeric (`integer`, `float`): `@rating:[4 +inf]`
//! - full-text strings: `@summary:"desert planet"`
//! - everything else is a tag: `@name:{Hairora}`
//!
//! Updates are JSON path assignments on the stored document.

use serde::Serialize;
use serde_json::{Number, Value};
use std::fmt;
use tracing::debug;

use super::{ensure_backend, BackendCompiler};
use crate::engine::error::{Result, TranslateError};
use crate::engine::hybrid::NativeExpression;
use crate::engine::model::{BackendModelDescriptor, MappingKind, Resolved, ScalarMapping};
use crate::engine::query::{Connective, Node, Predicate, UpdateDocument};
use crate::engine::schema::{BackendKind, Cardinality, FieldType};

/// One end of a numeric range
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Bound {
    Unbounded,
    Inclusive(Number),
    Exclusive(Number),
}

impl Bound {
    fn render(&self, infinity: &str) -> String {
        match self {
            Bound::Unbounded => infinity.to_string(),
            Bound::Inclusive(n) => n.to_string(),
            Bound::Exclusive(n) => format!("({}", n),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", content = "args", rename_all = "snake_case")]
pub enum SearchExpr {
    /// Every document in the index
    All,
    Nothing,
    Tag { field: String, values: Vec<String> },
    /// Exact phrase on a full-text field
    Text { field: String, phrase: String },
    Range { field: String, min: Bound, max: Bound },
    Missing { field: String },
    And(Vec<SearchExpr>),
    Or(Vec<SearchExpr>),
    Not(Box<SearchExpr>),
    /// Caller-written query fragment
    Raw(String),
}

impl SearchExpr {
    pub fn and(terms: Vec<SearchExpr>) -> SearchExpr {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SearchExpr::All => {}
                SearchExpr::Nothing => return SearchExpr::Nothing,
                SearchExpr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => SearchExpr::All,
            1 => flat.remove(0),
            _ => SearchExpr::And(flat),
        }
    }

    pub fn or(terms: Vec<SearchExpr>) -> SearchExpr {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SearchExpr::Nothing => {}
                SearchExpr::All => return SearchExpr::All,
                SearchExpr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => SearchExpr::Nothing,
            1 => flat.remove(0),
            _ => SearchExpr::Or(flat),
        }
    }

    pub fn not(expr: SearchExpr) -> SearchExpr {
        match expr {
            SearchExpr::All => SearchExpr::Nothing,
            SearchExpr::Nothing => SearchExpr::All,
            SearchExpr::Not(inner) => *inner,
            other => SearchExpr::Not(Box::new(other)),
        }
    }
}

impl fmt::Display for SearchExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchExpr::All => write!(f, "*"),
            SearchExpr::Nothing => write!(f, "(-*)"),
            SearchExpr::Tag { field, values } => {
                let values: Vec<String> = values.iter().map(|v| escape_tag(v)).collect();
                write!(f, "{}:{{{}}}", field_ref(field), values.join("|"))
            }
            SearchExpr::Text { field, phrase } => {
                write!(f, "{}:\"{}\"", field_ref(field), phrase.replace('"', "\\\""))
            }
            SearchExpr::Range { field, min, max } => {
                write!(f, "{}:[{} {}]", field_ref(field), min.render("-inf"), max.render("+inf"))
            }
            SearchExpr::Missing { field } => write!(f, "ismissing({})", field_ref(field)),
            SearchExpr::And(terms) => write_terms(f, terms, " "),
            SearchExpr::Or(terms) => write_terms(f, terms, " | "),
            SearchExpr::Not(inner) => write!(f, "-{}", inner),
            SearchExpr::Raw(query) => write!(f, "({})", query),
        }
    }
}

fn write_terms(f: &mut fmt::Formatter<'_>, terms: &[SearchExpr], separator: &str) -> fmt::Result {
    let terms: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
    write!(f, "({})", terms.join(separator))
}

/// `@books\.title` for the dotted token `books.title`
fn field_ref(field: &str) -> String {
    format!("@{}", field.replace('.', "\\."))
}

fn escape_tag(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if c.is_ascii_punctuation() || c.is_whitespace() {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// A compiled query against one search index
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchQuery {
    pub index: String,
    pub expr: SearchExpr,
}

impl SearchQuery {
    /// Raw query text, passed through untouched
    pub fn native(model: &BackendModelDescriptor, query: &str) -> Self {
        Self {
            index: model.container.clone(),
            expr: SearchExpr::Raw(query.to_string()),
        }
    }
}

impl fmt::Display for SearchQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expr)
    }
}

impl NativeExpression for SearchQuery {
    fn always_true(model: &BackendModelDescriptor) -> Result<Self> {
        Ok(Self {
            index: model.container.clone(),
            expr: SearchExpr::All,
        })
    }

    fn and(self, other: Self) -> Result<Self> {
        if self.index != other.index {
            return Err(TranslateError::MalformedQuery(format!(
                "cannot combine a query on index '{}' with one on '{}'",
                self.index, other.index
            )));
        }
        Ok(Self {
            index: self.index,
            expr: SearchExpr::and(vec![self.expr, other.expr]),
        })
    }
}

/// `$.books[*].title = value`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JsonAssignment {
    pub path: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchUpdate {
    /// Documents the assignments apply to
    pub query: SearchQuery,
    pub assignments: Vec<JsonAssignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FieldKind {
    Numeric,
    Tag,
    Text,
}

impl FieldKind {
    fn of(scalar: &ScalarMapping) -> Self {
        if scalar.primary_key {
            FieldKind::Tag
        } else if scalar.field_type.is_numeric() {
            FieldKind::Numeric
        } else if scalar.full_text && scalar.field_type == FieldType::String {
            FieldKind::Text
        } else {
            FieldKind::Tag
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SearchCompiler;

impl SearchCompiler {
    pub fn new() -> Self {
        Self
    }

    fn node(&self, node: &Node, model: &BackendModelDescriptor) -> Result<SearchExpr> {
        match node {
            Node::Comparison(comparison) => {
                let path = comparison.path.to_string();
                comparison_expr(comparison.path.segments(), &comparison.predicate, model, "", &path)
            }
            Node::Logical { connective, children } => {
                let terms = children
                    .iter()
                    .map(|child| self.node(child, model))
                    .collect::<Result<Vec<_>>>()?;
                Ok(match connective {
                    Connective::And => SearchExpr::and(terms),
                    Connective::Or => SearchExpr::or(terms),
                    Connective::Not => SearchExpr::not(SearchExpr::and(terms)),
                    Connective::Nor => SearchExpr::not(SearchExpr::or(terms)),
                })
            }
        }
    }
}

impl BackendCompiler for SearchCompiler {
    type Filter = SearchQuery;
    type Update = SearchUpdate;

    fn backend(&self) -> BackendKind {
        BackendKind::Search
    }

    fn compile_filter(&self, node: &Node, model: &BackendModelDescriptor) -> Result<SearchQuery> {
        ensure_backend(model, BackendKind::Search)?;
        let query = SearchQuery {
            index: model.container.clone(),
            expr: self.node(node, model)?,
        };
        debug!(schema = %model.schema, query = %query, "Compiled search filter");
        Ok(query)
    }

    fn compile_update(
        &self,
        update: &UpdateDocument,
        filter: &SearchQuery,
        model: &BackendModelDescriptor,
    ) -> Result<SearchUpdate> {
        ensure_backend(model, BackendKind::Search)?;
        if let Some(native) = update.native.first() {
            return Err(TranslateError::unsupported_operator(
                native.operator.as_str(),
                BackendKind::Search,
                "only plain assignments can be applied to stored documents",
            ));
        }
        update.check_assignment_conflicts()?;

        let assignments = update
            .assignments
            .iter()
            .map(|assignment| {
                let path = assignment.path.to_string();
                Ok(JsonAssignment {
                    path: json_path(assignment.path.segments(), &assignment.value, model, &path)?,
                    value: assignment.value.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        debug!(schema = %model.schema, assignments = assignments.len(), "Compiled search update");
        Ok(SearchUpdate {
            query: filter.clone(),
            assignments,
        })
    }
}

fn comparison_expr(
    segments: &[String],
    predicate: &Predicate,
    model: &BackendModelDescriptor,
    prefix: &str,
    path: &str,
) -> Result<SearchExpr> {
    let Some((head, rest)) = segments.split_first() else {
        return Err(TranslateError::MalformedQuery("empty field path".to_string()));
    };

    let field = match model.resolve(head, path)? {
        Resolved::Identity(identity) => {
            if !rest.is_empty() {
                return Err(TranslateError::unsupported_field(path, BackendKind::Search, "identity has no sub-fields"));
            }
            return predicate_expr(format!("{}{}", prefix, identity.native), FieldKind::Tag, predicate, path);
        }
        Resolved::Field(field) => field,
    };

    match &field.kind {
        MappingKind::Scalar(scalar) => {
            if !rest.is_empty() {
                return Err(TranslateError::unsupported_field(
                    path,
                    BackendKind::Search,
                    "only declared fields are indexed",
                ));
            }
            if !(scalar.indexed || scalar.full_text || scalar.primary_key) {
                return Err(TranslateError::unsupported_field(path, BackendKind::Search, "field is not indexed"));
            }
            predicate_expr(format!("{}{}", prefix, field.token), FieldKind::of(scalar), predicate, path)
        }
        MappingKind::Embedded(embedded) => {
            if rest.is_empty() {
                return Err(TranslateError::unsupported_field(
                    path,
                    BackendKind::Search,
                    "compare the embedded entity's fields instead of the whole value",
                ));
            }
            let prefix = format!("{}{}.", prefix, field.token);
            comparison_expr(rest, predicate, &embedded.model, &prefix, path)
        }
        MappingKind::Relation(_) => Err(TranslateError::unsupported_field(
            path,
            BackendKind::Search,
            "related entities are fetched separately and cannot be filtered on",
        )),
    }
}

fn predicate_expr(field: String, kind: FieldKind, predicate: &Predicate, path: &str) -> Result<SearchExpr> {
    if predicate.is_ordering() && kind != FieldKind::Numeric {
        return Err(TranslateError::unsupported_operator(
            predicate.operator(),
            BackendKind::Search,
            format!("ordering on '{}' needs a numeric field", path),
        ));
    }

    let range = |min, max| SearchExpr::Range {
        field: field.clone(),
        min,
        max,
    };
    match predicate {
        Predicate::Eq(value) => equals(&field, kind, value, path),
        Predicate::Ne(value) => Ok(SearchExpr::not(equals(&field, kind, value, path)?)),
        Predicate::Gt(value) => Ok(range(Bound::Exclusive(number(value, path)?), Bound::Unbounded)),
        Predicate::Gte(value) => Ok(range(Bound::Inclusive(number(value, path)?), Bound::Unbounded)),
        Predicate::Lt(value) => Ok(range(Bound::Unbounded, Bound::Exclusive(number(value, path)?))),
        Predicate::Lte(value) => Ok(range(Bound::Unbounded, Bound::Inclusive(number(value, path)?))),
        Predicate::In(values) => any_of(&field, kind, values, path),
        Predicate::Nin(values) => Ok(SearchExpr::not(any_of(&field, kind, values, path)?)),
        Predicate::Regex { .. } => Err(TranslateError::unsupported_operator(
            "$regex",
            BackendKind::Search,
            format!("'{}' can only be matched by tag, phrase or range", path),
        )),
        Predicate::Exists(exists) => {
            let missing = SearchExpr::Missing { field: field.clone() };
            Ok(if *exists { SearchExpr::not(missing) } else { missing })
        }
        Predicate::DocumentOnly { operator, .. } => Err(TranslateError::unsupported_operator(
            operator.as_str(),
            BackendKind::Search,
            format!("'{}' can only be evaluated by the document store", path),
        )),
    }
}

fn equals(field: &str, kind: FieldKind, value: &Value, path: &str) -> Result<SearchExpr> {
    if value.is_null() {
        return Ok(SearchExpr::Missing {
            field: field.to_string(),
        });
    }
    Ok(match kind {
        FieldKind::Numeric => {
            let n = number(value, path)?;
            SearchExpr::Range {
                field: field.to_string(),
                min: Bound::Inclusive(n.clone()),
                max: Bound::Inclusive(n),
            }
        }
        FieldKind::Tag => SearchExpr::Tag {
            field: field.to_string(),
            values: vec![tag_value(value, path)?],
        },
        FieldKind::Text => match value {
            Value::String(phrase) => SearchExpr::Text {
                field: field.to_string(),
                phrase: phrase.clone(),
            },
            _ => return Err(TranslateError::MalformedQuery(format!("'{}' expects a string", path))),
        },
    })
}

/// `$in`: one tag set for tag fields, a disjunction otherwise
fn any_of(field: &str, kind: FieldKind, values: &[Value], path: &str) -> Result<SearchExpr> {
    let (nulls, values): (Vec<&Value>, Vec<&Value>) = values.iter().partition(|v| v.is_null());
    let mut terms = Vec::new();

    if kind == FieldKind::Tag && !values.is_empty() {
        terms.push(SearchExpr::Tag {
            field: field.to_string(),
            values: values
                .iter()
                .map(|v| tag_value(v, path))
                .collect::<Result<Vec<_>>>()?,
        });
    } else {
        for value in values {
            terms.push(equals(field, kind, value, path)?);
        }
    }
    if !nulls.is_empty() {
        terms.push(SearchExpr::Missing {
            field: field.to_string(),
        });
    }
    Ok(SearchExpr::or(terms))
}

fn number(value: &Value, path: &str) -> Result<Number> {
    match value {
        Value::Number(n) => Ok(n.clone()),
        _ => Err(TranslateError::MalformedQuery(format!("'{}' expects a number, got {}", path, value))),
    }
}

fn tag_value(value: &Value, path: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        _ => Err(TranslateError::MalformedQuery(format!(
            "'{}' compares scalar values only, got {}",
            path, value
        ))),
    }
}

/// JSON path of an assignment target
fn json_path(segments: &[String], value: &Value, model: &BackendModelDescriptor, path: &str) -> Result<String> {
    let mut json = String::from("$");
    let mut current = model;

    for (i, segment) in segments.iter().enumerate() {
        let last = i + 1 == segments.len();
        let field = match current.resolve(segment, path)? {
            Resolved::Identity(_) => {
                return Err(TranslateError::unsupported_field(path, BackendKind::Search, "identity cannot be updated"))
            }
            Resolved::Field(field) => field,
        };
        json.push('.');
        json.push_str(&field.token);

        match &field.kind {
            MappingKind::Scalar(scalar) => {
                if last {
                    return Ok(json);
                }
                if scalar.field_type != FieldType::Json {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Search,
                        "scalar fields have no sub-fields",
                    ));
                }
                for rest in &segments[i + 1..] {
                    json.push('.');
                    json.push_str(rest);
                }
                return Ok(json);
            }
            MappingKind::Relation(_) => return Err(TranslateError::ReadOnlyRelationship(path.to_string())),
            MappingKind::Embedded(embedded) => {
                if last {
                    let fits = match embedded.cardinality {
                        Cardinality::One => value.is_object() || value.is_null(),
                        Cardinality::Many => value.is_array(),
                    };
                    if !fits {
                        return Err(TranslateError::MalformedQuery(format!(
                            "'{}' must be replaced with {}",
                            path,
                            match embedded.cardinality {
                                Cardinality::One => "an object or null",
                                Cardinality::Many => "an array",
                            }
                        )));
                    }
                    return Ok(json);
                }
                if embedded.cardinality == Cardinality::Many {
                    json.push_str("[*]");
                }
                current = &embedded.model;
            }
        }
    }
    Ok(json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{CompilerOptions, ModelCache, ModelRegistry};
    use crate::engine::query::QueryParser;
    use crate::engine::schema::{
        CanonicalField, EmbeddingField, RelationshipField, SchemaCatalog, SchemaDescriptor,
    };
    use serde_json::json;
    use std::sync::Arc;

    fn model() -> Arc<BackendModelDescriptor> {
        let catalog = SchemaCatalog::new()
            .with(
                SchemaDescriptor::new("Book")
                    .field(CanonicalField::new("title", FieldType::String).indexed())
                    .field(CanonicalField::new("year", FieldType::Integer).indexed())
                    .field(CanonicalField::new("summary", FieldType::String).full_text()),
            )
            .unwrap()
            .with(SchemaDescriptor::new("Address").field(CanonicalField::new("city", FieldType::String).indexed()))
            .unwrap()
            .with(SchemaDescriptor::new("Owner").field(CanonicalField::new("email", FieldType::String)))
            .unwrap()
            .with(
                SchemaDescriptor::new("Library")
                    .field(CanonicalField::new("name", FieldType::String).indexed())
                    .field(CanonicalField::new("rating", FieldType::Float).indexed())
                    .field(CanonicalField::new("notes", FieldType::String))
                    .field(CanonicalField::new("extra", FieldType::Json))
                    .field(EmbeddingField::new("address", Cardinality::One, "Address"))
                    .field(EmbeddingField::new("books", Cardinality::Many, "Book"))
                    .field(RelationshipField::new("owner", Cardinality::One, "Owner")),
            )
            .unwrap();
        ModelRegistry::with_cache(catalog, CompilerOptions::default(), Arc::new(ModelCache::new()))
            .unwrap()
            .descriptor("Library", BackendKind::Search)
            .unwrap()
    }

    fn compile(query: Value) -> Result<SearchQuery> {
        SearchCompiler::new().compile_filter(&QueryParser::parse(&query)?, &model())
    }

    fn render(query: Value) -> String {
        compile(query).unwrap().to_string()
    }

    #[test]
    fn test_hairora_dune() {
        assert_eq!(
            render(json!({"name": "Hairora", "books.title": "Dune"})),
            "(@name:{Hairora} @books\\.title:{Dune})"
        );
    }

    #[test]
    fn test_field_kinds() {
        assert_eq!(render(json!({"rating": 4.5})), "@rating:[4.5 4.5]");
        assert_eq!(render(json!({"rating": {"$gte": 4}})), "@rating:[4 +inf]");
        assert_eq!(render(json!({"books.year": {"$lt": 1970}})), "@books\\.year:[-inf (1970]");
        assert_eq!(
            render(json!({"books.summary": "desert planet"})),
            "@books\\.summary:\"desert planet\""
        );
        assert_eq!(render(json!({"address.city": "New York"})), "@address\\.city:{New\\ York}");
    }

    #[test]
    fn test_identity_is_a_tag() {
        assert_eq!(render(json!({"id": "lib:1"})), "@pk:{lib\\:1}");
    }

    #[test]
    fn test_logical_rendering() {
        assert_eq!(
            render(json!({"$or": [{"name": "A"}, {"rating": {"$gt": 3}}]})),
            "(@name:{A} | @rating:[(3 +inf])"
        );
        assert_eq!(render(json!({"name": {"$ne": "A"}})), "-@name:{A}");
        assert_eq!(render(json!({"$nor": [{"name": "A"}, {"name": "B"}]})), "-(@name:{A} | @name:{B})");
        assert_eq!(render(json!({"name": {"$in": ["A", "B", null]}})), "(@name:{A|B} | ismissing(@name))");
    }

    #[test]
    fn test_empty_sets_and_filter() {
        assert_eq!(compile(json!({})).unwrap().expr, SearchExpr::All);
        assert_eq!(compile(json!({"name": {"$in": []}})).unwrap().expr, SearchExpr::Nothing);
        assert_eq!(compile(json!({"name": {"$nin": []}})).unwrap().expr, SearchExpr::All);
        assert_eq!(render(json!({"rating": {"$in": []}})), "(-*)");
    }

    #[test]
    fn test_rejections() {
        assert!(matches!(
            compile(json!({"name": {"$regex": "^H"}})),
            Err(TranslateError::UnsupportedOperator { ref operator, .. }) if operator == "$regex"
        ));
        assert!(matches!(
            compile(json!({"name": {"$gt": "A"}})),
            Err(TranslateError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            compile(json!({"notes": "x"})),
            Err(TranslateError::UnsupportedField { .. })
        ));
        assert!(matches!(
            compile(json!({"owner.email": "x"})),
            Err(TranslateError::UnsupportedField { .. })
        ));
        assert!(matches!(
            compile(json!({"rating": "high"})),
            Err(TranslateError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_exists_and_document_only_operators() {
        assert_eq!(render(json!({"name": {"$exists": false}})), "ismissing(@name)");
        assert_eq!(render(json!({"books.title": {"$exists": true}})), "-ismissing(@books\\.title)");

        for (query, expected) in [
            (json!({"rating": {"$mod": [2, 0]}}), "$mod"),
            (json!({"name": {"$type": "string"}}), "$type"),
            (json!({"books.title": {"$size": 1}}), "$size"),
        ] {
            assert!(matches!(
                compile(query),
                Err(TranslateError::UnsupportedOperator { ref operator, backend: BackendKind::Search, .. })
                    if operator == expected
            ));
        }
    }

    #[test]
    fn test_update_paths() {
        let model = model();
        let compiler = SearchCompiler::new();
        let filter = compiler
            .compile_filter(&QueryParser::parse(&json!({"name": "Hairora"})).unwrap(), &model)
            .unwrap();
        let update = UpdateDocument::parse(&json!({
            "rating": 5,
            "books.title": "Dune",
            "address": {"city": "Paris"},
            "extra.color": "red"
        }))
        .unwrap();

        let compiled = compiler.compile_update(&update, &filter, &model).unwrap();
        let paths: Vec<&str> = compiled.assignments.iter().map(|a| a.path.as_str()).collect();
        assert_eq!(paths, vec!["$.rating", "$.books[*].title", "$.address", "$.extra.color"]);
        assert_eq!(compiled.query, filter);
    }

    #[test]
    fn test_update_rejections() {
        let model = model();
        let compiler = SearchCompiler::new();
        let filter = SearchQuery::always_true(&model).unwrap();
        let compile = |update: Value| compiler.compile_update(&UpdateDocument::parse(&update).unwrap(), &filter, &model);

        assert!(matches!(
            compile(json!({"$inc": {"rating": 1}})),
            Err(TranslateError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            compile(json!({"books": [], "books.title": "x"})),
            Err(TranslateError::ConflictingUpdate(_))
        ));
        assert!(matches!(
            compile(json!({"owner": "o1"})),
            Err(TranslateError::ReadOnlyRelationship(_))
        ));
        assert!(matches!(
            compile(json!({"books": {"title": "x"}})),
            Err(TranslateError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_native_and_generic() {
        let model = model();
        let native = SearchQuery::native(&model, "@rating:[4 5]");
        let generic = compile(json!({"name": "Hairora"})).unwrap();
        assert_eq!(native.and(generic).unwrap().to_string(), "((@rating:[4 5]) @name:{Hairora})");
    }
}
