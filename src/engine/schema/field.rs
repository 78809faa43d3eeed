//! Canonical field definitions
//!
//! Leaf data only: the scalar, relationship and embedding fields that make
//! up a schema, plus the backend tags they can be suppressed on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Persistence backend a schema is compiled for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Relational tables
    #[serde(alias = "relational")]
    Sql,
    /// Indexed key/value search store
    #[serde(alias = "redis")]
    Search,
    /// Schemaless document store
    #[serde(alias = "mongo")]
    Document,
}

impl BackendKind {
    pub const ALL: [BackendKind; 3] = [BackendKind::Sql, BackendKind::Search, BackendKind::Document];

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sql" | "relational" => Some(BackendKind::Sql),
            "search" | "redis" => Some(BackendKind::Search),
            "document" | "mongo" => Some(BackendKind::Document),
            _ => None,
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Sql => write!(f, "sql"),
            BackendKind::Search => write!(f, "search"),
            BackendKind::Document => write!(f, "document"),
        }
    }
}

/// Declared value type of a scalar field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Integer,
    Float,
    Boolean,
    Datetime,
    /// Free-form nested value, opaque to the schema
    Json,
}

impl FieldType {
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Integer | FieldType::Float)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cardinality {
    One,
    Many,
}

/// How the relational backend materializes an embedding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbedPolicy {
    /// Child rows owned by the parent, inserted and replaced with it
    #[default]
    OwnedChild,
    /// Separate entity referenced through a foreign-key column
    ForeignKey,
}

/// A `table.column` foreign key target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyTarget {
    pub table: String,
    pub column: String,
}

impl ForeignKeyTarget {
    pub fn parse(s: &str) -> Option<Self> {
        let (table, column) = s.split_once('.')?;
        if table.is_empty() || column.is_empty() || column.contains('.') {
            return None;
        }
        Some(Self {
            table: table.to_string(),
            column: column.to_string(),
        })
    }
}

/// A plain value field
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CanonicalField {
    pub name: String,

    #[serde(rename = "type")]
    pub field_type: FieldType,

    #[serde(default)]
    pub index: bool,

    #[serde(default)]
    pub full_text_search: bool,

    #[serde(default)]
    pub primary_key: bool,

    /// Relational foreign key, `table.column`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disable_on: BTreeSet<BackendKind>,
}

impl CanonicalField {
    pub fn new(name: &str, field_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            index: false,
            full_text_search: false,
            primary_key: false,
            foreign_key: None,
            disable_on: BTreeSet::new(),
        }
    }

    pub fn indexed(mut self) -> Self {
        self.index = true;
        self
    }

    pub fn full_text(mut self) -> Self {
        self.full_text_search = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    pub fn references(mut self, target: &str) -> Self {
        self.foreign_key = Some(target.to_string());
        self
    }

    pub fn disable_on(mut self, backend: BackendKind) -> Self {
        self.disable_on.insert(backend);
        self
    }

    pub fn foreign_key_target(&self) -> Option<ForeignKeyTarget> {
        self.foreign_key.as_deref().and_then(ForeignKeyTarget::parse)
    }
}

/// A reference to another independently persisted entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RelationshipField {
    pub name: String,
    pub cardinality: Cardinality,
    pub target: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub back_reference: Option<String>,

    /// Link schema for many-to-many relationships
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disable_on: BTreeSet<BackendKind>,
}

impl RelationshipField {
    pub fn new(name: &str, cardinality: Cardinality, target: &str) -> Self {
        Self {
            name: name.to_string(),
            cardinality,
            target: target.to_string(),
            back_reference: None,
            link: None,
            disable_on: BTreeSet::new(),
        }
    }

    pub fn back_reference(mut self, name: &str) -> Self {
        self.back_reference = Some(name.to_string());
        self
    }

    pub fn through(mut self, link: &str) -> Self {
        self.link = Some(link.to_string());
        self
    }

    pub fn disable_on(mut self, backend: BackendKind) -> Self {
        self.disable_on.insert(backend);
        self
    }
}

/// A value-contained nested entity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmbeddingField {
    pub name: String,
    pub cardinality: Cardinality,
    pub target: String,

    /// Relational materialization; falls back to the compiler default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sql_policy: Option<EmbedPolicy>,

    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub disable_on: BTreeSet<BackendKind>,
}

impl EmbeddingField {
    pub fn new(name: &str, cardinality: Cardinality, target: &str) -> Self {
        Self {
            name: name.to_string(),
            cardinality,
            target: target.to_string(),
            sql_policy: None,
            disable_on: BTreeSet::new(),
        }
    }

    pub fn sql_policy(mut self, policy: EmbedPolicy) -> Self {
        self.sql_policy = Some(policy);
        self
    }

    pub fn disable_on(mut self, backend: BackendKind) -> Self {
        self.disable_on.insert(backend);
        self
    }
}

/// Any field of a schema, in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldDef {
    Scalar(CanonicalField),
    Relationship(RelationshipField),
    Embedding(EmbeddingField),
}

impl FieldDef {
    pub fn name(&self) -> &str {
        match self {
            FieldDef::Scalar(f) => &f.name,
            FieldDef::Relationship(f) => &f.name,
            FieldDef::Embedding(f) => &f.name,
        }
    }

    pub fn is_disabled_on(&self, backend: BackendKind) -> bool {
        let disabled = match self {
            FieldDef::Scalar(f) => &f.disable_on,
            FieldDef::Relationship(f) => &f.disable_on,
            FieldDef::Embedding(f) => &f.disable_on,
        };
        disabled.contains(&backend)
    }
}

impl From<CanonicalField> for FieldDef {
    fn from(field: CanonicalField) -> Self {
        FieldDef::Scalar(field)
    }
}

impl From<RelationshipField> for FieldDef {
    fn from(field: RelationshipField) -> Self {
        FieldDef::Relationship(field)
    }
}

impl From<EmbeddingField> for FieldDef {
    fn from(field: EmbeddingField) -> Self {
        FieldDef::Embedding(field)
    }
}
