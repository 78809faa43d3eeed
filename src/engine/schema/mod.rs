//! Canonical Schema Model
//!
//! The backend-agnostic description of entities: scalar fields,
//! relationships between persisted entities and owned embeddings.

pub mod field;
pub mod catalog;

pub use field::{
    BackendKind, CanonicalField, Cardinality, EmbedPolicy, EmbeddingField, FieldDef, FieldType,
    ForeignKeyTarget, RelationshipField,
};
pub use catalog::{SchemaCatalog, SchemaDescriptor};
