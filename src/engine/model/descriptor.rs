//! Backend model descriptors
//!
//! The compiled, backend-specific view of a schema: which path token each
//! field maps to, how embeddings and relationships are realized, and where
//! the uniform identity accessor points.

use serde::Serialize;
use std::collections::BTreeSet;

use crate::engine::error::{Result, TranslateError};
use crate::engine::schema::{BackendKind, Cardinality, FieldType};

/// Compiled model for one (schema, backend) pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BackendModelDescriptor {
    pub schema: String,
    pub backend: BackendKind,

    /// Table, collection or search index name
    pub container: String,

    /// `None` only for embeddings stored inline in their parent
    pub identity: Option<IdentityMapping>,

    /// Non-suppressed fields in declaration order
    pub fields: Vec<FieldMapping>,

    /// Fields disabled for this backend
    pub suppressed: BTreeSet<String>,

    /// Columns the backend needs that the schema never declared
    pub shadow_fields: Vec<ShadowField>,
}

/// Uniform identity accessor and the native field behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentityMapping {
    pub accessor: String,
    pub native: String,
    /// Native identity was generated, not declared as a primary key
    pub generated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldMapping {
    pub name: String,
    pub token: String,
    pub kind: MappingKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MappingKind {
    Scalar(ScalarMapping),
    Embedded(EmbeddedMapping),
    Relation(RelationMapping),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalarMapping {
    pub field_type: FieldType,
    pub indexed: bool,
    pub full_text: bool,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EmbeddedMapping {
    pub cardinality: Cardinality,
    pub realization: Realization,
    pub model: Box<BackendModelDescriptor>,
}

/// How an embedding is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "as", rename_all = "snake_case")]
pub enum Realization {
    /// Nested in the parent document
    Inline,
    /// Child rows in `model.container`, pointing back through `parent_key`
    OwnedChild { parent_key: String },
    /// Parent column `column` references the embedded row's identity
    ForeignKey { column: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RelationMapping {
    pub cardinality: Cardinality,
    pub target: String,
    pub link: RelationLink,
    /// The related entity cannot be reached by a join on this backend
    pub requires_separate_fetch: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "via", rename_all = "snake_case")]
pub enum RelationLink {
    /// Source `column` referencing `target_column` on the target table
    ForeignKey { column: String, target_column: String },
    /// Target `column` referencing `source_column` on the source table
    BackReference { column: String, source_column: String },
    /// Link table joining source and target identities
    LinkTable {
        table: String,
        source_column: String,
        target_column: String,
    },
    /// Identifier(s) stored under the field token
    StoredIdentifier,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShadowField {
    pub token: String,
    pub field_type: FieldType,
    pub kind: ShadowKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum ShadowKind {
    Identity,
    /// Owned child row pointing at its parent
    ParentKey { parent: String },
    /// Reference column backing a relationship or embedding
    ForeignKey { field: String, target: String },
}

/// A single path segment resolved against a descriptor
#[derive(Debug, Clone, Copy)]
pub enum Resolved<'a> {
    Identity(&'a IdentityMapping),
    Field(&'a FieldMapping),
}

impl BackendModelDescriptor {
    pub fn field(&self, name: &str) -> Option<&FieldMapping> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn shadow(&self, token: &str) -> Option<&ShadowField> {
        self.shadow_fields.iter().find(|s| s.token == token)
    }

    /// Native identity token, or an error naming `path` for inline models
    pub fn identity_token(&self, path: &str) -> Result<&str> {
        self.identity
            .as_ref()
            .map(|identity| identity.native.as_str())
            .ok_or_else(|| {
                TranslateError::unsupported_field(path, self.backend, "embedded values carry no identity")
            })
    }

    /// Resolve one segment of `path`
    pub fn resolve(&self, segment: &str, path: &str) -> Result<Resolved<'_>> {
        if let Some(field) = self.field(segment) {
            return Ok(Resolved::Field(field));
        }
        if let Some(identity) = &self.identity {
            if identity.accessor == segment {
                return Ok(Resolved::Identity(identity));
            }
        }
        if self.suppressed.contains(segment) {
            return Err(TranslateError::unsupported_field(
                path,
                self.backend,
                format!("'{}' is disabled for this backend", segment),
            ));
        }
        Err(TranslateError::unsupported_field(
            path,
            self.backend,
            format!("'{}' is not a field of {}", segment, self.schema),
        ))
    }

    /// Every token this descriptor occupies, declared or generated
    pub fn tokens(&self) -> Vec<&str> {
        let mut tokens: Vec<&str> = self.fields.iter().map(|f| f.token.as_str()).collect();
        tokens.extend(self.shadow_fields.iter().map(|s| s.token.as_str()));
        if let Some(identity) = &self.identity {
            if !tokens.contains(&identity.native.as_str()) {
                tokens.push(identity.native.as_str());
            }
        }
        tokens
    }
}
