//! Schema descriptors and the catalog that resolves them by name

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};

use super::field::{FieldDef, ForeignKeyTarget};
use crate::engine::error::{Result, TranslateError};

/// One logical entity: an ordered list of fields
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaDescriptor {
    pub name: String,

    /// Overrides the table/collection/index name on every backend
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container: Option<String>,

    #[serde(default)]
    pub fields: Vec<FieldDef>,
}

impl SchemaDescriptor {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            container: None,
            fields: Vec::new(),
        }
    }

    pub fn container(mut self, name: &str) -> Self {
        self.container = Some(name.to_string());
        self
    }

    pub fn field(mut self, field: impl Into<FieldDef>) -> Self {
        self.fields.push(field.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name() == name)
    }

    /// Field names must be unique, non-empty, undotted and never start with `$`
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for field in &self.fields {
            let name = field.name();
            if name.is_empty() {
                return Err(TranslateError::invalid_schema(&self.name, "empty field name"));
            }
            if name.starts_with('$') {
                return Err(TranslateError::invalid_schema(
                    &self.name,
                    format!("field '{}' starts with the reserved '$' marker", name),
                ));
            }
            if name.contains('.') {
                return Err(TranslateError::invalid_schema(
                    &self.name,
                    format!("field '{}' contains the path separator '.'", name),
                ));
            }
            if !seen.insert(name) {
                return Err(TranslateError::invalid_schema(
                    &self.name,
                    format!("duplicate field '{}'", name),
                ));
            }
            if let FieldDef::Scalar(scalar) = field {
                if scalar.foreign_key.is_some() && scalar.foreign_key_target().is_none() {
                    return Err(TranslateError::invalid_schema(
                        &self.name,
                        format!("foreign key of '{}' must be written 'table.column'", name),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Declared scalar fields whose foreign key points at `table`
    pub fn foreign_keys_to<'a>(&'a self, table: &'a str) -> impl Iterator<Item = (&'a str, ForeignKeyTarget)> + 'a {
        self.fields.iter().filter_map(move |field| match field {
            FieldDef::Scalar(scalar) => scalar
                .foreign_key_target()
                .filter(|target| target.table == table)
                .map(|target| (scalar.name.as_str(), target)),
            _ => None,
        })
    }
}

#[derive(Serialize, Deserialize)]
struct CatalogFile {
    schemas: Vec<SchemaDescriptor>,
}

/// All schemas known to a store, addressable by name
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CatalogFile", into = "CatalogFile")]
pub struct SchemaCatalog {
    schemas: BTreeMap<String, SchemaDescriptor>,
}

impl TryFrom<CatalogFile> for SchemaCatalog {
    type Error = TranslateError;

    fn try_from(file: CatalogFile) -> Result<Self> {
        let mut catalog = SchemaCatalog::new();
        for schema in file.schemas {
            catalog.insert(schema)?;
        }
        Ok(catalog)
    }
}

impl From<SchemaCatalog> for CatalogFile {
    fn from(catalog: SchemaCatalog) -> Self {
        CatalogFile {
            schemas: catalog.schemas.into_values().collect(),
        }
    }
}

impl SchemaCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Add a schema; names are unique within a catalog
    pub fn insert(&mut self, schema: SchemaDescriptor) -> Result<()> {
        schema.validate()?;
        if self.schemas.contains_key(&schema.name) {
            return Err(TranslateError::invalid_schema(&schema.name, "schema defined twice"));
        }
        self.schemas.insert(schema.name.clone(), schema);
        Ok(())
    }

    pub fn with(mut self, schema: SchemaDescriptor) -> Result<Self> {
        self.insert(schema)?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Result<&SchemaDescriptor> {
        self.schemas
            .get(name)
            .ok_or_else(|| TranslateError::UnknownSchema(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemas.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.is_empty()
    }

    /// Hex SHA-256 of the canonical JSON form; identifies this exact catalog
    pub fn fingerprint(&self) -> Result<String> {
        let bytes = serde_json::to_vec(&CatalogFile::from(self.clone()))?;
        Ok(hex::encode(Sha256::digest(&bytes)))
    }

    /// Walk the embedding graph from `root`, suppressed edges included.
    /// Relationships are references and never form cycles.
    pub fn check_embedding_cycles(&self, root: &str) -> Result<()> {
        let mut stack = Vec::new();
        self.visit_embeddings(root, &mut stack)
    }

    fn visit_embeddings(&self, name: &str, stack: &mut Vec<String>) -> Result<()> {
        if let Some(pos) = stack.iter().position(|s| s == name) {
            let mut path = stack[pos..].to_vec();
            path.push(name.to_string());
            return Err(TranslateError::SchemaCycle { path });
        }

        let schema = self.get(name)?;
        stack.push(name.to_string());
        for field in &schema.fields {
            if let FieldDef::Embedding(embedding) = field {
                self.visit_embeddings(&embedding.target, stack)?;
            }
        }
        stack.pop();
        Ok(())
    }
}
