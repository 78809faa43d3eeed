//! Schema Compiler
//!
//! Turns a canonical schema into the field map of one backend. Compilation
//! is pure: the same catalog and options always give equal descriptors.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use tracing::debug;

use super::descriptor::{
    BackendModelDescriptor, EmbeddedMapping, FieldMapping, IdentityMapping, MappingKind, Realization,
    RelationLink, RelationMapping, ScalarMapping, ShadowField, ShadowKind,
};
use super::naming;
use crate::engine::error::{Result, TranslateError};
use crate::engine::schema::{
    BackendKind, CanonicalField, Cardinality, EmbedPolicy, EmbeddingField, FieldDef, FieldType,
    RelationshipField, SchemaCatalog, SchemaDescriptor,
};

/// Compile-time choices that are not part of a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompilerOptions {
    /// Uniform identity accessor exposed on every backend
    pub identity_accessor: String,
    /// Relational realization of embeddings without their own `sql_policy`
    pub embed_policy: EmbedPolicy,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            identity_accessor: "id".to_string(),
            embed_policy: EmbedPolicy::OwnedChild,
        }
    }
}

pub struct SchemaCompiler<'a> {
    catalog: &'a SchemaCatalog,
    options: &'a CompilerOptions,
}

impl<'a> SchemaCompiler<'a> {
    pub fn new(catalog: &'a SchemaCatalog, options: &'a CompilerOptions) -> Self {
        Self { catalog, options }
    }

    /// Compile `schema` for `backend`. Embedding cycles are rejected up front,
    /// so no partial descriptor is ever built.
    pub fn compile(&self, schema: &str, backend: BackendKind) -> Result<BackendModelDescriptor> {
        self.catalog.check_embedding_cycles(schema)?;
        let descriptor = self.catalog.get(schema)?;
        let container = naming::container_name(descriptor, backend);
        let model = self.compile_persisted(descriptor, backend, container, true)?;

        debug!(
            schema,
            %backend,
            container = %model.container,
            fields = model.fields.len(),
            suppressed = model.suppressed.len(),
            "Compiled model descriptor"
        );
        Ok(model)
    }

    /// A schema stored in its own table, index or collection.
    /// `standalone` is false for owned child tables.
    fn compile_persisted(
        &self,
        schema: &SchemaDescriptor,
        backend: BackendKind,
        container: String,
        standalone: bool,
    ) -> Result<BackendModelDescriptor> {
        self.check_accessor(schema)?;
        let primary_key = primary_key(schema, backend)?;

        let native = match (backend, primary_key) {
            (BackendKind::Sql, Some(field)) => naming::field_token(&field.name),
            _ => naming::native_identity(backend).to_string(),
        };
        let mut model = BackendModelDescriptor {
            schema: schema.name.clone(),
            backend,
            container,
            identity: Some(IdentityMapping {
                accessor: self.options.identity_accessor.clone(),
                native: native.clone(),
                generated: primary_key.is_none(),
            }),
            fields: Vec::new(),
            suppressed: BTreeSet::new(),
            shadow_fields: Vec::new(),
        };
        if backend == BackendKind::Sql && primary_key.is_none() {
            model.shadow_fields.push(ShadowField {
                token: native,
                field_type: FieldType::Integer,
                kind: ShadowKind::Identity,
            });
        }

        self.compile_fields(schema, &mut model)?;
        if backend == BackendKind::Sql && standalone {
            self.add_back_reference_columns(schema, &mut model)?;
        }
        check_tokens(&model)?;
        Ok(model)
    }

    /// An embedding nested inside its parent document
    fn compile_inline(
        &self,
        schema: &SchemaDescriptor,
        backend: BackendKind,
        container: String,
    ) -> Result<BackendModelDescriptor> {
        self.check_accessor(schema)?;
        let mut model = BackendModelDescriptor {
            schema: schema.name.clone(),
            backend,
            container,
            identity: None,
            fields: Vec::new(),
            suppressed: BTreeSet::new(),
            shadow_fields: Vec::new(),
        };
        self.compile_fields(schema, &mut model)?;
        check_tokens(&model)?;
        Ok(model)
    }

    fn compile_fields(&self, schema: &SchemaDescriptor, model: &mut BackendModelDescriptor) -> Result<()> {
        let backend = model.backend;
        for field in &schema.fields {
            if field.is_disabled_on(backend) {
                model.suppressed.insert(field.name().to_string());
                continue;
            }

            let mapping = match field {
                FieldDef::Scalar(scalar) => scalar_mapping(scalar, model),
                FieldDef::Embedding(embedding) => self.compile_embedding(embedding, model)?,
                FieldDef::Relationship(relationship) => self.compile_relationship(schema, relationship, model)?,
            };
            model.fields.push(mapping);
        }
        Ok(())
    }

    fn compile_embedding(&self, field: &EmbeddingField, model: &mut BackendModelDescriptor) -> Result<FieldMapping> {
        let target = self.catalog.get(&field.target)?;

        let (realization, inner) = match model.backend {
            BackendKind::Search | BackendKind::Document => {
                let inner = self.compile_inline(target, model.backend, model.container.clone())?;
                (Realization::Inline, inner)
            }
            BackendKind::Sql => match field.sql_policy.unwrap_or(self.options.embed_policy) {
                EmbedPolicy::OwnedChild => {
                    let table = naming::child_table(&model.container, &field.name);
                    let mut inner = self.compile_persisted(target, BackendKind::Sql, table, false)?;
                    let parent_key = naming::parent_key(&model.container);
                    inner.shadow_fields.push(ShadowField {
                        token: parent_key.clone(),
                        field_type: identity_type(model),
                        kind: ShadowKind::ParentKey {
                            parent: model.container.clone(),
                        },
                    });
                    check_tokens(&inner)?;
                    (Realization::OwnedChild { parent_key }, inner)
                }
                EmbedPolicy::ForeignKey => {
                    if field.cardinality == Cardinality::Many {
                        return Err(TranslateError::invalid_schema(
                            &model.schema,
                            format!("embedding '{}' holds many values and cannot be a foreign key", field.name),
                        ));
                    }
                    let table = naming::container_name(target, BackendKind::Sql);
                    let inner = self.compile_persisted(target, BackendKind::Sql, table, true)?;
                    let column = naming::reference_column(&field.name);
                    model.shadow_fields.push(ShadowField {
                        token: column.clone(),
                        field_type: identity_type(&inner),
                        kind: ShadowKind::ForeignKey {
                            field: field.name.clone(),
                            target: inner.container.clone(),
                        },
                    });
                    (Realization::ForeignKey { column }, inner)
                }
            },
        };

        Ok(FieldMapping {
            name: field.name.clone(),
            token: naming::field_token(&field.name),
            kind: MappingKind::Embedded(EmbeddedMapping {
                cardinality: field.cardinality,
                realization,
                model: Box::new(inner),
            }),
        })
    }

    fn compile_relationship(
        &self,
        schema: &SchemaDescriptor,
        field: &RelationshipField,
        model: &mut BackendModelDescriptor,
    ) -> Result<FieldMapping> {
        let target = self.catalog.get(&field.target)?;

        let (link, requires_separate_fetch) = if model.backend == BackendKind::Sql {
            (self.relational_link(schema, field, target, model)?, false)
        } else {
            (RelationLink::StoredIdentifier, true)
        };

        Ok(FieldMapping {
            name: field.name.clone(),
            token: naming::field_token(&field.name),
            kind: MappingKind::Relation(RelationMapping {
                cardinality: field.cardinality,
                target: field.target.clone(),
                link,
                requires_separate_fetch,
            }),
        })
    }

    fn relational_link(
        &self,
        schema: &SchemaDescriptor,
        field: &RelationshipField,
        target: &SchemaDescriptor,
        model: &mut BackendModelDescriptor,
    ) -> Result<RelationLink> {
        let target_table = naming::container_name(target, BackendKind::Sql);

        if let Some(link) = &field.link {
            let link_schema = self.catalog.get(link)?;
            let source_column = sql_foreign_keys(link_schema, &model.container).next();
            let target_column = sql_foreign_keys(link_schema, &target_table)
                .find(|(column, _)| source_column.as_ref().map(|(c, _)| c) != Some(column));

            return match (source_column, target_column) {
                (Some((source_column, _)), Some((target_column, _))) => Ok(RelationLink::LinkTable {
                    table: naming::container_name(link_schema, BackendKind::Sql),
                    source_column,
                    target_column,
                }),
                _ => Err(TranslateError::invalid_schema(
                    &link_schema.name,
                    format!(
                        "link schema needs foreign keys to both '{}' and '{}'",
                        model.container, target_table
                    ),
                )),
            };
        }

        match field.cardinality {
            Cardinality::One => {
                if let Some((column, target_column)) = sql_foreign_keys(schema, &target_table).next() {
                    return Ok(RelationLink::ForeignKey { column, target_column });
                }
                let (target_column, field_type) = sql_identity(target)?;
                let column = naming::reference_column(&field.name);
                model.shadow_fields.push(ShadowField {
                    token: column.clone(),
                    field_type,
                    kind: ShadowKind::ForeignKey {
                        field: field.name.clone(),
                        target: target_table,
                    },
                });
                Ok(RelationLink::ForeignKey { column, target_column })
            }
            Cardinality::Many => {
                if let Some((column, source_column)) = sql_foreign_keys(target, &model.container).next() {
                    return Ok(RelationLink::BackReference { column, source_column });
                }
                let source_column = model.identity_token(&field.name)?.to_string();
                Ok(RelationLink::BackReference {
                    column: back_reference_column(field, &model.container),
                    source_column,
                })
            }
        }
    }

    /// Columns other schemas' `many` relationships expect on this table
    fn add_back_reference_columns(&self, schema: &SchemaDescriptor, model: &mut BackendModelDescriptor) -> Result<()> {
        for name in self.catalog.names() {
            let source = self.catalog.get(name)?;
            let source_table = naming::container_name(source, BackendKind::Sql);
            if sql_foreign_keys(schema, &source_table).next().is_some() {
                continue;
            }

            for field in &source.fields {
                let FieldDef::Relationship(relationship) = field else {
                    continue;
                };
                if relationship.target != schema.name
                    || relationship.cardinality != Cardinality::Many
                    || relationship.link.is_some()
                    || field.is_disabled_on(BackendKind::Sql)
                {
                    continue;
                }

                let column = back_reference_column(relationship, &source_table);
                if model.tokens().contains(&column.as_str()) {
                    continue;
                }
                let (_, field_type) = sql_identity(source)?;
                model.shadow_fields.push(ShadowField {
                    token: column,
                    field_type,
                    kind: ShadowKind::ForeignKey {
                        field: format!("{}.{}", source.name, relationship.name),
                        target: source_table.clone(),
                    },
                });
            }
        }
        Ok(())
    }

    /// Only the primary key may use the identity accessor's name
    fn check_accessor(&self, schema: &SchemaDescriptor) -> Result<()> {
        let accessor = &self.options.identity_accessor;
        match schema.get(accessor) {
            None | Some(FieldDef::Scalar(CanonicalField { primary_key: true, .. })) => Ok(()),
            Some(_) => Err(TranslateError::invalid_schema(
                &schema.name,
                format!("field '{}' shadows the identity accessor; mark it primary_key or rename it", accessor),
            )),
        }
    }
}

fn scalar_mapping(field: &CanonicalField, model: &BackendModelDescriptor) -> FieldMapping {
    // The document and search stores keep the primary key in their native identity slot
    let token = match (&model.identity, field.primary_key, model.backend) {
        (Some(identity), true, BackendKind::Search | BackendKind::Document) => identity.native.clone(),
        _ => naming::field_token(&field.name),
    };

    FieldMapping {
        name: field.name.clone(),
        token,
        kind: MappingKind::Scalar(ScalarMapping {
            field_type: field.field_type,
            indexed: field.index,
            full_text: field.full_text_search,
            primary_key: field.primary_key,
        }),
    }
}

fn primary_key(schema: &SchemaDescriptor, backend: BackendKind) -> Result<Option<&CanonicalField>> {
    let mut keys = schema.fields.iter().filter_map(|field| match field {
        FieldDef::Scalar(scalar) if scalar.primary_key && !field.is_disabled_on(backend) => Some(scalar),
        _ => None,
    });
    let first = keys.next();
    if let Some(second) = keys.next() {
        return Err(TranslateError::invalid_schema(
            &schema.name,
            format!("composite primary keys are not supported (found '{}' as well)", second.name),
        ));
    }
    Ok(first)
}

/// Relational identity column of a schema and its type
fn sql_identity(schema: &SchemaDescriptor) -> Result<(String, FieldType)> {
    Ok(match primary_key(schema, BackendKind::Sql)? {
        Some(field) => (naming::field_token(&field.name), field.field_type),
        None => (naming::SQL_IDENTITY.to_string(), FieldType::Integer),
    })
}

fn identity_type(model: &BackendModelDescriptor) -> FieldType {
    let Some(identity) = &model.identity else {
        return FieldType::Integer;
    };
    model
        .fields
        .iter()
        .find_map(|field| match &field.kind {
            MappingKind::Scalar(scalar) if field.token == identity.native => Some(scalar.field_type),
            _ => None,
        })
        .unwrap_or(FieldType::Integer)
}

/// `(column, referenced column)` of relational foreign keys from `schema` to `table`
fn sql_foreign_keys<'s>(schema: &'s SchemaDescriptor, table: &'s str) -> impl Iterator<Item = (String, String)> + 's {
    schema
        .foreign_keys_to(table)
        .filter(move |(name, _)| schema.get(name).is_some_and(|f| !f.is_disabled_on(BackendKind::Sql)))
        .map(|(name, target)| (naming::field_token(name), target.column))
}

fn back_reference_column(field: &RelationshipField, source_table: &str) -> String {
    naming::parent_key(field.back_reference.as_deref().unwrap_or(source_table))
}

fn check_tokens(model: &BackendModelDescriptor) -> Result<()> {
    let mut seen = HashSet::new();
    for token in model.tokens() {
        if !seen.insert(token) {
            return Err(TranslateError::invalid_schema(
                &model.schema,
                format!("token '{}' is used twice on the {} backend", token, model.backend),
            ));
        }
    }
    Ok(())
}
