//! Native model factory
//!
//! Builds the runtime persistence artifact of a compiled model once per
//! (schema, container) and hands out the cached result afterwards. For the
//! relational backend that artifact is the table DDL: the model's own table
//! followed by its owned child tables.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::debug;

use super::dialect::{ColumnDef, DialectGenerator, ForeignKeyDef, SqlDialect};
use crate::engine::error::{Result, TranslateError};
use crate::engine::model::{BackendModelDescriptor, MappingKind, Realization, RelationLink, ShadowKind};
use crate::engine::schema::{BackendKind, FieldType};

pub trait NativeModelFactory: Send + Sync {
    type Artifact;

    fn backend(&self) -> BackendKind;

    fn build(&self, model: &BackendModelDescriptor) -> Result<Arc<Self::Artifact>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableDefinition {
    pub table: String,
    pub create: String,
    pub indexes: Vec<String>,
}

impl TableDefinition {
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.create.as_str()).chain(self.indexes.iter().map(String::as_str))
    }
}

/// Every table a model needs, parents before children
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableSet {
    pub tables: Vec<TableDefinition>,
}

impl TableSet {
    pub fn ddl(&self) -> String {
        self.tables
            .iter()
            .flat_map(TableDefinition::statements)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

pub struct SqlTableFactory {
    generator: DialectGenerator,
    built: RwLock<HashMap<(String, String), Arc<TableSet>>>,
}

impl SqlTableFactory {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            generator: DialectGenerator::new(dialect),
            built: RwLock::new(HashMap::new()),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.generator.dialect
    }

    fn tables(&self, model: &BackendModelDescriptor, parent: Option<(&str, &str)>, out: &mut Vec<TableDefinition>) -> Result<()> {
        let table = model.container.as_str();
        let identity = model.identity_token(&model.schema)?;
        let mut columns = Vec::new();
        let mut indexes = Vec::new();

        for shadow in &model.shadow_fields {
            match &shadow.kind {
                ShadowKind::Identity => {
                    let mut column = ColumnDef::new(&shadow.token, shadow.field_type);
                    column.is_primary_key = true;
                    column.is_auto_increment = shadow.field_type == FieldType::Integer;
                    columns.insert(0, column);
                }
                ShadowKind::ParentKey { parent: parent_table } => {
                    let mut column = ColumnDef::new(&shadow.token, shadow.field_type);
                    column.nullable = false;
                    column.foreign_key = parent.map(|(_, parent_identity)| ForeignKeyDef {
                        table: parent_table.clone(),
                        column: parent_identity.to_string(),
                        cascade: true,
                    });
                    columns.push(column);
                    indexes.push(self.index(table, &shadow.token));
                }
                ShadowKind::ForeignKey { .. } => {}
            }
        }

        for field in &model.fields {
            match &field.kind {
                MappingKind::Scalar(scalar) => {
                    let mut column = ColumnDef::new(&field.token, scalar.field_type);
                    column.is_primary_key = scalar.primary_key && field.token == identity;
                    if column.is_primary_key {
                        columns.insert(0, column);
                    } else {
                        columns.push(column);
                    }
                    if scalar.indexed && !scalar.primary_key {
                        indexes.push(self.index(table, &field.token));
                    }
                }
                MappingKind::Embedded(_) | MappingKind::Relation(_) => {}
            }
        }

        for shadow in &model.shadow_fields {
            if let ShadowKind::ForeignKey { target, .. } = &shadow.kind {
                let mut column = ColumnDef::new(&shadow.token, shadow.field_type);
                column.foreign_key = referenced_column(model, &shadow.token).map(|column| ForeignKeyDef {
                    table: target.clone(),
                    column,
                    cascade: false,
                });
                columns.push(column);
                indexes.push(self.index(table, &shadow.token));
            }
        }

        if columns.is_empty() {
            return Err(TranslateError::invalid_schema(&model.schema, "no columns to create"));
        }
        out.push(TableDefinition {
            table: table.to_string(),
            create: self.generator.create_table(table, &columns),
            indexes,
        });

        for field in &model.fields {
            if let MappingKind::Embedded(embedded) = &field.kind {
                if let Realization::OwnedChild { .. } = embedded.realization {
                    self.tables(&embedded.model, Some((table, identity)), out)?;
                }
            }
        }
        Ok(())
    }

    fn index(&self, table: &str, column: &str) -> String {
        self.generator
            .create_index(table, &format!("idx_{}_{}", table, column), &[column], false)
    }
}

/// Column on the referenced table, when this model knows it
fn referenced_column(model: &BackendModelDescriptor, token: &str) -> Option<String> {
    model.fields.iter().find_map(|field| match &field.kind {
        MappingKind::Relation(relation) => match &relation.link {
            RelationLink::ForeignKey { column, target_column } if column == token => Some(target_column.clone()),
            _ => None,
        },
        MappingKind::Embedded(embedded) => match &embedded.realization {
            Realization::ForeignKey { column } if column == token => {
                embedded.model.identity.as_ref().map(|identity| identity.native.clone())
            }
            _ => None,
        },
        MappingKind::Scalar(_) => None,
    })
}

impl NativeModelFactory for SqlTableFactory {
    type Artifact = TableSet;

    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }

    fn build(&self, model: &BackendModelDescriptor) -> Result<Arc<TableSet>> {
        if model.backend != BackendKind::Sql {
            return Err(TranslateError::invalid_schema(
                &model.schema,
                format!("tables can only be built from sql models, not {}", model.backend),
            ));
        }

        let key = (model.schema.clone(), model.container.clone());
        {
            let built = self.built.read().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(tables) = built.get(&key) {
                return Ok(tables.clone());
            }
        }

        let mut tables = Vec::new();
        self.tables(model, None, &mut tables)?;
        debug!(
            schema = %model.schema,
            dialect = %self.generator.dialect,
            tables = tables.len(),
            "Built table definitions"
        );

        let mut built = self.built.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(built.entry(key).or_insert_with(|| Arc::new(TableSet { tables })).clone())
    }
}
