//! Relational update plans
//!
//! An update is one ordered instruction group: select the identities of the
//! matching parents first, then run each step against those identities.
//! Capturing identities up front keeps child replacement from changing
//! which parents the filter matches halfway through.

use serde::Serialize;
use serde_json::{Map, Value};

use super::expr::{SqlStatement, SqlWriter};
use super::filter::SqlFilter;
use crate::engine::adapter::SqlDialect;
use crate::engine::error::{Result, TranslateError};
use crate::engine::model::{BackendModelDescriptor, EmbeddedMapping, MappingKind, Realization, Resolved};
use crate::engine::query::{Assignment, UpdateDocument};
use crate::engine::schema::{BackendKind, Cardinality};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum UpdateStep {
    /// `UPDATE table SET ... WHERE identity IN (ids)`
    SetColumns {
        table: String,
        identity: String,
        columns: Vec<(String, Value)>,
    },
    /// Remove every child row of the matched parents
    DeleteChildren { table: String, parent_key: String },
    /// Insert `rows` under each matched parent
    InsertChildren {
        table: String,
        parent_key: String,
        rows: Vec<Vec<(String, Value)>>,
    },
    /// Set columns on every child row of the matched parents
    UpdateChildren {
        table: String,
        parent_key: String,
        columns: Vec<(String, Value)>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlUpdatePlan {
    /// Selects the parent identities every step is bound to
    pub target: SqlFilter,
    pub steps: Vec<UpdateStep>,
}

impl SqlUpdatePlan {
    pub fn target_statement(&self, dialect: SqlDialect) -> SqlStatement {
        self.target.to_id_select(dialect)
    }

    /// Statements for the steps, bound to the selected parent `ids`
    pub fn statements(&self, dialect: SqlDialect, ids: &[Value]) -> Vec<SqlStatement> {
        if ids.is_empty() {
            return Vec::new();
        }

        let mut statements = Vec::new();
        for step in &self.steps {
            match step {
                UpdateStep::SetColumns {
                    table,
                    identity,
                    columns,
                } => statements.push(update_statement(dialect, table, columns, identity, ids)),
                UpdateStep::UpdateChildren {
                    table,
                    parent_key,
                    columns,
                } => statements.push(update_statement(dialect, table, columns, parent_key, ids)),
                UpdateStep::DeleteChildren { table, parent_key } => {
                    let mut writer = SqlWriter::new(dialect);
                    let list = writer.bind_list(ids);
                    let sql = format!(
                        "DELETE FROM {} WHERE {} IN ({})",
                        writer.ident(table),
                        writer.ident(parent_key),
                        list
                    );
                    writer.push(&sql);
                    statements.push(writer.finish());
                }
                UpdateStep::InsertChildren {
                    table,
                    parent_key,
                    rows,
                } => {
                    for id in ids {
                        for row in rows {
                            statements.push(insert_statement(dialect, table, parent_key, id, row));
                        }
                    }
                }
            }
        }
        statements
    }

    /// Child replacement and multi-table updates must run atomically
    pub fn requires_transaction(&self) -> bool {
        self.steps.len() > 1
            || self
                .steps
                .iter()
                .any(|step| matches!(step, UpdateStep::DeleteChildren { .. } | UpdateStep::InsertChildren { .. }))
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}

fn update_statement(
    dialect: SqlDialect,
    table: &str,
    columns: &[(String, Value)],
    key: &str,
    ids: &[Value],
) -> SqlStatement {
    let mut writer = SqlWriter::new(dialect);
    let assignments: Vec<String> = columns
        .iter()
        .map(|(column, value)| {
            let placeholder = writer.bind(value.clone());
            format!("{} = {}", writer.ident(column), placeholder)
        })
        .collect();
    let list = writer.bind_list(ids);
    let sql = format!(
        "UPDATE {} SET {} WHERE {} IN ({})",
        writer.ident(table),
        assignments.join(", "),
        writer.ident(key),
        list
    );
    writer.push(&sql);
    writer.finish()
}

fn insert_statement(
    dialect: SqlDialect,
    table: &str,
    parent_key: &str,
    parent: &Value,
    row: &[(String, Value)],
) -> SqlStatement {
    let mut writer = SqlWriter::new(dialect);
    let mut columns = vec![writer.ident(parent_key)];
    let mut values = vec![writer.bind(parent.clone())];
    for (column, value) in row {
        columns.push(writer.ident(column));
        values.push(writer.bind(value.clone()));
    }
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        writer.ident(table),
        columns.join(", "),
        values.join(", ")
    );
    writer.push(&sql);
    writer.finish()
}

/// Build the step list for `update` against `model`
pub(crate) fn plan_update(update: &UpdateDocument, target: &SqlFilter, model: &BackendModelDescriptor) -> Result<SqlUpdatePlan> {
    if let Some(native) = update.native.first() {
        return Err(TranslateError::unsupported_operator(
            native.operator.as_str(),
            BackendKind::Sql,
            "native update operators are only accepted by the document backend",
        ));
    }
    update.check_assignment_conflicts()?;

    let identity = model.identity_token(&model.schema)?.to_string();
    let mut columns = Vec::new();
    let mut child_steps: Vec<UpdateStep> = Vec::new();

    for assignment in &update.assignments {
        let path = assignment.path.to_string();
        let segments = assignment.path.segments();

        let field = match model.resolve(&segments[0], &path)? {
            Resolved::Identity(_) => {
                return Err(TranslateError::unsupported_field(path, BackendKind::Sql, "identity cannot be updated"))
            }
            Resolved::Field(field) => field,
        };

        match &field.kind {
            MappingKind::Scalar(_) => {
                if segments.len() > 1 {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Sql,
                        "scalar fields have no sub-fields",
                    ));
                }
                columns.push((field.token.clone(), assignment.value.clone()));
            }
            MappingKind::Relation(_) => return Err(TranslateError::ReadOnlyRelationship(path)),
            MappingKind::Embedded(embedded) => {
                let Realization::OwnedChild { parent_key } = &embedded.realization else {
                    return Err(TranslateError::ReadOnlyRelationship(path));
                };
                child_step(&mut child_steps, embedded, parent_key, assignment, &path)?;
            }
        }
    }

    let mut steps = Vec::with_capacity(child_steps.len() + 1);
    if !columns.is_empty() {
        steps.push(UpdateStep::SetColumns {
            table: model.container.clone(),
            identity,
            columns,
        });
    }
    steps.extend(child_steps);

    Ok(SqlUpdatePlan {
        target: target.clone(),
        steps,
    })
}

fn child_step(
    steps: &mut Vec<UpdateStep>,
    embedded: &EmbeddedMapping,
    parent_key: &str,
    assignment: &Assignment,
    path: &str,
) -> Result<()> {
    let child = &embedded.model;
    let table = child.container.clone();

    match assignment.path.segments() {
        // Replace the whole collection
        [_] => {
            let rows = match (&assignment.value, embedded.cardinality) {
                (Value::Null, Cardinality::One) => Vec::new(),
                (Value::Object(row), Cardinality::One) => vec![child_row(child, row, path)?],
                (Value::Array(items), Cardinality::Many) => items
                    .iter()
                    .map(|item| match item {
                        Value::Object(row) => child_row(child, row, path),
                        _ => Err(TranslateError::MalformedQuery(format!(
                            "items replacing '{}' must be objects",
                            path
                        ))),
                    })
                    .collect::<Result<Vec<_>>>()?,
                _ => {
                    return Err(TranslateError::MalformedQuery(format!(
                        "'{}' must be replaced with {}",
                        path,
                        match embedded.cardinality {
                            Cardinality::One => "an object or null",
                            Cardinality::Many => "an array of objects",
                        }
                    )))
                }
            };

            steps.push(UpdateStep::DeleteChildren {
                table: table.clone(),
                parent_key: parent_key.to_string(),
            });
            if !rows.is_empty() {
                steps.push(UpdateStep::InsertChildren {
                    table,
                    parent_key: parent_key.to_string(),
                    rows,
                });
            }
            Ok(())
        }
        // One level into the children
        [_, name] => {
            let column = child_column(child, name, path)?;
            let existing = steps.iter_mut().find_map(|step| match step {
                UpdateStep::UpdateChildren {
                    table: existing, columns, ..
                } if *existing == table => Some(columns),
                _ => None,
            });
            match existing {
                Some(columns) => columns.push((column, assignment.value.clone())),
                None => steps.push(UpdateStep::UpdateChildren {
                    table,
                    parent_key: parent_key.to_string(),
                    columns: vec![(column, assignment.value.clone())],
                }),
            }
            Ok(())
        }
        _ => Err(TranslateError::unsupported_field(
            path,
            BackendKind::Sql,
            "child rows can only be updated one level deep",
        )),
    }
}

fn child_row(child: &BackendModelDescriptor, row: &Map<String, Value>, path: &str) -> Result<Vec<(String, Value)>> {
    row.iter()
        .map(|(name, value)| Ok((child_column(child, name, path)?, value.clone())))
        .collect()
}

/// Column of a scalar child field
fn child_column(child: &BackendModelDescriptor, name: &str, path: &str) -> Result<String> {
    match child.resolve(name, path)? {
        Resolved::Identity(identity) => Ok(identity.native.clone()),
        Resolved::Field(field) => match &field.kind {
            MappingKind::Scalar(_) => Ok(field.token.clone()),
            MappingKind::Relation(_) => Err(TranslateError::ReadOnlyRelationship(format!("{}.{}", path, name))),
            MappingKind::Embedded(_) => Err(TranslateError::unsupported_field(
                format!("{}.{}", path, name),
                BackendKind::Sql,
                "nested embeddings inside child rows cannot be written in one update",
            )),
        },
    }
}
