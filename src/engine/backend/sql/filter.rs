//! Relational filter compilation
//!
//! Comparisons resolve through the model descriptor one segment at a time.
//! Crossing an owned child, a foreign-key embedding or a relationship opens
//! a correlated `EXISTS`, or a shared `LEFT JOIN` under `FlattenedJoin`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use super::expr::{ColumnRef, CompareOp, JoinOn, SqlExpr, SqlJoin, SqlStatement, SqlWriter};
use crate::engine::adapter::SqlDialect;
use crate::engine::error::{Result, TranslateError};
use crate::engine::model::{
    BackendModelDescriptor, MappingKind, ModelResolver, Realization, RelationLink, RelationMapping, Resolved,
};
use crate::engine::query::{Connective, Node, Predicate};
use crate::engine::schema::{BackendKind, FieldType};

pub const ROOT_ALIAS: &str = "t0";

/// How embedded children are matched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStrategy {
    /// "At least one child matches", as the document store does
    #[default]
    Exists,
    /// Row-level matching over `LEFT JOIN`ed children
    FlattenedJoin,
}

/// A compiled relational filter rooted at one table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlFilter {
    pub table: String,
    /// Identity column of the root table
    pub identity: String,
    pub joins: Vec<SqlJoin>,
    pub condition: SqlExpr,
    /// Aliases `t1..next_alias` are taken
    next_alias: usize,
}

impl SqlFilter {
    /// Unfiltered selection of a model's table
    pub fn all(model: &BackendModelDescriptor) -> Result<Self> {
        Ok(Self {
            table: model.container.clone(),
            identity: model.identity_token(&model.schema)?.to_string(),
            joins: Vec::new(),
            condition: SqlExpr::True,
            next_alias: 1,
        })
    }

    /// Opaque caller-written predicate over the root alias `t0`, with `?` placeholders
    pub fn native(model: &BackendModelDescriptor, sql: &str, params: Vec<Value>) -> Result<Self> {
        let mut filter = Self::all(model)?;
        filter.condition = SqlExpr::raw(sql, params)?;
        Ok(filter)
    }

    pub fn root_alias(&self) -> &str {
        ROOT_ALIAS
    }

    /// Conjunction of two filters on the same table; aliases of `other` are shifted
    pub fn and(mut self, mut other: SqlFilter) -> Result<SqlFilter> {
        if self.table != other.table {
            return Err(TranslateError::MalformedQuery(format!(
                "cannot combine a filter on '{}' with one on '{}'",
                self.table, other.table
            )));
        }
        let offset = self.next_alias - 1;
        if offset > 0 {
            let renames: HashMap<String, String> = (1..other.next_alias)
                .map(|n| (format!("t{}", n), format!("t{}", n + offset)))
                .collect();
            for join in &mut other.joins {
                if let Some(alias) = renames.get(&join.alias) {
                    join.alias = alias.clone();
                }
                if let Some(alias) = renames.get(&join.on.outer_alias) {
                    join.on.outer_alias = alias.clone();
                }
            }
            other.condition.realias(&renames);
        }

        self.next_alias += other.next_alias - 1;
        self.joins.extend(other.joins);
        self.condition = SqlExpr::and(vec![self.condition, other.condition]);
        Ok(self)
    }

    pub fn where_clause(&self, dialect: SqlDialect) -> SqlStatement {
        let mut writer = SqlWriter::new(dialect);
        writer.write_expr(&self.condition);
        writer.finish()
    }

    /// `SELECT t0.* ...`; `DISTINCT` once joins can repeat parent rows
    pub fn to_select(&self, dialect: SqlDialect) -> SqlStatement {
        self.select(dialect, &format!("{}.*", ROOT_ALIAS))
    }

    /// Identities of the matching root rows
    pub fn to_id_select(&self, dialect: SqlDialect) -> SqlStatement {
        self.select(dialect, &format!("{}.{}", ROOT_ALIAS, dialect.quote_ident(&self.identity)))
    }

    fn select(&self, dialect: SqlDialect, projection: &str) -> SqlStatement {
        let mut writer = SqlWriter::new(dialect);
        let distinct = if self.joins.is_empty() { "" } else { "DISTINCT " };
        writer.push(&format!(
            "SELECT {}{} FROM {} AS {}",
            distinct,
            projection,
            writer.ident(&self.table),
            ROOT_ALIAS
        ));
        for join in &self.joins {
            let inner = writer.column(&ColumnRef::new(&join.alias, &join.on.inner_column));
            let outer = writer.column(&ColumnRef::new(&join.on.outer_alias, &join.on.outer_column));
            writer.push(&format!(
                " LEFT JOIN {} AS {} ON {} = {}",
                writer.ident(&join.table),
                join.alias,
                inner,
                outer
            ));
        }
        if !matches!(self.condition, SqlExpr::True) {
            writer.push(" WHERE ");
            writer.write_expr(&self.condition);
        }
        writer.finish()
    }
}

/// One traversal of a filter tree
pub(crate) struct FilterBuilder<'a> {
    resolver: &'a dyn ModelResolver,
    strategy: EmbeddingStrategy,
    next_alias: usize,
    joins: Vec<SqlJoin>,
    /// Path prefix -> alias of its flattened join
    joined: HashMap<String, String>,
    /// Nesting level of correlated subqueries
    depth: usize,
    /// Enclosing `$not`/`$nor` connectives
    negations: usize,
}

impl<'a> FilterBuilder<'a> {
    pub(crate) fn new(resolver: &'a dyn ModelResolver, strategy: EmbeddingStrategy) -> Self {
        Self {
            resolver,
            strategy,
            next_alias: 1,
            joins: Vec::new(),
            joined: HashMap::new(),
            depth: 0,
            negations: 0,
        }
    }

    pub(crate) fn build(mut self, node: &Node, model: &BackendModelDescriptor) -> Result<SqlFilter> {
        let condition = self.node(node, model, ROOT_ALIAS, "")?;
        Ok(SqlFilter {
            table: model.container.clone(),
            identity: model.identity_token(&model.schema)?.to_string(),
            joins: self.joins,
            condition,
            next_alias: self.next_alias,
        })
    }

    fn alias(&mut self) -> String {
        let alias = format!("t{}", self.next_alias);
        self.next_alias += 1;
        alias
    }

    fn node(&mut self, node: &Node, model: &BackendModelDescriptor, alias: &str, scope: &str) -> Result<SqlExpr> {
        match node {
            Node::Comparison(comparison) => {
                let path = comparison.path.to_string();
                self.comparison(comparison.path.segments(), &comparison.predicate, model, alias, scope, &path)
            }
            Node::Logical { connective, children } => {
                let negating = matches!(connective, Connective::Not | Connective::Nor);
                if negating {
                    self.negations += 1;
                }
                let terms = children
                    .iter()
                    .map(|child| self.node(child, model, alias, scope))
                    .collect::<Result<Vec<_>>>();
                if negating {
                    self.negations -= 1;
                }
                let terms = terms?;
                Ok(match connective {
                    Connective::And => SqlExpr::and(terms),
                    Connective::Or => SqlExpr::or(terms),
                    Connective::Not => SqlExpr::not(SqlExpr::and(terms)),
                    Connective::Nor => SqlExpr::not(SqlExpr::or(terms)),
                })
            }
        }
    }

    fn comparison(
        &mut self,
        segments: &[String],
        predicate: &Predicate,
        model: &BackendModelDescriptor,
        alias: &str,
        scope: &str,
        path: &str,
    ) -> Result<SqlExpr> {
        let Some((head, rest)) = segments.split_first() else {
            return Err(TranslateError::MalformedQuery("empty field path".to_string()));
        };

        let field = match model.resolve(head, path)? {
            Resolved::Identity(identity) => {
                if !rest.is_empty() {
                    return Err(TranslateError::unsupported_field(path, BackendKind::Sql, "identity has no sub-fields"));
                }
                return predicate_expr(ColumnRef::new(alias, &identity.native), predicate, path);
            }
            Resolved::Field(field) => field,
        };

        match &field.kind {
            MappingKind::Scalar(scalar) => {
                if !rest.is_empty() {
                    let reason = if scalar.field_type == FieldType::Json {
                        "paths into json columns are not supported on the relational backend"
                    } else {
                        "scalar fields have no sub-fields"
                    };
                    return Err(TranslateError::unsupported_field(path, BackendKind::Sql, reason));
                }
                predicate_expr(ColumnRef::new(alias, &field.token), predicate, path)
            }
            MappingKind::Embedded(embedded) => {
                if rest.is_empty() {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Sql,
                        "compare the embedded entity's fields instead of the whole value",
                    ));
                }
                let inner = &embedded.model;
                let correlation = match &embedded.realization {
                    Realization::OwnedChild { parent_key } => JoinOn {
                        inner_column: parent_key.clone(),
                        outer_alias: alias.to_string(),
                        outer_column: model.identity_token(path)?.to_string(),
                    },
                    Realization::ForeignKey { column } => JoinOn {
                        inner_column: inner.identity_token(path)?.to_string(),
                        outer_alias: alias.to_string(),
                        outer_column: column.clone(),
                    },
                    Realization::Inline => {
                        return Err(TranslateError::unsupported_field(
                            path,
                            BackendKind::Sql,
                            "inline embeddings cannot be stored relationally",
                        ))
                    }
                };
                let scope = format!("{}{}.", scope, head);

                // Joins hang off the root query, so only top-level embeddings flatten
                if self.strategy == EmbeddingStrategy::FlattenedJoin && self.depth == 0 {
                    let child_alias = self.join(&scope, &inner.container, correlation);
                    if predicate.is_negative() || self.negations > 0 {
                        warn!(path, "Negation over a flattened join matches per child row");
                    }
                    return self.comparison(rest, predicate, inner, &child_alias, &scope, path);
                }

                let child_alias = self.alias();
                self.exists(&inner.container, child_alias, correlation, predicate, |builder, alias, predicate| {
                    builder.comparison(rest, predicate, inner, alias, &scope, path)
                })
            }
            MappingKind::Relation(relation) => {
                if rest.is_empty() {
                    return Err(TranslateError::unsupported_field(
                        path,
                        BackendKind::Sql,
                        "compare the related entity's fields instead of the reference",
                    ));
                }
                self.relation(relation, rest, predicate, model, alias, path)
            }
        }
    }

    fn relation(
        &mut self,
        relation: &RelationMapping,
        rest: &[String],
        predicate: &Predicate,
        model: &BackendModelDescriptor,
        alias: &str,
        path: &str,
    ) -> Result<SqlExpr> {
        let target = self.resolver.resolve(&relation.target, BackendKind::Sql)?;
        let target_identity = target.identity_token(path)?.to_string();
        let scope = String::new();

        match &relation.link {
            RelationLink::ForeignKey { column, target_column } => {
                let correlation = JoinOn {
                    inner_column: target_column.clone(),
                    outer_alias: alias.to_string(),
                    outer_column: column.clone(),
                };
                let target_alias = self.alias();
                self.exists(&target.container, target_alias, correlation, predicate, |builder, alias, predicate| {
                    builder.comparison(rest, predicate, &target, alias, &scope, path)
                })
            }
            RelationLink::BackReference { column, source_column } => {
                let correlation = JoinOn {
                    inner_column: column.clone(),
                    outer_alias: alias.to_string(),
                    outer_column: source_column.clone(),
                };
                let target_alias = self.alias();
                self.exists(&target.container, target_alias, correlation, predicate, |builder, alias, predicate| {
                    builder.comparison(rest, predicate, &target, alias, &scope, path)
                })
            }
            RelationLink::LinkTable {
                table,
                source_column,
                target_column,
            } => {
                let correlation = JoinOn {
                    inner_column: source_column.clone(),
                    outer_alias: alias.to_string(),
                    outer_column: model.identity_token(path)?.to_string(),
                };
                let link_alias = self.alias();
                let target_alias = self.alias();
                let container = target.container.clone();
                self.exists(table, link_alias, correlation, predicate, |builder, link_alias, predicate| {
                    let condition = builder.comparison(rest, predicate, &target, &target_alias, &scope, path)?;
                    Ok(SqlExpr::Exists {
                        table: container.clone(),
                        alias: target_alias.clone(),
                        correlation: JoinOn {
                            inner_column: target_identity.clone(),
                            outer_alias: link_alias.to_string(),
                            outer_column: target_column.clone(),
                        },
                        condition: Box::new(condition),
                    })
                })
            }
            RelationLink::StoredIdentifier => Err(TranslateError::unsupported_field(
                path,
                BackendKind::Sql,
                "relationship is not stored relationally",
            )),
        }
    }

    /// `EXISTS` over `table AS alias`; negative predicates become `NOT EXISTS`
    /// of their positive form
    fn exists<F>(
        &mut self,
        table: &str,
        alias: String,
        correlation: JoinOn,
        predicate: &Predicate,
        condition: F,
    ) -> Result<SqlExpr>
    where
        F: FnOnce(&mut Self, &str, &Predicate) -> Result<SqlExpr>,
    {
        let positive = predicate.positive();
        let inner_predicate = positive.as_ref().unwrap_or(predicate);
        self.depth += 1;
        let condition = condition(self, &alias, inner_predicate);
        self.depth -= 1;
        let condition = condition?;

        let exists = SqlExpr::Exists {
            table: table.to_string(),
            alias,
            correlation,
            condition: Box::new(condition),
        };
        Ok(if positive.is_some() { SqlExpr::not(exists) } else { exists })
    }

    /// Alias of the `LEFT JOIN` for `scope`, added on first use
    fn join(&mut self, scope: &str, table: &str, on: JoinOn) -> String {
        if let Some(alias) = self.joined.get(scope) {
            return alias.clone();
        }
        let alias = self.alias();
        self.joins.push(SqlJoin {
            table: table.to_string(),
            alias: alias.clone(),
            on,
        });
        self.joined.insert(scope.to_string(), alias.clone());
        alias
    }
}

/// A single-column predicate with SQL null semantics made explicit
fn predicate_expr(column: ColumnRef, predicate: &Predicate, path: &str) -> Result<SqlExpr> {
    let compare = |column: ColumnRef, op: CompareOp, value: &Value| SqlExpr::Compare {
        column,
        op,
        value: value.clone(),
    };

    Ok(match predicate {
        Predicate::Eq(Value::Null) => SqlExpr::IsNull { column, negated: false },
        Predicate::Ne(Value::Null) => SqlExpr::IsNull { column, negated: true },
        Predicate::Eq(value) => compare(column, CompareOp::Eq, value),
        Predicate::Ne(value) => SqlExpr::Distinct {
            column,
            value: value.clone(),
        },
        Predicate::Gt(value) => compare(column, CompareOp::Gt, value),
        Predicate::Gte(value) => compare(column, CompareOp::Gte, value),
        Predicate::Lt(value) => compare(column, CompareOp::Lt, value),
        Predicate::Lte(value) => compare(column, CompareOp::Lte, value),
        Predicate::In(values) => {
            let (nulls, values): (Vec<&Value>, Vec<&Value>) = values.iter().partition(|v| v.is_null());
            let mut terms = Vec::new();
            if !values.is_empty() {
                terms.push(SqlExpr::InList {
                    column: column.clone(),
                    values: values.into_iter().cloned().collect(),
                    negated: false,
                });
            }
            if !nulls.is_empty() {
                terms.push(SqlExpr::IsNull { column, negated: false });
            }
            SqlExpr::or(terms)
        }
        Predicate::Nin(values) => {
            let (nulls, values): (Vec<&Value>, Vec<&Value>) = values.iter().partition(|v| v.is_null());
            if values.is_empty() {
                return Ok(if nulls.is_empty() {
                    SqlExpr::True
                } else {
                    SqlExpr::IsNull { column, negated: true }
                });
            }
            let not_in = SqlExpr::InList {
                column: column.clone(),
                values: values.into_iter().cloned().collect(),
                negated: true,
            };
            if nulls.is_empty() {
                SqlExpr::or(vec![SqlExpr::IsNull { column, negated: false }, not_in])
            } else {
                SqlExpr::and(vec![SqlExpr::IsNull { column, negated: true }, not_in])
            }
        }
        Predicate::Exists(exists) => SqlExpr::IsNull {
            column,
            negated: *exists,
        },
        Predicate::DocumentOnly { operator, .. } => {
            return Err(TranslateError::unsupported_operator(
                operator.as_str(),
                BackendKind::Sql,
                format!("'{}' can only be evaluated by the document store", path),
            ))
        }
        Predicate::Regex { pattern, options } => {
            if let Some(option) = options.chars().find(|c| *c != 'i') {
                return Err(TranslateError::unsupported_operator(
                    "$regex",
                    BackendKind::Sql,
                    format!("option '{}' on '{}' has no relational equivalent", option, path),
                ));
            }
            if let Err(err) = regex::Regex::new(pattern) {
                return Err(TranslateError::unsupported_operator(
                    "$regex",
                    BackendKind::Sql,
                    format!("pattern on '{}' is outside the portable subset: {}", path, err),
                ));
            }
            SqlExpr::Regex {
                column,
                pattern: pattern.clone(),
                case_insensitive: options.contains('i'),
            }
        }
    })
}
