//! Relational expression tree and its dialect-aware writer

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

use crate::engine::adapter::SqlDialect;
use crate::engine::error::{Result, TranslateError};

/// A rendered statement with positional parameters
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SqlStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnRef {
    pub alias: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(alias: &str, column: &str) -> Self {
        Self {
            alias: alias.to_string(),
            column: column.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CompareOp {
    Eq,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl CompareOp {
    pub fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Gt => ">",
            CompareOp::Gte => ">=",
            CompareOp::Lt => "<",
            CompareOp::Lte => "<=",
        }
    }
}

/// `inner_alias.inner_column = outer_alias.outer_column`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JoinOn {
    pub inner_column: String,
    pub outer_alias: String,
    pub outer_column: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SqlJoin {
    pub table: String,
    pub alias: String,
    pub on: JoinOn,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "expr", content = "args", rename_all = "snake_case")]
pub enum SqlExpr {
    True,
    False,
    Compare {
        column: ColumnRef,
        op: CompareOp,
        value: Value,
    },
    /// Null-safe inequality
    Distinct { column: ColumnRef, value: Value },
    IsNull { column: ColumnRef, negated: bool },
    InList {
        column: ColumnRef,
        values: Vec<Value>,
        negated: bool,
    },
    Regex {
        column: ColumnRef,
        pattern: String,
        case_insensitive: bool,
    },
    And(Vec<SqlExpr>),
    Or(Vec<SqlExpr>),
    Not(Box<SqlExpr>),
    /// Correlated subquery on `table AS alias`
    Exists {
        table: String,
        alias: String,
        correlation: JoinOn,
        condition: Box<SqlExpr>,
    },
    /// Opaque fragment with `?` placeholders, one per param
    Raw { sql: String, params: Vec<Value> },
}

impl SqlExpr {
    /// Raw fragment whose placeholders outside string literals match `params`
    pub fn raw(sql: &str, params: Vec<Value>) -> Result<SqlExpr> {
        let placeholders = placeholder_positions(sql).count();
        if placeholders != params.len() {
            return Err(TranslateError::MalformedQuery(format!(
                "native fragment has {} placeholder(s) but {} parameter(s)",
                placeholders,
                params.len()
            )));
        }
        Ok(SqlExpr::Raw {
            sql: sql.to_string(),
            params,
        })
    }

    /// Conjunction, dropping `True` terms and collapsing on `False`
    pub fn and(terms: Vec<SqlExpr>) -> SqlExpr {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SqlExpr::True => {}
                SqlExpr::False => return SqlExpr::False,
                SqlExpr::And(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => SqlExpr::True,
            1 => flat.remove(0),
            _ => SqlExpr::And(flat),
        }
    }

    /// Disjunction, dropping `False` terms and collapsing on `True`
    pub fn or(terms: Vec<SqlExpr>) -> SqlExpr {
        let mut flat = Vec::with_capacity(terms.len());
        for term in terms {
            match term {
                SqlExpr::False => {}
                SqlExpr::True => return SqlExpr::True,
                SqlExpr::Or(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        match flat.len() {
            0 => SqlExpr::False,
            1 => flat.remove(0),
            _ => SqlExpr::Or(flat),
        }
    }

    pub fn not(expr: SqlExpr) -> SqlExpr {
        match expr {
            SqlExpr::True => SqlExpr::False,
            SqlExpr::False => SqlExpr::True,
            SqlExpr::Not(inner) => *inner,
            other => SqlExpr::Not(Box::new(other)),
        }
    }

    /// Rename table aliases, used when two filters are combined
    pub fn realias(&mut self, renames: &HashMap<String, String>) {
        let rename = |alias: &mut String| {
            if let Some(new) = renames.get(alias) {
                *alias = new.clone();
            }
        };
        match self {
            SqlExpr::True | SqlExpr::False | SqlExpr::Raw { .. } => {}
            SqlExpr::Compare { column, .. }
            | SqlExpr::Distinct { column, .. }
            | SqlExpr::IsNull { column, .. }
            | SqlExpr::InList { column, .. }
            | SqlExpr::Regex { column, .. } => rename(&mut column.alias),
            SqlExpr::And(terms) | SqlExpr::Or(terms) => terms.iter_mut().for_each(|t| t.realias(renames)),
            SqlExpr::Not(inner) => inner.realias(renames),
            SqlExpr::Exists {
                alias,
                correlation,
                condition,
                ..
            } => {
                rename(alias);
                rename(&mut correlation.outer_alias);
                condition.realias(renames);
            }
        }
    }
}

/// Accumulates SQL text and bound parameters for one statement
pub struct SqlWriter {
    dialect: SqlDialect,
    sql: String,
    params: Vec<Value>,
}

impl SqlWriter {
    pub fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn push(&mut self, sql: &str) {
        self.sql.push_str(sql);
    }

    /// Bind `value` and return its placeholder
    pub fn bind(&mut self, value: Value) -> String {
        self.params.push(value);
        self.dialect.placeholder(self.params.len())
    }

    pub fn bind_list(&mut self, values: &[Value]) -> String {
        values
            .iter()
            .map(|v| self.bind(v.clone()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    pub fn ident(&self, name: &str) -> String {
        self.dialect.quote_ident(name)
    }

    pub fn column(&self, column: &ColumnRef) -> String {
        format!("{}.{}", column.alias, self.ident(&column.column))
    }

    pub fn finish(self) -> SqlStatement {
        SqlStatement {
            sql: self.sql,
            params: self.params,
        }
    }

    pub fn write_expr(&mut self, expr: &SqlExpr) {
        match expr {
            SqlExpr::True => self.push("1 = 1"),
            SqlExpr::False => self.push("1 = 0"),
            SqlExpr::Compare { column, op, value } => {
                let column = self.column(column);
                let placeholder = self.bind(value.clone());
                self.push(&format!("{} {} {}", column, op.as_sql(), placeholder));
            }
            SqlExpr::Distinct { column, value } => {
                let column = self.column(column);
                let placeholder = self.bind(value.clone());
                let sql = self.dialect.null_safe_ne(&column, &placeholder);
                self.push(&sql);
            }
            SqlExpr::IsNull { column, negated } => {
                let column = self.column(column);
                let test = if *negated { "IS NOT NULL" } else { "IS NULL" };
                self.push(&format!("{} {}", column, test));
            }
            SqlExpr::InList {
                column,
                values,
                negated,
            } => {
                let column = self.column(column);
                let list = self.bind_list(values);
                let op = if *negated { "NOT IN" } else { "IN" };
                self.push(&format!("{} {} ({})", column, op, list));
            }
            SqlExpr::Regex {
                column,
                pattern,
                case_insensitive,
            } => {
                let column = self.column(column);
                let pattern = self.dialect.regex_pattern(pattern, *case_insensitive);
                let placeholder = self.bind(Value::String(pattern));
                let sql = self.dialect.regex_match(&column, &placeholder, *case_insensitive);
                self.push(&sql);
            }
            SqlExpr::And(terms) => self.write_terms(terms, " AND "),
            SqlExpr::Or(terms) => self.write_terms(terms, " OR "),
            SqlExpr::Not(inner) => {
                self.push("NOT (");
                self.write_expr(inner);
                self.push(")");
            }
            SqlExpr::Exists {
                table,
                alias,
                correlation,
                condition,
            } => {
                let table = self.ident(table);
                let inner = self.column(&ColumnRef::new(alias, &correlation.inner_column));
                let outer = self.column(&ColumnRef::new(&correlation.outer_alias, &correlation.outer_column));
                self.push(&format!(
                    "EXISTS (SELECT 1 FROM {} AS {} WHERE {} = {}",
                    table, alias, inner, outer
                ));
                if !matches!(**condition, SqlExpr::True) {
                    self.push(" AND ");
                    self.write_wrapped(condition);
                }
                self.push(")");
            }
            SqlExpr::Raw { sql, params } => {
                let sql = self.renumber(sql, params);
                self.push(&format!("({})", sql));
            }
        }
    }

    fn write_terms(&mut self, terms: &[SqlExpr], separator: &str) {
        for (i, term) in terms.iter().enumerate() {
            if i > 0 {
                self.push(separator);
            }
            self.write_wrapped(term);
        }
    }

    /// Parenthesize compound terms
    fn write_wrapped(&mut self, expr: &SqlExpr) {
        if matches!(expr, SqlExpr::And(_) | SqlExpr::Or(_)) {
            self.push("(");
            self.write_expr(expr);
            self.push(")");
        } else {
            self.write_expr(expr);
        }
    }

    /// Bind a raw fragment's parameters, rewriting its `?` placeholders
    /// into this dialect's numbering. `SqlExpr::raw` guarantees one param
    /// per placeholder.
    fn renumber(&mut self, sql: &str, params: &[Value]) -> String {
        let mut out = String::with_capacity(sql.len());
        let mut last = 0;
        for (position, value) in placeholder_positions(sql).zip(params) {
            out.push_str(&sql[last..position]);
            let placeholder = self.bind(value.clone());
            out.push_str(&placeholder);
            last = position + 1;
        }
        out.push_str(&sql[last..]);
        out
    }
}

/// Byte offsets of `?` outside single-quoted literals
fn placeholder_positions(sql: &str) -> impl Iterator<Item = usize> + '_ {
    let mut in_literal = false;
    sql.char_indices().filter_map(move |(position, ch)| match ch {
        '\'' => {
            in_literal = !in_literal;
            None
        }
        '?' if !in_literal => Some(position),
        _ => None,
    })
}
