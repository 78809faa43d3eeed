//! SQL Dialect Generator
//!
//! Dialect-specific spelling of everything the relational backend emits:
//! column types, placeholders, identifier quoting, null-safe comparison,
//! regex matching and table DDL. Supports SQLite, PostgreSQL, and MySQL.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::engine::schema::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    Mysql,
}

impl fmt::Display for SqlDialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SqlDialect::Sqlite => write!(f, "sqlite"),
            SqlDialect::Postgres => write!(f, "postgres"),
            SqlDialect::Mysql => write!(f, "mysql"),
        }
    }
}

impl SqlDialect {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sqlite" | "sqlite3" => Some(SqlDialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Some(SqlDialect::Postgres),
            "mysql" | "mariadb" => Some(SqlDialect::Mysql),
            _ => None,
        }
    }

    /// Bind placeholder for the `n`th parameter (1-based)
    pub fn placeholder(&self, n: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${}", n),
            SqlDialect::Sqlite | SqlDialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier (table or column name)
    pub fn quote_ident(&self, name: &str) -> String {
        match self {
            SqlDialect::Sqlite | SqlDialect::Postgres => format!("\"{}\"", name.replace('"', "\"\"")),
            SqlDialect::Mysql => format!("`{}`", name.replace('`', "``")),
        }
    }

    /// `column <> value` that is also true when the column is NULL
    pub fn null_safe_ne(&self, column: &str, placeholder: &str) -> String {
        match self {
            SqlDialect::Postgres => format!("{} IS DISTINCT FROM {}", column, placeholder),
            SqlDialect::Sqlite => format!("{} IS NOT {}", column, placeholder),
            SqlDialect::Mysql => format!("NOT ({} <=> {})", column, placeholder),
        }
    }

    /// Regex match; SQLite has no flag argument, so case folding goes into the pattern
    pub fn regex_match(&self, column: &str, placeholder: &str, case_insensitive: bool) -> String {
        match (self, case_insensitive) {
            (SqlDialect::Postgres, false) => format!("{} ~ {}", column, placeholder),
            (SqlDialect::Postgres, true) => format!("{} ~* {}", column, placeholder),
            (SqlDialect::Mysql, false) => format!("REGEXP_LIKE({}, {}, 'c')", column, placeholder),
            (SqlDialect::Mysql, true) => format!("REGEXP_LIKE({}, {}, 'i')", column, placeholder),
            (SqlDialect::Sqlite, _) => format!("{} REGEXP {}", column, placeholder),
        }
    }

    /// Pattern as bound for a regex match
    pub fn regex_pattern(&self, pattern: &str, case_insensitive: bool) -> String {
        match (self, case_insensitive) {
            (SqlDialect::Sqlite, true) => format!("(?i){}", pattern),
            _ => pattern.to_string(),
        }
    }
}

/// SQL dialect-aware code generator
pub struct DialectGenerator {
    pub dialect: SqlDialect,
}

impl DialectGenerator {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    /// Map a canonical field type to the dialect-specific column type
    pub fn map_type(&self, field_type: FieldType) -> &'static str {
        match (self.dialect, field_type) {
            (SqlDialect::Sqlite, FieldType::String) => "TEXT",
            (SqlDialect::Postgres, FieldType::String) => "TEXT",
            (SqlDialect::Mysql, FieldType::String) => "VARCHAR(255)",

            (SqlDialect::Sqlite, FieldType::Integer) => "INTEGER",
            (SqlDialect::Postgres, FieldType::Integer) => "BIGINT",
            (SqlDialect::Mysql, FieldType::Integer) => "BIGINT",

            (SqlDialect::Sqlite, FieldType::Float) => "REAL",
            (SqlDialect::Postgres, FieldType::Float) => "DOUBLE PRECISION",
            (SqlDialect::Mysql, FieldType::Float) => "DOUBLE",

            // Booleans
            (SqlDialect::Sqlite, FieldType::Boolean) => "INTEGER",
            (SqlDialect::Postgres, FieldType::Boolean) => "BOOLEAN",
            (SqlDialect::Mysql, FieldType::Boolean) => "TINYINT(1)",

            // Date/Time
            (SqlDialect::Sqlite, FieldType::Datetime) => "TEXT",
            (SqlDialect::Postgres, FieldType::Datetime) => "TIMESTAMPTZ",
            (SqlDialect::Mysql, FieldType::Datetime) => "DATETIME",

            // JSON
            (SqlDialect::Sqlite, FieldType::Json) => "TEXT",
            (SqlDialect::Postgres, FieldType::Json) => "JSONB",
            (SqlDialect::Mysql, FieldType::Json) => "JSON",
        }
    }

    /// Get the auto-increment syntax for a primary key column
    pub fn auto_increment_pk(&self, col_name: &str) -> String {
        let col_name = self.dialect.quote_ident(col_name);
        match self.dialect {
            SqlDialect::Sqlite => {
                format!("{} INTEGER PRIMARY KEY AUTOINCREMENT", col_name)
            }
            SqlDialect::Postgres => {
                format!("{} BIGSERIAL PRIMARY KEY", col_name)
            }
            SqlDialect::Mysql => {
                format!("{} BIGINT AUTO_INCREMENT PRIMARY KEY", col_name)
            }
        }
    }

    pub fn quote_ident(&self, name: &str) -> String {
        self.dialect.quote_ident(name)
    }

    /// Generate CREATE TABLE SQL
    pub fn create_table(&self, table: &str, columns: &[ColumnDef]) -> String {
        let mut col_defs = Vec::new();

        for col in columns {
            if col.is_auto_increment && col.is_primary_key {
                col_defs.push(self.auto_increment_pk(&col.name));
                continue;
            }

            let mut def = format!("{} {}", self.quote_ident(&col.name), self.map_type(col.col_type));
            if col.is_primary_key {
                def.push_str(" PRIMARY KEY");
            }
            if !col.nullable && !col.is_primary_key {
                def.push_str(" NOT NULL");
            }
            if let Some(ref fk) = col.foreign_key {
                def.push_str(&format!(
                    " REFERENCES {}({})",
                    self.quote_ident(&fk.table),
                    self.quote_ident(&fk.column)
                ));
                if fk.cascade {
                    def.push_str(" ON DELETE CASCADE");
                }
            }
            col_defs.push(def);
        }

        format!(
            "CREATE TABLE {} (\n  {}\n);",
            self.quote_ident(table),
            col_defs.join(",\n  ")
        )
    }

    /// Generate CREATE INDEX SQL
    pub fn create_index(&self, table: &str, index_name: &str, columns: &[&str], unique: bool) -> String {
        let unique_str = if unique { "UNIQUE " } else { "" };
        let col_list: Vec<String> = columns.iter().map(|c| self.quote_ident(c)).collect();
        format!(
            "CREATE {}INDEX {} ON {} ({});",
            unique_str,
            self.quote_ident(index_name),
            self.quote_ident(table),
            col_list.join(", ")
        )
    }
}

/// Column definition used by the dialect generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: String,
    pub col_type: FieldType,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_auto_increment: bool,
    pub foreign_key: Option<ForeignKeyDef>,
}

impl ColumnDef {
    pub fn new(name: &str, col_type: FieldType) -> Self {
        Self {
            name: name.to_string(),
            col_type,
            nullable: true,
            is_primary_key: false,
            is_auto_increment: false,
            foreign_key: None,
        }
    }
}

/// Foreign key definition for column defs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForeignKeyDef {
    pub table: String,
    pub column: String,
    /// Rows go away with the referenced row
    pub cascade: bool,
}
