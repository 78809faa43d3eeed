//! CLI Output Formatting Module
//! Provides consistent, colorized output for terminal UX

use colored::Colorize;

use crate::engine::adapter::SqlDialect;
use crate::engine::model::{MappingKind, Realization, RelationLink};

pub struct CliFormatter;

impl CliFormatter {
    /// Print a success message
    pub fn success(message: &str) {
        println!("{} {}", "✓".green().bold(), message);
    }

    /// Print an error message
    pub fn error(message: &str) {
        eprintln!("{} {}", "✗".red().bold(), message);
    }

    pub fn warning(message: &str) {
        println!("{} {}", "⚠".yellow().bold(), message);
    }

    pub fn info(message: &str) {
        println!("{} {}", "ℹ".blue().bold(), message);
    }

    /// Print a section header
    pub fn header(title: &str) {
        println!("\n{}", title.bright_cyan().bold());
        println!("{}", "─".repeat(title.chars().count()).bright_black());
    }

    /// Print a key-value pair
    pub fn kv(key: &str, value: &str) {
        println!("  {}: {}", key.bright_white().bold(), value);
    }

    pub fn item(text: &str) {
        println!("  {} {}", "•".bright_black(), text);
    }

    /// Print a compiled statement with its bound parameters
    pub fn statement(dialect: SqlDialect, sql: &str, params: &[String]) {
        Self::code_block(sql, "sql");
        for (index, param) in params.iter().enumerate() {
            println!("  {} {}", param_label(dialect, index + 1).bright_black(), param);
        }
    }

    /// Print a code block
    pub fn code_block(code: &str, language: &str) {
        println!("\n{}", format!("```{}", language).bright_black());
        for line in code.lines() {
            println!("  {}", line.bright_white());
        }
        println!("{}\n", "```".bright_black());
    }
}

/// `$n` where the dialect numbers placeholders, `?n` for positional `?`
pub fn param_label(dialect: SqlDialect, position: usize) -> String {
    match dialect.placeholder(position) {
        placeholder if placeholder == "?" => format!("?{}", position),
        placeholder => placeholder,
    }
}

/// Render a bound parameter the way it would appear in a log line
pub fn format_param(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        serde_json::Value::Null => "NULL".to_string(),
        other => other.to_string(),
    }
}

/// One-line summary of how a field is realized natively
pub fn describe_mapping(kind: &MappingKind) -> String {
    match kind {
        MappingKind::Scalar(scalar) => {
            let mut text = format!("{:?}", scalar.field_type).to_lowercase();
            if scalar.primary_key {
                text.push_str(", primary key");
            }
            if scalar.indexed {
                text.push_str(", indexed");
            }
            if scalar.full_text {
                text.push_str(", full text");
            }
            text
        }
        MappingKind::Embedded(embedded) => {
            let realized = match &embedded.realization {
                Realization::Inline => "inline".to_string(),
                Realization::OwnedChild { parent_key } => {
                    format!("rows in {} via {}", embedded.model.container, parent_key)
                }
                Realization::ForeignKey { column } => format!("row in {} via {}", embedded.model.container, column),
            };
            format!("embeds {} ({:?}), {}", embedded.model.schema, embedded.cardinality, realized)
        }
        MappingKind::Relation(relation) => {
            let linked = match &relation.link {
                RelationLink::ForeignKey { column, .. } => format!("via {}", column),
                RelationLink::BackReference { column, .. } => format!("back through {}", column),
                RelationLink::LinkTable { table, .. } => format!("through {}", table),
                RelationLink::StoredIdentifier => "stored identifier".to_string(),
            };
            format!("relates {} ({:?}), {}", relation.target, relation.cardinality, linked)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::model::{RelationMapping, ScalarMapping};
    use crate::engine::schema::{Cardinality, FieldType};
    use serde_json::json;

    #[test]
    fn test_format_param() {
        assert_eq!(format_param(&json!("O'Brien")), "'O''Brien'");
        assert_eq!(format_param(&json!(null)), "NULL");
        assert_eq!(format_param(&json!(4.5)), "4.5");
        assert_eq!(format_param(&json!(true)), "true");
    }

    #[test]
    fn test_param_label_follows_dialect() {
        assert_eq!(param_label(SqlDialect::Postgres, 2), "$2");
        assert_eq!(param_label(SqlDialect::Sqlite, 2), "?2");
        assert_eq!(param_label(SqlDialect::Mysql, 1), "?1");
    }

    #[test]
    fn test_describe_mapping() {
        let scalar = MappingKind::Scalar(ScalarMapping {
            field_type: FieldType::String,
            indexed: true,
            full_text: false,
            primary_key: false,
        });
        assert_eq!(describe_mapping(&scalar), "string, indexed");

        let relation = MappingKind::Relation(RelationMapping {
            cardinality: Cardinality::One,
            target: "Owner".to_string(),
            link: RelationLink::ForeignKey {
                column: "owner_id".to_string(),
                target_column: "id".to_string(),
            },
            requires_separate_fetch: false,
        });
        assert_eq!(describe_mapping(&relation), "relates Owner (One), via owner_id");
    }
}
