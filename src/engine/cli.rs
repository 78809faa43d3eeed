//! Polystore CLI Module
//! Command-line interface for compiling schemas, filters and updates

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::schema::BackendKind;

pub mod formatter;

#[derive(Parser, Debug)]
#[command(name = "polystore")]
#[command(author = "Polystore Team")]
#[command(version)]
#[command(about = "Compile canonical schemas and queries to SQL, search and document backends", long_about = None)]
pub struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub project: Option<PathBuf>,

    /// Output format (json for scripting)
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new Polystore project
    Init {
        /// Project name
        #[arg(short, long)]
        name: String,
    },

    /// Show compiled models for a backend
    Models {
        /// Target backend (sql, search, document)
        #[arg(short, long, value_parser = parse_backend)]
        backend: BackendKind,

        /// Only this schema
        #[arg(short, long)]
        schema: Option<String>,
    },

    /// Compile a filter
    Filter {
        /// Schema to query
        #[arg(short, long)]
        schema: String,

        /// Target backend (sql, search, document)
        #[arg(short, long, value_parser = parse_backend)]
        backend: BackendKind,

        /// Generic query as JSON
        #[arg(short, long)]
        query: Option<String>,

        /// Native fragment ANDed with the query
        #[arg(short, long)]
        native: Option<String>,
    },

    /// Compile an update
    Update {
        /// Schema to update
        #[arg(short, long)]
        schema: String,

        /// Target backend (sql, search, document)
        #[arg(short, long, value_parser = parse_backend)]
        backend: BackendKind,

        /// Generic query selecting the records
        #[arg(short, long)]
        query: Option<String>,

        /// Native fragment ANDed with the query
        #[arg(short, long)]
        native: Option<String>,

        /// Update document as JSON
        #[arg(long)]
        set: String,
    },
}

fn parse_backend(value: &str) -> Result<BackendKind, String> {
    BackendKind::from_str(value).ok_or_else(|| format!("unknown backend '{}' (expected sql, search or document)", value))
}

impl Cli {
    pub fn get_project_dir(&self) -> PathBuf {
        self.project
            .clone()
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_command() {
        let cli = Cli::try_parse_from([
            "polystore",
            "--format",
            "json",
            "filter",
            "--schema",
            "Library",
            "--backend",
            "mongo",
            "--query",
            r#"{"name": "Hairora"}"#,
        ])
        .unwrap();

        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Filter { schema, backend, query, native } => {
                assert_eq!(schema, "Library");
                assert_eq!(backend, BackendKind::Document);
                assert_eq!(query.as_deref(), Some(r#"{"name": "Hairora"}"#));
                assert!(native.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_backend() {
        assert!(Cli::try_parse_from(["polystore", "models", "--backend", "graph"]).is_err());
    }

    #[test]
    fn test_update_requires_set() {
        assert!(Cli::try_parse_from(["polystore", "update", "-s", "Library", "-b", "sql"]).is_err());
    }
}
