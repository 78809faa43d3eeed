//! Polystore Configuration Module
//! Handles loading and validating polystore.config.json

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::adapter::SqlDialect;
use super::backend::EmbeddingStrategy;
use super::error::TranslateError;
use super::model::CompilerOptions;
use super::schema::{EmbedPolicy, SchemaCatalog};

pub const CONFIG_FILE: &str = "polystore.config.json";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),
    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("Invalid config format: {0}")]
    ParseError(#[from] serde_json::Error),
    #[error("Invalid schema catalog: {0}")]
    Catalog(#[from] TranslateError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    pub project: ProjectConfig,
    /// Schema catalog, relative to the project directory
    #[serde(default = "default_schemas")]
    pub schemas: PathBuf,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub sql: SqlConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default = "default_accessor")]
    pub accessor: String,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            accessor: default_accessor(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SqlConfig {
    #[serde(default)]
    pub dialect: SqlDialect,
    #[serde(default)]
    pub embedding_policy: EmbedPolicy,
    #[serde(default)]
    pub embedding_strategy: EmbeddingStrategy,
}

fn default_schemas() -> PathBuf {
    PathBuf::from("schemas.json")
}

fn default_accessor() -> String {
    "id".to_string()
}

impl Config {
    pub fn load(project_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Err(ConfigError::NotFound(config_path));
        }
        let content = std::fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    pub fn save(&self, project_dir: &Path) -> Result<(), ConfigError> {
        let config_path = project_dir.join(CONFIG_FILE);
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;
        Ok(())
    }

    pub fn default_for_project(name: &str) -> Self {
        Self {
            version: "0.1.0".to_string(),
            project: ProjectConfig {
                name: name.to_string(),
                id: format!("polystore-{}", name),
            },
            schemas: default_schemas(),
            identity: IdentityConfig::default(),
            sql: SqlConfig::default(),
        }
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        CompilerOptions {
            identity_accessor: self.identity.accessor.clone(),
            embed_policy: self.sql.embedding_policy,
        }
    }

    pub fn catalog_path(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.schemas)
    }

    /// Read and validate the schema catalog this config points at
    pub fn load_catalog(&self, project_dir: &Path) -> Result<SchemaCatalog, ConfigError> {
        let path = self.catalog_path(project_dir);
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(SchemaCatalog::from_json(&content)?)
    }
}
