mod common;

use polystore_lib::engine::adapter::SqlDialect;
use polystore_lib::engine::backend::EmbeddingStrategy;
use polystore_lib::engine::config::{Config, ConfigError, CONFIG_FILE};
use polystore_lib::engine::schema::EmbedPolicy;

#[test]
fn test_config_round_trip() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;

    let mut config = Config::default_for_project("shop");
    config.sql.dialect = SqlDialect::Postgres;
    config.sql.embedding_policy = EmbedPolicy::ForeignKey;
    config.sql.embedding_strategy = EmbeddingStrategy::FlattenedJoin;
    config.save(dir.path())?;

    assert!(dir.path().join(CONFIG_FILE).exists());
    let loaded = Config::load(dir.path())?;
    assert_eq!(loaded, config);
    assert_eq!(loaded.project.id, "polystore-shop");
    Ok(())
}

#[test]
fn test_missing_config() {
    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(Config::load(dir.path()), Err(ConfigError::NotFound(_))));
}

#[test]
fn test_load_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = Config::default_for_project("library");
    config.save(dir.path())?;

    assert!(matches!(config.load_catalog(dir.path()), Err(ConfigError::NotFound(_))));

    std::fs::write(dir.path().join("schemas.json"), common::LIBRARY_CATALOG)?;
    let catalog = config.load_catalog(dir.path())?;
    assert_eq!(catalog.names().collect::<Vec<_>>(), vec!["Book", "Library", "Owner"]);
    Ok(())
}

#[test]
fn test_invalid_catalog() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let config = Config::default_for_project("broken");
    std::fs::write(
        dir.path().join("schemas.json"),
        r#"{"schemas": [{"name": "A", "fields": [{"kind": "scalar", "name": "x", "type": "color"}]}]}"#,
    )?;

    let err = config.load_catalog(dir.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Catalog(_)));
    Ok(())
}
