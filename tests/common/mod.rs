#![allow(dead_code)]

use polystore_lib::engine::adapter::SqlDialect;
use polystore_lib::engine::hybrid::Translator;
use polystore_lib::engine::model::{CompilerOptions, ModelCache, ModelRegistry};
use polystore_lib::engine::schema::SchemaCatalog;
use std::sync::Arc;

pub const LIBRARY_CATALOG: &str = r#"{
  "schemas": [
    {
      "name": "Book",
      "fields": [
        {"kind": "scalar", "name": "title", "type": "string", "index": true},
        {"kind": "scalar", "name": "year", "type": "integer", "index": true}
      ]
    },
    {
      "name": "Owner",
      "fields": [
        {"kind": "scalar", "name": "email", "type": "string", "primary_key": true},
        {"kind": "scalar", "name": "display_name", "type": "string"}
      ]
    },
    {
      "name": "Library",
      "fields": [
        {"kind": "scalar", "name": "name", "type": "string", "index": true},
        {"kind": "scalar", "name": "rating", "type": "float", "index": true},
        {"kind": "scalar", "name": "summary", "type": "string", "index": true, "full_text_search": true},
        {"kind": "embedding", "name": "books", "cardinality": "many", "target": "Book"},
        {"kind": "relationship", "name": "owner", "cardinality": "one", "target": "Owner"}
      ]
    }
  ]
}"#;

pub fn catalog() -> SchemaCatalog {
    SchemaCatalog::from_json(LIBRARY_CATALOG).unwrap()
}

pub fn translator(dialect: SqlDialect) -> Translator {
    let registry = ModelRegistry::with_cache(catalog(), CompilerOptions::default(), Arc::new(ModelCache::new())).unwrap();
    Translator::new(Arc::new(registry)).with_dialect(dialect)
}
