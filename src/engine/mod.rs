// Polystore Engine - Core module structure
pub mod error;
pub mod schema;
pub mod model;
pub mod query;
pub mod backend;
pub mod adapter;
pub mod hybrid;
pub mod config;
pub mod cli;

pub use config::Config;
pub use error::{Result, TranslateError};
pub use hybrid::Translator;
pub use model::ModelRegistry;
pub use schema::SchemaCatalog;
