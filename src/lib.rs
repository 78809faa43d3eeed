//! Polystore - one canonical schema and query vocabulary compiled to
//! relational, search and document backends

pub mod engine;

pub use engine::adapter::{SqlDialect, SqlTableFactory};
pub use engine::backend::{BackendCompiler, DocumentCompiler, EmbeddingStrategy, SearchCompiler, SqlCompiler};
pub use engine::config::Config;
pub use engine::error::{Result, TranslateError};
pub use engine::hybrid::{CompiledFilter, CompiledUpdate, NativeExpression, Translator};
pub use engine::model::{BackendModelDescriptor, CompilerOptions, ModelCache, ModelRegistry};
pub use engine::query::{Node, QueryParser, UpdateDocument};
pub use engine::schema::{BackendKind, SchemaCatalog, SchemaDescriptor};
