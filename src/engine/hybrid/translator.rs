//! Translator facade
//!
//! parse -> resolve descriptor (cached) -> compile -> compose, for filters
//! and updates on any backend.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

use super::composer::compose;
use crate::engine::adapter::SqlDialect;
use crate::engine::backend::{
    BackendCompiler, DocumentCompiler, DocumentFilter, DocumentUpdate, EmbeddingStrategy, SearchCompiler, SearchQuery,
    SearchUpdate, SqlCompiler, SqlFilter, SqlUpdatePlan,
};
use crate::engine::error::Result;
use crate::engine::model::ModelRegistry;
use crate::engine::query::{QueryParser, UpdateDocument};
use crate::engine::schema::BackendKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "backend", content = "filter", rename_all = "lowercase")]
pub enum CompiledFilter {
    Sql(SqlFilter),
    Search(SearchQuery),
    Document(DocumentFilter),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "backend", content = "update", rename_all = "lowercase")]
pub enum CompiledUpdate {
    Sql(SqlUpdatePlan),
    Search(SearchUpdate),
    Document(DocumentUpdate),
}

pub struct Translator {
    registry: Arc<ModelRegistry>,
    dialect: SqlDialect,
    strategy: EmbeddingStrategy,
}

impl Translator {
    pub fn new(registry: Arc<ModelRegistry>) -> Self {
        Self {
            registry,
            dialect: SqlDialect::default(),
            strategy: EmbeddingStrategy::default(),
        }
    }

    pub fn with_dialect(mut self, dialect: SqlDialect) -> Self {
        self.dialect = dialect;
        self
    }

    pub fn with_strategy(mut self, strategy: EmbeddingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn sql_compiler(&self) -> SqlCompiler {
        SqlCompiler::new(self.dialect, self.registry.clone()).with_strategy(self.strategy)
    }

    /// Compose `native` with the compiled `query`; a missing query adds nothing
    pub fn filter<C: BackendCompiler>(
        &self,
        compiler: &C,
        schema: &str,
        query: Option<&Value>,
        native: Option<C::Filter>,
    ) -> Result<C::Filter> {
        let model = self.registry.descriptor(schema, compiler.backend())?;
        let generic = match query {
            Some(query) => Some(compiler.compile_filter(&QueryParser::parse(query)?, &model)?),
            None => None,
        };
        compose(native, generic, &model)
    }

    pub fn update<C: BackendCompiler>(
        &self,
        compiler: &C,
        schema: &str,
        query: Option<&Value>,
        native: Option<C::Filter>,
        update: &Value,
    ) -> Result<C::Update> {
        let model = self.registry.descriptor(schema, compiler.backend())?;
        let filter = self.filter(compiler, schema, query, native)?;
        compiler.compile_update(&UpdateDocument::parse(update)?, &filter, &model)
    }

    /// Filter on a backend chosen at runtime. `native` is raw SQL over `t0`,
    /// a raw search query, or a JSON filter document.
    pub fn translate_filter(
        &self,
        schema: &str,
        backend: BackendKind,
        query: Option<&Value>,
        native: Option<&str>,
    ) -> Result<CompiledFilter> {
        debug!(schema, %backend, native = native.is_some(), "Translating filter");
        Ok(match backend {
            BackendKind::Sql => {
                let native = self.sql_native(schema, native)?;
                CompiledFilter::Sql(self.filter(&self.sql_compiler(), schema, query, native)?)
            }
            BackendKind::Search => {
                let native = self.search_native(schema, native)?;
                CompiledFilter::Search(self.filter(&SearchCompiler::new(), schema, query, native)?)
            }
            BackendKind::Document => {
                let native = document_native(native)?;
                CompiledFilter::Document(self.filter(&DocumentCompiler::new(), schema, query, native)?)
            }
        })
    }

    pub fn translate_update(
        &self,
        schema: &str,
        backend: BackendKind,
        query: Option<&Value>,
        native: Option<&str>,
        update: &Value,
    ) -> Result<CompiledUpdate> {
        debug!(schema, %backend, "Translating update");
        Ok(match backend {
            BackendKind::Sql => {
                let native = self.sql_native(schema, native)?;
                CompiledUpdate::Sql(self.update(&self.sql_compiler(), schema, query, native, update)?)
            }
            BackendKind::Search => {
                let native = self.search_native(schema, native)?;
                CompiledUpdate::Search(self.update(&SearchCompiler::new(), schema, query, native, update)?)
            }
            BackendKind::Document => {
                let native = document_native(native)?;
                CompiledUpdate::Document(self.update(&DocumentCompiler::new(), schema, query, native, update)?)
            }
        })
    }

    fn sql_native(&self, schema: &str, native: Option<&str>) -> Result<Option<SqlFilter>> {
        let Some(sql) = native else {
            return Ok(None);
        };
        let model = self.registry.descriptor(schema, BackendKind::Sql)?;
        SqlFilter::native(&model, sql, Vec::new()).map(Some)
    }

    fn search_native(&self, schema: &str, native: Option<&str>) -> Result<Option<SearchQuery>> {
        let Some(query) = native else {
            return Ok(None);
        };
        let model = self.registry.descriptor(schema, BackendKind::Search)?;
        Ok(Some(SearchQuery::native(&model, query)))
    }
}

fn document_native(native: Option<&str>) -> Result<Option<DocumentFilter>> {
    native
        .map(|document| -> Result<DocumentFilter> { Ok(DocumentFilter::native(serde_json::from_str(document)?)) })
        .transpose()
}
