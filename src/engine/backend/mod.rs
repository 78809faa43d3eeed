//! Backend compilers
//!
//! Each backend turns a generic filter tree and update document into its own
//! native form, reading field placement from the model descriptor only.

pub mod document;
pub mod search;
pub mod sql;

pub use document::{DocumentCompiler, DocumentFilter, DocumentUpdate};
pub use search::{Bound, JsonAssignment, SearchCompiler, SearchExpr, SearchQuery, SearchUpdate};
pub use sql::{EmbeddingStrategy, SqlCompiler, SqlFilter, SqlStatement, SqlUpdatePlan, UpdateStep};

use crate::engine::error::{Result, TranslateError};
use crate::engine::hybrid::NativeExpression;
use crate::engine::model::BackendModelDescriptor;
use crate::engine::query::{Node, UpdateDocument};
use crate::engine::schema::BackendKind;

pub trait BackendCompiler {
    /// Native filter form, combinable with caller-written fragments
    type Filter: NativeExpression;
    type Update;

    fn backend(&self) -> BackendKind;

    fn compile_filter(&self, node: &Node, model: &BackendModelDescriptor) -> Result<Self::Filter>;

    /// `filter` selects the entities the update applies to
    fn compile_update(
        &self,
        update: &UpdateDocument,
        filter: &Self::Filter,
        model: &BackendModelDescriptor,
    ) -> Result<Self::Update>;
}

pub(crate) fn ensure_backend(model: &BackendModelDescriptor, backend: BackendKind) -> Result<()> {
    if model.backend == backend {
        return Ok(());
    }
    Err(TranslateError::invalid_schema(
        &model.schema,
        format!("descriptor was compiled for {}, not {}", model.backend, backend),
    ))
}
