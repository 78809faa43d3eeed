//! Naming conventions per backend

use convert_case::{Case, Casing};

use crate::engine::schema::{BackendKind, SchemaDescriptor};

/// Generated relational identity column
pub const SQL_IDENTITY: &str = "id";
/// Native document identity
pub const DOCUMENT_IDENTITY: &str = "_id";
/// Native search-store primary key
pub const SEARCH_IDENTITY: &str = "pk";

pub fn native_identity(backend: BackendKind) -> &'static str {
    match backend {
        BackendKind::Sql => SQL_IDENTITY,
        BackendKind::Search => SEARCH_IDENTITY,
        BackendKind::Document => DOCUMENT_IDENTITY,
    }
}

/// Table, index or collection name of a persisted schema
pub fn container_name(schema: &SchemaDescriptor, backend: BackendKind) -> String {
    if let Some(container) = &schema.container {
        return container.clone();
    }
    match backend {
        BackendKind::Sql => schema.name.to_case(Case::Snake),
        BackendKind::Search => format!("{}:index", schema.name.to_case(Case::Snake)),
        BackendKind::Document => schema.name.clone(),
    }
}

/// Token of a declared field; names are used unchanged on every backend
pub fn field_token(name: &str) -> String {
    name.to_string()
}

/// Owned child table: `<parent_table>_<field>`
pub fn child_table(parent_table: &str, field: &str) -> String {
    format!("{}_{}", parent_table, field.to_case(Case::Snake))
}

/// Column on a child or target table pointing at `table`
pub fn parent_key(table: &str) -> String {
    format!("{}_id", table)
}

/// Column on the source table referencing the entity behind `field`
pub fn reference_column(field: &str) -> String {
    format!("{}_id", field.to_case(Case::Snake))
}
