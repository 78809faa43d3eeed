//! Native Adapter Layer
//!
//! SQL dialect spelling plus the factories that turn compiled models into
//! native persistence artifacts (table DDL for the relational backend).

pub mod dialect;
pub mod factory;

pub use dialect::{ColumnDef, DialectGenerator, ForeignKeyDef, SqlDialect};
pub use factory::{NativeModelFactory, SqlTableFactory, TableDefinition, TableSet};
