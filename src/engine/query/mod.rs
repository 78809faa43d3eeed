//! Unified query vocabulary
//!
//! Generic filter and update documents, parsed into a backend-agnostic AST.

pub mod ast;
pub mod parser;
pub mod update;

pub use ast::{Comparison, Connective, DocumentOperator, FieldPath, Node, Predicate};
pub use parser::QueryParser;
pub use update::{first_overlap, native_document, Assignment, NativeUpdate, UpdateDocument, UpdateOperator};
