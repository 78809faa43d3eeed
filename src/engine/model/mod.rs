//! Schema Compiler
//!
//! (schema, backend) -> backend model descriptor, plus the registry that
//! caches descriptors for the life of the process.

pub mod compiler;
pub mod descriptor;
pub mod naming;
pub mod registry;

pub use compiler::{CompilerOptions, SchemaCompiler};
pub use descriptor::{
    BackendModelDescriptor, EmbeddedMapping, FieldMapping, IdentityMapping, MappingKind, Realization,
    RelationLink, RelationMapping, Resolved, ScalarMapping, ShadowField, ShadowKind,
};
pub use registry::{CacheStats, ModelCache, ModelRegistry, ModelResolver};
