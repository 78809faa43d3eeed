//! Model Registry
//!
//! Compiled descriptors are cached process-wide, keyed by catalog
//! fingerprint, schema and backend. Backend compilers reach related models
//! through `ModelResolver` instead of holding the catalog themselves.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, RwLock};
use tracing::debug;

use super::compiler::{CompilerOptions, SchemaCompiler};
use super::descriptor::BackendModelDescriptor;
use crate::engine::error::Result;
use crate::engine::schema::{BackendKind, SchemaCatalog};

/// Looks up the compiled model of a schema on a backend
pub trait ModelResolver: Send + Sync {
    fn resolve(&self, schema: &str, backend: BackendKind) -> Result<Arc<BackendModelDescriptor>>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    fingerprint: String,
    schema: String,
    backend: BackendKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub size: usize,
}

#[derive(Debug, Default)]
pub struct ModelCache {
    models: RwLock<HashMap<CacheKey, Arc<BackendModelDescriptor>>>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

static GLOBAL_CACHE: OnceLock<Arc<ModelCache>> = OnceLock::new();

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide cache
    pub fn global() -> Arc<ModelCache> {
        GLOBAL_CACHE.get_or_init(|| Arc::new(ModelCache::new())).clone()
    }

    fn get(&self, key: &CacheKey) -> Option<Arc<BackendModelDescriptor>> {
        let models = self.models.read().unwrap_or_else(|poisoned| poisoned.into_inner());
        let found = models.get(key).cloned();
        match found {
            Some(_) => self.hits.fetch_add(1, Ordering::Relaxed),
            None => self.misses.fetch_add(1, Ordering::Relaxed),
        };
        found
    }

    /// First writer wins; a racing compile of the same key returns the stored model
    fn insert(&self, key: CacheKey, model: BackendModelDescriptor) -> Arc<BackendModelDescriptor> {
        let mut models = self.models.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        models.entry(key).or_insert_with(|| Arc::new(model)).clone()
    }

    pub fn stats(&self) -> CacheStats {
        let size = self.models.read().map(|m| m.len()).unwrap_or_default();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            size,
        }
    }

    pub fn clear(&self) {
        let mut models = self.models.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        models.clear();
    }
}

/// A catalog plus compiler options, serving cached descriptors
pub struct ModelRegistry {
    catalog: Arc<SchemaCatalog>,
    options: CompilerOptions,
    fingerprint: String,
    cache: Arc<ModelCache>,
}

impl ModelRegistry {
    /// Registry backed by the process-wide cache
    pub fn new(catalog: SchemaCatalog, options: CompilerOptions) -> Result<Self> {
        Self::with_cache(catalog, options, ModelCache::global())
    }

    pub fn with_cache(catalog: SchemaCatalog, options: CompilerOptions, cache: Arc<ModelCache>) -> Result<Self> {
        // Options change the compiled output, so they are part of the key
        let fingerprint = format!(
            "{}:{}:{:?}",
            catalog.fingerprint()?,
            options.identity_accessor,
            options.embed_policy
        );
        Ok(Self {
            catalog: Arc::new(catalog),
            options,
            fingerprint,
            cache,
        })
    }

    pub fn catalog(&self) -> &SchemaCatalog {
        &self.catalog
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Cached descriptor, compiled on first use
    pub fn descriptor(&self, schema: &str, backend: BackendKind) -> Result<Arc<BackendModelDescriptor>> {
        let key = CacheKey {
            fingerprint: self.fingerprint.clone(),
            schema: schema.to_string(),
            backend,
        };

        if let Some(model) = self.cache.get(&key) {
            debug!(schema, %backend, "Model cache hit");
            return Ok(model);
        }

        debug!(schema, %backend, "Model cache miss");
        let model = SchemaCompiler::new(&self.catalog, &self.options).compile(schema, backend)?;
        Ok(self.cache.insert(key, model))
    }

    /// Every schema of the catalog compiled for `backend`, in name order
    pub fn descriptors(&self, backend: BackendKind) -> Result<Vec<Arc<BackendModelDescriptor>>> {
        self.catalog
            .names()
            .map(|name| self.descriptor(name, backend))
            .collect()
    }
}

impl ModelResolver for ModelRegistry {
    fn resolve(&self, schema: &str, backend: BackendKind) -> Result<Arc<BackendModelDescriptor>> {
        self.descriptor(schema, backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::schema::{CanonicalField, FieldType, SchemaDescriptor};
    use std::thread;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::new()
            .with(SchemaDescriptor::new("Todo").field(CanonicalField::new("title", FieldType::String).indexed()))
            .unwrap()
    }

    #[test]
    fn test_descriptor_is_cached() {
        let registry = ModelRegistry::with_cache(catalog(), CompilerOptions::default(), Arc::new(ModelCache::new())).unwrap();

        let first = registry.descriptor("Todo", BackendKind::Sql).unwrap();
        let second = registry.descriptor("Todo", BackendKind::Sql).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = registry.cache().stats();
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_options_are_part_of_the_key() {
        let cache = Arc::new(ModelCache::new());
        let default = ModelRegistry::with_cache(catalog(), CompilerOptions::default(), cache.clone()).unwrap();
        let custom = ModelRegistry::with_cache(
            catalog(),
            CompilerOptions {
                identity_accessor: "key".to_string(),
                ..CompilerOptions::default()
            },
            cache.clone(),
        )
        .unwrap();

        let a = default.descriptor("Todo", BackendKind::Document).unwrap();
        let b = custom.descriptor("Todo", BackendKind::Document).unwrap();
        assert_ne!(a.identity, b.identity);
        assert_eq!(cache.stats().size, 2);
    }

    #[test]
    fn test_concurrent_first_compile_converges() {
        let registry = Arc::new(
            ModelRegistry::with_cache(catalog(), CompilerOptions::default(), Arc::new(ModelCache::new())).unwrap(),
        );

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || registry.descriptor("Todo", BackendKind::Search).unwrap())
            })
            .collect();
        let models: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(models.windows(2).all(|pair| pair[0] == pair[1]));
        assert_eq!(registry.cache().stats().size, 1);
    }

    #[test]
    fn test_unknown_schema_not_cached() {
        let registry = ModelRegistry::with_cache(catalog(), CompilerOptions::default(), Arc::new(ModelCache::new())).unwrap();
        assert!(registry.resolve("Missing", BackendKind::Sql).is_err());
        assert_eq!(registry.cache().stats().size, 0);
    }
}
