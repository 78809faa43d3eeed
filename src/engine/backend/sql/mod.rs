//! Relational backend compiler
//!
//! Filters become a `SqlFilter` rooted at the model's table, rendered per
//! dialect. Updates become an ordered `SqlUpdatePlan`.

pub mod expr;
pub mod filter;
pub mod update;

pub use expr::{ColumnRef, CompareOp, JoinOn, SqlExpr, SqlJoin, SqlStatement, SqlWriter};
pub use filter::{EmbeddingStrategy, SqlFilter, ROOT_ALIAS};
pub use update::{SqlUpdatePlan, UpdateStep};

use std::sync::Arc;
use tracing::debug;

use super::{ensure_backend, BackendCompiler};
use crate::engine::adapter::SqlDialect;
use crate::engine::error::Result;
use crate::engine::model::{BackendModelDescriptor, ModelResolver};
use crate::engine::query::{Node, UpdateDocument};
use crate::engine::schema::BackendKind;
use filter::FilterBuilder;

pub struct SqlCompiler {
    dialect: SqlDialect,
    resolver: Arc<dyn ModelResolver>,
    strategy: EmbeddingStrategy,
}

impl SqlCompiler {
    pub fn new(dialect: SqlDialect, resolver: Arc<dyn ModelResolver>) -> Self {
        Self {
            dialect,
            resolver,
            strategy: EmbeddingStrategy::default(),
        }
    }

    /// Per-call choice between `EXISTS` and flattened joins for embeddings
    pub fn with_strategy(mut self, strategy: EmbeddingStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn strategy(&self) -> EmbeddingStrategy {
        self.strategy
    }
}

impl BackendCompiler for SqlCompiler {
    type Filter = SqlFilter;
    type Update = SqlUpdatePlan;

    fn backend(&self) -> BackendKind {
        BackendKind::Sql
    }

    fn compile_filter(&self, node: &Node, model: &BackendModelDescriptor) -> Result<SqlFilter> {
        ensure_backend(model, BackendKind::Sql)?;
        let filter = FilterBuilder::new(self.resolver.as_ref(), self.strategy).build(node, model)?;

        debug!(
            schema = %model.schema,
            dialect = %self.dialect,
            joins = filter.joins.len(),
            "Compiled relational filter"
        );
        Ok(filter)
    }

    fn compile_update(
        &self,
        update: &UpdateDocument,
        filter: &SqlFilter,
        model: &BackendModelDescriptor,
    ) -> Result<SqlUpdatePlan> {
        ensure_backend(model, BackendKind::Sql)?;
        let plan = update::plan_update(update, filter, model)?;

        debug!(
            schema = %model.schema,
            steps = plan.steps.len(),
            transactional = plan.requires_transaction(),
            "Compiled relational update"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::error::TranslateError;
    use crate::engine::model::{CompilerOptions, ModelCache, ModelRegistry};
    use crate::engine::query::QueryParser;
    use crate::engine::schema::{
        CanonicalField, Cardinality, EmbeddingField, FieldType, RelationshipField, SchemaCatalog, SchemaDescriptor,
    };
    use serde_json::json;

    fn registry() -> Arc<ModelRegistry> {
        let catalog = SchemaCatalog::new()
            .with(
                SchemaDescriptor::new("Book")
                    .field(CanonicalField::new("title", FieldType::String).indexed())
                    .field(CanonicalField::new("year", FieldType::Integer)),
            )
            .unwrap()
            .with(
                SchemaDescriptor::new("Library")
                    .field(CanonicalField::new("name", FieldType::String).indexed())
                    .field(CanonicalField::new("rating", FieldType::Float))
                    .field(EmbeddingField::new("books", Cardinality::Many, "Book"))
                    .field(RelationshipField::new("owner", Cardinality::One, "Owner")),
            )
            .unwrap()
            .with(SchemaDescriptor::new("Owner").field(CanonicalField::new("email", FieldType::String).indexed()))
            .unwrap();
        Arc::new(ModelRegistry::with_cache(catalog, CompilerOptions::default(), Arc::new(ModelCache::new())).unwrap())
    }

    fn compile(dialect: SqlDialect, strategy: EmbeddingStrategy, query: serde_json::Value) -> Result<SqlFilter> {
        let registry = registry();
        let model = registry.descriptor("Library", BackendKind::Sql)?;
        let compiler = SqlCompiler::new(dialect, registry).with_strategy(strategy);
        compiler.compile_filter(&QueryParser::parse(&query)?, &model)
    }

    fn select(query: serde_json::Value) -> SqlStatement {
        compile(SqlDialect::Sqlite, EmbeddingStrategy::Exists, query)
            .unwrap()
            .to_select(SqlDialect::Sqlite)
    }

    #[test]
    fn test_hairora_dune_uses_exists() {
        let statement = select(json!({"name": {"$eq": "Hairora"}, "books.title": {"$eq": "Dune"}}));
        assert_eq!(
            statement.sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"name\" = ? AND EXISTS (SELECT 1 FROM \
             \"library_books\" AS t1 WHERE t1.\"library_id\" = t0.\"id\" AND t1.\"title\" = ?)"
        );
        assert_eq!(statement.params, vec![json!("Hairora"), json!("Dune")]);
    }

    #[test]
    fn test_empty_filter_selects_everything() {
        assert_eq!(select(json!({})).sql, "SELECT t0.* FROM \"library\" AS t0");
    }

    #[test]
    fn test_empty_in_and_nin() {
        let none = compile(SqlDialect::Sqlite, EmbeddingStrategy::Exists, json!({"name": {"$in": []}})).unwrap();
        assert_eq!(none.condition, SqlExpr::False);

        let all = compile(SqlDialect::Sqlite, EmbeddingStrategy::Exists, json!({"name": {"$nin": []}})).unwrap();
        assert_eq!(all.condition, SqlExpr::True);
    }

    #[test]
    fn test_null_handling() {
        assert_eq!(select(json!({"name": null})).sql, "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"name\" IS NULL");
        assert_eq!(
            select(json!({"name": {"$nin": ["a"]}})).sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"name\" IS NULL OR t0.\"name\" NOT IN (?)"
        );
        assert_eq!(
            select(json!({"name": {"$in": ["a", null]}})).sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"name\" IN (?) OR t0.\"name\" IS NULL"
        );
    }

    #[test]
    fn test_null_safe_ne_per_dialect() {
        let query = json!({"name": {"$ne": "x"}});
        let where_clause = |dialect| {
            compile(dialect, EmbeddingStrategy::Exists, query.clone())
                .unwrap()
                .where_clause(dialect)
                .sql
        };
        assert_eq!(where_clause(SqlDialect::Postgres), "t0.\"name\" IS DISTINCT FROM $1");
        assert_eq!(where_clause(SqlDialect::Sqlite), "t0.\"name\" IS NOT ?");
        assert_eq!(where_clause(SqlDialect::Mysql), "NOT (t0.`name` <=> ?)");
    }

    #[test]
    fn test_negative_operator_across_children_is_not_exists() {
        let statement = select(json!({"books.title": {"$ne": "Dune"}}));
        assert_eq!(
            statement.sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE NOT (EXISTS (SELECT 1 FROM \"library_books\" AS t1 \
             WHERE t1.\"library_id\" = t0.\"id\" AND t1.\"title\" = ?))"
        );
    }

    #[test]
    fn test_relationship_exists() {
        let statement = select(json!({"owner.email": "a@b.c"}));
        assert_eq!(
            statement.sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE EXISTS (SELECT 1 FROM \"owner\" AS t1 \
             WHERE t1.\"id\" = t0.\"owner_id\" AND t1.\"email\" = ?)"
        );
    }

    #[test]
    fn test_flattened_join_shares_alias() {
        let filter = compile(
            SqlDialect::Sqlite,
            EmbeddingStrategy::FlattenedJoin,
            json!({"books.title": "Dune", "books.year": {"$gt": 1960}}),
        )
        .unwrap();

        assert_eq!(filter.joins.len(), 1);
        assert_eq!(
            filter.to_select(SqlDialect::Sqlite).sql,
            "SELECT DISTINCT t0.* FROM \"library\" AS t0 LEFT JOIN \"library_books\" AS t1 \
             ON t1.\"library_id\" = t0.\"id\" WHERE t1.\"title\" = ? AND t1.\"year\" > ?"
        );
    }

    #[derive(Clone, Default)]
    struct LogBuffer(Arc<std::sync::Mutex<Vec<u8>>>);

    impl std::io::Write for LogBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Run `f` under a subscriber that records formatted events
    fn with_logs<T>(f: impl FnOnce() -> T) -> (T, String) {
        let buffer = LogBuffer::default();
        let writer = buffer.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        let result = tracing::subscriber::with_default(subscriber, f);
        let logs = String::from_utf8_lossy(&buffer.0.lock().unwrap()).to_string();
        (result, logs)
    }

    #[test]
    fn test_flattened_join_under_logical_negation() {
        let (filter, logs) = with_logs(|| {
            compile(
                SqlDialect::Sqlite,
                EmbeddingStrategy::FlattenedJoin,
                json!({"$not": {"books.title": "Dune"}}),
            )
        });
        assert_eq!(
            filter.unwrap().to_select(SqlDialect::Sqlite).sql,
            "SELECT DISTINCT t0.* FROM \"library\" AS t0 LEFT JOIN \"library_books\" AS t1 \
             ON t1.\"library_id\" = t0.\"id\" WHERE NOT (t1.\"title\" = ?)"
        );
        assert!(logs.contains("matches per child row"), "missing warning in {:?}", logs);

        let (_, logs) = with_logs(|| {
            compile(
                SqlDialect::Sqlite,
                EmbeddingStrategy::FlattenedJoin,
                json!({"$nor": [{"books.year": {"$gt": 1960}}]}),
            )
        });
        assert!(logs.contains("matches per child row"));

        let (_, logs) = with_logs(|| {
            compile(SqlDialect::Sqlite, EmbeddingStrategy::FlattenedJoin, json!({"books.title": "Dune"}))
        });
        assert!(!logs.contains("matches per child row"));
    }

    #[test]
    fn test_exists_operator() {
        assert_eq!(
            select(json!({"name": {"$exists": true}})).sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"name\" IS NOT NULL"
        );
        assert_eq!(
            select(json!({"books.title": {"$exists": false}})).sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE NOT (EXISTS (SELECT 1 FROM \"library_books\" AS t1 \
             WHERE t1.\"library_id\" = t0.\"id\" AND t1.\"title\" IS NOT NULL))"
        );
    }

    #[test]
    fn test_document_only_operator_rejected() {
        for (query, expected) in [
            (json!({"name": {"$type": "string"}}), "$type"),
            (json!({"books.title": {"$all": ["Dune"]}}), "$all"),
            (json!({"rating": {"$mod": [2, 0]}}), "$mod"),
        ] {
            assert!(matches!(
                compile(SqlDialect::Sqlite, EmbeddingStrategy::Exists, query),
                Err(TranslateError::UnsupportedOperator { ref operator, backend: BackendKind::Sql, .. })
                    if operator == expected
            ));
        }
    }

    #[test]
    fn test_regex_rendering() {
        let filter = compile(
            SqlDialect::Sqlite,
            EmbeddingStrategy::Exists,
            json!({"name": {"$regex": "^hair", "$options": "i"}}),
        )
        .unwrap();
        let statement = filter.where_clause(SqlDialect::Sqlite);
        assert_eq!(statement.sql, "t0.\"name\" REGEXP ?");
        assert_eq!(statement.params, vec![json!("(?i)^hair")]);

        assert_eq!(filter.where_clause(SqlDialect::Postgres).sql, "t0.\"name\" ~* $1");
    }

    #[test]
    fn test_regex_outside_portable_subset() {
        for query in [
            json!({"name": {"$regex": "(?=x)"}}),
            json!({"name": {"$regex": "(a)\\1"}}),
            json!({"name": {"$regex": "x", "$options": "m"}}),
        ] {
            assert!(matches!(
                compile(SqlDialect::Postgres, EmbeddingStrategy::Exists, query),
                Err(TranslateError::UnsupportedOperator { .. })
            ));
        }
    }

    #[test]
    fn test_identity_accessor() {
        assert_eq!(
            select(json!({"id": 3})).sql,
            "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"id\" = ?"
        );
    }

    #[test]
    fn test_unknown_field() {
        assert!(matches!(
            compile(SqlDialect::Sqlite, EmbeddingStrategy::Exists, json!({"missing": 1})),
            Err(TranslateError::UnsupportedField { .. })
        ));
    }

    #[test]
    fn test_update_plan_replace_children() {
        let registry = registry();
        let model = registry.descriptor("Library", BackendKind::Sql).unwrap();
        let compiler = SqlCompiler::new(SqlDialect::Sqlite, registry);
        let filter = compiler
            .compile_filter(&QueryParser::parse(&json!({"name": "Hairora"})).unwrap(), &model)
            .unwrap();
        let update = UpdateDocument::parse(&json!({
            "rating": 4.5,
            "books": [{"title": "Dune", "year": 1965}]
        }))
        .unwrap();

        let plan = compiler.compile_update(&update, &filter, &model).unwrap();
        assert!(plan.requires_transaction());
        assert_eq!(plan.steps.len(), 3);

        let statements = plan.statements(SqlDialect::Sqlite, &[json!(1)]);
        let sql: Vec<&str> = statements.iter().map(|s| s.sql.as_str()).collect();
        assert_eq!(
            sql,
            vec![
                "UPDATE \"library\" SET \"rating\" = ? WHERE \"id\" IN (?)",
                "DELETE FROM \"library_books\" WHERE \"library_id\" IN (?)",
                "INSERT INTO \"library_books\" (\"library_id\", \"title\", \"year\") VALUES (?, ?, ?)",
            ]
        );
        assert_eq!(statements[2].params, vec![json!(1), json!("Dune"), json!(1965)]);
    }

    #[test]
    fn test_update_rejections() {
        let registry = registry();
        let model = registry.descriptor("Library", BackendKind::Sql).unwrap();
        let compiler = SqlCompiler::new(SqlDialect::Sqlite, registry);
        let filter = SqlFilter::all(&model).unwrap();
        let compile = |update: serde_json::Value| {
            compiler.compile_update(&UpdateDocument::parse(&update).unwrap(), &filter, &model)
        };

        assert!(matches!(
            compile(json!({"owner": {"email": "x"}})),
            Err(TranslateError::ReadOnlyRelationship(_))
        ));
        assert!(matches!(
            compile(json!({"$inc": {"rating": 1}})),
            Err(TranslateError::UnsupportedOperator { .. })
        ));
        assert!(matches!(
            compile(json!({"id": 9})),
            Err(TranslateError::UnsupportedField { .. })
        ));

        let plan = compile(json!({"books.title": "Untitled"})).unwrap();
        assert!(!plan.requires_transaction());
        assert!(matches!(&plan.steps[0], UpdateStep::UpdateChildren { table, .. } if table == "library_books"));
    }

    #[test]
    fn test_native_fragment_and_generic() {
        let registry = registry();
        let model = registry.descriptor("Library", BackendKind::Sql).unwrap();
        let compiler = SqlCompiler::new(SqlDialect::Postgres, registry);
        let native = SqlFilter::native(&model, "t0.rating > ?", vec![json!(3)]).unwrap();
        let generic = compiler
            .compile_filter(&QueryParser::parse(&json!({"books.title": "Dune"})).unwrap(), &model)
            .unwrap();

        let combined = native.and(generic).unwrap();
        assert_eq!(
            combined.where_clause(SqlDialect::Postgres).sql,
            "(t0.rating > $1) AND EXISTS (SELECT 1 FROM \"library_books\" AS t1 \
             WHERE t1.\"library_id\" = t0.\"id\" AND t1.\"title\" = $2)"
        );
    }

    #[test]
    fn test_native_fragment_param_count() {
        let registry = registry();
        let model = registry.descriptor("Library", BackendKind::Sql).unwrap();

        assert!(matches!(
            SqlFilter::native(&model, "t0.rating > ?", vec![json!(3), json!(4)]),
            Err(TranslateError::MalformedQuery(_))
        ));
        assert!(matches!(
            SqlFilter::native(&model, "t0.rating > ? AND t0.rating < ?", vec![json!(3)]),
            Err(TranslateError::MalformedQuery(_))
        ));
    }

    #[test]
    fn test_and_requires_same_table() {
        let registry = registry();
        let library = registry.descriptor("Library", BackendKind::Sql).unwrap();
        let owner = registry.descriptor("Owner", BackendKind::Sql).unwrap();

        let combined = SqlFilter::all(&library).unwrap().and(SqlFilter::all(&owner).unwrap());
        assert!(matches!(combined, Err(TranslateError::MalformedQuery(_))));
    }
}
