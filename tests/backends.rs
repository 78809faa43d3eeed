mod common;

use polystore_lib::engine::adapter::SqlDialect;
use polystore_lib::engine::backend::DocumentFilter;
use polystore_lib::engine::error::TranslateError;
use polystore_lib::engine::hybrid::{CompiledFilter, CompiledUpdate, Translator};
use polystore_lib::engine::schema::BackendKind;
use serde_json::{json, Value};

fn filter(translator: &Translator, backend: BackendKind, query: Value) -> Result<CompiledFilter, TranslateError> {
    translator.translate_filter("Library", backend, Some(&query), None)
}

fn search(translator: &Translator, query: Value) -> String {
    match filter(translator, BackendKind::Search, query).unwrap() {
        CompiledFilter::Search(query) => query.to_string(),
        other => panic!("expected a search query, got {:?}", other),
    }
}

fn document(translator: &Translator, query: Value) -> Value {
    match filter(translator, BackendKind::Document, query).unwrap() {
        CompiledFilter::Document(filter) => filter.into_value(),
        other => panic!("expected a document filter, got {:?}", other),
    }
}

#[test]
fn test_one_query_three_backends() {
    let translator = common::translator(SqlDialect::Postgres);
    let query = json!({"name": "Hairora", "rating": {"$gte": 4}, "books.title": "Dune"});

    let CompiledFilter::Sql(sql) = filter(&translator, BackendKind::Sql, query.clone()).unwrap() else {
        panic!("expected a relational filter");
    };
    let statement = sql.to_select(SqlDialect::Postgres);
    assert_eq!(
        statement.sql,
        "SELECT t0.* FROM \"library\" AS t0 WHERE t0.\"name\" = $1 AND t0.\"rating\" >= $2 AND EXISTS \
         (SELECT 1 FROM \"library_books\" AS t1 WHERE t1.\"library_id\" = t0.\"id\" AND t1.\"title\" = $3)"
    );
    assert_eq!(statement.params, vec![json!("Hairora"), json!(4), json!("Dune")]);

    assert_eq!(
        search(&translator, query.clone()),
        "(@name:{Hairora} @rating:[4 +inf] @books\\.title:{Dune})"
    );
    assert_eq!(
        document(&translator, query),
        json!({"name": "Hairora", "rating": {"$gte": 4}, "books.title": "Dune"})
    );
}

#[test]
fn test_full_text_field_on_search() {
    let translator = common::translator(SqlDialect::Sqlite);
    assert_eq!(search(&translator, json!({"summary": "reading rooms"})), "@summary:\"reading rooms\"");
    assert_eq!(search(&translator, json!({"name": "Big Hall"})), "@name:{Big\\ Hall}");
}

#[test]
fn test_empty_sets_agree() {
    let translator = common::translator(SqlDialect::Sqlite);

    let CompiledFilter::Sql(sql) = filter(&translator, BackendKind::Sql, json!({"name": {"$nin": []}})).unwrap() else {
        panic!("expected a relational filter");
    };
    assert_eq!(sql.to_select(SqlDialect::Sqlite).sql, "SELECT t0.* FROM \"library\" AS t0");
    assert_eq!(search(&translator, json!({"name": {"$nin": []}})), "*");
    assert_eq!(search(&translator, json!({"name": {"$in": []}})), "(-*)");
}

#[test]
fn test_relationship_paths_per_backend() {
    let translator = common::translator(SqlDialect::Sqlite);
    let query = json!({"owner.email": "ann@example.com"});

    assert!(filter(&translator, BackendKind::Sql, query.clone()).is_ok());
    assert!(matches!(
        filter(&translator, BackendKind::Document, query),
        Err(TranslateError::UnsupportedField { .. })
    ));
}

#[test]
fn test_native_document_fragment_is_anded() {
    let translator = common::translator(SqlDialect::Sqlite);
    let compiled = translator
        .translate_filter(
            "Library",
            BackendKind::Document,
            Some(&json!({"name": "Hairora"})),
            Some(r#"{"$where": "this.rating > 4"}"#),
        )
        .unwrap();

    assert_eq!(
        compiled,
        CompiledFilter::Document(DocumentFilter::native(json!({
            "$and": [{"$where": "this.rating > 4"}, {"name": "Hairora"}]
        })))
    );
}

#[test]
fn test_updates_share_one_document() {
    let translator = common::translator(SqlDialect::Postgres);
    let update = json!({"rating": 5});
    let query = json!({"name": "Hairora"});

    let CompiledUpdate::Sql(plan) = translator
        .translate_update("Library", BackendKind::Sql, Some(&query), None, &update)
        .unwrap()
    else {
        panic!("expected a relational plan");
    };
    assert!(!plan.requires_transaction());
    let statements = plan.statements(SqlDialect::Postgres, &[json!(7)]);
    assert_eq!(statements[0].sql, "UPDATE \"library\" SET \"rating\" = $1 WHERE \"id\" IN ($2)");

    let CompiledUpdate::Search(search) = translator
        .translate_update("Library", BackendKind::Search, Some(&query), None, &update)
        .unwrap()
    else {
        panic!("expected a search update");
    };
    assert_eq!(search.assignments.len(), 1);
    assert_eq!(search.assignments[0].path, "$.rating");
    assert_eq!(search.assignments[0].value, json!(5));

    let CompiledUpdate::Document(doc) = translator
        .translate_update("Library", BackendKind::Document, Some(&query), None, &update)
        .unwrap()
    else {
        panic!("expected a document update");
    };
    assert_eq!(doc.filter.as_value(), &json!({"name": "Hairora"}));
    assert_eq!(doc.update, json!({"$set": {"rating": 5}}));
}

#[test]
fn test_conflicting_document_update() {
    let translator = common::translator(SqlDialect::Sqlite);
    let result = translator.translate_update(
        "Library",
        BackendKind::Document,
        None,
        None,
        &json!({"books": [], "$push": {"books.title": "Dune"}}),
    );
    assert!(matches!(result, Err(TranslateError::ConflictingUpdate(_))));
}
