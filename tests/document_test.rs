mod common;

use common::{FakeDocumentStore, ScriptedLlm};
use mongodb::bson::oid::ObjectId;
use mongodb::bson::{doc, DateTime, Document};
use spyne_nlq::context::{QueryOptions, RequestContext};
use spyne_nlq::error::NlqError;
use spyne_nlq::llm::ResponseFormat;
use spyne_nlq::query_builder::{parse_pipeline, QueryBuilder, ResultSet};
use spyne_nlq::schema::{SchemaIntrospector, SchemaSource};
use std::sync::Arc;

fn store() -> FakeDocumentStore {
    FakeDocumentStore::new("app")
        .with_collection(
            "users",
            vec![
                doc! { "_id": ObjectId::new(), "email": "a@example.com" },
                doc! { "_id": ObjectId::new(), "email": "b@example.com", "age": 31 },
            ],
        )
        .with_collection("orders", vec![doc! { "_id": ObjectId::new(), "total": 12.5 }])
        .with_collection("audit", vec![])
        .with_index("users", "email_1", doc! { "email": 1 })
}

fn session(backend: Arc<FakeDocumentStore>, llm: Arc<ScriptedLlm>) -> QueryBuilder {
    QueryBuilder::new(SchemaSource::Document(backend), llm)
}

#[tokio::test]
async fn test_fields_come_from_samples_and_empty_collections_are_omitted() {
    let introspector = SchemaIntrospector::new(SchemaSource::Document(Arc::new(store())), None);
    let schema = introspector.load_schema().await.unwrap();

    assert!(!schema.contains_key("audit"));
    assert_eq!(schema.len(), 2);

    let users = schema["users"].as_collection().unwrap();
    let fields: Vec<(&str, &str)> = users
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f.type_name.as_str()))
        .collect();
    assert_eq!(fields, vec![("_id", "objectId"), ("email", "string"), ("age", "int")]);
    assert_eq!(users.indexes, vec![r#"{ "email": 1 }"#.to_string()]);

    let orders = schema["orders"].as_collection().unwrap();
    assert!(orders.indexes.is_empty());
}

#[tokio::test]
async fn test_missing_database_name_is_configuration_error() {
    let backend = Arc::new(FakeDocumentStore::without_database().with_collection("users", vec![]));
    let introspector = SchemaIntrospector::new(SchemaSource::Document(backend), None);

    let err = introspector.load_schema().await.unwrap_err();
    assert!(matches!(err, NlqError::Configuration(_)));
}

#[test]
fn test_pipeline_shapes_normalize() {
    let expected = vec![doc! { "$match": {} }];
    for text in [
        r#"[{"$match": {}}]"#,
        r#"{"$match": {}}"#,
        r#"{"pipeline": [{"$match": {}}]}"#,
    ] {
        assert_eq!(parse_pipeline(text).unwrap(), expected, "input: {}", text);
    }
}

#[test]
fn test_pipeline_rejects_non_pipelines() {
    for text in ["not json", "[1,2,3]", "null"] {
        let err = parse_pipeline(text).unwrap_err();
        assert!(
            matches!(err, NlqError::MalformedQuery(_)),
            "input {} gave {:?}",
            text,
            err
        );
    }
}

#[tokio::test]
async fn test_execute_requires_selected_collection() {
    let backend = Arc::new(store());
    let qb = session(backend.clone(), Arc::new(ScriptedLlm::default()));

    let err = qb
        .execute_query(&RequestContext::new(), r#"[{"$count": "n"}]"#)
        .await
        .unwrap_err();

    assert!(matches!(err, NlqError::Selection(_)));
    assert!(backend.aggregations().is_empty());
}

#[tokio::test]
async fn test_malformed_pipeline_never_reaches_backend() {
    let backend = Arc::new(store());
    let qb = session(backend.clone(), Arc::new(ScriptedLlm::default()));

    let err = qb
        .execute_query(&RequestContext::with_target("users"), "[1,2,3]")
        .await
        .unwrap_err();

    assert!(matches!(err, NlqError::MalformedQuery(_)));
    assert!(backend.aggregations().is_empty());
}

#[tokio::test]
async fn test_generate_with_target_collection_then_execute() {
    let backend = Arc::new(store().answering(vec![doc! { "total": 2 }]));
    let llm = Arc::new(ScriptedLlm::new(&[
        "```json\n{\"pipeline\": [{\"$count\": \"total\"}]}\n```",
    ]));
    let qb = session(backend.clone(), llm.clone());

    let mut ctx = RequestContext::new();
    let text = qb
        .generate_query(&mut ctx, "how many users", &QueryOptions::target_collection("users"))
        .await
        .unwrap();
    assert_eq!(text, r#"{"pipeline": [{"$count": "total"}]}"#);
    assert_eq!(ctx.target(), Some("users"));

    let results = qb.execute_query(&ctx, &text).await.unwrap();
    assert_eq!(results, ResultSet::Documents(vec![doc! { "total": 2 }]));
    assert_eq!(
        backend.aggregations(),
        vec![("users".to_string(), vec![doc! { "$count": "total" }])]
    );

    let prompts = llm.prompts();
    assert_eq!(prompts.len(), 1);
    assert_eq!(prompts[0].1, ResponseFormat::Json);
    assert!(prompts[0].0.contains("Collection users:\n  - _id: objectId\n  - email: string\n  - age: int\n  idx: { \"email\": 1 }"));
}

#[tokio::test]
async fn test_process_selects_collection_and_summarizes() {
    let backend = Arc::new(store().answering(vec![doc! { "_id": null, "avg": 12.5 }]));
    let llm = Arc::new(ScriptedLlm::new(&[
        "orders",
        r#"[{"$group": {"_id": null, "avg": {"$avg": "$total"}}}]"#,
        "The average order total is 12.5.",
    ]));
    let qb = session(backend.clone(), llm.clone());

    let outcome = qb
        .process("average order total", &QueryOptions::default())
        .await
        .unwrap();

    assert_eq!(outcome.target.as_deref(), Some("orders"));
    assert_eq!(outcome.summary, "The average order total is 12.5.");
    assert_eq!(outcome.results.len(), 1);
    assert_eq!(backend.aggregations()[0].0, "orders");

    let formats: Vec<ResponseFormat> = llm.prompts().into_iter().map(|(_, f)| f).collect();
    assert_eq!(
        formats,
        vec![ResponseFormat::Text, ResponseFormat::Json, ResponseFormat::Text]
    );
    let summary_prompt = &llm.prompts()[2].0;
    assert!(summary_prompt.starts_with("Analyse the following results for the query: 'average order total'"));
    assert!(summary_prompt.ends_with("Provide a concise and accurate summary."));
}

#[tokio::test]
async fn test_interpretation_encodes_bson_values() {
    let llm = Arc::new(ScriptedLlm::new(&["One user."]));
    let qb = session(Arc::new(store()), llm.clone());

    let oid = ObjectId::parse_str("64b7f0c2a1b2c3d4e5f60718").unwrap();
    let docs: Vec<Document> = vec![doc! {
        "_id": oid,
        "joined": DateTime::from_millis(0),
    }];
    let results = ResultSet::Documents(docs.clone());

    let summary = qb.interpret_results(&results, "who joined").await.unwrap();
    assert_eq!(summary, "One user.");
    assert_eq!(results, ResultSet::Documents(docs));

    let prompt = &llm.prompts()[0].0;
    assert!(prompt.contains("\"_id\": \"64b7f0c2a1b2c3d4e5f60718\""));
    assert!(prompt.contains("\"joined\": \"1970-01-01T00:00:00.000Z\""));
}

#[tokio::test]
async fn test_non_finite_double_fails_before_llm_call() {
    let llm = Arc::new(ScriptedLlm::new(&["unused"]));
    let qb = session(Arc::new(store()), llm.clone());

    let results = ResultSet::Documents(vec![doc! { "ratio": f64::INFINITY }]);
    let err = qb.interpret_results(&results, "ratio").await.unwrap_err();

    assert!(matches!(err, NlqError::Serialization(_)));
    assert_eq!(llm.calls(), 0);
}
