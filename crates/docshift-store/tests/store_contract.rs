//! Store behaviour through the `DocumentStore` trait object

use docshift_core::{
    BulkOptions, DocumentStore, ExplainQuery, Filter, FindOptions, Namespace, WriteOperation,
    WriteOptions,
};
use docshift_store::{seed_contracts, MemoryStore, DEFAULT_FIXTURE_COUNT};
use pretty_assertions::assert_eq;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::Arc;

fn ns() -> Namespace {
    Namespace::new("_docshift_store", "_test_collection")
}

fn obj(value: Value) -> Filter {
    value.as_object().cloned().unwrap()
}

fn seeded() -> Arc<dyn DocumentStore> {
    let store = MemoryStore::new();
    seed_contracts(&store, &ns(), DEFAULT_FIXTURE_COUNT, &mut StdRng::seed_from_u64(3));
    Arc::new(store)
}

#[tokio::test]
async fn seeded_collection_has_one_hundred_documents() {
    let store = seeded();
    let all = store
        .find(&ns(), &Filter::new(), &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(all.len(), DEFAULT_FIXTURE_COUNT);
}

#[tokio::test]
async fn empty_fields_data_query_matches_all() {
    let store = seeded();
    let found = store
        .find(
            &ns(),
            &obj(json!({ "fieldsData": { "$exists": true, "$eq": {} } })),
            &FindOptions::default(),
        )
        .await
        .unwrap();
    assert_eq!(found.len(), DEFAULT_FIXTURE_COUNT);
}

#[tokio::test]
async fn element_writes_are_visible_to_dotted_queries() {
    let store = seeded();
    let all = store
        .find(&ns(), &Filter::new(), &FindOptions::default())
        .await
        .unwrap();

    let operations: Vec<WriteOperation> = all
        .iter()
        .map(|document| {
            let mut filter = Filter::new();
            filter.insert("_id".into(), document["_id"].clone());
            filter.insert("addOns.1".into(), json!({ "$exists": true }));
            WriteOperation::set(
                filter,
                obj(json!({ "addOns.1.marked": true })),
                &WriteOptions {
                    upsert: true,
                    multi: true,
                    array_filters: None,
                },
            )
        })
        .collect();

    let ack = store
        .bulk_apply(&ns(), &operations, &BulkOptions::default())
        .await
        .unwrap();
    assert_eq!(ack.modified_count, DEFAULT_FIXTURE_COUNT);
    assert_eq!(ack.upserted_count, 0);

    let marked = store
        .find(&ns(), &obj(json!({ "addOns.marked": true })), &FindOptions::default())
        .await
        .unwrap();
    assert_eq!(marked.len(), DEFAULT_FIXTURE_COUNT);

    let first_marked = store
        .find(&ns(), &obj(json!({ "addOns.0.marked": true })), &FindOptions::default())
        .await
        .unwrap();
    assert!(first_marked.is_empty());
}

#[tokio::test]
async fn explain_respects_limit() {
    let store = seeded();
    let plan = store
        .explain(
            &ns(),
            &ExplainQuery {
                filter: Filter::new(),
                limit: Some(10),
            },
        )
        .await
        .unwrap();
    assert_eq!(plan.stage, "LIMIT");
    assert_eq!(plan.n_returned, 10);
    assert_eq!(plan.docs_examined, 10);
}

#[tokio::test]
async fn concurrent_readers_during_writes() {
    let store = seeded();
    let writer = {
        let store = Arc::clone(&store);
        tokio::spawn(async move {
            for round in 0..20 {
                let op = WriteOperation::set(
                    Filter::new(),
                    obj(json!({ "round": round })),
                    &WriteOptions {
                        upsert: false,
                        multi: true,
                        array_filters: None,
                    },
                );
                store
                    .bulk_apply(&ns(), &[op], &BulkOptions::default())
                    .await
                    .unwrap();
            }
        })
    };

    for _ in 0..20 {
        let all = store
            .find(&ns(), &Filter::new(), &FindOptions::default())
            .await
            .unwrap();
        // a batch is applied under one lock, so every reader sees one round
        let rounds: std::collections::HashSet<_> =
            all.iter().map(|d| d.get("round").map(ToString::to_string)).collect();
        assert_eq!(rounds.len(), 1);
        tokio::task::yield_now().await;
    }

    writer.await.unwrap();
}
