//! End-to-end migrations against the in-memory store

use docshift_core::prelude::*;
use docshift_core::{MigrationError, StoreError, TaskError, ValidationError};
use docshift_test_utils::{
    connection, connection_to, count, documents, dry_run_invocation, filter, seeded_store,
    seeded_store_with, write_invocation, ConcurrencyProbe, FailingResolver, FaultyStore,
    TEST_COLLECTION,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[tokio::test]
async fn root_write_sets_literal_on_every_document() {
    let store = seeded_store();
    let result = Migrator::default()
        .migrate_value(connection(&store), &write_invocation(json!({ "aString": "a value" })))
        .await
        .unwrap()
        .unwrap();

    let ack = result.as_written().unwrap();
    assert_eq!(ack.matched_count, 100);
    assert_eq!(ack.modified_count, 100);
    assert_eq!(ack.upserted_count, 0);
    assert_eq!(count(&store, json!({ "aString": "a value" })), 100);
    assert_eq!(store.stats().closes, 1);
}

#[tokio::test]
async fn rerun_overwrites_previous_value() {
    let store = seeded_store();
    let migrator = Migrator::default();
    for value in ["a value", "a new value"] {
        migrator
            .migrate_value(connection(&store), &write_invocation(json!({ "aString": value })))
            .await
            .unwrap();
    }
    assert_eq!(count(&store, json!({ "aString": "a new value" })), 100);
    assert_eq!(count(&store, json!({ "aString": "a value" })), 0);
}

#[tokio::test]
async fn literal_kinds_are_written_unchanged() {
    let store = seeded_store_with(10);
    let data = json!({
        "aString": "Some chars",
        "aNumber": 2,
        "aBoolean": true,
        "anArray": [],
        "anObject": {}
    });
    Migrator::default()
        .migrate_value(connection(&store), &write_invocation(data.clone()))
        .await
        .unwrap();

    for document in documents(&store) {
        for (key, expected) in data.as_object().unwrap() {
            assert_eq!(&document[key], expected, "field {key}");
        }
    }
}

#[tokio::test]
async fn random_values_are_distinct_per_document() {
    let store = seeded_store();
    Migrator::default()
        .migrate_value(connection(&store), &write_invocation(json!({ "aRandom": ">>RANDOM" })))
        .await
        .unwrap();

    let tokens: HashSet<String> = documents(&store)
        .iter()
        .map(|d| d["aRandom"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(tokens.len(), 100);
    assert!(tokens.iter().all(|t| !t.is_empty()));
}

#[tokio::test]
async fn reference_copies_pre_mutation_value() {
    let store = seeded_store();
    let data = json!({ "aSymbolicLink": "$$language", "language": "overwritten" });
    let before: Vec<Value> = documents(&store).iter().map(|d| d["language"].clone()).collect();

    Migrator::default()
        .migrate_value(connection(&store), &write_invocation(data))
        .await
        .unwrap();

    let after = documents(&store);
    for (document, original) in after.iter().zip(before) {
        assert_eq!(document["aSymbolicLink"], original);
        assert_eq!(document["language"], json!("overwritten"));
    }
}

#[tokio::test]
async fn absent_reference_writes_null() {
    let store = seeded_store_with(5);
    Migrator::default()
        .migrate_value(connection(&store), &write_invocation(json!({ "ghost": "$$doesNotExist" })))
        .await
        .unwrap();
    assert_eq!(count(&store, json!({ "ghost": { "$exists": true, "$eq": null } })), 5);
}

#[tokio::test]
async fn nested_path_resolves_each_element() {
    let store = seeded_store();
    let mut raw = write_invocation(json!({ "addOnTemplateId": "$$id", "token": ">>RANDOM" }));
    raw["path"] = json!(["addOns"]);

    let result = Migrator::default()
        .migrate_value(connection(&store), &raw)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.as_written().unwrap().modified_count, 300);

    let mut tokens = HashSet::new();
    for document in documents(&store) {
        for add_on in document["addOns"].as_array().unwrap() {
            assert_eq!(add_on["addOnTemplateId"], add_on["id"]);
            tokens.insert(add_on["token"].as_str().unwrap().to_string());
        }
        assert!(!document.contains_key("addOnTemplateId"));
    }
    assert_eq!(tokens.len(), 300);
}

#[tokio::test]
async fn non_random_template_is_idempotent() {
    let store = seeded_store_with(20);
    let migrator = Migrator::default();
    let raw = write_invocation(json!({ "aString": "fixed", "copy": "$$status" }));

    migrator.migrate_value(connection(&store), &raw).await.unwrap();
    let first = documents(&store);

    let second = migrator
        .migrate_value(connection(&store), &raw)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(second.as_written().unwrap().modified_count, 0);
    assert_eq!(documents(&store), first);
}

#[tokio::test]
async fn dry_run_never_mutates() {
    let store = seeded_store();
    let before = documents(&store);

    let result = Migrator::default()
        .migrate_value(connection(&store), &dry_run_invocation(json!({ "invalidKey": "x" })))
        .await
        .unwrap()
        .unwrap();

    let plan = result.as_explained().unwrap();
    assert_eq!(plan.n_returned, 100);
    assert_eq!(count(&store, json!({ "invalidKey": { "$exists": true } })), 0);
    assert_eq!(documents(&store), before);
    assert_eq!(store.stats().bulk_writes, 0);
    assert_eq!(store.stats().closes, 1);
}

#[tokio::test]
async fn dry_run_plan_reflects_criteria_and_array_filters() {
    let store = seeded_store();
    let mut raw = dry_run_invocation(json!({ "aKey": "A value" }));
    raw["cursor"] = json!({ "query": { "fieldsData": { "$exists": true, "$eq": {} } } });
    raw["path"] = json!(["addOns"]);
    raw["options"]["document"]["arrayFilters"] = json!([{ "addOns.id": { "$exists": true } }]);

    let result = Migrator::default()
        .migrate_value(connection(&store), &raw)
        .await
        .unwrap()
        .unwrap();

    let plan = result.as_explained().unwrap();
    assert_eq!(plan.n_returned, 100);
    assert_eq!(
        Value::Object(plan.filter.clone()),
        json!({
            "fieldsData": { "$exists": true, "$eq": {} },
            "addOns": { "$exists": true },
            "addOns.id": { "$exists": true }
        })
    );
}

#[tokio::test]
async fn root_dry_run_ignores_array_filters() {
    let store = seeded_store();
    let mut raw = dry_run_invocation(json!({ "aKey": "A value" }));
    raw["options"]["document"]["arrayFilters"] = json!([{ "language": "zz" }]);

    let result = Migrator::default()
        .migrate_value(connection(&store), &raw)
        .await
        .unwrap()
        .unwrap();

    let plan = result.as_explained().unwrap();
    assert_eq!(plan.n_returned, 100);
    assert!(plan.filter.get("language").is_none());
}

#[tokio::test]
async fn empty_fetch_returns_none() {
    let store = FaultyStore::seeded(10);
    let mut raw = write_invocation(json!({ "a": 1 }));
    raw["cursor"] = json!({ "query": { "language": "not-a-locale" } });

    let result = Migrator::default()
        .migrate_value(connection_to(store.clone()), &raw)
        .await
        .unwrap();

    assert!(result.is_none());
    assert_eq!(store.finds.load(Ordering::SeqCst), 1);
    assert_eq!(store.bulk_writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.closes(), 1);
}

#[tokio::test]
async fn cursor_limit_and_fields_bound_the_migration() {
    let store = seeded_store();
    let mut raw = write_invocation(json!({ "copy": "$$timeZone" }));
    raw["cursor"] = json!({ "limit": 10, "fields": ["timeZone"] });

    let result = Migrator::default()
        .migrate_value(connection(&store), &raw)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.as_written().unwrap().modified_count, 10);
    assert_eq!(count(&store, json!({ "copy": { "$exists": true } })), 10);
    for document in documents(&store).iter().filter(|d| d.contains_key("copy")) {
        assert_eq!(document["copy"], document["timeZone"]);
        assert!(document.contains_key("language"));
    }
}

#[tokio::test]
async fn extra_filter_restricts_writes() {
    let store = seeded_store();
    let norwegian = count(&store, json!({ "language": "no" }));

    let mut raw = write_invocation(json!({ "flag": true }));
    raw["filter"] = json!({ "language": "no" });
    raw["options"]["document"] = json!({ "upsert": false, "multi": true });

    let result = Migrator::default()
        .migrate_value(connection(&store), &raw)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(result.as_written().unwrap().modified_count, norwegian);
    assert_eq!(count(&store, json!({ "flag": true })), norwegian);
}

#[tokio::test]
async fn missing_write_mode_fails_before_any_read() {
    let store = FaultyStore::seeded(10);
    let raw = json!({
        "data": { "a": 1 },
        "options": { "verbose": false }
    });

    let err = Migrator::default()
        .migrate_value(connection_to(store.clone()), &raw)
        .await
        .unwrap_err();

    assert!(err.is_validation());
    assert!(matches!(
        err,
        MigrationError::Validation(ValidationError::InvalidWriteMode)
    ));
    assert_eq!(store.calls(), 0);
    assert_eq!(store.closes(), 0);
}

#[tokio::test]
async fn unnamed_namespace_fails_before_any_read() {
    let store = FaultyStore::seeded(1);
    let connection = Connection::new(store.clone(), Namespace::new("", TEST_COLLECTION));

    let err = Migrator::default()
        .migrate_value(connection, &write_invocation(json!({ "a": 1 })))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        MigrationError::Validation(ValidationError::MissingDatabase)
    ));
    assert_eq!(store.calls(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn resolution_respects_concurrency_bound() {
    for (concurrency, expected_bound) in [(Some(3), 3), (None, 5)] {
        let store = seeded_store_with(30);
        let probe = ConcurrencyProbe::new(Duration::from_millis(5));
        let migrator = Migrator::new(MigratorConfig::new().with_resolver(probe.clone()));

        let mut raw = write_invocation(json!({ "a": 1 }));
        if let Some(concurrency) = concurrency {
            raw["options"]["concurrency"] = json!(concurrency);
        }

        migrator.migrate_value(connection(&store), &raw).await.unwrap();
        assert_eq!(probe.calls(), 30);
        assert!(probe.peak() >= 1);
        assert!(
            probe.peak() <= expected_bound,
            "peak {} above {expected_bound}",
            probe.peak()
        );
        assert_eq!(count(&store, json!({ "a": 1 })), 30);
    }
}

#[tokio::test]
async fn task_failure_aborts_and_releases_connection() {
    let store = FaultyStore::seeded(50);
    let resolver = FailingResolver::on_call(3);
    let migrator = Migrator::new(MigratorConfig::new().with_resolver(resolver));

    let err = migrator
        .migrate_value(connection_to(store.clone()), &write_invocation(json!({ "a": 1 })))
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        MigrationError::TaskResolution(TaskError::Resolution { .. })
    ));
    assert_eq!(store.bulk_writes.load(Ordering::SeqCst), 0);
    assert_eq!(store.closes(), 1);
    assert_eq!(store.inner().count(&docshift_test_utils::test_namespace(), &filter(json!({ "a": 1 }))).unwrap(), 0);
}

#[tokio::test]
async fn bulk_write_failure_releases_connection() {
    let store = FaultyStore::seeded(5);
    store.fail_bulk.store(true, Ordering::SeqCst);

    let err = Migrator::default()
        .migrate_value(connection_to(store.clone()), &write_invocation(json!({ "a": 1 })))
        .await
        .unwrap_err();

    assert!(err.is_store());
    assert!(matches!(err, MigrationError::Store(StoreError::Connection(_))));
    assert_eq!(store.closes(), 1);
}

#[tokio::test]
async fn explain_failure_releases_connection() {
    let store = FaultyStore::seeded(5);
    store.fail_explain.store(true, Ordering::SeqCst);

    let err = Migrator::default()
        .migrate_value(connection_to(store.clone()), &dry_run_invocation(json!({ "a": 1 })))
        .await
        .unwrap_err();

    assert!(matches!(err, MigrationError::Store(StoreError::Explain(_))));
    assert_eq!(store.closes(), 1);
}

#[tokio::test]
async fn find_failure_releases_connection() {
    let store = FaultyStore::seeded(5);
    store.fail_find.store(true, Ordering::SeqCst);

    let err = Migrator::default()
        .migrate_value(connection_to(store.clone()), &write_invocation(json!({ "a": 1 })))
        .await
        .unwrap_err();

    assert!(err.is_store());
    assert_eq!(store.closes(), 1);
    assert_eq!(store.bulk_writes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn close_failure_after_success_is_reported() {
    let store = FaultyStore::seeded(5);
    store.fail_close.store(true, Ordering::SeqCst);

    let err = Migrator::default()
        .migrate_value(connection_to(store.clone()), &write_invocation(json!({ "a": 1 })))
        .await
        .unwrap_err();

    assert!(err.is_store());
    assert_eq!(store.closes(), 1);
    // the bulk write itself went through
    assert_eq!(store.inner().stats().bulk_writes, 1);
}

#[tokio::test]
async fn typed_params_match_raw_invocation() {
    let store = seeded_store_with(8);
    let params = MigrationParams::new(
        DataTemplate::from_value(&json!({ "typed": true })).unwrap(),
        MigrationOptions::new(true, true).with_concurrency(2),
    )
    .with_filter(filter(json!({ "status": { "$exists": true } })));

    let result = Migrator::default()
        .migrate(connection(&store), &params)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(result.as_written().unwrap().modified_count, 8);
}

#[tokio::test]
async fn job_envelope_runs_migrate_handler() {
    let store = seeded_store_with(4);
    let job = Job::from_value(&json!({
        "handler": "migrate",
        "params": {
            "connection": {
                "database": docshift_test_utils::TEST_DATABASE,
                "collection": TEST_COLLECTION
            },
            "data": { "viaJob": "yes" },
            "options": { "verbose": false, "writeMode": true }
        }
    }))
    .unwrap();

    let result = job
        .run(&Migrator::default(), Arc::clone(&store) as Arc<dyn DocumentStore>)
        .await
        .unwrap();
    assert!(result.is_some());
    assert_eq!(count(&store, json!({ "viaJob": "yes" })), 4);
}
