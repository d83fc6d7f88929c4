//! Testing utilities for docshift workspace
//!
//! Shared test helpers, fixtures, and instrumented stores and resolvers.

#![allow(missing_docs)]

use docshift_core::{
    BulkOptions, Connection, Document, DocumentStore, ExecutionPlan, ExplainQuery, Filter,
    FindOptions, MutationTask, Namespace, StoreError, TaskError, TaskResolver, TemplateResolver,
    WriteAck, WriteOperation,
};
use docshift_store::{seed_contracts, MemoryStore, DEFAULT_FIXTURE_COUNT};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

pub const TEST_DATABASE: &str = "_docshift_test";
pub const TEST_COLLECTION: &str = "_test_collection";

pub fn test_namespace() -> Namespace {
    Namespace::new(TEST_DATABASE, TEST_COLLECTION)
}

/// Store seeded with `count` contracts from a fixed RNG seed
pub fn seeded_store_with(count: usize) -> Arc<MemoryStore> {
    let store = MemoryStore::new();
    seed_contracts(&store, &test_namespace(), count, &mut StdRng::seed_from_u64(42));
    Arc::new(store)
}

pub fn seeded_store() -> Arc<MemoryStore> {
    seeded_store_with(DEFAULT_FIXTURE_COUNT)
}

pub fn connection_to(store: Arc<dyn DocumentStore>) -> Connection {
    Connection::new(store, test_namespace())
}

pub fn connection(store: &Arc<MemoryStore>) -> Connection {
    connection_to(Arc::clone(store) as Arc<dyn DocumentStore>)
}

/// Raw invocation with the required options set
pub fn invocation(data: Value, write_mode: bool) -> Value {
    json!({
        "data": data,
        "options": {
            "verbose": false,
            "writeMode": write_mode,
            "document": { "upsert": true, "multi": true }
        }
    })
}

pub fn write_invocation(data: Value) -> Value {
    invocation(data, true)
}

pub fn dry_run_invocation(data: Value) -> Value {
    invocation(data, false)
}

pub fn filter(value: Value) -> Filter {
    value.as_object().cloned().expect("filter must be an object")
}

pub fn count(store: &MemoryStore, query: Value) -> usize {
    store.count(&test_namespace(), &filter(query)).unwrap()
}

pub fn documents(store: &MemoryStore) -> Vec<Document> {
    store.documents(&test_namespace())
}

/// Store wrapper that counts calls and injects failures
#[derive(Debug, Default)]
pub struct FaultyStore {
    inner: MemoryStore,
    pub fail_find: AtomicBool,
    pub fail_bulk: AtomicBool,
    pub fail_explain: AtomicBool,
    pub fail_close: AtomicBool,
    pub finds: AtomicUsize,
    pub bulk_writes: AtomicUsize,
    pub explains: AtomicUsize,
    pub closes: AtomicUsize,
}

impl FaultyStore {
    pub fn seeded(count: usize) -> Arc<Self> {
        let store = Self::default();
        seed_contracts(&store.inner, &test_namespace(), count, &mut StdRng::seed_from_u64(42));
        Arc::new(store)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    pub fn calls(&self) -> usize {
        self.finds.load(Ordering::SeqCst)
            + self.bulk_writes.load(Ordering::SeqCst)
            + self.explains.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    fn injected(flag: &AtomicBool, what: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Connection(format!("injected {what} failure")));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl DocumentStore for FaultyStore {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_find, "find")?;
        self.inner.find(namespace, filter, options).await
    }

    async fn bulk_apply(
        &self,
        namespace: &Namespace,
        operations: &[WriteOperation],
        options: &BulkOptions,
    ) -> Result<WriteAck, StoreError> {
        self.bulk_writes.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_bulk, "bulk write")?;
        self.inner.bulk_apply(namespace, operations, options).await
    }

    async fn explain(
        &self,
        namespace: &Namespace,
        query: &ExplainQuery,
    ) -> Result<ExecutionPlan, StoreError> {
        self.explains.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_explain, "explain")
            .map_err(|e| StoreError::Explain(e.to_string()))?;
        self.inner.explain(namespace, query).await
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Self::injected(&self.fail_close, "close")?;
        self.inner.close().await
    }
}

/// Resolver that sleeps while resolving and records peak concurrency
#[derive(Debug)]
pub struct ConcurrencyProbe {
    delay: Duration,
    running: AtomicUsize,
    peak: AtomicUsize,
    calls: AtomicUsize,
}

impl ConcurrencyProbe {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            running: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TaskResolver for ConcurrencyProbe {
    async fn resolve_task(&self, task: &MutationTask) -> Result<Document, TaskError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(running, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.running.fetch_sub(1, Ordering::SeqCst);
        TemplateResolver.resolve_task(task).await
    }
}

/// Resolver that fails on its n-th call (1-based)
#[derive(Debug)]
pub struct FailingResolver {
    fail_on_call: usize,
    calls: AtomicUsize,
}

impl FailingResolver {
    pub fn on_call(fail_on_call: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_on_call,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl TaskResolver for FailingResolver {
    async fn resolve_task(&self, task: &MutationTask) -> Result<Document, TaskError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(TaskError::resolution(task.id, "injected resolver failure"));
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
        TemplateResolver.resolve_task(task).await
    }
}
