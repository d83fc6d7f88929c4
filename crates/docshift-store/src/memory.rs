//! In-memory document store
//!
//! Collections are vectors of documents keyed by [`Namespace`] behind a
//! `RwLock`. Reads take a shared lock; a bulk write holds the exclusive lock
//! for its whole batch, so concurrent readers never see half a batch.

use crate::document::{project, set_path};
use crate::matcher::matches;
use docshift_core::{
    BulkOptions, Document, DocumentStore, ExecutionPlan, ExplainQuery, Filter, FindOptions,
    Namespace, StoreError, WriteAck, WriteOperation, ID_FIELD,
};
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

/// Call counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// `find` calls
    pub finds: usize,
    /// `bulk_apply` calls
    pub bulk_writes: usize,
    /// `explain` calls
    pub explains: usize,
    /// `close` calls
    pub closes: usize,
}

#[derive(Debug, Default)]
struct Counters {
    finds: AtomicUsize,
    bulk_writes: AtomicUsize,
    explains: AtomicUsize,
    closes: AtomicUsize,
}

/// In-memory store
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<Namespace, Vec<Document>>>,
    counters: Counters,
}

/// Effect of a single write operation
#[derive(Debug, Default)]
struct Applied {
    matched: usize,
    modified: usize,
    upserted: Option<Value>,
}

impl MemoryStore {
    /// Create empty store
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty collection (no-op if it exists)
    pub fn create_collection(&self, namespace: &Namespace) {
        self.collections
            .write()
            .entry(namespace.clone())
            .or_default();
    }

    /// Insert documents, assigning an `_id` where missing
    ///
    /// # Returns
    /// IDs of the inserted documents, in order.
    pub fn insert_many(
        &self,
        namespace: &Namespace,
        documents: impl IntoIterator<Item = Document>,
    ) -> Vec<Value> {
        let mut collections = self.collections.write();
        let collection = collections.entry(namespace.clone()).or_default();

        documents
            .into_iter()
            .map(|mut document| {
                let id = document
                    .entry(ID_FIELD.to_string())
                    .or_insert_with(new_id)
                    .clone();
                collection.push(document);
                id
            })
            .collect()
    }

    /// Snapshot of a collection (empty if absent)
    #[must_use]
    pub fn documents(&self, namespace: &Namespace) -> Vec<Document> {
        self.collections
            .read()
            .get(namespace)
            .cloned()
            .unwrap_or_default()
    }

    /// Count documents matching `filter`
    ///
    /// # Errors
    /// - `StoreError::UnsupportedOperator` for unknown operators
    pub fn count(&self, namespace: &Namespace, filter: &Filter) -> Result<usize, StoreError> {
        let collections = self.collections.read();
        let Some(collection) = collections.get(namespace) else {
            return Ok(0);
        };
        let mut count = 0;
        for document in collection {
            if matches(document, filter)? {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Remove a collection, returning its documents
    pub fn drop_collection(&self, namespace: &Namespace) -> Option<Vec<Document>> {
        self.collections.write().remove(namespace)
    }

    /// Known namespaces
    #[must_use]
    pub fn namespaces(&self) -> Vec<Namespace> {
        self.collections.read().keys().cloned().collect()
    }

    /// Call counters
    #[must_use]
    pub fn stats(&self) -> StoreStats {
        StoreStats {
            finds: self.counters.finds.load(Ordering::SeqCst),
            bulk_writes: self.counters.bulk_writes.load(Ordering::SeqCst),
            explains: self.counters.explains.load(Ordering::SeqCst),
            closes: self.counters.closes.load(Ordering::SeqCst),
        }
    }

    fn apply(collection: &mut Vec<Document>, operation: &WriteOperation) -> Result<Applied, StoreError> {
        let set = set_body(&operation.update)?;
        if operation.array_filters.is_some() {
            tracing::debug!("array filters are ignored by the memory store");
        }

        let mut targets = Vec::new();
        for (index, document) in collection.iter().enumerate() {
            if matches(document, &operation.filter)? {
                targets.push(index);
                if !operation.multi {
                    break;
                }
            }
        }

        let mut applied = Applied {
            matched: targets.len(),
            ..Applied::default()
        };

        for index in targets {
            let (updated, changed) = updated_copy(&collection[index], set)?;
            if changed {
                collection[index] = updated;
                applied.modified += 1;
            }
        }

        if applied.matched == 0 && operation.upsert {
            let seed = upsert_seed(&operation.filter)?;
            let (mut inserted, _) = updated_copy(&seed, set)?;
            let id = inserted
                .entry(ID_FIELD.to_string())
                .or_insert_with(new_id)
                .clone();
            if collection.iter().any(|document| document.get(ID_FIELD) == Some(&id)) {
                return Err(StoreError::InvalidUpdate(format!(
                    "duplicate key error: {ID_FIELD} {id} already exists"
                )));
            }
            collection.push(inserted);
            applied.upserted = Some(id);
        }

        Ok(applied)
    }
}

/// Extract and validate the `$set` body of an update
fn set_body(update: &Document) -> Result<&Document, StoreError> {
    let mut body = None;
    for (operator, argument) in update {
        match operator.as_str() {
            "$set" => {
                body = Some(argument.as_object().ok_or_else(|| {
                    StoreError::InvalidUpdate("$set needs an object".into())
                })?);
            }
            op if op.starts_with('$') => {
                return Err(StoreError::UnsupportedOperator(op.to_string()));
            }
            field => {
                return Err(StoreError::InvalidUpdate(format!(
                    "update field '{field}' is not an operator"
                )));
            }
        }
    }
    body.ok_or_else(|| StoreError::InvalidUpdate("update has no $set".into()))
}

/// Apply `$set` to a copy so a failing field leaves the original untouched
fn updated_copy(document: &Document, set: &Document) -> Result<(Document, bool), StoreError> {
    let mut updated = document.clone();
    let mut changed = false;
    for (path, value) in set {
        if path == ID_FIELD {
            if let Some(current) = document.get(ID_FIELD) {
                if current != value {
                    return Err(StoreError::InvalidUpdate(format!(
                        "Performing an update on the path '{ID_FIELD}' would modify the immutable field '{ID_FIELD}'"
                    )));
                }
            }
        }
        changed |= set_path(&mut updated, path, value.clone())?;
    }
    Ok((updated, changed))
}

/// New document built from the equality clauses of an upsert filter
fn upsert_seed(filter: &Filter) -> Result<Document, StoreError> {
    let mut seed = Document::new();
    for (key, condition) in filter {
        if key.starts_with('$') {
            continue;
        }
        let value = match condition {
            Value::Object(map) if map.keys().any(|k| k.starts_with('$')) => match map.get("$eq") {
                Some(value) => value.clone(),
                None => continue,
            },
            other => other.clone(),
        };
        set_path(&mut seed, key, value)?;
    }
    Ok(seed)
}

fn new_id() -> Value {
    Value::String(uuid::Uuid::new_v4().simple().to_string())
}

#[async_trait::async_trait]
impl DocumentStore for MemoryStore {
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.counters.finds.fetch_add(1, Ordering::SeqCst);
        let collections = self.collections.read();
        let Some(collection) = collections.get(namespace) else {
            tracing::debug!(%namespace, "find on missing collection");
            return Ok(Vec::new());
        };

        let limit = options.limit.unwrap_or(usize::MAX);
        let mut found = Vec::new();
        for document in collection {
            if found.len() >= limit {
                break;
            }
            if matches(document, filter)? {
                found.push(project(document, &options.fields));
            }
        }
        Ok(found)
    }

    async fn bulk_apply(
        &self,
        namespace: &Namespace,
        operations: &[WriteOperation],
        options: &BulkOptions,
    ) -> Result<WriteAck, StoreError> {
        self.counters.bulk_writes.fetch_add(1, Ordering::SeqCst);
        let mut collections = self.collections.write();
        let collection = collections.entry(namespace.clone()).or_default();

        let mut ack = WriteAck::default();
        let mut first_error = None;
        for (index, operation) in operations.iter().enumerate() {
            match Self::apply(collection, operation) {
                Ok(applied) => {
                    ack.matched_count += applied.matched;
                    ack.modified_count += applied.modified;
                    if let Some(id) = applied.upserted {
                        ack.upserted_count += 1;
                        ack.upserted_ids.push(id);
                    }
                }
                Err(e) => {
                    let error = StoreError::BulkWrite {
                        index,
                        reason: e.to_string(),
                    };
                    if options.ordered {
                        return Err(error);
                    }
                    tracing::warn!(index, error = %e, "bulk write operation failed, continuing");
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(ack),
        }
    }

    async fn explain(
        &self,
        namespace: &Namespace,
        query: &ExplainQuery,
    ) -> Result<ExecutionPlan, StoreError> {
        self.counters.explains.fetch_add(1, Ordering::SeqCst);
        let started = Instant::now();
        let collections = self.collections.read();

        let Some(collection) = collections.get(namespace) else {
            return Ok(ExecutionPlan {
                filter: query.filter.clone(),
                stage: "EOF".to_string(),
                docs_examined: 0,
                n_returned: 0,
                execution_time_millis: 0,
            });
        };

        let limit = query.limit.unwrap_or(usize::MAX);
        let mut examined = 0;
        let mut returned = 0;
        for document in collection {
            if returned >= limit {
                break;
            }
            examined += 1;
            if matches(document, &query.filter).map_err(|e| StoreError::Explain(e.to_string()))? {
                returned += 1;
            }
        }

        let stage = if query.limit.is_some() { "LIMIT" } else { "COLLSCAN" };
        Ok(ExecutionPlan {
            filter: query.filter.clone(),
            stage: stage.to_string(),
            docs_examined: examined,
            n_returned: returned,
            execution_time_millis: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        })
    }

    async fn close(&self) -> Result<(), StoreError> {
        self.counters.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
