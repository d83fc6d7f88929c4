//! Document store seam
//!
//! The engine never talks to a concrete database. It receives a
//! [`Connection`]: a shared [`DocumentStore`] plus the namespace to migrate.

use crate::error::{StoreError, ValidationError};
use crate::types::{Document, Filter, WriteOperation};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Database and collection pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Namespace {
    /// Database name
    pub database: String,
    /// Collection name
    pub collection: String,
}

impl Namespace {
    /// Create namespace
    #[inline]
    #[must_use]
    pub fn new(database: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            database: database.into(),
            collection: collection.into(),
        }
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.database, self.collection)
    }
}

/// Options for `find`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FindOptions {
    /// Maximum documents returned
    pub limit: Option<usize>,
    /// Projection; empty returns whole documents
    pub fields: Vec<String>,
}

/// Options for `bulk_apply`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Stop at the first failing operation
    pub ordered: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self { ordered: true }
    }
}

/// Bulk write acknowledgement
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteAck {
    /// Documents matched by operation filters
    pub matched_count: usize,
    /// Documents actually changed
    pub modified_count: usize,
    /// Documents inserted by upserts
    pub upserted_count: usize,
    /// IDs of inserted documents
    #[serde(default)]
    pub upserted_ids: Vec<serde_json::Value>,
}

/// Query to explain
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExplainQuery {
    /// Flattened filter
    pub filter: Filter,
    /// Cursor limit
    pub limit: Option<usize>,
}

/// Query plan with execution statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionPlan {
    /// Filter that was planned
    pub filter: Filter,
    /// Winning stage (e.g. `COLLSCAN`)
    pub stage: String,
    /// Documents inspected
    pub docs_examined: usize,
    /// Documents that matched
    pub n_returned: usize,
    /// Wall-clock execution time
    pub execution_time_millis: u64,
}

/// Outcome of a migration that fetched at least one document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum AggregateResult {
    /// Write mode: bulk write acknowledgement
    Written(WriteAck),
    /// Dry run: query plan
    Explained(ExecutionPlan),
}

impl AggregateResult {
    /// Get the write acknowledgement, if written
    #[inline]
    #[must_use]
    pub fn as_written(&self) -> Option<&WriteAck> {
        match self {
            Self::Written(ack) => Some(ack),
            Self::Explained(_) => None,
        }
    }

    /// Get the plan, if explained
    #[inline]
    #[must_use]
    pub fn as_explained(&self) -> Option<&ExecutionPlan> {
        match self {
            Self::Explained(plan) => Some(plan),
            Self::Written(_) => None,
        }
    }
}

/// Backend a migration reads from and writes to
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch documents matching `filter`
    async fn find(
        &self,
        namespace: &Namespace,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError>;

    /// Apply operations as one bulk write
    async fn bulk_apply(
        &self,
        namespace: &Namespace,
        operations: &[WriteOperation],
        options: &BulkOptions,
    ) -> Result<WriteAck, StoreError>;

    /// Plan a query without mutating anything
    async fn explain(
        &self,
        namespace: &Namespace,
        query: &ExplainQuery,
    ) -> Result<ExecutionPlan, StoreError>;

    /// Release the connection
    async fn close(&self) -> Result<(), StoreError>;
}

/// Store handle bound to the namespace being migrated
///
/// Released exactly once: `close` consumes the handle, and the handle
/// cannot be cloned.
///
/// ```compile_fail
/// fn cloneable<T: Clone>() {}
/// cloneable::<docshift_core::Connection>();
/// ```
pub struct Connection {
    store: Arc<dyn DocumentStore>,
    namespace: Namespace,
}

impl Connection {
    /// Create connection
    #[inline]
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, namespace: Namespace) -> Self {
        Self { store, namespace }
    }

    /// Check that both handles are named
    ///
    /// # Errors
    /// - `ValidationError::MissingDatabase` / `MissingCollection`
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.namespace.database.trim().is_empty() {
            return Err(ValidationError::MissingDatabase);
        }
        if self.namespace.collection.trim().is_empty() {
            return Err(ValidationError::MissingCollection);
        }
        Ok(())
    }

    /// Get the store
    #[inline]
    #[must_use]
    pub fn store(&self) -> &dyn DocumentStore {
        self.store.as_ref()
    }

    /// Get the namespace
    #[inline]
    #[must_use]
    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    /// Fetch documents from the bound namespace
    ///
    /// # Errors
    /// Propagates the store's error.
    pub async fn find(
        &self,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Document>, StoreError> {
        self.store.find(&self.namespace, filter, options).await
    }

    /// Release the connection
    ///
    /// # Errors
    /// Propagates the store's error.
    pub async fn close(self) -> Result<(), StoreError> {
        tracing::debug!(namespace = %self.namespace, "closing connection");
        self.store.close().await
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}
