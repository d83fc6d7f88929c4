//! Core types for docshift
//!
//! Defines the transient entities of one migration run:
//! - Documents, filters and match criteria
//! - Mutation tasks produced by path expansion
//! - Write operations accumulated by the queue

use crate::path::FieldPath;
use crate::template::FieldSpec;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use ulid::Ulid;

/// A stored document (JSON object)
pub type Document = Map<String, Value>;

/// A match expression keyed by field path
pub type Filter = Map<String, Value>;

/// Primary key field of every document
pub const ID_FIELD: &str = "_id";

/// Default number of concurrently resolving tasks
pub const DEFAULT_CONCURRENCY: usize = 5;

/// Unique task identifier (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TaskId(pub Ulid);

impl TaskId {
    /// Generate new task ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Match criteria used to fetch the documents to migrate
///
/// The cursor query merged with the path condition placed under every path
/// segment. Built once per invocation.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MatchCriteria(Filter);

impl MatchCriteria {
    /// Build criteria from a cursor query, traversal path and condition
    ///
    /// Path segments override cursor query keys of the same name.
    #[must_use]
    pub fn build(query: &Filter, path: &[String], condition: &Filter) -> Self {
        let mut criteria = query.clone();
        for segment in path {
            criteria.insert(segment.clone(), Value::Object(condition.clone()));
        }
        Self(criteria)
    }

    /// Borrow as a plain filter
    #[inline]
    #[must_use]
    pub fn as_filter(&self) -> &Filter {
        &self.0
    }

    /// Flatten with additional matchers into a single plain filter
    ///
    /// Later matchers override earlier keys.
    #[must_use]
    pub fn flatten_with(&self, matchers: &[Filter]) -> Filter {
        let mut flat = self.0.clone();
        for matcher in matchers {
            for (key, value) in matcher {
                flat.insert(key.clone(), value.clone());
            }
        }
        flat
    }
}

/// A template field bound to its write target
#[derive(Debug, Clone, PartialEq)]
pub struct FieldTarget {
    /// Path written by `$set`
    pub target: FieldPath,
    /// How the value is produced
    pub spec: FieldSpec,
}

/// One unit of resolution work
///
/// Created by the path expander and consumed exactly once by the queue.
#[derive(Debug, Clone)]
pub struct MutationTask {
    /// Task ID
    pub id: TaskId,
    /// Precise per-document or per-element filter
    pub filter: Filter,
    /// Snapshot that `$$` references read from
    pub context: Arc<Value>,
    /// Template fields to resolve
    pub fields: Vec<FieldTarget>,
}

impl MutationTask {
    /// Create new task
    #[inline]
    #[must_use]
    pub fn new(filter: Filter, context: Arc<Value>, fields: Vec<FieldTarget>) -> Self {
        Self {
            id: TaskId::new(),
            filter,
            context,
            fields,
        }
    }
}

/// Per-operation write options (`options.document`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOptions {
    /// Insert when nothing matches
    #[serde(default)]
    pub upsert: bool,
    /// Update every match instead of the first
    #[serde(default)]
    pub multi: bool,
    /// Array element matchers; only used by dry runs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_filters: Option<Vec<Filter>>,
}

/// A resolved update ready for the bulk write
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteOperation {
    /// Task filter merged with the global extra filter
    pub filter: Filter,
    /// Update document, always `{"$set": {...}}`
    pub update: Document,
    /// Insert when nothing matches
    pub upsert: bool,
    /// Update every match instead of the first
    pub multi: bool,
    /// Array element matchers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_filters: Option<Vec<Filter>>,
}

impl WriteOperation {
    /// Build an operation from a resolved `$set` body
    #[must_use]
    pub fn set(filter: Filter, set: Document, options: &WriteOptions) -> Self {
        let mut update = Document::new();
        update.insert("$set".to_string(), Value::Object(set));
        Self {
            filter,
            update,
            upsert: options.upsert,
            multi: options.multi,
            array_filters: options.array_filters.clone(),
        }
    }

    /// Get the `$set` body
    #[inline]
    #[must_use]
    pub fn set_fields(&self) -> Option<&Document> {
        self.update.get("$set").and_then(Value::as_object)
    }
}

/// Execution mode of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Mode {
    /// Apply the accumulated operations
    Write,
    /// Explain the match criteria without mutating
    DryRun,
}

impl Mode {
    /// Mode from the `writeMode` flag
    #[inline]
    #[must_use]
    pub fn from_write_flag(write_mode: bool) -> Self {
        if write_mode {
            Self::Write
        } else {
            Self::DryRun
        }
    }
}
