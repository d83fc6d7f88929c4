//! Path expansion
//!
//! Expands a fetched document into the mutation tasks it requires:
//! - one task for the document root when no path is declared
//! - one task per element of every addressed nested array otherwise
//!
//! Each nested task targets exactly one element by index, so `$$`
//! references resolve against that element and random tokens are fresh per
//! element.

use crate::path::FieldPath;
use crate::template::DataTemplate;
use crate::types::{FieldTarget, Filter, MutationTask, ID_FIELD};
use serde_json::{json, Value};
use std::sync::Arc;

/// Expands documents into mutation tasks
#[derive(Debug, Clone)]
pub struct PathExpander {
    path: Vec<String>,
    template: Arc<DataTemplate>,
}

impl PathExpander {
    /// Create new expander
    #[inline]
    #[must_use]
    pub fn new(path: &[String], template: Arc<DataTemplate>) -> Self {
        Self {
            path: path.to_vec(),
            template,
        }
    }

    /// Check if expansion targets the document root
    #[inline]
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path.is_empty()
    }

    /// Expand one document
    ///
    /// # Arguments
    /// * `document` - Snapshot of the fetched document
    ///
    /// # Returns
    /// Tasks in path-segment then element order. A document without `_id`
    /// cannot be targeted and yields no tasks.
    #[must_use]
    pub fn expand(&self, document: &Arc<Value>) -> Vec<MutationTask> {
        let Some(id) = document.get(ID_FIELD) else {
            tracing::warn!("document has no {ID_FIELD}, skipping");
            return Vec::new();
        };

        if self.is_root() {
            return vec![self.root_task(id, document)];
        }

        let mut tasks = Vec::new();
        for raw in &self.path {
            let segment = match raw.parse::<FieldPath>() {
                Ok(segment) if !segment.is_empty() => segment,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(segment = %raw, error = %e, "invalid path segment, skipping");
                    continue;
                }
            };
            match segment.lookup(document) {
                Some(Value::Array(items)) => {
                    for (index, element) in items.iter().enumerate() {
                        tasks.push(self.element_task(id, &segment, index, element));
                    }
                }
                _ => {
                    tracing::debug!(%segment, "segment absent or not an array, skipping");
                }
            }
        }
        tasks
    }

    fn root_task(&self, id: &Value, document: &Arc<Value>) -> MutationTask {
        let mut filter = Filter::new();
        filter.insert(ID_FIELD.to_string(), id.clone());

        let fields = self
            .template
            .iter()
            .map(|(key, spec)| FieldTarget {
                target: FieldPath::root().child(key),
                spec: spec.clone(),
            })
            .collect();

        MutationTask::new(filter, Arc::clone(document), fields)
    }

    fn element_task(
        &self,
        id: &Value,
        segment: &FieldPath,
        index: usize,
        element: &Value,
    ) -> MutationTask {
        let element_path = segment.index(index);

        let mut filter = Filter::new();
        filter.insert(ID_FIELD.to_string(), id.clone());
        filter.insert(element_path.to_string(), json!({ "$exists": true }));

        let fields = self
            .template
            .iter()
            .map(|(key, spec)| FieldTarget {
                target: element_path.child(key),
                spec: spec.clone(),
            })
            .collect();

        MutationTask::new(filter, Arc::new(element.clone()), fields)
    }
}
