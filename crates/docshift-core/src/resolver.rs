//! Reference resolution
//!
//! Turns a [`FieldSpec`] into a concrete value against a context (the
//! enclosing document, or a single array element for nested paths), and
//! turns a whole [`MutationTask`] into the body of its `$set`.

use crate::error::TaskError;
use crate::path::FieldPath;
use crate::template::FieldSpec;
use crate::types::{Document, MutationTask};
use serde_json::Value;
use uuid::Uuid;

/// Resolve a field spec against a context
///
/// Returns `None` when a reference points at an absent field; that is not
/// an error. Random specs produce a new token on every call.
#[must_use]
pub fn resolve(spec: &FieldSpec, context: &Value) -> Option<Value> {
    match spec {
        FieldSpec::Literal(value) => Some(value.clone()),
        FieldSpec::Random => Some(Value::String(random_token())),
        FieldSpec::Reference(name) => {
            let path: FieldPath = name.parse().ok()?;
            if path.is_empty() {
                return None;
            }
            path.lookup(context).cloned()
        }
    }
}

/// Generate a fresh random token (UUID v4)
#[inline]
#[must_use]
pub fn random_token() -> String {
    Uuid::new_v4().to_string()
}

/// Resolves a mutation task into its `$set` body
///
/// Implement this trait to change how tasks are resolved; the queue calls it
/// from its workers.
#[async_trait::async_trait]
pub trait TaskResolver: Send + Sync {
    /// Resolve every field of `task`
    async fn resolve_task(&self, task: &MutationTask) -> Result<Document, TaskError>;
}

/// Default resolver: evaluates the task's template fields
///
/// Absent references are written as `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateResolver;

impl TemplateResolver {
    /// Resolve synchronously
    #[must_use]
    pub fn resolve_fields(task: &MutationTask) -> Document {
        task.fields
            .iter()
            .map(|field| {
                let value = resolve(&field.spec, &task.context).unwrap_or(Value::Null);
                (field.target.to_string(), value)
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl TaskResolver for TemplateResolver {
    async fn resolve_task(&self, task: &MutationTask) -> Result<Document, TaskError> {
        Ok(Self::resolve_fields(task))
    }
}
