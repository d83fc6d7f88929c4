//! JSON file persistence
//!
//! A collection file is a JSON array of objects.

use crate::memory::MemoryStore;
use docshift_core::{Document, Namespace, StoreError};
use serde_json::Value;
use std::path::Path;

/// Read a collection file
///
/// # Errors
/// - `StoreError::Io` if the file cannot be read, is not JSON, or is not an
///   array of objects
pub async fn load_collection(path: &Path) -> Result<Vec<Document>, StoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
    let value: Value = serde_json::from_slice(&bytes)
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;

    let Value::Array(items) = value else {
        return Err(StoreError::Io(format!(
            "{}: expected a JSON array of documents",
            path.display()
        )));
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| match item {
            Value::Object(document) => Ok(document),
            _ => Err(StoreError::Io(format!(
                "{}: entry {index} is not a document",
                path.display()
            ))),
        })
        .collect()
}

/// Write a collection file (pretty-printed)
///
/// # Errors
/// - `StoreError::Io` if the file cannot be written
pub async fn save_collection(path: &Path, documents: &[Document]) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(documents)
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| StoreError::Io(format!("{}: {e}", path.display())))
}

impl MemoryStore {
    /// Create a store holding one collection loaded from `path`
    ///
    /// # Errors
    /// See [`load_collection`].
    pub async fn open_file(namespace: &Namespace, path: &Path) -> Result<Self, StoreError> {
        let documents = load_collection(path).await?;
        tracing::debug!(%namespace, documents = documents.len(), path = %path.display(), "loaded collection");

        let store = Self::new();
        store.create_collection(namespace);
        store.insert_many(namespace, documents);
        Ok(store)
    }

    /// Write one collection back to `path`
    ///
    /// # Errors
    /// - `StoreError::CollectionNotFound` if the namespace is unknown
    /// - `StoreError::Io` if the file cannot be written
    pub async fn save_file(&self, namespace: &Namespace, path: &Path) -> Result<(), StoreError> {
        if !self.namespaces().contains(namespace) {
            return Err(StoreError::CollectionNotFound(namespace.to_string()));
        }
        let documents = self.documents(namespace);
        save_collection(path, &documents).await?;
        tracing::debug!(%namespace, documents = documents.len(), path = %path.display(), "saved collection");
        Ok(())
    }
}
