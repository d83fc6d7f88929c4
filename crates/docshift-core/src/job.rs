//! Job envelope
//!
//! A job names a handler and carries its parameters:
//! `{ "handler": "migrate", "params": { "connection": {...}, ... } }`.

use crate::error::{MigrationError, ValidationError};
use crate::migrator::Migrator;
use crate::store::{AggregateResult, Connection, DocumentStore, Namespace};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Known job handlers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handler {
    /// Bulk field migration
    Migrate,
}

impl Handler {
    /// Handler name as written in job files
    #[inline]
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Migrate => "migrate",
        }
    }
}

impl FromStr for Handler {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "migrate" => Ok(Self::Migrate),
            other => Err(ValidationError::UnknownHandler(other.to_string())),
        }
    }
}

impl fmt::Display for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed job
#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    handler: Handler,
    params: Value,
}

impl Job {
    /// Parse a job envelope
    ///
    /// # Errors
    /// - `ValidationError::MissingParams` without `handler` and `params`
    /// - `ValidationError::UnknownHandler` for an unknown handler name
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let envelope = value.as_object().ok_or(ValidationError::MissingParams)?;
        let name = envelope
            .get("handler")
            .and_then(Value::as_str)
            .ok_or(ValidationError::MissingParams)?;
        let params = envelope
            .get("params")
            .filter(|params| !params.is_null())
            .ok_or(ValidationError::MissingParams)?;

        Ok(Self {
            handler: name.parse()?,
            params: params.clone(),
        })
    }

    /// Handler to run
    #[inline]
    #[must_use]
    pub fn handler(&self) -> Handler {
        self.handler
    }

    /// Raw handler parameters
    #[inline]
    #[must_use]
    pub fn params(&self) -> &Value {
        &self.params
    }

    /// Namespace named by `params.connection`
    ///
    /// # Errors
    /// - `ValidationError::MissingConnection` if `connection` is not an object
    /// - `ValidationError::MissingDatabase` / `MissingCollection` for absent
    ///   or empty names
    pub fn namespace(&self) -> Result<Namespace, ValidationError> {
        let connection = self
            .params
            .get("connection")
            .and_then(Value::as_object)
            .ok_or(ValidationError::MissingConnection)?;
        let name = |key: &str| {
            connection
                .get(key)
                .and_then(Value::as_str)
                .filter(|name| !name.trim().is_empty())
                .map(str::to_string)
        };

        let database = name("database").ok_or(ValidationError::MissingDatabase)?;
        let collection = name("collection").ok_or(ValidationError::MissingCollection)?;
        Ok(Namespace::new(database, collection))
    }

    /// Run the job against a store
    ///
    /// # Errors
    /// Validation errors before any store access; otherwise the handler's
    /// error.
    pub async fn run(
        &self,
        migrator: &Migrator,
        store: Arc<dyn DocumentStore>,
    ) -> Result<Option<AggregateResult>, MigrationError> {
        let namespace = self.namespace()?;
        tracing::info!(handler = %self.handler, %namespace, "running job");

        match self.handler {
            Handler::Migrate => {
                let connection = Connection::new(store, namespace);
                migrator.migrate_value(connection, &self.params).await
            }
        }
    }
}
