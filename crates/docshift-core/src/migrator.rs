//! Migration orchestrator
//!
//! Runs one migration end to end:
//! 1. Validate the connection and parameters (no I/O yet)
//! 2. Fetch the documents matching the criteria
//! 3. Expand each document into mutation tasks and push them
//! 4. Drain the queue
//! 5. Dispatch the batch (bulk write or explain)
//!
//! The connection is released on every path after validation.

use crate::dispatch::BatchDispatcher;
use crate::error::MigrationError;
use crate::expansion::PathExpander;
use crate::params::MigrationParams;
use crate::progress::{Reporter, TOPIC_DATABASE};
use crate::queue::{MutationQueue, QueueSettings};
use crate::resolver::TaskResolver;
use crate::store::{AggregateResult, Connection};
use crate::types::DEFAULT_CONCURRENCY;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// Migrator configuration
#[derive(Clone)]
pub struct MigratorConfig {
    /// Concurrency used when the invocation does not set one
    pub default_concurrency: usize,
    /// Resolver override; `None` uses template resolution
    resolver: Option<Arc<dyn TaskResolver>>,
}

impl MigratorConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With default concurrency (clamped to at least 1)
    #[inline]
    #[must_use]
    pub fn with_default_concurrency(mut self, concurrency: usize) -> Self {
        self.default_concurrency = concurrency.max(1);
        self
    }

    /// With custom task resolver
    #[inline]
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn TaskResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

impl Default for MigratorConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            resolver: None,
        }
    }
}

impl fmt::Debug for MigratorConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MigratorConfig")
            .field("default_concurrency", &self.default_concurrency)
            .field("custom_resolver", &self.resolver.is_some())
            .finish()
    }
}

/// Bulk document migrator
#[derive(Debug, Clone, Default)]
pub struct Migrator {
    config: MigratorConfig,
}

impl Migrator {
    /// Create migrator
    #[inline]
    #[must_use]
    pub fn new(config: MigratorConfig) -> Self {
        Self { config }
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    /// Validate a raw invocation, then migrate
    ///
    /// The connection is checked before the parameters, and both before any
    /// store access.
    ///
    /// # Errors
    /// See [`Migrator::migrate`].
    pub async fn migrate_value(
        &self,
        connection: Connection,
        raw: &Value,
    ) -> Result<Option<AggregateResult>, MigrationError> {
        connection.validate()?;
        let params = MigrationParams::from_value(raw)?;
        self.migrate(connection, &params).await
    }

    /// Run a migration
    ///
    /// # Returns
    /// - `Ok(None)` when no document matched
    /// - `Ok(Some(Written))` in write mode
    /// - `Ok(Some(Explained))` in dry-run mode
    ///
    /// # Errors
    /// - `MigrationError::Validation` for unnamed handles (nothing is read)
    /// - `MigrationError::TaskResolution` when a task fails
    /// - `MigrationError::Store` when the store fails
    pub async fn migrate(
        &self,
        connection: Connection,
        params: &MigrationParams,
    ) -> Result<Option<AggregateResult>, MigrationError> {
        connection.validate()?;

        let reporter = Reporter::new(params.options.verbose);
        let criteria = params.criteria();
        tracing::debug!(
            namespace = %connection.namespace(),
            mode = ?params.options.mode(),
            "starting migration"
        );

        let documents = match connection
            .find(criteria.as_filter(), &params.find_options())
            .await
        {
            Ok(documents) => documents,
            Err(e) => {
                reporter.fatal(TOPIC_DATABASE, &e);
                release(connection).await;
                return Err(e.into());
            }
        };

        if documents.is_empty() {
            reporter.step(TOPIC_DATABASE, "No documents matched, nothing to migrate");
            connection.close().await?;
            return Ok(None);
        }
        reporter.step(
            TOPIC_DATABASE,
            format_args!("Found {} document(s) to migrate", documents.len()),
        );

        let concurrency = params
            .options
            .concurrency
            .unwrap_or(self.config.default_concurrency)
            .max(1);
        let settings = QueueSettings::new(concurrency)
            .with_extra_filter(params.filter.clone())
            .with_write_options(params.options.document.clone())
            .with_reporter(reporter);
        let queue = match &self.config.resolver {
            Some(resolver) => MutationQueue::with_resolver(settings, Arc::clone(resolver)),
            None => MutationQueue::new(settings),
        };

        let expander = PathExpander::new(&params.path, Arc::clone(&params.data));
        let mut rejected = None;
        'documents: for document in documents {
            let document = Arc::new(Value::Object(document));
            for task in expander.expand(&document) {
                if let Err(e) = queue.push(task) {
                    rejected = Some(e);
                    break 'documents;
                }
            }
        }

        // a rejected push means the queue already failed; drain reports the cause
        let batch = match queue.drain().await {
            Ok(batch) => batch,
            Err(e) => {
                release(connection).await;
                return Err(e.into());
            }
        };
        if let Some(e) = rejected {
            reporter.fatal(TOPIC_DATABASE, &e);
            release(connection).await;
            return Err(e.into());
        }

        tracing::debug!(
            operations = batch.operations.len(),
            peak_running = batch.stats.peak_running,
            concurrency,
            "queue drained"
        );

        // array filters apply to nested paths only
        let array_filters = if params.path.is_empty() {
            Vec::new()
        } else {
            params.array_filters()
        };
        let dispatcher = BatchDispatcher::new(params.options.mode(), criteria)
            .with_array_filters(array_filters)
            .with_limit(params.cursor.limit)
            .with_bulk_options(params.options.bulk())
            .with_reporter(reporter);
        let result = dispatcher.dispatch(connection, batch.operations).await?;
        Ok(Some(result))
    }
}

/// Close after a failure; the original error wins over a close error
async fn release(connection: Connection) {
    if let Err(e) = connection.close().await {
        tracing::warn!(error = %e, "failed to close connection after error");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_builder() {
        let config = MigratorConfig::new().with_default_concurrency(0);
        assert_eq!(config.default_concurrency, 1);
        assert!(config.resolver.is_none());

        let config = config.with_resolver(Arc::new(crate::resolver::TemplateResolver));
        assert!(format!("{config:?}").contains("custom_resolver: true"));
    }

    #[test]
    fn default_concurrency_is_five() {
        assert_eq!(Migrator::default().config().default_concurrency, 5);
    }
}
