//! docshift core - bulk document migration engine
//!
//! Fills fields into every document (or every element of nested arrays)
//! matching a query:
//! - Resolves a data template of literals, random tokens and `$$` references
//! - Expands documents into per-document or per-element mutation tasks
//! - Resolves tasks on a bounded-concurrency queue
//! - Dispatches the drained batch as one bulk write, or explains it in a
//!   dry run
//!
//! # Example
//!
//! ```rust,ignore
//! use docshift_core::prelude::*;
//! use serde_json::json;
//!
//! # async fn example(store: std::sync::Arc<dyn DocumentStore>) -> Result<(), MigrationError> {
//! let connection = Connection::new(store, Namespace::new("dbTest", "contracts"));
//! let result = Migrator::default()
//!     .migrate_value(
//!         connection,
//!         &json!({
//!             "data": { "aRandom": ">>RANDOM", "copied": "$$language" },
//!             "options": { "verbose": true, "writeMode": true }
//!         }),
//!     )
//!     .await?;
//!
//! if let Some(ack) = result.as_ref().and_then(AggregateResult::as_written) {
//!     println!("modified {} documents", ack.modified_count);
//! }
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod dispatch;
pub mod error;
pub mod expansion;
pub mod job;
pub mod migrator;
pub mod params;
pub mod path;
pub mod progress;
pub mod queue;
pub mod resolver;
pub mod store;
pub mod template;
pub mod types;

// Re-exports for convenience
pub use dispatch::BatchDispatcher;
pub use error::{MigrationError, StoreError, TaskError, ValidationError};
pub use expansion::PathExpander;
pub use job::{Handler, Job};
pub use migrator::{Migrator, MigratorConfig};
pub use params::{CursorSpec, MigrationOptions, MigrationParams};
pub use path::{FieldPath, FieldPathError};
pub use progress::Reporter;
pub use queue::{DrainedBatch, MutationQueue, QueueSettings, QueueState, QueueStats};
pub use resolver::{TaskResolver, TemplateResolver};
pub use store::{
    AggregateResult, BulkOptions, Connection, DocumentStore, ExecutionPlan, ExplainQuery,
    FindOptions, Namespace, WriteAck,
};
pub use template::{DataTemplate, FieldSpec};
pub use types::{
    Document, FieldTarget, Filter, MatchCriteria, Mode, MutationTask, TaskId, WriteOperation,
    WriteOptions, DEFAULT_CONCURRENCY, ID_FIELD,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running migrations
    pub use crate::{
        AggregateResult, Connection, DataTemplate, DocumentStore, Filter, Job, MigrationError,
        MigrationOptions, MigrationParams, Migrator, MigratorConfig, Namespace, TaskResolver,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
