//! Batch dispatch
//!
//! Sends the drained operations to the store in one bulk write, or explains
//! the match criteria in a dry run. The connection is consumed and closed on
//! every exit path.

use crate::error::StoreError;
use crate::progress::{Reporter, TOPIC_FINAL};
use crate::store::{AggregateResult, BulkOptions, Connection, ExplainQuery};
use crate::types::{Filter, MatchCriteria, Mode, WriteOperation};

/// Dispatches one drained batch
#[derive(Debug, Clone)]
pub struct BatchDispatcher {
    mode: Mode,
    criteria: MatchCriteria,
    array_filters: Vec<Filter>,
    limit: Option<usize>,
    bulk: BulkOptions,
    reporter: Reporter,
}

impl BatchDispatcher {
    /// Create dispatcher
    #[must_use]
    pub fn new(mode: Mode, criteria: MatchCriteria) -> Self {
        Self {
            mode,
            criteria,
            array_filters: Vec::new(),
            limit: None,
            bulk: BulkOptions::default(),
            reporter: Reporter::default(),
        }
    }

    /// With array filters flattened into the explained query
    #[inline]
    #[must_use]
    pub fn with_array_filters(mut self, array_filters: Vec<Filter>) -> Self {
        self.array_filters = array_filters;
        self
    }

    /// With cursor limit for the explained query
    #[inline]
    #[must_use]
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// With bulk write options
    #[inline]
    #[must_use]
    pub fn with_bulk_options(mut self, bulk: BulkOptions) -> Self {
        self.bulk = bulk;
        self
    }

    /// With progress reporter
    #[inline]
    #[must_use]
    pub fn with_reporter(mut self, reporter: Reporter) -> Self {
        self.reporter = reporter;
        self
    }

    /// Execution mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Filter a dry run explains
    #[must_use]
    pub fn explain_filter(&self) -> Filter {
        self.criteria.flatten_with(&self.array_filters)
    }

    /// Dispatch the batch and release the connection
    ///
    /// # Errors
    /// The store's bulk write or explain failure. A close failure is only
    /// reported when dispatch itself succeeded.
    pub async fn dispatch(
        &self,
        connection: Connection,
        operations: Vec<WriteOperation>,
    ) -> Result<AggregateResult, StoreError> {
        let outcome = self.run(&connection, operations).await;
        let closed = connection.close().await;

        match (outcome, closed) {
            (Ok(result), Ok(())) => {
                self.reporter
                    .result(TOPIC_FINAL, format_args!("{}", summarize(&result)));
                Ok(result)
            }
            (Ok(_), Err(e)) => {
                self.reporter.fatal(TOPIC_FINAL, &e);
                Err(e)
            }
            (Err(e), closed) => {
                if let Err(close_err) = closed {
                    tracing::warn!(error = %close_err, "failed to close connection after error");
                }
                self.reporter.fatal(TOPIC_FINAL, &e);
                Err(e)
            }
        }
    }

    async fn run(
        &self,
        connection: &Connection,
        operations: Vec<WriteOperation>,
    ) -> Result<AggregateResult, StoreError> {
        match self.mode {
            Mode::Write => {
                tracing::debug!(
                    operations = operations.len(),
                    ordered = self.bulk.ordered,
                    "applying bulk write"
                );
                let ack = connection
                    .store()
                    .bulk_apply(connection.namespace(), &operations, &self.bulk)
                    .await?;
                Ok(AggregateResult::Written(ack))
            }
            Mode::DryRun => {
                tracing::debug!(
                    discarded = operations.len(),
                    "dry run, explaining match criteria"
                );
                let query = ExplainQuery {
                    filter: self.explain_filter(),
                    limit: self.limit,
                };
                let plan = connection
                    .store()
                    .explain(connection.namespace(), &query)
                    .await?;
                Ok(AggregateResult::Explained(plan))
            }
        }
    }
}

fn summarize(result: &AggregateResult) -> String {
    match result {
        AggregateResult::Written(ack) => format!(
            "matched {} modified {} upserted {}",
            ack.matched_count, ack.modified_count, ack.upserted_count
        ),
        AggregateResult::Explained(plan) => format!(
            "{} examined {} returned {} in {}ms",
            plan.stage, plan.docs_examined, plan.n_returned, plan.execution_time_millis
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};

    fn obj(value: Value) -> Filter {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn explain_filter_merges_array_filters() {
        let criteria = MatchCriteria::build(
            &obj(json!({ "language": "no" })),
            &["addOns".into()],
            &obj(json!({ "$exists": true })),
        );
        let dispatcher = BatchDispatcher::new(Mode::DryRun, criteria)
            .with_array_filters(vec![obj(json!({ "addOns.id": { "$exists": true } }))]);

        assert_eq!(
            Value::Object(dispatcher.explain_filter()),
            json!({
                "language": "no",
                "addOns": { "$exists": true },
                "addOns.id": { "$exists": true }
            })
        );
    }

    #[test]
    fn summaries() {
        let written = AggregateResult::Written(crate::store::WriteAck {
            matched_count: 3,
            modified_count: 2,
            ..Default::default()
        });
        assert_eq!(summarize(&written), "matched 3 modified 2 upserted 0");
    }
}
