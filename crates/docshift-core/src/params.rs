//! Invocation parameters
//!
//! Validates the raw JSON invocation (camelCase keys) into typed
//! [`MigrationParams`]. Validation runs before any I/O; optional parts fall
//! back to empty defaults, required parts fail with a distinct
//! [`ValidationError`].

use crate::error::ValidationError;
use crate::store::{BulkOptions, FindOptions};
use crate::template::DataTemplate;
use crate::types::{Filter, MatchCriteria, Mode, WriteOptions};
use serde_json::{json, Map, Value};
use std::sync::Arc;

/// Cursor over the collection being migrated
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CursorSpec {
    /// Base match expression
    pub query: Filter,
    /// Projection; empty fetches whole documents
    pub fields: Vec<String>,
    /// Maximum fetched documents; `None` is unbounded
    pub limit: Option<usize>,
}

impl CursorSpec {
    fn parse(value: Option<&Value>) -> Self {
        let Some(cursor) = value.and_then(Value::as_object) else {
            return Self::default();
        };

        let query = object_or_empty(cursor.get("query"));
        let fields = cursor
            .get("fields")
            .and_then(Value::as_array)
            .map(|fields| {
                fields
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        // 0 means "no limit"
        let limit = cursor
            .get("limit")
            .and_then(as_count)
            .filter(|limit| *limit > 0);

        Self {
            query,
            fields,
            limit,
        }
    }
}

/// Run options (`options`)
#[derive(Debug, Clone, PartialEq)]
pub struct MigrationOptions {
    /// Emit progress events
    pub verbose: bool,
    /// Apply writes; `false` is a dry run
    pub write_mode: bool,
    /// Concurrency bound; `None` uses the migrator default
    pub concurrency: Option<usize>,
    /// Stop the bulk write at the first failure
    pub ordered: bool,
    /// Per-operation write options
    pub document: WriteOptions,
}

impl MigrationOptions {
    /// Create options with defaults for everything but the required flags
    #[inline]
    #[must_use]
    pub fn new(write_mode: bool, verbose: bool) -> Self {
        Self {
            verbose,
            write_mode,
            concurrency: None,
            ordered: true,
            document: WriteOptions::default(),
        }
    }

    /// With concurrency bound (clamped to at least 1)
    #[inline]
    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = Some(concurrency.max(1));
        self
    }

    /// With per-operation write options
    #[inline]
    #[must_use]
    pub fn with_document(mut self, document: WriteOptions) -> Self {
        self.document = document;
        self
    }

    /// With bulk write ordering
    #[inline]
    #[must_use]
    pub fn with_ordered(mut self, ordered: bool) -> Self {
        self.ordered = ordered;
        self
    }

    /// Execution mode
    #[inline]
    #[must_use]
    pub fn mode(&self) -> Mode {
        Mode::from_write_flag(self.write_mode)
    }

    /// Bulk write options
    #[inline]
    #[must_use]
    pub fn bulk(&self) -> BulkOptions {
        BulkOptions {
            ordered: self.ordered,
        }
    }

    fn parse(value: Option<&Value>) -> Result<Self, ValidationError> {
        let options = value
            .and_then(Value::as_object)
            .ok_or(ValidationError::InvalidOptions)?;

        let write_mode = options
            .get("writeMode")
            .and_then(Value::as_bool)
            .ok_or(ValidationError::InvalidWriteMode)?;
        let verbose = options
            .get("verbose")
            .and_then(Value::as_bool)
            .ok_or(ValidationError::InvalidVerbose)?;

        let concurrency = options
            .get("concurrency")
            .and_then(as_count)
            .map(|c| c.max(1));
        let ordered = options
            .get("ordered")
            .and_then(Value::as_bool)
            .unwrap_or(true);
        let document = parse_write_options(options.get("document"));

        Ok(Self {
            verbose,
            write_mode,
            concurrency,
            ordered,
            document,
        })
    }
}

/// Validated invocation parameters
#[derive(Debug, Clone)]
pub struct MigrationParams {
    /// Collection cursor
    pub cursor: CursorSpec,
    /// Nested array fields to traverse; empty targets the document root
    pub path: Vec<String>,
    /// Condition placed under every path segment
    pub condition: Filter,
    /// Extra clauses merged into every write filter
    pub filter: Filter,
    /// Data template
    pub data: Arc<DataTemplate>,
    /// Run options
    pub options: MigrationOptions,
}

impl MigrationParams {
    /// Create params targeting the document root of every document
    #[must_use]
    pub fn new(data: DataTemplate, options: MigrationOptions) -> Self {
        let mut params = Self {
            cursor: CursorSpec::default(),
            path: Vec::new(),
            condition: Filter::new(),
            filter: Filter::new(),
            data: Arc::new(data),
            options,
        };
        params.normalize();
        params
    }

    /// With cursor
    #[inline]
    #[must_use]
    pub fn with_cursor(mut self, cursor: CursorSpec) -> Self {
        self.cursor = cursor;
        self
    }

    /// With traversal path
    #[inline]
    #[must_use]
    pub fn with_path<I, S>(mut self, path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.path = path.into_iter().map(Into::into).collect();
        self
    }

    /// With path condition; empty becomes `{"$exists": true}`
    #[inline]
    #[must_use]
    pub fn with_condition(mut self, condition: Filter) -> Self {
        self.condition = condition;
        self.normalize();
        self
    }

    /// With extra write filter
    #[inline]
    #[must_use]
    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    /// Validate a raw invocation
    ///
    /// Checks, in order: params object, `options`, `options.writeMode`,
    /// `options.verbose`, `data`. The `connection` key is not read here.
    ///
    /// # Errors
    /// The first failing check's `ValidationError`.
    pub fn from_value(value: &Value) -> Result<Self, ValidationError> {
        let raw = value.as_object().ok_or(ValidationError::InvalidParams)?;

        let cursor = CursorSpec::parse(raw.get("cursor"));
        let path = raw
            .get("path")
            .and_then(Value::as_array)
            .map(|path| {
                path.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let condition = object_or_empty(raw.get("condition"));
        let filter = object_or_empty(raw.get("filter"));

        let options = MigrationOptions::parse(raw.get("options"))?;
        let data = DataTemplate::from_value(raw.get("data").unwrap_or(&Value::Null))?;

        let mut params = Self {
            cursor,
            path,
            condition,
            filter,
            data: Arc::new(data),
            options,
        };
        params.normalize();
        Ok(params)
    }

    /// Criteria used for the fetch and the dry-run explain
    #[inline]
    #[must_use]
    pub fn criteria(&self) -> MatchCriteria {
        MatchCriteria::build(&self.cursor.query, &self.path, &self.condition)
    }

    /// Fetch options derived from the cursor
    #[inline]
    #[must_use]
    pub fn find_options(&self) -> FindOptions {
        FindOptions {
            limit: self.cursor.limit,
            fields: self.cursor.fields.clone(),
        }
    }

    /// Array filters retained for a dry run
    #[inline]
    #[must_use]
    pub fn array_filters(&self) -> Vec<Filter> {
        self.options
            .document
            .array_filters
            .clone()
            .unwrap_or_default()
    }

    fn normalize(&mut self) {
        if self.condition.is_empty() {
            self.condition.insert("$exists".to_string(), json!(true));
        }
        if self.options.write_mode {
            self.options.document.array_filters = None;
        }
    }
}

fn object_or_empty(value: Option<&Value>) -> Map<String, Value> {
    value
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Non-negative numeric count, fractional values floored
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn as_count(value: &Value) -> Option<usize> {
    if let Some(n) = value.as_u64() {
        return usize::try_from(n).ok();
    }
    let n = value.as_f64()?;
    if n.is_finite() && n >= 0.0 {
        Some(n.floor() as usize)
    } else if n.is_finite() {
        Some(0)
    } else {
        None
    }
}

fn parse_write_options(value: Option<&Value>) -> WriteOptions {
    let Some(document) = value.and_then(Value::as_object) else {
        return WriteOptions::default();
    };
    let flag = |key: &str| document.get(key).and_then(Value::as_bool).unwrap_or(false);
    let array_filters = document
        .get("arrayFilters")
        .and_then(Value::as_array)
        .map(|filters| {
            filters
                .iter()
                .filter_map(Value::as_object)
                .cloned()
                .collect()
        });

    WriteOptions {
        upsert: flag("upsert"),
        multi: flag("multi"),
        array_filters,
    }
}
