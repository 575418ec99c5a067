use chrono::{DateTime, Utc};
use serde_json::Value;

use std::time::{Duration, Instant};

/// Outcome of a successful command execution.
#[derive(Debug)]
pub struct Response {
    /// Wall-clock duration of the backend call.
    pub execution_time: Duration,

    /// When the backend call was issued.
    pub executed_at: DateTime<Utc>,

    pub rows: Rows,

    /// Column names, when the backend reports them.
    pub fields: Option<Vec<String>>,

    /// Echoed query and parameters. Attached by the runtime outside
    /// production only.
    pub diagnostics: Option<Diagnostics>,
}

#[derive(Debug)]
pub enum Rows {
    /// Number of rows impacted by the operation.
    Count(u64),

    /// Operation result rows.
    Values(Vec<Value>),
}

#[derive(Debug)]
pub struct Diagnostics {
    pub query: String,
    pub params: Vec<Value>,
}

impl Response {
    pub fn count(count: u64) -> Self {
        Self::new(Rows::Count(count))
    }

    pub fn values(values: Vec<Value>) -> Self {
        Self::new(Rows::Values(values))
    }

    fn new(rows: Rows) -> Self {
        Self {
            execution_time: Duration::ZERO,
            executed_at: Utc::now(),
            rows,
            fields: None,
            diagnostics: None,
        }
    }

    /// Stamps the execution time from the instant the call started.
    pub fn timed(mut self, started: Instant) -> Self {
        self.execution_time = started.elapsed();
        self
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }
}

impl Rows {
    pub fn is_count(&self) -> bool {
        matches!(self, Self::Count(_))
    }

    pub fn is_values(&self) -> bool {
        matches!(self, Self::Values(_))
    }

    #[track_caller]
    pub fn into_count(self) -> u64 {
        match self {
            Self::Count(count) => count,
            Self::Values(values) => panic!("expected row count, got {} rows", values.len()),
        }
    }

    #[track_caller]
    pub fn into_values(self) -> Vec<Value> {
        match self {
            Self::Values(values) => values,
            Self::Count(count) => panic!("expected rows, got count {count}"),
        }
    }
}
