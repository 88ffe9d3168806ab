//! Run statistics and source error records.

use std::collections::HashMap;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Classification of a recorded source error.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// A page could not be retrieved
    Fetch,
    /// A retrieved page could not be interpreted
    Parse,
    /// The source failed as a whole (task error or panic)
    Source,
}

/// An error attributed to one data source. Read-only once recorded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceError {
    /// Origin name (source that reported or caused the error)
    pub source: String,

    /// Human-readable message
    pub message: String,

    /// Error classification
    pub kind: ErrorKind,

    /// When the error was recorded
    pub timestamp: DateTime<Utc>,

    /// URL involved, when known
    #[serde(default)]
    pub url: Option<String>,
}

impl SourceError {
    pub fn new(
        source: impl Into<String>,
        message: impl Into<String>,
        kind: ErrorKind,
        url: Option<String>,
    ) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            kind,
            timestamp: Utc::now(),
            url,
        }
    }
}

/// Statistics for one complete scan. Populated once by the aggregator.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ScanStats {
    /// Raw record count across all sources, before dedup
    pub total_found: usize,

    /// Record count after dedup/merge
    pub after_dedup: usize,

    /// Records contributed per source (0 for failed sources)
    pub per_source_counts: HashMap<String, usize>,

    /// All errors recorded during the run
    pub errors: Vec<SourceError>,

    /// Wall-clock duration of the run in seconds
    pub duration_secs: f64,
}

/// Inclusive UTC date range a scan covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ScanWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Window covering today (UTC) plus `days_forward` days.
    pub fn from_today(days_forward: i64) -> Self {
        let today = Utc::now().date_naive();
        Self {
            start: today,
            end: today + Duration::days(days_forward),
        }
    }

    /// Iterate the calendar days in the window, oldest first.
    pub fn days(&self) -> impl Iterator<Item = NaiveDate> {
        let start = self.start;
        let count = (self.end - self.start).num_days().max(0) as usize + 1;
        (0..count).map(move |i| start + Duration::days(i as i64))
    }
}
