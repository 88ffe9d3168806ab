// src/sources/mod.rs

//! The contract between the aggregator and individual data sources.
//!
//! Per-origin page parsing lives outside this crate; implementers of
//! [`RaceSource`] own their own HTML/JSON interpretation and route all
//! network access through the shared [`crate::fetch::Fetcher`]. Non-fatal
//! anomalies (a day that fails to parse, a missing odds table) are reported
//! through the [`ErrorSink`] while the source keeps going; returning `Err`
//! means the source produced nothing at all.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ErrorKind, RaceMeeting, ScanWindow, SourceError};

/// A single racing-data origin.
#[async_trait]
pub trait RaceSource: Send + Sync {
    /// Short origin name used in attribution maps and statistics.
    fn name(&self) -> &str;

    /// Collect every race this origin knows about inside the window.
    ///
    /// Partial results are fine: report per-page problems through `errors`
    /// and return what parsed. An `Err` return discards the whole source
    /// for this run without affecting siblings.
    async fn fetch_races(
        &self,
        window: &ScanWindow,
        errors: &ErrorSink,
    ) -> Result<Vec<RaceMeeting>>;
}

/// Clonable handle for recording non-fatal source errors.
///
/// Shared across concurrently running sources; the aggregator drains it
/// once at the end of a run.
#[derive(Clone, Default)]
pub struct ErrorSink {
    inner: Arc<Mutex<Vec<SourceError>>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(&self, error: SourceError) {
        log::warn!("[{}] {}: {}", error.source, kind_label(error.kind), error.message);
        self.inner.lock().expect("error sink lock").push(error);
    }

    /// Record a failed page retrieval.
    pub fn report_fetch(&self, source: &str, url: &str, message: impl Into<String>) {
        self.report(SourceError::new(
            source,
            message,
            ErrorKind::Fetch,
            Some(url.to_string()),
        ));
    }

    /// Record a page that was retrieved but could not be interpreted.
    pub fn report_parse(&self, source: &str, message: impl Into<String>) {
        self.report(SourceError::new(source, message, ErrorKind::Parse, None));
    }

    /// Record a whole-source failure (task error or panic).
    pub fn report_source(&self, source: &str, message: impl Into<String>) {
        self.report(SourceError::new(source, message, ErrorKind::Source, None));
    }

    /// Take every recorded error, leaving the sink empty.
    pub fn drain(&self) -> Vec<SourceError> {
        std::mem::take(&mut *self.inner.lock().expect("error sink lock"))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("error sink lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn kind_label(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::Fetch => "fetch",
        ErrorKind::Parse => "parse",
        ErrorKind::Source => "source",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_accumulates_across_clones() {
        let sink = ErrorSink::new();
        let clone = sink.clone();

        sink.report_fetch("SkySports", "https://example.com/cards", "timeout");
        clone.report_parse("ATR", "odds table missing");

        assert_eq!(sink.len(), 2);
        let drained = sink.drain();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].kind, ErrorKind::Fetch);
        assert_eq!(drained[0].url.as_deref(), Some("https://example.com/cards"));
        assert_eq!(drained[1].kind, ErrorKind::Parse);
        assert!(sink.is_empty());
    }
}
