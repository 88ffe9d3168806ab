// src/aggregate/mod.rs

//! Concurrent source orchestration.
//!
//! The aggregator runs every registered [`RaceSource`] in its own task,
//! collects whatever each produced, collapses duplicates across origins,
//! attaches form-guide links and scores the survivors. A source that fails
//! or panics becomes a recorded [`crate::models::SourceError`]; its siblings
//! are unaffected.

pub mod enrich;
pub mod merge;

pub use enrich::FormGuideEnricher;
pub use merge::{dedupe_merge, MergeKey};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use crate::fetch::Fetcher;
use crate::models::{Config, RaceMeeting, ScanStats, ScanWindow};
use crate::score::ValueScorer;
use crate::sources::{ErrorSink, RaceSource};

pub struct Aggregator {
    sources: Vec<Arc<dyn RaceSource>>,
    fetcher: Arc<Fetcher>,
    enricher: FormGuideEnricher,
    scorer: ValueScorer,
}

impl Aggregator {
    pub fn new(config: &Config, fetcher: Arc<Fetcher>) -> Self {
        Self {
            sources: Vec::new(),
            fetcher,
            enricher: FormGuideEnricher::new(config.enrich.clone()),
            scorer: ValueScorer::new(),
        }
    }

    /// Register a source; builder-style so setup chains.
    pub fn with_source(mut self, source: Arc<dyn RaceSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn add_source(&mut self, source: Arc<dyn RaceSource>) {
        self.sources.push(source);
    }

    /// Run a full scan over the window.
    ///
    /// Returns the merged, enriched and scored records (unordered, one per
    /// merge key) together with statistics for the run.
    pub async fn fetch_all(&self, window: ScanWindow) -> (Vec<RaceMeeting>, ScanStats) {
        let started = Instant::now();
        let sink = ErrorSink::new();

        let handles: Vec<_> = self
            .sources
            .iter()
            .map(|source| {
                let source = Arc::clone(source);
                let sink = sink.clone();
                let name = source.name().to_string();
                let handle = tokio::spawn(async move {
                    source.fetch_races(&window, &sink).await
                });
                (name, handle)
            })
            .collect();

        let mut per_source_counts = HashMap::new();
        let mut collected = Vec::new();
        for (name, handle) in handles {
            match handle.await {
                Ok(Ok(races)) => {
                    log::info!("[{name}] contributed {} races", races.len());
                    per_source_counts.insert(name, races.len());
                    collected.extend(races);
                }
                Ok(Err(e)) => {
                    sink.report_source(&name, e.to_string());
                    per_source_counts.insert(name, 0);
                }
                Err(join_error) => {
                    sink.report_source(&name, format!("task aborted: {join_error}"));
                    per_source_counts.insert(name, 0);
                }
            }
        }

        let total_found = collected.len();
        let mut races = dedupe_merge(collected);
        log::info!("{total_found} raw races merged to {}", races.len());

        self.enricher.enrich(&self.fetcher, &mut races).await;

        for race in &mut races {
            race.value_score = self.scorer.score(race);
        }

        let stats = ScanStats {
            total_found,
            after_dedup: races.len(),
            per_source_counts,
            errors: sink.drain(),
            duration_secs: started.elapsed().as_secs_f64(),
        };
        (races, stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use crate::models::{Discipline, ErrorKind, Runner};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    fn meeting(course: &str, time: &str, origin: &str, odds: &[(&str, &str)]) -> RaceMeeting {
        RaceMeeting {
            id: crate::normalize::race_fingerprint(course, "2024-05-01", time),
            course: course.to_string(),
            race_time: time.to_string(),
            utc_datetime: format!("2024-05-01T{time}:00Z").parse().unwrap(),
            local_time: time.to_string(),
            timezone_name: "Europe/London".to_string(),
            field_size: odds.len(),
            country: "GB".to_string(),
            discipline: Discipline::Thoroughbred,
            race_number: None,
            grade: None,
            distance: None,
            surface: None,
            favorite: None,
            second_favorite: None,
            runners: odds.iter().map(|(n, o)| Runner::new(*n, *o)).collect(),
            race_url: format!("https://{}.example.com/card", origin.to_lowercase()),
            form_guide_url: None,
            value_score: 0.0,
            data_sources: BTreeMap::from([("course".to_string(), origin.to_string())]),
        }
    }

    struct FixedSource {
        name: &'static str,
        races: Vec<RaceMeeting>,
    }

    #[async_trait]
    impl RaceSource for FixedSource {
        fn name(&self) -> &str {
            self.name
        }
        async fn fetch_races(
            &self,
            _window: &ScanWindow,
            _errors: &ErrorSink,
        ) -> crate::error::Result<Vec<RaceMeeting>> {
            Ok(self.races.clone())
        }
    }

    struct FailingSource;

    #[async_trait]
    impl RaceSource for FailingSource {
        fn name(&self) -> &str {
            "Broken"
        }
        async fn fetch_races(
            &self,
            _window: &ScanWindow,
            _errors: &ErrorSink,
        ) -> crate::error::Result<Vec<RaceMeeting>> {
            Err(AppError::source("Broken", "upstream rejected every request"))
        }
    }

    struct PanickingSource;

    #[async_trait]
    impl RaceSource for PanickingSource {
        fn name(&self) -> &str {
            "Panicky"
        }
        async fn fetch_races(
            &self,
            _window: &ScanWindow,
            _errors: &ErrorSink,
        ) -> crate::error::Result<Vec<RaceMeeting>> {
            panic!("parser hit unexpected structure");
        }
    }

    fn aggregator() -> (Config, Arc<Fetcher>) {
        let config = Config::default();
        let fetcher = Arc::new(Fetcher::new(&config, None).unwrap());
        (config, fetcher)
    }

    fn window() -> ScanWindow {
        let day = chrono::NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        ScanWindow::new(day, day)
    }

    #[tokio::test]
    async fn test_failed_source_does_not_affect_siblings() {
        let (config, fetcher) = aggregator();
        let good = FixedSource {
            name: "Good",
            races: vec![
                meeting("Ascot", "14:00", "Good", &[("Alpha", "2/1")]),
                meeting("Kempton", "15:00", "Good", &[("Beta", "3/1")]),
                meeting("Newmarket", "16:00", "Good", &[]),
            ],
        };

        let agg = Aggregator::new(&config, fetcher)
            .with_source(Arc::new(good))
            .with_source(Arc::new(FailingSource));

        let (races, stats) = agg.fetch_all(window()).await;
        assert_eq!(races.len(), 3);
        assert_eq!(stats.per_source_counts.get("Good"), Some(&3));
        assert_eq!(stats.per_source_counts.get("Broken"), Some(&0));
        assert_eq!(stats.errors.len(), 1);
        assert_eq!(stats.errors[0].kind, ErrorKind::Source);
        assert_eq!(stats.errors[0].source, "Broken");
    }

    #[tokio::test]
    async fn test_panicking_source_is_contained() {
        let (config, fetcher) = aggregator();
        let good = FixedSource {
            name: "Good",
            races: vec![meeting("Ascot", "14:00", "Good", &[("Alpha", "2/1")])],
        };

        let agg = Aggregator::new(&config, fetcher)
            .with_source(Arc::new(PanickingSource))
            .with_source(Arc::new(good));

        let (races, stats) = agg.fetch_all(window()).await;
        assert_eq!(races.len(), 1);
        assert_eq!(stats.per_source_counts.get("Panicky"), Some(&0));
        assert_eq!(stats.errors.len(), 1);
        assert!(stats.errors[0].message.contains("task aborted"));
    }

    #[tokio::test]
    async fn test_cross_origin_reconciliation_and_scoring() {
        let (config, fetcher) = aggregator();

        // Same Ascot race seen by two origins, two minutes apart; one knows
        // the field, the other the odds.
        let mut sky_race = meeting("Ascot", "14:02", "SkySports", &[]);
        sky_race.field_size = 5;
        let atr_race = meeting(
            "ascot (GB)",
            "14:04",
            "ATR",
            &[("Alpha", "5/4"), ("Beta", "7/2"), ("Gamma", "9/1")],
        );

        let sky = FixedSource { name: "SkySports", races: vec![sky_race] };
        let atr = FixedSource { name: "ATR", races: vec![atr_race] };

        let agg = Aggregator::new(&config, fetcher)
            .with_source(Arc::new(sky))
            .with_source(Arc::new(atr));

        let (races, stats) = agg.fetch_all(window()).await;
        assert_eq!(stats.total_found, 2);
        assert_eq!(stats.after_dedup, 1);
        assert!(stats.errors.is_empty());

        let race = &races[0];
        assert_eq!(race.field_size, 5);
        assert_eq!(race.favorite.as_ref().unwrap().name, "Alpha");
        assert_eq!(race.origin_names(), vec!["ATR", "SkySports"]);
        assert!(race.value_score > 0.0);
        assert!(race.value_score <= 100.0);
    }

    #[tokio::test]
    async fn test_empty_aggregator_yields_empty_run() {
        let (config, fetcher) = aggregator();
        let agg = Aggregator::new(&config, fetcher);
        let (races, stats) = agg.fetch_all(window()).await;
        assert!(races.is_empty());
        assert_eq!(stats.total_found, 0);
        assert_eq!(stats.after_dedup, 0);
    }
}
