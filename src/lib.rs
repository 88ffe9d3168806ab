// src/lib.rs

//! racescan — racing-event scanner library
//!
//! Fetch orchestration (cache, pacing, retry, fallback ladder) and the
//! dedup/merge/score pipeline. Source parsing, report rendering and CLI
//! handling live in downstream crates.

pub mod aggregate;
pub mod cache;
pub mod error;
pub mod fetch;
pub mod models;
pub mod normalize;
pub mod odds;
pub mod score;
pub mod sources;

pub use aggregate::Aggregator;
pub use cache::CacheStore;
pub use error::{AppError, Result};
pub use fetch::Fetcher;
pub use models::{Config, RaceMeeting, Runner, ScanStats, ScanWindow};
pub use score::ValueScorer;
pub use sources::{ErrorSink, RaceSource};
