// src/models/mod.rs

//! Domain models for the scanner: race records, configuration and run
//! statistics.

mod config;
mod race;
mod stats;

pub use config::{CacheConfig, Config, EnrichConfig, HttpConfig};
pub use race::{Discipline, RaceMeeting, Runner};
pub use stats::{ErrorKind, ScanStats, ScanWindow, SourceError};
