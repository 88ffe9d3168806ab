//! Race meeting data structures.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entrant with the odds text as reported by the origin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Runner {
    /// Runner name
    pub name: String,

    /// Raw odds text, e.g. "9/4", "2.5", "EVS", "SP" (may be empty)
    pub odds_text: String,
}

impl Runner {
    pub fn new(name: impl Into<String>, odds_text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            odds_text: odds_text.into(),
        }
    }

    /// Whether the runner carries a usable odds quote.
    pub fn has_odds(&self) -> bool {
        !self.odds_text.trim().is_empty()
    }
}

/// Racing discipline. Closed set; origins reporting anything else are
/// mapped by the source implementation before records enter the pipeline.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Discipline {
    #[default]
    Thoroughbred,
    Harness,
    Greyhound,
}

/// Canonical record of one scheduled race.
///
/// Created by a source, possibly merged with same-keyed records from other
/// origins, then scored. Each merge produces a fresh record; the score is
/// assigned once near the end of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceMeeting {
    /// Deterministic fingerprint of normalized course + date + time.
    /// Stable across origins reporting the same physical race.
    pub id: String,

    /// Course (venue) name as reported
    pub course: String,

    /// Scheduled post time in local "HH:MM"
    pub race_time: String,

    /// Post time as a UTC instant
    pub utc_datetime: DateTime<Utc>,

    /// Local wall-clock time at the track, "HH:MM"
    pub local_time: String,

    /// IANA timezone name of the track
    pub timezone_name: String,

    /// Number of declared runners
    pub field_size: usize,

    /// ISO country code of the track
    pub country: String,

    /// Racing discipline
    pub discipline: Discipline,

    /// Race number within the meeting, when the origin reports one
    #[serde(default)]
    pub race_number: Option<u32>,

    /// Race grade/class text
    #[serde(default)]
    pub grade: Option<String>,

    /// Distance text as reported
    #[serde(default)]
    pub distance: Option<String>,

    /// Surface text as reported
    #[serde(default)]
    pub surface: Option<String>,

    /// Market favorite, when identifiable
    #[serde(default)]
    pub favorite: Option<Runner>,

    /// Second favorite, when identifiable
    #[serde(default)]
    pub second_favorite: Option<Runner>,

    /// Full runner list in reported order
    #[serde(default)]
    pub runners: Vec<Runner>,

    /// Canonical racecard URL
    pub race_url: String,

    /// Supplementary form-guide link, attached by enrichment
    #[serde(default)]
    pub form_guide_url: Option<String>,

    /// Desirability score in [0, 100]; 0 until scored
    #[serde(default)]
    pub value_score: f64,

    /// Attribution map: which origin contributed which role
    /// (e.g. "course" -> "SkySports", "odds" -> "ATR")
    #[serde(default)]
    pub data_sources: BTreeMap<String, String>,
}

impl RaceMeeting {
    /// Whether any runner carries a live quote rather than SP/blank.
    pub fn has_live_odds(&self) -> bool {
        self.runners.iter().any(|r| {
            let s = r.odds_text.trim().to_uppercase();
            !s.is_empty() && s != "SP" && s != "NR" && s != "VOID" && s != "WD"
        })
    }

    /// Distinct contributing origin names, sorted.
    pub fn origin_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.data_sources.values().map(String::as_str).collect();
        names.sort_unstable();
        names.dedup();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_meeting() -> RaceMeeting {
        RaceMeeting {
            id: "abc123def456".to_string(),
            course: "Ascot".to_string(),
            race_time: "14:30".to_string(),
            utc_datetime: "2024-05-01T13:30:00Z".parse().unwrap(),
            local_time: "14:30".to_string(),
            timezone_name: "Europe/London".to_string(),
            field_size: 5,
            country: "GB".to_string(),
            discipline: Discipline::Thoroughbred,
            race_number: None,
            grade: None,
            distance: None,
            surface: None,
            favorite: None,
            second_favorite: None,
            runners: vec![Runner::new("Alpha", "2/1"), Runner::new("Beta", "SP")],
            race_url: "https://example.com/racecard/ascot".to_string(),
            form_guide_url: None,
            value_score: 0.0,
            data_sources: BTreeMap::from([("course".to_string(), "SkySports".to_string())]),
        }
    }

    #[test]
    fn test_has_live_odds() {
        let meeting = sample_meeting();
        assert!(meeting.has_live_odds());

        let mut sp_only = meeting.clone();
        sp_only.runners = vec![Runner::new("Alpha", "SP"), Runner::new("Beta", "")];
        assert!(!sp_only.has_live_odds());
    }

    #[test]
    fn test_origin_names_deduped() {
        let mut meeting = sample_meeting();
        meeting
            .data_sources
            .insert("runners".to_string(), "SkySports".to_string());
        meeting
            .data_sources
            .insert("odds".to_string(), "ATR".to_string());
        assert_eq!(meeting.origin_names(), vec!["ATR", "SkySports"]);
    }
}
