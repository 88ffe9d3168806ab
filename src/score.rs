// src/score.rs

//! Value scoring for merged race records.
//!
//! A weighted blend of banded sub-scores: small competitive fields with a
//! short-priced favorite and a clear gap to the second favorite score
//! highest. Pure; the aggregator applies it once per record at the end of a
//! run.

use crate::models::{Discipline, RaceMeeting};
use crate::odds::{convert_odds_to_fractional, NO_ODDS};

const WEIGHT_FIELD: f64 = 0.35;
const WEIGHT_FAVORITE: f64 = 0.45;
const WEIGHT_SPREAD: f64 = 0.15;
const WEIGHT_QUALITY: f64 = 0.05;

#[derive(Debug, Default)]
pub struct ValueScorer;

impl ValueScorer {
    pub fn new() -> Self {
        Self
    }

    /// Score one record on a 0..=100 scale.
    pub fn score(&self, race: &RaceMeeting) -> f64 {
        let favorite_odds = race
            .favorite
            .as_ref()
            .map(|r| convert_odds_to_fractional(&r.odds_text));
        let second_odds = race
            .second_favorite
            .as_ref()
            .map(|r| convert_odds_to_fractional(&r.odds_text));

        let field = field_score(race.field_size);
        let favorite = favorite_score(favorite_odds);
        let spread_band = spread_score(favorite_odds, second_odds);
        let quality = quality_score(race);

        let mut score = field * WEIGHT_FIELD
            + favorite * WEIGHT_FAVORITE
            + spread_band * WEIGHT_SPREAD
            + quality * WEIGHT_QUALITY;

        if race.has_live_odds() {
            score *= 1.2;
        }
        if race.discipline == Discipline::Greyhound {
            score *= 1.1;
        }
        // Small field with a clearly split market
        if race.field_size <= 6 && spread_band > 80.0 {
            score *= 1.15;
        }

        score.clamp(0.0, 100.0)
    }
}

fn field_score(field_size: usize) -> f64 {
    match field_size {
        3..=5 => 100.0,
        6..=8 => 85.0,
        9..=12 => 60.0,
        0..=2 => 30.0,
        _ => 20.0,
    }
}

fn favorite_score(odds: Option<f64>) -> f64 {
    let Some(odds) = odds else {
        return 0.0;
    };
    if odds >= NO_ODDS {
        // Favorite identified but its quote did not parse
        return 30.0;
    }
    if (1.0..=1.5).contains(&odds) {
        100.0
    } else if odds > 1.5 && odds <= 2.5 {
        90.0
    } else if odds > 2.5 && odds <= 4.0 {
        75.0
    } else if (0.5..1.0).contains(&odds) {
        85.0
    } else if odds < 0.5 {
        60.0
    } else {
        40.0
    }
}

fn spread_score(favorite: Option<f64>, second: Option<f64>) -> f64 {
    let (Some(fav), Some(sec)) = (favorite, second) else {
        return 50.0;
    };
    if fav >= NO_ODDS || sec >= NO_ODDS {
        return 50.0;
    }
    let spread = sec - fav;
    if spread >= 2.0 {
        100.0
    } else if spread >= 1.5 {
        90.0
    } else if spread >= 1.0 {
        80.0
    } else if spread >= 0.5 {
        60.0
    } else {
        40.0
    }
}

fn quality_score(race: &RaceMeeting) -> f64 {
    let mut score: f64 = 0.0;
    if race.runners.iter().any(|r| r.has_odds()) {
        score += 40.0;
    }
    if race.favorite.is_some() && race.second_favorite.is_some() {
        score += 30.0;
    }
    if race.form_guide_url.is_some() {
        score += 20.0;
    }
    if race.origin_names().len() > 1 {
        score += 10.0;
    }
    score.min(100.0)
}
