// src/odds.rs

//! Odds text conversion and favorite selection.
//!
//! Origins quote odds in several textual formats ("9/4", "2.5", "EVS",
//! "SP"). Everything is folded into a single fractional decimal so records
//! from different origins can be compared uniformly.

use crate::models::Runner;

/// Sentinel for missing or unparseable odds. Sorts after every real quote.
pub const NO_ODDS: f64 = 999.0;

/// Convert an odds string to a fractional decimal.
///
/// Total over all inputs: anything unparseable maps to [`NO_ODDS`].
/// A hyphen is accepted as a slash synonym ("9-4" == "9/4").
pub fn convert_odds_to_fractional(odds_text: &str) -> f64 {
    let s = odds_text.trim().to_uppercase().replace('-', "/");
    if s.is_empty() {
        return NO_ODDS;
    }
    match s.as_str() {
        "SP" | "NR" | "VOID" | "WD" => return NO_ODDS,
        "EVS" | "EVENS" => return 1.0,
        _ => {}
    }

    if let Some((num, den)) = s.split_once('/') {
        return match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d > 0.0 => n / d,
            _ => NO_ODDS,
        };
    }

    match s.parse::<f64>() {
        Ok(dec) if dec > 1.0 => dec - 1.0,
        _ => NO_ODDS,
    }
}

/// Sort runners by ascending fractional odds (favorites first).
///
/// Runners without a quote sort last; ties keep reported order.
pub fn sort_by_odds(runners: &[Runner]) -> Vec<Runner> {
    let mut sorted: Vec<Runner> = runners.to_vec();
    sorted.sort_by(|a, b| {
        convert_odds_to_fractional(&a.odds_text)
            .partial_cmp(&convert_odds_to_fractional(&b.odds_text))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    sorted
}

/// Pick (favorite, second favorite) from a runner list by ascending odds.
///
/// Only runners with a real quote qualify; a list of SP-only runners has
/// no identifiable favorite.
pub fn favorites(runners: &[Runner]) -> (Option<Runner>, Option<Runner>) {
    let quoted: Vec<Runner> = runners
        .iter()
        .filter(|r| convert_odds_to_fractional(&r.odds_text) < NO_ODDS)
        .cloned()
        .collect();
    if quoted.is_empty() {
        return (None, None);
    }
    let sorted = sort_by_odds(&quoted);
    let second = sorted.get(1).cloned();
    let first = sorted.into_iter().next();
    (first, second)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_cases() {
        assert_eq!(convert_odds_to_fractional("SP"), 999.0);
        assert_eq!(convert_odds_to_fractional("NR"), 999.0);
        assert_eq!(convert_odds_to_fractional("VOID"), 999.0);
        assert_eq!(convert_odds_to_fractional("WD"), 999.0);
        assert_eq!(convert_odds_to_fractional("EVS"), 1.0);
        assert_eq!(convert_odds_to_fractional("evens"), 1.0);
    }

    #[test]
    fn test_fractional_forms() {
        assert_eq!(convert_odds_to_fractional("3/1"), 3.0);
        assert_eq!(convert_odds_to_fractional("9/4"), 2.25);
        assert_eq!(convert_odds_to_fractional("1/2"), 0.5);
        // Hyphen is a slash synonym
        assert_eq!(convert_odds_to_fractional("9-4"), 2.25);
    }

    #[test]
    fn test_decimal_forms() {
        assert_eq!(convert_odds_to_fractional("2.5"), 1.5);
        assert_eq!(convert_odds_to_fractional("4.0"), 3.0);
        // Decimal odds at or below 1 carry no payout information
        assert_eq!(convert_odds_to_fractional("1.0"), 999.0);
        assert_eq!(convert_odds_to_fractional("0.5"), 999.0);
    }

    #[test]
    fn test_garbage_is_sentinel() {
        assert_eq!(convert_odds_to_fractional(""), 999.0);
        assert_eq!(convert_odds_to_fractional("   "), 999.0);
        assert_eq!(convert_odds_to_fractional("garbage"), 999.0);
        assert_eq!(convert_odds_to_fractional("5/0"), 999.0);
        assert_eq!(convert_odds_to_fractional("x/y"), 999.0);
    }

    #[test]
    fn test_favorites_by_ascending_odds() {
        let runners = vec![
            Runner::new("Longshot", "20/1"),
            Runner::new("Fav", "EVS"),
            Runner::new("Second", "9/4"),
            Runner::new("NoQuote", "SP"),
        ];
        let (fav, sec) = favorites(&runners);
        assert_eq!(fav.unwrap().name, "Fav");
        assert_eq!(sec.unwrap().name, "Second");
    }

    #[test]
    fn test_favorites_empty() {
        let (fav, sec) = favorites(&[]);
        assert!(fav.is_none());
        assert!(sec.is_none());
    }

    #[test]
    fn test_sp_only_list_has_no_favorite() {
        let runners = vec![Runner::new("A", "SP"), Runner::new("B", "")];
        let (fav, sec) = favorites(&runners);
        assert!(fav.is_none());
        assert!(sec.is_none());
    }
}
