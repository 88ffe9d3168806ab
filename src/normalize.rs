// src/normalize.rs

//! Course-name normalization, race fingerprints and time parsing.
//!
//! Independent origins spell the same venue differently ("Ascot",
//! "ascot (GB)", "Ascot Racecourse"). Normalization strips the noise so
//! records can be matched by key equality.

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

/// Venue-type suffix words folded to nothing during normalization.
const VENUE_SUFFIX_WORDS: [&str; 7] = [
    "racecourse",
    "greyhound",
    "raceway",
    "stadium",
    "harness",
    "track",
    "park",
];

fn parenthetical_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s*\([^)]*\)").expect("static regex"))
}

/// Normalize a course name for comparison: lowercase, parentheticals
/// stripped, venue-type suffix words removed, whitespace collapsed.
pub fn normalize_course_name(name: &str) -> String {
    if name.trim().is_empty() {
        return String::new();
    }
    let mut normalized = parenthetical_re()
        .replace_all(&name.trim().to_lowercase(), "")
        .into_owned();
    for word in VENUE_SUFFIX_WORDS {
        normalized = normalized.replace(word, "");
    }
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Loose normalization for enrichment lookups: parentheticals stripped,
/// hyphens treated as spaces, whitespace collapsed. Suffix words are kept
/// since the feed uses full venue names.
pub fn normalize_course_loose(name: &str) -> String {
    parenthetical_re()
        .replace_all(&name.trim().to_lowercase(), "")
        .replace('-', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Deterministic race fingerprint from course, date and time.
///
/// Stable across origins: the course is normalized and only the digits of
/// the time contribute, so "14:30" and "1430" collapse to the same id.
pub fn race_fingerprint(course: &str, date: &str, time: &str) -> String {
    let digits: String = time.chars().filter(|c| c.is_ascii_digit()).collect();
    let key = format!("{}|{}|{}", normalize_course_name(course), date, digits);
    let digest = Sha256::digest(key.as_bytes());
    hex::encode(digest)[..12].to_string()
}

/// Extract an "HH:MM" time from free text, honoring an AM/PM suffix.
pub fn parse_local_hhmm(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"\b(\d{1,2}):(\d{2})\s*([AaPp][Mm])?\b").expect("static regex")
    });

    let caps = re.captures(text)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute = caps.get(2)?.as_str();

    match caps.get(3).map(|m| m.as_str().to_uppercase()) {
        Some(ap) if ap == "PM" && hour != 12 => hour += 12,
        Some(ap) if ap == "AM" && hour == 12 => hour = 0,
        _ => {}
    }
    if hour > 23 {
        return None;
    }
    Some(format!("{hour:02}:{minute}"))
}

/// Floor an "HH:MM" time to its 5-minute bucket. Unparseable times are
/// returned unchanged so they still participate in key comparison.
pub fn bucket_hhmm(time: &str) -> String {
    let Some((h, m)) = time.split_once(':') else {
        return time.to_string();
    };
    match (h.parse::<u32>(), m.parse::<u32>()) {
        (Ok(hour), Ok(minute)) if hour < 24 && minute < 60 => {
            format!("{hour:02}:{:02}", (minute / 5) * 5)
        }
        _ => time.to_string(),
    }
}
