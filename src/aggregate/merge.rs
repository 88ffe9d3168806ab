//! Cross-origin dedup and merge.
//!
//! Independent origins report the same physical race with different venue
//! spellings and post times that drift by a minute or two. Records are
//! grouped by a tolerant key and merged pairwise, richer record first, so
//! one canonical record per race survives.

use std::collections::HashMap;

use chrono::NaiveDate;

use crate::models::RaceMeeting;
use crate::normalize::{bucket_hhmm, normalize_course_name};
use crate::odds;

/// Grouping key for records describing the same physical race.
///
/// The time component is floored to a 5-minute bucket, absorbing small
/// post-time disagreements between origins.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MergeKey {
    course: String,
    date: NaiveDate,
    time_bucket: String,
}

impl MergeKey {
    pub fn of(meeting: &RaceMeeting) -> Self {
        Self {
            course: normalize_course_name(&meeting.course),
            date: meeting.utc_datetime.date_naive(),
            time_bucket: bucket_hhmm(&meeting.race_time),
        }
    }
}

/// How much usable data a record carries: 2 with any odds quote, 1 with a
/// known field size, 0 otherwise.
fn richness(meeting: &RaceMeeting) -> u8 {
    if meeting.favorite.is_some() || meeting.runners.iter().any(|r| r.has_odds()) {
        2
    } else if meeting.field_size > 0 {
        1
    } else {
        0
    }
}

/// Pick which of two same-keyed records drives the merge. Richness wins;
/// ties fall to the lexicographically smallest attributed origin name and
/// then the smaller fingerprint, so the outcome never depends on arrival
/// order.
fn primary_first(a: RaceMeeting, b: RaceMeeting) -> (RaceMeeting, RaceMeeting) {
    let (ra, rb) = (richness(&a), richness(&b));
    if ra != rb {
        return if ra > rb { (a, b) } else { (b, a) };
    }

    let min_origin = |m: &RaceMeeting| m.origin_names().first().map(|s| s.to_string());
    let key_a = (min_origin(&a), a.id.clone());
    let key_b = (min_origin(&b), b.id.clone());
    if key_a <= key_b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Merge two records for the same race into one.
fn merge_pair(primary: RaceMeeting, secondary: RaceMeeting) -> RaceMeeting {
    let mut merged = primary;

    if merged.course.trim().is_empty() {
        merged.course = secondary.course;
    }
    if merged.race_url.trim().is_empty() {
        merged.race_url = secondary.race_url;
    }
    if merged.timezone_name.trim().is_empty() {
        merged.timezone_name = secondary.timezone_name;
    }
    if merged.country.trim().is_empty() {
        merged.country = secondary.country;
    }

    merged.field_size = merged.field_size.max(secondary.field_size);
    merged.race_number = merged.race_number.or(secondary.race_number);
    merged.grade = merged.grade.or(secondary.grade);
    merged.distance = merged.distance.or(secondary.distance);
    merged.surface = merged.surface.or(secondary.surface);
    merged.form_guide_url = merged.form_guide_url.or(secondary.form_guide_url);

    // Keep the fuller runner list; the primary's market stands when it has
    // one, otherwise it is recomputed from that list
    if secondary.runners.len() > merged.runners.len() {
        merged.runners = secondary.runners;
    }
    if merged.favorite.is_none() || merged.second_favorite.is_none() {
        let (fav, second_fav) = odds::favorites(&merged.runners);
        merged.favorite = merged.favorite.or(fav);
        merged.second_favorite = merged.second_favorite.or(second_fav);
    }

    // Attribution: union of both maps. The primary wins a contested role,
    // but the displaced origin stays visible under an origin-qualified key
    // so no contributor is lost.
    let mut sources = std::mem::take(&mut merged.data_sources);
    for (role, origin) in secondary.data_sources {
        match sources.get(&role).cloned() {
            None => {
                sources.insert(role, origin);
            }
            Some(existing) if existing == origin => {}
            Some(_) => {
                sources.insert(format!("{role}@{origin}"), origin);
            }
        }
    }
    merged.data_sources = sources;

    // Scores are assigned after merging, never carried through it
    merged.value_score = 0.0;
    merged
}

/// Collapse a batch of records to one per merge key. Singleton keys pass
/// through untouched; order of the input does not affect the result set.
pub fn dedupe_merge(records: Vec<RaceMeeting>) -> Vec<RaceMeeting> {
    let mut by_key: HashMap<MergeKey, RaceMeeting> = HashMap::new();
    for record in records {
        let key = MergeKey::of(&record);
        match by_key.remove(&key) {
            Some(existing) => {
                let (primary, secondary) = primary_first(existing, record);
                by_key.insert(key, merge_pair(primary, secondary));
            }
            None => {
                by_key.insert(key, record);
            }
        }
    }
    by_key.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Discipline, Runner};
    use std::collections::BTreeMap;

    fn meeting(course: &str, time: &str, origin: &str) -> RaceMeeting {
        RaceMeeting {
            id: crate::normalize::race_fingerprint(course, "2024-05-01", time),
            course: course.to_string(),
            race_time: time.to_string(),
            utc_datetime: format!("2024-05-01T{time}:00Z").parse().unwrap(),
            local_time: time.to_string(),
            timezone_name: "Europe/London".to_string(),
            field_size: 0,
            country: "GB".to_string(),
            discipline: Discipline::Thoroughbred,
            race_number: None,
            grade: None,
            distance: None,
            surface: None,
            favorite: None,
            second_favorite: None,
            runners: Vec::new(),
            race_url: format!("https://{}.example.com/card", origin.to_lowercase()),
            form_guide_url: None,
            value_score: 0.0,
            data_sources: BTreeMap::from([("course".to_string(), origin.to_string())]),
        }
    }

    #[test]
    fn test_nearby_times_share_a_key() {
        let a = meeting("Ascot", "14:02", "SkySports");
        let b = meeting("ascot (GB)", "14:04", "ATR");
        assert_eq!(MergeKey::of(&a), MergeKey::of(&b));

        let c = meeting("Ascot", "14:06", "ATR");
        assert_ne!(MergeKey::of(&a), MergeKey::of(&c));
    }

    #[test]
    fn test_richer_record_drives_the_merge() {
        // SkySports knows the field, ATR knows the odds
        let mut sky = meeting("Ascot", "14:02", "SkySports");
        sky.field_size = 8;
        sky.grade = Some("Class 2".to_string());

        let mut atr = meeting("ascot (GB)", "14:04", "ATR");
        atr.runners = vec![Runner::new("Alpha", "9/4"), Runner::new("Beta", "3/1")];
        atr.field_size = 2;

        let merged = dedupe_merge(vec![sky, atr]);
        assert_eq!(merged.len(), 1);

        let race = &merged[0];
        // ATR is richer (it has odds), so its identity fields win
        assert_eq!(race.course, "ascot (GB)");
        assert_eq!(race.field_size, 8, "field size is the max of both");
        assert_eq!(race.grade.as_deref(), Some("Class 2"));
        assert_eq!(race.favorite.as_ref().unwrap().name, "Alpha");
        assert_eq!(race.second_favorite.as_ref().unwrap().name, "Beta");
        assert_eq!(race.origin_names(), vec!["ATR", "SkySports"]);
    }

    #[test]
    fn test_merge_is_order_independent() {
        let mut sky = meeting("Ascot", "14:02", "SkySports");
        sky.field_size = 8;
        let mut atr = meeting("Ascot", "14:04", "ATR");
        atr.runners = vec![Runner::new("Alpha", "9/4")];
        let gh = meeting("Ascot", "14:03", "Timeform");

        let forward = dedupe_merge(vec![sky.clone(), atr.clone(), gh.clone()]);
        let backward = dedupe_merge(vec![gh, atr, sky]);

        assert_eq!(forward.len(), 1);
        assert_eq!(backward.len(), 1);
        assert_eq!(forward[0].course, backward[0].course);
        assert_eq!(forward[0].id, backward[0].id);
        assert_eq!(forward[0].field_size, backward[0].field_size);
        assert_eq!(forward[0].data_sources, backward[0].data_sources);
    }

    #[test]
    fn test_equal_richness_tie_break_is_deterministic() {
        // Neither record has odds or a field size; the smaller origin name
        // must win regardless of input order.
        let a = meeting("Ascot", "14:00", "Zeta");
        let b = meeting("Ascot", "14:01", "Alpha");

        let one = dedupe_merge(vec![a.clone(), b.clone()]);
        let two = dedupe_merge(vec![b, a]);
        assert_eq!(one[0].race_url, "https://alpha.example.com/card");
        assert_eq!(one[0].race_url, two[0].race_url);
    }

    #[test]
    fn test_dedup_is_idempotent() {
        let mut sky = meeting("Ascot", "14:02", "SkySports");
        sky.field_size = 8;
        let mut atr = meeting("Ascot", "14:04", "ATR");
        atr.runners = vec![Runner::new("Alpha", "9/4")];

        let once = dedupe_merge(vec![sky, atr]);
        let twice = dedupe_merge(once.clone());
        assert_eq!(once.len(), twice.len());
        assert_eq!(once[0].id, twice[0].id);
        assert_eq!(once[0].data_sources, twice[0].data_sources);
    }

    #[test]
    fn test_role_collision_keeps_every_origin() {
        // All three origins attribute the same role; the two displaced ones
        // must still be visible after the fold.
        let a = meeting("Ascot", "14:00", "SkySports");
        let mut b = meeting("Ascot", "14:01", "ATR");
        b.runners = vec![Runner::new("Alpha", "9/4")];
        let c = meeting("Ascot", "14:02", "Timeform");

        let merged = dedupe_merge(vec![a, b, c]);
        assert_eq!(merged.len(), 1);
        assert_eq!(
            merged[0].origin_names(),
            vec!["ATR", "SkySports", "Timeform"]
        );
        // The winning origin still owns the role itself
        assert_eq!(
            merged[0].data_sources.get("course").map(String::as_str),
            Some("ATR")
        );
    }

    #[test]
    fn test_distinct_races_pass_through() {
        let a = meeting("Ascot", "14:00", "SkySports");
        let b = meeting("Kempton", "14:00", "SkySports");
        assert_eq!(dedupe_merge(vec![a, b]).len(), 2);
    }
}
