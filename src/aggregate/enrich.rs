//! Form-guide link enrichment.
//!
//! An optional JSON feed lists form-guide documents per venue and day.
//! After dedup, each race is looked up by loosely-normalized venue name and
//! calendar date; a hit attaches the link and a "form" attribution entry.
//! Enrichment is strictly best-effort: any failure is logged at debug and
//! the run continues without links.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde_json::Value;

use crate::fetch::Fetcher;
use crate::models::{EnrichConfig, RaceMeeting};
use crate::normalize::normalize_course_loose;

/// Form-guide links keyed by (loose venue name, "YYYY-MM-DD").
type LinkIndex = HashMap<(String, String), String>;

pub struct FormGuideEnricher {
    config: EnrichConfig,
}

impl FormGuideEnricher {
    pub fn new(config: EnrichConfig) -> Self {
        Self { config }
    }

    /// Fetch the feed and attach links to matching races in place.
    pub async fn enrich(&self, fetcher: &Fetcher, races: &mut [RaceMeeting]) {
        let Some(feed_url) = &self.config.feed_url else {
            return;
        };
        let Some(body) = fetcher.fetch(feed_url, false).await else {
            log::debug!("Form-guide feed unavailable: {feed_url}");
            return;
        };
        let Some(index) = build_index(&body) else {
            log::debug!("Form-guide feed did not parse: {feed_url}");
            return;
        };

        let attached = apply_links(&index, races, &self.config.origin_name);
        log::info!("Form-guide links attached to {attached} of {} races", races.len());
    }
}

fn feed_date_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/(\d{4}-\d{2}-\d{2})").expect("static regex"))
}

/// Build the lookup index from the raw feed body.
///
/// Feed shape: an array of disciplines, each with `Countries`, each with
/// `Meetings` carrying `Course` plus `PDFUrl` and/or `PreMeetingUrl`; the
/// document date rides inside the URL path. Malformed entries are skipped.
pub fn build_index(body: &str) -> Option<LinkIndex> {
    let root: Value = serde_json::from_str(body).ok()?;
    let mut index = LinkIndex::new();

    for discipline in root.as_array()? {
        let countries = discipline.get("Countries").and_then(Value::as_array);
        for country in countries.into_iter().flatten() {
            let meetings = country.get("Meetings").and_then(Value::as_array);
            for meeting in meetings.into_iter().flatten() {
                let Some(course) = meeting.get("Course").and_then(Value::as_str) else {
                    continue;
                };
                let link = ["PDFUrl", "PreMeetingUrl"]
                    .iter()
                    .find_map(|k| meeting.get(*k).and_then(Value::as_str))
                    .filter(|s| !s.is_empty());
                let Some(link) = link else { continue };
                let Some(date) = feed_date_re()
                    .captures(link)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().to_string())
                else {
                    continue;
                };
                index.insert((normalize_course_loose(course), date), link.to_string());
            }
        }
    }
    Some(index)
}

/// Attach links from the index to matching races. Returns the hit count.
pub fn apply_links(index: &LinkIndex, races: &mut [RaceMeeting], origin_name: &str) -> usize {
    let mut attached = 0;
    for race in races.iter_mut() {
        if race.form_guide_url.is_some() {
            continue;
        }
        let key = (
            normalize_course_loose(&race.course),
            race.utc_datetime.format("%Y-%m-%d").to_string(),
        );
        if let Some(link) = index.get(&key) {
            race.form_guide_url = Some(link.clone());
            race.data_sources
                .insert("form".to_string(), origin_name.to_string());
            attached += 1;
        }
    }
    attached
}
