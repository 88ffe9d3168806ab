//! Block-page detection and client-side redirect extraction.

use regex::Regex;
use std::sync::OnceLock;

/// Phrases that identify anti-automation challenge pages.
const BLOCK_SIGNALS: [&str; 13] = [
    "just a moment...",
    "attention required! | cloudflare",
    "check your browser",
    "access denied",
    "incapsula",
    "unusual traffic",
    "verify you are a human",
    "cf-chl-bypass",
    "cf-ray",
    "turn on javascript",
    "security check",
    "please wait",
    "ddos protection",
];

/// Minimum body length considered real content.
const MIN_BODY_LEN: usize = 200;

/// Whether a body is usable page content.
///
/// Bodies shorter than 200 characters, or containing a known challenge
/// phrase, are rejected so the strategy ladder escalates instead of caching
/// or returning them.
pub fn is_usable_body(body: &str) -> bool {
    if body.len() < MIN_BODY_LEN {
        return false;
    }
    let lower = body.to_lowercase();
    !BLOCK_SIGNALS.iter().any(|signal| lower.contains(signal))
}

/// Extract the target of a `<meta http-equiv="refresh">` directive, if any.
pub fn meta_refresh_target(html: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r#"(?i)http-equiv=["']?refresh["']?[^>]*content=["']?\s*\d+\s*;\s*url=([^"'>\s]+)"#)
            .expect("static regex")
    });
    re.captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn padded(content: &str) -> String {
        format!("{content}{}", "x".repeat(300))
    }

    #[test]
    fn test_short_bodies_rejected() {
        assert!(!is_usable_body(""));
        assert!(!is_usable_body("<html>tiny</html>"));
    }

    #[test]
    fn test_challenge_phrases_rejected() {
        assert!(!is_usable_body(&padded("<title>Just a moment...</title>")));
        assert!(!is_usable_body(&padded("Verify you are a human")));
        assert!(!is_usable_body(&padded("ACCESS DENIED")));
    }

    #[test]
    fn test_real_content_accepted() {
        assert!(is_usable_body(&padded("<h1>Racecards for today</h1>")));
    }

    #[test]
    fn test_meta_refresh_extraction() {
        let html = r#"<meta http-equiv="refresh" content="0; url=https://example.com/next">"#;
        assert_eq!(meta_refresh_target(html), Some("https://example.com/next"));

        let unquoted = r#"<meta http-equiv=refresh content=2;url=/relative/path>"#;
        assert_eq!(meta_refresh_target(unquoted), Some("/relative/path"));

        assert_eq!(meta_refresh_target("<html>no redirect</html>"), None);
    }
}
