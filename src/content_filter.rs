//! Stateless chat-text sanitizer. A pure function of `(text, config)`,
//! applied in front of `RoomManager::append_message` the same way the
//! rest of this codebase keeps classifiers free of server state.

use crate::config::ContentFilterConfig;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HIGH_SEVERITY: Regex =
        Regex::new(r"(?i)\b(fuck|shit|cunt|nigger|faggot)\b").unwrap();
    static ref MEDIUM_SEVERITY: Regex =
        Regex::new(r"(?i)\b(damn|hell|ass|bitch|crap|idiot)\b").unwrap();
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref LINK: Regex = Regex::new(r"(?i)(https?://\S+|www\.\S+)").unwrap();
    static ref EMAIL: Regex = Regex::new(r"(?i)[\w.+-]+@[\w-]+\.[\w.-]+").unwrap();
    static ref PHONE: Regex = Regex::new(r"\b\d{3}-\d{3}-\d{4}\b").unwrap();
}

/// Runs the full pipeline and reports whether anything was actually
/// redacted, so callers can bump the content-filter-hit metric.
pub fn filter(text: &str, config: &ContentFilterConfig) -> (String, bool) {
    if !config.enabled {
        return (truncate(text, 10_000), false);
    }

    let mut hit = false;
    let mut out = text.to_string();

    if HIGH_SEVERITY.is_match(&out) {
        hit = true;
        out = HIGH_SEVERITY.replace_all(&out, "[REMOVED]").into_owned();
    }

    if config.strict && MEDIUM_SEVERITY.is_match(&out) {
        hit = true;
        out = MEDIUM_SEVERITY
            .replace_all(&out, |caps: &regex::Captures| "*".repeat(caps[0].len()))
            .into_owned();
    }

    out = WHITESPACE.replace_all(&out, " ").trim().to_string();

    if LINK.is_match(&out) {
        hit = true;
        out = LINK.replace_all(&out, "[LINK REMOVED]").into_owned();
    }
    if EMAIL.is_match(&out) {
        hit = true;
        out = EMAIL.replace_all(&out, "[EMAIL REMOVED]").into_owned();
    }
    if PHONE.is_match(&out) {
        hit = true;
        out = PHONE.replace_all(&out, "[PHONE REMOVED]").into_owned();
    }

    (out, hit)
}

fn truncate(text: &str, max_len: usize) -> String {
    if text.chars().count() <= max_len {
        text.to_string()
    } else {
        text.chars().take(max_len).collect()
    }
}

/// Applies the filter and enforces `max_message_length` on the result,
/// as the spec's pipeline requires truncation to happen last.
pub fn filter_and_truncate(
    text: &str,
    filter_config: &ContentFilterConfig,
    max_message_length: usize,
) -> (String, bool) {
    let (filtered, hit) = filter(text, filter_config);
    (truncate(&filtered, max_message_length), hit)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(strict: bool) -> ContentFilterConfig {
        ContentFilterConfig {
            enabled: true,
            strict,
        }
    }

    #[test]
    fn redacts_high_severity_tokens() {
        let (out, hit) = filter("that is fucking great", &config(false));
        assert!(hit);
        assert!(out.contains("[REMOVED]"));
    }

    #[test]
    fn masks_medium_severity_only_in_strict_mode() {
        let (out, hit) = filter("damn that's cool", &config(false));
        assert!(!hit);
        assert_eq!(out, "damn that's cool");

        let (out, hit) = filter("damn that's cool", &config(true));
        assert!(hit);
        assert!(out.starts_with("****"));
    }

    #[test]
    fn redacts_links_emails_and_phones() {
        let (out, hit) = filter(
            "reach me at jane@example.com or http://example.com or 555-123-4567",
            &config(false),
        );
        assert!(hit);
        assert!(out.contains("[EMAIL REMOVED]"));
        assert!(out.contains("[LINK REMOVED]"));
        assert!(out.contains("[PHONE REMOVED]"));
    }

    #[test]
    fn collapses_whitespace_and_truncates() {
        let (out, _) = filter_and_truncate("a   b    c", &config(false), 100);
        assert_eq!(out, "a b c");

        let long = "x".repeat(50);
        let (out, _) = filter_and_truncate(&long, &config(false), 10);
        assert_eq!(out.chars().count(), 10);
    }

    #[test]
    fn disabled_filter_only_truncates() {
        let config = ContentFilterConfig {
            enabled: false,
            strict: false,
        };
        let (out, hit) = filter("fuck this http://x.com", &config);
        assert!(!hit);
        assert_eq!(out, "fuck this http://x.com");
    }
}
