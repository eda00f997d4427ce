//! Utility functions for text cleanup, offset parsing, hashing and file system checks.
//!
//! This module provides helper functions used throughout the application:
//! - HTML to plain text conversion for feed descriptions
//! - Heuristic location extraction from descriptions
//! - String truncation for logging
//! - Fixed UTC offset parsing for configuration
//! - Short content hashes for calendar UIDs
//! - File system preparation for output files

use chrono::FixedOffset;
use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::node::Node;
use scraper::{ElementRef, Html};
use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::fs;
use tracing::{debug, instrument};

static LOCATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blocation\s*:\s*([^\n]+)").expect("valid location regex"));

static OFFSET_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([+-])(\d{2}):?(\d{2})$").expect("valid offset regex"));

/// Elements rendered on their own line.
const BLOCK_TAGS: &[&str] = &[
    "p", "div", "li", "ul", "ol", "h1", "h2", "h3", "h4", "h5", "h6", "tr", "table", "section",
    "article", "header", "footer", "blockquote", "pre",
];

/// Elements whose content is never text.
const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "template"];

/// Convert an HTML fragment to plain text.
///
/// Markup is parsed with html5ever through `scraper`, so broken markup still
/// yields its text content and entities are decoded. Block elements and `<br>`
/// become line breaks, whitespace runs inside a line collapse to one space and
/// blank lines are removed. Never fails.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(strip_html("<p>Hello <b>world</b></p>"), "Hello world");
/// ```
pub fn strip_html(html: &str) -> String {
    if html.trim().is_empty() {
        return String::new();
    }

    let fragment = Html::parse_fragment(html);
    let mut text = String::with_capacity(html.len());
    collect_text(fragment.root_element(), &mut text);

    text.lines()
        .map(|line| line.split_whitespace().join(" "))
        .filter(|line| !line.is_empty())
        .join("\n")
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(el) => {
                let name = el.name();
                if name == "br" {
                    out.push('\n');
                    continue;
                }
                if SKIPPED_TAGS.contains(&name) {
                    continue;
                }
                let block = BLOCK_TAGS.contains(&name);
                if block {
                    out.push('\n');
                }
                if let Some(child_el) = ElementRef::wrap(child) {
                    collect_text(child_el, out);
                }
                if block {
                    out.push('\n');
                }
            }
            _ => {}
        }
    }
}

/// Find the text following a `Location:` marker, up to the end of its line.
///
/// Returns `None` when no marker is present or nothing follows it.
pub fn extract_location(description: &str) -> Option<String> {
    LOCATION_RE
        .captures(description)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|loc| !loc.is_empty())
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut at a character boundary no later than `max` bytes and
/// suffixed with `"…(+N bytes)"`.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Parse a fixed UTC offset such as `-08:00`, `+0530` or `Z`.
pub fn parse_utc_offset(raw: &str) -> Option<FixedOffset> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("z") || raw.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0);
    }

    let caps = OFFSET_RE.captures(raw)?;
    let hours: i32 = caps[2].parse().ok()?;
    let minutes: i32 = caps[3].parse().ok()?;
    if hours > 23 || minutes > 59 {
        return None;
    }
    let seconds = hours * 3600 + minutes * 60;
    if &caps[1] == "-" {
        FixedOffset::west_opt(seconds)
    } else {
        FixedOffset::east_opt(seconds)
    }
}

/// First eight hex digits of the SHA-256 of `input`.
pub fn short_hash(input: &str) -> String {
    let digest = Sha256::digest(input.as_bytes());
    digest.iter().take(4).map(|b| format!("{b:02x}")).collect()
}

/// Ensure the parent directory of `path` exists.
#[instrument(level = "debug", skip_all, fields(path = %path.display()))]
pub async fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).await?;
            debug!(parent = %parent.display(), "Parent directory ready");
            Ok(())
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_html_removes_markup() {
        let html = "<p>This is <b>bold</b> text with <a href='#'>link</a></p>";
        let result = strip_html(html);
        assert_eq!(result, "This is bold text with link");
        assert!(!result.contains('<'));
        assert!(!result.contains('>'));
    }

    #[test]
    fn test_strip_html_decodes_entities() {
        assert_eq!(
            strip_html("Tea &amp; Talk&nbsp;&lt;open&gt; &quot;all&quot; &#39;welcome&#39;"),
            "Tea & Talk <open> \"all\" 'welcome'"
        );
    }

    #[test]
    fn test_strip_html_block_elements_become_lines() {
        let html = "<p>Join us   for dinner.</p><p>Location: Main Hall<br>Davis, CA</p>";
        assert_eq!(
            strip_html(html),
            "Join us for dinner.\nLocation: Main Hall\nDavis, CA"
        );
    }

    #[test]
    fn test_strip_html_drops_scripts_and_blank_lines() {
        let html = "<div>\n\n<script>alert('x')</script>Hello</div>\n\n<div>   </div><p>World</p>";
        assert_eq!(strip_html(html), "Hello\nWorld");
    }

    #[test]
    fn test_strip_html_broken_markup_degrades() {
        let result = strip_html("<p>Unclosed <b>tags <i>everywhere");
        assert_eq!(result, "Unclosed tags everywhere");
        assert_eq!(strip_html("plain text"), "plain text");
        assert_eq!(strip_html("   "), "");
    }

    #[test]
    fn test_extract_location() {
        assert_eq!(
            extract_location("Dinner\nLocation: Salam Center, 501 Oak Ave\nBring a dish"),
            Some("Salam Center, 501 Oak Ave".to_string())
        );
        assert_eq!(
            extract_location("LOCATION :  Library"),
            Some("Library".to_string())
        );
        assert_eq!(extract_location("Our new location is great"), None);
        assert_eq!(extract_location("Location:   "), None);
        assert_eq!(extract_location(""), None);
    }

    #[test]
    fn test_truncate_for_log_short_string() {
        let s = "Hello, world!";
        assert_eq!(truncate_for_log(s, 100), "Hello, world!");
    }

    #[test]
    fn test_truncate_for_log_long_string() {
        let s = "a".repeat(500);
        let result = truncate_for_log(&s, 100);
        assert!(result.starts_with(&"a".repeat(100)));
        assert!(result.contains("…(+400 bytes)"));
    }

    #[test]
    fn test_truncate_for_log_respects_char_boundaries() {
        let s = "ééééé";
        let result = truncate_for_log(s, 3);
        assert!(result.starts_with('é'));
        assert!(result.contains("…(+8 bytes)"));
    }

    #[test]
    fn test_parse_utc_offset() {
        assert_eq!(parse_utc_offset("-08:00"), FixedOffset::west_opt(8 * 3600));
        assert_eq!(parse_utc_offset("+0530"), FixedOffset::east_opt(5 * 3600 + 1800));
        assert_eq!(parse_utc_offset("Z"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("UTC"), FixedOffset::east_opt(0));
        assert_eq!(parse_utc_offset("8"), None);
        assert_eq!(parse_utc_offset("+25:00"), None);
        assert_eq!(parse_utc_offset("America/Los_Angeles"), None);
    }

    #[test]
    fn test_short_hash_is_stable() {
        let a = short_hash("community dinner");
        assert_eq!(a.len(), 8);
        assert_eq!(a, short_hash("community dinner"));
        assert_ne!(a, short_hash("community lunch"));
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[tokio::test]
    async fn test_ensure_parent_dir_creates_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("nested/deeper/calendar.ics");
        ensure_parent_dir(&target).await.unwrap();
        assert!(dir.path().join("nested/deeper").is_dir());

        ensure_parent_dir(Path::new("calendar.ics")).await.unwrap();
    }
}
