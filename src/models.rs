//! Data models for feed entries, calendar events and merge results.
//!
//! This module defines the core data structures used throughout the application:
//! - [`RawEntry`]: One feed item exactly as delivered, before normalization
//! - [`Event`]: The canonical record used for identity, storage and calendar output
//! - [`IdentityKey`]: The `(normalized_title, start)` pair used to detect duplicates
//! - [`MergeResult`] / [`MergeStats`]: What a merge run produced

use chrono::{DateTime, FixedOffset, Utc};
use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A feed item as delivered by the upstream source.
///
/// All fields are kept as raw strings; interpretation happens in
/// [`crate::extract`].
///
/// # Fields
///
/// * `title` - The item title, possibly padded with whitespace or empty
/// * `published` - The RFC 2822 `pubDate` string
/// * `description` - HTML description or `content:encoded` body
/// * `link` - Canonical link to the event page
/// * `start_date`, `end_date`, `location` - Modern Events Calendar hints
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawEntry {
    pub title: String,
    pub published: Option<String>,
    pub description: Option<String>,
    pub link: Option<String>,
    /// `mec:startDate` in `YYYY-MM-DD` form.
    pub start_date: Option<String>,
    /// `mec:endDate` in `YYYY-MM-DD` form.
    pub end_date: Option<String>,
    /// `mec:location`.
    pub location: Option<String>,
}

/// A normalized calendar event.
///
/// Events are created once by the extractor (or by the calendar loader) and
/// never mutated afterwards. Two events with the same [`IdentityKey`] are the
/// same event, whatever their other fields say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Trimmed, non-empty title.
    pub title: String,
    pub start: DateTime<FixedOffset>,
    /// Always strictly after `start`.
    pub end: DateTime<FixedOffset>,
    /// Plain text, markup removed.
    pub description: String,
    pub location: Option<String>,
    pub url: Option<String>,
}

impl Event {
    /// The key used for deduplication across runs.
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(&self.title, self.start)
    }
}

/// Deduplication key: case-folded, whitespace-collapsed title plus the start instant.
///
/// The start is stored in UTC so that the same instant written with different
/// offsets still compares equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IdentityKey {
    pub title: String,
    pub start: DateTime<Utc>,
}

impl IdentityKey {
    pub fn new(title: &str, start: DateTime<FixedOffset>) -> Self {
        Self {
            title: normalize_title(title),
            start: start.with_timezone(&Utc),
        }
    }
}

/// Case-fold a title and collapse every whitespace run to a single space.
pub fn normalize_title(title: &str) -> String {
    title.split_whitespace().join(" ").to_lowercase()
}

/// Counters reported by a merge run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStats {
    /// Number of events already in the persisted set.
    pub existing_count: usize,
    /// Number of events added by this run.
    pub added_count: usize,
    /// `existing_count + added_count`.
    pub total_count: usize,
}

/// Output of [`crate::merge::merge`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeResult {
    /// New events, oldest first.
    pub added: Vec<Event>,
    pub stats: MergeStats,
}
