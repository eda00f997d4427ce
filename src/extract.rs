//! Feed extractor: turns raw feed entries into canonical [`Event`]s.
//!
//! Extraction is a pure function of its input. A bad entry never blocks the
//! rest of the feed: entries with an empty title or no usable date are skipped
//! with a warning and the iterator moves on.
//!
//! # Timestamp resolution
//!
//! 1. The RFC 2822 `pubDate` (`Thu, 25 Dec 2025 17:00:00 -0800`), shifted
//!    to the configured source offset.
//! 2. Failing that, the `mec:startDate` hint (`2026-01-09`) at
//!    [`ExtractOptions::all_day_start`].
//!
//! The end is the `mec:endDate` hint at [`ExtractOptions::all_day_end`] when it
//! lands after the start, otherwise `start + default_duration`.

use crate::error::ExtractError;
use crate::models::{Event, RawEntry};
use crate::utils::{extract_location, strip_html, truncate_for_log};
use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveTime};
use tracing::{debug, warn};
use url::Url;

/// Fallback event length, in minutes, when neither the feed nor the configuration gives a usable one.
pub const DEFAULT_DURATION_MINUTES: i64 = 60;

/// Knobs for turning feed timestamps into event times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtractOptions {
    /// Offset every start/end is expressed in.
    pub source_offset: FixedOffset,
    /// Length given to events whose source has no end time.
    pub default_duration: Duration,
    /// Time of day used with a date-only start hint.
    pub all_day_start: NaiveTime,
    /// Time of day used with a date-only end hint.
    pub all_day_end: NaiveTime,
}

impl ExtractOptions {
    pub fn new(source_offset: FixedOffset, default_duration: Duration) -> Self {
        Self {
            source_offset,
            default_duration,
            ..Self::default()
        }
    }
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            source_offset: FixedOffset::west_opt(8 * 3600).unwrap(),
            default_duration: Duration::minutes(DEFAULT_DURATION_MINUTES),
            all_day_start: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            all_day_end: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
        }
    }
}

/// Lazily extract events from `entries`, skipping the ones that fail.
///
/// The returned iterator holds no state beyond its input, so calling this
/// again on the same entries yields the same events.
pub fn extract<'a, I>(entries: I, options: &'a ExtractOptions) -> impl Iterator<Item = Event> + 'a
where
    I: IntoIterator<Item = &'a RawEntry>,
    I::IntoIter: 'a,
{
    entries
        .into_iter()
        .filter_map(move |entry| match extract_entry(entry, options) {
            Ok(event) => Some(event),
            Err(e) => {
                warn!(
                    error = %e,
                    title = %truncate_for_log(entry.title.trim(), 80),
                    "Skipping feed entry"
                );
                None
            }
        })
}

/// Normalize one feed entry.
///
/// # Errors
///
/// - [`ExtractError::MalformedEntry`] when the trimmed title is empty
/// - [`ExtractError::UnparseableTimestamp`] when no start time can be derived
pub fn extract_entry(entry: &RawEntry, options: &ExtractOptions) -> Result<Event, ExtractError> {
    let title = entry.title.trim();
    if title.is_empty() {
        return Err(ExtractError::MalformedEntry);
    }

    let start = resolve_start(entry, options).ok_or_else(|| ExtractError::UnparseableTimestamp {
        title: title.to_string(),
        raw: entry.published.clone().or_else(|| entry.start_date.clone()),
    })?;
    let end = resolve_end(entry, start, options);

    let description = entry
        .description
        .as_deref()
        .map(strip_html)
        .unwrap_or_default();

    let location = entry
        .location
        .as_deref()
        .map(strip_html)
        .filter(|loc| !loc.is_empty())
        .or_else(|| extract_location(&description));

    let url = entry
        .link
        .as_deref()
        .map(str::trim)
        .filter(|link| !link.is_empty())
        .and_then(|link| match Url::parse(link) {
            Ok(url) => Some(url.to_string()),
            Err(e) => {
                debug!(%link, error = %e, "Dropping unparseable link");
                None
            }
        });

    Ok(Event {
        title: title.to_string(),
        start,
        end,
        description,
        location,
        url,
    })
}

fn resolve_start(entry: &RawEntry, options: &ExtractOptions) -> Option<DateTime<FixedOffset>> {
    if let Some(raw) = entry.published.as_deref() {
        match DateTime::parse_from_rfc2822(raw.trim()) {
            Ok(dt) => return Some(dt.with_timezone(&options.source_offset)),
            Err(e) => debug!(raw, error = %e, "pubDate is not RFC 2822"),
        }
    }

    entry
        .start_date
        .as_deref()
        .and_then(|raw| at_time_of_day(raw, options.all_day_start, options.source_offset))
}

fn resolve_end(
    entry: &RawEntry,
    start: DateTime<FixedOffset>,
    options: &ExtractOptions,
) -> DateTime<FixedOffset> {
    let provided = entry
        .end_date
        .as_deref()
        .and_then(|raw| at_time_of_day(raw, options.all_day_end, options.source_offset));

    match provided {
        Some(end) if end > start => end,
        Some(end) => {
            debug!(%start, %end, "End hint is not after start; using default duration");
            start + default_duration(options)
        }
        None => start + default_duration(options),
    }
}

fn default_duration(options: &ExtractOptions) -> Duration {
    if options.default_duration > Duration::zero() {
        options.default_duration
    } else {
        Duration::minutes(DEFAULT_DURATION_MINUTES)
    }
}

fn at_time_of_day(
    raw: &str,
    time: NaiveTime,
    offset: FixedOffset,
) -> Option<DateTime<FixedOffset>> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .ok()?
        .and_time(time)
        .and_local_timezone(offset)
        .single()
}
