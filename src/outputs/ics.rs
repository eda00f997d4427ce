//! iCalendar persistence: loading the previous calendar and writing the merged one.
//!
//! The calendar file is append-only. Every `VEVENT` already in the file is
//! carried over byte-for-byte (including its line endings and any properties
//! this tool does not understand). Only the new events are generated, with the
//! `icalendar` crate.
//!
//! # Layout
//!
//! ```text
//! BEGIN:VCALENDAR
//! VERSION:2.0
//! PRODID:-//Salam Events//salam_events//EN
//! CALSCALE:GREGORIAN
//! X-WR-CALNAME:Salam Center Events
//! BEGIN:VEVENT        <- new events, newest first
//! ...
//! BEGIN:VEVENT        <- existing events, untouched
//! ...
//! END:VCALENDAR
//! ```

use crate::error::{FeedError, FeedResult};
use crate::merge::KnownEvents;
use crate::models::{Event, normalize_title};
use crate::utils::{ensure_parent_dir, short_hash};
use chrono::{DateTime, Duration, FixedOffset, TimeZone, Utc};
use icalendar::parser::{read_calendar, unfold};
use icalendar::{Calendar, CalendarDateTime, Component, DatePerhapsTime, EventLike};
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, error, info, instrument, warn};

pub const PRODID: &str = "-//Salam Events//salam_events//EN";

const CRLF: &str = "\r\n";

/// Calendar-level properties written in the header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CalendarMeta {
    /// Display name, written as `X-WR-CALNAME`.
    pub name: Option<String>,
}

/// One `VEVENT` block from the persisted file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedEvent {
    /// Exact text of the block, from `BEGIN:VEVENT` through the line ending of `END:VEVENT`.
    pub raw: String,
    /// The block as an event, when it has a title and a readable start.
    pub event: Option<Event>,
}

/// The previously written calendar.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersistedCalendar {
    blocks: Vec<PersistedEvent>,
}

impl PersistedCalendar {
    /// Split `content` into `VEVENT` blocks and parse each one.
    ///
    /// Floating and date-only times are read in `source_offset`.
    pub fn parse(content: &str, source_offset: FixedOffset) -> Self {
        let blocks = split_vevent_blocks(content)
            .into_iter()
            .map(|raw| {
                let event = parse_vevent(&raw, source_offset);
                if event.is_none() {
                    warn!(block = %raw.lines().take(3).collect::<Vec<_>>().join(" | "), "Keeping VEVENT without usable SUMMARY/DTSTART verbatim");
                }
                PersistedEvent { raw, event }
            })
            .collect();
        Self { blocks }
    }

    /// Number of `VEVENT` blocks, parsed or not.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Events whose block could be parsed.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.blocks.iter().filter_map(|b| b.event.as_ref())
    }

    /// Identity keys of the persisted events, ready for the merge engine.
    ///
    /// The persisted count covers every block, including the ones that could
    /// not be parsed, since all of them are written back.
    pub fn known_events(&self) -> KnownEvents {
        KnownEvents::from_events(self.events()).with_persisted_count(self.len())
    }
}

/// Load the calendar at `path`.
///
/// A missing file is the first-run case and yields an empty calendar. Any
/// other read error is returned, so an unreadable calendar is never replaced.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn load_calendar(path: &Path, source_offset: FixedOffset) -> FeedResult<PersistedCalendar> {
    match fs::read_to_string(path).await {
        Ok(content) => {
            let calendar = PersistedCalendar::parse(&content, source_offset);
            info!(
                blocks = calendar.len(),
                events = calendar.events().count(),
                "Loaded existing calendar"
            );
            Ok(calendar)
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            warn!("No existing calendar file; a new one will be created");
            Ok(PersistedCalendar::default())
        }
        Err(e) => Err(e.into()),
    }
}

/// Render the merged calendar: header, `added` newest first, then every existing block.
///
/// `added` is expected oldest first, as returned by the merge engine.
/// `generated_at` becomes the `DTSTAMP` of the new events, so the output is
/// deterministic for a fixed value.
///
/// # Errors
///
/// Returns [`FeedError::Serialization`] if a new event cannot be rendered.
pub fn render_calendar(
    existing: &PersistedCalendar,
    added: &[Event],
    meta: &CalendarMeta,
    generated_at: DateTime<Utc>,
) -> FeedResult<String> {
    let mut out = String::new();
    out.push_str("BEGIN:VCALENDAR\r\n");
    out.push_str("VERSION:2.0\r\n");
    let _ = write!(out, "PRODID:{PRODID}{CRLF}");
    out.push_str("CALSCALE:GREGORIAN\r\n");
    if let Some(name) = meta.name.as_deref().filter(|n| !n.trim().is_empty()) {
        let _ = write!(out, "X-WR-CALNAME:{}{CRLF}", name.trim());
    }

    for event in added.iter().rev() {
        out.push_str(&render_vevent(event, generated_at)?);
    }

    for block in &existing.blocks {
        out.push_str(&block.raw);
        if !block.raw.ends_with('\n') {
            out.push_str(CRLF);
        }
    }

    out.push_str("END:VCALENDAR\r\n");
    Ok(out)
}

/// Write `contents` to `path` through a sibling temp file and a rename.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_calendar(path: &Path, contents: &str) -> FeedResult<()> {
    ensure_parent_dir(path).await?;

    let tmp = temp_path(path);
    fs::write(&tmp, contents).await?;
    if let Err(e) = fs::rename(&tmp, path).await {
        let _ = fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    info!(bytes = contents.len(), "Wrote calendar file");
    Ok(())
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Stable UID: start instant plus a short hash of the normalized title.
pub fn event_uid(event: &Event) -> String {
    format!(
        "{}-{}@salam_events",
        utc_stamp(event.start.with_timezone(&Utc)),
        short_hash(&normalize_title(&event.title))
    )
}

fn utc_stamp(dt: DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}

fn render_vevent(event: &Event, generated_at: DateTime<Utc>) -> FeedResult<String> {
    let mut vevent = icalendar::Event::new();
    vevent.uid(&event_uid(event));
    vevent.add_property("DTSTAMP", utc_stamp(generated_at));
    vevent.summary(&event.title);
    vevent.add_property("DTSTART", utc_stamp(event.start.with_timezone(&Utc)));
    vevent.add_property("DTEND", utc_stamp(event.end.with_timezone(&Utc)));

    let mut description = event.description.trim().to_string();
    if let Some(url) = &event.url {
        if !description.is_empty() {
            description.push_str("\n\n");
        }
        let _ = write!(description, "More info: {url}");
    }
    if !description.is_empty() {
        vevent.description(&description);
    }

    if let Some(location) = &event.location {
        vevent.location(location);
    }
    if let Some(url) = &event.url {
        vevent.add_property("URL", url);
    }

    let mut calendar = Calendar::new();
    calendar.push(vevent.done());
    let rendered = calendar.done().to_string();

    split_vevent_blocks(&rendered).into_iter().next().ok_or_else(|| {
        error!(title = %event.title, "icalendar output has no VEVENT");
        FeedError::Serialization(format!("could not render VEVENT for '{}'", event.title))
    })
}

/// Cut `content` into raw `BEGIN:VEVENT`..`END:VEVENT` blocks, keeping line endings.
fn split_vevent_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Option<String> = None;

    for line in content.split_inclusive('\n') {
        let bare = line.trim_end_matches(['\r', '\n']);
        if let Some(block) = current.as_mut() {
            block.push_str(line);
            if bare == "END:VEVENT" {
                blocks.extend(current.take());
            }
        } else if bare == "BEGIN:VEVENT" {
            current = Some(line.to_string());
        }
    }

    if let Some(unterminated) = current {
        debug!(bytes = unterminated.len(), "Dropping unterminated VEVENT at end of file");
    }
    blocks
}

fn parse_vevent(raw: &str, source_offset: FixedOffset) -> Option<Event> {
    // The parser only understands CRLF; `raw` itself stays as written.
    let normalized = raw.replace("\r\n", "\n").replace('\n', CRLF);
    let mut wrapped = String::with_capacity(normalized.len() + 64);
    wrapped.push_str("BEGIN:VCALENDAR\r\n");
    wrapped.push_str(&normalized);
    if !normalized.ends_with('\n') {
        wrapped.push_str(CRLF);
    }
    wrapped.push_str("END:VCALENDAR\r\n");

    let unfolded = unfold(&wrapped);
    let calendar = read_calendar(&unfolded).ok()?;
    let vevent = calendar.components.iter().find(|c| c.name == "VEVENT")?;

    let title = unescape_text(vevent.find_prop("SUMMARY")?.val.as_ref())
        .trim()
        .to_string();
    if title.is_empty() {
        return None;
    }

    let start = to_fixed(
        DatePerhapsTime::try_from(vevent.find_prop("DTSTART")?).ok()?,
        source_offset,
    )?;
    let end = vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .and_then(|dpt| to_fixed(dpt, source_offset))
        .filter(|end| *end > start)
        .unwrap_or(start + Duration::hours(1));

    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| unescape_text(p.val.as_ref()))
        .unwrap_or_default();
    let location = vevent
        .find_prop("LOCATION")
        .map(|p| unescape_text(p.val.as_ref()))
        .filter(|l| !l.trim().is_empty());
    let url = vevent.find_prop("URL").map(|p| p.val.to_string());

    Some(Event {
        title,
        start,
        end,
        description,
        location,
        url,
    })
}

fn to_fixed(value: DatePerhapsTime, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    match value {
        DatePerhapsTime::Date(date) => date.and_hms_opt(0, 0, 0)?.and_local_timezone(offset).single(),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            CalendarDateTime::Utc(dt) => Some(dt.with_timezone(&offset)),
            CalendarDateTime::Floating(naive) => naive.and_local_timezone(offset).single(),
            CalendarDateTime::WithTimezone { date_time, tzid } => {
                match tzid.parse::<chrono_tz::Tz>() {
                    Ok(tz) => tz
                        .from_local_datetime(&date_time)
                        .earliest()
                        .map(|dt| dt.with_timezone(&offset)),
                    Err(_) => {
                        debug!(%tzid, "Unknown TZID; reading time in source offset");
                        date_time.and_local_timezone(offset).single()
                    }
                }
            }
        },
    }
}

/// Undo RFC 5545 TEXT escaping (`\\`, `\,`, `\;`, `\n`).
fn unescape_text(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') | Some('N') => out.push('\n'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}
