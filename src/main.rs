//! # Salam Events
//!
//! Keeps an append-only iCalendar file in sync with an events RSS feed.
//! Each run adds the events the calendar has not seen yet and leaves every
//! previously written event exactly as it was.
//!
//! ## Usage
//!
//! ```sh
//! salam_events --feed-url https://salamcenter.org/events/feed/ --ics-file salam_events.ics
//! ```
//!
//! ## Architecture
//!
//! The application follows a pipeline architecture:
//! 1. **Loading**: Read the previous calendar and collect its identity keys
//! 2. **Fetching**: Download the feed, with retries
//! 3. **Extraction**: Turn feed items into events, skipping bad ones
//! 4. **Merging**: Keep the new events, stopping at the first known one
//! 5. **Output**: Write the merged calendar and an optional JSON report
//!
//! Steps 3 and 4 are pure; everything with side effects happens here.

use chrono::Utc;
use clap::Parser;
use std::error::Error;
use tracing::{debug, error, info, instrument, warn};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod error;
mod extract;
mod fetch;
mod merge;
mod models;
mod outputs;
mod scrapers;
mod utils;

use cli::Cli;
use config::FeedConfig;
use outputs::ics::{self, CalendarMeta};
use outputs::json::{self, RunReport};

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("salam_events starting up");

    // Parse CLI and layer config
    let args = Cli::parse();
    let config = match FeedConfig::from_cli(&args) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Invalid configuration");
            return Err(e.into());
        }
    };
    debug!(?config, "Effective configuration");

    let options = config.extract_options()?;

    // ---- Load persisted calendar ----
    let existing = ics::load_calendar(&config.ics_file, options.source_offset).await?;
    let known = existing.known_events();

    // ---- Fetch and parse feed ----
    // A failed fetch stops here, before the calendar is touched.
    let body = match fetch::fetch_with_backoff(&config).await {
        Ok(body) => body,
        Err(e) => {
            error!(feed_url = %config.feed_url, error = %e, "Could not fetch feed; calendar left untouched");
            return Err(e.into());
        }
    };
    let entries = scrapers::rss::parse_feed(&body)?;
    if entries.is_empty() {
        warn!(feed_url = %config.feed_url, "Feed has no items");
    }

    // ---- Extract and merge ----
    let events: Vec<models::Event> = extract::extract(&entries, &options).collect();
    let skipped = entries.len() - events.len();
    info!(
        feed_entries = entries.len(),
        extracted = events.len(),
        skipped,
        "Extracted events from feed"
    );

    let result = merge::merge(events, &known);

    if result.added.is_empty() && existing.is_empty() {
        error!("No events found and no existing calendar");
        return Err("no events found in feed and no existing calendar to keep".into());
    }

    // ---- Calendar output ----
    let generated_at = Utc::now();
    if result.added.is_empty() {
        info!(path = %config.ics_file.display(), "No new events; calendar unchanged");
    } else {
        let meta = CalendarMeta {
            name: config.calendar_name.clone(),
        };
        let contents = ics::render_calendar(&existing, &result.added, &meta, generated_at)?;
        if let Err(e) = ics::write_calendar(&config.ics_file, &contents).await {
            error!(path = %config.ics_file.display(), error = %e, "Failed to write calendar");
            return Err(e.into());
        }
    }

    info!(
        path = %config.ics_file.display(),
        existing = result.stats.existing_count,
        added = result.stats.added_count,
        total = result.stats.total_count,
        "Calendar up to date"
    );

    // ---- Run report ----
    if let Some(report_path) = &config.report_json {
        let report = RunReport {
            generated_at,
            feed_url: config.feed_url.clone(),
            feed_entries: entries.len(),
            skipped_entries: skipped,
            stats: result.stats,
            added: result.added,
        };
        if let Err(e) = json::write_report(&report, report_path).await {
            error!(path = %report_path.display(), error = %e, "Failed to write JSON report");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );

    Ok(())
}
