//! Command-line interface definitions for Salam Events.
//!
//! This module defines the CLI arguments and options using the `clap` crate.
//! Most options can also come from environment variables or a YAML config
//! file; flags given here win over both (see [`crate::config`]).

use clap::Parser;
use std::path::PathBuf;

/// Command-line arguments for the Salam Events calendar builder.
///
/// Every option is optional so that values missing from the command line
/// can fall back to the config file and then to built-in defaults.
///
/// # Examples
///
/// ```sh
/// # Defaults: Salam Center feed, ./salam_events.ics
/// salam_events
///
/// # Another feed and output file
/// salam_events --feed-url https://example.org/events/feed/ --ics-file public/events.ics
///
/// # Settings from a file, plus a JSON run report
/// salam_events --config salam_events.yaml --report-json reports/last_run.json
/// ```
#[derive(Parser, Debug, Default)]
#[command(author, version, about)]
pub struct Cli {
    /// Optional path to a YAML config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// RSS feed to read events from
    #[arg(short, long, env = "FEED_URL")]
    pub feed_url: Option<String>,

    /// Calendar file to merge new events into
    #[arg(short, long, env = "ICS_FILE")]
    pub ics_file: Option<PathBuf>,

    /// Fixed UTC offset of the event source, e.g. -08:00
    #[arg(long, env = "SOURCE_UTC_OFFSET", allow_hyphen_values = true)]
    pub utc_offset: Option<String>,

    /// Length of events whose feed entry has no end time
    #[arg(long)]
    pub default_duration_minutes: Option<i64>,

    /// Calendar display name (X-WR-CALNAME)
    #[arg(long)]
    pub calendar_name: Option<String>,

    /// User-Agent header sent to the feed server
    #[arg(long)]
    pub user_agent: Option<String>,

    /// HTTP timeout in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Retries after a failed fetch
    #[arg(long)]
    pub max_retries: Option<usize>,

    /// Write a JSON summary of the run to this path
    #[arg(long)]
    pub report_json: Option<PathBuf>,
}
