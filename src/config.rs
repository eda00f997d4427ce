//! Run configuration.
//!
//! Settings are layered: built-in defaults, then an optional YAML file, then
//! whatever was passed on the command line (or through the matching
//! environment variables). The result is validated once, before any I/O.
//!
//! ```yaml
//! feed_url: https://salamcenter.org/events/feed/
//! ics_file: public/salam_events.ics
//! utc_offset: "-08:00"
//! default_duration_minutes: 60
//! calendar_name: Salam Center Events
//! ```

use crate::cli::Cli;
use crate::error::{FeedError, FeedResult};
use crate::extract::{DEFAULT_DURATION_MINUTES, ExtractOptions};
use crate::utils::parse_utc_offset;
use chrono::{Duration, FixedOffset};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, instrument};
use url::Url;

pub const DEFAULT_FEED_URL: &str = "https://salamcenter.org/events/feed/";
pub const DEFAULT_ICS_FILE: &str = "salam_events.ics";
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; salam_events/0.1; +https://salamcenter.org/events/)";

/// Effective settings for one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub feed_url: String,
    pub ics_file: PathBuf,
    /// Fixed offset of the event source, `±HH:MM`.
    pub utc_offset: String,
    pub default_duration_minutes: i64,
    pub calendar_name: Option<String>,
    pub user_agent: String,
    pub timeout_secs: u64,
    pub max_retries: usize,
    pub report_json: Option<PathBuf>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            feed_url: DEFAULT_FEED_URL.to_string(),
            ics_file: PathBuf::from(DEFAULT_ICS_FILE),
            utc_offset: "-08:00".to_string(),
            default_duration_minutes: DEFAULT_DURATION_MINUTES,
            calendar_name: Some("Salam Center Events".to_string()),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            timeout_secs: 10,
            max_retries: 3,
            report_json: None,
        }
    }
}

impl FeedConfig {
    /// Read a YAML config file. Missing keys keep their defaults.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> FeedResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| FeedError::Config(format!("{}: {e}", path.display())))?;
        let config: FeedConfig = serde_yaml::from_str(&raw)?;
        info!("Loaded config file");
        Ok(config)
    }

    /// Build the effective configuration from the parsed command line.
    pub fn from_cli(cli: &Cli) -> FeedResult<Self> {
        let base = match &cli.config {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        let config = base.with_overrides(cli);
        config.validate()?;
        Ok(config)
    }

    /// Apply every option explicitly set on the command line.
    pub fn with_overrides(mut self, cli: &Cli) -> Self {
        if let Some(v) = &cli.feed_url {
            self.feed_url = v.clone();
        }
        if let Some(v) = &cli.ics_file {
            self.ics_file = v.clone();
        }
        if let Some(v) = &cli.utc_offset {
            self.utc_offset = v.clone();
        }
        if let Some(v) = cli.default_duration_minutes {
            self.default_duration_minutes = v;
        }
        if let Some(v) = &cli.calendar_name {
            self.calendar_name = Some(v.clone());
        }
        if let Some(v) = &cli.user_agent {
            self.user_agent = v.clone();
        }
        if let Some(v) = cli.timeout_secs {
            self.timeout_secs = v;
        }
        if let Some(v) = cli.max_retries {
            self.max_retries = v;
        }
        if let Some(v) = &cli.report_json {
            self.report_json = Some(v.clone());
        }
        self
    }

    /// Check every value that could otherwise fail mid-run.
    pub fn validate(&self) -> FeedResult<()> {
        self.feed_url()?;
        self.source_offset()?;
        if self.default_duration_minutes <= 0 {
            return Err(FeedError::Config(format!(
                "default_duration_minutes must be positive, got {}",
                self.default_duration_minutes
            )));
        }
        if self.timeout_secs == 0 {
            return Err(FeedError::Config("timeout_secs must be positive".to_string()));
        }
        if self.ics_file.as_os_str().is_empty() {
            return Err(FeedError::Config("ics_file must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn feed_url(&self) -> FeedResult<Url> {
        let url = Url::parse(&self.feed_url)
            .map_err(|e| FeedError::Config(format!("feed_url {:?}: {e}", self.feed_url)))?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            other => Err(FeedError::Config(format!(
                "feed_url must be http(s), got scheme {other:?}"
            ))),
        }
    }

    pub fn source_offset(&self) -> FeedResult<FixedOffset> {
        parse_utc_offset(&self.utc_offset).ok_or_else(|| {
            FeedError::Config(format!(
                "utc_offset {:?} is not a fixed offset like -08:00",
                self.utc_offset
            ))
        })
    }

    pub fn extract_options(&self) -> FeedResult<ExtractOptions> {
        Ok(ExtractOptions::new(
            self.source_offset()?,
            Duration::minutes(self.default_duration_minutes),
        ))
    }
}
