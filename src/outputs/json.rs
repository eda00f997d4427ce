//! JSON run report.
//!
//! An optional machine-readable summary of a run, for dashboards or CI
//! checks that want to know how many events a refresh produced.
//!
//! ```json
//! {
//!   "generated_at": "2025-12-20T12:00:00Z",
//!   "feed_url": "https://salamcenter.org/events/feed/",
//!   "feed_entries": 10,
//!   "skipped_entries": 1,
//!   "stats": { "existing_count": 42, "added_count": 2, "total_count": 44 },
//!   "added": [ { "title": "...", "start": "...", ... } ]
//! }
//! ```

use crate::error::FeedResult;
use crate::models::{Event, MergeStats};
use crate::utils::ensure_parent_dir;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument};

/// Summary of one refresh run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub generated_at: DateTime<Utc>,
    pub feed_url: String,
    /// Items in the fetched feed.
    pub feed_entries: usize,
    /// Items the extractor rejected.
    pub skipped_entries: usize,
    pub stats: MergeStats,
    /// Events added by this run, oldest first.
    pub added: Vec<Event>,
}

/// Write a [`RunReport`] as pretty-printed JSON, creating parent directories.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn write_report(report: &RunReport, path: &Path) -> FeedResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    ensure_parent_dir(path).await?;
    fs::write(path, json).await?;
    info!(added = report.stats.added_count, "Wrote JSON run report");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, FixedOffset, TimeZone};

    fn report() -> RunReport {
        let start = FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 12, 25, 17, 0, 0)
            .unwrap();
        RunReport {
            generated_at: Utc.with_ymd_and_hms(2025, 12, 20, 12, 0, 0).unwrap(),
            feed_url: "https://salamcenter.org/events/feed/".to_string(),
            feed_entries: 3,
            skipped_entries: 1,
            stats: MergeStats {
                existing_count: 4,
                added_count: 1,
                total_count: 5,
            },
            added: vec![Event {
                title: "Community Dinner".to_string(),
                start,
                end: start + Duration::hours(1),
                description: String::new(),
                location: None,
                url: None,
            }],
        }
    }

    #[test]
    fn test_report_serialization() {
        let json = serde_json::to_string(&report()).unwrap();
        assert!(json.contains("\"existing_count\":4"));
        assert!(json.contains("\"skipped_entries\":1"));
        assert!(json.contains("Community Dinner"));
    }

    #[tokio::test]
    async fn test_write_report_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reports/last_run.json");

        write_report(&report(), &path).await.unwrap();

        let written: RunReport =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, report());
    }
}
