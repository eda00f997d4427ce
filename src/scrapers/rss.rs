//! RSS 2.0 feed parser.
//!
//! Reads `rss/channel/item` with `quick-xml`'s serde deserializer. Besides the
//! standard item fields it picks up the WordPress `content:encoded` body and
//! the Modern Events Calendar hints (`mec:startDate`, `mec:endDate`,
//! `mec:location`) that event plugins add to their feeds.

use crate::error::FeedResult;
use crate::models::RawEntry;
use serde::Deserialize;
use tracing::{debug, info, instrument};

#[derive(Debug, Deserialize)]
struct Rss {
    channel: Channel,
}

#[derive(Debug, Deserialize)]
struct Channel {
    #[serde(default)]
    title: Option<String>,
    #[serde(rename = "item", default)]
    items: Vec<Item>,
}

#[derive(Debug, Default, Deserialize)]
struct Item {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    link: Option<String>,
    #[serde(rename = "pubDate", default)]
    pub_date: Option<String>,
    #[serde(default)]
    description: Option<String>,
    // quick-xml matches elements by local name, so `content:encoded` is `encoded`
    // and the `mec:` prefix is dropped.
    #[serde(rename = "encoded", default)]
    content_encoded: Option<String>,
    #[serde(rename = "startDate", default)]
    mec_start_date: Option<String>,
    #[serde(rename = "endDate", default)]
    mec_end_date: Option<String>,
    #[serde(rename = "location", default)]
    mec_location: Option<String>,
}

impl From<Item> for RawEntry {
    fn from(item: Item) -> Self {
        // The full body beats the excerpt when the feed carries both.
        let description = non_empty(item.content_encoded).or_else(|| non_empty(item.description));

        RawEntry {
            title: item.title.unwrap_or_default(),
            published: non_empty(item.pub_date),
            description,
            link: non_empty(item.link),
            start_date: non_empty(item.mec_start_date),
            end_date: non_empty(item.mec_end_date),
            location: non_empty(item.mec_location),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Parse an RSS document into raw entries, preserving feed order.
///
/// # Errors
///
/// Returns [`FeedError::Xml`](crate::error::FeedError::Xml) when the document is
/// not well-formed XML or has no `channel`.
#[instrument(level = "info", skip_all, fields(bytes = xml.len()))]
pub fn parse_feed(xml: &str) -> FeedResult<Vec<RawEntry>> {
    let rss: Rss = quick_xml::de::from_str(xml)?;
    let channel_title = rss.channel.title.unwrap_or_default();

    let entries: Vec<RawEntry> = rss.channel.items.into_iter().map(RawEntry::from).collect();

    info!(count = entries.len(), channel = %channel_title, "Parsed feed items");
    debug!(titles = ?entries.iter().map(|e| e.title.as_str()).collect::<Vec<_>>(), "Feed titles");
    Ok(entries)
}
