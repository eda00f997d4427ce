//! Feed source parsers.
//!
//! Each parser turns a fetched document into [`RawEntry`](crate::models::RawEntry)
//! values in the order the source delivers them (newest first). Parsers do no
//! interpretation of dates or markup; that is the extractor's job.
//!
//! # Supported Sources
//!
//! | Format | Module | Notes |
//! |--------|--------|-------|
//! | RSS 2.0 | [`rss`] | WordPress feeds, including Modern Events Calendar `mec:*` fields |

pub mod rss;
