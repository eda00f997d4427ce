//! Merge engine: decides which extracted events are new.
//!
//! Candidates arrive in feed order, newest first. Each one is looked up by
//! [`IdentityKey`] in the persisted set:
//!
//! - unknown: it is added, and its key joins a working set so a feed that
//!   repeats an item within one run still yields it once;
//! - known: scanning stops. Everything after it in the feed is assumed to be
//!   already recorded, since the feed is reverse-chronological and the
//!   calendar only ever grows.
//!
//! # Limitation
//!
//! The early stop trusts the feed ordering. If the source republishes an
//! older item out of order, genuinely new events that sit after the first
//! known one are never seen.

use crate::models::{Event, IdentityKey, MergeResult, MergeStats};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Identity keys of every event already persisted in the calendar.
///
/// Also carries how many events the calendar holds. That count feeds
/// [`MergeStats::existing_count`] and can exceed the number of distinct keys
/// when the file repeats an identity or has blocks without one.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KnownEvents {
    keys: HashSet<IdentityKey>,
    persisted: usize,
}

impl KnownEvents {
    /// Build the set from persisted events, collapsing repeated identities.
    pub fn from_events<'a, I>(events: I) -> Self
    where
        I: IntoIterator<Item = &'a Event>,
    {
        let mut persisted = 0;
        let keys = events
            .into_iter()
            .inspect(|_| persisted += 1)
            .map(Event::identity_key)
            .collect();
        Self { keys, persisted }
    }

    /// Override the persisted count, e.g. with the number of raw blocks kept.
    pub fn with_persisted_count(mut self, count: usize) -> Self {
        self.persisted = count;
        self
    }

    pub fn contains(&self, key: &IdentityKey) -> bool {
        self.keys.contains(key)
    }

    /// Events persisted in the calendar, parsed or not.
    pub fn persisted_count(&self) -> usize {
        self.persisted
    }

    pub fn distinct_keys(&self) -> usize {
        self.keys.len()
    }
}

/// Merge newest-first `candidates` against the `existing` persisted set.
///
/// Returns the new events oldest first together with the run statistics.
/// Pure: nothing is written, `existing` is not modified.
#[instrument(level = "info", skip_all, fields(existing = existing.persisted_count(), known_keys = existing.distinct_keys()))]
pub fn merge<I>(candidates: I, existing: &KnownEvents) -> MergeResult
where
    I: IntoIterator<Item = Event>,
{
    let mut seen = HashSet::new();
    let mut added = Vec::new();

    for candidate in candidates {
        let key = candidate.identity_key();

        if existing.contains(&key) {
            info!(title = %candidate.title, start = %candidate.start, "Reached existing event; stopping");
            break;
        }

        if !seen.insert(key) {
            debug!(title = %candidate.title, start = %candidate.start, "Duplicate entry within feed; skipping");
            continue;
        }

        info!(title = %candidate.title, start = %candidate.start, "New event");
        added.push(candidate);
    }

    added.reverse();

    let stats = MergeStats {
        existing_count: existing.persisted_count(),
        added_count: added.len(),
        total_count: existing.persisted_count() + added.len(),
    };
    info!(
        existing = stats.existing_count,
        added = stats.added_count,
        total = stats.total_count,
        "Merge complete"
    );

    MergeResult { added, stats }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration, FixedOffset, TimeZone};

    fn at(day: u32) -> DateTime<FixedOffset> {
        FixedOffset::west_opt(8 * 3600)
            .unwrap()
            .with_ymd_and_hms(2025, 12, day, 18, 0, 0)
            .unwrap()
    }

    fn event(title: &str, day: u32) -> Event {
        Event {
            title: title.to_string(),
            start: at(day),
            end: at(day) + Duration::hours(1),
            description: format!("{title} description"),
            location: None,
            url: None,
        }
    }

    fn titles(events: &[Event]) -> Vec<&str> {
        events.iter().map(|e| e.title.as_str()).collect()
    }

    #[test]
    fn test_first_run_adds_everything() {
        let candidates = vec![event("A", 3), event("B", 2), event("C", 1)];
        let result = merge(candidates, &KnownEvents::default());

        assert_eq!(result.added.len(), 3);
        let mut got = titles(&result.added);
        got.sort();
        assert_eq!(got, vec!["A", "B", "C"]);
        assert_eq!(
            result.stats,
            MergeStats {
                existing_count: 0,
                added_count: 3,
                total_count: 3
            }
        );
    }

    #[test]
    fn test_added_is_oldest_first() {
        let candidates = vec![event("A", 3), event("B", 2), event("C", 1)];
        let result = merge(candidates, &KnownEvents::default());
        assert_eq!(titles(&result.added), vec!["C", "B", "A"]);
    }

    #[test]
    fn test_empty_candidates_add_nothing() {
        let existing = KnownEvents::from_events(&[event("A", 1)]);
        let result = merge(Vec::<Event>::new(), &existing);

        assert!(result.added.is_empty());
        assert_eq!(result.stats.existing_count, 1);
        assert_eq!(result.stats.total_count, 1);
    }

    #[test]
    fn test_early_stop_at_first_known_event() {
        let e1 = event("E1", 1);
        let e2 = event("E2", 2);
        let existing = KnownEvents::from_events(&[e2.clone(), e1.clone()]);
        let candidates = vec![event("E5", 5), event("E4", 4), event("E3", 3), e2, e1];

        let result = merge(candidates.clone(), &existing);
        let mut got = titles(&result.added);
        got.sort();
        assert_eq!(got, vec!["E3", "E4", "E5"]);
        assert!(result.stats.existing_count >= 1);

        // E3 already known: scanning stops there, E2/E1 are never reached.
        let existing_with_e3 = KnownEvents::from_events(&[event("E3", 3), event("E2", 2), event("E1", 1)]);
        let result = merge(candidates, &existing_with_e3);
        let mut got = titles(&result.added);
        got.sort();
        assert_eq!(got, vec!["E4", "E5"]);
        assert_eq!(result.stats.existing_count, 3);
        assert_eq!(result.stats.total_count, 5);
    }

    #[test]
    fn test_new_events_after_match_are_missed() {
        // Out-of-order feed: E3 is new but appears after the known E2.
        let e2 = event("E2", 2);
        let existing = KnownEvents::from_events(&[e2.clone(), event("E1", 1)]);
        let candidates = vec![event("E5", 5), event("E4", 4), e2, event("E3", 3)];

        let result = merge(candidates, &existing);
        let mut got = titles(&result.added);
        got.sort();
        assert_eq!(got, vec!["E4", "E5"]);
        assert_eq!(result.stats.added_count, 2);
    }

    #[test]
    fn test_match_uses_identity_not_full_equality() {
        let persisted = event("Community Dinner", 5);
        let existing = KnownEvents::from_events(&[persisted]);

        let mut updated = event("  COMMUNITY   dinner ", 5);
        updated.description = "Now with dessert".to_string();
        updated.url = Some("https://salamcenter.org/events/dinner/".to_string());

        let result = merge(vec![event("Newer", 6), updated], &existing);
        assert_eq!(titles(&result.added), vec!["Newer"]);
    }

    #[test]
    fn test_duplicates_within_run_are_collapsed() {
        let candidates = vec![event("A", 3), event("A", 3), event("B", 2)];
        let result = merge(candidates, &KnownEvents::default());

        assert_eq!(titles(&result.added), vec!["B", "A"]);
        assert_eq!(result.stats.added_count, 2);
    }

    #[test]
    fn test_merge_is_idempotent() {
        let candidates = vec![event("A", 3), event("B", 2), event("C", 1)];
        let first = merge(candidates.clone(), &KnownEvents::default());

        let existing = KnownEvents::from_events(&first.added);
        let second = merge(candidates, &existing);

        assert!(second.added.is_empty());
        assert_eq!(second.stats.existing_count, 3);
        assert_eq!(second.stats.total_count, 3);
    }

    #[test]
    fn test_union_has_no_repeated_keys() {
        let existing_events = vec![event("B", 2), event("A", 1)];
        let existing = KnownEvents::from_events(&existing_events);
        let candidates = vec![
            event("D", 4),
            event("C", 3),
            event("D", 4),
            event("B", 2),
            event("A", 1),
        ];

        let result = merge(candidates, &existing);
        let keys: Vec<IdentityKey> = existing_events
            .iter()
            .chain(result.added.iter())
            .map(Event::identity_key)
            .collect();
        let unique: HashSet<&IdentityKey> = keys.iter().collect();

        assert_eq!(keys.len(), unique.len());
        assert_eq!(result.stats.total_count, unique.len());
    }

    #[test]
    fn test_existing_count_covers_unparsed_blocks() {
        let existing = KnownEvents::from_events(&[event("A", 1)]).with_persisted_count(4);
        let result = merge(vec![event("B", 2), event("A", 1)], &existing);

        assert_eq!(titles(&result.added), vec!["B"]);
        assert_eq!(result.stats.existing_count, 4);
        assert_eq!(result.stats.total_count, 5);
    }

    #[test]
    fn test_known_events_collapse_repeated_identities() {
        let known = KnownEvents::from_events(&[event("A", 1), event(" a ", 1), event("B", 2)]);
        assert_eq!(known.distinct_keys(), 2);
        assert_eq!(known.persisted_count(), 3);
        assert!(known.contains(&event("A", 1).identity_key()));
        assert!(!known.contains(&event("A", 2).identity_key()));
    }
}
