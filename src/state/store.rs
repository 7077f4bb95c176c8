use crate::error::Result;
use crate::models::{normalize_query_text, ClickRecord, HistoryEntry, PopularityEntry};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trait for the query history log and popularity table
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a history entry; returns the assigned id
    async fn record_search(&self, entry: HistoryEntry) -> Result<u64>;

    /// Bump the counter for the normalized query text
    async fn increment_popularity(&self, query: &str, at: DateTime<Utc>) -> Result<PopularityEntry>;

    /// Attach a click to the searcher's most recent matching, click-free entry
    /// made within `window` before the click. Returns whether one was found.
    async fn attach_click(&self, click: &ClickRecord, window: Duration) -> Result<bool>;

    /// A user's entries, newest first
    async fn user_history(&self, user_id: u64, limit: usize) -> Result<Vec<HistoryEntry>>;

    /// Entries with `start <= search_time < end`, oldest first
    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>>;

    /// Most searched queries
    async fn popular(&self, limit: usize) -> Result<Vec<PopularityEntry>>;

    /// Most searched queries containing `fragment`
    async fn popular_matching(&self, fragment: &str, limit: usize) -> Result<Vec<PopularityEntry>>;
}

/// Count desc, then most recently searched, then text
pub(crate) fn rank_popularity(entries: &mut [PopularityEntry]) {
    entries.sort_by(|a, b| {
        b.search_count
            .cmp(&a.search_count)
            .then_with(|| b.last_searched.cmp(&a.last_searched))
            .then_with(|| a.query.cmp(&b.query))
    });
}

/// Whether a click at `clicked_at` may be attributed to `entry`
pub(crate) fn within_click_window(
    entry: &HistoryEntry,
    clicked_at: DateTime<Utc>,
    window: Duration,
) -> bool {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    entry.search_time <= clicked_at && clicked_at - entry.search_time <= window
}

/// Whether `entry` was made too long before `clicked_at` to take the click
pub(crate) fn before_click_window(
    entry: &HistoryEntry,
    clicked_at: DateTime<Utc>,
    window: Duration,
) -> bool {
    let window = chrono::Duration::from_std(window).unwrap_or_else(|_| chrono::Duration::zero());
    clicked_at - entry.search_time > window
}

/// Search time, then id
pub(crate) fn sort_oldest_first(entries: &mut [HistoryEntry]) {
    entries.sort_by(|a, b| {
        a.search_time
            .cmp(&b.search_time)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// In-memory history store (for development and testing)
#[derive(Clone)]
pub struct InMemoryHistoryStore {
    entries: Arc<DashMap<u64, HistoryEntry>>,
    popularity: Arc<DashMap<String, PopularityEntry>>,
    next_id: Arc<AtomicU64>,
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            popularity: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(1)),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record_search(&self, mut entry: HistoryEntry) -> Result<u64> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        entry.id = id;
        self.entries.insert(id, entry);
        tracing::debug!(history_id = id, "Search recorded");
        Ok(id)
    }

    async fn increment_popularity(&self, query: &str, at: DateTime<Utc>) -> Result<PopularityEntry> {
        let key = normalize_query_text(query);
        let mut entry = self
            .popularity
            .entry(key.clone())
            .or_insert_with(|| PopularityEntry {
                query: key,
                search_count: 0,
                last_searched: at,
            });
        entry.search_count += 1;
        entry.last_searched = entry.last_searched.max(at);
        Ok(entry.clone())
    }

    async fn attach_click(&self, click: &ClickRecord, window: Duration) -> Result<bool> {
        let target = self
            .entries
            .iter()
            .filter(|entry| {
                click.matches(entry.value())
                    && within_click_window(entry.value(), click.clicked_at, window)
            })
            .map(|entry| *entry.key())
            .max();

        let Some(id) = target else {
            return Ok(false);
        };

        match self.entries.get_mut(&id) {
            // Re-checked under the shard lock so a click attaches at most once
            Some(mut entry) if !entry.has_click() => {
                entry.clicked_result_id = Some(click.result_id);
                entry.clicked_result_type = Some(click.result_type);
                tracing::debug!(history_id = id, result_id = click.result_id, "Click attached");
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn user_history(&self, user_id: u64, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut history: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.value().user_id == Some(user_id))
            .map(|entry| entry.value().clone())
            .collect();

        // Newest first
        history.sort_by(|a, b| b.id.cmp(&a.id));
        history.truncate(limit);
        Ok(history)
    }

    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        let mut entries: Vec<HistoryEntry> = self
            .entries
            .iter()
            .filter(|entry| entry.value().search_time >= start && entry.value().search_time < end)
            .map(|entry| entry.value().clone())
            .collect();
        sort_oldest_first(&mut entries);
        Ok(entries)
    }

    async fn popular(&self, limit: usize) -> Result<Vec<PopularityEntry>> {
        let mut entries: Vec<PopularityEntry> = self
            .popularity
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        rank_popularity(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn popular_matching(&self, fragment: &str, limit: usize) -> Result<Vec<PopularityEntry>> {
        let fragment = normalize_query_text(fragment);
        let mut entries: Vec<PopularityEntry> = self
            .popularity
            .iter()
            .filter(|entry| entry.key().contains(&fragment))
            .map(|entry| entry.value().clone())
            .collect();
        rank_popularity(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }
}
