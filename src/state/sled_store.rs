use crate::error::{AppError, Result};
use crate::models::{normalize_query_text, ClickRecord, HistoryEntry, PopularityEntry};
use crate::state::store::{
    before_click_window, rank_popularity, sort_oldest_first, within_click_window,
};
use crate::state::HistoryStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sled::Db;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Persistent history store using Sled embedded database
#[derive(Clone)]
pub struct SledHistoryStore {
    db: Arc<Db>,
    history_tree: sled::Tree,
    popularity_tree: sled::Tree,
}

impl SledHistoryStore {
    /// Create a new Sled store at the specified path
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_str = path.as_ref();
        let db = sled::open(&path).map_err(|e| {
            AppError::Database(format!("Failed to open Sled database: {}", e))
        })?;

        let history_tree = db.open_tree("history").map_err(|e| {
            AppError::Database(format!("Failed to open history tree: {}", e))
        })?;

        let popularity_tree = db.open_tree("popularity").map_err(|e| {
            AppError::Database(format!("Failed to open popularity tree: {}", e))
        })?;

        tracing::info!("Initialized Sled history store at {:?}", path_str);

        Ok(Self {
            db: Arc::new(db),
            history_tree,
            popularity_tree,
        })
    }

    /// Big-endian so tree order is id order
    fn history_key(id: u64) -> [u8; 8] {
        id.to_be_bytes()
    }

    fn serialize_entry(entry: &HistoryEntry) -> Result<Vec<u8>> {
        bincode::serialize(entry).map_err(|e| {
            AppError::Serialization(format!("Failed to serialize history entry: {}", e))
        })
    }

    fn deserialize_entry(bytes: &[u8]) -> Result<HistoryEntry> {
        bincode::deserialize(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize history entry: {}", e))
        })
    }

    fn deserialize_popularity(bytes: &[u8]) -> Result<PopularityEntry> {
        bincode::deserialize(bytes).map_err(|e| {
            AppError::Serialization(format!("Failed to deserialize popularity entry: {}", e))
        })
    }

    fn all_popularity(&self) -> Result<Vec<PopularityEntry>> {
        let mut entries = Vec::new();
        for result in self.popularity_tree.iter() {
            let (_, value) = result?;
            entries.push(Self::deserialize_popularity(&value)?);
        }
        Ok(entries)
    }

    /// Flush pending writes to disk
    pub async fn flush(&self) -> Result<()> {
        self.db.flush_async().await.map_err(|e| {
            AppError::Database(format!("Failed to flush database: {}", e))
        })?;
        Ok(())
    }

    /// Get database size in bytes
    pub fn size_on_disk(&self) -> Result<u64> {
        self.db.size_on_disk().map_err(|e| {
            AppError::Database(format!("Failed to get database size: {}", e))
        })
    }
}

#[async_trait]
impl HistoryStore for SledHistoryStore {
    async fn record_search(&self, mut entry: HistoryEntry) -> Result<u64> {
        // Ids start at 1; 0 marks an unsaved entry
        let id = self.db.generate_id()? + 1;
        entry.id = id;

        let value = Self::serialize_entry(&entry)?;
        self.history_tree
            .insert(Self::history_key(id), value)
            .map_err(|e| AppError::Database(format!("Failed to save history entry: {}", e)))?;

        tracing::debug!(history_id = id, "Search recorded to Sled");
        Ok(id)
    }

    async fn increment_popularity(&self, query: &str, at: DateTime<Utc>) -> Result<PopularityEntry> {
        let key = normalize_query_text(query);

        let updated = self.popularity_tree.update_and_fetch(key.as_bytes(), |existing| {
            let mut entry = existing
                .and_then(|bytes| bincode::deserialize::<PopularityEntry>(bytes).ok())
                .unwrap_or_else(|| PopularityEntry {
                    query: key.clone(),
                    search_count: 0,
                    last_searched: at,
                });
            entry.search_count += 1;
            entry.last_searched = entry.last_searched.max(at);
            bincode::serialize(&entry).ok()
        })?;

        match updated {
            Some(bytes) => Self::deserialize_popularity(&bytes),
            None => Err(AppError::Serialization(format!(
                "Failed to store popularity for {:?}",
                key
            ))),
        }
    }

    async fn attach_click(&self, click: &ClickRecord, window: Duration) -> Result<bool> {
        for result in self.history_tree.iter().rev() {
            let (key, value) = result?;
            let entry = Self::deserialize_entry(&value)?;

            // Ids follow search time, so everything further back is older still
            if before_click_window(&entry, click.clicked_at, window) {
                break;
            }

            if !click.matches(&entry) || !within_click_window(&entry, click.clicked_at, window) {
                continue;
            }

            let mut clicked = entry;
            clicked.clicked_result_id = Some(click.result_id);
            clicked.clicked_result_type = Some(click.result_type);
            let new_value = Self::serialize_entry(&clicked)?;

            // Lost races leave the entry to whoever attached first
            let swapped = self
                .history_tree
                .compare_and_swap(key, Some(value), Some(new_value))?
                .is_ok();

            if swapped {
                tracing::debug!(history_id = clicked.id, result_id = click.result_id, "Click attached");
            }
            return Ok(swapped);
        }

        Ok(false)
    }

    async fn user_history(&self, user_id: u64, limit: usize) -> Result<Vec<HistoryEntry>> {
        let mut history = Vec::new();

        // Newest first
        for result in self.history_tree.iter().rev() {
            if history.len() >= limit {
                break;
            }
            let (_, value) = result?;
            let entry = Self::deserialize_entry(&value)?;
            if entry.user_id == Some(user_id) {
                history.push(entry);
            }
        }

        Ok(history)
    }

    async fn entries_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HistoryEntry>> {
        let mut entries = Vec::new();
        for result in self.history_tree.iter() {
            let (_, value) = result?;
            let entry = Self::deserialize_entry(&value)?;
            if entry.search_time >= start && entry.search_time < end {
                entries.push(entry);
            }
        }
        sort_oldest_first(&mut entries);
        Ok(entries)
    }

    async fn popular(&self, limit: usize) -> Result<Vec<PopularityEntry>> {
        let mut entries = self.all_popularity()?;
        rank_popularity(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }

    async fn popular_matching(&self, fragment: &str, limit: usize) -> Result<Vec<PopularityEntry>> {
        let fragment = normalize_query_text(fragment);
        let mut entries: Vec<PopularityEntry> = self
            .all_popularity()?
            .into_iter()
            .filter(|entry| entry.query.contains(&fragment))
            .collect();
        rank_popularity(&mut entries);
        entries.truncate(limit);
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ObjectType, SearchContext};
    use tempfile::TempDir;

    fn create_test_store() -> (SledHistoryStore, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let store = SledHistoryStore::new(temp_dir.path()).unwrap();
        (store, temp_dir)
    }

    #[tokio::test]
    async fn test_record_and_read_history() {
        let (store, _temp_dir) = create_test_store();
        let ctx = SearchContext::for_user(3);

        let first = store.record_search(HistoryEntry::new("vue", 2, &ctx)).await.unwrap();
        let second = store.record_search(HistoryEntry::new("rust", 0, &ctx)).await.unwrap();
        assert!(second > first);
        assert!(first > 0);

        let history = store.user_history(3, 10).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "rust");

        assert!(store.user_history(4, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_click_ignores_searches_before_window() {
        let (store, _temp_dir) = create_test_store();
        let ctx = SearchContext::for_user(3);

        let mut stale = HistoryEntry::new("vue", 2, &ctx);
        stale.search_time = Utc::now() - chrono::Duration::hours(2);
        store.record_search(stale).await.unwrap();
        let recent = store.record_search(HistoryEntry::new("vue", 2, &ctx)).await.unwrap();

        let click = ClickRecord {
            query: "vue".to_string(),
            result_id: 7,
            result_type: ObjectType::Content,
            user_id: Some(3),
            ip: String::new(),
            clicked_at: Utc::now(),
        };
        let window = Duration::from_secs(1800);

        assert!(store.attach_click(&click, window).await.unwrap());
        // The only other match is outside the window
        assert!(!store.attach_click(&click, window).await.unwrap());

        let history = store.user_history(3, 10).await.unwrap();
        assert_eq!(history[0].id, recent);
        assert_eq!(history[0].clicked_result_id, Some(7));
        assert_eq!(history[1].clicked_result_id, None);
    }

    #[tokio::test]
    async fn test_popularity_upsert() {
        let (store, _temp_dir) = create_test_store();
        for _ in 0..3 {
            store.increment_popularity("Vue", Utc::now()).await.unwrap();
        }
        let entry = store.increment_popularity("rust", Utc::now()).await.unwrap();
        assert_eq!(entry.search_count, 1);

        let popular = store.popular(10).await.unwrap();
        assert_eq!(popular[0].query, "vue");
        assert_eq!(popular[0].search_count, 3);

        let matching = store.popular_matching("vu", 10).await.unwrap();
        assert_eq!(matching.len(), 1);
    }

    #[tokio::test]
    async fn test_attach_click() {
        let (store, _temp_dir) = create_test_store();
        let ctx = SearchContext::anonymous("10.0.0.9");
        store.record_search(HistoryEntry::new("vue", 2, &ctx)).await.unwrap();

        let click = ClickRecord {
            query: "vue".to_string(),
            result_id: 77,
            result_type: ObjectType::Comment,
            user_id: None,
            ip: "10.0.0.9".to_string(),
            clicked_at: Utc::now(),
        };

        let window = Duration::from_secs(1800);
        assert!(store.attach_click(&click, window).await.unwrap());
        assert!(!store.attach_click(&click, window).await.unwrap());

        let entries = store
            .entries_between(Utc::now() - chrono::Duration::hours(1), Utc::now() + chrono::Duration::seconds(1))
            .await
            .unwrap();
        assert_eq!(entries[0].clicked_result_id, Some(77));
        assert_eq!(entries[0].clicked_result_type, Some(ObjectType::Comment));
    }

    #[tokio::test]
    async fn test_persistence_across_reopens() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().to_path_buf();

        {
            let store = SledHistoryStore::new(&path).unwrap();
            store
                .record_search(HistoryEntry::new("persisted", 1, &SearchContext::for_user(1)))
                .await
                .unwrap();
            store.increment_popularity("persisted", Utc::now()).await.unwrap();
            store.flush().await.unwrap();
        }

        {
            let store = SledHistoryStore::new(&path).unwrap();
            let history = store.user_history(1, 10).await.unwrap();
            assert_eq!(history.len(), 1);
            assert_eq!(history[0].query, "persisted");
            assert_eq!(store.popular(1).await.unwrap()[0].search_count, 1);
        }
    }
}
