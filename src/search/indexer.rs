//! Keeps the index store in step with the content repository

use crate::content::ContentRepository;
use crate::metrics::record_index_operation;
use crate::models::{ContentEvent, ContentObject, ObjectType};
use crate::search::config::SearchConfig;
use crate::search::document::IndexEntry;
use crate::search::error::SearchResult;
use crate::search::index::{IndexStats, IndexStore};
use crate::state::{SearchCache, SEARCH_GROUP};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;

/// What `index` did with an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexOutcome {
    Indexed,
    Removed,
}

/// Tally for one chunk of a type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    pub object_type: ObjectType,
    pub offset: usize,
    /// Ids read from the repository
    pub processed: usize,
    pub indexed: usize,
    pub removed: usize,
    /// Objects that could not be loaded, with the reason
    pub failures: Vec<(u64, String)>,
    /// Where the next chunk starts; `None` once the type is exhausted
    pub next_offset: Option<usize>,
}

/// Totals for one type across a full rebuild
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSummary {
    pub processed: usize,
    pub indexed: usize,
    pub removed: usize,
    pub failures: Vec<(u64, String)>,
    pub batches: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReindexReport {
    pub per_type: BTreeMap<ObjectType, TypeSummary>,
    pub indexed: usize,
    pub failed: usize,
    pub duration_ms: u64,
    /// Entry counts matched the repository's published counts afterwards
    pub consistent: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizeReport {
    pub orphans_removed: usize,
    pub segments: usize,
}

pub struct Indexer {
    config: SearchConfig,
    repository: Arc<dyn ContentRepository>,
    store: Arc<dyn IndexStore>,
    cache: SearchCache,
}

impl Indexer {
    pub fn new(
        config: SearchConfig,
        repository: Arc<dyn ContentRepository>,
        store: Arc<dyn IndexStore>,
        cache: SearchCache,
    ) -> Self {
        Self {
            config,
            repository,
            store,
            cache,
        }
    }

    /// The entry for an object, or `None` when it must not be searchable
    fn entry_for(&self, object: Option<ContentObject>) -> Option<IndexEntry> {
        object
            .filter(|object| self.config.is_published(object.object_type, &object.status))
            .map(|object| IndexEntry::from_object(&object, self.config.excerpt_length))
    }

    /// Bring one object's entry up to date
    pub async fn index(&self, object_id: u64, object_type: ObjectType) -> SearchResult<IndexOutcome> {
        let object = self.repository.fetch_object(object_id, object_type).await?;

        match self.entry_for(object) {
            Some(entry) => {
                let result = self.store.upsert(&entry).await;
                record_index_operation("index", result.is_ok());
                result?;
                self.cache.invalidate_group(SEARCH_GROUP);
                tracing::debug!(object_id, object_type = %object_type, "Object indexed");
                Ok(IndexOutcome::Indexed)
            }
            None => self.remove(object_id, object_type).await,
        }
    }

    /// Drop an object's entry; absent entries are a no-op
    pub async fn remove(&self, object_id: u64, object_type: ObjectType) -> SearchResult<IndexOutcome> {
        let result = self
            .store
            .remove(&IndexEntry::entry_id(object_type, object_id))
            .await;
        record_index_operation("remove", result.is_ok());
        result?;
        self.cache.invalidate_group(SEARCH_GROUP);
        tracing::debug!(object_id, object_type = %object_type, "Object removed from index");
        Ok(IndexOutcome::Removed)
    }

    pub async fn handle_event(&self, event: ContentEvent) -> SearchResult<IndexOutcome> {
        let (object_id, object_type) = event.target();
        if event.is_removal() {
            self.remove(object_id, object_type).await
        } else {
            self.index(object_id, object_type).await
        }
    }

    /// Apply repository events until every sender is dropped
    pub async fn run_event_loop(&self, mut events: mpsc::Receiver<ContentEvent>) {
        tracing::info!("Index event loop started");

        while let Some(event) = events.recv().await {
            if let Err(e) = self.handle_event(event).await {
                let (object_id, object_type) = event.target();
                tracing::error!(
                    object_id,
                    object_type = %object_type,
                    error = %e,
                    "Failed to apply content event"
                );
            }
        }

        tracing::info!("Index event loop stopped");
    }

    /// Index up to `limit` objects of one type starting at `offset`, in one commit
    pub async fn batch_index(
        &self,
        object_type: ObjectType,
        offset: usize,
        limit: usize,
    ) -> SearchResult<BatchReport> {
        let ids = if limit == 0 {
            Vec::new()
        } else {
            self.repository.list_ids(object_type, offset, limit).await?
        };

        let mut entries = Vec::with_capacity(ids.len());
        let mut removals = Vec::new();
        let mut failures = Vec::new();

        for &object_id in &ids {
            match self.repository.fetch_object(object_id, object_type).await {
                Ok(object) => match self.entry_for(object) {
                    Some(entry) => entries.push(entry),
                    None => removals.push(IndexEntry::entry_id(object_type, object_id)),
                },
                Err(e) => {
                    tracing::warn!(object_id, object_type = %object_type, error = %e, "Skipping object");
                    record_index_operation("index", false);
                    failures.push((object_id, e.to_string()));
                }
            }
        }

        let result = self.store.upsert_batch(&entries, &removals).await;
        record_index_operation("batch", result.is_ok());
        let indexed = result?;

        let next_offset = if limit > 0 && ids.len() == limit {
            Some(offset + ids.len())
        } else {
            None
        };

        tracing::debug!(
            object_type = %object_type,
            offset,
            indexed,
            removed = removals.len(),
            failed = failures.len(),
            "Batch indexed"
        );

        Ok(BatchReport {
            object_type,
            offset,
            processed: ids.len(),
            indexed,
            removed: removals.len(),
            failures,
            next_offset,
        })
    }

    /// Clear the store and rebuild it from the repository in bounded chunks
    pub async fn reindex_all(&self) -> SearchResult<ReindexReport> {
        let started = Instant::now();
        tracing::info!("Full reindex started");

        self.store.clear().await?;
        self.cache.invalidate_group(SEARCH_GROUP);

        let batch_size = self.config.batch_size.max(1);
        let mut per_type = BTreeMap::new();

        for object_type in ObjectType::ALL {
            let mut summary = TypeSummary::default();
            let mut offset = 0;

            loop {
                let report = self.batch_index(object_type, offset, batch_size).await?;
                summary.processed += report.processed;
                summary.indexed += report.indexed;
                summary.removed += report.removed;
                summary.failures.extend(report.failures);
                summary.batches += 1;

                match report.next_offset {
                    Some(next) => offset = next,
                    None => break,
                }
            }

            per_type.insert(object_type, summary);
        }

        // Results cached while the rebuild was in flight are stale
        self.cache.invalidate_group(SEARCH_GROUP);

        let consistent = self.verify_counts().await;
        let indexed = per_type.values().map(|s| s.indexed).sum();
        let failed = per_type.values().map(|s| s.failures.len()).sum();
        let duration_ms = started.elapsed().as_millis() as u64;

        record_index_operation("reindex", failed == 0);
        tracing::info!(indexed, failed, duration_ms, consistent, "Full reindex finished");

        Ok(ReindexReport {
            per_type,
            indexed,
            failed,
            duration_ms,
            consistent,
        })
    }

    /// Compare per-type entry counts with the repository's published counts
    async fn verify_counts(&self) -> bool {
        let counts = match self.store.count_by_type().await {
            Ok(counts) => counts,
            Err(e) => {
                tracing::warn!(error = %e, "Could not count index entries");
                return false;
            }
        };

        let mut consistent = true;
        for object_type in ObjectType::ALL {
            let statuses = self.config.published_statuses.for_type(object_type);
            match self.repository.count_with_status(object_type, statuses).await {
                Ok(expected) => {
                    let actual = counts.get(&object_type).copied().unwrap_or(0);
                    if actual != expected {
                        tracing::warn!(object_type = %object_type, expected, actual, "Index count differs from repository");
                        consistent = false;
                    }
                }
                Err(e) => {
                    tracing::warn!(object_type = %object_type, error = %e, "Could not count published objects");
                    consistent = false;
                }
            }
        }
        consistent
    }

    /// Remove entries whose source is gone or unpublished, then merge segments.
    ///
    /// Sources are checked `batch_size` entries at a time and each chunk's
    /// removals are committed before the next chunk starts.
    pub async fn optimize(&self) -> SearchResult<OptimizeReport> {
        let batch_size = self.config.batch_size.max(1);
        let mut orphans_removed = 0;

        for object_type in ObjectType::ALL {
            let object_ids = self.store.object_ids(object_type).await?;

            for chunk in object_ids.chunks(batch_size) {
                let orphans = self.orphans_in(object_type, chunk).await;
                if orphans.is_empty() {
                    continue;
                }

                self.store.upsert_batch(&[], &orphans).await?;
                self.cache.invalidate_group(SEARCH_GROUP);
                orphans_removed += orphans.len();

                tracing::debug!(
                    object_type = %object_type,
                    removed = orphans.len(),
                    "Orphaned entries removed"
                );
            }
        }

        let result = self.store.compact().await;
        record_index_operation("optimize", result.is_ok());
        let segments = result?;

        tracing::info!(orphans_removed, segments, "Index optimized");

        Ok(OptimizeReport {
            orphans_removed,
            segments,
        })
    }

    /// Entry ids in `object_ids` whose source no longer yields an entry.
    /// Objects that cannot be loaded are kept.
    async fn orphans_in(&self, object_type: ObjectType, object_ids: &[u64]) -> Vec<String> {
        let mut orphans = Vec::new();
        for &object_id in object_ids {
            match self.repository.fetch_object(object_id, object_type).await {
                Ok(object) => {
                    if self.entry_for(object).is_none() {
                        orphans.push(IndexEntry::entry_id(object_type, object_id));
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        object_id,
                        object_type = %object_type,
                        error = %e,
                        "Could not check entry source"
                    );
                }
            }
        }
        orphans
    }

    pub async fn stats(&self) -> SearchResult<IndexStats> {
        self.store.stats().await
    }
}
