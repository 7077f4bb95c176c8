//! Index store: one searchable entry per object, backed by Tantivy

use crate::models::ObjectType;
use crate::search::config::SearchConfig;
use crate::search::document::{build_content_schema, IndexEntry, IndexFields, SearchDocument};
use crate::search::error::{SearchError, SearchResult};
use crate::search::tokenizer::{index_tokens, register_tokenizers};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tantivy::collector::{Count, DocSetCollector, TopDocs};
use tantivy::query::{
    BooleanQuery, ConstScoreQuery, Occur, Query, QueryParser, RegexQuery, TermQuery,
};
use tantivy::schema::{IndexRecordOption, Schema};
use tantivy::{Index, IndexReader, IndexWriter, Order, ReloadPolicy, TantivyDocument, Term};
use tokio::sync::RwLock;

/// Minimum writer arena per indexing thread
const MIN_HEAP_PER_THREAD: usize = 15_000_000;

/// Index statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Total number of entries in the index
    pub total: u64,

    pub per_type_counts: BTreeMap<ObjectType, u64>,

    /// Last successful commit of an upsert or removal
    pub last_indexed_at: Option<DateTime<Utc>>,
}

/// A full-text query restricted to one object type and a set of statuses
#[derive(Debug, Clone)]
pub struct StoreQuery {
    /// Terms joined by spaces
    pub text: String,
    pub object_type: ObjectType,
    /// Accepted statuses; empty matches nothing
    pub statuses: Vec<String>,
    pub limit: usize,
}

/// An entry matched by a store query, with the engine's local score
#[derive(Debug, Clone)]
pub struct StoreHit {
    pub entry: IndexEntry,
    pub score: f32,
}

/// Storage of index entries
#[async_trait]
pub trait IndexStore: Send + Sync {
    /// Insert or replace an entry by id
    async fn upsert(&self, entry: &IndexEntry) -> SearchResult<()>;

    /// Upsert `entries` and remove `removals` (entry ids) in one commit
    async fn upsert_batch(&self, entries: &[IndexEntry], removals: &[String]) -> SearchResult<usize>;

    /// Remove an entry by id; absent ids are a no-op
    async fn remove(&self, entry_id: &str) -> SearchResult<()>;

    async fn get(&self, entry_id: &str) -> SearchResult<Option<IndexEntry>>;

    /// Entries matching the query, best engine score first
    async fn search(&self, query: &StoreQuery) -> SearchResult<Vec<StoreHit>>;

    /// Object ids of every entry of one type regardless of status, ascending
    async fn object_ids(&self, object_type: ObjectType) -> SearchResult<Vec<u64>>;

    /// Up to `limit` entries of one type with an accepted status whose title
    /// contains every token of `fragment`, newest first
    async fn title_matches(
        &self,
        object_type: ObjectType,
        statuses: &[String],
        fragment: &str,
        limit: usize,
    ) -> SearchResult<Vec<IndexEntry>>;

    /// Entry count per object type; every type is present
    async fn count_by_type(&self) -> SearchResult<BTreeMap<ObjectType, u64>>;

    /// Make pending writes visible
    async fn commit(&self) -> SearchResult<()>;

    /// Remove every entry
    async fn clear(&self) -> SearchResult<()>;

    /// Merge storage segments; returns the segment count after compaction
    async fn compact(&self) -> SearchResult<usize>;

    fn last_indexed_at(&self) -> Option<DateTime<Utc>>;

    async fn stats(&self) -> SearchResult<IndexStats> {
        let per_type_counts = self.count_by_type().await?;
        Ok(IndexStats {
            total: per_type_counts.values().sum(),
            per_type_counts,
            last_indexed_at: self.last_indexed_at(),
        })
    }
}

/// Manages the Tantivy search index
pub struct TantivyIndexStore {
    /// The Tantivy index
    index: Index,

    fields: IndexFields,

    /// Index writer (wrapped in RwLock for thread-safety)
    writer: Arc<RwLock<IndexWriter>>,

    /// Reloaded after every commit
    reader: IndexReader,

    last_indexed_at: parking_lot::RwLock<Option<DateTime<Utc>>>,

    /// Configuration
    config: SearchConfig,
}

impl TantivyIndexStore {
    /// Open the index at `config.index_path`, or an in-RAM index when unset
    pub async fn new(config: SearchConfig) -> SearchResult<Self> {
        let schema = build_content_schema();

        let index = match &config.index_path {
            Some(path) => Self::open_or_create_in_dir(path, schema.clone())?,
            None => Index::create_in_ram(schema.clone()),
        };

        register_tokenizers(&index);
        let fields = IndexFields::from_schema(&index.schema())?;

        let threads = config.indexing_threads.max(1);
        let heap = config.writer_heap_size.max(threads * MIN_HEAP_PER_THREAD);
        let writer = index
            .writer_with_num_threads(threads, heap)
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create writer: {}", e)))?;

        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()
            .map_err(|e| SearchError::IndexInitFailed(format!("Failed to create reader: {}", e)))?;

        tracing::info!(
            path = ?config.index_path,
            threads,
            heap_bytes = heap,
            "Search index opened"
        );

        Ok(Self {
            index,
            fields,
            writer: Arc::new(RwLock::new(writer)),
            reader,
            last_indexed_at: parking_lot::RwLock::new(None),
            config,
        })
    }

    fn open_or_create_in_dir(path: &Path, schema: Schema) -> SearchResult<Index> {
        // Create index directory if it doesn't exist
        std::fs::create_dir_all(path).map_err(|e| {
            SearchError::IndexInitFailed(format!("Failed to create index directory: {}", e))
        })?;

        if path.join("meta.json").exists() {
            Index::open_in_dir(path).map_err(|e| {
                SearchError::IndexInitFailed(format!("Failed to open existing index: {}", e))
            })
        } else {
            Index::create_in_dir(path, schema).map_err(|e| {
                SearchError::IndexInitFailed(format!("Failed to create new index: {}", e))
            })
        }
    }

    fn id_term(&self, entry_id: &str) -> Term {
        Term::from_field_text(self.fields.id, entry_id)
    }

    fn type_filter(&self, object_type: ObjectType) -> Box<dyn Query> {
        Box::new(TermQuery::new(
            Term::from_field_text(self.fields.object_type, object_type.as_str()),
            IndexRecordOption::Basic,
        ))
    }

    fn status_filter(&self, statuses: &[String]) -> Box<dyn Query> {
        let clauses = statuses
            .iter()
            .map(|status| {
                let query: Box<dyn Query> = Box::new(TermQuery::new(
                    Term::from_field_text(self.fields.status, status),
                    IndexRecordOption::Basic,
                ));
                (Occur::Should, query)
            })
            .collect();
        Box::new(BooleanQuery::new(clauses))
    }

    fn text_query(&self, text: &str) -> Box<dyn Query> {
        let mut parser = QueryParser::for_index(&self.index, self.fields.text_fields());
        parser.set_field_boost(self.fields.title, 3.0);
        parser.set_field_boost(self.fields.taxonomy, 1.5);

        let (query, errors) = parser.parse_query_lenient(text);
        if !errors.is_empty() {
            tracing::debug!(query = text, errors = errors.len(), "Query parsed leniently");
        }
        query
    }

    /// Commit, refresh the reader and stamp the commit time
    fn commit_writer(&self, writer: &mut IndexWriter) -> SearchResult<()> {
        writer
            .commit()
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to commit: {}", e)))?;
        self.reader.reload()?;
        *self.last_indexed_at.write() = Some(Utc::now());
        Ok(())
    }

    fn collect_entries(&self, query: &dyn Query, limit: usize) -> SearchResult<Vec<StoreHit>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let searcher = self.reader.searcher();
        let top_docs = searcher
            .search(query, &TopDocs::with_limit(limit))
            .map_err(|e| SearchError::SearchFailed(format!("Search execution failed: {}", e)))?;

        let mut hits = Vec::with_capacity(top_docs.len());
        for (score, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| SearchError::SearchFailed(format!("Failed to retrieve doc: {}", e)))?;
            hits.push(StoreHit {
                entry: IndexEntry::from_tantivy_doc(&doc, &self.fields)?,
                score,
            });
        }

        Ok(hits)
    }

    fn count(&self, query: &dyn Query) -> SearchResult<u64> {
        let searcher = self.reader.searcher();
        let count = searcher
            .search(query, &Count)
            .map_err(|e| SearchError::SearchFailed(format!("Count failed: {}", e)))?;
        Ok(count as u64)
    }
}

#[async_trait]
impl IndexStore for TantivyIndexStore {
    async fn upsert(&self, entry: &IndexEntry) -> SearchResult<()> {
        let doc = entry.to_tantivy_doc(&self.fields)?;

        let mut writer = self.writer.write().await;

        // Delete existing document with same ID first
        writer.delete_term(self.id_term(&entry.document_id()));
        writer
            .add_document(doc)
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to add document: {}", e)))?;

        if self.config.realtime_indexing {
            self.commit_writer(&mut writer)?;
        }

        Ok(())
    }

    async fn upsert_batch(&self, entries: &[IndexEntry], removals: &[String]) -> SearchResult<usize> {
        let docs = entries
            .iter()
            .map(|entry| entry.to_tantivy_doc(&self.fields).map(|doc| (entry.document_id(), doc)))
            .collect::<SearchResult<Vec<_>>>()?;

        let mut writer = self.writer.write().await;

        for entry_id in removals {
            writer.delete_term(self.id_term(entry_id));
        }

        let mut indexed = 0;
        for (entry_id, doc) in docs {
            writer.delete_term(self.id_term(&entry_id));
            writer.add_document(doc).map_err(|e| {
                SearchError::IndexingFailed(format!("Failed to add document {}: {}", entry_id, e))
            })?;
            indexed += 1;
        }

        // Commit all documents
        self.commit_writer(&mut writer)?;

        Ok(indexed)
    }

    async fn remove(&self, entry_id: &str) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        writer.delete_term(self.id_term(entry_id));

        if self.config.realtime_indexing {
            self.commit_writer(&mut writer)?;
        }

        Ok(())
    }

    async fn get(&self, entry_id: &str) -> SearchResult<Option<IndexEntry>> {
        let query = TermQuery::new(self.id_term(entry_id), IndexRecordOption::Basic);
        Ok(self
            .collect_entries(&query, 1)?
            .into_iter()
            .next()
            .map(|hit| hit.entry))
    }

    async fn search(&self, query: &StoreQuery) -> SearchResult<Vec<StoreHit>> {
        if query.statuses.is_empty() || query.text.trim().is_empty() {
            return Ok(Vec::new());
        }

        // Filters contribute no score
        let type_filter: Box<dyn Query> =
            Box::new(ConstScoreQuery::new(self.type_filter(query.object_type), 0.0));
        let status_filter: Box<dyn Query> =
            Box::new(ConstScoreQuery::new(self.status_filter(&query.statuses), 0.0));

        let combined = BooleanQuery::new(vec![
            (Occur::Must, self.text_query(&query.text)),
            (Occur::Must, type_filter),
            (Occur::Must, status_filter),
        ]);

        self.collect_entries(&combined, query.limit)
    }

    async fn object_ids(&self, object_type: ObjectType) -> SearchResult<Vec<u64>> {
        let searcher = self.reader.searcher();
        let query = self.type_filter(object_type);
        let addresses = searcher
            .search(query.as_ref(), &DocSetCollector)
            .map_err(|e| SearchError::SearchFailed(format!("Id scan failed: {}", e)))?;

        let mut ids = Vec::with_capacity(addresses.len());
        for doc_address in addresses {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| SearchError::SearchFailed(format!("Failed to retrieve doc: {}", e)))?;
            ids.push(IndexEntry::from_tantivy_doc(&doc, &self.fields)?.object_id);
        }
        ids.sort_unstable();

        Ok(ids)
    }

    async fn title_matches(
        &self,
        object_type: ObjectType,
        statuses: &[String],
        fragment: &str,
        limit: usize,
    ) -> SearchResult<Vec<IndexEntry>> {
        let tokens = index_tokens(fragment);
        if statuses.is_empty() || tokens.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let mut clauses: Vec<(Occur, Box<dyn Query>)> = vec![
            (Occur::Must, self.type_filter(object_type)),
            (Occur::Must, self.status_filter(statuses)),
        ];
        for token in tokens {
            let pattern = format!(".*{}.*", regex::escape(&token));
            let query = RegexQuery::from_pattern(&pattern, self.fields.title).map_err(|e| {
                SearchError::SearchFailed(format!("Invalid title pattern {}: {}", pattern, e))
            })?;
            clauses.push((Occur::Must, Box::new(query)));
        }

        let searcher = self.reader.searcher();
        let newest = TopDocs::with_limit(limit)
            .order_by_fast_field::<tantivy::DateTime>("created_at", Order::Desc);
        let top_docs = searcher
            .search(&BooleanQuery::new(clauses), &newest)
            .map_err(|e| SearchError::SearchFailed(format!("Title lookup failed: {}", e)))?;

        let mut entries = Vec::with_capacity(top_docs.len());
        for (_, doc_address) in top_docs {
            let doc: TantivyDocument = searcher
                .doc(doc_address)
                .map_err(|e| SearchError::SearchFailed(format!("Failed to retrieve doc: {}", e)))?;
            entries.push(IndexEntry::from_tantivy_doc(&doc, &self.fields)?);
        }
        // The fast field only keeps whole seconds
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        Ok(entries)
    }

    async fn count_by_type(&self) -> SearchResult<BTreeMap<ObjectType, u64>> {
        let mut counts = BTreeMap::new();
        for object_type in ObjectType::ALL {
            let query = self.type_filter(object_type);
            counts.insert(object_type, self.count(query.as_ref())?);
        }
        Ok(counts)
    }

    async fn commit(&self) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        self.commit_writer(&mut writer)
    }

    async fn clear(&self) -> SearchResult<()> {
        let mut writer = self.writer.write().await;
        writer
            .delete_all_documents()
            .map_err(|e| SearchError::IndexingFailed(format!("Failed to clear index: {}", e)))?;
        self.commit_writer(&mut writer)?;
        tracing::info!("Search index cleared");
        Ok(())
    }

    async fn compact(&self) -> SearchResult<usize> {
        let merge = {
            let mut writer = self.writer.write().await;
            self.commit_writer(&mut writer)?;

            let segment_ids = self.index.searchable_segment_ids()?;
            if segment_ids.len() < 2 {
                None
            } else {
                Some(writer.merge(&segment_ids))
            }
        };

        if let Some(merge) = merge {
            merge
                .await
                .map_err(|e| SearchError::IndexingFailed(format!("Segment merge failed: {}", e)))?;
            self.reader.reload()?;
        }

        let segments = self.index.searchable_segment_ids()?.len();
        tracing::info!(segments, "Search index compacted");
        Ok(segments)
    }

    fn last_indexed_at(&self) -> Option<DateTime<Utc>> {
        *self.last_indexed_at.read()
    }
}
