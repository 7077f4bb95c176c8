//! Full-text search over content, comments and accounts, powered by Tantivy
//!
//! This module provides:
//!
//! - **Indexing**: one entry per source object, kept current from repository events
//! - **Query processing**: normalization, CJK segmentation and synonym expansion
//! - **Ranking**: per-type retrieval, score calibration and a lexical reranker
//!   with optional personalization and semantic similarity
//! - **Excerpts**: best-matching sentences with `<mark>` highlighting
//! - **Suggestions**: typeahead and spelling correction
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │   SearchEngine          SuggestionEngine         │
//! ├─────────────────────────────────────────────────┤
//! │  - QueryProcessor      - history / popularity   │
//! │  - SearchCache         - titles / taxonomy      │
//! │  - Reranker            - correct()              │
//! └─────────────────────────────────────────────────┘
//!                      │
//!                      ▼
//! ┌─────────────────────────────────────────────────┐
//! │           IndexStore (TantivyIndexStore)         │
//! ├─────────────────────────────────────────────────┤
//! │  - Schema: title, body, excerpt, taxonomy       │
//! │  - Filters: object_type, status                 │
//! │  - Payload: serialized IndexEntry               │
//! └─────────────────────────────────────────────────┘
//!                      ▲
//!                      │
//! ┌─────────────────────────────────────────────────┐
//! │   Indexer  ◀── ContentEvent / ContentRepository  │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use content_search::search::{SearchConfig, SearchRequest, TantivyIndexStore};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = SearchConfig::default();
//!     let store = TantivyIndexStore::new(config).await?;
//!
//!     let request = SearchRequest::parse("vue router", "content", "date", 1, 20)?;
//!     println!("{:?} from offset {}", request.type_filter, request.offset());
//!     # drop(store);
//!     Ok(())
//! }
//! ```

mod config;
mod document;
mod engine;
mod error;
mod excerpt;
mod index;
mod indexer;
mod query;
mod rerank;
mod suggest;
mod tokenizer;

pub use config::{PublishedStatuses, SearchConfig, SearchConfigBuilder};
pub use document::{EntryMetadata, IndexEntry, SearchDocument};
pub use engine::{result_url, SearchEngine, SearchHit, SearchResponse};
pub use error::{SearchError, SearchResult, UNAVAILABLE_MESSAGE};
pub use excerpt::{highlight, strip_markup};
pub use index::{IndexStats, IndexStore, StoreHit, StoreQuery, TantivyIndexStore};
pub use indexer::{BatchReport, IndexOutcome, Indexer, OptimizeReport, ReindexReport, TypeSummary};
pub use query::{OrderBy, SearchRequest, TypeFilter};
pub use rerank::{Candidate, Reranker, UserInterests};
pub use suggest::{soundex, Suggestion, SuggestionEngine, SuggestionSource};
pub use tokenizer::{CjkTokenizer, ProcessedQuery, QueryProcessor, CJK_TOKENIZER};
