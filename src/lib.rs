//! Content search: indexing, ranked retrieval, suggestions and query analytics
//! for articles, comments and user profiles.
//!
//! ```text
//! content mutation ──▶ Indexer ──▶ IndexStore (Tantivy)
//!                                        │
//! user query ──▶ QueryProcessor ──▶ SearchEngine ──▶ Reranker ──▶ response
//!                                        │    ▲           │
//!                                        │    └── cache   └── embeddings
//!                                        ▼
//!                               HistoryStore (history + popularity)
//!                                   │                 │
//!                          SuggestionEngine    AnalyticsEngine
//! ```
//!
//! [`api::SearchApi`] wires all components together and exposes the query
//! operations (`search`, `suggest`, `popular`, `history`, `track_click`,
//! `reindex`, `index_stats`, `analytics`).

pub mod analytics;
pub mod api;
pub mod config;
pub mod content;
pub mod embedding;
pub mod error;
pub mod metrics;
pub mod models;
pub mod search;
pub mod state;
pub mod telemetry;

pub use error::{AppError, Result};
