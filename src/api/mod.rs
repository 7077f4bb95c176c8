//! Transport-agnostic query API
//!
//! [`SearchApi`] wires the index store, history store, cache, engines and
//! indexer together. HTTP or RPC layers call these methods and map
//! [`AppError::error_code`] to their own status codes.

mod types;

pub use types::{ClickAck, HistoryItem, PopularTerm, ReindexAck, SuggestResponse};

use crate::analytics::{AnalyticsEngine, AnalyticsReport, UserSearchBehavior};
use crate::config::Config;
use crate::content::ContentRepository;
use crate::embedding::EmbeddingService;
use crate::error::{AppError, Result};
use crate::metrics::MetricsRegistry;
use crate::models::{ClickRecord, ContentEvent, ObjectType, SearchContext};
use crate::search::{
    IndexOutcome, IndexStats, IndexStore, Indexer, OptimizeReport, Reranker, SearchConfig,
    SearchEngine, SearchRequest, SearchResponse, SuggestionEngine, TantivyIndexStore,
    UNAVAILABLE_MESSAGE,
};
use crate::state::{create_history_store, CacheStats, HistoryStore, SearchCache};
use chrono::Utc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared application state behind every query operation
pub struct SearchApi {
    config: SearchConfig,
    engine: SearchEngine,
    suggestions: SuggestionEngine,
    indexer: Arc<Indexer>,
    analytics: AnalyticsEngine,
    store: Arc<dyn IndexStore>,
    history: Arc<dyn HistoryStore>,
    cache: SearchCache,
    reindexing: Arc<AtomicBool>,
}

impl SearchApi {
    pub fn new(
        config: SearchConfig,
        repository: Arc<dyn ContentRepository>,
        store: Arc<dyn IndexStore>,
        history: Arc<dyn HistoryStore>,
        embeddings: EmbeddingService,
    ) -> Self {
        let cache = if config.enable_cache {
            SearchCache::new(config.cache_capacity, config.cache_ttl())
        } else {
            SearchCache::disabled()
        };

        let reranker = Reranker::new(config.clone(), repository.clone(), embeddings);
        let engine = SearchEngine::new(
            config.clone(),
            store.clone(),
            history.clone(),
            cache.clone(),
            reranker,
        );
        let suggestions =
            SuggestionEngine::new(config.clone(), history.clone(), store.clone(), repository.clone());
        let indexer = Arc::new(Indexer::new(
            config.clone(),
            repository,
            store.clone(),
            cache.clone(),
        ));
        let analytics = AnalyticsEngine::new(history.clone(), config.top_queries_limit);

        Self {
            config,
            engine,
            suggestions,
            indexer,
            analytics,
            store,
            history,
            cache,
            reindexing: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Build every component from loaded configuration
    pub async fn from_config(
        config: &Config,
        repository: Arc<dyn ContentRepository>,
        embeddings: EmbeddingService,
    ) -> Result<Self> {
        MetricsRegistry::new(config.observability.prometheus_enabled)
            .init()
            .map_err(|e| AppError::Configuration(format!("Failed to register metrics: {}", e)))?;

        let store: Arc<dyn IndexStore> = Arc::new(TantivyIndexStore::new(config.search.clone()).await?);
        let history = create_history_store(&config.state)?;

        tracing::info!(
            index_path = ?config.search.index_path,
            backend = ?config.state.backend,
            semantic = embeddings.is_enabled(),
            "Search API initialized"
        );

        Ok(Self::new(config.search.clone(), repository, store, history, embeddings))
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Shared indexer, e.g. for [`Indexer::run_event_loop`]
    pub fn indexer(&self) -> Arc<Indexer> {
        self.indexer.clone()
    }

    /// Ranked, paginated search
    pub async fn search(&self, request: &SearchRequest, context: &SearchContext) -> Result<SearchResponse> {
        self.engine.search(request, context).await.map_err(|e| {
            if e.is_validation() {
                return AppError::from(e);
            }
            tracing::error!(error = %e, "Search failed");
            AppError::Internal(e.user_message())
        })
    }

    pub async fn suggest(&self, prefix: &str, limit: usize, user_id: Option<u64>) -> SuggestResponse {
        SuggestResponse {
            suggestions: self.suggestions.suggest(prefix, limit, user_id).await,
        }
    }

    /// "Did you mean" for a query
    pub async fn correct(&self, query: &str) -> Option<String> {
        self.suggestions.correct(query).await
    }

    pub async fn popular(&self, limit: usize) -> Result<Vec<PopularTerm>> {
        Ok(self
            .history
            .popular(limit)
            .await
            .map_err(|e| unavailable("popular", e))?
            .into_iter()
            .map(|entry| PopularTerm {
                term: entry.query,
                count: entry.search_count,
            })
            .collect())
    }

    /// A user's recent queries, newest first
    pub async fn history(&self, user_id: u64, limit: usize) -> Result<Vec<HistoryItem>> {
        Ok(self
            .history
            .user_history(user_id, limit)
            .await
            .map_err(|e| unavailable("history", e))?
            .into_iter()
            .map(|entry| HistoryItem {
                query: entry.query,
                time: entry.search_time,
            })
            .collect())
    }

    /// Attach a result click to the searcher's latest matching query
    pub async fn track_click(
        &self,
        query: &str,
        result_id: u64,
        result_type: ObjectType,
        context: &SearchContext,
    ) -> Result<ClickAck> {
        if query.trim().is_empty() {
            return Err(AppError::Validation("query is required".to_string()));
        }

        let click = ClickRecord {
            query: query.trim().to_string(),
            result_id,
            result_type,
            user_id: context.user_id,
            ip: context.ip.clone(),
            clicked_at: Utc::now(),
        };

        let recorded = self
            .history
            .attach_click(&click, self.config.click_window())
            .await?;

        if !recorded {
            tracing::debug!(result_id, result_type = %result_type, "Click without a matching search");
        }

        Ok(ClickAck { recorded })
    }

    /// Start a full rebuild in the background
    pub fn reindex(&self) -> ReindexAck {
        if self.reindexing.swap(true, Ordering::SeqCst) {
            return ReindexAck {
                started: false,
                message: "Reindex already in progress".to_string(),
            };
        }

        let indexer = self.indexer.clone();
        let reindexing = self.reindexing.clone();

        tokio::spawn(async move {
            match indexer.reindex_all().await {
                Ok(report) => tracing::info!(
                    indexed = report.indexed,
                    failed = report.failed,
                    "Background reindex completed"
                ),
                Err(e) => tracing::error!(error = %e, "Background reindex failed"),
            }
            reindexing.store(false, Ordering::SeqCst);
        });

        ReindexAck {
            started: true,
            message: "Reindex started".to_string(),
        }
    }

    pub fn is_reindexing(&self) -> bool {
        self.reindexing.load(Ordering::SeqCst)
    }

    pub async fn index_stats(&self) -> Result<IndexStats> {
        Ok(self.store.stats().await?)
    }

    pub async fn analytics(&self, days: u32) -> Result<AnalyticsReport> {
        Ok(self.analytics.report(days).await?)
    }

    pub async fn user_analytics(&self, user_id: u64, days: u32) -> Result<UserSearchBehavior> {
        Ok(self.analytics.user_behavior(user_id, days).await?)
    }

    pub async fn optimize(&self) -> Result<OptimizeReport> {
        Ok(self.indexer.optimize().await?)
    }

    pub async fn handle_event(&self, event: ContentEvent) -> Result<IndexOutcome> {
        Ok(self.indexer.handle_event(event).await?)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

/// Log a storage failure and hide its detail from the caller
fn unavailable(operation: &str, err: AppError) -> AppError {
    tracing::error!(operation, error = %err, "Query endpoint failed");
    AppError::Internal(UNAVAILABLE_MESSAGE.to_string())
}
