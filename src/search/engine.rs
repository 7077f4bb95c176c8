//! Query execution: validation, retrieval per type, calibration, ranking,
//! history recording and pagination

use crate::metrics::{
    SEARCH_DURATION_SECONDS, SEARCH_QUERIES_TOTAL, SEARCH_REJECTED_TOTAL,
    SEARCH_ZERO_RESULTS_TOTAL,
};
use crate::models::{HistoryEntry, ObjectType, SearchContext};
use crate::search::config::SearchConfig;
use crate::search::document::IndexEntry;
use crate::search::error::{SearchError, SearchResult};
use crate::search::index::{IndexStore, StoreQuery};
use crate::search::query::{OrderBy, SearchRequest};
use crate::search::rerank::{sort_by_relevance, sort_by_similarity, Candidate, Reranker};
use crate::search::tokenizer::{ProcessedQuery, QueryProcessor};
use crate::state::{cache_key, HistoryStore, SearchCache, SEARCH_GROUP};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// A single search result hit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Index entry id (`{type}:{object_id}`)
    pub id: String,
    pub object_id: u64,
    pub object_type: ObjectType,
    pub title: String,
    /// HTML-escaped excerpt with `<mark>` around matched terms
    pub highlighted_excerpt: String,
    pub url: String,
    pub date: DateTime<Utc>,
    pub relevance: f64,
    pub similarity: Option<f32>,
    pub author_name: String,
}

/// Search response with results and metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Search query that was executed
    pub query: String,

    /// Results on the requested page
    pub results: Vec<SearchHit>,

    /// Number of ranked results before pagination
    pub total: usize,

    pub page: usize,
    pub per_page: usize,
}

/// Main search engine
pub struct SearchEngine {
    config: SearchConfig,
    store: Arc<dyn IndexStore>,
    history: Arc<dyn HistoryStore>,
    cache: SearchCache,
    processor: QueryProcessor,
    reranker: Reranker,
}

impl SearchEngine {
    pub fn new(
        config: SearchConfig,
        store: Arc<dyn IndexStore>,
        history: Arc<dyn HistoryStore>,
        cache: SearchCache,
        reranker: Reranker,
    ) -> Self {
        Self {
            processor: QueryProcessor::new(&config),
            config,
            store,
            history,
            cache,
            reranker,
        }
    }

    pub fn processor(&self) -> &QueryProcessor {
        &self.processor
    }

    /// Reject malformed requests before anything is read or written
    pub fn validate(&self, request: &SearchRequest) -> SearchResult<()> {
        if request.query.trim().chars().count() < self.config.min_query_length {
            SEARCH_REJECTED_TOTAL.with_label_values(&["too_short"]).inc();
            return Err(SearchError::QueryTooShort {
                min: self.config.min_query_length,
            });
        }

        if request.page == 0 {
            SEARCH_REJECTED_TOTAL.with_label_values(&["pagination"]).inc();
            return Err(SearchError::InvalidPagination(
                "page must be at least 1".to_string(),
            ));
        }

        if request.per_page == 0 || request.per_page > self.config.max_per_page {
            SEARCH_REJECTED_TOTAL.with_label_values(&["pagination"]).inc();
            return Err(SearchError::InvalidPagination(format!(
                "per_page must be between 1 and {}",
                self.config.max_per_page
            )));
        }

        Ok(())
    }

    /// Search across the requested object types
    pub async fn search(
        &self,
        request: &SearchRequest,
        context: &SearchContext,
    ) -> SearchResult<SearchResponse> {
        let timer = SEARCH_DURATION_SECONDS.start_timer();

        self.validate(request)?;

        let processed = self.processor.process(&request.query);
        if processed.is_empty() {
            SEARCH_REJECTED_TOTAL.with_label_values(&["no_terms"]).inc();
            return Err(SearchError::QueryTooShort {
                min: self.config.min_term_length,
            });
        }

        let personalized_user = context
            .user_id
            .filter(|_| self.config.enable_personalization);

        let user_key = personalized_user.map(|id| id.to_string()).unwrap_or_default();
        let key = cache_key(&[
            &processed.terms.join(" "),
            &request.type_filter.to_string(),
            &request.order_by.to_string(),
            if self.config.enable_semantic { "semantic" } else { "lexical" },
            if personalized_user.is_some() { "personal" } else { "global" },
            &user_key,
        ]);

        let ranked: Vec<SearchHit> = self
            .cache
            .remember(&key, SEARCH_GROUP, self.config.cache_ttl(), || {
                self.rank(&processed, request, personalized_user)
            })
            .await?;

        let total = ranked.len();
        self.record(request, context, total).await;

        for object_type in request.type_filter.object_types() {
            SEARCH_QUERIES_TOTAL
                .with_label_values(&[object_type.as_str()])
                .inc();
        }
        if total == 0 {
            SEARCH_ZERO_RESULTS_TOTAL.inc();
        }

        let results = ranked
            .into_iter()
            .skip(request.offset())
            .take(request.per_page)
            .collect();

        timer.observe_duration();

        tracing::debug!(
            query = %processed.normalized,
            total,
            page = request.page,
            "Search executed"
        );

        Ok(SearchResponse {
            query: request.query.trim().to_string(),
            results,
            total,
            page: request.page,
            per_page: request.per_page,
        })
    }

    /// The full ranked result list for a processed query
    async fn rank(
        &self,
        processed: &ProcessedQuery,
        request: &SearchRequest,
        personalized_user: Option<u64>,
    ) -> SearchResult<Vec<SearchHit>> {
        let mut candidates = self.retrieve(processed, request).await?;

        let mut semantic = false;
        if self.config.enable_rerank {
            self.reranker.rescore(&mut candidates, &processed.terms);

            if let Some(user_id) = personalized_user {
                self.reranker.personalize(&mut candidates, user_id).await;
            }

            if self.config.enable_semantic {
                semantic = self
                    .reranker
                    .apply_semantic(&mut candidates, &processed.normalized)
                    .await;
            }
        }

        order(&mut candidates, request.order_by, semantic);

        Ok(candidates
            .into_iter()
            .map(|candidate| self.to_hit(candidate, &processed.terms))
            .collect())
    }

    /// Query each requested type and calibrate engine scores to [0, 1]
    async fn retrieve(
        &self,
        processed: &ProcessedQuery,
        request: &SearchRequest,
    ) -> SearchResult<Vec<Candidate>> {
        let text = processed.terms.join(" ");
        let mut candidates = Vec::new();

        for object_type in request.type_filter.object_types() {
            let hits = self
                .store
                .search(&StoreQuery {
                    text: text.clone(),
                    object_type,
                    statuses: self.config.published_statuses.for_type(object_type).to_vec(),
                    limit: self.config.max_results,
                })
                .await?;

            let max_score = hits.iter().map(|hit| hit.score).fold(0.0f32, f32::max);

            candidates.extend(hits.into_iter().map(|hit| {
                let calibrated = if max_score > 0.0 {
                    f64::from(hit.score / max_score)
                } else {
                    0.0
                };
                Candidate::new(hit.entry, calibrated)
            }));
        }

        Ok(candidates)
    }

    fn to_hit(&self, candidate: Candidate, terms: &[String]) -> SearchHit {
        let highlighted_excerpt = self.reranker.excerpt(&candidate.entry, terms);
        let url = result_url(&self.config.base_url, &candidate.entry);
        let entry = candidate.entry;

        SearchHit {
            id: entry.id,
            object_id: entry.object_id,
            object_type: entry.object_type,
            title: entry.title,
            highlighted_excerpt,
            url,
            date: entry.created_at,
            relevance: candidate.relevance,
            similarity: candidate.similarity,
            author_name: entry.author_name,
        }
    }

    /// Append to the history log and bump popularity; failures are logged
    async fn record(&self, request: &SearchRequest, context: &SearchContext, total: usize) {
        let entry = HistoryEntry::new(request.query.trim(), total as u64, context);
        let searched_at = entry.search_time;

        if let Err(e) = self.history.record_search(entry).await {
            tracing::error!(error = %e, "Failed to record search history");
        }

        if let Err(e) = self
            .history
            .increment_popularity(&request.query, searched_at)
            .await
        {
            tracing::error!(error = %e, "Failed to update query popularity");
        }
    }
}

/// Apply the requested ordering. Relevance ties keep their current order;
/// date and engagement ties fall back to relevance, then recency.
fn order(candidates: &mut [Candidate], order_by: OrderBy, semantic: bool) {
    match order_by {
        OrderBy::Relevance if semantic => sort_by_similarity(candidates),
        OrderBy::Relevance => sort_by_relevance(candidates),
        OrderBy::Date => candidates.sort_by(|a, b| {
            b.entry
                .created_at
                .cmp(&a.entry.created_at)
                .then_with(|| b.relevance.total_cmp(&a.relevance))
        }),
        OrderBy::Engagement => candidates.sort_by(|a, b| {
            b.entry
                .metadata
                .engagement
                .total()
                .cmp(&a.entry.metadata.engagement.total())
                .then_with(|| b.relevance.total_cmp(&a.relevance))
                .then_with(|| b.entry.created_at.cmp(&a.entry.created_at))
        }),
    }
}

/// Permalink when the repository supplied one, else a path under `base_url`
pub fn result_url(base_url: &str, entry: &IndexEntry) -> String {
    if let Some(permalink) = entry.metadata.permalink.as_ref().filter(|p| !p.is_empty()) {
        return permalink.clone();
    }

    let base = base_url.trim_end_matches('/');
    match entry.object_type {
        ObjectType::Content => format!("{}/content/{}", base, entry.object_id),
        ObjectType::Comment => match entry.metadata.parent_id {
            Some(parent_id) => format!("{}/content/{}#comment-{}", base, parent_id, entry.object_id),
            None => format!("{}/comment/{}", base, entry.object_id),
        },
        ObjectType::Account => format!("{}/author/{}", base, entry.object_id),
    }
}
