//! Search configuration

use crate::models::ObjectType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Search service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Path to the search index directory; `None` keeps the index in RAM
    pub index_path: Option<PathBuf>,

    /// Index writer heap size in bytes (default: 50MB)
    pub writer_heap_size: usize,

    /// Number of threads for indexing
    pub indexing_threads: usize,

    /// Commit after every single upsert/removal
    pub realtime_indexing: bool,

    /// Maximum candidates retrieved per object type
    pub max_results: usize,

    /// Minimum trimmed query length in characters
    pub min_query_length: usize,

    /// Minimum term length in characters
    pub min_term_length: usize,

    pub max_per_page: usize,
    pub default_per_page: usize,

    /// Fallback excerpt length in characters
    pub excerpt_length: usize,

    /// Objects per reindex chunk
    pub batch_size: usize,

    pub enable_rerank: bool,
    pub enable_semantic: bool,
    pub enable_personalization: bool,

    /// Added to the relevance of results matching one of the searcher's interests
    pub personalization_boost: f64,

    pub enable_synonyms: bool,

    /// Term to synonyms table
    pub synonyms: HashMap<String, Vec<String>>,

    pub enable_suggestions: bool,
    pub enable_cache: bool,
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
    pub embedding_timeout_ms: u64,

    /// How long after a search a click is still attributed to it
    pub click_window_secs: u64,

    pub published_statuses: PublishedStatuses,

    /// Prefix for generated result URLs when an object has no permalink
    pub base_url: String,

    /// Length of the top/zero-result/most-clicked lists in analytics
    pub top_queries_limit: usize,
}

impl SearchConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }

    pub fn embedding_timeout(&self) -> Duration {
        Duration::from_millis(self.embedding_timeout_ms)
    }

    pub fn click_window(&self) -> Duration {
        Duration::from_secs(self.click_window_secs)
    }

    /// Whether `status` makes an object of `object_type` visible to search
    pub fn is_published(&self, object_type: ObjectType, status: &str) -> bool {
        self.published_statuses
            .for_type(object_type)
            .iter()
            .any(|s| s == status)
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            index_path: None,
            writer_heap_size: 50_000_000, // 50MB
            indexing_threads: 1,
            realtime_indexing: true,
            max_results: 1000,
            min_query_length: 2,
            min_term_length: 2,
            max_per_page: 100,
            default_per_page: 10,
            excerpt_length: 200,
            batch_size: 200,
            enable_rerank: true,
            enable_semantic: false,
            enable_personalization: false,
            personalization_boost: 1.5,
            enable_synonyms: true,
            synonyms: HashMap::new(),
            enable_suggestions: true,
            enable_cache: true,
            cache_ttl_secs: 3600,
            cache_capacity: 10_000,
            embedding_timeout_ms: 2000,
            click_window_secs: 1800,
            published_statuses: PublishedStatuses::default(),
            base_url: String::new(),
            top_queries_limit: 10,
        }
    }
}

/// Statuses that make an object visible, per object type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishedStatuses {
    pub content: Vec<String>,
    pub comment: Vec<String>,
    pub account: Vec<String>,
}

impl PublishedStatuses {
    pub fn for_type(&self, object_type: ObjectType) -> &[String] {
        match object_type {
            ObjectType::Content => &self.content,
            ObjectType::Comment => &self.comment,
            ObjectType::Account => &self.account,
        }
    }
}

impl Default for PublishedStatuses {
    fn default() -> Self {
        Self {
            content: vec!["publish".to_string()],
            comment: vec!["approved".to_string()],
            account: vec!["active".to_string()],
        }
    }
}

/// Builder for SearchConfig
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: SearchConfig::default(),
        }
    }

    pub fn index_path(mut self, path: PathBuf) -> Self {
        self.config.index_path = Some(path);
        self
    }

    pub fn writer_heap_size(mut self, size: usize) -> Self {
        self.config.writer_heap_size = size;
        self
    }

    pub fn indexing_threads(mut self, threads: usize) -> Self {
        self.config.indexing_threads = threads;
        self
    }

    pub fn realtime_indexing(mut self, enabled: bool) -> Self {
        self.config.realtime_indexing = enabled;
        self
    }

    pub fn max_results(mut self, max: usize) -> Self {
        self.config.max_results = max;
        self
    }

    pub fn min_query_length(mut self, length: usize) -> Self {
        self.config.min_query_length = length;
        self
    }

    pub fn min_term_length(mut self, length: usize) -> Self {
        self.config.min_term_length = length;
        self
    }

    pub fn max_per_page(mut self, max: usize) -> Self {
        self.config.max_per_page = max;
        self
    }

    pub fn excerpt_length(mut self, length: usize) -> Self {
        self.config.excerpt_length = length;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    pub fn enable_rerank(mut self, enabled: bool) -> Self {
        self.config.enable_rerank = enabled;
        self
    }

    pub fn enable_semantic(mut self, enabled: bool) -> Self {
        self.config.enable_semantic = enabled;
        self
    }

    pub fn enable_personalization(mut self, enabled: bool) -> Self {
        self.config.enable_personalization = enabled;
        self
    }

    pub fn personalization_boost(mut self, boost: f64) -> Self {
        self.config.personalization_boost = boost;
        self
    }

    pub fn enable_synonyms(mut self, enabled: bool) -> Self {
        self.config.enable_synonyms = enabled;
        self
    }

    pub fn synonym(mut self, term: impl Into<String>, synonyms: Vec<impl Into<String>>) -> Self {
        self.config
            .synonyms
            .insert(term.into(), synonyms.into_iter().map(Into::into).collect());
        self
    }

    pub fn enable_suggestions(mut self, enabled: bool) -> Self {
        self.config.enable_suggestions = enabled;
        self
    }

    pub fn enable_cache(mut self, enabled: bool) -> Self {
        self.config.enable_cache = enabled;
        self
    }

    pub fn cache_ttl_secs(mut self, secs: u64) -> Self {
        self.config.cache_ttl_secs = secs;
        self
    }

    pub fn embedding_timeout_ms(mut self, millis: u64) -> Self {
        self.config.embedding_timeout_ms = millis;
        self
    }

    pub fn published_statuses(mut self, statuses: PublishedStatuses) -> Self {
        self.config.published_statuses = statuses;
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = url.into();
        self
    }

    pub fn build(self) -> SearchConfig {
        self.config
    }
}

impl Default for SearchConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SearchConfig::default();
        assert!(config.index_path.is_none());
        assert!(config.is_published(ObjectType::Content, "publish"));
        assert!(!config.is_published(ObjectType::Content, "draft"));
        assert!(config.is_published(ObjectType::Comment, "approved"));
        assert!(config.is_published(ObjectType::Account, "active"));
    }

    #[test]
    fn test_builder() {
        let config = SearchConfigBuilder::new()
            .min_query_length(3)
            .enable_cache(false)
            .synonym("js", vec!["javascript"])
            .build();

        assert_eq!(config.min_query_length, 3);
        assert!(!config.enable_cache);
        assert_eq!(config.synonyms["js"], vec!["javascript".to_string()]);
    }
}
