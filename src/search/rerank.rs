//! Second-stage ranking: lexical heuristic, personalization, semantic
//! similarity and excerpt selection

use crate::content::ContentRepository;
use crate::embedding::{cosine_similarity, EmbeddingService};
use crate::models::ObjectType;
use crate::search::config::SearchConfig;
use crate::search::document::IndexEntry;
use crate::search::excerpt::{best_sentences, highlight};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;

const RECENCY_WINDOW_DAYS: f64 = 30.0;
const RECENCY_WEIGHT: f64 = 2.0;
const ENGAGEMENT_WEIGHT: f64 = 0.5;
const TITLE_WEIGHT: f64 = 3.0;

/// How many of a user's own objects feed their interest profile
const INTEREST_SAMPLE: usize = 50;

/// A merged result moving through the ranking stages
#[derive(Debug, Clone)]
pub struct Candidate {
    pub entry: IndexEntry,
    /// Engine score divided by the per-type maximum
    pub calibrated_score: f64,
    pub relevance: f64,
    pub similarity: Option<f32>,
}

impl Candidate {
    pub fn new(entry: IndexEntry, calibrated_score: f64) -> Self {
        Self {
            entry,
            calibrated_score,
            relevance: calibrated_score,
            similarity: None,
        }
    }
}

/// Distinct terms present in `haystack`, case-insensitive
fn overlap(haystack: &str, terms: &[String]) -> usize {
    let haystack = haystack.to_lowercase();
    terms
        .iter()
        .filter(|term| haystack.contains(term.to_lowercase().as_str()))
        .count()
}

pub fn recency_bonus(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let age_days = (now - created_at).num_seconds() as f64 / 86_400.0;
    if age_days >= RECENCY_WINDOW_DAYS {
        return 0.0;
    }
    ((RECENCY_WINDOW_DAYS - age_days.max(0.0)) / RECENCY_WINDOW_DAYS * RECENCY_WEIGHT).max(0.0)
}

pub fn engagement_bonus(views: u64) -> f64 {
    ((views as f64) + 1.0).ln() * ENGAGEMENT_WEIGHT
}

/// `3 x title overlap + body overlap + recency bonus + engagement bonus`
pub fn lexical_score(entry: &IndexEntry, terms: &[String], now: DateTime<Utc>) -> f64 {
    TITLE_WEIGHT * overlap(&entry.title, terms) as f64
        + overlap(&entry.body, terms) as f64
        + recency_bonus(entry.created_at, now)
        + engagement_bonus(entry.metadata.engagement.views)
}

/// What a user writes about and whom they reply to
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserInterests {
    pub tags: HashSet<String>,
    pub categories: HashSet<String>,
    pub authors: HashSet<u64>,
}

impl UserInterests {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.categories.is_empty() && self.authors.is_empty()
    }

    /// Number of facets (tags, categories, author) the entry shares with these interests
    pub fn matching_facets(&self, entry: &IndexEntry) -> usize {
        let tag_match = entry
            .metadata
            .tags
            .iter()
            .any(|tag| self.tags.contains(&tag.to_lowercase()));
        let category_match = entry
            .metadata
            .categories
            .iter()
            .any(|category| self.categories.contains(&category.to_lowercase()));
        let author_match = entry
            .author_id
            .map(|author| self.authors.contains(&author))
            .unwrap_or(false);

        [tag_match, category_match, author_match]
            .iter()
            .filter(|matched| **matched)
            .count()
    }
}

pub struct Reranker {
    config: SearchConfig,
    repository: Arc<dyn ContentRepository>,
    embeddings: EmbeddingService,
}

impl Reranker {
    pub fn new(
        config: SearchConfig,
        repository: Arc<dyn ContentRepository>,
        embeddings: EmbeddingService,
    ) -> Self {
        Self {
            config,
            repository,
            embeddings,
        }
    }

    /// Add the lexical heuristic to each calibrated score and stable-sort
    pub fn rescore(&self, candidates: &mut [Candidate], terms: &[String]) {
        let now = Utc::now();
        for candidate in candidates.iter_mut() {
            candidate.relevance =
                lexical_score(&candidate.entry, terms, now) + candidate.calibrated_score;
        }
        sort_by_relevance(candidates);
    }

    /// Build a user's interest profile; failures yield an empty profile
    pub async fn interests(&self, user_id: u64) -> UserInterests {
        let authored = match self.repository.authored_by(user_id, INTEREST_SAMPLE).await {
            Ok(authored) => authored,
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Could not load user interests");
                return UserInterests::default();
            }
        };

        let mut interests = UserInterests::default();
        let mut parents = HashSet::new();

        for object in &authored {
            match object.object_type {
                ObjectType::Content => {
                    interests
                        .tags
                        .extend(object.tags.iter().map(|t| t.to_lowercase()));
                    interests
                        .categories
                        .extend(object.categories.iter().map(|c| c.to_lowercase()));
                }
                ObjectType::Comment => {
                    if let Some(parent_id) = object.parent_id {
                        parents.insert(parent_id);
                    }
                }
                ObjectType::Account => {}
            }
        }

        let lookups = parents
            .into_iter()
            .map(|parent_id| self.repository.fetch_object(parent_id, ObjectType::Content));
        for parent in join_all(lookups).await {
            match parent {
                Ok(Some(parent)) => {
                    if let Some(author_id) = parent.author_id.filter(|id| *id != user_id) {
                        interests.authors.insert(author_id);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::warn!(user_id, error = %e, "Could not load commented content"),
            }
        }

        interests
    }

    /// Boost candidates matching the user's interests
    pub async fn personalize(&self, candidates: &mut [Candidate], user_id: u64) {
        let interests = self.interests(user_id).await;
        if interests.is_empty() {
            return;
        }

        let boost = self.config.personalization_boost;
        for candidate in candidates.iter_mut() {
            let facets = interests.matching_facets(&candidate.entry);
            candidate.relevance += facets as f64 * boost;
        }
        sort_by_relevance(candidates);
    }

    /// Attach cosine similarity to candidates with a usable vector.
    ///
    /// Returns whether any candidate received a similarity.
    pub async fn apply_semantic(&self, candidates: &mut [Candidate], query: &str) -> bool {
        let Some(query_vector) = self.embeddings.embed(query).await else {
            return false;
        };

        let lookups = candidates.iter().map(|candidate| {
            self.repository
                .embedding(candidate.entry.object_id, candidate.entry.object_type)
        });
        let timeout = self.config.embedding_timeout();
        let vectors = match tokio::time::timeout(timeout, join_all(lookups)).await {
            Ok(vectors) => vectors,
            Err(_) => {
                tracing::warn!(
                    timeout_ms = timeout.as_millis() as u64,
                    candidates = candidates.len(),
                    "Embedding lookups timed out, ranking lexically"
                );
                return false;
            }
        };

        let mut any = false;
        for (candidate, vector) in candidates.iter_mut().zip(vectors) {
            candidate.similarity = match vector {
                Ok(Some(vector)) => {
                    cosine_similarity(&query_vector, &vector).map(|similarity| similarity.max(0.0))
                }
                Ok(None) => None,
                Err(e) => {
                    tracing::warn!(
                        object_id = candidate.entry.object_id,
                        object_type = %candidate.entry.object_type,
                        error = %e,
                        "Could not load embedding"
                    );
                    None
                }
            };
            any |= candidate.similarity.is_some();
        }

        any
    }

    /// Best-matching sentences, else the stored excerpt, highlighted
    pub fn excerpt(&self, entry: &IndexEntry, terms: &[String]) -> String {
        let text = if self.config.enable_rerank {
            best_sentences(&entry.body, terms, self.config.excerpt_length)
                .unwrap_or_else(|| entry.excerpt.clone())
        } else {
            entry.excerpt.clone()
        };
        highlight(&text, terms)
    }
}

/// Relevance descending; ties keep their current order
pub fn sort_by_relevance(candidates: &mut [Candidate]) {
    candidates.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
}

/// Similarity descending with relevance as tiebreak. A missing similarity
/// counts as 0 and negative ones are clamped to 0.
pub fn sort_by_similarity(candidates: &mut [Candidate]) {
    fn axis(candidate: &Candidate) -> f32 {
        candidate.similarity.unwrap_or(0.0).max(0.0)
    }

    candidates.sort_by(|a, b| {
        axis(b)
            .total_cmp(&axis(a))
            .then_with(|| b.relevance.total_cmp(&a.relevance))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::InMemoryContentRepository;
    use crate::embedding::HashEmbedder;
    use crate::error::Result;
    use crate::models::{ContentObject, TaxonomyTerm};
    use async_trait::async_trait;
    use std::time::Duration;

    /// Repository whose embedding lookups stall
    struct StallingRepository(InMemoryContentRepository);

    #[async_trait]
    impl ContentRepository for StallingRepository {
        async fn fetch_object(
            &self,
            object_id: u64,
            object_type: ObjectType,
        ) -> Result<Option<ContentObject>> {
            self.0.fetch_object(object_id, object_type).await
        }

        async fn list_ids(
            &self,
            object_type: ObjectType,
            offset: usize,
            limit: usize,
        ) -> Result<Vec<u64>> {
            self.0.list_ids(object_type, offset, limit).await
        }

        async fn count_with_status(&self, object_type: ObjectType, statuses: &[String]) -> Result<u64> {
            self.0.count_with_status(object_type, statuses).await
        }

        async fn authored_by(&self, user_id: u64, limit: usize) -> Result<Vec<ContentObject>> {
            self.0.authored_by(user_id, limit).await
        }

        async fn embedding(&self, object_id: u64, object_type: ObjectType) -> Result<Option<Vec<f32>>> {
            tokio::time::sleep(Duration::from_millis(500)).await;
            self.0.embedding(object_id, object_type).await
        }

        async fn taxonomy(&self) -> Result<Vec<TaxonomyTerm>> {
            self.0.taxonomy().await
        }
    }

    fn entry(id: u64, title: &str, body: &str) -> IndexEntry {
        let created = Utc::now() - chrono::Duration::days(60);
        IndexEntry::from_object(
            &ContentObject::new(id, ObjectType::Content, title, body, "publish").with_created_at(created),
            200,
        )
    }

    fn reranker(repo: InMemoryContentRepository, embeddings: EmbeddingService) -> Reranker {
        Reranker::new(SearchConfig::default(), Arc::new(repo), embeddings)
    }

    #[test]
    fn test_lexical_score_weights_title() {
        let terms = vec!["vue".to_string(), "router".to_string()];
        let now = Utc::now();

        let in_title = entry(1, "Vue Router", "nothing here");
        let in_body = entry(2, "Something", "vue router guide");

        assert_eq!(lexical_score(&in_title, &terms, now), 6.0);
        assert_eq!(lexical_score(&in_body, &terms, now), 2.0);
    }

    #[test]
    fn test_recency_and_engagement_bonus() {
        let now = Utc::now();
        assert!((recency_bonus(now, now) - 2.0).abs() < 1e-9);
        assert!((recency_bonus(now - chrono::Duration::days(15), now) - 1.0).abs() < 1e-3);
        assert_eq!(recency_bonus(now - chrono::Duration::days(45), now), 0.0);

        assert_eq!(engagement_bonus(0), 0.0);
        assert!((engagement_bonus(99) - (100f64).ln() * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_rescore_is_stable_on_ties() {
        let reranker = reranker(InMemoryContentRepository::new(), EmbeddingService::disabled());
        let mut candidates = vec![
            Candidate::new(entry(1, "Other", "vue"), 0.0),
            Candidate::new(entry(2, "Another", "vue"), 0.0),
            Candidate::new(entry(3, "Vue", "vue"), 0.0),
        ];

        reranker.rescore(&mut candidates, &["vue".to_string()]);
        let order: Vec<u64> = candidates.iter().map(|c| c.entry.object_id).collect();
        assert_eq!(order, vec![3, 1, 2]);
    }

    #[tokio::test]
    async fn test_personalization_boosts_shared_tags() {
        let repo = InMemoryContentRepository::new();
        repo.insert(
            ContentObject::new(100, ObjectType::Content, "Mine", "my post", "publish")
                .with_author(9, "Me")
                .with_tags(vec!["Rust"]),
        );
        repo.insert(
            ContentObject::new(200, ObjectType::Content, "Theirs", "their post", "publish")
                .with_author(4, "Them"),
        );
        repo.insert(
            ContentObject::new(300, ObjectType::Comment, "", "nice", "approved")
                .with_author(9, "Me")
                .with_parent(200),
        );

        let reranker = reranker(repo, EmbeddingService::disabled());
        let interests = reranker.interests(9).await;
        assert!(interests.tags.contains("rust"));
        assert!(interests.authors.contains(&4));

        let tagged = IndexEntry::from_object(
            &ContentObject::new(1, ObjectType::Content, "A", "a", "publish").with_tags(vec!["rust"]),
            200,
        );
        let by_author = IndexEntry::from_object(
            &ContentObject::new(2, ObjectType::Content, "B", "b", "publish").with_author(4, "Them"),
            200,
        );
        let plain = IndexEntry::from_object(
            &ContentObject::new(3, ObjectType::Content, "C", "c", "publish"),
            200,
        );

        let mut candidates = vec![
            Candidate::new(plain, 1.0),
            Candidate::new(tagged, 0.5),
            Candidate::new(by_author, 0.2),
        ];
        reranker.personalize(&mut candidates, 9).await;

        assert_eq!(candidates[0].entry.object_id, 1);
        assert!((candidates[0].relevance - 2.0).abs() < 1e-9);
        assert_eq!(candidates[1].entry.object_id, 2);
        assert_eq!(candidates[2].entry.object_id, 3);
    }

    #[tokio::test]
    async fn test_semantic_skips_missing_and_mismatched_vectors() {
        let embedder = HashEmbedder::new(16);
        let repo = InMemoryContentRepository::new();
        repo.insert(
            ContentObject::new(1, ObjectType::Content, "Vue", "vue", "publish")
                .with_embedding(embedder.embed_text("vue tutorial")),
        );
        repo.insert(ContentObject::new(2, ObjectType::Content, "None", "x", "publish"));
        repo.insert(
            ContentObject::new(3, ObjectType::Content, "Short", "x", "publish")
                .with_embedding(vec![1.0, 0.0]),
        );

        let service = EmbeddingService::new(Arc::new(embedder), Duration::from_secs(1));
        let reranker = reranker(repo, service);

        let mut candidates: Vec<Candidate> = (1..=3)
            .map(|id| Candidate::new(entry(id, "t", "b"), 0.0))
            .collect();
        assert!(reranker.apply_semantic(&mut candidates, "vue tutorial").await);

        assert!(candidates[0].similarity.unwrap() > 0.99);
        assert!(candidates[1].similarity.is_none());
        assert!(candidates[2].similarity.is_none());

        sort_by_similarity(&mut candidates);
        assert_eq!(candidates[0].entry.object_id, 1);
    }

    #[test]
    fn test_missing_vector_counts_as_zero_similarity() {
        let mut dissimilar = Candidate::new(entry(1, "a", "a"), 1.0);
        dissimilar.similarity = Some(-0.5);
        let vectorless = Candidate::new(entry(2, "b", "b"), 10.0);
        let mut close = Candidate::new(entry(3, "c", "c"), 0.0);
        close.similarity = Some(0.3);

        let mut candidates = vec![dissimilar, vectorless, close];
        sort_by_similarity(&mut candidates);

        let order: Vec<u64> = candidates.iter().map(|c| c.entry.object_id).collect();
        assert_eq!(order, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_negative_similarity_is_clamped() {
        let embedder = HashEmbedder::new(16);
        let opposite: Vec<f32> = embedder.embed_text("vue").iter().map(|x| -x).collect();
        let repo = InMemoryContentRepository::new();
        repo.insert(
            ContentObject::new(1, ObjectType::Content, "Vue", "vue", "publish").with_embedding(opposite),
        );

        let service = EmbeddingService::new(Arc::new(embedder), Duration::from_secs(1));
        let reranker = reranker(repo, service);
        let mut candidates = vec![Candidate::new(entry(1, "t", "b"), 0.0)];

        assert!(reranker.apply_semantic(&mut candidates, "vue").await);
        assert_eq!(candidates[0].similarity, Some(0.0));
    }

    #[tokio::test]
    async fn test_slow_embedding_lookups_degrade_to_lexical() {
        let embedder = HashEmbedder::new(16);
        let repo = InMemoryContentRepository::new();
        repo.insert(
            ContentObject::new(1, ObjectType::Content, "Vue", "vue", "publish")
                .with_embedding(embedder.embed_text("vue")),
        );

        let config = crate::search::config::SearchConfigBuilder::new()
            .embedding_timeout_ms(20)
            .build();
        let service = EmbeddingService::new(Arc::new(embedder), Duration::from_secs(1));
        let reranker = Reranker::new(config, Arc::new(StallingRepository(repo)), service);

        let mut candidates = vec![Candidate::new(entry(1, "t", "b"), 0.0)];
        assert!(!reranker.apply_semantic(&mut candidates, "vue").await);
        assert!(candidates[0].similarity.is_none());
    }

    #[tokio::test]
    async fn test_semantic_disabled_provider() {
        let reranker = reranker(InMemoryContentRepository::new(), EmbeddingService::disabled());
        let mut candidates = vec![Candidate::new(entry(1, "t", "b"), 0.0)];
        assert!(!reranker.apply_semantic(&mut candidates, "vue").await);
    }

    #[test]
    fn test_excerpt_prefers_matching_sentences() {
        let reranker = reranker(InMemoryContentRepository::new(), EmbeddingService::disabled());
        let entry = entry(1, "Guide", "Intro. The router is great. Outro.");
        let excerpt = reranker.excerpt(&entry, &["router".to_string()]);
        assert_eq!(excerpt, "The <mark>router</mark> is great.");
    }
}
