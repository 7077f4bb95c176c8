//! Shared fixtures for the integration tests

#![allow(dead_code)]

use content_search::api::SearchApi;
use content_search::content::InMemoryContentRepository;
use content_search::embedding::EmbeddingService;
use content_search::models::{ContentEvent, ContentObject, ObjectType};
use content_search::search::{SearchConfig, TantivyIndexStore};
use content_search::state::InMemoryHistoryStore;
use std::sync::Arc;
use std::time::Duration;

/// An API over in-memory collaborators, with handles to each of them
pub struct Harness {
    pub api: SearchApi,
    pub repository: Arc<InMemoryContentRepository>,
    pub history: Arc<InMemoryHistoryStore>,
    pub store: Arc<TantivyIndexStore>,
}

impl Harness {
    pub async fn new(config: SearchConfig) -> Self {
        Self::with_embeddings(config, EmbeddingService::disabled()).await
    }

    pub async fn with_embeddings(config: SearchConfig, embeddings: EmbeddingService) -> Self {
        let repository = Arc::new(InMemoryContentRepository::new());
        let history = Arc::new(InMemoryHistoryStore::new());
        let store = Arc::new(TantivyIndexStore::new(config.clone()).await.unwrap());

        let api = SearchApi::new(
            config,
            repository.clone(),
            store.clone(),
            history.clone(),
            embeddings,
        );

        Self {
            api,
            repository,
            history,
            store,
        }
    }

    /// Store an object in the repository and index it through an event
    pub async fn publish(&self, object: ContentObject) {
        let event = ContentEvent::Published {
            object_id: object.id,
            object_type: object.object_type,
        };
        self.repository.insert(object);
        self.api.handle_event(event).await.unwrap();
    }

    /// Wait for a background reindex to finish
    pub async fn wait_for_reindex(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while self.api.is_reindexing() {
            assert!(tokio::time::Instant::now() < deadline, "reindex did not finish");
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

pub fn article(id: u64, title: &str, body: &str) -> ContentObject {
    ContentObject::new(id, ObjectType::Content, title, body, "publish")
}

pub fn comment(id: u64, parent_id: u64, body: &str) -> ContentObject {
    ContentObject::new(id, ObjectType::Comment, "", body, "approved").with_parent(parent_id)
}

pub fn account(id: u64, name: &str, bio: &str) -> ContentObject {
    ContentObject::new(id, ObjectType::Account, name, bio, "active")
}
