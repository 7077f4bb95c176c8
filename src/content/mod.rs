//! Boundary to the content repository that owns articles, comments and
//! accounts.
//!
//! The search system never mutates source objects; it only reads their current
//! state when indexing and when scoring (embeddings, personalization,
//! taxonomy suggestions).

mod memory;

pub use memory::InMemoryContentRepository;

use crate::error::Result;
use crate::models::{ContentObject, ObjectType, TaxonomyTerm};
use async_trait::async_trait;

/// Read access to source objects
#[async_trait]
pub trait ContentRepository: Send + Sync {
    /// Fetch the current state of an object, `None` if it does not exist
    async fn fetch_object(&self, object_id: u64, object_type: ObjectType)
        -> Result<Option<ContentObject>>;

    /// Object ids of one type in ascending order, any status
    async fn list_ids(&self, object_type: ObjectType, offset: usize, limit: usize)
        -> Result<Vec<u64>>;

    /// Number of objects of one type whose status is in `statuses`
    async fn count_with_status(&self, object_type: ObjectType, statuses: &[String]) -> Result<u64>;

    /// Content and comments written by a user, newest first
    async fn authored_by(&self, user_id: u64, limit: usize) -> Result<Vec<ContentObject>>;

    /// Embedding vector stored with the object, if any
    async fn embedding(&self, object_id: u64, object_type: ObjectType) -> Result<Option<Vec<f32>>> {
        Ok(self
            .fetch_object(object_id, object_type)
            .await?
            .and_then(|object| object.embedding))
    }

    /// Tags and categories with usage counts
    async fn taxonomy(&self) -> Result<Vec<TaxonomyTerm>>;
}
