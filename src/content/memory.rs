use crate::content::ContentRepository;
use crate::error::Result;
use crate::models::{ContentObject, ObjectType, TaxonomyKind, TaxonomyTerm};
use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory content repository (for development and testing)
#[derive(Clone, Default)]
pub struct InMemoryContentRepository {
    objects: Arc<DashMap<(ObjectType, u64), ContentObject>>,
}

impl InMemoryContentRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an object
    pub fn insert(&self, object: ContentObject) {
        tracing::debug!(object_id = object.id, object_type = %object.object_type, "Object stored");
        self.objects.insert((object.object_type, object.id), object);
    }

    /// Remove an object, returning it if it existed
    pub fn remove(&self, object_id: u64, object_type: ObjectType) -> Option<ContentObject> {
        self.objects
            .remove(&(object_type, object_id))
            .map(|(_, object)| object)
    }

    /// Change the status of an existing object
    pub fn set_status(&self, object_id: u64, object_type: ObjectType, status: &str) -> bool {
        match self.objects.get_mut(&(object_type, object_id)) {
            Some(mut object) => {
                object.status = status.to_string();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[async_trait]
impl ContentRepository for InMemoryContentRepository {
    async fn fetch_object(
        &self,
        object_id: u64,
        object_type: ObjectType,
    ) -> Result<Option<ContentObject>> {
        Ok(self
            .objects
            .get(&(object_type, object_id))
            .map(|entry| entry.clone()))
    }

    async fn list_ids(
        &self,
        object_type: ObjectType,
        offset: usize,
        limit: usize,
    ) -> Result<Vec<u64>> {
        let mut ids: Vec<u64> = self
            .objects
            .iter()
            .filter(|entry| entry.key().0 == object_type)
            .map(|entry| entry.key().1)
            .collect();
        ids.sort_unstable();

        Ok(ids.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_with_status(&self, object_type: ObjectType, statuses: &[String]) -> Result<u64> {
        let count = self
            .objects
            .iter()
            .filter(|entry| {
                entry.key().0 == object_type && statuses.iter().any(|s| *s == entry.value().status)
            })
            .count();

        Ok(count as u64)
    }

    async fn authored_by(&self, user_id: u64, limit: usize) -> Result<Vec<ContentObject>> {
        let mut authored: Vec<ContentObject> = self
            .objects
            .iter()
            .filter(|entry| {
                entry.key().0 != ObjectType::Account && entry.value().author_id == Some(user_id)
            })
            .map(|entry| entry.value().clone())
            .collect();

        // Newest first
        authored.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        authored.truncate(limit);

        Ok(authored)
    }

    async fn taxonomy(&self) -> Result<Vec<TaxonomyTerm>> {
        let mut counts: HashMap<(String, TaxonomyKind), u64> = HashMap::new();

        for entry in self.objects.iter() {
            let object = entry.value();
            if object.object_type != ObjectType::Content {
                continue;
            }
            for tag in &object.tags {
                *counts.entry((tag.clone(), TaxonomyKind::Tag)).or_insert(0) += 1;
            }
            for category in &object.categories {
                *counts
                    .entry((category.clone(), TaxonomyKind::Category))
                    .or_insert(0) += 1;
            }
        }

        let mut terms: Vec<TaxonomyTerm> = counts
            .into_iter()
            .map(|((name, kind), count)| TaxonomyTerm { name, kind, count })
            .collect();
        terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Ok(terms)
    }
}
