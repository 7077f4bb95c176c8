use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// The kinds of objects that can be indexed and searched
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ObjectType {
    /// Articles and pages
    Content,
    /// Comments attached to content
    Comment,
    /// User profiles
    Account,
}

impl ObjectType {
    /// Every object type, in indexing order
    pub const ALL: [ObjectType; 3] = [ObjectType::Content, ObjectType::Comment, ObjectType::Account];

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::Content => "content",
            ObjectType::Comment => "comment",
            ObjectType::Account => "account",
        }
    }
}

/// Engagement counters maintained by the content repository
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Engagement {
    #[serde(default)]
    pub views: u64,
    #[serde(default)]
    pub comments: u64,
    #[serde(default)]
    pub likes: u64,
}

impl Engagement {
    /// Combined counter used for engagement ordering
    pub fn total(&self) -> u64 {
        self.views
            .saturating_add(self.comments)
            .saturating_add(self.likes)
    }
}

/// Current state of a source object as reported by the content repository.
///
/// Accounts use `title` for the display name and `body` for the profile text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentObject {
    pub id: u64,
    pub object_type: ObjectType,
    pub title: String,
    /// Body text, possibly containing markup
    pub body: String,
    /// Author-provided summary
    pub excerpt: Option<String>,
    /// Repository lifecycle status (`publish`, `draft`, `approved`, `spam`, ...)
    pub status: String,
    pub author_id: Option<u64>,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub categories: Vec<String>,
    pub thumbnail: Option<String>,
    pub permalink: Option<String>,
    /// Content a comment belongs to
    pub parent_id: Option<u64>,
    #[serde(default)]
    pub engagement: Engagement,
    /// Embedding vector stored alongside the object by the AI provider
    pub embedding: Option<Vec<f32>>,
}

impl ContentObject {
    /// Create an object with empty taxonomy, no engagement and no embedding
    pub fn new(
        id: u64,
        object_type: ObjectType,
        title: impl Into<String>,
        body: impl Into<String>,
        status: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            object_type,
            title: title.into(),
            body: body.into(),
            excerpt: None,
            status: status.into(),
            author_id: None,
            author_name: String::new(),
            created_at: now,
            modified_at: now,
            tags: Vec::new(),
            categories: Vec::new(),
            thumbnail: None,
            permalink: None,
            parent_id: None,
            engagement: Engagement::default(),
            embedding: None,
        }
    }

    pub fn with_author(mut self, author_id: u64, author_name: impl Into<String>) -> Self {
        self.author_id = Some(author_id);
        self.author_name = author_name.into();
        self
    }

    pub fn with_tags(mut self, tags: Vec<impl Into<String>>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_categories(mut self, categories: Vec<impl Into<String>>) -> Self {
        self.categories = categories.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self.modified_at = created_at;
        self
    }

    pub fn with_views(mut self, views: u64) -> Self {
        self.engagement.views = views;
        self
    }

    pub fn with_parent(mut self, parent_id: u64) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }
}

/// Lifecycle events emitted by the content repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ContentEvent {
    Published { object_id: u64, object_type: ObjectType },
    Updated { object_id: u64, object_type: ObjectType },
    Unpublished { object_id: u64, object_type: ObjectType },
    Deleted { object_id: u64, object_type: ObjectType },
}

impl ContentEvent {
    /// The object the event refers to
    pub fn target(&self) -> (u64, ObjectType) {
        match *self {
            ContentEvent::Published { object_id, object_type }
            | ContentEvent::Updated { object_id, object_type }
            | ContentEvent::Unpublished { object_id, object_type }
            | ContentEvent::Deleted { object_id, object_type } => (object_id, object_type),
        }
    }

    /// Whether the event removes the object from search
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            ContentEvent::Unpublished { .. } | ContentEvent::Deleted { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TaxonomyKind {
    Tag,
    Category,
}

/// A tag or category with its usage count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonomyTerm {
    pub name: String,
    pub kind: TaxonomyKind,
    pub count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_object_type_strings() {
        assert_eq!(ObjectType::Content.to_string(), "content");
        assert_eq!(ObjectType::from_str("Comment").unwrap(), ObjectType::Comment);
        assert!(ObjectType::from_str("post").is_err());
        assert_eq!(
            serde_json::to_string(&ObjectType::Account).unwrap(),
            "\"account\""
        );
    }

    #[test]
    fn test_event_target() {
        let event = ContentEvent::Deleted {
            object_id: 7,
            object_type: ObjectType::Comment,
        };
        assert_eq!(event.target(), (7, ObjectType::Comment));
        assert!(event.is_removal());
        assert!(!ContentEvent::Updated {
            object_id: 7,
            object_type: ObjectType::Comment
        }
        .is_removal());
    }

    #[test]
    fn test_engagement_total_saturates() {
        let engagement = Engagement {
            views: u64::MAX,
            comments: 3,
            likes: 1,
        };
        assert_eq!(engagement.total(), u64::MAX);
    }
}
