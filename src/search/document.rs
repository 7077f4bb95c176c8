//! Index entries and the Tantivy schema they are stored under

use crate::models::{ContentObject, Engagement, ObjectType};
use crate::search::error::{SearchError, SearchResult};
use crate::search::excerpt::{strip_markup, truncate_chars};
use crate::search::tokenizer::CJK_TOKENIZER;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tantivy::schema::*;
use tantivy::TantivyDocument;

/// Trait for documents that can be indexed and searched
pub trait SearchDocument {
    /// Convert to Tantivy document
    fn to_tantivy_doc(&self, fields: &IndexFields) -> SearchResult<TantivyDocument>;

    /// Get document ID
    fn document_id(&self) -> String;
}

/// Denormalized data carried with an entry for result rendering and ranking
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
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
}

/// One searchable row per (object id, object type)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexEntry {
    /// `{object_type}:{object_id}`
    pub id: String,
    pub object_id: u64,
    pub object_type: ObjectType,
    pub title: String,
    /// Plain text, markup stripped
    pub body: String,
    pub excerpt: String,
    pub author_id: Option<u64>,
    pub author_name: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub status: String,
    pub metadata: EntryMetadata,
}

impl IndexEntry {
    pub fn entry_id(object_type: ObjectType, object_id: u64) -> String {
        format!("{}:{}", object_type, object_id)
    }

    /// Normalize a source object into an entry.
    ///
    /// The result depends only on the object, so indexing an unchanged object
    /// twice yields the same entry.
    pub fn from_object(object: &ContentObject, excerpt_length: usize) -> Self {
        let body = strip_markup(&object.body);

        let excerpt = object
            .excerpt
            .as_deref()
            .map(strip_markup)
            .filter(|excerpt| !excerpt.is_empty())
            .unwrap_or_else(|| truncate_chars(&body, excerpt_length));

        Self {
            id: Self::entry_id(object.object_type, object.id),
            object_id: object.id,
            object_type: object.object_type,
            title: strip_markup(&object.title),
            body,
            excerpt,
            author_id: object.author_id,
            author_name: object.author_name.clone(),
            created_at: object.created_at,
            modified_at: object.modified_at,
            status: object.status.clone(),
            metadata: EntryMetadata {
                tags: object.tags.clone(),
                categories: object.categories.clone(),
                thumbnail: object.thumbnail.clone(),
                permalink: object.permalink.clone(),
                parent_id: object.parent_id,
                engagement: object.engagement,
            },
        }
    }

    /// Rebuild an entry from its stored payload
    pub fn from_tantivy_doc(doc: &TantivyDocument, fields: &IndexFields) -> SearchResult<Self> {
        let payload = doc
            .get_first(fields.payload)
            .and_then(|v| v.as_str())
            .ok_or_else(|| SearchError::SearchFailed("Stored document has no payload".to_string()))?;

        Ok(serde_json::from_str(payload)?)
    }
}

impl SearchDocument for IndexEntry {
    fn to_tantivy_doc(&self, fields: &IndexFields) -> SearchResult<TantivyDocument> {
        let mut doc = TantivyDocument::new();

        doc.add_text(fields.id, &self.id);
        doc.add_text(fields.object_type, self.object_type.as_str());
        doc.add_text(fields.status, &self.status);

        doc.add_text(fields.title, &self.title);
        doc.add_text(fields.body, &self.body);
        doc.add_text(fields.excerpt, &self.excerpt);
        doc.add_text(fields.author_name, &self.author_name);

        // Tags and categories (multi-valued)
        for term in self.metadata.tags.iter().chain(&self.metadata.categories) {
            doc.add_text(fields.taxonomy, term);
        }

        doc.add_date(
            fields.created_at,
            tantivy::DateTime::from_timestamp_secs(self.created_at.timestamp()),
        );

        doc.add_text(fields.payload, serde_json::to_string(self)?);

        Ok(doc)
    }

    fn document_id(&self) -> String {
        self.id.clone()
    }
}

/// Resolved schema fields
#[derive(Debug, Clone, Copy)]
pub struct IndexFields {
    pub id: Field,
    pub object_type: Field,
    pub status: Field,
    pub title: Field,
    pub body: Field,
    pub excerpt: Field,
    pub taxonomy: Field,
    pub author_name: Field,
    pub created_at: Field,
    pub payload: Field,
}

impl IndexFields {
    pub fn from_schema(schema: &Schema) -> SearchResult<Self> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|e| SearchError::IndexInitFailed(format!("Missing field {}: {}", name, e)))
        };

        Ok(Self {
            id: field("id")?,
            object_type: field("object_type")?,
            status: field("status")?,
            title: field("title")?,
            body: field("body")?,
            excerpt: field("excerpt")?,
            taxonomy: field("taxonomy")?,
            author_name: field("author_name")?,
            created_at: field("created_at")?,
            payload: field("payload")?,
        })
    }

    /// Fields searched by free-text queries
    pub fn text_fields(&self) -> Vec<Field> {
        vec![
            self.title,
            self.body,
            self.excerpt,
            self.taxonomy,
            self.author_name,
        ]
    }
}

/// Build the search schema for index entries
pub fn build_content_schema() -> Schema {
    let mut schema_builder = Schema::builder();

    // Identity and filters - untokenized
    schema_builder.add_text_field("id", STRING | STORED);
    schema_builder.add_text_field("object_type", STRING);
    schema_builder.add_text_field("status", STRING);

    // Full-text fields, segmented by the CJK-aware tokenizer
    let text = TextOptions::default().set_indexing_options(
        TextFieldIndexing::default()
            .set_tokenizer(CJK_TOKENIZER)
            .set_index_option(IndexRecordOption::WithFreqsAndPositions),
    );
    schema_builder.add_text_field("title", text.clone());
    schema_builder.add_text_field("body", text.clone());
    schema_builder.add_text_field("excerpt", text.clone());
    schema_builder.add_text_field("taxonomy", text.clone());
    schema_builder.add_text_field("author_name", text);

    schema_builder.add_date_field("created_at", INDEXED | STORED | FAST);

    // Whole entry as JSON
    schema_builder.add_text_field("payload", STORED);

    schema_builder.build()
}
