//! Search request types and parsing

use crate::models::ObjectType;
use crate::search::error::SearchError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which object types a search covers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    #[default]
    All,
    Only(ObjectType),
}

impl TypeFilter {
    /// Object types to query, in a fixed order
    pub fn object_types(&self) -> Vec<ObjectType> {
        match self {
            TypeFilter::All => ObjectType::ALL.to_vec(),
            TypeFilter::Only(object_type) => vec![*object_type],
        }
    }
}

impl fmt::Display for TypeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeFilter::All => write!(f, "all"),
            TypeFilter::Only(object_type) => write!(f, "{}", object_type),
        }
    }
}

impl FromStr for TypeFilter {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim();
        if value.is_empty() || value.eq_ignore_ascii_case("all") {
            return Ok(TypeFilter::All);
        }
        ObjectType::from_str(value)
            .map(TypeFilter::Only)
            .map_err(|_| SearchError::InvalidTypeFilter(s.to_string()))
    }
}

/// Result ordering
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderBy {
    #[default]
    Relevance,
    /// Newest first
    Date,
    /// Most engaged first
    Engagement,
}

impl fmt::Display for OrderBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OrderBy::Relevance => "relevance",
            OrderBy::Date => "date",
            OrderBy::Engagement => "engagement",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for OrderBy {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "relevance" => Ok(OrderBy::Relevance),
            "date" => Ok(OrderBy::Date),
            "engagement" => Ok(OrderBy::Engagement),
            _ => Err(SearchError::InvalidOrder(s.to_string())),
        }
    }
}

/// Main search request structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Raw query text
    pub query: String,

    /// 1-based page number
    pub page: usize,

    pub per_page: usize,

    pub type_filter: TypeFilter,

    pub order_by: OrderBy,
}

impl SearchRequest {
    /// Create a request for the first page of 10 results across all types
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            page: 1,
            per_page: 10,
            type_filter: TypeFilter::All,
            order_by: OrderBy::Relevance,
        }
    }

    pub fn with_page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn with_per_page(mut self, per_page: usize) -> Self {
        self.per_page = per_page;
        self
    }

    pub fn with_type(mut self, object_type: ObjectType) -> Self {
        self.type_filter = TypeFilter::Only(object_type);
        self
    }

    pub fn with_type_filter(mut self, type_filter: TypeFilter) -> Self {
        self.type_filter = type_filter;
        self
    }

    pub fn with_order(mut self, order_by: OrderBy) -> Self {
        self.order_by = order_by;
        self
    }

    /// Build a request from transport-level strings
    pub fn parse(
        query: impl Into<String>,
        type_filter: &str,
        order_by: &str,
        page: usize,
        per_page: usize,
    ) -> Result<Self, SearchError> {
        Ok(Self {
            query: query.into(),
            page,
            per_page,
            type_filter: type_filter.parse()?,
            order_by: order_by.parse()?,
        })
    }

    /// Offset of the first result on the requested page
    pub fn offset(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.per_page)
    }
}
