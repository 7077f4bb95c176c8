//! Error types for search operations

use crate::error::AppError;

/// Shown in place of any failure that is not the caller's fault
pub const UNAVAILABLE_MESSAGE: &str = "Search is temporarily unavailable";

/// Result type for search operations
pub type SearchResult<T> = std::result::Result<T, SearchError>;

/// Errors that can occur during search operations
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Query shorter than the configured minimum, or without usable terms
    #[error("Search query must be at least {min} characters")]
    QueryTooShort { min: usize },

    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    #[error("Invalid type filter: {0}")]
    InvalidTypeFilter(String),

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    /// Index initialization failed
    #[error("Index initialization failed: {0}")]
    IndexInitFailed(String),

    /// Search execution failed
    #[error("Search execution failed: {0}")]
    SearchFailed(String),

    /// Document indexing failed
    #[error("Document indexing failed: {0}")]
    IndexingFailed(String),

    /// Tantivy error
    #[error("Tantivy error: {0}")]
    TantivyError(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    /// The content repository failed
    #[error("Content repository error: {0}")]
    Repository(String),
}

impl SearchError {
    /// Rejected input; nothing was read or written
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SearchError::QueryTooShort { .. }
                | SearchError::InvalidPagination(_)
                | SearchError::InvalidTypeFilter(_)
                | SearchError::InvalidOrder(_)
        )
    }

    /// Message safe to show to the person searching
    pub fn user_message(&self) -> String {
        if self.is_validation() {
            self.to_string()
        } else {
            UNAVAILABLE_MESSAGE.to_string()
        }
    }
}

impl From<tantivy::TantivyError> for SearchError {
    fn from(err: tantivy::TantivyError) -> Self {
        SearchError::TantivyError(err.to_string())
    }
}

impl From<serde_json::Error> for SearchError {
    fn from(err: serde_json::Error) -> Self {
        SearchError::Serialization(err.to_string())
    }
}

impl From<AppError> for SearchError {
    fn from(err: AppError) -> Self {
        SearchError::Repository(err.to_string())
    }
}

impl From<SearchError> for AppError {
    fn from(err: SearchError) -> Self {
        match err {
            e if e.is_validation() => AppError::Validation(e.to_string()),
            SearchError::Serialization(msg) => AppError::Serialization(msg),
            SearchError::Repository(msg) => AppError::integration("content_repository", msg),
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message() {
        let short = SearchError::QueryTooShort { min: 2 };
        assert!(short.is_validation());
        assert_eq!(short.user_message(), "Search query must be at least 2 characters");

        let storage = SearchError::SearchFailed("segment file missing".to_string());
        assert!(!storage.is_validation());
        assert_eq!(storage.user_message(), "Search is temporarily unavailable");
    }

    #[test]
    fn test_conversion_to_app_error() {
        let err: AppError = SearchError::InvalidPagination("page must be >= 1".into()).into();
        assert_eq!(err.error_code(), "VALIDATION_ERROR");

        let err: AppError = SearchError::Repository("connection reset".into()).into();
        assert_eq!(err.error_code(), "INTEGRATION_ERROR");

        let err: AppError = SearchError::IndexingFailed("writer killed".into()).into();
        assert_eq!(err.error_code(), "INTERNAL_ERROR");
    }
}
