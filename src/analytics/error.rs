//! Error types for analytics operations

use crate::error::AppError;

/// Result type for analytics operations
pub type AnalyticsResult<T> = std::result::Result<T, AnalyticsError>;

/// Errors that can occur in analytics operations
#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    /// Window outside the supported range
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    /// The history store could not be read
    #[error("Database error: {0}")]
    DatabaseError(String),
}

impl From<AppError> for AnalyticsError {
    fn from(err: AppError) -> Self {
        AnalyticsError::DatabaseError(err.to_string())
    }
}

impl From<AnalyticsError> for AppError {
    fn from(err: AnalyticsError) -> Self {
        match err {
            AnalyticsError::InvalidDateRange(msg) => AppError::Validation(msg),
            AnalyticsError::DatabaseError(msg) => AppError::Database(msg),
        }
    }
}
