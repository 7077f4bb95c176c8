//! Query analytics over the search history log
//!
//! All computations are read-only aggregations over [`HistoryEntry`] rows for
//! a trailing window of whole UTC days.
//!
//! # Metrics
//!
//! - **Volume**: total searches, unique queries, unique searchers, daily trend
//! - **Quality**: average results per search, zero-result queries and rate
//! - **Engagement**: click-through rate, most-clicked results
//! - **Trends**: queries growing against the previous window
//! - **Per user**: search count, distinct queries, clicks, last search
//!
//! # Example
//!
//! ```no_run
//! use content_search::analytics::AnalyticsEngine;
//! use content_search::state::create_in_memory_history_store;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let engine = AnalyticsEngine::new(create_in_memory_history_store(), 10);
//!
//!     let report = engine.report(7).await?;
//!     println!("{} searches, CTR {:.2}", report.total_searches, report.click_through_rate);
//!
//!     Ok(())
//! }
//! ```
//!
//! [`HistoryEntry`]: crate::models::HistoryEntry

mod aggregation;
mod engine;
mod error;
mod metrics;

pub use aggregation::QueryAggregator;
pub use engine::{AnalyticsEngine, MAX_WINDOW_DAYS};
pub use error::{AnalyticsError, AnalyticsResult};
pub use metrics::{
    AnalyticsReport, ClickedResult, DailyVolume, QueryCount, TrendingQuery, UserSearchBehavior,
};
