//! Core metrics structures for analytics

use crate::models::ObjectType;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A normalized query and how often it occurred
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryCount {
    pub query: String,
    pub count: u64,
}

/// A search result and how often it was clicked
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickedResult {
    pub result_id: u64,
    pub result_type: ObjectType,
    pub clicks: u64,
}

/// Search volume for one UTC day
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyVolume {
    pub date: NaiveDate,
    pub searches: u64,
    pub zero_results: u64,
    pub clicks: u64,
}

/// A query searched more often than in the previous window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendingQuery {
    pub query: String,
    pub current: u64,
    pub previous: u64,

    /// `(current - previous) / max(previous, 1)`
    pub growth: f64,
}

/// Search metrics over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsReport {
    pub window_days: u32,

    /// Inclusive start of the window (midnight UTC)
    pub period_start: DateTime<Utc>,

    /// Exclusive end of the window
    pub period_end: DateTime<Utc>,

    pub total_searches: u64,
    pub unique_queries: u64,

    /// Distinct user ids, plus distinct ips for anonymous searches
    pub unique_searchers: u64,

    /// Average results per search
    pub avg_results: f64,

    pub top_queries: Vec<QueryCount>,
    pub zero_result_queries: Vec<QueryCount>,
    pub zero_result_rate: f64,

    /// One point per day, oldest first, including days without searches
    pub daily_volume: Vec<DailyVolume>,

    /// Searches followed by a click, divided by all searches
    pub click_through_rate: f64,

    pub most_clicked: Vec<ClickedResult>,
    pub trending_queries: Vec<TrendingQuery>,
}

/// One user's searching over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSearchBehavior {
    pub user_id: u64,
    pub window_days: u32,
    pub total_searches: u64,
    pub unique_queries: u64,
    pub clicks: u64,
    pub click_through_rate: f64,
    pub top_queries: Vec<QueryCount>,
    pub last_search: Option<DateTime<Utc>>,
}
