//! Analytics engine over the history store

use crate::analytics::aggregation::QueryAggregator;
use crate::analytics::error::{AnalyticsError, AnalyticsResult};
use crate::analytics::metrics::{AnalyticsReport, UserSearchBehavior};
use crate::models::HistoryEntry;
use crate::state::HistoryStore;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use std::sync::Arc;

/// Longest supported window
pub const MAX_WINDOW_DAYS: u32 = 365;

/// Main analytics engine
pub struct AnalyticsEngine {
    history: Arc<dyn HistoryStore>,

    /// Length of ranked lists in reports
    top_limit: usize,
}

/// `[start, end)` covering `days` whole UTC days, the last one being today
struct Window {
    first_day: NaiveDate,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl Window {
    fn trailing(days: u32, now: DateTime<Utc>) -> AnalyticsResult<Self> {
        if days == 0 || days > MAX_WINDOW_DAYS {
            return Err(AnalyticsError::InvalidDateRange(format!(
                "days must be between 1 and {}, got {}",
                MAX_WINDOW_DAYS, days
            )));
        }

        let today = now.date_naive();
        let first_day = today - Duration::days(i64::from(days) - 1);
        let start = midnight(first_day);
        let end = midnight(today) + Duration::days(1);

        Ok(Self {
            first_day,
            start,
            end,
        })
    }

    /// The window of the same length immediately before this one
    fn previous(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        (self.start - (self.end - self.start), self.start)
    }
}

fn midnight(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

impl AnalyticsEngine {
    pub fn new(history: Arc<dyn HistoryStore>, top_limit: usize) -> Self {
        Self { history, top_limit }
    }

    async fn entries(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> AnalyticsResult<Vec<HistoryEntry>> {
        Ok(self.history.entries_between(start, end).await?)
    }

    /// Search metrics for the trailing `days` days
    pub async fn report(&self, days: u32) -> AnalyticsResult<AnalyticsReport> {
        let window = Window::trailing(days, Utc::now())?;
        let entries = self.entries(window.start, window.end).await?;

        let (previous_start, previous_end) = window.previous();
        let previous = self.entries(previous_start, previous_end).await?;

        let limit = self.top_limit;
        let report = AnalyticsReport {
            window_days: days,
            period_start: window.start,
            period_end: window.end,
            total_searches: entries.len() as u64,
            unique_queries: QueryAggregator::unique_queries(&entries),
            unique_searchers: QueryAggregator::unique_searchers(&entries),
            avg_results: QueryAggregator::average_results(&entries),
            top_queries: QueryAggregator::top_queries(&entries, limit),
            zero_result_queries: QueryAggregator::zero_result_queries(&entries, limit),
            zero_result_rate: QueryAggregator::zero_result_rate(&entries),
            daily_volume: QueryAggregator::daily_volume(&entries, window.first_day, days),
            click_through_rate: QueryAggregator::click_through_rate(&entries),
            most_clicked: QueryAggregator::most_clicked(&entries, limit),
            trending_queries: QueryAggregator::trending(&entries, &previous, limit),
        };

        tracing::debug!(
            days,
            total_searches = report.total_searches,
            "Analytics report generated"
        );

        Ok(report)
    }

    /// One user's searching for the trailing `days` days
    pub async fn user_behavior(&self, user_id: u64, days: u32) -> AnalyticsResult<UserSearchBehavior> {
        let window = Window::trailing(days, Utc::now())?;
        let mut entries = self.entries(window.start, window.end).await?;
        entries.retain(|entry| entry.user_id == Some(user_id));

        let clicks = QueryAggregator::clicks(&entries);

        Ok(UserSearchBehavior {
            user_id,
            window_days: days,
            total_searches: entries.len() as u64,
            unique_queries: QueryAggregator::unique_queries(&entries),
            clicks,
            click_through_rate: QueryAggregator::rate(clicks, entries.len() as u64),
            top_queries: QueryAggregator::top_queries(&entries, self.top_limit),
            last_search: entries.iter().map(|entry| entry.search_time).max(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClickRecord, ObjectType, SearchContext};
    use crate::state::InMemoryHistoryStore;

    async fn record(history: &InMemoryHistoryStore, query: &str, results: u64, ctx: &SearchContext, days_ago: i64) {
        let mut entry = HistoryEntry::new(query, results, ctx);
        entry.search_time = Utc::now() - Duration::days(days_ago);
        history.record_search(entry).await.unwrap();
    }

    #[test]
    fn test_window_bounds() {
        let now = Utc.with_ymd_and_hms(2024, 3, 10, 15, 30, 0).unwrap();
        let window = Window::trailing(7, now).unwrap();
        assert_eq!(window.start, Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap());
        assert_eq!(window.end, Utc.with_ymd_and_hms(2024, 3, 11, 0, 0, 0).unwrap());
        assert_eq!(window.previous().0, Utc.with_ymd_and_hms(2024, 2, 26, 0, 0, 0).unwrap());

        assert!(Window::trailing(0, now).is_err());
        assert!(Window::trailing(366, now).is_err());
    }

    #[tokio::test]
    async fn test_report() {
        let history = Arc::new(InMemoryHistoryStore::new());
        let user = SearchContext::for_user(1);
        let anon = SearchContext::anonymous("10.1.1.1");

        record(&history, "vue", 4, &user, 0).await;
        record(&history, "vue", 4, &anon, 1).await;
        record(&history, "zzzznotfound", 0, &anon, 0).await;
        record(&history, "ancient", 1, &user, 30).await;

        history
            .attach_click(
                &ClickRecord {
                    query: "vue".to_string(),
                    result_id: 5,
                    result_type: ObjectType::Content,
                    user_id: Some(1),
                    ip: String::new(),
                    clicked_at: Utc::now(),
                },
                std::time::Duration::from_secs(600),
            )
            .await
            .unwrap();

        let engine = AnalyticsEngine::new(history, 10);
        let report = engine.report(7).await.unwrap();

        assert_eq!(report.total_searches, 3);
        assert_eq!(report.unique_queries, 2);
        assert_eq!(report.unique_searchers, 2);
        assert_eq!(report.top_queries[0].query, "vue");
        assert_eq!(report.zero_result_queries[0].query, "zzzznotfound");
        assert_eq!(report.daily_volume.len(), 7);
        assert_eq!(report.daily_volume[6].zero_results, 1);
        assert!((report.click_through_rate - 1.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.most_clicked[0].result_id, 5);

        assert!(matches!(
            engine.report(0).await,
            Err(AnalyticsError::InvalidDateRange(_))
        ));
    }

    #[tokio::test]
    async fn test_user_behavior() {
        let history = Arc::new(InMemoryHistoryStore::new());
        let user = SearchContext::for_user(7);
        record(&history, "tokio", 2, &user, 0).await;
        record(&history, "Tokio", 2, &user, 0).await;
        record(&history, "serde", 2, &user, 2).await;
        record(&history, "other", 2, &SearchContext::for_user(8), 0).await;

        let engine = AnalyticsEngine::new(history, 5);
        let behavior = engine.user_behavior(7, 30).await.unwrap();

        assert_eq!(behavior.total_searches, 3);
        assert_eq!(behavior.unique_queries, 2);
        assert_eq!(behavior.clicks, 0);
        assert_eq!(behavior.click_through_rate, 0.0);
        assert_eq!(behavior.top_queries[0].query, "tokio");
        assert!(behavior.last_search.is_some());
    }
}
