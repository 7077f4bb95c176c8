//! Pure aggregations over history entries

use crate::analytics::metrics::{ClickedResult, DailyVolume, QueryCount, TrendingQuery};
use crate::models::{HistoryEntry, ObjectType};
use chrono::{Duration, NaiveDate};
use std::collections::{HashMap, HashSet};

/// Metrics aggregator for query history
pub struct QueryAggregator;

impl QueryAggregator {
    /// Occurrences per normalized query
    pub fn query_counts<'a>(entries: impl IntoIterator<Item = &'a HistoryEntry>) -> HashMap<String, u64> {
        let mut counts = HashMap::new();
        for entry in entries {
            *counts.entry(entry.normalized_query()).or_insert(0) += 1;
        }
        counts
    }

    /// Most frequent queries; ties by query text
    pub fn top_queries(entries: &[HistoryEntry], limit: usize) -> Vec<QueryCount> {
        Self::ranked(Self::query_counts(entries), limit)
    }

    /// Most frequent queries that returned nothing
    pub fn zero_result_queries(entries: &[HistoryEntry], limit: usize) -> Vec<QueryCount> {
        let zero = entries.iter().filter(|entry| entry.results_count == 0);
        Self::ranked(Self::query_counts(zero), limit)
    }

    fn ranked(counts: HashMap<String, u64>, limit: usize) -> Vec<QueryCount> {
        let mut ranked: Vec<QueryCount> = counts
            .into_iter()
            .map(|(query, count)| QueryCount { query, count })
            .collect();
        ranked.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.query.cmp(&b.query)));
        ranked.truncate(limit);
        ranked
    }

    pub fn unique_queries(entries: &[HistoryEntry]) -> u64 {
        entries
            .iter()
            .map(HistoryEntry::normalized_query)
            .collect::<HashSet<_>>()
            .len() as u64
    }

    pub fn unique_searchers(entries: &[HistoryEntry]) -> u64 {
        entries
            .iter()
            .map(HistoryEntry::searcher_key)
            .collect::<HashSet<_>>()
            .len() as u64
    }

    pub fn average_results(entries: &[HistoryEntry]) -> f64 {
        if entries.is_empty() {
            return 0.0;
        }
        let total: u64 = entries.iter().map(|entry| entry.results_count).sum();
        total as f64 / entries.len() as f64
    }

    pub fn clicks(entries: &[HistoryEntry]) -> u64 {
        entries.iter().filter(|entry| entry.has_click()).count() as u64
    }

    /// `part / total`, 0 when there is nothing to divide
    pub fn rate(part: u64, total: u64) -> f64 {
        if total == 0 {
            0.0
        } else {
            part as f64 / total as f64
        }
    }

    pub fn click_through_rate(entries: &[HistoryEntry]) -> f64 {
        Self::rate(Self::clicks(entries), entries.len() as u64)
    }

    pub fn zero_result_rate(entries: &[HistoryEntry]) -> f64 {
        let zero = entries.iter().filter(|entry| entry.results_count == 0).count() as u64;
        Self::rate(zero, entries.len() as u64)
    }

    /// One point per day from `first_day`, `days` points long
    pub fn daily_volume(entries: &[HistoryEntry], first_day: NaiveDate, days: u32) -> Vec<DailyVolume> {
        let mut volume: Vec<DailyVolume> = (0..days)
            .map(|offset| DailyVolume {
                date: first_day + Duration::days(i64::from(offset)),
                searches: 0,
                zero_results: 0,
                clicks: 0,
            })
            .collect();

        for entry in entries {
            let offset = (entry.search_time.date_naive() - first_day).num_days();
            let Some(point) = usize::try_from(offset).ok().and_then(|i| volume.get_mut(i)) else {
                continue;
            };
            point.searches += 1;
            if entry.results_count == 0 {
                point.zero_results += 1;
            }
            if entry.has_click() {
                point.clicks += 1;
            }
        }

        volume
    }

    /// Results clicked most often; ties by type then id
    pub fn most_clicked(entries: &[HistoryEntry], limit: usize) -> Vec<ClickedResult> {
        let mut clicks: HashMap<(ObjectType, u64), u64> = HashMap::new();
        for entry in entries {
            if let (Some(result_id), Some(result_type)) =
                (entry.clicked_result_id, entry.clicked_result_type)
            {
                *clicks.entry((result_type, result_id)).or_insert(0) += 1;
            }
        }

        let mut ranked: Vec<ClickedResult> = clicks
            .into_iter()
            .map(|((result_type, result_id), clicks)| ClickedResult {
                result_id,
                result_type,
                clicks,
            })
            .collect();
        ranked.sort_by(|a, b| {
            b.clicks
                .cmp(&a.clicks)
                .then_with(|| a.result_type.cmp(&b.result_type))
                .then_with(|| a.result_id.cmp(&b.result_id))
        });
        ranked.truncate(limit);
        ranked
    }

    /// Queries searched more in `current` than in `previous`, fastest growing first
    pub fn trending(current: &[HistoryEntry], previous: &[HistoryEntry], limit: usize) -> Vec<TrendingQuery> {
        let before = Self::query_counts(previous);

        let mut trending: Vec<TrendingQuery> = Self::query_counts(current)
            .into_iter()
            .filter_map(|(query, now)| {
                let then = before.get(&query).copied().unwrap_or(0);
                (now > then).then(|| TrendingQuery {
                    growth: (now - then) as f64 / then.max(1) as f64,
                    query,
                    current: now,
                    previous: then,
                })
            })
            .collect();

        trending.sort_by(|a, b| {
            b.growth
                .total_cmp(&a.growth)
                .then_with(|| b.current.cmp(&a.current))
                .then_with(|| a.query.cmp(&b.query))
        });
        trending.truncate(limit);
        trending
    }
}
