//! Autocomplete suggestions and spelling correction

use crate::content::ContentRepository;
use crate::error::Result;
use crate::models::{normalize_query_text, ObjectType};
use crate::search::config::SearchConfig;
use crate::search::index::IndexStore;
use crate::state::HistoryStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// How far back a user's own history is scanned
const USER_HISTORY_SCAN: usize = 200;

/// Popular queries considered as spelling corrections
const CORRECTION_POOL: usize = 500;

const MAX_CORRECTION_DISTANCE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSource {
    History,
    Popular,
    Title,
    Taxonomy,
}

/// A single autocomplete candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub text: String,
    pub source: SuggestionSource,
    /// Searches, uses or 1 for titles
    pub count: u64,
}

/// Merges candidates from history, popularity, titles and taxonomy
pub struct SuggestionEngine {
    config: SearchConfig,
    history: Arc<dyn HistoryStore>,
    store: Arc<dyn IndexStore>,
    repository: Arc<dyn ContentRepository>,
}

impl SuggestionEngine {
    pub fn new(
        config: SearchConfig,
        history: Arc<dyn HistoryStore>,
        store: Arc<dyn IndexStore>,
        repository: Arc<dyn ContentRepository>,
    ) -> Self {
        Self {
            config,
            history,
            store,
            repository,
        }
    }

    /// Up to `limit` suggestions for a partial query
    pub async fn suggest(&self, prefix: &str, limit: usize, user_id: Option<u64>) -> Vec<Suggestion> {
        let fragment = normalize_query_text(prefix);
        if !self.config.enable_suggestions || fragment.is_empty() || limit == 0 {
            return Vec::new();
        }

        let mut merged: Vec<Suggestion> = Vec::with_capacity(limit);
        let mut seen = HashSet::new();

        if let Some(user_id) = user_id {
            let own = self.from_user_history(user_id, &fragment).await;
            if fill(&mut merged, &mut seen, skip_failed(own, "history"), limit) {
                return merged;
            }
        }

        let popular = self.from_popularity(&fragment, limit).await;
        if fill(&mut merged, &mut seen, skip_failed(popular, "popular"), limit) {
            return merged;
        }

        let titles = self.from_titles(&fragment, limit).await;
        if fill(&mut merged, &mut seen, skip_failed(titles, "title"), limit) {
            return merged;
        }

        let taxonomy = self.from_taxonomy(&fragment).await;
        fill(&mut merged, &mut seen, skip_failed(taxonomy, "taxonomy"), limit);

        merged
    }

    async fn from_user_history(&self, user_id: u64, fragment: &str) -> Result<Vec<Suggestion>> {
        let entries = self.history.user_history(user_id, USER_HISTORY_SCAN).await?;

        let mut grouped: HashMap<String, (u64, DateTime<Utc>)> = HashMap::new();
        for entry in entries {
            let query = entry.normalized_query();
            if !query.contains(fragment) {
                continue;
            }
            let slot = grouped.entry(query).or_insert((0, entry.search_time));
            slot.0 += 1;
            slot.1 = slot.1.max(entry.search_time);
        }

        let mut ranked: Vec<(String, u64, DateTime<Utc>)> = grouped
            .into_iter()
            .map(|(query, (count, last))| (query, count, last))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.cmp(&a.1)
                .then_with(|| b.2.cmp(&a.2))
                .then_with(|| a.0.cmp(&b.0))
        });

        Ok(ranked
            .into_iter()
            .map(|(text, count, _)| Suggestion {
                text,
                source: SuggestionSource::History,
                count,
            })
            .collect())
    }

    async fn from_popularity(&self, fragment: &str, limit: usize) -> Result<Vec<Suggestion>> {
        Ok(self
            .history
            .popular_matching(fragment, limit)
            .await?
            .into_iter()
            .map(|entry| Suggestion {
                text: entry.query,
                source: SuggestionSource::Popular,
                count: entry.search_count,
            })
            .collect())
    }

    async fn from_titles(&self, fragment: &str, limit: usize) -> Result<Vec<Suggestion>> {
        let statuses = self.config.published_statuses.for_type(ObjectType::Content);
        let mut entries = self
            .store
            .title_matches(ObjectType::Content, statuses, fragment, limit.saturating_mul(2))
            .await?;

        // Token matches may be out of order or split across words
        entries.retain(|entry| entry.title.to_lowercase().contains(fragment));

        Ok(entries
            .into_iter()
            .map(|entry| Suggestion {
                text: entry.title,
                source: SuggestionSource::Title,
                count: 1,
            })
            .collect())
    }

    async fn from_taxonomy(&self, fragment: &str) -> Result<Vec<Suggestion>> {
        let mut terms = self.repository.taxonomy().await?;
        terms.retain(|term| term.name.to_lowercase().contains(fragment));
        terms.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));

        Ok(terms
            .into_iter()
            .map(|term| Suggestion {
                text: term.name,
                source: SuggestionSource::Taxonomy,
                count: term.count,
            })
            .collect())
    }

    /// A popular query the input was probably meant to be
    pub async fn correct(&self, query: &str) -> Option<String> {
        let query = normalize_query_text(query);
        if query.is_empty() {
            return None;
        }

        let popular = match self.history.popular(CORRECTION_POOL).await {
            Ok(popular) => popular,
            Err(e) => {
                tracing::warn!(error = %e, "Spelling correction unavailable");
                return None;
            }
        };

        let code = soundex(&query);
        let prefix: String = query.chars().take(2).collect();

        popular
            .into_iter()
            .filter(|entry| entry.query != query)
            .filter(|entry| {
                (code.is_some() && soundex(&entry.query) == code) || entry.query.starts_with(&prefix)
            })
            .map(|entry| {
                let distance = strsim::levenshtein(&query, &entry.query);
                (distance, entry)
            })
            .filter(|(distance, _)| *distance <= MAX_CORRECTION_DISTANCE)
            .min_by(|(da, a), (db, b)| da.cmp(db).then_with(|| b.search_count.cmp(&a.search_count)))
            .map(|(_, entry)| entry.query)
    }
}

/// Log and drop a failing source
fn skip_failed(result: Result<Vec<Suggestion>>, source: &str) -> Vec<Suggestion> {
    result.unwrap_or_else(|e| {
        tracing::warn!(source, error = %e, "Suggestion source skipped");
        Vec::new()
    })
}

/// Append unseen candidates; returns true once `limit` is reached
fn fill(
    merged: &mut Vec<Suggestion>,
    seen: &mut HashSet<String>,
    candidates: Vec<Suggestion>,
    limit: usize,
) -> bool {
    for candidate in candidates {
        if merged.len() >= limit {
            break;
        }
        if seen.insert(candidate.text.clone()) {
            merged.push(candidate);
        }
    }
    merged.len() >= limit
}

/// American Soundex over the ASCII letters of `text`
pub fn soundex(text: &str) -> Option<String> {
    fn digit(c: char) -> char {
        match c {
            'B' | 'F' | 'P' | 'V' => '1',
            'C' | 'G' | 'J' | 'K' | 'Q' | 'S' | 'X' | 'Z' => '2',
            'D' | 'T' => '3',
            'L' => '4',
            'M' | 'N' => '5',
            'R' => '6',
            _ => '0',
        }
    }

    let mut letters = text
        .chars()
        .filter(|c| c.is_ascii_alphabetic())
        .map(|c| c.to_ascii_uppercase());

    let first = letters.next()?;
    let mut code = String::with_capacity(4);
    code.push(first);
    let mut last = digit(first);

    for c in letters {
        if code.len() == 4 {
            break;
        }
        // H and W do not separate equal codes
        if c == 'H' || c == 'W' {
            continue;
        }
        let d = digit(c);
        if d != '0' && d != last {
            code.push(d);
        }
        last = d;
    }

    while code.len() < 4 {
        code.push('0');
    }
    Some(code)
}
