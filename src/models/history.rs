use super::ObjectType;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One executed query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    /// Assigned by the history store on insert
    pub id: u64,
    pub user_id: Option<u64>,
    /// Query text as typed (trimmed)
    pub query: String,
    pub search_time: DateTime<Utc>,
    pub results_count: u64,
    pub clicked_result_id: Option<u64>,
    pub clicked_result_type: Option<ObjectType>,
    pub ip: String,
    pub user_agent: String,
}

impl HistoryEntry {
    pub fn new(query: impl Into<String>, results_count: u64, context: &SearchContext) -> Self {
        Self {
            id: 0,
            user_id: context.user_id,
            query: query.into(),
            search_time: Utc::now(),
            results_count,
            clicked_result_id: None,
            clicked_result_type: None,
            ip: context.ip.clone(),
            user_agent: context.user_agent.clone(),
        }
    }

    pub fn has_click(&self) -> bool {
        self.clicked_result_id.is_some()
    }

    /// Identity of whoever ran the query: the user id, else the client ip
    pub fn searcher_key(&self) -> String {
        match self.user_id {
            Some(user_id) => format!("user:{}", user_id),
            None => format!("ip:{}", self.ip),
        }
    }

    /// Normalized query text used for grouping
    pub fn normalized_query(&self) -> String {
        normalize_query_text(&self.query)
    }
}

/// Search counter keyed by normalized query text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopularityEntry {
    pub query: String,
    pub search_count: u64,
    pub last_searched: DateTime<Utc>,
}

/// Who is searching
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchContext {
    pub user_id: Option<u64>,
    pub ip: String,
    pub user_agent: String,
}

impl SearchContext {
    pub fn anonymous(ip: impl Into<String>) -> Self {
        Self {
            user_id: None,
            ip: ip.into(),
            user_agent: String::new(),
        }
    }

    pub fn for_user(user_id: u64) -> Self {
        Self {
            user_id: Some(user_id),
            ip: String::new(),
            user_agent: String::new(),
        }
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }
}

/// A click on a search result, attached to the searcher's latest matching query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClickRecord {
    pub query: String,
    pub result_id: u64,
    pub result_type: ObjectType,
    pub user_id: Option<u64>,
    pub ip: String,
    pub clicked_at: DateTime<Utc>,
}

impl ClickRecord {
    /// Whether `entry` is a click-free search by the same searcher for the same query
    pub fn matches(&self, entry: &HistoryEntry) -> bool {
        if entry.has_click() || entry.normalized_query() != normalize_query_text(&self.query) {
            return false;
        }
        match (self.user_id, entry.user_id) {
            (Some(clicker), Some(searcher)) => clicker == searcher,
            (None, None) => self.ip == entry.ip,
            _ => false,
        }
    }
}

/// Lowercase and collapse whitespace
pub fn normalize_query_text(query: &str) -> String {
    query
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_query_text() {
        assert_eq!(normalize_query_text("  Vue   Router "), "vue router");
        assert_eq!(normalize_query_text(""), "");
    }

    #[test]
    fn test_searcher_key() {
        let by_user = HistoryEntry::new("vue", 1, &SearchContext::for_user(9));
        assert_eq!(by_user.searcher_key(), "user:9");

        let anonymous = HistoryEntry::new("vue", 1, &SearchContext::anonymous("10.0.0.1"));
        assert_eq!(anonymous.searcher_key(), "ip:10.0.0.1");
    }

    #[test]
    fn test_click_matching() {
        let entry = HistoryEntry::new("Vue Router", 3, &SearchContext::for_user(4));
        let click = ClickRecord {
            query: "vue  router".to_string(),
            result_id: 12,
            result_type: ObjectType::Content,
            user_id: Some(4),
            ip: String::new(),
            clicked_at: Utc::now(),
        };
        assert!(click.matches(&entry));

        let other_user = ClickRecord {
            user_id: Some(5),
            ..click.clone()
        };
        assert!(!other_user.matches(&entry));

        let mut clicked = entry.clone();
        clicked.clicked_result_id = Some(1);
        assert!(!click.matches(&clicked));
    }
}
