//! Query normalization and term extraction, plus the index-side tokenizer
//! that segments ideograph runs the same way for documents and queries

use crate::search::config::SearchConfig;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tantivy::tokenizer::{
    LowerCaser, RemoveLongFilter, TextAnalyzer, Token, TokenStream, Tokenizer,
};
use tantivy::Index;

/// Name the text fields' tokenizer is registered under
pub const CJK_TOKENIZER: &str = "cjk";

/// Anything that is not a word character, whitespace or an ideograph
static DISALLOWED: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[^\w\s\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}]").unwrap()
});

static IDEOGRAPH_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Han}\p{Hiragana}\p{Katakana}\p{Hangul}]+").unwrap());

/// A query split into search terms
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedQuery {
    /// Input as given
    pub original: String,
    /// Terms joined by single spaces
    pub normalized: String,
    /// Unique terms in first-occurrence order, synonyms appended
    pub terms: Vec<String>,
}

impl ProcessedQuery {
    /// No usable terms; the caller treats this as too short
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// Turns raw input into [`ProcessedQuery`] values
#[derive(Debug, Clone)]
pub struct QueryProcessor {
    min_term_length: usize,
    synonyms: Option<HashMap<String, Vec<String>>>,
}

impl QueryProcessor {
    pub fn new(config: &SearchConfig) -> Self {
        let synonyms = config.enable_synonyms.then(|| {
            config
                .synonyms
                .iter()
                .map(|(term, synonyms)| {
                    (
                        term.to_lowercase(),
                        synonyms.iter().map(|s| s.to_lowercase()).collect(),
                    )
                })
                .collect()
        });

        Self {
            min_term_length: config.min_term_length,
            synonyms,
        }
    }

    pub fn process(&self, raw: &str) -> ProcessedQuery {
        let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let lowered = collapsed.to_lowercase();
        let cleaned = DISALLOWED.replace_all(&lowered, " ");

        let mut seen = HashSet::new();
        let mut terms = Vec::new();

        let whitespace_terms = cleaned
            .split_whitespace()
            .filter(|term| term.chars().count() >= self.min_term_length);

        // Ideograph runs count regardless of length
        let ideograph_terms = IDEOGRAPH_RUN.find_iter(&cleaned).map(|m| m.as_str());

        for term in whitespace_terms.chain(ideograph_terms) {
            if seen.insert(term.to_string()) {
                terms.push(term.to_string());
            }
        }

        let normalized = terms.join(" ");

        if let Some(table) = &self.synonyms {
            let expansions: Vec<String> = terms
                .iter()
                .filter_map(|term| table.get(term))
                .flatten()
                .cloned()
                .collect();
            for synonym in expansions {
                if seen.insert(synonym.clone()) {
                    terms.push(synonym);
                }
            }
        }

        ProcessedQuery {
            original: raw.to_string(),
            normalized,
            terms,
        }
    }
}

/// Splits text into alphanumeric words; ideograph runs become overlapping
/// character bigrams (a lone ideograph stays a unigram)
#[derive(Debug, Clone, Default)]
pub struct CjkTokenizer;

pub struct CjkTokenStream {
    tokens: Vec<Token>,
    next: usize,
}

impl Tokenizer for CjkTokenizer {
    type TokenStream<'a> = CjkTokenStream;

    fn token_stream<'a>(&'a mut self, text: &'a str) -> CjkTokenStream {
        CjkTokenStream {
            tokens: segment(text),
            next: 0,
        }
    }
}

impl TokenStream for CjkTokenStream {
    fn advance(&mut self) -> bool {
        if self.next < self.tokens.len() {
            self.next += 1;
            true
        } else {
            false
        }
    }

    fn token(&self) -> &Token {
        &self.tokens[self.next.saturating_sub(1)]
    }

    fn token_mut(&mut self) -> &mut Token {
        let current = self.next.saturating_sub(1);
        &mut self.tokens[current]
    }
}

/// Register [`CjkTokenizer`] on an index; needed after every open since
/// tokenizers are not persisted
pub fn register_tokenizers(index: &Index) {
    index.tokenizers().register(
        CJK_TOKENIZER,
        TextAnalyzer::builder(CjkTokenizer)
            .filter(RemoveLongFilter::limit(40))
            .filter(LowerCaser)
            .build(),
    );
}

/// Lowercased terms the index stores for `text`
pub fn index_tokens(text: &str) -> Vec<String> {
    segment(&text.to_lowercase())
        .into_iter()
        .map(|token| token.text)
        .collect()
}

fn segment(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut cursor = 0;

    for run in IDEOGRAPH_RUN.find_iter(text) {
        push_words(&text[cursor..run.start()], cursor, &mut tokens);
        push_bigrams(run.as_str(), run.start(), &mut tokens);
        cursor = run.end();
    }
    push_words(&text[cursor..], cursor, &mut tokens);

    tokens
}

fn push_token(tokens: &mut Vec<Token>, offset_from: usize, offset_to: usize, text: &str) {
    let position = tokens.len();
    tokens.push(Token {
        offset_from,
        offset_to,
        position,
        text: text.to_string(),
        position_length: 1,
    });
}

fn push_words(segment: &str, base: usize, tokens: &mut Vec<Token>) {
    let mut start = None;
    for (i, c) in segment.char_indices() {
        if c.is_alphanumeric() {
            start.get_or_insert(i);
        } else if let Some(from) = start.take() {
            push_token(tokens, base + from, base + i, &segment[from..i]);
        }
    }
    if let Some(from) = start {
        push_token(tokens, base + from, base + segment.len(), &segment[from..]);
    }
}

fn push_bigrams(run: &str, base: usize, tokens: &mut Vec<Token>) {
    let chars: Vec<(usize, char)> = run.char_indices().collect();
    if chars.len() == 1 {
        push_token(tokens, base, base + run.len(), run);
        return;
    }

    for pair in chars.windows(2) {
        let from = pair[0].0;
        let to = pair[1].0 + pair[1].1.len_utf8();
        push_token(tokens, base + from, base + to, &run[from..to]);
    }
}
