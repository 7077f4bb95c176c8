//! Embedding provider boundary and vector similarity.
//!
//! Provider failures never reach the caller: [`EmbeddingService::embed`]
//! returns `None` on errors, timeouts, empty vectors and dimension mismatches,
//! and ranking falls back to lexical scoring.

mod hash;

pub use hash::HashEmbedder;

use crate::error::Result;
use crate::metrics::EMBEDDING_FALLBACKS_TOTAL;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// Source of text embedding vectors
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Provider name, used in logs
    fn name(&self) -> &str;

    /// Embed a piece of text
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Timeout- and failure-tolerant wrapper around an optional provider
#[derive(Clone)]
pub struct EmbeddingService {
    provider: Option<Arc<dyn EmbeddingProvider>>,
    timeout: Duration,
    dimension: Option<usize>,
}

impl EmbeddingService {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, timeout: Duration) -> Self {
        Self {
            provider: Some(provider),
            timeout,
            dimension: None,
        }
    }

    /// A service without a provider; every lookup yields `None`
    pub fn disabled() -> Self {
        Self {
            provider: None,
            timeout: Duration::from_secs(0),
            dimension: None,
        }
    }

    /// Reject vectors whose length differs from `dimension`
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Embed `text`, or `None` when no usable vector is available
    pub async fn embed(&self, text: &str) -> Option<Vec<f32>> {
        let provider = self.provider.as_ref()?;

        let vector = match tokio::time::timeout(self.timeout, provider.embed(text)).await {
            Ok(Ok(vector)) => vector,
            Ok(Err(e)) => {
                tracing::warn!(provider = provider.name(), error = %e, "Embedding provider failed, using lexical ranking");
                EMBEDDING_FALLBACKS_TOTAL.with_label_values(&["error"]).inc();
                return None;
            }
            Err(_) => {
                tracing::warn!(
                    provider = provider.name(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Embedding provider timed out, using lexical ranking"
                );
                EMBEDDING_FALLBACKS_TOTAL.with_label_values(&["timeout"]).inc();
                return None;
            }
        };

        if vector.is_empty() {
            EMBEDDING_FALLBACKS_TOTAL.with_label_values(&["empty"]).inc();
            return None;
        }

        if let Some(dimension) = self.dimension {
            if vector.len() != dimension {
                tracing::warn!(
                    provider = provider.name(),
                    expected = dimension,
                    actual = vector.len(),
                    "Embedding dimension mismatch"
                );
                EMBEDDING_FALLBACKS_TOTAL
                    .with_label_values(&["dimension_mismatch"])
                    .inc();
                return None;
            }
        }

        Some(vector)
    }
}

/// Cosine similarity of two vectors.
///
/// `None` when the lengths differ or the vectors are empty; `Some(0.0)` when
/// either magnitude is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Some(0.0);
    }

    Some((dot / (norm_a.sqrt() * norm_b.sqrt())) as f32)
}
