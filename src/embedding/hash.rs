//! Deterministic FNV-1a feature hashing embedder.
//!
//! Captures lexical overlap rather than meaning. Used when no model-backed
//! provider is configured and in tests.

use super::EmbeddingProvider;
use crate::error::{AppError, Result};
use async_trait::async_trait;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

pub const DEFAULT_DIMENSION: usize = 384;

const MIN_TOKEN_LEN: usize = 2;

/// Projects tokens into a fixed-dimension vector; each token adds +1 or -1
/// to the slot picked by its hash.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
    id: String,
}

impl HashEmbedder {
    /// A zero dimension is bumped to 1
    pub fn new(dimension: usize) -> Self {
        let dimension = dimension.max(1);
        Self {
            dimension,
            id: format!("fnv1a-{}", dimension),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn tokenize(text: &str) -> Vec<String> {
        text.to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|s| s.chars().count() >= MIN_TOKEN_LEN)
            .map(String::from)
            .collect()
    }

    fn fnv1a_hash(bytes: &[u8]) -> u64 {
        let mut hash = FNV_OFFSET_BASIS;
        for byte in bytes {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(FNV_PRIME);
        }
        hash
    }

    fn l2_normalize(vector: &mut [f32]) {
        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for x in vector.iter_mut() {
                *x /= norm;
            }
        }
    }

    /// Embed synchronously
    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut embedding = vec![0.0f32; self.dimension];

        for token in Self::tokenize(text) {
            let hash = Self::fnv1a_hash(token.as_bytes());
            let idx = (hash % self.dimension as u64) as usize;
            let sign = if (hash >> 63) == 0 { 1.0 } else { -1.0 };
            embedding[idx] += sign;
        }

        Self::l2_normalize(&mut embedding);
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        &self.id
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(AppError::Validation("cannot embed empty text".to_string()));
        }
        Ok(self.embed_text(text))
    }
}
