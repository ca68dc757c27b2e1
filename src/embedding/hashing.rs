//! Deterministic local embeddings for offline runs and tests.

use super::{EmbeddingClient, EmbeddingClientError};
use async_trait::async_trait;

/// Folds input bytes into a fixed-width, L2-normalized vector.
///
/// Identical text always maps to the identical vector, so retrieval over a hashed index is
/// reproducible without any model runtime.
#[derive(Debug, Clone, Copy)]
pub struct HashingEmbeddingClient {
    dimension: usize,
}

impl HashingEmbeddingClient {
    /// Client producing vectors of `dimension` components.
    pub const fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn encode(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0_f32; self.dimension];
        for (idx, byte) in text.bytes().enumerate() {
            // Mix the position in so anagrams land apart.
            let slot = (idx.wrapping_mul(31) ^ usize::from(byte)) % self.dimension;
            vector[slot] += f32::from(byte) / 255.0;
        }
        let norm = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|value| *value /= norm);
        }
        vector
    }
}

#[async_trait]
impl EmbeddingClient for HashingEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::Failed(
                "embedding dimension must be greater than zero".into(),
            ));
        }
        Ok(self.encode(text))
    }
}
