//! Text embedding
//!
//! The store only deals in vectors; whatever turns answer text into a vector
//! sits behind [`Embedder`]. [`HashEmbedder`] is a local, model-free
//! implementation used by the CLI and tests.

use crate::error::{Result, VaultError};
use crate::vector::math::l2_normalize;

pub trait Embedder {
    /// Length of every vector this embedder produces
    fn dimension(&self) -> usize;

    /// Embed one text into a unit-length vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>>;

    fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        texts.iter().map(|text| self.embed(text)).collect()
    }
}

/// Feature-hashing bag-of-words embedder
///
/// Each lowercase token is hashed into one of `dimension` buckets and the
/// bucket counts are normalized. Texts that share words land close together.
#[derive(Debug, Clone)]
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(VaultError::Configuration(
                "embedding dimension must be at least 1".to_string(),
            ));
        }
        Ok(Self { dimension })
    }

    fn bucket(&self, token: &str) -> usize {
        (fnv1a(token.as_bytes()) % self.dimension as u64) as usize
    }
}

impl Embedder for HashEmbedder {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimension];

        let lower = text.to_lowercase();
        for token in lower
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            embedding[self.bucket(token)] += 1.0;
        }

        l2_normalize(&mut embedding).map_err(|_| {
            VaultError::InvalidVector("text contains no words to embed".to_string())
        })?;
        Ok(embedding)
    }
}

// FNV-1a, stable across builds so stored vectors stay comparable.
fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    bytes.iter().fold(OFFSET, |hash, &b| (hash ^ b as u64).wrapping_mul(PRIME))
}
