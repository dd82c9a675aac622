//! Offline feature-hashing embedder.
//!
//! The no-model fallback: each lowercase token is hashed into one of
//! `dimension` buckets and the resulting count vector is L2-normalized.
//! Deterministic across runs and processes, requires no network or model
//! files. Retrieval quality is far below a learned model, but the contract
//! (deterministic vectors, cosine-comparable) holds.

use anyhow::Result;
use async_trait::async_trait;
use std::hash::{Hash, Hasher};

use super::EmbeddingModel;

pub struct HashEmbeddings {
    dimension: usize,
}

impl HashEmbeddings {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            // DefaultHasher::new() uses fixed keys, so buckets are stable
            // across processes.
            let mut hasher = std::collections::hash_map::DefaultHasher::new();
            token.hash(&mut hasher);
            let bucket = (hasher.finish() % self.dimension as u64) as usize;
            vector[bucket] += 1.0;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > f32::EPSILON {
            for v in &mut vector {
                *v /= norm;
            }
        }
        vector
    }
}

#[async_trait]
impl EmbeddingModel for HashEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_text(text))
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
