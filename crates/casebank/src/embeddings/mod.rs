pub mod external;
pub mod hashing;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::EmbeddingConfig;

pub use external::ExternalEmbeddings;
pub use hashing::HashEmbeddings;

/// Embedding collaborator. Must be deterministic for identical input text
/// and model version.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    /// Batch embed digest texts for ingestion, one vector per input in
    /// the same order.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Embed a single search query.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embedding vector dimension.
    fn dimension(&self) -> usize;
}

/// Build the embedding model selected by the configuration: an external
/// OpenAI-compatible endpoint when one is configured, the offline
/// feature-hashing embedder otherwise.
pub fn create_embeddings(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingModel>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Box::new(ExternalEmbeddings::new(endpoint.clone(), config)?)),
        None => Ok(Box::new(HashEmbeddings::new(config.dimension))),
    }
}
