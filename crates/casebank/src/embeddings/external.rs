//! Embeddings via an OpenAI-compatible HTTP endpoint, with retry/backoff
//! and a query-embedding cache.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::num::NonZeroUsize;
use std::time::Duration;

use super::EmbeddingModel;
use crate::config::EmbeddingConfig;

pub struct ExternalEmbeddings {
    endpoint: String,
    api_key: String,
    model: String,
    dimension: usize,
    max_retries: u32,
    client: Client,
    /// Repeated live queries are common (agents retry the same phrasing),
    /// so query embeddings are cached. Document batches are not.
    query_cache: Mutex<LruCache<String, Vec<f32>>>,
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

impl ExternalEmbeddings {
    pub fn new(endpoint: String, config: &EmbeddingConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY not set for external embeddings"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        let cache_size = NonZeroUsize::new(config.cache_size.max(1))
            .expect("cache size is at least 1");

        Ok(Self {
            endpoint,
            api_key,
            model: config.model.clone(),
            dimension: config.dimension,
            max_retries: config.max_retries,
            client,
            query_cache: Mutex::new(LruCache::new(cache_size)),
        })
    }

    /// One embeddings call with exponential backoff. 429 and 5xx responses
    /// and network errors are retried; other client errors fail immediately.
    async fn request(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = json!({
            "model": self.model,
            "input": texts,
        });

        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            let response = self
                .client
                .post(&self.endpoint)
                .bearer_auth(&self.api_key)
                .json(&body)
                .send()
                .await;

            match response {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        let parsed: EmbeddingsResponse = response.json().await?;
                        return self.collect_vectors(parsed, texts.len());
                    }
                    let detail = response.text().await.unwrap_or_default();
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(anyhow!("Embeddings API error {}: {}", status, detail));
                        continue;
                    }
                    bail!("Embeddings API error {}: {}", status, detail);
                }
                Err(e) => {
                    last_err = Some(e.into());
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| anyhow!("Embedding failed after retries")))
    }

    fn collect_vectors(
        &self,
        response: EmbeddingsResponse,
        expected: usize,
    ) -> Result<Vec<Vec<f32>>> {
        if response.data.len() != expected {
            bail!(
                "Embeddings API returned {} vectors for {} inputs",
                response.data.len(),
                expected
            );
        }

        let mut items = response.data;
        items.sort_by_key(|item| item.index);

        let mut vectors = Vec::with_capacity(items.len());
        for item in items {
            if item.embedding.len() != self.dimension {
                bail!(
                    "Embedding dimension mismatch: expected {}, got {}",
                    self.dimension,
                    item.embedding.len()
                );
            }
            vectors.push(item.embedding);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingModel for ExternalEmbeddings {
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.request(texts).await
    }

    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        if let Some(cached) = self.query_cache.lock().get(text) {
            return Ok(cached.clone());
        }

        let vectors = self.request(&[text.to_string()]).await?;
        let vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("Empty embedding response"))?;

        self.query_cache
            .lock()
            .put(text.to_string(), vector.clone());
        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }
}
