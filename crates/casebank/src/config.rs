use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RagConfig {
    /// Base path of the knowledge-base snapshot pair (`<base>.json` +
    /// `<base>.index`). The only externally configured setting the core
    /// depends on.
    pub knowledge_base_path: PathBuf,
    pub embedding: EmbeddingConfig,
    pub search: SearchConfig,
    pub generation: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingConfig {
    /// OpenAI-compatible embeddings endpoint; `None` selects the offline
    /// feature-hashing embedder.
    pub endpoint: Option<String>,
    pub model: String,
    pub dimension: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Query-embedding LRU cache entries.
    pub cache_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default k for similarity queries.
    pub default_k: usize,
    /// Candidates fetched when assembling resolution suggestions.
    pub suggestion_search_k: usize,
    /// Template suggestions per category.
    pub template_limit: usize,
    /// Similar-case suggestions.
    pub similar_case_limit: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Completions endpoint; `None` disables generation and the engine
    /// falls back to draft/acknowledgment responses.
    pub endpoint: Option<String>,
    pub api: crate::llm::ApiFlavor,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    /// Hard deadline for one completion call; a timeout is recovered with
    /// a fallback response, never surfaced to the caller.
    pub timeout_secs: u64,
}

impl RagConfig {
    /// Validate config values, returning errors for clearly broken configurations.
    pub fn validate(&self) -> Result<(), String> {
        if self.embedding.dimension == 0 {
            return Err("embedding.dimension must be > 0".into());
        }
        if self.search.default_k == 0 {
            return Err("search.default_k must be > 0".into());
        }
        if self.search.suggestion_search_k == 0 {
            return Err("search.suggestion_search_k must be > 0".into());
        }
        if !(0.0..=2.0).contains(&self.generation.temperature) {
            return Err("generation.temperature must be in [0.0, 2.0]".into());
        }
        if self.generation.timeout_secs == 0 {
            return Err("generation.timeout_secs must be > 0".into());
        }
        Ok(())
    }

    /// Load config from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file: {}", e))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse config: {}", e))?;
        config.validate()?;
        Ok(config)
    }
}

impl Default for RagConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("casebank");

        Self {
            knowledge_base_path: data_dir.join("knowledge_base"),
            embedding: EmbeddingConfig {
                endpoint: None,
                model: "text-embedding-3-small".to_string(),
                dimension: 256,
                timeout_secs: 30,
                max_retries: 3,
                cache_size: 1000,
            },
            search: SearchConfig {
                default_k: 5,
                suggestion_search_k: 10,
                template_limit: 2,
                similar_case_limit: 3,
            },
            generation: GenerationConfig {
                endpoint: None,
                api: crate::llm::ApiFlavor::OpenAi,
                model: "gpt-4o-mini".to_string(),
                max_tokens: 500,
                temperature: 0.7,
                timeout_secs: 30,
            },
        }
    }
}
