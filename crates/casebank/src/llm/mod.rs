//! Text-generation collaborator: a single prompt-completion operation
//! backed by an external API.

pub mod external;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GenerationConfig;

pub use external::ExternalCompletions;

/// Wire dialect of the completions endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiFlavor {
    OpenAi,
    Anthropic,
}

/// The prompt-completion contract. Fallible with a generic error; callers
/// of the assist facade recover failures locally with fallback text.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    async fn complete(&self, prompt: &str, max_tokens: usize, temperature: f32)
        -> Result<String>;
}

/// Build the completion model selected by the configuration; `None` when
/// generation is disabled.
pub fn create_completions(config: &GenerationConfig) -> Result<Option<Box<dyn CompletionModel>>> {
    match &config.endpoint {
        Some(endpoint) => Ok(Some(Box::new(ExternalCompletions::new(
            config.api,
            endpoint.clone(),
            config.model.clone(),
            config.timeout_secs,
        )?))),
        None => Ok(None),
    }
}
