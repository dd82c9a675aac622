//! External completion providers: OpenAI-compatible and Anthropic wire
//! formats, selected by [`ApiFlavor`].

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use std::time::Duration;

use super::{ApiFlavor, CompletionModel};

pub struct ExternalCompletions {
    flavor: ApiFlavor,
    endpoint: String,
    api_key: String,
    model: String,
    client: Client,
}

impl ExternalCompletions {
    pub fn new(
        flavor: ApiFlavor,
        endpoint: String,
        model: String,
        timeout_secs: u64,
    ) -> Result<Self> {
        let key_var = match flavor {
            ApiFlavor::OpenAi => "OPENAI_API_KEY",
            ApiFlavor::Anthropic => "ANTHROPIC_API_KEY",
        };
        let api_key =
            std::env::var(key_var).map_err(|_| anyhow!("{} not set for completions", key_var))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(15))
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            flavor,
            endpoint,
            api_key,
            model,
            client,
        })
    }

    async fn openai_complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "messages": [{"role": "user", "content": prompt}],
            "max_tokens": max_tokens,
            "temperature": temperature,
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Completions API error {}: {}", status, detail));
        }

        let value: Value = response.json().await?;
        value["choices"][0]["message"]["content"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Completions response missing choices[0].message.content"))
    }

    async fn anthropic_complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String> {
        let body = json!({
            "model": self.model,
            "max_tokens": max_tokens,
            "temperature": temperature,
            "messages": [{"role": "user", "content": prompt}],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("Completions API error {}: {}", status, detail));
        }

        let value: Value = response.json().await?;
        value["content"][0]["text"]
            .as_str()
            .map(|s| s.trim().to_string())
            .ok_or_else(|| anyhow!("Completions response missing content[0].text"))
    }
}

#[async_trait]
impl CompletionModel for ExternalCompletions {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<String> {
        match self.flavor {
            ApiFlavor::OpenAi => self.openai_complete(prompt, max_tokens, temperature).await,
            ApiFlavor::Anthropic => {
                self.anthropic_complete(prompt, max_tokens, temperature).await
            }
        }
    }
}
