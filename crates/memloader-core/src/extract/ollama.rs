//! Extraction with a local Ollama server.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::prompt::{build_prompt, PromptStyle};
use super::{parse_response, MemoryExtractor, MAX_TOKENS, TEMPERATURE, TOP_P};
use crate::error::Result;
use crate::http::JsonClient;
use crate::transcript::ConversationChunk;
use crate::types::RawExtraction;

/// Ollama connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub model: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Prompt style; chosen from the model name when unset.
    pub prompt_style: Option<PromptStyle>,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            model: "nuextract".to_string(),
            timeout_secs: 300,
            prompt_style: None,
        }
    }
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f64,
    top_p: f64,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

#[derive(Serialize)]
struct PullRequest<'a> {
    name: &'a str,
    stream: bool,
}

/// Extractor backed by Ollama's `/api/generate`.
pub struct OllamaExtractor {
    config: OllamaConfig,
    style: PromptStyle,
    client: JsonClient,
}

impl OllamaExtractor {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = JsonClient::new(&config.base_url, Duration::from_secs(config.timeout_secs))?;
        let style = config.prompt_style.unwrap_or_else(|| PromptStyle::for_model(&config.model));
        Ok(Self { config, style, client })
    }

    /// Pull the model unless the server already has it.
    pub async fn ensure_model(&self) -> Result<()> {
        let tags: TagsResponse = self.client.get("/api/tags").await?;
        let wanted = &self.config.model;
        let available = tags
            .models
            .iter()
            .any(|m| m.name == *wanted || m.name.strip_suffix(":latest") == Some(wanted.as_str()));

        if available {
            info!("Model {} is available", wanted);
            return Ok(());
        }

        info!("Model {} not found on {}, pulling", wanted, self.client.base_url());
        let _: serde_json::Value = self
            .client
            .post(
                "/api/pull",
                &PullRequest {
                    name: wanted,
                    stream: false,
                },
            )
            .await?;
        info!("Pulled model {}", wanted);
        Ok(())
    }
}

#[async_trait]
impl MemoryExtractor for OllamaExtractor {
    fn name(&self) -> String {
        format!("ollama:{}", self.config.model)
    }

    async fn extract(&self, chunk: &ConversationChunk) -> Result<RawExtraction> {
        let request = GenerateRequest {
            model: &self.config.model,
            prompt: build_prompt(self.style, &chunk.title, &chunk.text),
            stream: false,
            options: GenerateOptions {
                temperature: TEMPERATURE,
                top_p: TOP_P,
                num_predict: MAX_TOKENS,
            },
        };
        let response: GenerateResponse = self.client.post("/api/generate", &request).await?;
        let memories = parse_response(&response.response)?;
        Ok(chunk.to_extraction(memories))
    }
}
