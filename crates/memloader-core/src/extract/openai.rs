//! Extraction with the OpenAI chat completions API.
//!
//! Chunks go either one request at a time through [`MemoryExtractor`], or
//! all at once as a batch job ([`OpenAiExtractor::extract_batch`]), which
//! OpenAI bills at half price but may take hours to finish.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::prompt::{build_prompt, PromptStyle, SYSTEM_PROMPT};
use super::{parse_response, retry_async, ExtractionRun, MemoryExtractor, MAX_TOKENS, TEMPERATURE, TOP_P};
use crate::error::{Error, Result};
use crate::http::JsonClient;
use crate::transcript::ConversationChunk;
use crate::types::RawExtraction;

/// OpenAI connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
    pub timeout_secs: u64,
    /// Seconds between batch status checks.
    pub batch_poll_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.openai.com".to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout_secs: 120,
            batch_poll_secs: 10,
        }
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f64,
    top_p: f64,
    max_tokens: u32,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChatMessage,
}

// ─────────────────────────────────────────────────────────────────────────────
// Batch API wire types
// ─────────────────────────────────────────────────────────────────────────────

const CHAT_ENDPOINT: &str = "/v1/chat/completions";
const COMPLETION_WINDOW: &str = "24h";

/// One line of the batch input file.
#[derive(Serialize)]
struct BatchRequestLine<'a> {
    custom_id: String,
    method: &'static str,
    url: &'static str,
    body: ChatRequest<'a>,
}

/// One line of the batch output file.
#[derive(Deserialize)]
struct BatchResultLine {
    custom_id: String,
    #[serde(default)]
    response: Option<BatchResponse>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BatchResponse {
    #[serde(default)]
    status_code: u16,
    body: ChatResponse,
}

#[derive(Deserialize)]
struct UploadedFile {
    id: String,
}

#[derive(Serialize)]
struct CreateBatch<'a> {
    input_file_id: &'a str,
    endpoint: &'static str,
    completion_window: &'static str,
    metadata: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BatchJob {
    id: String,
    status: String,
    #[serde(default)]
    output_file_id: Option<String>,
}

fn custom_id(index: usize) -> String {
    format!("chunk-{}", index)
}

fn chunk_index_of(custom_id: &str) -> Option<usize> {
    custom_id.strip_prefix("chunk-")?.parse().ok()
}

/// Extractor backed by `/v1/chat/completions`.
pub struct OpenAiExtractor {
    config: OpenAiConfig,
    client: JsonClient,
}

impl OpenAiExtractor {
    /// Fails when no API key is configured.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::invalid_config("openai.api_key", "an OpenAI API key is required"))?;

        let client = JsonClient::new(&config.base_url, Duration::from_secs(config.timeout_secs))?
            .with_authorization(format!("Bearer {}", api_key));
        Ok(Self { config, client })
    }

    fn request<'a>(&'a self, chunk: &ConversationChunk) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system".into(),
                    content: Some(SYSTEM_PROMPT.into()),
                },
                ChatMessage {
                    role: "user".into(),
                    content: Some(build_prompt(PromptStyle::Template, &chunk.title, &chunk.text)),
                },
            ],
            temperature: TEMPERATURE,
            top_p: TOP_P,
            max_tokens: MAX_TOKENS,
        }
    }

    /// JSONL batch input, one chat request per chunk.
    fn batch_input(&self, chunks: &[ConversationChunk]) -> Result<String> {
        let mut jsonl = String::new();
        for (i, chunk) in chunks.iter().enumerate() {
            let line = BatchRequestLine {
                custom_id: custom_id(i),
                method: "POST",
                url: CHAT_ENDPOINT,
                body: self.request(chunk),
            };
            jsonl.push_str(&serde_json::to_string(&line)?);
            jsonl.push('\n');
        }
        Ok(jsonl)
    }

    /// Extract every chunk with one batch job: upload the requests, create
    /// the job, poll until it reaches a final state, then parse the output
    /// file. `on_status` receives each polled status.
    ///
    /// A job that fails, expires or is cancelled is an error. Individual
    /// requests that fail inside a completed job are counted in
    /// `failed_chunks`.
    pub async fn extract_batch(
        &self,
        chunks: &[ConversationChunk],
        mut on_status: impl FnMut(&str),
    ) -> Result<ExtractionRun> {
        if chunks.is_empty() {
            return Ok(ExtractionRun::default());
        }

        let input = self.batch_input(chunks)?;
        let part = reqwest::multipart::Part::text(input)
            .file_name("memloader_batch.jsonl")
            .mime_str("application/jsonl")?;
        let form = reqwest::multipart::Form::new().text("purpose", "batch").part("file", part);
        let file: UploadedFile = self.client.post_multipart("/v1/files", form).await?;
        info!("Uploaded batch input {} with {} requests", file.id, chunks.len());

        let job: BatchJob = self
            .client
            .post(
                "/v1/batches",
                &CreateBatch {
                    input_file_id: &file.id,
                    endpoint: CHAT_ENDPOINT,
                    completion_window: COMPLETION_WINDOW,
                    metadata: serde_json::json!({ "description": "memloader memory extraction" }),
                },
            )
            .await?;
        info!("Created batch job {}", job.id);

        let job = self.wait_for_batch(job, &mut on_status).await?;
        let Some(output_file_id) = job.output_file_id else {
            warn!("Batch {} completed without an output file", job.id);
            return Ok(ExtractionRun {
                extractions: Vec::new(),
                failed_chunks: chunks.len(),
            });
        };

        let output = self.client.get_text(&format!("/v1/files/{}/content", output_file_id)).await?;
        Ok(parse_batch_output(&output, chunks))
    }

    async fn wait_for_batch(&self, mut job: BatchJob, on_status: &mut impl FnMut(&str)) -> Result<BatchJob> {
        let poll = Duration::from_secs(self.config.batch_poll_secs);
        loop {
            on_status(&job.status);
            if job.status == "completed" {
                return Ok(job);
            }
            if matches!(job.status.as_str(), "failed" | "expired" | "cancelled" | "cancelling") {
                return Err(Error::Extraction(format!("Batch {} ended as {}", job.id, job.status)));
            }
            debug!("Batch {} is {}", job.id, job.status);

            tokio::time::sleep(poll).await;
            let path = format!("/v1/batches/{}", job.id);
            job = retry_async(3, poll, || self.client.get(&path)).await?;
        }
    }
}

/// Turn a batch output file into extractions, in chunk order. Lines that
/// carry an error, a non-200 status or unparseable content count as failed
/// chunks, as do chunks with no output line at all.
fn parse_batch_output(output: &str, chunks: &[ConversationChunk]) -> ExtractionRun {
    let mut slots: Vec<Option<RawExtraction>> = vec![None; chunks.len()];

    for line in output.lines().filter(|l| !l.trim().is_empty()) {
        let result: BatchResultLine = match serde_json::from_str(line) {
            Ok(result) => result,
            Err(e) => {
                warn!("Skipping unreadable batch output line: {}", e);
                continue;
            }
        };
        let Some(index) = chunk_index_of(&result.custom_id).filter(|i| *i < chunks.len()) else {
            warn!("Batch output has unknown custom_id {}", result.custom_id);
            continue;
        };
        if let Some(error) = result.error.filter(|e| !e.is_null()) {
            warn!("Batch request {} failed: {}", result.custom_id, error);
            continue;
        }

        let content = result
            .response
            .filter(|r| r.status_code == 200)
            .and_then(|r| r.body.choices.into_iter().next())
            .and_then(|c| c.message.content);
        let Some(content) = content else {
            warn!("Batch request {} returned no message content", result.custom_id);
            continue;
        };

        match parse_response(&content) {
            Ok(memories) => slots[index] = Some(chunks[index].to_extraction(memories)),
            Err(e) => warn!("Batch request {}: {}", result.custom_id, e),
        }
    }

    let extractions: Vec<RawExtraction> = slots.into_iter().flatten().collect();
    let failed_chunks = chunks.len() - extractions.len();
    info!(
        "Batch produced {} extractions ({} chunks failed)",
        extractions.len(),
        failed_chunks
    );
    ExtractionRun {
        extractions,
        failed_chunks,
    }
}

#[async_trait]
impl MemoryExtractor for OpenAiExtractor {
    fn name(&self) -> String {
        format!("openai:{}", self.config.model)
    }

    async fn extract(&self, chunk: &ConversationChunk) -> Result<RawExtraction> {
        let response: ChatResponse = self.client.post(CHAT_ENDPOINT, &self.request(chunk)).await?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Extraction("OpenAI response had no message content".into()))?;
        let memories = parse_response(&content)?;
        Ok(chunk.to_extraction(memories))
    }
}
