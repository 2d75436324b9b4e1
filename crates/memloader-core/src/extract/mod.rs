//! Memory extraction from conversation chunks.
//!
//! An extractor sends one chunk to a language model and returns whatever
//! memory items the model proposed, unvalidated. Validation and filtering
//! happen later in [`crate::normalize`] and [`crate::consolidation`].

pub mod prompt;

#[cfg(feature = "client")]
mod ollama;
#[cfg(feature = "client")]
mod openai;

#[cfg(feature = "client")]
pub use ollama::{OllamaConfig, OllamaExtractor};
#[cfg(feature = "client")]
pub use openai::{OpenAiConfig, OpenAiExtractor};
pub use prompt::PromptStyle;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::transcript::ConversationChunk;
use crate::types::{RawExtraction, RawMemory};

/// Generation parameters shared by every provider.
pub(crate) const TEMPERATURE: f64 = 0.3;
pub(crate) const TOP_P: f64 = 0.9;
pub(crate) const MAX_TOKENS: u32 = 2000;

/// Supported extraction backends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Ollama,
    OpenAi,
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Provider::Ollama => write!(f, "ollama"),
            Provider::OpenAi => write!(f, "openai"),
        }
    }
}

impl std::str::FromStr for Provider {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Provider::Ollama),
            "openai" => Ok(Provider::OpenAi),
            _ => Err(format!("Invalid provider: {}", s)),
        }
    }
}

/// Proposes memory items for one chunk of a conversation.
#[async_trait]
pub trait MemoryExtractor: Send + Sync {
    /// Short name for logs, e.g. `ollama:nuextract`.
    fn name(&self) -> String;

    /// Extract raw memory items from a chunk.
    async fn extract(&self, chunk: &ConversationChunk) -> Result<RawExtraction>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Response Parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Pull memory items out of a model reply.
///
/// Models often wrap the JSON in prose or code fences, so the first JSON
/// object or array in the text is used. Accepts `{"memories": [...]}` or a
/// bare array. Items that are not objects become empty [`RawMemory`] values
/// so they are counted as malformed downstream.
pub fn parse_response(text: &str) -> Result<Vec<RawMemory>> {
    let value = find_json(text).ok_or_else(|| Error::Extraction("No JSON found in model response".into()))?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("memories") {
            Some(Value::Array(items)) => items,
            Some(Value::Null) | None => Vec::new(),
            Some(other) => {
                return Err(Error::Extraction(format!("Expected a memories array, got {}", other)));
            }
        },
        other => return Err(Error::Extraction(format!("Unexpected JSON in model response: {}", other))),
    };

    Ok(items
        .into_iter()
        .map(|item| {
            serde_json::from_value(item).unwrap_or_else(|e| {
                debug!("Unreadable memory item: {}", e);
                RawMemory::default()
            })
        })
        .collect())
}

fn find_json(text: &str) -> Option<Value> {
    if let Ok(value) = serde_json::from_str::<Value>(text.trim()) {
        return Some(value);
    }

    let object = span(text, '{', '}');
    let array = span(text, '[', ']');

    // Try whichever opens first, then the other
    let mut spans: Vec<(usize, usize)> = [object, array].into_iter().flatten().collect();
    spans.sort_unstable();
    spans
        .into_iter()
        .find_map(|(start, end)| serde_json::from_str(&text[start..end]).ok())
}

fn span(text: &str, open: char, close: char) -> Option<(usize, usize)> {
    let start = text.find(open)?;
    let end = text.rfind(close)? + close.len_utf8();
    (end > start).then_some((start, end))
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry and Batch Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Run `operation`, retrying transient failures up to `retries` more times.
pub async fn retry_async<T, F, Fut>(retries: usize, delay: Duration, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut remaining = retries;
    loop {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if e.is_transient() && remaining > 0 => {
                remaining -= 1;
                warn!("Transient failure, {} retries left: {}", remaining, e);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
            Err(e) => return Err(e),
        }
    }
}

/// Pacing and retry settings for [`extract_all`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// 0 disables pacing.
    pub requests_per_minute: u32,
    pub retry_attempts: usize,
    /// Seconds between retries.
    pub retry_delay: f64,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            requests_per_minute: 60,
            retry_attempts: 3,
            retry_delay: 1.0,
        }
    }
}

/// Longest accepted retry delay, in seconds.
pub const MAX_RETRY_DELAY: f64 = 3600.0;

impl ExtractOptions {
    /// Rejects a retry delay outside `0..=MAX_RETRY_DELAY`, NaN included.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_RETRY_DELAY).contains(&self.retry_delay) {
            return Err(Error::invalid_config(
                "retry_delay",
                format!("must be between 0 and {} seconds, got {}", MAX_RETRY_DELAY, self.retry_delay),
            ));
        }
        Ok(())
    }

    fn pause(&self) -> Duration {
        if self.requests_per_minute == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs_f64(60.0 / self.requests_per_minute as f64)
        }
    }

    fn retry_delay(&self) -> Duration {
        Duration::try_from_secs_f64(self.retry_delay.min(MAX_RETRY_DELAY)).unwrap_or_default()
    }
}

/// Result of running an extractor over many chunks.
#[derive(Debug, Default)]
pub struct ExtractionRun {
    pub extractions: Vec<RawExtraction>,
    /// Chunks whose extraction failed after retries; they are skipped.
    pub failed_chunks: usize,
}

impl ExtractionRun {
    pub fn raw_memory_count(&self) -> usize {
        self.extractions.iter().map(|e| e.memories.len()).sum()
    }
}

/// Extract every chunk in order. Failed chunks are logged and skipped;
/// `on_chunk` is called after each chunk either way.
pub async fn extract_all(
    extractor: &dyn MemoryExtractor,
    chunks: &[ConversationChunk],
    options: &ExtractOptions,
    mut on_chunk: impl FnMut(&ConversationChunk),
) -> ExtractionRun {
    let mut run = ExtractionRun::default();
    let pause = options.pause();

    for (i, chunk) in chunks.iter().enumerate() {
        if i > 0 && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }

        match retry_async(options.retry_attempts, options.retry_delay(), || extractor.extract(chunk)).await {
            Ok(extraction) => {
                debug!(
                    "{} proposed {} memories for {}#{}",
                    extractor.name(),
                    extraction.memories.len(),
                    chunk.conversation_id,
                    chunk.chunk_index
                );
                run.extractions.push(extraction);
            }
            Err(e) => {
                warn!("Skipping chunk {}#{}: {}", chunk.conversation_id, chunk.chunk_index, e);
                run.failed_chunks += 1;
            }
        }
        on_chunk(chunk);
    }

    info!(
        "Extracted {} raw memories from {} chunks ({} failed)",
        run.raw_memory_count(),
        chunks.len(),
        run.failed_chunks
    );
    run
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn chunk(index: usize) -> ConversationChunk {
        ConversationChunk {
            conversation_id: "conv".into(),
            title: "Test".into(),
            chunk_index: index,
            text: format!("USER: message {}", index),
            created_at: None,
        }
    }

    /// Fails chunk 1 permanently and every other chunk once, transiently.
    struct FlakyExtractor {
        calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl MemoryExtractor for FlakyExtractor {
        fn name(&self) -> String {
            "flaky".into()
        }

        async fn extract(&self, chunk: &ConversationChunk) -> Result<RawExtraction> {
            let mut calls = self.calls.lock().unwrap();
            let seen = calls.iter().filter(|&&c| c == chunk.chunk_index).count();
            calls.push(chunk.chunk_index);
            drop(calls);

            if chunk.chunk_index == 1 {
                return Err(Error::Extraction("model refused".into()));
            }
            if seen == 0 {
                return Err(Error::Http("503".into()));
            }
            Ok(chunk.to_extraction(vec![RawMemory::new("Likes tea", "preference", 0.9)]))
        }
    }

    #[test]
    fn test_parse_template_response_with_prose() {
        let reply = r#"Sure! Here you go:
```json
{"memories": [{"content": "Likes tea", "category": "preference", "confidence": 0.9, "reasoning": "said so"}]}
```"#;
        let memories = parse_response(reply).unwrap();
        assert_eq!(memories.len(), 1);
        assert_eq!(memories[0].content.as_deref(), Some("Likes tea"));
        assert_eq!(memories[0].reasoning.as_deref(), Some("said so"));
    }

    #[test]
    fn test_parse_bare_array_response() {
        let reply = r#"Memories: [{"content": "Runs daily", "category": "pattern", "confidence": "0.8"}, "junk"]"#;
        let memories = parse_response(reply).unwrap();
        assert_eq!(memories.len(), 2);
        assert_eq!(memories[0].confidence, Some(serde_json::json!("0.8")));
        assert_eq!(memories[1], RawMemory::default());
    }

    #[test]
    fn test_parse_response_without_json_fails() {
        let err = parse_response("I could not find any memories.").unwrap_err();
        assert!(matches!(err, Error::Extraction(_)));
    }

    #[test]
    fn test_parse_object_without_memories_is_empty() {
        assert!(parse_response(r#"{"result": "nothing"}"#).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_retry_async_retries_transient_errors() {
        let attempts = AtomicUsize::new(0);
        let result = retry_async(3, Duration::ZERO, || {
            let current = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if current < 2 { Err(Error::Http("timeout".into())) } else { Ok(current) }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_gives_up() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_async(2, Duration::ZERO, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Http("timeout".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_async_does_not_retry_permanent_errors() {
        let attempts = AtomicUsize::new(0);
        let result: Result<()> = retry_async(5, Duration::ZERO, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Extraction("bad".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_extract_all_skips_failed_chunks() {
        let extractor = FlakyExtractor { calls: Mutex::new(Vec::new()) };
        let chunks = vec![chunk(0), chunk(1), chunk(2)];
        let options = ExtractOptions {
            requests_per_minute: 0,
            retry_attempts: 1,
            retry_delay: 0.0,
        };

        let mut progressed = 0;
        let run = extract_all(&extractor, &chunks, &options, |_| progressed += 1).await;

        assert_eq!(progressed, 3);
        assert_eq!(run.failed_chunks, 1);
        assert_eq!(run.extractions.len(), 2);
        assert_eq!(run.raw_memory_count(), 2);
        assert_eq!(*extractor.calls.lock().unwrap(), vec![0, 0, 1, 2, 2]);
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!("OpenAI".parse::<Provider>(), Ok(Provider::OpenAi));
        assert_eq!(Provider::Ollama.to_string(), "ollama");
        assert!("anthropic".parse::<Provider>().is_err());
    }

    #[test]
    fn test_retry_delay_bounds() {
        assert!(ExtractOptions::default().validate().is_ok());

        for bad in [f64::INFINITY, f64::NAN, -1.0, 1e300] {
            let options = ExtractOptions {
                retry_delay: bad,
                ..Default::default()
            };
            assert!(
                matches!(options.validate(), Err(Error::InvalidConfig { .. })),
                "accepted {}",
                bad
            );
            // Never panics even when validation was skipped
            assert!(options.retry_delay() <= Duration::from_secs_f64(MAX_RETRY_DELAY));
        }
    }
}
