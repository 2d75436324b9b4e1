//! Mem0 cloud platform loader.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{memory_message, memory_metadata, MemoryLoader, StoredMemory};
use crate::error::{Error, Result};
use crate::http::JsonClient;
use crate::types::ConsolidatedMemory;

/// Mem0 connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Mem0Config {
    pub api_key: Option<String>,
    pub base_url: String,
    pub user_id: String,
    pub timeout_secs: u64,
}

impl Default for Mem0Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://api.mem0.ai".to_string(),
            user_id: "chatgpt_import".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct AddRequest<'a> {
    messages: Vec<Message>,
    user_id: &'a str,
    metadata: serde_json::Value,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct Mem0Memory {
    id: String,
    #[serde(default)]
    memory: String,
}

/// `GET /v1/memories/` answers with a bare list or a `results` wrapper
/// depending on the API version.
#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    List(Vec<Mem0Memory>),
    Wrapped { results: Vec<Mem0Memory> },
}

#[derive(Serialize)]
struct BatchDeleteRequest {
    memories: Vec<BatchDeleteItem>,
}

#[derive(Serialize)]
struct BatchDeleteItem {
    memory_id: String,
}

/// Loader for the Mem0 platform API.
pub struct Mem0Loader {
    user_id: String,
    client: JsonClient,
}

impl Mem0Loader {
    /// Fails when no API key is configured.
    pub fn new(config: Mem0Config) -> Result<Self> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or_else(|| Error::invalid_config("mem0.api_key", "a Mem0 API key is required"))?;

        let client = JsonClient::new(&config.base_url, Duration::from_secs(config.timeout_secs))?
            .with_authorization(format!("Token {}", api_key));
        Ok(Self {
            user_id: config.user_id,
            client,
        })
    }

    fn add_request(&self, memory: &ConsolidatedMemory) -> AddRequest<'_> {
        AddRequest {
            messages: vec![Message {
                role: "user",
                content: memory_message(memory),
            }],
            user_id: &self.user_id,
            metadata: memory_metadata(memory),
        }
    }
}

#[async_trait]
impl MemoryLoader for Mem0Loader {
    fn name(&self) -> String {
        format!("mem0 ({})", self.user_id)
    }

    async fn existing_memories(&self) -> Result<Vec<StoredMemory>> {
        let response: ListResponse = self
            .client
            .get_query("/v1/memories/", &[("user_id", self.user_id.as_str())])
            .await?;
        let memories = match response {
            ListResponse::List(m) | ListResponse::Wrapped { results: m } => m,
        };
        info!("Found {} existing memories for user {}", memories.len(), self.user_id);
        Ok(memories
            .into_iter()
            .map(|m| StoredMemory { id: m.id, text: m.memory })
            .collect())
    }

    async fn delete_memories(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let request = BatchDeleteRequest {
            memories: ids
                .iter()
                .map(|id| BatchDeleteItem { memory_id: id.clone() })
                .collect(),
        };
        self.client.delete_with("/v1/batch/", &request).await?;
        debug!("Deleted batch of {} memories", ids.len());
        Ok(ids.len())
    }

    async fn upload(&self, memory: &ConsolidatedMemory) -> Result<()> {
        let _: serde_json::Value = self.client.post("/v1/memories/", &self.add_request(memory)).await?;
        debug!("Uploaded {}", memory.id);
        Ok(())
    }
}
