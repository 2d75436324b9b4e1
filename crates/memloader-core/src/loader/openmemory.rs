//! Self-hosted OpenMemory server loader.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{memory_metadata, MemoryLoader, StoredMemory};
use crate::error::{Error, Result};
use crate::http::JsonClient;
use crate::types::ConsolidatedMemory;

/// OpenMemory connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenMemoryConfig {
    pub base_url: String,
    pub user_id: String,
    pub timeout_secs: u64,
}

impl Default for OpenMemoryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8765".to_string(),
            user_id: "default_user".to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Serialize)]
struct CreateRequest<'a> {
    user_id: &'a str,
    text: &'a str,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct OpenMemoryItem {
    id: String,
    #[serde(default, alias = "text")]
    content: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ListResponse {
    Page { items: Vec<OpenMemoryItem> },
    List(Vec<OpenMemoryItem>),
}

#[derive(Serialize)]
struct DeleteRequest<'a> {
    memory_ids: &'a [String],
    user_id: &'a str,
}

/// Loader for an OpenMemory server's REST API.
pub struct OpenMemoryLoader {
    user_id: String,
    client: JsonClient,
}

impl OpenMemoryLoader {
    pub fn new(config: OpenMemoryConfig) -> Result<Self> {
        if config.user_id.trim().is_empty() {
            return Err(Error::invalid_config("openmemory.user_id", "must not be empty"));
        }
        let client = JsonClient::new(&config.base_url, Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            user_id: config.user_id,
            client,
        })
    }

    /// Fails unless the server answers on its config endpoint.
    pub async fn check_connection(&self) -> Result<()> {
        let _: serde_json::Value = self.client.get("/api/v1/config/").await.map_err(|e| {
            Error::Loader(format!(
                "Cannot reach OpenMemory server at {}: {}",
                self.client.base_url(),
                e
            ))
        })?;
        info!("Connected to OpenMemory server at {}", self.client.base_url());
        Ok(())
    }
}

#[async_trait]
impl MemoryLoader for OpenMemoryLoader {
    fn name(&self) -> String {
        format!("openmemory ({})", self.user_id)
    }

    async fn existing_memories(&self) -> Result<Vec<StoredMemory>> {
        let response: ListResponse = self
            .client
            .get_query("/api/v1/memories/", &[("user_id", self.user_id.as_str())])
            .await?;
        let items = match response {
            ListResponse::Page { items } | ListResponse::List(items) => items,
        };
        info!("Found {} existing memories for user {}", items.len(), self.user_id);
        Ok(items
            .into_iter()
            .map(|m| StoredMemory { id: m.id, text: m.content })
            .collect())
    }

    async fn delete_memories(&self, ids: &[String]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let request = DeleteRequest {
            memory_ids: ids,
            user_id: &self.user_id,
        };
        self.client.delete_with("/api/v1/memories/", &request).await?;
        Ok(ids.len())
    }

    async fn upload(&self, memory: &ConsolidatedMemory) -> Result<()> {
        let request = CreateRequest {
            user_id: &self.user_id,
            text: &memory.text,
            metadata: memory_metadata(memory),
        };
        let _: serde_json::Value = self.client.post("/api/v1/memories/", &request).await?;
        debug!("Uploaded {}", memory.id);
        Ok(())
    }
}
