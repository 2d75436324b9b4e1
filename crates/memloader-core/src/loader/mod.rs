//! Loading consolidated memories into a memory store.
//!
//! Stores implement [`MemoryLoader`]. The functions in this module drive a
//! loader: [`prepare_for_upload`] applies length bounds and skips memories
//! the store already holds, [`clear_existing`] wipes the user's memories,
//! and [`upload_all`] pushes memories one by one, counting failures instead
//! of aborting.

#[cfg(feature = "client")]
mod mem0;
#[cfg(feature = "client")]
mod openmemory;

#[cfg(feature = "client")]
pub use mem0::{Mem0Config, Mem0Loader};
#[cfg(feature = "client")]
pub use openmemory::{OpenMemoryConfig, OpenMemoryLoader};

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::error::Result;
use crate::types::{content_hash, ConsolidatedMemory, MemoryCategory};

/// Maximum ids per delete request.
pub const DELETE_BATCH_SIZE: usize = 1000;

/// Maximum chars of source excerpt sent as metadata.
const METADATA_EXCERPT_LIMIT: usize = 500;

/// Which store to load into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    /// Mem0 cloud platform.
    #[default]
    Mem0,
    /// Self-hosted OpenMemory server.
    OpenMemory,
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Target::Mem0 => write!(f, "mem0"),
            Target::OpenMemory => write!(f, "openmemory"),
        }
    }
}

impl std::str::FromStr for Target {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mem0" => Ok(Target::Mem0),
            "openmemory" | "local" => Ok(Target::OpenMemory),
            _ => Err(format!("Invalid target: {}", s)),
        }
    }
}

/// A memory already present in the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMemory {
    pub id: String,
    pub text: String,
}

/// A persistent memory store.
#[async_trait]
pub trait MemoryLoader: Send + Sync {
    fn name(&self) -> String;

    /// Every memory the store holds for the configured user.
    async fn existing_memories(&self) -> Result<Vec<StoredMemory>>;

    /// Delete by id; returns how many were deleted.
    async fn delete_memories(&self, ids: &[String]) -> Result<usize>;

    /// Store one memory.
    async fn upload(&self, memory: &ConsolidatedMemory) -> Result<()>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Preparation
// ─────────────────────────────────────────────────────────────────────────────

/// Text length bounds for uploaded memories, in chars.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadPolicy {
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            min_length: 10,
            max_length: 1000,
        }
    }
}

impl UploadPolicy {
    pub fn accepts(&self, text: &str) -> bool {
        let len = text.trim().chars().count();
        len >= self.min_length && len <= self.max_length
    }
}

/// Memories cleared for upload, plus what was held back.
#[derive(Debug, Clone, Default)]
pub struct PreparedUpload {
    pub memories: Vec<ConsolidatedMemory>,
    pub rejected_length: usize,
    pub already_stored: usize,
}

/// Drop memories outside the length bounds or already in the store.
pub fn prepare_for_upload(
    memories: Vec<ConsolidatedMemory>,
    existing: &[StoredMemory],
    policy: &UploadPolicy,
) -> PreparedUpload {
    let stored: HashSet<String> = existing.iter().map(|m| content_hash(&m.text)).collect();
    let mut prepared = PreparedUpload::default();

    for memory in memories {
        if !policy.accepts(&memory.text) {
            debug!("Length out of bounds, not uploading {}", memory.id);
            prepared.rejected_length += 1;
        } else if stored.contains(&memory.content_hash()) {
            debug!("Already stored, not uploading {}", memory.id);
            prepared.already_stored += 1;
        } else {
            prepared.memories.push(memory);
        }
    }

    info!(
        "Prepared {} memories for upload ({} out of bounds, {} already stored)",
        prepared.memories.len(),
        prepared.rejected_length,
        prepared.already_stored
    );
    prepared
}

/// Metadata attached to every uploaded memory.
pub fn memory_metadata(memory: &ConsolidatedMemory) -> serde_json::Value {
    let excerpt: Option<String> = memory
        .source_excerpt
        .as_deref()
        .map(|e| e.chars().take(METADATA_EXCERPT_LIMIT).collect());

    serde_json::json!({
        "source": "chatgpt_export",
        "category": memory.category,
        "confidence": memory.confidence,
        "merge_count": memory.merge_count,
        "merged_from": memory.merged_from,
        "source_conversation_id": memory.source_conversation_id,
        "original_context": excerpt,
        "content_hash": memory.content_hash(),
    })
}

/// Message text for chat-style stores: `[CATEGORY] Remember: text`, without
/// the category tag for `context`.
pub fn memory_message(memory: &ConsolidatedMemory) -> String {
    let message = format!("Remember: {}", memory.text);
    if memory.category == MemoryCategory::Context {
        message
    } else {
        format!("[{}] {}", memory.category.as_str().to_uppercase(), message)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Clearing and Uploading
// ─────────────────────────────────────────────────────────────────────────────

/// Delete every memory the store holds for the user. Failed delete batches
/// are logged and skipped.
pub async fn clear_existing(loader: &dyn MemoryLoader) -> Result<usize> {
    let ids: Vec<String> = loader.existing_memories().await?.into_iter().map(|m| m.id).collect();
    if ids.is_empty() {
        info!("No existing memories to delete in {}", loader.name());
        return Ok(0);
    }

    info!("Deleting {} existing memories from {}", ids.len(), loader.name());
    let mut deleted = 0;
    for batch in ids.chunks(DELETE_BATCH_SIZE) {
        match loader.delete_memories(batch).await {
            Ok(n) => deleted += n,
            Err(e) => error!("Failed to delete batch of {} memories: {}", batch.len(), e),
        }
    }
    info!("Deleted {} memories", deleted);
    Ok(deleted)
}

/// Batching for [`upload_all`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UploadOptions {
    pub batch_size: usize,
    /// Pause between batches.
    pub pause: Duration,
}

impl Default for UploadOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            pause: Duration::from_secs(1),
        }
    }
}

/// Outcome of an upload run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadStatistics {
    pub total_processed: usize,
    pub uploaded: usize,
    pub failed: usize,
    /// `uploaded / total_processed`, 0 when nothing was processed.
    pub success_rate: f64,
}

/// Upload memories in batches. A failed memory is logged and counted; it
/// never stops the run. `on_memory` receives each memory and whether it
/// was stored.
pub async fn upload_all(
    loader: &dyn MemoryLoader,
    memories: &[ConsolidatedMemory],
    options: &UploadOptions,
    mut on_memory: impl FnMut(&ConsolidatedMemory, bool),
) -> UploadStatistics {
    let mut stats = UploadStatistics::default();
    let batch_size = options.batch_size.max(1);
    info!("Uploading {} memories to {}", memories.len(), loader.name());

    for (batch_num, batch) in memories.chunks(batch_size).enumerate() {
        if batch_num > 0 && !options.pause.is_zero() {
            tokio::time::sleep(options.pause).await;
        }
        debug!("Uploading batch {} ({} memories)", batch_num + 1, batch.len());

        for memory in batch {
            let ok = match loader.upload(memory).await {
                Ok(()) => {
                    stats.uploaded += 1;
                    true
                }
                Err(e) => {
                    error!("Failed to upload {}: {}", memory.id, e);
                    stats.failed += 1;
                    false
                }
            };
            stats.total_processed += 1;
            on_memory(memory, ok);
        }
    }

    if stats.total_processed > 0 {
        stats.success_rate = stats.uploaded as f64 / stats.total_processed as f64;
    }
    info!(
        "Upload complete: {} uploaded, {} failed ({:.1}% success)",
        stats.uploaded,
        stats.failed,
        stats.success_rate * 100.0
    );
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::CandidateId;
    use std::sync::Mutex;

    fn memory(n: usize, text: &str, category: MemoryCategory) -> ConsolidatedMemory {
        let id = CandidateId::new("conv", 0, n);
        ConsolidatedMemory {
            id: id.clone(),
            text: text.to_string(),
            category,
            confidence: 0.9,
            source_conversation_id: "conv".into(),
            source_excerpt: Some("x".repeat(800)),
            created_at: None,
            merged_from: vec![id],
            merge_count: 1,
        }
    }

    /// In-memory store that rejects texts containing "fail".
    #[derive(Default)]
    struct MockLoader {
        stored: Mutex<Vec<StoredMemory>>,
        delete_calls: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl MemoryLoader for MockLoader {
        fn name(&self) -> String {
            "mock".into()
        }

        async fn existing_memories(&self) -> Result<Vec<StoredMemory>> {
            Ok(self.stored.lock().unwrap().clone())
        }

        async fn delete_memories(&self, ids: &[String]) -> Result<usize> {
            self.delete_calls.lock().unwrap().push(ids.len());
            let mut stored = self.stored.lock().unwrap();
            let before = stored.len();
            stored.retain(|m| !ids.contains(&m.id));
            Ok(before - stored.len())
        }

        async fn upload(&self, memory: &ConsolidatedMemory) -> Result<()> {
            if memory.text.contains("fail") {
                return Err(Error::Loader("rejected".into()));
            }
            let mut stored = self.stored.lock().unwrap();
            let id = format!("m{}", stored.len());
            stored.push(StoredMemory {
                id,
                text: memory.text.clone(),
            });
            Ok(())
        }
    }

    #[test]
    fn test_prepare_for_upload() {
        let existing = vec![StoredMemory {
            id: "1".into(),
            text: "user enjoys hiking on weekends.".into(),
        }];
        let memories = vec![
            memory(0, "User enjoys hiking on weekends", MemoryCategory::Preference),
            memory(1, "Too short", MemoryCategory::Fact),
            memory(2, &"long ".repeat(300), MemoryCategory::Fact),
            memory(3, "Works as a nurse in Leeds", MemoryCategory::Fact),
        ];

        let prepared = prepare_for_upload(memories, &existing, &UploadPolicy::default());
        assert_eq!(prepared.memories.len(), 1);
        assert_eq!(prepared.memories[0].text, "Works as a nurse in Leeds");
        assert_eq!(prepared.rejected_length, 2);
        assert_eq!(prepared.already_stored, 1);
    }

    #[test]
    fn test_memory_message() {
        let goal = memory(0, "Run a marathon", MemoryCategory::Goal);
        assert_eq!(memory_message(&goal), "[GOAL] Remember: Run a marathon");

        let context = memory(0, "Is moving house", MemoryCategory::Context);
        assert_eq!(memory_message(&context), "Remember: Is moving house");

        let criteria = memory(0, "Values price", MemoryCategory::DecisionCriteria);
        assert_eq!(memory_message(&criteria), "[DECISION_CRITERIA] Remember: Values price");
    }

    #[test]
    fn test_memory_metadata_truncates_excerpt() {
        let metadata = memory_metadata(&memory(0, "Works as a nurse", MemoryCategory::Fact));
        assert_eq!(metadata["category"], "fact");
        assert_eq!(metadata["merge_count"], 1);
        assert_eq!(metadata["original_context"].as_str().unwrap().len(), 500);
        assert_eq!(metadata["merged_from"][0], "conv/0/0");
    }

    #[test]
    fn test_upload_all_counts_failures() {
        let loader = MockLoader::default();
        let memories = vec![
            memory(0, "Works as a nurse in Leeds", MemoryCategory::Fact),
            memory(1, "This one will fail", MemoryCategory::Fact),
            memory(2, "Keeps a vegetable garden", MemoryCategory::Pattern),
        ];
        let options = UploadOptions {
            batch_size: 2,
            pause: Duration::ZERO,
        };

        let mut seen = Vec::new();
        let stats = tokio_test::block_on(upload_all(&loader, &memories, &options, |m, ok| {
            seen.push((m.id.to_string(), ok))
        }));

        assert_eq!(stats.total_processed, 3);
        assert_eq!(stats.uploaded, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(seen[1], ("conv/0/1".to_string(), false));
        assert_eq!(loader.stored.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_upload_all_empty() {
        let loader = MockLoader::default();
        let stats = tokio_test::block_on(upload_all(&loader, &[], &UploadOptions::default(), |_, _| {}));
        assert_eq!(stats, UploadStatistics::default());
    }

    #[test]
    fn test_clear_existing_batches_deletes() {
        let loader = MockLoader::default();
        {
            let mut stored = loader.stored.lock().unwrap();
            for i in 0..2500 {
                stored.push(StoredMemory {
                    id: i.to_string(),
                    text: format!("memory {}", i),
                });
            }
        }

        let deleted = tokio_test::block_on(clear_existing(&loader)).unwrap();
        assert_eq!(deleted, 2500);
        assert_eq!(*loader.delete_calls.lock().unwrap(), vec![1000, 1000, 500]);
        assert!(loader.stored.lock().unwrap().is_empty());
    }

    #[test]
    fn test_target_parse() {
        assert_eq!("openmemory".parse::<Target>(), Ok(Target::OpenMemory));
        assert_eq!("local".parse::<Target>(), Ok(Target::OpenMemory));
        assert_eq!(Target::Mem0.to_string(), "mem0");
        assert!("redis".parse::<Target>().is_err());
    }
}
