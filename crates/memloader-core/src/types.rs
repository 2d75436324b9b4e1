//! Shared types for memloader-core.
//!
//! These types flow between the extractor, the normalizer, the
//! consolidation engine and the loaders.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::consolidation::normalize_text;

// ─────────────────────────────────────────────────────────────────────────────
// Memory Category
// ─────────────────────────────────────────────────────────────────────────────

/// Closed set of memory categories.
///
/// `Context` is the vague fallback: unknown labels are coerced to it, and it
/// yields to any specific category during consolidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryCategory {
    Preference,
    Fact,
    Pattern,
    Goal,
    Skill,
    Relationship,
    Context,
    DecisionCriteria,
}

impl MemoryCategory {
    /// Every category, in declaration order.
    pub const ALL: [MemoryCategory; 8] = [
        MemoryCategory::Preference,
        MemoryCategory::Fact,
        MemoryCategory::Pattern,
        MemoryCategory::Goal,
        MemoryCategory::Skill,
        MemoryCategory::Relationship,
        MemoryCategory::Context,
        MemoryCategory::DecisionCriteria,
    ];

    /// Convert to string for storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryCategory::Preference => "preference",
            MemoryCategory::Fact => "fact",
            MemoryCategory::Pattern => "pattern",
            MemoryCategory::Goal => "goal",
            MemoryCategory::Skill => "skill",
            MemoryCategory::Relationship => "relationship",
            MemoryCategory::Context => "context",
            MemoryCategory::DecisionCriteria => "decision_criteria",
        }
    }

    /// Anything other than the `Context` fallback.
    pub fn is_specific(&self) -> bool {
        *self != MemoryCategory::Context
    }

    /// Whether two categories may describe the same fact.
    pub fn is_compatible_with(&self, other: MemoryCategory) -> bool {
        *self == other || !self.is_specific() || !other.is_specific()
    }
}

impl std::fmt::Display for MemoryCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for MemoryCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_lowercase().replace(['-', ' '], "_");
        match key.as_str() {
            "preference" => Ok(MemoryCategory::Preference),
            "fact" => Ok(MemoryCategory::Fact),
            "pattern" => Ok(MemoryCategory::Pattern),
            "goal" => Ok(MemoryCategory::Goal),
            "skill" => Ok(MemoryCategory::Skill),
            "relationship" => Ok(MemoryCategory::Relationship),
            "context" => Ok(MemoryCategory::Context),
            "decision_criteria" => Ok(MemoryCategory::DecisionCriteria),
            _ => Err(format!("Invalid memory category: {}", s)),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Identifiers
// ─────────────────────────────────────────────────────────────────────────────

/// Identifier of a candidate within one pipeline run.
///
/// Formatted as `{conversation_id}/{chunk_index}/{ordinal}`. Identifiers are
/// recomputed on every run and carry no meaning across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CandidateId(String);

impl CandidateId {
    pub fn new(conversation_id: &str, chunk_index: usize, ordinal: usize) -> Self {
        Self(format!("{}/{}/{}", conversation_id, chunk_index, ordinal))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CandidateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for CandidateId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Raw extractor output
// ─────────────────────────────────────────────────────────────────────────────

/// One memory item as proposed by an extractor, before any validation.
///
/// Every field is optional because the producing model is not trusted to
/// follow its output template.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMemory {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Number, or a string holding a number.
    #[serde(default)]
    pub confidence: Option<serde_json::Value>,
    #[serde(default)]
    pub reasoning: Option<String>,
}

impl RawMemory {
    /// Convenience constructor used by tests and fixtures.
    pub fn new(content: &str, category: &str, confidence: f64) -> Self {
        Self {
            content: Some(content.to_string()),
            category: Some(category.to_string()),
            confidence: Some(serde_json::json!(confidence)),
            reasoning: None,
        }
    }
}

/// All raw memories extracted from one chunk of one conversation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawExtraction {
    pub conversation_id: String,
    #[serde(default)]
    pub conversation_title: Option<String>,
    #[serde(default)]
    pub chunk_index: usize,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    /// Chunk text the memories were extracted from.
    #[serde(default)]
    pub excerpt: Option<String>,
    #[serde(default)]
    pub memories: Vec<RawMemory>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Candidates and consolidated memories
// ─────────────────────────────────────────────────────────────────────────────

/// A validated memory proposal, ready for consolidation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryCandidate {
    pub id: CandidateId,
    /// Cleaned statement; never empty.
    pub text: String,
    pub category: MemoryCategory,
    /// Always within [0.0, 1.0].
    pub confidence: f64,
    pub source_conversation_id: String,
    pub chunk_index: usize,
    pub source_excerpt: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

/// Final, deduplicated memory. One per group of near-duplicate candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsolidatedMemory {
    /// Id of the representative candidate.
    pub id: CandidateId,
    pub text: String,
    pub category: MemoryCategory,
    /// Maximum confidence among the merged candidates.
    pub confidence: f64,
    pub source_conversation_id: String,
    pub source_excerpt: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// Member candidate ids in encounter order. Never empty.
    pub merged_from: Vec<CandidateId>,
    pub merge_count: usize,
}

impl ConsolidatedMemory {
    /// SHA-256 of the comparison-normalized text, as hex.
    pub fn content_hash(&self) -> String {
        content_hash(&self.text)
    }

    /// Re-enter this memory as a fresh candidate, dropping merge provenance.
    pub fn to_candidate(&self) -> MemoryCandidate {
        MemoryCandidate {
            id: self.id.clone(),
            text: self.text.clone(),
            category: self.category,
            confidence: self.confidence,
            source_conversation_id: self.source_conversation_id.clone(),
            chunk_index: 0,
            source_excerpt: self.source_excerpt.clone(),
            created_at: self.created_at,
        }
    }
}

/// Hash used to recognise a memory that is already present in a store.
pub fn content_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize_text(text).as_bytes());
    hex::encode(hasher.finalize())
}
