//! memloader-core - Core library for memloader
//!
//! Turns exported ChatGPT conversations into a compact set of memories and
//! loads them into a memory store:
//!
//! - **transcript**: ChatGPT export parsing and chunking
//! - **extract**: LLM-backed memory extraction (Ollama, OpenAI)
//! - **normalize**: validation and cleanup of raw extractor output
//! - **consolidation**: confidence filtering, near-duplicate grouping, statistics
//! - **pipeline**: normalize + consolidate in one call
//! - **loader**: uploading to Mem0 or OpenMemory
//!
//! Normalization and consolidation are pure and synchronous. Extraction and
//! loading are async and, for the HTTP implementations, need the `client`
//! feature (on by default).

pub mod consolidation;
pub mod error;
pub mod extract;
pub mod loader;
pub mod normalize;
pub mod pipeline;
pub mod transcript;
pub mod types;

#[cfg(feature = "client")]
mod http;

// Re-export commonly used types
pub use consolidation::{consolidate, Consolidation, ConsolidationConfig, ProcessingStatistics};
pub use error::{Error, Result};
pub use normalize::Normalizer;
pub use pipeline::process;
pub use types::{CandidateId, ConsolidatedMemory, MemoryCandidate, MemoryCategory, RawExtraction, RawMemory};
