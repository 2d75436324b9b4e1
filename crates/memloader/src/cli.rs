//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use memloader_core::consolidation::SimilarityKind;
use memloader_core::extract::Provider;
use memloader_core::loader::Target;

/// Import ChatGPT conversation history into a memory store.
///
/// Extracts memories from a ChatGPT export with a local or hosted LLM,
/// filters and deduplicates them, and uploads the result to Mem0 or a
/// self-hosted OpenMemory server.
#[derive(Parser, Debug)]
#[command(name = "memloader")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Extract, consolidate and upload memories from a ChatGPT export
    Import(ImportArgs),

    /// Re-run consolidation on saved raw extractions (no LLM, no upload)
    Consolidate(ConsolidateArgs),

    /// Configuration file management
    Config(ConfigCommand),

    /// Show version information
    Version,
}

/// Thresholds shared by `import` and `consolidate`.
#[derive(Args, Debug, Default)]
pub struct ConsolidationArgs {
    /// Minimum confidence for a memory to be kept (0-1)
    #[arg(long)]
    pub confidence_threshold: Option<f64>,

    /// Minimum similarity for two memories to be merged (0-1)
    #[arg(long)]
    pub similarity_threshold: Option<f64>,

    /// Similarity measure: jaccard, bigram or exact
    #[arg(long)]
    pub similarity: Option<SimilarityKind>,
}

#[derive(Args, Debug)]
pub struct ImportArgs {
    /// Path to conversations.json from a ChatGPT export
    pub export_file: PathBuf,

    /// User id to store memories under
    #[arg(short, long)]
    pub user_id: Option<String>,

    /// Extraction provider: ollama or openai
    #[arg(short, long)]
    pub provider: Option<Provider>,

    /// Model to use with the provider
    #[arg(short, long)]
    pub model: Option<String>,

    #[command(flatten)]
    pub consolidation: ConsolidationArgs,

    /// Memories per upload batch
    #[arg(short, long)]
    pub batch_size: Option<usize>,

    /// Memory store: mem0 or openmemory
    #[arg(short, long)]
    pub target: Option<Target>,

    /// Mem0 API key
    #[arg(long, env = "MEM0_API_KEY", hide_env_values = true)]
    pub mem0_api_key: Option<String>,

    /// Only process the first N conversations
    #[arg(long)]
    pub limit: Option<usize>,

    /// Submit all chunks as one OpenAI batch job (half the cost, may take hours)
    #[arg(long)]
    pub use_batch: bool,

    /// Process everything but don't upload
    #[arg(long)]
    pub dry_run: bool,

    /// Delete the user's existing memories before uploading
    #[arg(long)]
    pub clear_existing: bool,

    /// Skip confirmation prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Write raw extractions to this JSON file (input for `consolidate`)
    #[arg(long)]
    pub save_candidates: Option<PathBuf>,

    /// Write consolidated memories and statistics to this JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConsolidateArgs {
    /// JSON file of raw extractions written by `import --save-candidates`
    pub candidates: PathBuf,

    #[command(flatten)]
    pub consolidation: ConsolidationArgs,

    /// Write consolidated memories and statistics to this JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Print the result as JSON instead of a summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ConfigCommand {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Print the effective configuration (file + environment)
    Show,

    /// Write a default config file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Print the config file path
    Path,
}
