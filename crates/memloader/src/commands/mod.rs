//! Command implementations for the memloader CLI.
//!
//! Each submodule implements the logic for one command.

pub mod config;
pub mod consolidate;
pub mod import;

use crate::cli::ConsolidationArgs;
use crate::config::Config;

/// Apply threshold flags on top of the loaded configuration.
pub(crate) fn apply_consolidation_args(config: &mut Config, args: &ConsolidationArgs) {
    if let Some(t) = args.confidence_threshold {
        config.consolidation.confidence_threshold = t;
    }
    if let Some(t) = args.similarity_threshold {
        config.consolidation.similarity_threshold = t;
    }
    if let Some(kind) = args.similarity {
        config.consolidation.similarity = kind;
    }
}
