//! Memory consolidation engine.
//!
//! Turns a flat list of [`MemoryCandidate`] values into a compact set of
//! [`ConsolidatedMemory`] values:
//!
//! 1. **Confidence filter**: candidates below the threshold are dropped
//!    (the threshold is inclusive).
//! 2. **Grouping**: candidates whose normalized text is similar enough and
//!    whose categories are compatible are linked; groups are the transitive
//!    closure of those links. Linking runs after filtering, so a raised
//!    threshold can split a group whose members were only joined through
//!    a filtered candidate.
//! 3. **Resolution**: each group becomes one memory carrying the text of its
//!    most confident member, its most specific category and its maximum
//!    confidence.
//! 4. **Statistics**: see [`ProcessingStatistics`].
//!
//! The engine is a pure function of its inputs. It performs no I/O and
//! holds no state between calls.
//!
//! ## Usage
//!
//! ```
//! use memloader_core::consolidation::{consolidate, ConsolidationConfig};
//!
//! let config = ConsolidationConfig::default();
//! let result = consolidate(&[], &config).unwrap();
//! assert!(result.memories.is_empty());
//! assert_eq!(result.statistics.output_count, 0);
//! ```

mod grouping;
mod similarity;
mod stats;

pub use similarity::*;
pub use stats::*;

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::normalize::NormalizationReport;
use crate::types::{ConsolidatedMemory, MemoryCandidate, MemoryCategory};
use grouping::UnionFind;

/// Configuration for the consolidation engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsolidationConfig {
    /// Minimum candidate confidence, inclusive (0.0 - 1.0).
    pub confidence_threshold: f64,
    /// Minimum similarity for two candidates to be the same fact (0.0 - 1.0).
    pub similarity_threshold: f64,
    /// Similarity measure to use.
    pub similarity: SimilarityKind,
}

impl Default for ConsolidationConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            similarity_threshold: 0.7,
            similarity: SimilarityKind::Jaccard,
        }
    }
}

impl ConsolidationConfig {
    /// Config with the given confidence threshold and default similarity.
    pub fn with_confidence_threshold(confidence_threshold: f64) -> Self {
        Self {
            confidence_threshold,
            ..Default::default()
        }
    }

    /// Reject thresholds outside [0, 1] (NaN included).
    pub fn validate(&self) -> Result<()> {
        check_unit_interval("confidence_threshold", self.confidence_threshold)?;
        check_unit_interval("similarity_threshold", self.similarity_threshold)?;
        Ok(())
    }
}

fn check_unit_interval(field: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(Error::invalid_config(
            field,
            format!("must be within [0, 1], got {}", value),
        ))
    }
}

/// Output of a consolidation run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Consolidation {
    pub memories: Vec<ConsolidatedMemory>,
    pub statistics: ProcessingStatistics,
}

/// Consolidation engine parameterized by a similarity predicate.
#[derive(Debug, Clone)]
pub struct ConsolidationEngine<P> {
    config: ConsolidationConfig,
    predicate: P,
}

impl<P: SimilarityPredicate> ConsolidationEngine<P> {
    /// Create an engine. Fails if the configuration is invalid.
    ///
    /// `config.similarity` is ignored here; `predicate` decides similarity.
    pub fn with_predicate(config: ConsolidationConfig, predicate: P) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, predicate })
    }

    /// Get configuration.
    pub fn config(&self) -> &ConsolidationConfig {
        &self.config
    }

    /// Consolidate candidates.
    pub fn consolidate(&self, candidates: &[MemoryCandidate]) -> Consolidation {
        self.consolidate_with_report(candidates, NormalizationReport::default())
    }

    pub(crate) fn consolidate_with_report(
        &self,
        candidates: &[MemoryCandidate],
        report: NormalizationReport,
    ) -> Consolidation {
        info!("Consolidating {} memory candidates", candidates.len());

        let kept = self.filter_by_confidence(candidates);
        let low_confidence_filtered = candidates.len() - kept.len();

        let groups = self.group(&kept);
        let memories: Vec<ConsolidatedMemory> = groups
            .iter()
            .map(|members| resolve_group(&kept, members))
            .collect();

        let statistics =
            ProcessingStatistics::compute(candidates.len(), low_confidence_filtered, &memories, report);

        info!(
            "Consolidation complete: {} in, {} out, {} duplicates removed, {} low confidence",
            statistics.input_count,
            statistics.output_count,
            statistics.duplicates_removed,
            statistics.low_confidence_filtered
        );

        Consolidation { memories, statistics }
    }

    fn filter_by_confidence<'a>(&self, candidates: &'a [MemoryCandidate]) -> Vec<&'a MemoryCandidate> {
        let threshold = self.config.confidence_threshold;
        candidates
            .iter()
            .filter(|c| {
                let keep = c.confidence >= threshold;
                if !keep {
                    debug!("Filtered low confidence memory {} ({:.2})", c.id, c.confidence);
                }
                keep
            })
            .collect()
    }

    /// Partition candidates into near-duplicate groups (indices into `kept`).
    fn group(&self, kept: &[&MemoryCandidate]) -> Vec<Vec<usize>> {
        let prepared: Vec<P::Prepared> = kept
            .iter()
            .map(|c| self.predicate.prepare(&normalize_text(&c.text)))
            .collect();

        let mut uf = UnionFind::new(kept.len());
        for i in 0..kept.len() {
            for j in (i + 1)..kept.len() {
                if !kept[i].category.is_compatible_with(kept[j].category) {
                    continue;
                }
                if uf.find(i) == uf.find(j) {
                    continue;
                }
                let score = self.predicate.similarity(&prepared[i], &prepared[j]);
                if score >= self.config.similarity_threshold {
                    debug!("Linking {} and {} (similarity {:.2})", kept[i].id, kept[j].id, score);
                    uf.union(i, j);
                }
            }
        }
        uf.groups()
    }
}

/// Consolidate candidates using the predicate named in `config.similarity`.
///
/// Fails only if `config` is invalid; that check happens before any
/// candidate is looked at.
pub fn consolidate(candidates: &[MemoryCandidate], config: &ConsolidationConfig) -> Result<Consolidation> {
    consolidate_with_report(candidates, config, NormalizationReport::default())
}

pub(crate) fn consolidate_with_report(
    candidates: &[MemoryCandidate],
    config: &ConsolidationConfig,
    report: NormalizationReport,
) -> Result<Consolidation> {
    let config = *config;
    let result = match config.similarity {
        SimilarityKind::Jaccard => {
            ConsolidationEngine::with_predicate(config, TokenJaccard)?.consolidate_with_report(candidates, report)
        }
        SimilarityKind::Bigram => ConsolidationEngine::with_predicate(config, CharacterBigrams)?
            .consolidate_with_report(candidates, report),
        SimilarityKind::Exact => {
            ConsolidationEngine::with_predicate(config, ExactMatch)?.consolidate_with_report(candidates, report)
        }
    };
    Ok(result)
}

/// Fold one group of candidates into a single memory.
fn resolve_group(kept: &[&MemoryCandidate], members: &[usize]) -> ConsolidatedMemory {
    // Groups from UnionFind::groups always hold at least one member
    let representative = members[1..]
        .iter()
        .map(|&i| kept[i])
        .fold(kept[members[0]], |best, c| if outranks(c, best) { c } else { best });

    // Earliest specific category wins; context only if nothing else is present
    let category = members
        .iter()
        .map(|&i| kept[i].category)
        .find(MemoryCategory::is_specific)
        .unwrap_or(MemoryCategory::Context);

    let merged_from: Vec<_> = members.iter().map(|&i| kept[i].id.clone()).collect();
    if merged_from.len() > 1 {
        debug!("Merged {} candidates into {}", merged_from.len(), representative.id);
    }

    ConsolidatedMemory {
        id: representative.id.clone(),
        text: representative.text.clone(),
        category,
        confidence: representative.confidence,
        source_conversation_id: representative.source_conversation_id.clone(),
        source_excerpt: representative.source_excerpt.clone(),
        created_at: representative.created_at,
        merge_count: merged_from.len(),
        merged_from,
    }
}

/// Whether `challenger` should replace `incumbent` as a group's
/// representative. Ties on confidence go to the more recent conversation,
/// then to whichever was seen first.
fn outranks(challenger: &MemoryCandidate, incumbent: &MemoryCandidate) -> bool {
    match challenger.confidence.total_cmp(&incumbent.confidence) {
        Ordering::Greater => true,
        Ordering::Less => false,
        Ordering::Equal => challenger.created_at > incumbent.created_at,
    }
}
