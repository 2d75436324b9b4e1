//! Aggregate statistics for one consolidation run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::normalize::NormalizationReport;
use crate::types::{ConsolidatedMemory, MemoryCategory};

/// Min/max/mean/median of output confidences. All zero for an empty set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceSummary {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub median: f64,
}

impl ConfidenceSummary {
    pub fn from_values(values: &[f64]) -> Self {
        if values.is_empty() {
            return Self::default();
        }

        let mut sorted = values.to_vec();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        Self {
            min: sorted[0],
            max: sorted[n - 1],
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
        }
    }
}

/// Summary of a pipeline run. Computed once after consolidation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingStatistics {
    /// Candidates handed to the engine (post-normalization, pre-filter).
    pub input_count: usize,
    /// Consolidated memories produced.
    pub output_count: usize,
    /// Candidates folded into another: passed filter minus groups.
    pub duplicates_removed: usize,
    /// Candidates below the confidence threshold.
    pub low_confidence_filtered: usize,
    /// Output memories built from more than one candidate.
    pub merged_memories: usize,
    /// Raw items dropped by the normalizer.
    pub malformed_dropped: usize,
    /// Raw items whose confidence was clamped by the normalizer.
    pub confidence_clamped: usize,
    /// Raw items whose category was coerced to `context`.
    pub categories_coerced: usize,
    /// Output memories per category.
    pub categories: BTreeMap<MemoryCategory, usize>,
    /// Confidence distribution over output memories.
    pub confidence: ConfidenceSummary,
}

impl ProcessingStatistics {
    pub(crate) fn compute(
        input_count: usize,
        low_confidence_filtered: usize,
        memories: &[ConsolidatedMemory],
        report: NormalizationReport,
    ) -> Self {
        let passed = input_count - low_confidence_filtered;

        let mut categories = BTreeMap::new();
        for memory in memories {
            *categories.entry(memory.category).or_insert(0) += 1;
        }

        let confidences: Vec<f64> = memories.iter().map(|m| m.confidence).collect();

        Self {
            input_count,
            output_count: memories.len(),
            duplicates_removed: passed - memories.len(),
            low_confidence_filtered,
            merged_memories: memories.iter().filter(|m| m.merge_count > 1).count(),
            malformed_dropped: report.malformed,
            confidence_clamped: report.clamped,
            categories_coerced: report.coerced,
            categories,
            confidence: ConfidenceSummary::from_values(&confidences),
        }
    }

    /// Total per-candidate anomalies repaired or dropped before consolidation.
    pub fn anomaly_count(&self) -> usize {
        self.malformed_dropped + self.confidence_clamped + self.categories_coerced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_summary_empty() {
        assert_eq!(ConfidenceSummary::from_values(&[]), ConfidenceSummary::default());
    }

    #[test]
    fn test_summary_odd() {
        let s = ConfidenceSummary::from_values(&[0.9, 0.7, 0.8]);
        assert_eq!(s.min, 0.7);
        assert_eq!(s.max, 0.9);
        assert_eq!(s.median, 0.8);
        assert!((s.mean - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_summary_even_median_averages_middle() {
        let s = ConfidenceSummary::from_values(&[1.0, 0.5, 0.7, 0.9]);
        assert!((s.median - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_statistics_serialize_with_snake_case_categories() {
        let stats = ProcessingStatistics {
            categories: BTreeMap::from([(MemoryCategory::DecisionCriteria, 2)]),
            ..Default::default()
        };
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["categories"]["decision_criteria"], 2);
        assert_eq!(json["low_confidence_filtered"], 0);
    }

    #[test]
    fn test_anomaly_count() {
        let stats = ProcessingStatistics {
            malformed_dropped: 2,
            confidence_clamped: 1,
            categories_coerced: 3,
            ..Default::default()
        };
        assert_eq!(stats.anomaly_count(), 6);
    }
}
