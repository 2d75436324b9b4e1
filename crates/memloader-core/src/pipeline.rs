//! Normalize-then-consolidate in one call.

use crate::consolidation::{self, Consolidation, ConsolidationConfig};
use crate::error::Result;
use crate::normalize::Normalizer;
use crate::types::RawExtraction;

/// Run raw extractor output through the normalizer and the consolidation
/// engine. Normalizer counters end up in the returned statistics.
pub fn process(raw: Vec<RawExtraction>, config: &ConsolidationConfig) -> Result<Consolidation> {
    process_with(raw, config, &Normalizer::default())
}

/// Like [`process`] but with a caller-configured normalizer.
pub fn process_with(
    raw: Vec<RawExtraction>,
    config: &ConsolidationConfig,
    normalizer: &Normalizer,
) -> Result<Consolidation> {
    config.validate()?;
    let batch = normalizer.normalize(raw);
    consolidation::consolidate_with_report(&batch.candidates, config, batch.report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::types::{MemoryCategory, RawMemory};

    fn extraction(conversation_id: &str, memories: Vec<RawMemory>) -> RawExtraction {
        RawExtraction {
            conversation_id: conversation_id.to_string(),
            memories,
            ..Default::default()
        }
    }

    #[test]
    fn test_process_folds_normalizer_counters() {
        let raw = vec![
            extraction(
                "c1",
                vec![
                    RawMemory::new("Remember: user likes coffee in the morning", "preference", 0.9),
                    RawMemory::new("", "fact", 0.9),
                    RawMemory::new("Plays the cello", "hobby", 1.4),
                ],
            ),
            extraction("c2", vec![RawMemory::new("I like coffee in the morning.", "preference", 0.8)]),
        ];

        let result = process(raw, &ConsolidationConfig::default()).unwrap();
        let stats = &result.statistics;

        assert_eq!(stats.input_count, 3);
        assert_eq!(stats.malformed_dropped, 1);
        assert_eq!(stats.confidence_clamped, 1);
        assert_eq!(stats.categories_coerced, 1);
        assert_eq!(stats.output_count, result.memories.len());

        let cello = result.memories.iter().find(|m| m.text == "Plays the cello").unwrap();
        assert_eq!(cello.category, MemoryCategory::Context);
        assert_eq!(cello.confidence, 1.0);
    }

    #[test]
    fn test_process_rejects_bad_config_before_work() {
        let config = ConsolidationConfig {
            similarity_threshold: f64::NAN,
            ..Default::default()
        };
        let err = process(vec![], &config).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_process_is_deterministic() {
        let raw = vec![
            extraction("b", vec![RawMemory::new("Lives in Oslo", "fact", 0.9)]),
            extraction("a", vec![RawMemory::new("lives in oslo", "fact", 0.95)]),
        ];
        let mut reversed = raw.clone();
        reversed.reverse();

        let config = ConsolidationConfig::default();
        let first = process(raw, &config).unwrap();
        let second = process(reversed, &config).unwrap();
        assert_eq!(first.memories, second.memories);
        assert_eq!(first.statistics, second.statistics);
        assert_eq!(first.memories[0].id.as_str(), "a/0/0");
    }
}
