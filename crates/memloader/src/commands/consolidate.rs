//! `memloader consolidate`: re-run consolidation over saved extractions.

use std::path::Path;

use anyhow::{Context, Result};

use memloader_core::{pipeline, Consolidation, RawExtraction};

use crate::cli::ConsolidateArgs;
use crate::config::Config;
use crate::report::{self, ConsolidationReport};

pub fn execute(args: ConsolidateArgs, config: &Config) -> Result<()> {
    let mut config = config.clone();
    super::apply_consolidation_args(&mut config, &args.consolidation);
    config.consolidation.validate().context("Invalid consolidation settings")?;

    let result = run(&args.candidates, &config)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ConsolidationReport::new(&result))?);
    } else {
        report::print_statistics(&result.statistics);
        report::print_samples(&result.memories);
    }

    if let Some(path) = &args.output {
        report::write_json(path, &result)?;
    }
    Ok(())
}

fn run(candidates: &Path, config: &Config) -> Result<Consolidation> {
    let content = std::fs::read_to_string(candidates)
        .with_context(|| format!("Failed to read {}", candidates.display()))?;
    let extractions: Vec<RawExtraction> = serde_json::from_str(&content)
        .with_context(|| format!("{} is not a list of raw extractions", candidates.display()))?;

    Ok(pipeline::process(extractions, &config.consolidation)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAVED: &str = r#"[
        {
            "conversation_id": "c1",
            "chunk_index": 0,
            "memories": [
                {"content": "User prefers dark mode", "category": "preference", "confidence": 0.9},
                {"content": "User prefers dark mode", "category": "preference", "confidence": 0.8},
                {"content": "Maybe likes jazz", "category": "preference", "confidence": 0.3}
            ]
        }
    ]"#;

    #[test]
    fn test_run_from_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, SAVED).unwrap();

        let result = run(&path, &Config::default()).unwrap();
        assert_eq!(result.memories.len(), 1);
        assert_eq!(result.memories[0].merge_count, 2);
        assert_eq!(result.statistics.low_confidence_filtered, 1);
    }

    #[test]
    fn test_rejects_non_extraction_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("raw.json");
        std::fs::write(&path, r#"{"memories": []}"#).unwrap();

        assert!(run(&path, &Config::default()).is_err());
    }

    #[test]
    fn test_writes_output_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("raw.json");
        let output = dir.path().join("out.json");
        std::fs::write(&input, SAVED).unwrap();

        let args = ConsolidateArgs {
            candidates: input,
            consolidation: Default::default(),
            output: Some(output.clone()),
            json: false,
        };
        execute(args, &Config::default()).unwrap();

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
        assert_eq!(written["statistics"]["output_count"], 1);
    }
}
