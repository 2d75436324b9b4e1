//! Terminal and JSON reporting of pipeline results.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;

use memloader_core::loader::UploadStatistics;
use memloader_core::{Consolidation, ConsolidatedMemory, ProcessingStatistics};

/// Number of memories shown by `print_samples`.
const SAMPLE_SIZE: usize = 5;

/// On-disk form of a consolidation run.
#[derive(Serialize)]
pub struct ConsolidationReport<'a> {
    pub generated_at: DateTime<Utc>,
    pub statistics: &'a ProcessingStatistics,
    pub memories: &'a [ConsolidatedMemory],
}

impl<'a> ConsolidationReport<'a> {
    pub fn new(result: &'a Consolidation) -> Self {
        Self {
            generated_at: Utc::now(),
            statistics: &result.statistics,
            memories: &result.memories,
        }
    }
}

pub fn write_json(path: &Path, result: &Consolidation) -> Result<()> {
    let json = serde_json::to_string_pretty(&ConsolidationReport::new(result))?;
    std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} Wrote {} memories to {}", "✓".green(), result.memories.len(), path.display());
    Ok(())
}

/// Progress bar in the CLI's style.
pub fn progress_bar(len: usize, message: &'static str) -> ProgressBar {
    let bar = ProgressBar::new(len as u64);
    if let Ok(style) = ProgressStyle::with_template("  {msg} [{bar:40.cyan/blue}] {pos}/{len} ({eta})") {
        bar.set_style(style.progress_chars("=> "));
    }
    bar.set_message(message);
    bar
}

/// Spinner for waits of unknown length.
pub fn spinner(message: String) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("  {spinner:.cyan} {msg} ({elapsed})") {
        bar.set_style(style);
    }
    bar.set_message(message);
    bar.enable_steady_tick(Duration::from_millis(120));
    bar
}

pub fn print_statistics(stats: &ProcessingStatistics) {
    println!();
    println!("{}", "Processing Statistics".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Candidates:             {}", stats.input_count);
    println!("  Low confidence:         {}", stats.low_confidence_filtered);
    println!("  Duplicates removed:     {}", stats.duplicates_removed);
    println!("  Merged memories:        {}", stats.merged_memories);
    println!("  Final memories:         {}", stats.output_count.to_string().green().bold());

    if stats.anomaly_count() > 0 {
        println!(
            "  {} {} malformed dropped, {} confidences clamped, {} categories coerced",
            "⚠".yellow(),
            stats.malformed_dropped,
            stats.confidence_clamped,
            stats.categories_coerced
        );
    }

    if !stats.categories.is_empty() {
        println!();
        println!("  {}", "Categories:".cyan());
        for (category, count) in &stats.categories {
            println!("    {:<20} {}", category.as_str(), count);
        }
    }

    if stats.output_count > 0 {
        let c = &stats.confidence;
        println!();
        println!(
            "  {} min {:.2}  max {:.2}  mean {:.2}  median {:.2}",
            "Confidence:".cyan(),
            c.min,
            c.max,
            c.mean,
            c.median
        );
    }
}

pub fn print_samples(memories: &[ConsolidatedMemory]) {
    if memories.is_empty() {
        return;
    }
    println!();
    println!("{}", "Sample memories:".cyan());
    for (i, memory) in memories.iter().take(SAMPLE_SIZE).enumerate() {
        println!(
            "  {}. [{}] {} (confidence: {:.2})",
            i + 1,
            memory.category.as_str().yellow(),
            memory.text,
            memory.confidence
        );
    }
    if memories.len() > SAMPLE_SIZE {
        println!("  ... and {} more", memories.len() - SAMPLE_SIZE);
    }
}

pub fn print_upload(stats: &UploadStatistics) {
    println!();
    println!("{}", "Upload Results".cyan().bold());
    println!("{}", "─".repeat(50));
    println!("  Processed:    {}", stats.total_processed);
    println!("  Uploaded:     {}", stats.uploaded.to_string().green());
    println!("  Failed:       {}", stats.failed);
    println!("  Success rate: {:.1}%", stats.success_rate * 100.0);
    println!();

    if stats.failed == 0 {
        println!("{} Upload completed successfully", "✓".green());
    } else {
        println!("{} Upload completed with failures. Check logs for details.", "⚠".yellow());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use memloader_core::types::{CandidateId, MemoryCategory};

    #[test]
    fn test_report_json_shape() {
        let id = CandidateId::new("conv", 0, 0);
        let result = Consolidation {
            memories: vec![ConsolidatedMemory {
                id: id.clone(),
                text: "Likes tea".into(),
                category: MemoryCategory::Preference,
                confidence: 0.9,
                source_conversation_id: "conv".into(),
                source_excerpt: None,
                created_at: None,
                merged_from: vec![id],
                merge_count: 1,
            }],
            statistics: ProcessingStatistics::default(),
        };

        let json = serde_json::to_value(ConsolidationReport::new(&result)).unwrap();
        assert_eq!(json["memories"][0]["category"], "preference");
        assert_eq!(json["statistics"]["output_count"], 0);
        assert!(json["generated_at"].is_string());
    }

    #[test]
    fn test_write_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.json");
        write_json(&path, &Consolidation::default()).unwrap();

        let written: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["memories"], serde_json::json!([]));
    }
}
