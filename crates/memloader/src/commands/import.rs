//! `memloader import`: export file to memory store.

use anyhow::{Context, Result};
use colored::Colorize;
use dialoguer::Confirm;
use tracing::warn;

use memloader_core::extract::{self, MemoryExtractor, OllamaExtractor, OpenAiExtractor, Provider};
use memloader_core::loader::{self, Mem0Loader, MemoryLoader, OpenMemoryLoader, Target};
use memloader_core::transcript::{self, ConversationChunk};
use memloader_core::{pipeline, RawExtraction};

use crate::cli::ImportArgs;
use crate::config::Config;
use crate::error::CliError;
use crate::report;

pub async fn execute(args: ImportArgs, config: &Config) -> Result<()> {
    if !args.export_file.exists() {
        return Err(CliError::ExportNotFound(args.export_file).into());
    }

    let config = resolve_config(&args, config)?;

    // Connect to everything before spending time on extraction
    let extraction = build_extraction(&config, args.use_batch).await?;
    let store = if args.dry_run {
        None
    } else {
        Some(build_loader(&config).await?)
    };

    if let Some(store) = &store {
        if args.clear_existing {
            clear_store(store.as_ref(), args.yes).await?;
        }
    }

    println!("Parsing ChatGPT export...");
    let mut conversations = transcript::parse_export(&args.export_file)
        .with_context(|| format!("Failed to parse {}", args.export_file.display()))?;
    if let Some(limit) = args.limit {
        conversations.truncate(limit);
    }
    if conversations.is_empty() {
        println!("{}", "No conversations found in export file.".yellow());
        return Ok(());
    }
    println!("Found {} conversations", conversations.len());

    let chunks: Vec<ConversationChunk> = conversations
        .iter()
        .flat_map(|c| transcript::conversation_chunks(c, &config.chunking))
        .collect();

    let extractions = run_extraction(&extraction, &chunks, &config).await?;
    let raw_count: usize = extractions.iter().map(|e| e.memories.len()).sum();
    println!("Extracted {} raw memories", raw_count);

    if let Some(path) = &args.save_candidates {
        let json = serde_json::to_string_pretty(&extractions)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!("{} Saved raw extractions to {}", "✓".green(), path.display());
    }

    if raw_count == 0 {
        println!(
            "{}",
            "No memories extracted. Check your export file and model configuration.".yellow()
        );
        return Ok(());
    }

    let result = pipeline::process(extractions, &config.consolidation)?;
    report::print_statistics(&result.statistics);

    if let Some(path) = &args.output {
        report::write_json(path, &result)?;
    }

    let Some(store) = store else {
        report::print_samples(&result.memories);
        println!();
        println!("{}", "Dry run complete. No memories uploaded.".cyan());
        return Ok(());
    };

    println!();
    println!("Uploading to {}...", store.name());
    let existing = match store.existing_memories().await {
        Ok(existing) => existing,
        Err(e) => {
            warn!("Could not fetch existing memories, skipping duplicate check: {}", e);
            Vec::new()
        }
    };
    let prepared = loader::prepare_for_upload(result.memories, &existing, &config.loader.policy);
    if prepared.memories.is_empty() {
        println!("No new memories to upload (all filtered out or already stored).");
        return Ok(());
    }
    println!("Prepared {} memories for upload", prepared.memories.len());

    let bar = report::progress_bar(prepared.memories.len(), "Uploading");
    let stats = loader::upload_all(
        store.as_ref(),
        &prepared.memories,
        &config.loader.upload_options(),
        |_, _| bar.inc(1),
    )
    .await;
    bar.finish_and_clear();

    report::print_upload(&stats);
    Ok(())
}

/// Layer command-line flags over the loaded configuration.
fn resolve_config(args: &ImportArgs, config: &Config) -> Result<Config> {
    let mut config = config.clone();

    if let Some(provider) = args.provider {
        config.extraction.provider = provider;
    }
    if let Some(model) = &args.model {
        config.extraction.set_model(model.clone());
    }
    super::apply_consolidation_args(&mut config, &args.consolidation);
    if let Some(batch_size) = args.batch_size {
        config.loader.batch_size = batch_size;
    }
    if let Some(target) = args.target {
        config.loader.target = target;
    }
    if let Some(key) = &args.mem0_api_key {
        config.loader.mem0.api_key = Some(key.clone());
    }
    if let Some(user_id) = &args.user_id {
        config.loader.set_user_id(user_id);
    }

    config.validate()?;
    Ok(config)
}

/// How chunks reach the model.
enum Extraction {
    /// One paced, retried request per chunk.
    Sequential(Box<dyn MemoryExtractor>),
    /// A single OpenAI batch job for every chunk.
    Batch(OpenAiExtractor),
}

async fn build_extraction(config: &Config, use_batch: bool) -> Result<Extraction> {
    if use_batch {
        if config.extraction.provider != Provider::OpenAi {
            anyhow::bail!(
                "--use-batch needs the openai provider (current provider: {})",
                config.extraction.provider
            );
        }
        return Ok(Extraction::Batch(openai_extractor(config)?));
    }
    Ok(Extraction::Sequential(build_extractor(config).await?))
}

async fn build_extractor(config: &Config) -> Result<Box<dyn MemoryExtractor>> {
    let extraction = &config.extraction;
    match extraction.provider {
        Provider::Ollama => {
            let extractor = OllamaExtractor::new(extraction.ollama.clone())?;
            extractor
                .ensure_model()
                .await
                .with_context(|| format!("Ollama is not reachable at {}", extraction.ollama.base_url))?;
            Ok(Box::new(extractor))
        }
        Provider::OpenAi => Ok(Box::new(openai_extractor(config)?)),
    }
}

fn openai_extractor(config: &Config) -> Result<OpenAiExtractor> {
    if config.extraction.openai.api_key.is_none() {
        return Err(CliError::MissingSetting {
            what: "OpenAI API key",
            env_var: "MEMLOADER_OPENAI_API_KEY",
            path: Config::config_path(),
        }
        .into());
    }
    Ok(OpenAiExtractor::new(config.extraction.openai.clone())?)
}

async fn build_loader(config: &Config) -> Result<Box<dyn MemoryLoader>> {
    match config.loader.target {
        Target::Mem0 => {
            if config.loader.mem0.api_key.is_none() {
                return Err(CliError::MissingSetting {
                    what: "Mem0 API key",
                    env_var: "MEM0_API_KEY",
                    path: Config::config_path(),
                }
                .into());
            }
            Ok(Box::new(Mem0Loader::new(config.loader.mem0.clone())?))
        }
        Target::OpenMemory => {
            let store = OpenMemoryLoader::new(config.loader.openmemory.clone())?;
            store.check_connection().await?;
            Ok(Box::new(store))
        }
    }
}

async fn clear_store(store: &dyn MemoryLoader, assume_yes: bool) -> Result<()> {
    if !assume_yes {
        let confirmed = Confirm::new()
            .with_prompt(format!("Delete ALL existing memories in {}?", store.name()))
            .default(false)
            .interact()?;
        if !confirmed {
            println!("{}", "Keeping existing memories.".yellow());
            return Ok(());
        }
    }

    let deleted = loader::clear_existing(store).await?;
    println!("{} Deleted {} existing memories", "✓".green(), deleted);
    Ok(())
}

async fn run_extraction(
    extraction: &Extraction,
    chunks: &[ConversationChunk],
    config: &Config,
) -> Result<Vec<RawExtraction>> {
    let run = match extraction {
        Extraction::Sequential(extractor) => {
            println!(
                "Extracting memories from {} chunks with {}...",
                chunks.len(),
                extractor.name()
            );
            let bar = report::progress_bar(chunks.len(), "Extracting");
            let run =
                extract::extract_all(extractor.as_ref(), chunks, &config.extraction.options(), |_| bar.inc(1)).await;
            bar.finish_and_clear();
            run
        }
        Extraction::Batch(extractor) => {
            println!(
                "Submitting {} chunks as an OpenAI batch job with {}...",
                chunks.len(),
                extractor.name()
            );
            let spinner = report::spinner("Waiting for batch".to_string());
            let run = extractor
                .extract_batch(chunks, |status| spinner.set_message(format!("Batch status: {}", status)))
                .await;
            spinner.finish_and_clear();
            run.context("OpenAI batch extraction failed")?
        }
    };

    if run.failed_chunks > 0 {
        println!(
            "{} {} of {} chunks failed and were skipped",
            "⚠".yellow(),
            run.failed_chunks,
            chunks.len()
        );
    }
    Ok(run.extractions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    fn import_args(extra: &[&str]) -> ImportArgs {
        let mut argv = vec!["memloader", "import", "conversations.json"];
        argv.extend_from_slice(extra);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Import(args) => args,
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_resolve_config_applies_flags() {
        let args = import_args(&[
            "--provider",
            "openai",
            "--model",
            "gpt-4.1-nano",
            "--user-id",
            "carol",
            "--batch-size",
            "7",
            "--mem0-api-key",
            "m0",
        ]);
        let config = resolve_config(&args, &Config::default()).unwrap();

        assert_eq!(config.extraction.provider, Provider::OpenAi);
        assert_eq!(config.extraction.openai.model, "gpt-4.1-nano");
        assert_eq!(config.extraction.ollama.model, "nuextract");
        assert_eq!(config.loader.user_id(), "carol");
        assert_eq!(config.loader.batch_size, 7);
        assert_eq!(config.loader.mem0.api_key.as_deref(), Some("m0"));
    }

    #[test]
    fn test_resolve_config_rejects_bad_threshold() {
        let args = import_args(&["--confidence-threshold", "1.2"]);
        assert!(resolve_config(&args, &Config::default()).is_err());
    }

    #[test]
    fn test_missing_export_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut args = import_args(&["--dry-run"]);
        args.export_file = dir.path().join("missing.json");

        let err = tokio_test::block_on(execute(args, &Config::default())).unwrap_err();
        assert!(err.downcast_ref::<CliError>().is_some());
    }

    #[test]
    fn test_openai_without_key_is_reported() {
        let mut config = Config::default();
        config.extraction.provider = Provider::OpenAi;
        let err = tokio_test::block_on(build_extractor(&config)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::MissingSetting { what: "OpenAI API key", .. })
        ));
    }

    #[test]
    fn test_batch_requires_openai() {
        let err = tokio_test::block_on(build_extraction(&Config::default(), true)).err().unwrap();
        assert!(err.to_string().contains("--use-batch"));
    }

    #[test]
    fn test_batch_uses_openai_extractor() {
        let mut config = Config::default();
        config.extraction.provider = Provider::OpenAi;
        config.extraction.openai.api_key = Some("sk-test".into());

        let extraction = tokio_test::block_on(build_extraction(&config, true)).unwrap();
        assert!(matches!(extraction, Extraction::Batch(_)));
    }

    #[test]
    fn test_mem0_without_key_is_reported() {
        let config = Config::default();
        let err = tokio_test::block_on(build_loader(&config)).err().unwrap();
        assert!(matches!(
            err.downcast_ref::<CliError>(),
            Some(CliError::MissingSetting { env_var: "MEM0_API_KEY", .. })
        ));
    }
}
