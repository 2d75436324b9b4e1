//! `memloader config`: inspect and initialize the config file.

use anyhow::{Context, Result};
use colored::Colorize;

use crate::cli::{ConfigAction, ConfigCommand};
use crate::config::Config;

pub fn execute(cmd: ConfigCommand, config: &Config) -> Result<()> {
    match cmd.action {
        ConfigAction::Show => show(config),
        ConfigAction::Init { force } => init(force),
        ConfigAction::Path => {
            println!("{}", Config::config_path().display());
            Ok(())
        }
    }
}

fn show(config: &Config) -> Result<()> {
    let path = Config::config_path();
    let source = if path.exists() { "file + environment" } else { "defaults + environment" };
    println!("{} {} ({})", "Config:".cyan().bold(), path.display(), source);
    println!();
    print!("{}", render(config)?);
    Ok(())
}

fn init(force: bool) -> Result<()> {
    let path = Config::config_path();
    if path.exists() && !force {
        println!(
            "{} Config already exists at {} (use --force to overwrite)",
            "⚠".yellow(),
            path.display()
        );
        return Ok(());
    }

    Config::default()
        .save(&path)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("{} Wrote default config to {}", "✓".green(), path.display());
    Ok(())
}

/// TOML rendering of `config` with API keys masked.
fn render(config: &Config) -> Result<String> {
    let mut shown = config.clone();
    shown.extraction.openai.api_key = shown.extraction.openai.api_key.as_deref().map(mask);
    shown.loader.mem0.api_key = shown.loader.mem0.api_key.as_deref().map(mask);
    toml::to_string_pretty(&shown).context("Failed to serialize config")
}

fn mask(secret: &str) -> String {
    let chars: Vec<char> = secret.chars().collect();
    if chars.len() <= 8 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{}", tail)
}
