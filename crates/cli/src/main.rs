use anyhow::Result;
use clap::Parser;
use colored::*;
use serde_json::json;
use shroud::builder::{
    conversation_store_from_config, detector_from_config, entity_store_from_config,
    replacer_from_config,
};
use shroud::config::{
    ConversationStoreBackend, DetectorBackend, EntityStoreBackend, ShroudConfig,
};
use shroud::detect::Detector;
use shroud::replace::Replacer;
use shroud::store::{ConversationStore, EntityStore};
use shroud::thread::ThreadId;

mod cli_args;
mod tracing;

use cli_args::{CliArgs, Commands};
use crate::tracing::setup_logging;

#[tokio::main]
async fn main() -> Result<()> {
    setup_logging();
    let args = CliArgs::parse();

    let mut config = match &args.config {
        Some(path) => ShroudConfig::from_path(path)?,
        None => ShroudConfig::default(),
    };
    if args.offline {
        config.detector.backend = DetectorBackend::Regex;
        config.entity_store.backend = EntityStoreBackend::Memory;
        config.conversation_store.backend = ConversationStoreBackend::Memory;
    }
    config.validate()?;

    match args.command {
        Commands::Redact { thread, text } => redact(&config, &thread, &text).await,
        Commands::Restore { thread, text } => restore(&config, &thread, &text).await,
        Commands::Mappings { thread, json } => mappings(&config, &thread, json).await,
        Commands::Clear { thread } => clear(&config, &thread).await,
        Commands::Stats => stats(&config).await,
    }
}

async fn redact(config: &ShroudConfig, thread: &str, text: &str) -> Result<()> {
    let detector = detector_from_config(config).await?;
    let entity_store = entity_store_from_config(config).await?;
    let replacer = replacer_from_config(config, entity_store)?;

    let mut results = detector.detect(&[text.to_string()], None).await?;
    let entities = results.remove(0);
    let thread_id = ThreadId::from_key(thread);
    let redacted = replacer.replace(text, &entities, thread_id).await?;

    eprintln!(
        "{}",
        format!("{} entities redacted (thread {thread_id})", entities.len()).dimmed()
    );
    println!("{redacted}");
    Ok(())
}

async fn restore(config: &ShroudConfig, thread: &str, text: &str) -> Result<()> {
    let entity_store = entity_store_from_config(config).await?;
    let replacer = replacer_from_config(config, entity_store)?;
    let restored = replacer
        .restore(text, ThreadId::from_key(thread))
        .await?;
    println!("{restored}");
    Ok(())
}

async fn mappings(config: &ShroudConfig, thread: &str, as_json: bool) -> Result<()> {
    let entity_store = entity_store_from_config(config).await?;
    let thread_id = ThreadId::from_key(thread);
    let placeholders = entity_store.list_placeholders(thread_id).await?;

    if as_json {
        let mut entries = Vec::new();
        for placeholder in &placeholders {
            if let Some((original, label)) = entity_store.get_original(thread_id, placeholder).await?
            {
                entries.push(json!({
                    "placeholder": placeholder,
                    "original": original,
                    "label": label,
                }));
            }
        }
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if placeholders.is_empty() {
        println!("{}", format!("no mappings for thread {thread_id}").dimmed());
        return Ok(());
    }
    for placeholder in &placeholders {
        if let Some((original, label)) = entity_store.get_original(thread_id, placeholder).await? {
            println!(
                "{} {} {} {}",
                placeholder.cyan(),
                "->".dimmed(),
                original,
                format!("({label})").dimmed()
            );
        }
    }
    Ok(())
}

async fn clear(config: &ShroudConfig, thread: &str) -> Result<()> {
    let thread_id = ThreadId::from_key(thread);
    let entity_store = entity_store_from_config(config).await?;
    entity_store.clear(thread_id).await?;
    let conversations = conversation_store_from_config(config).await?;
    conversations.clear(thread_id).await?;
    println!("cleared thread {}", thread_id.to_string().cyan());
    Ok(())
}

async fn stats(config: &ShroudConfig) -> Result<()> {
    let entity_store = entity_store_from_config(config).await?;
    let stats = entity_store.stats().await?;
    println!(
        "{} threads, {} mapping entries",
        stats.contexts.to_string().cyan(),
        stats.entries.to_string().cyan()
    );
    Ok(())
}
