//! Cache command - inspect or clear the artifact cache

use crate::cache::{format_bytes, ArtifactCache, CachedArtifact};
use crate::cli::args::{CacheAction, CacheArgs, OutputFormat};
use crate::config::Config;
use crate::error::DevloopResult;
use crate::pipeline::BuildLayout;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the cache command
pub async fn execute(args: CacheArgs, config: &Config) -> DevloopResult<()> {
    let cache = ArtifactCache::open(&BuildLayout::resolve(config).cache_dir)?;

    match args.action {
        CacheAction::List { format } => list_artifacts(&cache, format),
        CacheAction::Info => show_info(&cache, config),
        CacheAction::Clear { yes } => clear_artifacts(&cache, config, yes).await,
    }
}

fn list_artifacts(cache: &ArtifactCache, format: OutputFormat) -> DevloopResult<()> {
    let artifacts = cache.list()?;

    if artifacts.is_empty() && !matches!(format, OutputFormat::Json) {
        println!("No cached artifacts found.");
        return Ok(());
    }

    match format {
        OutputFormat::Table => print_artifact_table(&artifacts),
        OutputFormat::Json => print_artifact_json(&artifacts)?,
        OutputFormat::Plain => {
            for artifact in &artifacts {
                println!("{}", artifact.path.display());
            }
        }
    }
    Ok(())
}

fn print_artifact_table(artifacts: &[CachedArtifact]) {
    println!(
        "{:<40} {:<14} {:>10} {:<20}",
        "SOURCE", "FINGERPRINT", "SIZE", "CREATED"
    );
    println!("{}", "-".repeat(87));

    for artifact in artifacts {
        println!(
            "{:<40} {:<14} {:>10} {:<20}",
            artifact.source_name,
            style(artifact.fingerprint.short()).dim(),
            format_bytes(artifact.size_bytes),
            artifact.created_at.format("%Y-%m-%d %H:%M")
        );
    }

    let total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
    println!();
    println!(
        "Total: {} artifact(s), {}",
        artifacts.len(),
        format_bytes(total)
    );
}

fn print_artifact_json(artifacts: &[CachedArtifact]) -> DevloopResult<()> {
    #[derive(serde::Serialize)]
    struct ArtifactJson {
        source: String,
        fingerprint: String,
        path: String,
        size_bytes: u64,
        created_at: String,
    }

    let json: Vec<ArtifactJson> = artifacts
        .iter()
        .map(|a| ArtifactJson {
            source: a.source_name.clone(),
            fingerprint: a.fingerprint.to_string(),
            path: a.path.display().to_string(),
            size_bytes: a.size_bytes,
            created_at: a.created_at.to_rfc3339(),
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}

fn show_info(cache: &ArtifactCache, config: &Config) -> DevloopResult<()> {
    let ctx = super::ui_context(config);
    let artifacts = cache.list()?;
    let total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();

    ui::key_value(&ctx, "Location", &cache.dir().display().to_string());
    ui::key_value(&ctx, "Artifacts", &artifacts.len().to_string());
    ui::key_value(&ctx, "Size", &format_bytes(total));
    if let Some(newest) = artifacts.first() {
        ui::key_value(
            &ctx,
            "Newest",
            &format!(
                "{} ({})",
                newest.source_name,
                newest.created_at.format("%Y-%m-%d %H:%M")
            ),
        );
    }
    Ok(())
}

async fn clear_artifacts(cache: &ArtifactCache, config: &Config, yes: bool) -> DevloopResult<()> {
    let ctx = UiContext::detect()
        .with_plain(config.general.log_format == "json")
        .with_auto_yes(yes);
    let artifacts = cache.list()?;

    if artifacts.is_empty() {
        println!("No cached artifacts to clear.");
        return Ok(());
    }

    let total: u64 = artifacts.iter().map(|a| a.size_bytes).sum();
    let question = format!(
        "Remove {} artifact(s) ({}) from {}?",
        artifacts.len(),
        format_bytes(total),
        cache.dir().display()
    );
    if !ui::confirm(&ctx, &question, false).await? {
        ui::remark(&ctx, "Cancelled; pass --yes to clear without a prompt");
        return Ok(());
    }

    let removed = cache.clear()?;
    ui::step_ok(&ctx, &format!("Removed {} artifact(s)", removed));
    Ok(())
}
