//! Subcommand implementations.

use anyhow::{Context, Result};
use rollcall_browser::BrowserEngine;
use rollcall_core::{AppConfig, Identifier, LocalClock};
use rollcall_pipeline::{ForumExtractor, PipelineError, RunConfig, RunOrchestrator, RunReport};
use rollcall_store::{profiles, run_list, tags, Database};
use serde::Serialize;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Load, override from the environment, and validate the configuration.
pub fn load_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load().context("failed to load config")?,
    }
    .with_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn open_store(config: &AppConfig) -> Result<Database> {
    let path = config.database_path()?;
    Database::open(&path)
        .await
        .with_context(|| format!("failed to open database {}", path.display()))
}

pub async fn run(
    config: &AppConfig,
    max_profiles: Option<usize>,
    batch_size: Option<usize>,
    json: bool,
) -> Result<ExitCode> {
    let clock = LocalClock::new(config.general.utc_offset_minutes)?;
    let mut run_config = RunConfig::from_app_config(config);
    if let Some(max) = max_profiles {
        run_config.max_targets = (max > 0).then_some(max);
    }
    if let Some(size) = batch_size {
        run_config.batch_size = size;
    }

    let db = Arc::new(open_store(config).await?);
    db.ping().await.context("database is not answering")?;
    let browser = Arc::new(
        BrowserEngine::launch(&config.browser)
            .await
            .context("failed to launch browser")?,
    );
    info!("Browser ready ({})", browser.user_agent());
    let extractor = ForumExtractor::from_config(Arc::clone(&browser), config, clock)
        .context("invalid browser.base_url")?;

    let cancel = CancellationToken::new();
    let orchestrator = RunOrchestrator::new(
        Arc::clone(&db),
        Arc::new(extractor),
        run_config,
        clock,
    )
    .with_cancellation(cancel.clone());

    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, stopping after the current target");
            cancel.cancel();
        }
    });

    let result = orchestrator.run_configured().await;

    ctrl_c.abort();
    browser.close().await;
    db.close().await;

    match result {
        Ok(report) => {
            print_report(&report, json)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(PipelineError::Interrupted { stats }) => {
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!(
                    "Run interrupted: {} processed, {} new, {} duplicates, {} errors",
                    stats.processed, stats.new_profiles, stats.duplicates, stats.errors
                );
            }
            Ok(ExitCode::FAILURE)
        }
        Err(e) => Err(e.into()),
    }
}

fn print_report(report: &RunReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

pub async fn enqueue(config: &AppConfig, nicknames: &[String], source: &str) -> Result<ExitCode> {
    let db = open_store(config).await?;
    let queued = enqueue_into(&db, nicknames, source).await?;
    db.close().await;
    println!("Queued {queued} of {} nicknames", nicknames.len());
    Ok(ExitCode::SUCCESS)
}

async fn enqueue_into(db: &Database, nicknames: &[String], source: &str) -> Result<usize> {
    let mut queued = 0;
    for nick in nicknames {
        let Ok(identifier) = Identifier::new(nick.as_str()) else {
            warn!("Skipping blank nickname");
            continue;
        };
        let row = run_list::enqueue_target(db.pool(), &identifier, source).await?;
        info!("Queued {} at row {}", identifier, row);
        queued += 1;
    }
    Ok(queued)
}

pub async fn tag(config: &AppConfig, tag: &str, nicknames: &[String]) -> Result<ExitCode> {
    let db = open_store(config).await?;
    let mut tagged = 0;
    for nick in nicknames {
        let Ok(identifier) = Identifier::new(nick.as_str()) else {
            warn!("Skipping blank nickname");
            continue;
        };
        tags::assign_tag(db.pool(), tag, &identifier).await?;
        tagged += 1;
    }
    db.close().await;
    println!("Tagged {tagged} nicknames with {tag:?}");
    Ok(ExitCode::SUCCESS)
}

#[derive(Debug, Serialize)]
struct QueueSummary {
    schema_version: i64,
    run_list: Vec<StatusCount>,
    profile_rows: i64,
}

#[derive(Debug, Serialize)]
struct StatusCount {
    status: String,
    count: i64,
}

async fn summarize(db: &Database) -> Result<QueueSummary> {
    let run_list = run_list::count_by_status(db.pool())
        .await?
        .into_iter()
        .map(|(status, count)| StatusCount { status, count })
        .collect();
    let profile_rows = profiles::profile_count(db.pool()).await?;
    Ok(QueueSummary {
        schema_version: db.get_schema_version().await?,
        run_list,
        profile_rows,
    })
}

pub async fn status(config: &AppConfig, json: bool) -> Result<ExitCode> {
    let db = open_store(config).await?;
    let summary = summarize(&db).await?;
    db.close().await;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run list:");
        if summary.run_list.is_empty() {
            println!("  (empty)");
        }
        for entry in &summary.run_list {
            println!("  {:<8} {}", entry.status, entry.count);
        }
        println!("Profile rows: {}", summary.profile_rows);
        println!("Schema version: {}", summary.schema_version);
    }
    Ok(ExitCode::SUCCESS)
}

pub async fn reset_errors(config: &AppConfig) -> Result<ExitCode> {
    let clock = LocalClock::new(config.general.utc_offset_minutes)?;
    let db = open_store(config).await?;
    let reset = run_list::reset_errors(db.pool(), &format!("Requeued @ {}", clock.stamp())).await?;
    db.close().await;
    println!("Requeued {reset} targets");
    Ok(ExitCode::SUCCESS)
}
