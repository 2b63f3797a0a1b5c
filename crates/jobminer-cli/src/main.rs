use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use jobminer_storage::{FileCheckpointStore, PgListingStore};
use jobminer_sync::{build_scheduler, run_once_with_cancel, CheckpointTracker, RunSummary, SyncConfig};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "jobminer")]
#[command(about = "Job board harvester")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one sync pass (all enabled sources unless --source is given).
    Sync {
        #[arg(long)]
        source: Option<String>,
    },
    /// Apply pending database migrations.
    Migrate,
    /// Run the daily sync on the configured cron until interrupted.
    Schedule,
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
}

#[derive(Debug, Subcommand)]
enum CheckpointAction {
    Show { source: String },
    /// Forget pagination progress and seen ids for a source.
    Reset { source: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,jobminer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();

    let cli = Cli::parse();
    let config = SyncConfig::from_env()?;

    match cli.command.unwrap_or(Commands::Sync { source: None }) {
        Commands::Sync { source } => sync(&config, source).await?,
        Commands::Migrate => {
            let store = PgListingStore::connect(&config.database_url)
                .await
                .context("connecting to postgres")?;
            let result = store.migrate().await.context("running migrations");
            store.pool().close().await;
            result?;
            println!("migrations applied");
        }
        Commands::Schedule => {
            let cancel = CancellationToken::new();
            let mut sched = build_scheduler(config, cancel.clone()).await?;
            sched.start().await.context("starting scheduler")?;
            info!("scheduler running; press Ctrl-C to stop");
            tokio::signal::ctrl_c().await.context("waiting for Ctrl-C")?;
            warn!("interrupt received; pausing in-flight runs");
            cancel.cancel();
            sched.shutdown().await.context("stopping scheduler")?;
        }
        Commands::Checkpoint { action } => checkpoint(&config, action).await?,
    }

    Ok(())
}

async fn sync(config: &SyncConfig, source: Option<String>) -> Result<()> {
    let source_ids = match source {
        Some(source) => vec![source],
        None => config
            .load_sources()?
            .enabled()
            .map(|s| s.source_id.clone())
            .collect(),
    };
    if source_ids.is_empty() {
        bail!("no enabled sources in {}", config.sources_path().display());
    }

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received; stopping after the current page");
            on_ctrl_c.cancel();
        }
    });

    let mut failed = Vec::new();
    for source_id in &source_ids {
        if cancel.is_cancelled() {
            break;
        }
        match run_once_with_cancel(config, source_id, &cancel).await {
            Ok(summary) => print_summary(&summary),
            Err(err) => {
                eprintln!("{source_id}: sync failed: {err:#}");
                failed.push(source_id.as_str());
            }
        }
    }

    if !failed.is_empty() {
        bail!("sync failed for {}", failed.join(", "));
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{}: run_id={} outcome={:?} inserted={} updated={} skipped={} failed={} pages={} skipped_pages={}",
        summary.source,
        summary.run_id,
        summary.outcome,
        summary.inserted,
        summary.updated,
        summary.skipped,
        summary.failed,
        summary.pages_processed,
        summary.pages_skipped
    );
}

async fn checkpoint(config: &SyncConfig, action: CheckpointAction) -> Result<()> {
    let tracker = CheckpointTracker::new(Arc::new(FileCheckpointStore::new(
        &config.state_dir,
        config.lease_ttl(),
    )));

    match action {
        CheckpointAction::Show { source } => {
            let state = tracker
                .load(&source)
                .await
                .with_context(|| format!("loading checkpoint for {source}"))?;
            let json = serde_json::to_string_pretty(&state).context("serializing checkpoint")?;
            println!("{json}");
        }
        CheckpointAction::Reset { source } => {
            let _lease = tracker
                .acquire_lease(&source)
                .await
                .with_context(|| format!("{source} is being synced; try again later"))?;
            if tracker.reset(&source).await? {
                println!("checkpoint for {source} removed");
            } else {
                println!("no checkpoint stored for {source}");
            }
        }
    }
    Ok(())
}
