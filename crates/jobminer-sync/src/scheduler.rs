//! Daily cron trigger around [`run_once`].

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, info_span, warn, Instrument};

use crate::config::SyncConfig;
use crate::run::run_once_with_cancel;

/// Builds (but does not start) a scheduler that syncs every enabled source
/// in turn on `config.schedule_cron`. Failures are logged and the next tick
/// retries from the stored checkpoint.
///
/// Cancelling `cancel` pauses the run in flight between pages and makes
/// later ticks do nothing.
pub async fn build_scheduler(config: SyncConfig, cancel: CancellationToken) -> Result<JobScheduler> {
    let source_ids: Vec<String> = config
        .load_sources()?
        .enabled()
        .map(|source| source.source_id.clone())
        .collect();
    let cron = config.schedule_cron.clone();
    let source_count = source_ids.len();
    let config = Arc::new(config);
    let source_ids = Arc::new(source_ids);

    let sched = JobScheduler::new().await.context("creating scheduler")?;
    let job = Job::new_async(cron.as_str(), move |uuid, _lock| {
        let config = Arc::clone(&config);
        let source_ids = Arc::clone(&source_ids);
        let cancel = cancel.clone();
        Box::pin(
            async move {
                run_tick(&config, &source_ids, &cancel).await;
            }
            .instrument(info_span!("scheduled_sync", job = %uuid)),
        )
    })
    .with_context(|| format!("creating scheduler job for cron {cron}"))?;
    sched.add(job).await.context("adding scheduler job")?;

    info!(%cron, sources = source_count, "scheduler configured");
    Ok(sched)
}

/// One cron tick. Returns how many sources were started.
async fn run_tick(config: &SyncConfig, source_ids: &[String], cancel: &CancellationToken) -> usize {
    let mut started = 0;
    for source_id in source_ids {
        if cancel.is_cancelled() {
            warn!(source = %source_id, "shutdown requested; skipping remaining sources");
            break;
        }
        started += 1;
        match run_once_with_cancel(config, source_id, cancel).await {
            Ok(summary) => info!(
                source = %source_id,
                inserted = summary.inserted,
                updated = summary.updated,
                outcome = ?summary.outcome,
                "scheduled sync finished"
            ),
            Err(err) => error!(source = %source_id, error = ?err, "scheduled sync failed"),
        }
    }
    started
}
