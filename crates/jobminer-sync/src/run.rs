//! `run_once`: one source, one run, wired from configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use jobminer_adapters::adapter_for_source;
use jobminer_storage::{
    FileCheckpointStore, FixtureFetcher, HttpFetcher, ListingStore, PageFetcher, PgListingStore,
};
use tokio::fs;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::checkpoint::CheckpointTracker;
use crate::config::{SourceConfig, SyncConfig};
use crate::driver::{PipelineDriver, RunSummary};

pub async fn run_once(config: &SyncConfig, source_id: &str) -> Result<RunSummary> {
    run_once_with_cancel(config, source_id, &CancellationToken::new()).await
}

pub async fn run_once_from_env(source_id: &str) -> Result<RunSummary> {
    let config = SyncConfig::from_env()?;
    run_once(&config, source_id).await
}

/// Like [`run_once`], but stops between pages once `cancel` fires. The
/// checkpoint is left resumable in that case.
pub async fn run_once_with_cancel(
    config: &SyncConfig,
    source_id: &str,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let registry = config.load_sources()?;
    let Some(source) = registry.find(source_id) else {
        bail!(
            "source {source_id} is not listed in {}",
            config.sources_path().display()
        );
    };
    if !source.enabled {
        bail!("source {source_id} is disabled");
    }

    let fetcher = build_fetcher(config)?;
    let store: Arc<dyn ListingStore> = Arc::new(
        PgListingStore::connect(&config.database_url)
            .await
            .context("connecting to postgres")?,
    );

    let result = run_source(config, source, fetcher, store.clone(), cancel).await;
    store.close().await;
    result
}

/// Runs `source` against explicit collaborators. The caller owns the store
/// and closes it.
pub async fn run_source(
    config: &SyncConfig,
    source: &SourceConfig,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ListingStore>,
    cancel: &CancellationToken,
) -> Result<RunSummary> {
    let source_id = source.source_id.as_str();
    let adapter = adapter_for_source(source_id, source.base_url.as_deref())
        .with_context(|| format!("building adapter for {source_id}"))?
        .with_context(|| format!("no adapter registered for {source_id}"))?;

    let tracker = CheckpointTracker::new(Arc::new(FileCheckpointStore::new(
        &config.state_dir,
        config.lease_ttl(),
    )));
    let lease = tracker
        .acquire_lease(source_id)
        .await
        .with_context(|| format!("acquiring run lease for {source_id}"))?;
    let tracker = tracker.holding(lease);
    let state = tracker
        .load(source_id)
        .await
        .with_context(|| format!("loading checkpoint for {source_id}"))?;

    let driver = PipelineDriver::new(adapter, fetcher, store, tracker, config.driver_settings(source));
    let run = driver
        .run(state, cancel)
        .await
        .with_context(|| format!("running {source_id}"))?;

    if let Some(reports_dir) = &config.reports_dir {
        let path = write_report(reports_dir, &run.summary).await?;
        info!(source = source_id, report = %path.display(), "run report written");
    }
    Ok(run.summary)
}

fn build_fetcher(config: &SyncConfig) -> Result<Arc<dyn PageFetcher>> {
    Ok(match &config.fixtures_dir {
        Some(dir) => {
            info!(fixtures = %dir.display(), "reading pages from fixtures");
            Arc::new(FixtureFetcher::new(dir))
        }
        None => Arc::new(HttpFetcher::new(config.http_client_config())?),
    })
}

/// Writes `<reports_dir>/<source>/<run_id>.json`.
pub async fn write_report(reports_dir: &Path, summary: &RunSummary) -> Result<PathBuf> {
    let dir = reports_dir.join(&summary.source);
    fs::create_dir_all(&dir)
        .await
        .with_context(|| format!("creating {}", dir.display()))?;

    let path = dir.join(format!("{}.json", summary.run_id));
    let bytes = serde_json::to_vec_pretty(summary).context("serializing run summary")?;
    fs::write(&path, bytes)
        .await
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(path)
}
