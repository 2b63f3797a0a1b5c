//! Page-by-page pipeline: fetch, parse, reconcile, advance the checkpoint.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use jobminer_adapters::{ListingParseFailure, ListingParser, ParsedListing, SourceAdapter, StructuralDrift};
use jobminer_core::{CheckpointState, SkillTaxonomy};
use jobminer_storage::{
    CheckpointError, FetchError, ListingStore, PageFetcher, PageTransaction, RawPage, RetryPolicy,
    StoreError,
};
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::checkpoint::CheckpointTracker;
use crate::reconcile::{Decision, PageReconciler};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("checkpoint persistence failed: {0}")]
    Checkpoint(#[from] CheckpointError),
}

/// Where a run currently is; only used for tracing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Start,
    Fetching,
    Parsing,
    Reconciling,
    Checkpointing,
    Done,
    Aborted,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunPhase::Start => "start",
            RunPhase::Fetching => "fetching",
            RunPhase::Parsing => "parsing",
            RunPhase::Reconciling => "reconciling",
            RunPhase::Checkpointing => "checkpointing",
            RunPhase::Done => "done",
            RunPhase::Aborted => "aborted",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    /// Pagination ran out of pages or hit the page cap.
    Completed,
    /// The board asked us to slow down; the checkpoint stays resumable.
    RateLimited,
    Cancelled,
    TimedOut,
    Aborted { reason: String },
}

impl RunOutcome {
    pub fn is_aborted(&self) -> bool {
        matches!(self, RunOutcome::Aborted { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PageWarning {
    ListingSkipped(ListingParseFailure),
    StructuralDrift(StructuralDrift),
    FetchFailed { page_index: u32, error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub source: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub first_page: u32,
    pub inserted: usize,
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
    pub pages_processed: usize,
    pub pages_skipped: usize,
    pub field_fallbacks: usize,
    pub warnings: Vec<PageWarning>,
    pub outcome: RunOutcome,
}

impl RunSummary {
    fn new(run_id: Uuid, source: &str, first_page: u32) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            source: source.to_string(),
            started_at: now,
            finished_at: now,
            first_page,
            inserted: 0,
            updated: 0,
            skipped: 0,
            failed: 0,
            pages_processed: 0,
            pages_skipped: 0,
            field_fallbacks: 0,
            warnings: Vec::new(),
            outcome: RunOutcome::Completed,
        }
    }
}

/// Result of [`PipelineDriver::run`]: the summary plus the checkpoint value
/// as it was last persisted.
#[derive(Debug, Clone)]
pub struct DriverRun {
    pub summary: RunSummary,
    pub checkpoint: CheckpointState,
}

#[derive(Debug, Clone)]
pub struct DriverSettings {
    pub first_page: u32,
    /// Highest number of pages to visit in one run.
    pub max_pages: Option<u32>,
    pub retry: RetryPolicy,
    /// Consecutive skipped pages tolerated before the run is aborted.
    pub max_failed_pages: u32,
    pub run_timeout: Option<Duration>,
    /// Read each listing's offer page when the adapter supports it.
    pub fetch_details: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            first_page: 1,
            max_pages: None,
            retry: RetryPolicy::default(),
            max_failed_pages: 3,
            run_timeout: None,
            fetch_details: true,
        }
    }
}

/// Counts for one page, merged into the summary only after commit.
#[derive(Debug, Default)]
struct PageTally {
    inserted: usize,
    updated: usize,
    skipped: usize,
    failed: usize,
    field_fallbacks: usize,
    warnings: Vec<PageWarning>,
    external_ids: Vec<String>,
}

enum PageStep {
    Advanced,
    Skipped,
    Exhausted,
    Stop(RunOutcome),
}

pub struct PipelineDriver {
    adapter: Box<dyn SourceAdapter>,
    fetcher: Arc<dyn PageFetcher>,
    store: Arc<dyn ListingStore>,
    tracker: CheckpointTracker,
    taxonomy: &'static SkillTaxonomy,
    settings: DriverSettings,
}

impl PipelineDriver {
    pub fn new(
        adapter: Box<dyn SourceAdapter>,
        fetcher: Arc<dyn PageFetcher>,
        store: Arc<dyn ListingStore>,
        tracker: CheckpointTracker,
        settings: DriverSettings,
    ) -> Self {
        Self {
            adapter,
            fetcher,
            store,
            tracker,
            taxonomy: SkillTaxonomy::builtin(),
            settings,
        }
    }

    pub fn with_taxonomy(mut self, taxonomy: &'static SkillTaxonomy) -> Self {
        self.taxonomy = taxonomy;
        self
    }

    pub fn source(&self) -> &str {
        self.adapter.source()
    }

    /// Runs pages until pagination is exhausted or a stop condition hits.
    /// Cancellation and the run timeout are only observed between pages.
    pub async fn run(&self, state: CheckpointState, cancel: &CancellationToken) -> Result<DriverRun, RunError> {
        let run_id = Uuid::new_v4();
        let span = info_span!("run", %run_id, source = self.adapter.source());
        self.run_pages(run_id, state, cancel).instrument(span).await
    }

    async fn run_pages(
        &self,
        run_id: Uuid,
        mut state: CheckpointState,
        cancel: &CancellationToken,
    ) -> Result<DriverRun, RunError> {
        let settings = &self.settings;
        let first_page = state.resume_page(settings.first_page);
        let last_page = settings
            .max_pages
            .map(|cap| first_page.saturating_add(cap.saturating_sub(1)));
        let deadline = settings.run_timeout.map(|t| Instant::now() + t);

        self.tracker.begin_run(&mut state).await?;
        let mut summary = RunSummary::new(run_id, self.adapter.source(), first_page);
        info!(first_page, resumed = first_page != settings.first_page, "run started");
        debug!(phase = %RunPhase::Start);

        let mut page_index = first_page;
        let mut consecutive_skipped = 0u32;
        let outcome = loop {
            if cancel.is_cancelled() {
                break RunOutcome::Cancelled;
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                break RunOutcome::TimedOut;
            }
            if last_page.is_some_and(|last| page_index > last) {
                debug!(page_index, "page cap reached");
                break RunOutcome::Completed;
            }

            match self.process_page(page_index, &mut state, &mut summary).await? {
                PageStep::Advanced => consecutive_skipped = 0,
                PageStep::Skipped => {
                    summary.pages_skipped += 1;
                    consecutive_skipped += 1;
                    if consecutive_skipped > settings.max_failed_pages {
                        break RunOutcome::Aborted {
                            reason: format!("{consecutive_skipped} consecutive pages skipped"),
                        };
                    }
                }
                PageStep::Exhausted => break RunOutcome::Completed,
                PageStep::Stop(outcome) => break outcome,
            }
            page_index += 1;
        };

        match &outcome {
            RunOutcome::Completed => self.tracker.mark_completed(&mut state).await?,
            RunOutcome::Aborted { reason } => {
                debug!(phase = %RunPhase::Aborted);
                warn!(reason = %reason, "run aborted");
                self.tracker.mark_failed(&mut state).await?
            }
            RunOutcome::RateLimited | RunOutcome::Cancelled | RunOutcome::TimedOut => {
                self.tracker.mark_paused(&mut state).await?
            }
        }
        debug!(phase = %RunPhase::Done);

        summary.outcome = outcome;
        summary.finished_at = Utc::now();
        info!(
            inserted = summary.inserted,
            updated = summary.updated,
            skipped = summary.skipped,
            failed = summary.failed,
            pages = summary.pages_processed,
            outcome = ?summary.outcome,
            "run finished"
        );
        Ok(DriverRun {
            summary,
            checkpoint: state,
        })
    }

    async fn process_page(
        &self,
        page_index: u32,
        state: &mut CheckpointState,
        summary: &mut RunSummary,
    ) -> Result<PageStep, RunError> {
        debug!(phase = %RunPhase::Fetching, page_index);
        let page = match self.fetch_with_retry(page_index).await {
            Ok(page) => page,
            Err(FetchError::NotFound { url }) => {
                debug!(page_index, %url, "no further pages");
                return Ok(PageStep::Exhausted);
            }
            Err(FetchError::RateLimited { url, retry_after }) => {
                warn!(page_index, %url, ?retry_after, "rate limited; pausing run");
                return Ok(PageStep::Stop(RunOutcome::RateLimited));
            }
            Err(err) => {
                warn!(page_index, error = %err, "page fetch failed; skipping page");
                summary.warnings.push(PageWarning::FetchFailed {
                    page_index,
                    error: err.to_string(),
                });
                return Ok(PageStep::Skipped);
            }
        };

        debug!(phase = %RunPhase::Parsing, page_index);
        let parser = ListingParser::new(self.taxonomy);
        let parsed = parser.parse_page(self.adapter.as_ref(), &page);
        if let Some(drift) = parsed.drift() {
            warn!(page_index, anchor = %drift.missing_anchor, "structural drift; skipping page");
            summary.warnings.push(PageWarning::StructuralDrift(drift.clone()));
            return Ok(PageStep::Skipped);
        }
        if parsed.is_empty() {
            debug!(page_index, "empty page; pagination exhausted");
            return Ok(PageStep::Exhausted);
        }

        let listings = if self.settings.fetch_details {
            parsed.listings_with_details(self.fetcher.as_ref()).await
        } else {
            parsed.listings().collect()
        };

        debug!(phase = %RunPhase::Reconciling, page_index, listings = parsed.listing_count());
        let tally = match self.reconcile_page(page_index, listings).await {
            Ok(tally) => tally,
            Err(err) => {
                return Ok(PageStep::Stop(RunOutcome::Aborted {
                    reason: format!("store error on page {page_index}: {err}"),
                }))
            }
        };

        debug!(phase = %RunPhase::Checkpointing, page_index);
        self.tracker
            .advance(state, page_index, tally.external_ids.iter().cloned())
            .await?;

        summary.inserted += tally.inserted;
        summary.updated += tally.updated;
        summary.skipped += tally.skipped;
        summary.failed += tally.failed;
        summary.field_fallbacks += tally.field_fallbacks;
        summary.warnings.extend(tally.warnings);
        summary.pages_processed += 1;
        Ok(PageStep::Advanced)
    }

    /// Fetches one page, retrying whatever the retry policy allows.
    async fn fetch_with_retry(&self, page_index: u32) -> Result<RawPage, FetchError> {
        let mut retry = 0usize;
        loop {
            let err = match self.adapter.fetch_page(self.fetcher.as_ref(), page_index).await {
                Ok(page) => return Ok(page),
                Err(err) => err,
            };
            let Some(delay) = self.settings.retry.delay_before_retry(retry, &err) else {
                return Err(err);
            };
            warn!(page_index, retry, ?delay, error = %err, "transient fetch failure; retrying");
            tokio::time::sleep(delay).await;
            retry += 1;
        }
    }

    /// Applies one page inside a single store transaction; any store error
    /// rolls the whole page back.
    async fn reconcile_page(
        &self,
        page_index: u32,
        listings: Vec<Result<ParsedListing, ListingParseFailure>>,
    ) -> Result<PageTally, StoreError> {
        let mut tx = self.store.begin_page().await?;
        match apply_listings(tx.as_mut(), listings).await {
            Ok(tally) => {
                tx.commit().await?;
                Ok(tally)
            }
            Err(err) => {
                warn!(page_index, error = %err, "rolling back page");
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

async fn apply_listings(
    tx: &mut dyn PageTransaction,
    listings: Vec<Result<ParsedListing, ListingParseFailure>>,
) -> Result<PageTally, StoreError> {
    let mut tally = PageTally::default();
    let mut reconciler = PageReconciler::new();
    let now = Utc::now();

    for result in listings {
        let listing = match result {
            Ok(listing) => listing,
            Err(failure) => {
                warn!(error = %failure, "listing skipped");
                tally.failed += 1;
                tally.warnings.push(PageWarning::ListingSkipped(failure));
                continue;
            }
        };
        tally.field_fallbacks += listing.field_fallbacks.len();
        for fallback in &listing.field_fallbacks {
            debug!(
                external_id = %listing.draft.external_id,
                field = %fallback.field,
                raw = %fallback.raw,
                detail = %fallback.detail,
                "field fell back to default"
            );
        }

        let key = listing.draft.key();
        let prior = tx.find_listing(&key).await?;
        let decision = reconciler.decide(&listing.draft, prior.as_ref());
        if decision.writes() {
            tx.upsert_listing(&listing.draft, now).await?;
            tx.replace_skills_for_listing(&key, &listing.skill_mentions()).await?;
        }
        match decision {
            Decision::Insert => tally.inserted += 1,
            Decision::Update(changed) => {
                debug!(%key, ?changed, "listing updated");
                tally.updated += 1;
            }
            Decision::Skip(reason) => {
                debug!(%key, ?reason, "listing skipped");
                tally.skipped += 1;
            }
        }
        tally.external_ids.push(key.external_id);
    }
    Ok(tally)
}
