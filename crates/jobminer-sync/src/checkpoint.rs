//! Checkpoint tracking on top of a [`CheckpointStore`].

use std::sync::Arc;

use chrono::Utc;
use jobminer_core::{AdvanceOutcome, CheckpointState, RunStatus};
use jobminer_storage::{CheckpointError, CheckpointStore, Lease};
use tracing::debug;

#[derive(Clone)]
pub struct CheckpointTracker {
    store: Arc<dyn CheckpointStore>,
    lease: Option<Arc<Lease>>,
}

impl CheckpointTracker {
    pub fn new(store: Arc<dyn CheckpointStore>) -> Self {
        Self { store, lease: None }
    }

    pub async fn acquire_lease(&self, source: &str) -> Result<Lease, CheckpointError> {
        self.store.acquire_lease(source).await
    }

    /// Keeps `lease` alive for as long as this tracker (or a clone) exists
    /// and renews it after every recorded page.
    pub fn holding(mut self, lease: Lease) -> Self {
        self.lease = Some(Arc::new(lease));
        self
    }

    /// Stored state for `source`, or a fresh one when nothing was saved yet.
    pub async fn load(&self, source: &str) -> Result<CheckpointState, CheckpointError> {
        match self.store.load(source).await? {
            Some(state) => {
                debug!(
                    source,
                    last_page = ?state.last_page_index,
                    seen = state.seen_external_ids.len(),
                    status = %state.run_status,
                    "loaded checkpoint"
                );
                Ok(state)
            }
            None => Ok(CheckpointState::initial(source, Utc::now())),
        }
    }

    /// Records a reconciled page and persists the result. Re-applying a page
    /// that is already recorded writes nothing.
    pub async fn advance<I, S>(
        &self,
        state: &mut CheckpointState,
        page_index: u32,
        external_ids: I,
    ) -> Result<AdvanceOutcome, CheckpointError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let was_in_progress = state.run_status == RunStatus::InProgress;
        let outcome = state.apply_page(page_index, external_ids, Utc::now());
        if !outcome.is_noop() || !was_in_progress {
            self.store.save(state).await?;
        }
        if let Some(lease) = &self.lease {
            self.store.renew_lease(lease).await?;
        }
        Ok(outcome)
    }

    /// Starts a run: completed checkpoints restart pagination, interrupted
    /// ones keep their position.
    pub async fn begin_run(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        state.begin_run(Utc::now());
        self.store.save(state).await
    }

    pub async fn mark_completed(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        self.finish(state, RunStatus::Completed).await
    }

    pub async fn mark_failed(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        self.finish(state, RunStatus::Failed).await
    }

    /// Graceful stop (rate limit, cancellation, timeout): the position is kept
    /// and the next run resumes from it.
    pub async fn mark_paused(&self, state: &mut CheckpointState) -> Result<(), CheckpointError> {
        self.finish(state, RunStatus::InProgress).await
    }

    pub async fn reset(&self, source: &str) -> Result<bool, CheckpointError> {
        self.store.reset(source).await
    }

    async fn finish(&self, state: &mut CheckpointState, status: RunStatus) -> Result<(), CheckpointError> {
        state.set_status(status, Utc::now());
        self.store.save(state).await
    }
}
