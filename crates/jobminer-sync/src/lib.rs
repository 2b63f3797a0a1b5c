//! Run orchestration: reconciliation, checkpoint tracking, the page driver,
//! configuration and the daily scheduler.

pub mod checkpoint;
pub mod config;
pub mod driver;
pub mod reconcile;
pub mod run;
pub mod scheduler;

pub use checkpoint::CheckpointTracker;
pub use config::{SourceConfig, SourceRegistry, SyncConfig};
pub use driver::{
    DriverRun, DriverSettings, PageWarning, PipelineDriver, RunError, RunOutcome, RunPhase, RunSummary,
};
pub use reconcile::{reconcile, ChangedField, Decision, PageReconciler, SkipReason};
pub use run::{run_once, run_once_from_env, run_once_with_cancel, run_source, write_report};
pub use scheduler::build_scheduler;

pub const CRATE_NAME: &str = "jobminer-sync";
