//! Collaborators around the pipeline: page fetching, the SQL sink and
//! checkpoint persistence.

pub mod checkpoint;
pub mod fetch;
pub mod postgres;
pub mod store;

pub use checkpoint::{CheckpointError, CheckpointStore, FileCheckpointStore, Lease, MemoryCheckpointStore};
pub use fetch::{
    classify_status, FetchError, FixtureFetcher, HttpClientConfig, HttpFetcher, PageFetcher, PageParams,
    RawPage, RequestPacer, RetryPolicy,
};
pub use postgres::{PgListingStore, MIGRATOR};
pub use store::{ListingStore, MemoryListingStore, PageTransaction, StoreError, UpsertOutcome};

pub const CRATE_NAME: &str = "jobminer-storage";
