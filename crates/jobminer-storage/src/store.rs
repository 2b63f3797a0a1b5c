//! Listing sink: one transaction per reconciled page.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobminer_core::{DraftListing, ListingKey, ListingStatus, PersistedListing, SkillMention};
use thiserror::Error;
use tokio::sync::Mutex;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("migration failed: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),
    #[error("stored row for {key} is unreadable: {message}")]
    CorruptRow { key: String, message: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UpsertOutcome {
    pub id: i64,
    pub inserted: bool,
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn begin_page(&self) -> Result<Box<dyn PageTransaction>, StoreError>;

    async fn count_listings(&self, source: &str) -> Result<u64, StoreError>;

    /// Releases pooled connections. Further calls fail.
    async fn close(&self);
}

/// Writes for a single page. Nothing is visible to other readers until
/// `commit`; dropping without committing discards the page.
#[async_trait]
pub trait PageTransaction: Send {
    async fn listing_exists(&mut self, key: &ListingKey) -> Result<bool, StoreError>;

    async fn find_listing(&mut self, key: &ListingKey) -> Result<Option<PersistedListing>, StoreError>;

    /// Inserts a new row or, for a known key, refreshes only the salary, the
    /// status (back to active) and `updated_at`. A published date is filled
    /// in when the row has none. Identity fields are never overwritten.
    async fn upsert_listing(
        &mut self,
        draft: &DraftListing,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError>;

    async fn replace_skills_for_listing(
        &mut self,
        key: &ListingKey,
        skills: &[SkillMention],
    ) -> Result<(), StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default)]
struct MemoryTables {
    next_id: i64,
    listings: BTreeMap<ListingKey, PersistedListing>,
    skills: BTreeMap<ListingKey, BTreeSet<SkillMention>>,
}

/// In-process store with the same transactional shape as Postgres.
#[derive(Debug, Clone, Default)]
pub struct MemoryListingStore {
    tables: Arc<Mutex<MemoryTables>>,
    closed: Arc<Mutex<bool>>,
}

impl MemoryListingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn listings(&self) -> Vec<PersistedListing> {
        self.tables.lock().await.listings.values().cloned().collect()
    }

    pub async fn get(&self, key: &ListingKey) -> Option<PersistedListing> {
        self.tables.lock().await.listings.get(key).cloned()
    }

    pub async fn skills_for(&self, key: &ListingKey) -> BTreeSet<SkillMention> {
        self.tables
            .lock()
            .await
            .skills
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Marks a listing with a status other than active, as a sweeper would.
    pub async fn set_status(&self, key: &ListingKey, status: ListingStatus) -> bool {
        match self.tables.lock().await.listings.get_mut(key) {
            Some(listing) => {
                listing.listing_status = status;
                true
            }
            None => false,
        }
    }

    pub async fn is_closed(&self) -> bool {
        *self.closed.lock().await
    }
}

#[async_trait]
impl ListingStore for MemoryListingStore {
    async fn begin_page(&self) -> Result<Box<dyn PageTransaction>, StoreError> {
        if self.is_closed().await {
            return Err(StoreError::Unavailable("memory store closed".to_string()));
        }
        let staged = self.tables.lock().await.clone();
        Ok(Box::new(MemoryPageTransaction {
            shared: Arc::clone(&self.tables),
            staged,
        }))
    }

    async fn count_listings(&self, source: &str) -> Result<u64, StoreError> {
        let tables = self.tables.lock().await;
        Ok(tables.listings.keys().filter(|k| k.source == source).count() as u64)
    }

    async fn close(&self) {
        *self.closed.lock().await = true;
    }
}

struct MemoryPageTransaction {
    shared: Arc<Mutex<MemoryTables>>,
    staged: MemoryTables,
}

#[async_trait]
impl PageTransaction for MemoryPageTransaction {
    async fn listing_exists(&mut self, key: &ListingKey) -> Result<bool, StoreError> {
        Ok(self.staged.listings.contains_key(key))
    }

    async fn find_listing(&mut self, key: &ListingKey) -> Result<Option<PersistedListing>, StoreError> {
        Ok(self.staged.listings.get(key).cloned())
    }

    async fn upsert_listing(
        &mut self,
        draft: &DraftListing,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let key = draft.key();
        if let Some(existing) = self.staged.listings.get_mut(&key) {
            existing.salary = draft.salary.clone();
            existing.published_date = existing.published_date.or(draft.published_date);
            existing.listing_status = ListingStatus::Active;
            existing.updated_at = now;
            return Ok(UpsertOutcome {
                id: existing.id,
                inserted: false,
            });
        }

        self.staged.next_id += 1;
        let id = self.staged.next_id;
        self.staged
            .listings
            .insert(key, PersistedListing::from_draft(id, draft, now));
        Ok(UpsertOutcome { id, inserted: true })
    }

    async fn replace_skills_for_listing(
        &mut self,
        key: &ListingKey,
        skills: &[SkillMention],
    ) -> Result<(), StoreError> {
        if !self.staged.listings.contains_key(key) {
            return Err(StoreError::Unavailable(format!(
                "skills written for unknown listing {key}"
            )));
        }
        self.staged
            .skills
            .insert(key.clone(), skills.iter().cloned().collect());
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let this = *self;
        *this.shared.lock().await = this.staged;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
