//! Postgres-backed listing store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobminer_core::{
    DraftListing, EmploymentType, ExperienceLevel, ListingKey, ListingStatus, OperatingMode,
    PayPeriod, PersistedListing, SalaryRange, SkillMention, WorkType,
};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::debug;

use crate::store::{ListingStore, PageTransaction, StoreError, UpsertOutcome};

pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("../../migrations");

const LISTING_COLUMNS: &str = r#"
    id, source, external_id, title, company, link,
    salary_min, salary_max, currency, pay_period, period_assumed,
    location, operating_mode, work_type, experience_level, employment_type,
    years_of_experience, scrape_date, published_date, listing_status, updated_at
"#;

#[derive(Debug, Clone)]
pub struct PgListingStore {
    pool: PgPool,
}

impl PgListingStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(4)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl ListingStore for PgListingStore {
    async fn begin_page(&self) -> Result<Box<dyn PageTransaction>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgPageTransaction { tx }))
    }

    async fn count_listings(&self, source: &str) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_listings WHERE source = $1")
            .bind(source)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct PgPageTransaction {
    tx: Transaction<'static, Postgres>,
}

fn corrupt(key: &ListingKey, message: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        key: key.to_string(),
        message: message.into(),
    }
}

fn to_u32(key: &ListingKey, column: &str, value: Option<i64>) -> Result<Option<u32>, StoreError> {
    value
        .map(|v| u32::try_from(v).map_err(|_| corrupt(key, format!("{column} out of range: {v}"))))
        .transpose()
}

fn listing_from_row(row: &PgRow) -> Result<PersistedListing, StoreError> {
    let key = ListingKey::new(
        row.try_get::<String, _>("source")?,
        row.try_get::<String, _>("external_id")?,
    );

    let salary_min = to_u32(&key, "salary_min", row.try_get("salary_min")?)?;
    let salary_max = to_u32(&key, "salary_max", row.try_get("salary_max")?)?;
    let salary = match (salary_min, salary_max) {
        (Some(min), Some(max)) => Some(SalaryRange {
            min,
            max,
            currency: row.try_get("currency")?,
            period: row
                .try_get::<Option<String>, _>("pay_period")?
                .and_then(|p| PayPeriod::from_label(&p))
                .unwrap_or(PayPeriod::Monthly),
            period_assumed: row.try_get("period_assumed")?,
        }),
        _ => None,
    };

    let status_label: String = row.try_get("listing_status")?;
    let listing_status = ListingStatus::from_label(&status_label)
        .ok_or_else(|| corrupt(&key, format!("unknown listing_status `{status_label}`")))?;
    let years: Option<i32> = row.try_get("years_of_experience")?;

    Ok(PersistedListing {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        company: row.try_get("company")?,
        link: row.try_get("link")?,
        salary,
        location: row.try_get("location")?,
        operating_mode: OperatingMode::from_label(&row.try_get::<String, _>("operating_mode")?)
            .unwrap_or(OperatingMode::Unknown),
        work_type: WorkType::from_label(&row.try_get::<String, _>("work_type")?)
            .unwrap_or(WorkType::Unknown),
        experience_level: ExperienceLevel::from_label(&row.try_get::<String, _>("experience_level")?)
            .unwrap_or(ExperienceLevel::Unknown),
        employment_type: EmploymentType::from_label(&row.try_get::<String, _>("employment_type")?)
            .unwrap_or(EmploymentType::Unknown),
        years_of_experience: years.and_then(|y| u32::try_from(y).ok()),
        scrape_date: row.try_get("scrape_date")?,
        published_date: row.try_get("published_date")?,
        listing_status,
        updated_at: row.try_get("updated_at")?,
        key,
    })
}

#[async_trait]
impl PageTransaction for PgPageTransaction {
    async fn listing_exists(&mut self, key: &ListingKey) -> Result<bool, StoreError> {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS (SELECT 1 FROM job_listings WHERE source = $1 AND external_id = $2)",
        )
        .bind(&key.source)
        .bind(&key.external_id)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(exists)
    }

    async fn find_listing(&mut self, key: &ListingKey) -> Result<Option<PersistedListing>, StoreError> {
        let sql = format!(
            "SELECT {LISTING_COLUMNS} FROM job_listings WHERE source = $1 AND external_id = $2"
        );
        let row = sqlx::query(&sql)
            .bind(&key.source)
            .bind(&key.external_id)
            .fetch_optional(&mut *self.tx)
            .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    async fn upsert_listing(
        &mut self,
        draft: &DraftListing,
        now: DateTime<Utc>,
    ) -> Result<UpsertOutcome, StoreError> {
        let salary = draft.salary.as_ref();
        let row = sqlx::query(
            r#"
            INSERT INTO job_listings (
                source, external_id, title, company, link,
                salary_min, salary_max, currency, pay_period, period_assumed,
                location, operating_mode, work_type, experience_level, employment_type,
                years_of_experience, scrape_date, published_date, listing_status, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, 'active', $19)
            ON CONFLICT (source, external_id) DO UPDATE
            SET salary_min = EXCLUDED.salary_min,
                salary_max = EXCLUDED.salary_max,
                currency = EXCLUDED.currency,
                pay_period = EXCLUDED.pay_period,
                period_assumed = EXCLUDED.period_assumed,
                published_date = COALESCE(job_listings.published_date, EXCLUDED.published_date),
                listing_status = 'active',
                updated_at = EXCLUDED.updated_at
            RETURNING id, (xmax = 0) AS inserted
            "#,
        )
        .bind(&draft.source)
        .bind(&draft.external_id)
        .bind(&draft.title)
        .bind(&draft.company)
        .bind(&draft.link)
        .bind(salary.map(|s| i64::from(s.min)))
        .bind(salary.map(|s| i64::from(s.max)))
        .bind(salary.and_then(|s| s.currency.clone()))
        .bind(salary.map(|s| s.period.as_str()))
        .bind(salary.is_some_and(|s| s.period_assumed))
        .bind(&draft.location)
        .bind(draft.operating_mode.as_str())
        .bind(draft.work_type.as_str())
        .bind(draft.experience_level.as_str())
        .bind(draft.employment_type.as_str())
        .bind(draft.years_of_experience.and_then(|y| i32::try_from(y).ok()))
        .bind(draft.scrape_date)
        .bind(draft.published_date)
        .bind(now)
        .fetch_one(&mut *self.tx)
        .await?;

        let outcome = UpsertOutcome {
            id: row.try_get("id")?,
            inserted: row.try_get("inserted")?,
        };
        debug!(key = %draft.key(), id = outcome.id, inserted = outcome.inserted, "upserted listing");
        Ok(outcome)
    }

    async fn replace_skills_for_listing(
        &mut self,
        key: &ListingKey,
        skills: &[SkillMention],
    ) -> Result<(), StoreError> {
        let listing_id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM job_listings WHERE source = $1 AND external_id = $2",
        )
        .bind(&key.source)
        .bind(&key.external_id)
        .fetch_optional(&mut *self.tx)
        .await?;
        let listing_id =
            listing_id.ok_or_else(|| corrupt(key, "skills written before the listing row"))?;

        sqlx::query("DELETE FROM skills WHERE source = $1 AND external_id = $2")
            .bind(&key.source)
            .bind(&key.external_id)
            .execute(&mut *self.tx)
            .await?;

        for skill in skills {
            sqlx::query(
                r#"
                INSERT INTO skills (listing_id, source, external_id, skill_name, skill_category)
                VALUES ($1, $2, $3, $4, $5)
                ON CONFLICT (source, external_id, skill_name) DO NOTHING
                "#,
            )
            .bind(listing_id)
            .bind(&key.source)
            .bind(&key.external_id)
            .bind(&skill.skill_name)
            .bind(&skill.skill_category)
            .execute(&mut *self.tx)
            .await?;
        }
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
