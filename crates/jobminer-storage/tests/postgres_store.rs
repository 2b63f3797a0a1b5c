//! Runs against a real Postgres when `JOBMINER_TEST_DATABASE_URL` is set;
//! otherwise every test returns early. Each test works under its own
//! source id so runs can share one database.

use chrono::{DateTime, TimeZone, Utc};
use jobminer_core::{
    DraftListing, EmploymentType, ExperienceLevel, ListingKey, ListingStatus, OperatingMode,
    PayPeriod, SalaryRange, SkillMention, WorkType,
};
use jobminer_storage::{ListingStore, PgListingStore};
use uuid::Uuid;

async fn store() -> Option<PgListingStore> {
    let Ok(url) = std::env::var("JOBMINER_TEST_DATABASE_URL") else {
        eprintln!("JOBMINER_TEST_DATABASE_URL not set; skipping postgres test");
        return None;
    };
    let store = PgListingStore::connect(&url).await.expect("connect");
    store.migrate().await.expect("migrate");
    Some(store)
}

fn ts(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).single().unwrap()
}

fn draft(source: &str, id: &str, min: u32) -> DraftListing {
    DraftListing {
        external_id: id.to_string(),
        source: source.to_string(),
        title: "Data Analyst".to_string(),
        company: Some("Acme".to_string()),
        link: format!("https://www.pracuj.pl/praca/x,oferta,{id}"),
        salary: Some(SalaryRange {
            min,
            max: min + 2000,
            currency: Some("PLN".to_string()),
            period: PayPeriod::Hourly,
            period_assumed: false,
        }),
        location: Some("Warszawa".to_string()),
        operating_mode: OperatingMode::Hybrid,
        work_type: WorkType::FullTime,
        experience_level: ExperienceLevel::Mid,
        employment_type: EmploymentType::B2b,
        years_of_experience: Some(2),
        scrape_date: ts(6),
        published_date: None,
        description: Some("not stored".to_string()),
    }
}

fn mention(source: &str, id: &str, name: &str) -> SkillMention {
    SkillMention {
        external_id: id.to_string(),
        source: source.to_string(),
        skill_name: name.to_string(),
        skill_category: "Database".to_string(),
    }
}

fn unique_source() -> String {
    format!("test-{}", Uuid::new_v4())
}

async fn skill_names(store: &PgListingStore, key: &ListingKey) -> Vec<String> {
    sqlx::query_scalar(
        "SELECT skill_name FROM skills WHERE source = $1 AND external_id = $2 ORDER BY skill_name",
    )
    .bind(&key.source)
    .bind(&key.external_id)
    .fetch_all(store.pool())
    .await
    .expect("skills")
}

async fn cleanup(store: &PgListingStore, source: &str) {
    sqlx::query("DELETE FROM job_listings WHERE source = $1")
        .bind(source)
        .execute(store.pool())
        .await
        .expect("cleanup");
    store.close().await;
}

#[tokio::test]
async fn upsert_reports_insert_then_update_and_keeps_identity() {
    let Some(store) = store().await else { return };
    let source = unique_source();
    let key = ListingKey::new(source.as_str(), "1");

    let mut tx = store.begin_page().await.expect("begin");
    let first = tx.upsert_listing(&draft(&source, "1", 8000), ts(6)).await.expect("insert");
    tx.commit().await.expect("commit");
    assert!(first.inserted);

    sqlx::query("UPDATE job_listings SET listing_status = 'stale' WHERE id = $1")
        .bind(first.id)
        .execute(store.pool())
        .await
        .expect("mark stale");

    let mut changed = draft(&source, "1", 9000);
    changed.title = "Renamed on the board".to_string();
    changed.company = Some("Someone Else".to_string());
    changed.scrape_date = ts(9);
    changed.published_date = Some(ts(1));
    let mut tx = store.begin_page().await.expect("begin");
    let second = tx.upsert_listing(&changed, ts(7)).await.expect("update");
    let stored = tx.find_listing(&key).await.expect("find").expect("row");
    tx.commit().await.expect("commit");

    assert!(!second.inserted);
    assert_eq!(second.id, first.id);
    assert_eq!(stored.title, "Data Analyst");
    assert_eq!(stored.company.as_deref(), Some("Acme"));
    assert_eq!(stored.scrape_date, ts(6));
    let salary = stored.salary.expect("salary");
    assert_eq!((salary.min, salary.max), (9000, 11000));
    assert_eq!(salary.period, PayPeriod::Hourly);
    assert_eq!(stored.listing_status, ListingStatus::Active);
    assert_eq!(stored.updated_at, ts(7));
    assert_eq!(stored.published_date, Some(ts(1)));

    // A stored published date is kept.
    changed.published_date = Some(ts(3));
    let mut tx = store.begin_page().await.expect("begin");
    tx.upsert_listing(&changed, ts(8)).await.expect("update");
    let stored = tx.find_listing(&key).await.expect("find").expect("row");
    tx.commit().await.expect("commit");
    assert_eq!(stored.published_date, Some(ts(1)));
    assert_eq!(store.count_listings(&source).await.expect("count"), 1);

    cleanup(&store, &source).await;
}

#[tokio::test]
async fn skills_are_replaced_not_merged() {
    let Some(store) = store().await else { return };
    let source = unique_source();
    let key = ListingKey::new(source.as_str(), "7");

    let mut tx = store.begin_page().await.expect("begin");
    tx.upsert_listing(&draft(&source, "7", 8000), ts(6)).await.expect("insert");
    tx.replace_skills_for_listing(
        &key,
        &[mention(&source, "7", "SQL"), mention(&source, "7", "Excel"), mention(&source, "7", "SQL")],
    )
    .await
    .expect("skills");
    tx.commit().await.expect("commit");
    assert_eq!(skill_names(&store, &key).await, vec!["Excel", "SQL"]);

    let mut tx = store.begin_page().await.expect("begin");
    tx.replace_skills_for_listing(&key, &[mention(&source, "7", "Power BI"), mention(&source, "7", "SQL")])
        .await
        .expect("skills");
    tx.commit().await.expect("commit");
    assert_eq!(skill_names(&store, &key).await, vec!["Power BI", "SQL"]);

    // Skills for a listing that was never written are refused.
    let mut tx = store.begin_page().await.expect("begin");
    let err = tx
        .replace_skills_for_listing(&ListingKey::new(source.as_str(), "ghost"), &[])
        .await;
    assert!(err.is_err());
    tx.rollback().await.expect("rollback");

    cleanup(&store, &source).await;
}

#[tokio::test]
async fn rolled_back_page_leaves_nothing_behind() {
    let Some(store) = store().await else { return };
    let source = unique_source();
    let key = ListingKey::new(source.as_str(), "3");

    let mut tx = store.begin_page().await.expect("begin");
    tx.upsert_listing(&draft(&source, "3", 8000), ts(6)).await.expect("insert");
    tx.replace_skills_for_listing(&key, &[mention(&source, "3", "SQL")])
        .await
        .expect("skills");
    assert!(tx.listing_exists(&key).await.expect("exists"));
    tx.rollback().await.expect("rollback");

    assert_eq!(store.count_listings(&source).await.expect("count"), 0);
    assert!(skill_names(&store, &key).await.is_empty());

    cleanup(&store, &source).await;
}
