use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use jobminer_adapters::{
    adapter_for_source, FailureReason, FieldName, JustJoinAdapter, ListingParser, ParsedListing,
    PracujAdapter, SourceAdapter,
};
use jobminer_core::{EmploymentType, ExperienceLevel, OperatingMode, PayPeriod, WorkType};
use jobminer_storage::{FetchError, FixtureFetcher, PageFetcher, PageParams, RawPage};

fn fixtures_root() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../fixtures")
}

fn fixture_page(adapter: &dyn SourceAdapter, file: &str, page_index: u32) -> RawPage {
    let path = fixtures_root().join(adapter.source()).join(file);
    RawPage {
        source: adapter.source().to_string(),
        url: adapter.page_url(page_index),
        page_index,
        body: std::fs::read_to_string(&path).unwrap_or_else(|e| panic!("{}: {e}", path.display())),
        content_type: None,
        fetched_at: Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).single().unwrap(),
    }
}

fn pracuj() -> PracujAdapter {
    PracujAdapter::new(jobminer_adapters::pracuj::DEFAULT_SEARCH_URL).unwrap()
}

fn justjoin() -> JustJoinAdapter {
    JustJoinAdapter::new(jobminer_adapters::justjoin::DEFAULT_OFFERS_URL).unwrap()
}

fn parsed_ok(adapter: &dyn SourceAdapter, file: &str, page_index: u32) -> Vec<ParsedListing> {
    let page = fixture_page(adapter, file, page_index);
    let parser = ListingParser::with_builtin_taxonomy();
    let parsed = parser.parse_page(adapter, &page);
    parsed.listings().filter_map(Result::ok).collect()
}

fn skill_names(listing: &ParsedListing) -> Vec<&str> {
    listing.skills.iter().map(|s| s.name.as_str()).collect()
}

#[test]
fn pracuj_first_page_yields_three_complete_drafts() {
    let adapter = pracuj();
    let listings = parsed_ok(&adapter, "page-1.html", 1);
    let ids: Vec<&str> = listings.iter().map(|l| l.draft.external_id.as_str()).collect();
    assert_eq!(ids, vec!["1004100001", "1004100002", "1004100003"]);

    let first = &listings[0].draft;
    assert_eq!(first.source, "pracuj.pl");
    assert_eq!(first.title, "Młodszy analityk danych");
    assert_eq!(first.company.as_deref(), Some("Data Insights Sp. z o.o."));
    assert_eq!(
        first.link,
        "https://it.pracuj.pl/praca/mlodszy-analityk-danych-warszawa,oferta,1004100001"
    );
    let salary = first.salary.as_ref().expect("salary");
    assert_eq!((salary.min, salary.max), (8000, 10000));
    assert_eq!(salary.currency.as_deref(), Some("PLN"));
    assert!(!salary.period_assumed);
    assert_eq!(first.location.as_deref(), Some("Warszawa, Mokotów"));
    assert_eq!(first.operating_mode, OperatingMode::Hybrid);
    assert_eq!(first.work_type, WorkType::FullTime);
    assert_eq!(first.experience_level, ExperienceLevel::Junior);
    assert_eq!(first.employment_type, EmploymentType::EmploymentContract);
    assert_eq!(first.years_of_experience, Some(1));
    assert_eq!(skill_names(&listings[0]), vec!["Excel", "Power BI", "Reporting", "SQL"]);

    let second = &listings[1].draft;
    assert_eq!(second.employment_type, EmploymentType::B2b);
    assert_eq!(second.operating_mode, OperatingMode::Remote);
    assert_eq!(second.experience_level, ExperienceLevel::Mid);
    assert_eq!(second.years_of_experience, Some(2));

    let third = &listings[2];
    assert_eq!(third.draft.salary, None);
    assert!(third.field_fallbacks.is_empty());
    assert_eq!(third.draft.operating_mode, OperatingMode::Onsite);
    let names = skill_names(third);
    assert!(names.contains(&"T-SQL"));
    assert!(names.contains(&"Data Warehouse"));
    assert!(!names.contains(&"SQL"));
}

#[test]
fn pracuj_periods_are_converted_to_monthly() {
    let adapter = pracuj();
    let page_two = parsed_ok(&adapter, "page-2.html", 2);
    let intern = page_two
        .iter()
        .find(|l| l.draft.external_id == "1004100005")
        .expect("hourly offer");
    let salary = intern.draft.salary.as_ref().expect("salary");
    assert_eq!((salary.min, salary.max), (9240, 11760));
    assert_eq!(salary.period, PayPeriod::Hourly);
    assert_eq!(intern.draft.experience_level, ExperienceLevel::Intern);
    assert_eq!(intern.draft.employment_type, EmploymentType::MandateContract);
    assert_eq!(intern.draft.work_type, WorkType::PartTime);

    let page_three = parsed_ok(&adapter, "page-3.html", 3);
    let yearly = page_three[0].draft.salary.as_ref().expect("salary");
    assert_eq!((yearly.min, yearly.max), (8000, 10000));
    assert_eq!(yearly.period, PayPeriod::Yearly);
    assert_eq!(page_three[1].draft.employment_type, EmploymentType::Internship);

    let page_five = parsed_ok(&adapter, "page-5.html", 5);
    let usd = page_five[0].draft.salary.as_ref().expect("salary");
    assert_eq!((usd.min, usd.max), (4000, 5500));
    assert_eq!(usd.currency.as_deref(), Some("USD"));
    assert!(skill_names(&page_five[2]).contains(&"SAP"));
    assert_eq!(page_five[2].draft.experience_level, ExperienceLevel::Expert);
}

#[test]
fn pracuj_failures_and_fallbacks_are_reported_per_listing() {
    let adapter = pracuj();
    let page = fixture_page(&adapter, "page-4.html", 4);
    let parser = ListingParser::with_builtin_taxonomy();
    let parsed = parser.parse_page(&adapter, &page);
    assert_eq!(parsed.listing_count(), 3);
    assert!(parsed.drift().is_none());

    let results: Vec<_> = parsed.listings().collect();
    let negotiable = results[1].as_ref().expect("listing parses");
    assert_eq!(negotiable.draft.salary, None);
    assert_eq!(negotiable.draft.operating_mode, OperatingMode::Unknown);
    let fallback_fields: Vec<FieldName> = negotiable.field_fallbacks.iter().map(|f| f.field).collect();
    assert_eq!(fallback_fields, vec![FieldName::Salary, FieldName::OperatingMode]);
    assert_eq!(negotiable.field_fallbacks[0].raw, "do negocjacji");

    let failure = results[2].as_ref().expect_err("untitled card fails");
    assert_eq!(failure.external_id.as_deref(), Some("1004100011"));
    assert_eq!(failure.position, 2);
    assert_eq!(failure.reason, FailureReason::MissingField(FieldName::Title));
}

#[test]
fn pracuj_redesign_is_structural_drift() {
    let adapter = pracuj();
    let page = fixture_page(&adapter, "drift.html", 1);
    let parser = ListingParser::with_builtin_taxonomy();
    let parsed = parser.parse_page(&adapter, &page);
    assert!(parsed.is_empty());
    let drift = parsed.drift().expect("drift marker");
    assert_eq!(drift.source_id, "pracuj.pl");
    assert_eq!(drift.missing_anchor, "#offers-list");
}

#[test]
fn parsing_the_same_page_twice_is_identical() {
    let adapter = pracuj();
    for file in ["page-1.html", "page-4.html"] {
        let page = fixture_page(&adapter, file, 1);
        let parser = ListingParser::with_builtin_taxonomy();
        let first: Vec<_> = parser.parse_page(&adapter, &page).listings().collect();
        let second: Vec<_> = parser.parse_page(&adapter, &page).listings().collect();
        assert_eq!(first, second);
    }
}

#[tokio::test]
async fn pracuj_offer_page_overrides_and_extends_the_card() {
    let adapter = pracuj();
    let fetcher = FixtureFetcher::new(fixtures_root());
    let page = fixture_page(&adapter, "page-1.html", 1);
    let parser = ListingParser::with_builtin_taxonomy();
    let parsed = parser.parse_page(&adapter, &page);
    let listings: Vec<ParsedListing> = parsed
        .listings_with_details(&fetcher)
        .await
        .into_iter()
        .map(|r| r.expect("listing parses"))
        .collect();
    assert_eq!(listings.len(), 3);

    let enriched = &listings[0];
    assert!(enriched.field_fallbacks.is_empty());
    let draft = &enriched.draft;
    assert_eq!(draft.company.as_deref(), Some("Data Insights Sp. z o.o."));
    let salary = draft.salary.as_ref().expect("salary");
    assert_eq!((salary.min, salary.max), (8500, 10500));
    assert_eq!(draft.years_of_experience, Some(2));
    assert_eq!(
        draft.published_date.map(|d| d.to_rfc3339()),
        Some("2026-02-27T08:15:00+00:00".to_string())
    );
    assert!(draft
        .description
        .as_deref()
        .is_some_and(|d| d.starts_with("Dołączysz do zespołu")));
    assert_eq!(
        skill_names(enriched),
        vec!["Excel", "Pandas", "Power BI", "Python", "Reporting", "SQL"]
    );

    // No offer page on disk: the card stands alone and nothing is flagged.
    let card_only = &listings[1];
    assert!(card_only.field_fallbacks.is_empty());
    assert_eq!(card_only.draft.published_date, None);
    assert_eq!(card_only.draft.years_of_experience, Some(2));

    let plain: Vec<ParsedListing> = parsed.listings().filter_map(Result::ok).collect();
    assert_eq!(&plain[1], card_only);
    assert_eq!(plain[0].draft.salary.as_ref().map(|s| s.min), Some(8000));
}

/// Serves search pages from fixtures and fails every offer page.
struct OfferOutage(FixtureFetcher);

#[async_trait]
impl PageFetcher for OfferOutage {
    async fn fetch(&self, url: &str, params: &PageParams) -> Result<RawPage, FetchError> {
        if params.offer_id.is_some() {
            return Err(FetchError::Network {
                url: url.to_string(),
                transient: true,
                message: "connection reset".into(),
            });
        }
        self.0.fetch(url, params).await
    }
}

#[tokio::test]
async fn unreachable_offer_page_keeps_the_card_and_is_flagged() {
    let adapter = pracuj();
    let fetcher = OfferOutage(FixtureFetcher::new(fixtures_root()));
    let page = adapter.fetch_page(&fetcher, 1).await.expect("search page");
    let parser = ListingParser::with_builtin_taxonomy();
    let parsed = parser.parse_page(&adapter, &page);
    let results = parsed.listings_with_details(&fetcher).await;

    let first = results[0].as_ref().expect("card still parses");
    assert_eq!(first.draft.salary.as_ref().map(|s| s.min), Some(8000));
    let flagged: Vec<FieldName> = first.field_fallbacks.iter().map(|f| f.field).collect();
    assert_eq!(flagged, vec![FieldName::DetailPage]);
    assert_eq!(first.field_fallbacks[0].raw, first.draft.link);
}

#[test]
fn justjoin_offers_map_onto_drafts() {
    let adapter = justjoin();
    let listings = parsed_ok(&adapter, "page-1.json", 1);
    assert_eq!(listings.len(), 3);

    let first = &listings[0].draft;
    assert_eq!(first.external_id, "insight-labs-junior-data-analyst-warszawa");
    assert_eq!(
        first.link,
        "https://justjoin.it/job-offer/insight-labs-junior-data-analyst-warszawa"
    );
    assert_eq!(first.employment_type, EmploymentType::EmploymentContract);
    assert_eq!(first.operating_mode, OperatingMode::Hybrid);
    assert_eq!(first.years_of_experience, Some(1));
    assert_eq!(skill_names(&listings[0]), vec!["Dashboard", "Power BI", "Python", "SQL"]);
    assert_eq!(
        first.published_date.map(|d| d.to_rfc3339()),
        Some("2026-03-01T08:00:00+00:00".to_string())
    );

    // The first employment type wins over later ones.
    let second = &listings[1].draft;
    assert_eq!(second.employment_type, EmploymentType::B2b);
    let salary = second.salary.as_ref().expect("salary");
    assert_eq!((salary.min, salary.max), (16000, 21000));

    let third = &listings[2];
    assert_eq!(third.draft.salary, None);
    assert_eq!(third.draft.operating_mode, OperatingMode::Onsite);
    assert!(third.field_fallbacks.is_empty());
}

#[test]
fn justjoin_seniority_falls_back_to_title_and_hourly_rates_convert() {
    let adapter = justjoin();
    let page = fixture_page(&adapter, "page-2.json", 2);
    let parser = ListingParser::with_builtin_taxonomy();
    let results: Vec<_> = parser.parse_page(&adapter, &page).listings().collect();
    assert_eq!(results.len(), 3);

    let head = results[0].as_ref().expect("head of data");
    assert_eq!(head.draft.experience_level, ExperienceLevel::Manager);
    assert!(head.field_fallbacks.is_empty());
    assert_eq!(head.draft.years_of_experience, Some(8));

    let intern = results[1].as_ref().expect("intern");
    let salary = intern.draft.salary.as_ref().expect("salary");
    assert_eq!((salary.min, salary.max), (4284, 5040));
    assert_eq!(intern.draft.employment_type, EmploymentType::Internship);

    let ghost = results[2].as_ref().expect_err("no identifier");
    assert_eq!(ghost.reason, FailureReason::MissingField(FieldName::ExternalId));
    assert_eq!(ghost.external_id, None);
}

#[test]
fn justjoin_invalid_document_is_drift() {
    let adapter = justjoin();
    let mut page = fixture_page(&adapter, "page-3.json", 3);
    let parser = ListingParser::with_builtin_taxonomy();
    let empty = parser.parse_page(&adapter, &page);
    assert!(empty.is_empty());
    assert!(empty.drift().is_none());

    page.body = "<html>maintenance</html>".to_string();
    let broken = parser.parse_page(&adapter, &page);
    assert!(broken.drift().is_some());
}

#[tokio::test]
async fn adapters_fetch_through_the_fixture_fetcher() {
    let fetcher = FixtureFetcher::new(fixtures_root());
    let adapter = adapter_for_source("justjoin.it", None).unwrap().unwrap();
    let page = adapter.fetch_page(&fetcher, 2).await.expect("page 2");
    assert!(page.is_json());
    assert_eq!(page.page_index, 2);
    assert!(page.url.ends_with("page=2"));
    assert!(adapter.fetch_page(&fetcher, 9).await.is_err());
}
