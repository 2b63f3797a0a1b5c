//! Turns one fetched page into draft listings plus their skill sets.

use std::collections::BTreeSet;

use jobminer_core::normalize::{
    extract_years_of_experience, normalize_employment_type, normalize_experience, normalize_mode,
    normalize_salary, normalize_work_type, parse_published_date,
};
use jobminer_core::{
    DraftListing, EmploymentType, ExperienceLevel, ExtractedSkill, OperatingMode, SkillMention,
    SkillTaxonomy, WorkType,
};
use jobminer_storage::{FetchError, PageFetcher, RawPage};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::{FieldName, ListingNode, SourceAdapter, StructuralDrift};

/// A field whose raw value was present but could not be interpreted, so the
/// normalizer default was stored instead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldFallback {
    pub field: FieldName,
    pub raw: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum FailureReason {
    #[error("missing required field `{0}`")]
    MissingField(FieldName),
    #[error("link `{0}` does not resolve to an http(s) url")]
    InvalidLink(String),
}

/// A listing node that could not become a draft.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("listing #{position} on page {page_index} skipped: {reason}")]
pub struct ListingParseFailure {
    pub page_index: u32,
    pub position: usize,
    pub external_id: Option<String>,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParsedListing {
    pub draft: DraftListing,
    pub skills: BTreeSet<ExtractedSkill>,
    pub field_fallbacks: Vec<FieldFallback>,
}

impl ParsedListing {
    pub fn skill_mentions(&self) -> Vec<SkillMention> {
        self.skills
            .iter()
            .map(|skill| SkillMention::for_listing(&self.draft, skill))
            .collect()
    }
}

pub struct ListingParser<'t> {
    taxonomy: &'t SkillTaxonomy,
}

impl ListingParser<'static> {
    pub fn with_builtin_taxonomy() -> Self {
        Self::new(SkillTaxonomy::builtin())
    }
}

impl<'t> ListingParser<'t> {
    pub fn new(taxonomy: &'t SkillTaxonomy) -> Self {
        Self { taxonomy }
    }

    /// Locates the listing nodes of `page`. Structural drift yields an empty
    /// page carrying the drift marker.
    pub fn parse_page<'a>(&self, adapter: &'a dyn SourceAdapter, page: &'a RawPage) -> ParsedPage<'a>
    where
        't: 'a,
    {
        let (nodes, drift) = match adapter.extract_listing_nodes(page) {
            Ok(nodes) => (nodes, None),
            Err(drift) => (Vec::new(), Some(drift)),
        };
        debug!(
            source = adapter.source(),
            page_index = page.page_index,
            nodes = nodes.len(),
            drift = drift.is_some(),
            "located listing nodes"
        );
        ParsedPage {
            taxonomy: self.taxonomy,
            adapter,
            page,
            nodes,
            drift,
        }
    }
}

pub struct ParsedPage<'a> {
    taxonomy: &'a SkillTaxonomy,
    adapter: &'a dyn SourceAdapter,
    page: &'a RawPage,
    nodes: Vec<ListingNode>,
    drift: Option<StructuralDrift>,
}

impl<'a> ParsedPage<'a> {
    pub fn page_index(&self) -> u32 {
        self.page.page_index
    }

    pub fn drift(&self) -> Option<&StructuralDrift> {
        self.drift.as_ref()
    }

    /// Number of listing nodes found, including ones that will fail to parse.
    pub fn listing_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Interprets the nodes one at a time from the cards alone. Each call
    /// starts from the first node.
    pub fn listings(&self) -> impl Iterator<Item = Result<ParsedListing, ListingParseFailure>> + '_ {
        self.nodes
            .iter()
            .enumerate()
            .map(move |(position, node)| self.parse_node(position, node, None))
    }

    /// Like [`listings`](Self::listings), but reads each listing's offer page
    /// through `fetcher` first when the adapter has one. Offer page values
    /// win over card values. An offer page that cannot be fetched leaves the
    /// card values in place; anything other than a missing page is recorded
    /// as a `DetailPage` fallback.
    pub async fn listings_with_details(
        &self,
        fetcher: &dyn PageFetcher,
    ) -> Vec<Result<ParsedListing, ListingParseFailure>> {
        let mut results = Vec::with_capacity(self.nodes.len());
        for (position, node) in self.nodes.iter().enumerate() {
            let mut unavailable = None;
            let detail = match self.fetch_detail(fetcher, node).await {
                Ok(detail) => detail,
                Err(FetchError::NotFound { url }) => {
                    debug!(%url, "offer page gone; keeping card fields");
                    None
                }
                Err(err) => {
                    warn!(position, error = %err, "offer page unavailable; keeping card fields");
                    unavailable = Some(err);
                    None
                }
            };

            let mut result = self.parse_node(position, node, detail.as_ref());
            if let (Ok(listing), Some(err)) = (&mut result, unavailable) {
                listing.field_fallbacks.push(FieldFallback {
                    field: FieldName::DetailPage,
                    raw: listing.draft.link.clone(),
                    detail: err.to_string(),
                });
            }
            results.push(result);
        }
        results
    }

    async fn fetch_detail(&self, fetcher: &dyn PageFetcher, node: &ListingNode) -> Result<Option<RawPage>, FetchError> {
        let external_id = self.adapter.extract_field(node, FieldName::ExternalId);
        let link = self
            .adapter
            .extract_field(node, FieldName::Link)
            .and_then(|href| self.resolve_link(&href));
        // Cards that cannot be identified fail in `parse_node` anyway.
        let (Some(external_id), Some(link)) = (external_id, link) else {
            return Ok(None);
        };
        self.adapter
            .fetch_detail(fetcher, &external_id, &link, self.page.page_index)
            .await
    }

    fn failure(&self, position: usize, external_id: Option<&str>, reason: FailureReason) -> ListingParseFailure {
        ListingParseFailure {
            page_index: self.page.page_index,
            position,
            external_id: external_id.map(str::to_string),
            reason,
        }
    }

    fn resolve_link(&self, href: &str) -> Option<String> {
        let resolved = Url::parse(&self.page.url).and_then(|base| base.join(href)).ok()?;
        matches!(resolved.scheme(), "http" | "https").then(|| resolved.to_string())
    }

    fn parse_node(
        &self,
        position: usize,
        node: &ListingNode,
        detail: Option<&RawPage>,
    ) -> Result<ParsedListing, ListingParseFailure> {
        let field = |name| {
            detail
                .and_then(|page| self.adapter.extract_detail_field(page, name))
                .or_else(|| self.adapter.extract_field(node, name))
        };

        let external_id = field(FieldName::ExternalId)
            .ok_or_else(|| self.failure(position, None, FailureReason::MissingField(FieldName::ExternalId)))?;
        let id = Some(external_id.as_str());
        let title = field(FieldName::Title)
            .ok_or_else(|| self.failure(position, id, FailureReason::MissingField(FieldName::Title)))?;
        let href = field(FieldName::Link)
            .ok_or_else(|| self.failure(position, id, FailureReason::MissingField(FieldName::Link)))?;
        let link = self
            .resolve_link(&href)
            .ok_or_else(|| self.failure(position, id, FailureReason::InvalidLink(href.clone())))?;

        let mut fallbacks = Vec::new();
        let mut fall_back = |field: FieldName, raw: &str, detail: String| {
            fallbacks.push(FieldFallback {
                field,
                raw: raw.to_string(),
                detail,
            });
        };

        let salary = field(FieldName::Salary).and_then(|raw| match normalize_salary(&raw) {
            Ok(salary) => Some(salary),
            Err(err) => {
                fall_back(FieldName::Salary, &raw, err.to_string());
                None
            }
        });

        let operating_mode = match field(FieldName::OperatingMode) {
            Some(raw) => {
                let mode = normalize_mode(&raw);
                if mode == OperatingMode::Unknown {
                    fall_back(FieldName::OperatingMode, &raw, "unrecognised work mode".into());
                }
                mode
            }
            None => OperatingMode::Unknown,
        };

        let work_type = match field(FieldName::WorkType) {
            Some(raw) => {
                let work_type = normalize_work_type(&raw);
                if work_type == WorkType::Unknown {
                    fall_back(FieldName::WorkType, &raw, "unrecognised work type".into());
                }
                work_type
            }
            None => WorkType::Unknown,
        };

        let employment_type = match field(FieldName::EmploymentType) {
            Some(raw) => {
                let employment = normalize_employment_type(&raw);
                if employment == EmploymentType::Unknown {
                    fall_back(FieldName::EmploymentType, &raw, "unrecognised employment type".into());
                }
                employment
            }
            None => EmploymentType::Unknown,
        };

        // Boards often put seniority only in the title.
        let experience_raw = field(FieldName::ExperienceLevel);
        let experience_level = match experience_raw.as_deref().map(normalize_experience) {
            Some(level) if level != ExperienceLevel::Unknown => level,
            _ => normalize_experience(&title),
        };
        if let (ExperienceLevel::Unknown, Some(raw)) = (experience_level, experience_raw.as_deref()) {
            fall_back(FieldName::ExperienceLevel, raw, "unrecognised seniority".into());
        }

        let description = field(FieldName::Description);
        let years_of_experience = description.as_deref().and_then(extract_years_of_experience);

        let published_date = field(FieldName::PublishedDate).and_then(|raw| {
            let date = parse_published_date(&raw);
            if date.is_none() {
                fall_back(FieldName::PublishedDate, &raw, "unrecognised date".into());
            }
            date
        });

        let listed_skills = match detail.map(|page| self.adapter.extract_detail_list(page, FieldName::Skills)) {
            Some(skills) if !skills.is_empty() => skills,
            _ => self.adapter.extract_list(node, FieldName::Skills),
        };
        let mut skill_text = listed_skills.join("\n");
        if let Some(description) = &description {
            skill_text.push('\n');
            skill_text.push_str(description);
        }
        let skills = self.taxonomy.extract(&skill_text);

        let draft = DraftListing {
            external_id,
            source: self.adapter.source().to_string(),
            title,
            company: field(FieldName::Company),
            link,
            salary,
            location: field(FieldName::Location),
            operating_mode,
            work_type,
            experience_level,
            employment_type,
            years_of_experience,
            scrape_date: self.page.fetched_at,
            published_date,
            description,
        };

        Ok(ParsedListing {
            draft,
            skills,
            field_fallbacks: fallbacks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value as JsonValue};

    /// Adapter over pre-built JSON nodes keyed by field name.
    struct StubAdapter {
        drift: bool,
        nodes: Vec<JsonValue>,
    }

    impl SourceAdapter for StubAdapter {
        fn source(&self) -> &str {
            "stub"
        }

        fn page_url(&self, page_index: u32) -> String {
            format!("https://board.test/offers?page={page_index}")
        }

        fn extract_listing_nodes(&self, page: &RawPage) -> Result<Vec<ListingNode>, StructuralDrift> {
            if self.drift {
                return Err(StructuralDrift {
                    source_id: "stub".into(),
                    page_index: page.page_index,
                    missing_anchor: "data[]".into(),
                });
            }
            Ok(self.nodes.iter().cloned().map(ListingNode::Json).collect())
        }

        fn extract_field(&self, node: &ListingNode, field: FieldName) -> Option<String> {
            let ListingNode::Json(value) = node else {
                return None;
            };
            value.get(field.as_str())?.as_str().map(str::to_string)
        }

        fn extract_list(&self, node: &ListingNode, field: FieldName) -> Vec<String> {
            let ListingNode::Json(value) = node else {
                return Vec::new();
            };
            value
                .get(field.as_str())
                .and_then(JsonValue::as_array)
                .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default()
        }
    }

    fn page() -> RawPage {
        RawPage {
            source: "stub".into(),
            url: "https://board.test/offers?page=1".into(),
            page_index: 1,
            body: String::new(),
            content_type: None,
            fetched_at: Utc.with_ymd_and_hms(2026, 3, 2, 6, 0, 0).single().unwrap(),
        }
    }

    #[test]
    fn malformed_optional_fields_fall_back_without_losing_the_listing() {
        let adapter = StubAdapter {
            drift: false,
            nodes: vec![json!({
                "external_id": "a-1",
                "title": "Junior Data Analyst",
                "link": "/offer/a-1",
                "salary": "do negocjacji",
                "operating_mode": "praca mobilna",
                "skills": ["SQL", "Power BI"],
                "description": "Raportowanie sprzedaży, min. 1 rok doświadczenia."
            })],
        };
        let page = page();
        let parser = ListingParser::with_builtin_taxonomy();
        let parsed = parser.parse_page(&adapter, &page);
        let listing = parsed.listings().next().unwrap().unwrap();

        assert_eq!(listing.draft.link, "https://board.test/offer/a-1");
        assert_eq!(listing.draft.salary, None);
        assert_eq!(listing.draft.operating_mode, OperatingMode::Unknown);
        assert_eq!(listing.draft.experience_level, ExperienceLevel::Junior);
        assert_eq!(listing.draft.years_of_experience, Some(1));
        assert_eq!(listing.draft.scrape_date, page.fetched_at);
        let fallback_fields: Vec<FieldName> = listing.field_fallbacks.iter().map(|f| f.field).collect();
        assert_eq!(fallback_fields, vec![FieldName::Salary, FieldName::OperatingMode]);
        let names: Vec<&str> = listing.skills.iter().map(|s| s.name.as_str()).collect();
        assert!(names.contains(&"Power BI"));
        assert!(names.contains(&"SQL"));
        assert!(names.contains(&"Reporting"));
        assert_eq!(listing.skill_mentions().len(), listing.skills.len());
    }

    #[test]
    fn missing_required_fields_become_failures() {
        let adapter = StubAdapter {
            drift: false,
            nodes: vec![
                json!({"title": "No id", "link": "/x"}),
                json!({"external_id": "b-2", "link": "/x"}),
                json!({"external_id": "b-3", "title": "Bad link", "link": "mailto:hr@board.test"}),
            ],
        };
        let page = page();
        let parser = ListingParser::with_builtin_taxonomy();
        let reasons: Vec<FailureReason> = parser
            .parse_page(&adapter, &page)
            .listings()
            .map(|r| r.unwrap_err().reason)
            .collect();
        assert_eq!(
            reasons,
            vec![
                FailureReason::MissingField(FieldName::ExternalId),
                FailureReason::MissingField(FieldName::Title),
                FailureReason::InvalidLink("mailto:hr@board.test".into()),
            ]
        );
    }

    #[test]
    fn drift_is_reported_as_an_empty_page() {
        let adapter = StubAdapter {
            drift: true,
            nodes: vec![json!({"external_id": "x"})],
        };
        let page = page();
        let parser = ListingParser::with_builtin_taxonomy();
        let parsed = parser.parse_page(&adapter, &page);
        assert!(parsed.is_empty());
        assert_eq!(parsed.listings().count(), 0);
        assert_eq!(parsed.drift().map(|d| d.missing_anchor.as_str()), Some("data[]"));
    }

    #[test]
    fn listings_iterator_restarts() {
        let adapter = StubAdapter {
            drift: false,
            nodes: vec![json!({"external_id": "c-1", "title": "Analityk", "link": "/c-1"})],
        };
        let page = page();
        let parser = ListingParser::with_builtin_taxonomy();
        let parsed = parser.parse_page(&adapter, &page);
        let first: Vec<_> = parsed.listings().collect();
        let second: Vec<_> = parsed.listings().collect();
        assert_eq!(first, second);
        assert_eq!(parsed.listing_count(), 1);
    }
}
