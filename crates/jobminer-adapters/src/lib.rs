//! Per-source capability interface plus the board adapters and the listing
//! parser built on top of it.

use std::fmt;

use async_trait::async_trait;
use jobminer_storage::{FetchError, PageFetcher, PageParams, RawPage};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use thiserror::Error;
use url::Url;

pub mod justjoin;
pub mod parser;
pub mod pracuj;

pub use justjoin::JustJoinAdapter;
pub use parser::{
    FailureReason, FieldFallback, ListingParseFailure, ListingParser, ParsedListing, ParsedPage,
};
pub use pracuj::PracujAdapter;

pub const CRATE_NAME: &str = "jobminer-adapters";

/// Fields an adapter can be asked for on a single listing node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    ExternalId,
    Title,
    Company,
    Link,
    Salary,
    Location,
    OperatingMode,
    WorkType,
    ExperienceLevel,
    EmploymentType,
    Description,
    Skills,
    PublishedDate,
    /// The listing's own offer page as a whole.
    DetailPage,
}

impl FieldName {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldName::ExternalId => "external_id",
            FieldName::Title => "title",
            FieldName::Company => "company",
            FieldName::Link => "link",
            FieldName::Salary => "salary",
            FieldName::Location => "location",
            FieldName::OperatingMode => "operating_mode",
            FieldName::WorkType => "work_type",
            FieldName::ExperienceLevel => "experience_level",
            FieldName::EmploymentType => "employment_type",
            FieldName::Description => "description",
            FieldName::Skills => "skills",
            FieldName::PublishedDate => "published_date",
            FieldName::DetailPage => "detail_page",
        }
    }
}

impl fmt::Display for FieldName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One listing as located on a page, before any field is interpreted.
#[derive(Debug, Clone, PartialEq)]
pub enum ListingNode {
    /// Outer HTML of a listing card.
    Html(String),
    Json(JsonValue),
}

/// The page no longer carries the markup anchors the adapter relies on.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[error("structural drift on {source_id} page {page_index}: {missing_anchor}")]
pub struct StructuralDrift {
    pub source_id: String,
    pub page_index: u32,
    pub missing_anchor: String,
}

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("invalid base url `{url}`: {error}")]
    InvalidBaseUrl {
        url: String,
        #[source]
        error: url::ParseError,
    },
    #[error("invalid selector `{selector}`: {message}")]
    InvalidSelector { selector: String, message: String },
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source(&self) -> &str;

    fn page_url(&self, page_index: u32) -> String;

    async fn fetch_page(
        &self,
        fetcher: &dyn PageFetcher,
        page_index: u32,
    ) -> Result<RawPage, FetchError> {
        let url = self.page_url(page_index);
        fetcher
            .fetch(&url, &PageParams::new(self.source(), page_index))
            .await
    }

    fn extract_listing_nodes(&self, page: &RawPage) -> Result<Vec<ListingNode>, StructuralDrift>;

    /// Raw text of a scalar field; `None` when the node does not carry it.
    fn extract_field(&self, node: &ListingNode, field: FieldName) -> Option<String>;

    fn extract_list(&self, node: &ListingNode, field: FieldName) -> Vec<String>;

    /// Fetches the offer page behind a listing card. Boards whose search
    /// results already carry every field keep the default and return
    /// `Ok(None)`.
    async fn fetch_detail(
        &self,
        _fetcher: &dyn PageFetcher,
        _external_id: &str,
        _link: &str,
        _page_index: u32,
    ) -> Result<Option<RawPage>, FetchError> {
        Ok(None)
    }

    /// Scalar field read from an offer page; it takes precedence over the
    /// card value.
    fn extract_detail_field(&self, _detail: &RawPage, _field: FieldName) -> Option<String> {
        None
    }

    fn extract_detail_list(&self, _detail: &RawPage, _field: FieldName) -> Vec<String> {
        Vec::new()
    }
}

/// Builds the adapter registered for `source_id`, optionally pointed at a
/// different search URL.
pub fn adapter_for_source(
    source_id: &str,
    base_url: Option<&str>,
) -> Result<Option<Box<dyn SourceAdapter>>, AdapterError> {
    let adapter: Box<dyn SourceAdapter> = match source_id {
        pracuj::SOURCE_ID => Box::new(PracujAdapter::new(
            base_url.unwrap_or(pracuj::DEFAULT_SEARCH_URL),
        )?),
        justjoin::SOURCE_ID => Box::new(JustJoinAdapter::new(
            base_url.unwrap_or(justjoin::DEFAULT_OFFERS_URL),
        )?),
        _ => return Ok(None),
    };
    Ok(Some(adapter))
}

pub(crate) fn parse_base_url(raw: &str) -> Result<Url, AdapterError> {
    Url::parse(raw).map_err(|error| AdapterError::InvalidBaseUrl {
        url: raw.to_string(),
        error,
    })
}

/// `base` with `key=<page_index>` replacing any existing value of `key`.
pub(crate) fn with_page_param(base: &Url, key: &str, page_index: u32) -> String {
    let mut url = base.clone();
    let kept: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(k, _)| k != key)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (k, v) in &kept {
            pairs.append_pair(k, v);
        }
        pairs.append_pair(key, &page_index.to_string());
    }
    url.to_string()
}

pub(crate) fn clean_text(raw: &str) -> Option<String> {
    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        None
    } else {
        Some(collapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_param_replaces_existing_value() {
        let base = Url::parse("https://example.test/offers?city=Warszawa&page=7").unwrap();
        assert_eq!(
            with_page_param(&base, "page", 2),
            "https://example.test/offers?city=Warszawa&page=2"
        );
    }

    #[test]
    fn registry_knows_both_boards() {
        assert!(adapter_for_source("pracuj.pl", None).unwrap().is_some());
        assert!(adapter_for_source("justjoin.it", None).unwrap().is_some());
        assert!(adapter_for_source("nofluffjobs.com", None).unwrap().is_none());
        assert!(adapter_for_source("pracuj.pl", Some("not a url")).is_err());
    }

    #[test]
    fn clean_text_collapses_whitespace() {
        assert_eq!(clean_text("  Data\n   Analyst\u{a0}"), Some("Data Analyst".to_string()));
        assert_eq!(clean_text(" \n "), None);
    }
}
