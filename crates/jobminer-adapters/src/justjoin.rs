//! justjoin.it offers API (one JSON document per page).

use serde_json::Value as JsonValue;
use url::Url;

use crate::{
    clean_text, parse_base_url, with_page_param, AdapterError, FieldName, ListingNode,
    SourceAdapter, StructuralDrift,
};
use jobminer_storage::RawPage;

pub const SOURCE_ID: &str = "justjoin.it";
pub const DEFAULT_OFFERS_URL: &str = "https://justjoin.it/api/candidate-api/offers?categories=data&city=Warszawa&experienceLevels=junior&orderBy=DESC&sortBy=published&perPage=50";

#[derive(Debug, Clone)]
pub struct JustJoinAdapter {
    offers_url: Url,
}

impl JustJoinAdapter {
    pub fn new(offers_url: &str) -> Result<Self, AdapterError> {
        Ok(Self {
            offers_url: parse_base_url(offers_url)?,
        })
    }
}

fn str_at<'a>(offer: &'a JsonValue, key: &str) -> Option<&'a str> {
    offer.get(key).and_then(JsonValue::as_str)
}

fn format_amount(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn period_suffix(unit: &str) -> Option<&'static str> {
    match unit.to_ascii_lowercase().as_str() {
        "hour" | "hourly" => Some("/ hour"),
        "day" | "daily" => Some("/ day"),
        "week" | "weekly" => Some("/ week"),
        "month" | "monthly" => Some("/ month"),
        "year" | "yearly" => Some("/ year"),
        _ => None,
    }
}

/// The first employment type decides both salary and contract form.
fn primary_employment(offer: &JsonValue) -> Option<&JsonValue> {
    offer.get("employmentTypes")?.as_array()?.first()
}

/// Renders the structured salary back into the free-text shape the
/// normalizer understands, e.g. `8000-11000 pln / month`.
fn salary_text(offer: &JsonValue) -> Option<String> {
    let employment = primary_employment(offer)?;
    let from = employment.get("from").and_then(JsonValue::as_f64);
    let to = employment.get("to").and_then(JsonValue::as_f64);
    let mut text = match (from, to) {
        (Some(from), Some(to)) => format!("{}-{}", format_amount(from), format_amount(to)),
        (Some(amount), None) | (None, Some(amount)) => format_amount(amount),
        (None, None) => return None,
    };
    if let Some(currency) = str_at(employment, "currency") {
        text.push(' ');
        text.push_str(currency);
    }
    if let Some(suffix) = str_at(employment, "unit").and_then(period_suffix) {
        text.push(' ');
        text.push_str(suffix);
    }
    Some(text)
}

fn skill_names(offer: &JsonValue, key: &str) -> Vec<String> {
    offer
        .get(key)
        .and_then(JsonValue::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| item.as_str().or_else(|| str_at(item, "name")))
                .filter_map(clean_text)
                .collect()
        })
        .unwrap_or_default()
}

impl SourceAdapter for JustJoinAdapter {
    fn source(&self) -> &str {
        SOURCE_ID
    }

    fn page_url(&self, page_index: u32) -> String {
        with_page_param(&self.offers_url, "page", page_index)
    }

    fn extract_listing_nodes(&self, page: &RawPage) -> Result<Vec<ListingNode>, StructuralDrift> {
        let drift = |anchor: &str| StructuralDrift {
            source_id: SOURCE_ID.to_string(),
            page_index: page.page_index,
            missing_anchor: anchor.to_string(),
        };
        let document: JsonValue =
            serde_json::from_str(&page.body).map_err(|_| drift("json document"))?;
        let offers = document
            .get("data")
            .and_then(JsonValue::as_array)
            .ok_or_else(|| drift("data[]"))?;
        Ok(offers.iter().cloned().map(ListingNode::Json).collect())
    }

    fn extract_field(&self, node: &ListingNode, field: FieldName) -> Option<String> {
        let ListingNode::Json(offer) = node else {
            return None;
        };
        let raw = match field {
            FieldName::ExternalId => str_at(offer, "slug")
                .or_else(|| str_at(offer, "guid"))
                .map(str::to_string),
            FieldName::Title => str_at(offer, "title").map(str::to_string),
            FieldName::Company => str_at(offer, "companyName").map(str::to_string),
            FieldName::Link => str_at(offer, "slug").map(|slug| format!("/job-offer/{slug}")),
            FieldName::Salary => salary_text(offer),
            FieldName::Location => str_at(offer, "city").map(str::to_string),
            FieldName::OperatingMode => str_at(offer, "workplaceType").map(str::to_string),
            FieldName::WorkType => str_at(offer, "workingTime").map(str::to_string),
            FieldName::ExperienceLevel => str_at(offer, "experienceLevel").map(str::to_string),
            FieldName::EmploymentType => primary_employment(offer)
                .and_then(|e| str_at(e, "type"))
                .map(str::to_string),
            FieldName::Description => str_at(offer, "body")
                .or_else(|| str_at(offer, "description"))
                .map(str::to_string),
            FieldName::PublishedDate => str_at(offer, "publishedAt").map(str::to_string),
            FieldName::Skills | FieldName::DetailPage => None,
        };
        raw.as_deref().and_then(clean_text)
    }

    fn extract_list(&self, node: &ListingNode, field: FieldName) -> Vec<String> {
        match (node, field) {
            (ListingNode::Json(offer), FieldName::Skills) => {
                let mut names = skill_names(offer, "requiredSkills");
                names.extend(skill_names(offer, "niceToHaveSkills"));
                names
            }
            _ => self.extract_field(node, field).into_iter().collect(),
        }
    }
}
