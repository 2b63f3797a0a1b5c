//! pracuj.pl search result pages (server-rendered HTML).

use async_trait::async_trait;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value as JsonValue;
use url::Url;

use crate::{
    clean_text, parse_base_url, with_page_param, AdapterError, FieldName, ListingNode,
    SourceAdapter, StructuralDrift,
};
use jobminer_storage::{FetchError, PageFetcher, PageParams, RawPage};

pub const SOURCE_ID: &str = "pracuj.pl";
pub const DEFAULT_SEARCH_URL: &str =
    "https://it.pracuj.pl/praca/warszawa;wp?rd=30&et=17%2C4%2C3&its=business-analytics%2Cbig-data-science";

const OFFER_LIST: &str = "#offers-list";
const OFFER_CARD: &str = r#"[data-test="default-offer"]"#;
const OFFER_ID_ATTR: &str = "data-test-offerid";

/// What a badge on an offer card describes. Badges share one selector, so
/// the kind is inferred from the wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BadgeKind {
    Location,
    OperatingMode,
    WorkType,
    ExperienceLevel,
    EmploymentType,
}

const BADGE_KEYWORDS: &[(BadgeKind, &[&str])] = &[
    (BadgeKind::EmploymentType, &["umowa", "b2b", "kontrakt"]),
    (
        BadgeKind::OperatingMode,
        &["stacjonarna", "zdalna", "hybrydowa", "mobilna", "remote", "hybrid"],
    ),
    (
        BadgeKind::WorkType,
        &["pełny etat", "część etatu", "dodatkowa", "tymczasowa"],
    ),
    (
        BadgeKind::ExperienceLevel,
        &[
            "specjalista", "specjalistka", "młodszy", "starszy", "asystent", "praktykant",
            "stażysta", "ekspert", "kierownik", "menedżer", "dyrektor", "junior", "mid", "senior",
        ],
    ),
];

fn classify_badge(text: &str) -> BadgeKind {
    let lower = text.to_lowercase();
    BADGE_KEYWORDS
        .iter()
        .find(|(_, words)| words.iter().any(|w| lower.contains(w)))
        .map(|(kind, _)| *kind)
        .unwrap_or(BadgeKind::Location)
}

#[derive(Debug, Clone)]
struct Selectors {
    offer_list: Selector,
    offer_card: Selector,
    title_link: Selector,
    company: Selector,
    salary: Selector,
    badge: Selector,
    skills: Selector,
    bullets: Selector,
    detail: DetailSelectors,
}

/// Anchors on an offer's own page.
#[derive(Debug, Clone)]
struct DetailSelectors {
    title: Selector,
    employer: Selector,
    salary: Selector,
    about: Selector,
    json_ld: Selector,
}

fn selector(css: &str) -> Result<Selector, AdapterError> {
    Selector::parse(css).map_err(|e| AdapterError::InvalidSelector {
        selector: css.to_string(),
        message: e.to_string(),
    })
}

impl Selectors {
    fn new() -> Result<Self, AdapterError> {
        Ok(Self {
            offer_list: selector(OFFER_LIST)?,
            offer_card: selector(OFFER_CARD)?,
            title_link: selector(r#"[data-test="offer-title"] a[href]"#)?,
            company: selector(r#"[data-test="text-company-name"]"#)?,
            salary: selector(r#"[data-test="offer-salary"]"#)?,
            badge: selector(r#"[data-test="offer-badge-title"]"#)?,
            skills: selector(r#"[data-test="aggregate-open-dictionary-model"] li"#)?,
            bullets: selector(r#"[data-test="aggregate-bullet-model"] li"#)?,
            detail: DetailSelectors {
                title: selector(r#"h1[data-test="text-positionName"]"#)?,
                employer: selector(r#"h2[data-test="text-employerName"]"#)?,
                salary: selector(r#"[data-test="text-earningAmount"]"#)?,
                about: selector(r#"[data-test="text-about-project"]"#)?,
                json_ld: selector(r#"script[type="application/ld+json"]"#)?,
            },
        })
    }
}

#[derive(Debug, Clone)]
pub struct PracujAdapter {
    search_url: Url,
    selectors: Selectors,
}

impl PracujAdapter {
    pub fn new(search_url: &str) -> Result<Self, AdapterError> {
        Ok(Self {
            search_url: parse_base_url(search_url)?,
            selectors: Selectors::new()?,
        })
    }

    fn first_text(&self, card: ElementRef<'_>, sel: &Selector) -> Option<String> {
        card.select(sel)
            .next()
            .and_then(|n| clean_text(&n.text().collect::<String>()))
    }

    fn all_texts(&self, card: ElementRef<'_>, sel: &Selector) -> Vec<String> {
        card.select(sel)
            .filter_map(|n| clean_text(&n.text().collect::<String>()))
            .collect()
    }

    fn badge(&self, card: ElementRef<'_>, kind: BadgeKind) -> Option<String> {
        let matching: Vec<String> = self
            .all_texts(card, &self.selectors.badge)
            .into_iter()
            .filter(|text| classify_badge(text) == kind)
            .collect();
        match kind {
            // Several contract forms may be offered at once.
            BadgeKind::EmploymentType if !matching.is_empty() => Some(matching.join(", ")),
            _ => matching.into_iter().next(),
        }
    }

    fn external_id(&self, card: ElementRef<'_>) -> Option<String> {
        if let Some(id) = card.value().attr(OFFER_ID_ATTR).and_then(clean_text) {
            return Some(id);
        }
        let href = card
            .select(&self.selectors.title_link)
            .next()?
            .value()
            .attr("href")?;
        let (_, tail) = href.rsplit_once(",oferta,")?;
        let id: String = tail.chars().take_while(|c| c.is_ascii_digit()).collect();
        (!id.is_empty()).then_some(id)
    }

    /// Employer name without the nested "O firmie" link.
    fn employer(&self, root: ElementRef<'_>) -> Option<String> {
        let heading = root.select(&self.selectors.detail.employer).next()?;
        let text: String = heading
            .descendants()
            .filter(|node| {
                !node
                    .ancestors()
                    .filter_map(ElementRef::wrap)
                    .any(|el| el.value().name() == "a")
            })
            .filter_map(|node| node.value().as_text().map(|t| String::from(&**t)))
            .collect();
        clean_text(&text)
    }

    /// `datePosted` from the page's JobPosting JSON-LD block.
    fn date_posted(&self, root: ElementRef<'_>) -> Option<String> {
        root.select(&self.selectors.detail.json_ld).find_map(|script| {
            let value: JsonValue = serde_json::from_str(&script.text().collect::<String>()).ok()?;
            value.get("datePosted")?.as_str().and_then(clean_text)
        })
    }

    fn description(&self, root: ElementRef<'_>) -> Option<String> {
        let mut parts = self.all_texts(root, &self.selectors.detail.about);
        parts.extend(self.all_texts(root, &self.selectors.bullets));
        (!parts.is_empty()).then(|| parts.join("\n"))
    }

    fn with_card<T>(&self, node: &ListingNode, f: impl FnOnce(ElementRef<'_>) -> T) -> Option<T> {
        let ListingNode::Html(html) = node else {
            return None;
        };
        let fragment = Html::parse_fragment(html);
        let card = fragment.select(&self.selectors.offer_card).next()?;
        Some(f(card))
    }
}

#[async_trait]
impl SourceAdapter for PracujAdapter {
    fn source(&self) -> &str {
        SOURCE_ID
    }

    fn page_url(&self, page_index: u32) -> String {
        with_page_param(&self.search_url, "pn", page_index)
    }

    fn extract_listing_nodes(&self, page: &RawPage) -> Result<Vec<ListingNode>, StructuralDrift> {
        let drift = |anchor: &str| StructuralDrift {
            source_id: SOURCE_ID.to_string(),
            page_index: page.page_index,
            missing_anchor: anchor.to_string(),
        };

        let document = Html::parse_document(&page.body);
        let list = document
            .select(&self.selectors.offer_list)
            .next()
            .ok_or_else(|| drift(OFFER_LIST))?;

        let cards: Vec<ListingNode> = list
            .select(&self.selectors.offer_card)
            .map(|card| ListingNode::Html(card.html()))
            .collect();

        // A populated list without any recognisable card means the card markup changed.
        let has_children = list.children().any(|child| ElementRef::wrap(child).is_some());
        if cards.is_empty() && has_children {
            return Err(drift(OFFER_CARD));
        }
        Ok(cards)
    }

    fn extract_field(&self, node: &ListingNode, field: FieldName) -> Option<String> {
        let sel = &self.selectors;
        self.with_card(node, |card| match field {
            FieldName::ExternalId => self.external_id(card),
            FieldName::Title => self.first_text(card, &sel.title_link),
            FieldName::Link => card
                .select(&sel.title_link)
                .next()
                .and_then(|a| a.value().attr("href"))
                .and_then(clean_text),
            FieldName::Company => self.first_text(card, &sel.company),
            FieldName::Salary => self.first_text(card, &sel.salary),
            FieldName::Location => self.badge(card, BadgeKind::Location),
            FieldName::OperatingMode => self.badge(card, BadgeKind::OperatingMode),
            FieldName::WorkType => self.badge(card, BadgeKind::WorkType),
            FieldName::ExperienceLevel => self.badge(card, BadgeKind::ExperienceLevel),
            FieldName::EmploymentType => self.badge(card, BadgeKind::EmploymentType),
            FieldName::Description => {
                let bullets = self.all_texts(card, &sel.bullets);
                (!bullets.is_empty()).then(|| bullets.join("\n"))
            }
            FieldName::Skills | FieldName::PublishedDate | FieldName::DetailPage => None,
        })
        .flatten()
    }

    fn extract_list(&self, node: &ListingNode, field: FieldName) -> Vec<String> {
        match field {
            FieldName::Skills => self
                .with_card(node, |card| self.all_texts(card, &self.selectors.skills))
                .unwrap_or_default(),
            _ => self.extract_field(node, field).into_iter().collect(),
        }
    }

    async fn fetch_detail(
        &self,
        fetcher: &dyn PageFetcher,
        external_id: &str,
        link: &str,
        page_index: u32,
    ) -> Result<Option<RawPage>, FetchError> {
        let params = PageParams::new(SOURCE_ID, page_index).for_offer(external_id);
        fetcher.fetch(link, &params).await.map(Some)
    }

    fn extract_detail_field(&self, detail: &RawPage, field: FieldName) -> Option<String> {
        let document = Html::parse_document(&detail.body);
        let root = document.root_element();
        let sel = &self.selectors.detail;
        match field {
            FieldName::Title => self.first_text(root, &sel.title),
            FieldName::Company => self.employer(root),
            FieldName::Salary => self.first_text(root, &sel.salary),
            FieldName::Location => self.badge(root, BadgeKind::Location),
            FieldName::OperatingMode => self.badge(root, BadgeKind::OperatingMode),
            FieldName::WorkType => self.badge(root, BadgeKind::WorkType),
            FieldName::ExperienceLevel => self.badge(root, BadgeKind::ExperienceLevel),
            FieldName::EmploymentType => self.badge(root, BadgeKind::EmploymentType),
            FieldName::Description => self.description(root),
            FieldName::PublishedDate => self.date_posted(root),
            FieldName::ExternalId | FieldName::Link | FieldName::Skills | FieldName::DetailPage => None,
        }
    }

    fn extract_detail_list(&self, detail: &RawPage, field: FieldName) -> Vec<String> {
        match field {
            FieldName::Skills => {
                let document = Html::parse_document(&detail.body);
                self.all_texts(document.root_element(), &self.selectors.skills)
            }
            _ => self.extract_detail_field(detail, field).into_iter().collect(),
        }
    }
}
