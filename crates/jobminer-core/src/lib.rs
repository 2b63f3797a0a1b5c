//! Core domain model for JobMiner: draft/persisted listings, skill mentions,
//! checkpoint state, plus the pure field normalizer and skill extractor.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod normalize;
pub mod skills;

pub use normalize::{ParseError, PayPeriod, SalaryRange};
pub use skills::{ExtractedSkill, SkillTaxonomy, TaxonomyError};

pub const CRATE_NAME: &str = "jobminer-core";

/// Identity of a listing inside the store. Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListingKey {
    pub source: String,
    pub external_id: String,
}

impl ListingKey {
    pub fn new(source: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            external_id: external_id.into(),
        }
    }
}

impl fmt::Display for ListingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source, self.external_id)
    }
}

/// Declares a string-backed enum with a stable storage representation.
macro_rules! labelled_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $label:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $label)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $label),+
                }
            }

            /// Parses the storage label; unknown labels yield `None`.
            pub fn from_label(label: &str) -> Option<Self> {
                match label {
                    $($label => Some($name::$variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

labelled_enum!(
    /// Where the work happens.
    OperatingMode {
        Remote => "remote",
        Hybrid => "hybrid",
        Onsite => "onsite",
        Unknown => "unknown",
    }
);

labelled_enum!(
    WorkType {
        FullTime => "full-time",
        PartTime => "part-time",
        Contract => "contract",
        Unknown => "unknown",
    }
);

labelled_enum!(
    ExperienceLevel {
        Intern => "intern",
        Junior => "junior",
        Mid => "mid",
        Senior => "senior",
        Expert => "expert",
        Manager => "manager",
        Unknown => "unknown",
    }
);

labelled_enum!(
    /// Legal form of the engagement, as published by Polish boards.
    EmploymentType {
        EmploymentContract => "employment-contract",
        B2b => "b2b",
        MandateContract => "mandate-contract",
        SpecificTaskContract => "specific-task-contract",
        Temporary => "temporary",
        Internship => "internship",
        Unknown => "unknown",
    }
);

labelled_enum!(
    ListingStatus {
        Active => "active",
        Stale => "stale",
        Expired => "expired",
    }
);

labelled_enum!(
    RunStatus {
        InProgress => "in-progress",
        Completed => "completed",
        Failed => "failed",
    }
);

/// Parsed listing handed from the parser to the reconciler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DraftListing {
    pub external_id: String,
    pub source: String,
    pub title: String,
    pub company: Option<String>,
    pub link: String,
    pub salary: Option<SalaryRange>,
    pub location: Option<String>,
    pub operating_mode: OperatingMode,
    pub work_type: WorkType,
    pub experience_level: ExperienceLevel,
    pub employment_type: EmploymentType,
    pub years_of_experience: Option<u32>,
    pub scrape_date: DateTime<Utc>,
    /// When the board first published the offer, if it says.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<DateTime<Utc>>,
    /// Free text used for skill extraction; never persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl DraftListing {
    pub fn key(&self) -> ListingKey {
        ListingKey::new(self.source.clone(), self.external_id.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SkillMention {
    pub external_id: String,
    pub source: String,
    pub skill_name: String,
    pub skill_category: String,
}

impl SkillMention {
    pub fn for_listing(draft: &DraftListing, skill: &ExtractedSkill) -> Self {
        Self {
            external_id: draft.external_id.clone(),
            source: draft.source.clone(),
            skill_name: skill.name.clone(),
            skill_category: skill.category.clone(),
        }
    }
}

/// Durable listing row as seen through the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedListing {
    pub id: i64,
    pub key: ListingKey,
    pub title: String,
    pub company: Option<String>,
    pub link: String,
    pub salary: Option<SalaryRange>,
    pub location: Option<String>,
    pub operating_mode: OperatingMode,
    pub work_type: WorkType,
    pub experience_level: ExperienceLevel,
    pub employment_type: EmploymentType,
    pub years_of_experience: Option<u32>,
    pub scrape_date: DateTime<Utc>,
    #[serde(default)]
    pub published_date: Option<DateTime<Utc>>,
    pub listing_status: ListingStatus,
    pub updated_at: DateTime<Utc>,
}

impl PersistedListing {
    pub fn from_draft(id: i64, draft: &DraftListing, now: DateTime<Utc>) -> Self {
        Self {
            id,
            key: draft.key(),
            title: draft.title.clone(),
            company: draft.company.clone(),
            link: draft.link.clone(),
            salary: draft.salary.clone(),
            location: draft.location.clone(),
            operating_mode: draft.operating_mode,
            work_type: draft.work_type,
            experience_level: draft.experience_level,
            employment_type: draft.employment_type,
            years_of_experience: draft.years_of_experience,
            scrape_date: draft.scrape_date,
            published_date: draft.published_date,
            listing_status: ListingStatus::Active,
            updated_at: now,
        }
    }
}

/// What applying a page to a checkpoint changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvanceOutcome {
    pub new_ids: usize,
    pub position_moved: bool,
}

impl AdvanceOutcome {
    pub fn is_noop(&self) -> bool {
        self.new_ids == 0 && !self.position_moved
    }
}

/// Progress marker for one source, passed explicitly through a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub source: String,
    pub last_page_index: Option<u32>,
    #[serde(default)]
    pub cursor_token: Option<String>,
    #[serde(default)]
    pub seen_external_ids: BTreeSet<String>,
    pub run_status: RunStatus,
    #[serde(default)]
    pub pages_advanced: u64,
    pub updated_at: DateTime<Utc>,
}

impl CheckpointState {
    pub fn initial(source: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            source: source.into(),
            last_page_index: None,
            cursor_token: None,
            seen_external_ids: BTreeSet::new(),
            run_status: RunStatus::Completed,
            pages_advanced: 0,
            updated_at: now,
        }
    }

    /// Page the next run should fetch first.
    ///
    /// An interrupted run (in progress or failed) resumes at its last fully
    /// advanced page, so at most that one page is fetched twice. A completed
    /// run starts pagination over because boards list new postings first.
    pub fn resume_page(&self, first_page: u32) -> u32 {
        match (self.run_status, self.last_page_index) {
            (RunStatus::Completed, _) | (_, None) => first_page,
            (_, Some(page)) => page.max(first_page),
        }
    }

    pub fn has_seen(&self, external_id: &str) -> bool {
        self.seen_external_ids.contains(external_id)
    }

    /// Records a fully reconciled page. Applying the same page twice is a no-op.
    pub fn apply_page<I, S>(&mut self, page_index: u32, external_ids: I, now: DateTime<Utc>) -> AdvanceOutcome
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut new_ids = 0usize;
        for id in external_ids {
            if self.seen_external_ids.insert(id.into()) {
                new_ids += 1;
            }
        }
        let position_moved = self.last_page_index != Some(page_index);
        if position_moved {
            self.last_page_index = Some(page_index);
            self.pages_advanced += 1;
        }
        self.run_status = RunStatus::InProgress;
        if new_ids > 0 || position_moved {
            self.updated_at = now;
        }
        AdvanceOutcome {
            new_ids,
            position_moved,
        }
    }

    /// Marks the start of a run without moving the position.
    pub fn begin_run(&mut self, now: DateTime<Utc>) {
        if self.run_status == RunStatus::Completed {
            self.last_page_index = None;
            self.cursor_token = None;
        }
        self.run_status = RunStatus::InProgress;
        self.updated_at = now;
    }

    pub fn set_status(&mut self, status: RunStatus, now: DateTime<Utc>) {
        self.run_status = status;
        self.updated_at = now;
    }
}
