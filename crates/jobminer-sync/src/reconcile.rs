//! Per-listing insert / skip / update decisions.

use std::collections::HashSet;
use std::fmt;

use jobminer_core::{DraftListing, ListingStatus, PersistedListing};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Already stored with the same salary and an active status.
    Duplicate,
    /// The external id appeared earlier on the same page.
    DuplicateWithinPage,
}

/// The only columns a re-scrape may touch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangedField {
    Salary,
    Status,
}

impl fmt::Display for ChangedField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ChangedField::Salary => "salary",
            ChangedField::Status => "status",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "decision", content = "detail", rename_all = "snake_case")]
pub enum Decision {
    Insert,
    Skip(SkipReason),
    Update(Vec<ChangedField>),
}

impl Decision {
    pub fn writes(&self) -> bool {
        !matches!(self, Decision::Skip(_))
    }
}

/// Compares a draft against the stored row for the same key. Never asks for
/// a delete.
pub fn reconcile(draft: &DraftListing, prior: Option<&PersistedListing>) -> Decision {
    let Some(prior) = prior else {
        return Decision::Insert;
    };

    let mut changed = Vec::new();
    if prior.salary != draft.salary {
        changed.push(ChangedField::Salary);
    }
    if prior.listing_status != ListingStatus::Active {
        changed.push(ChangedField::Status);
    }

    if changed.is_empty() {
        Decision::Skip(SkipReason::Duplicate)
    } else {
        Decision::Update(changed)
    }
}

/// Reconciles the listings of one page, remembering which ids it has
/// already decided on.
#[derive(Debug, Default)]
pub struct PageReconciler {
    decided: HashSet<String>,
}

impl PageReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decide(&mut self, draft: &DraftListing, prior: Option<&PersistedListing>) -> Decision {
        if !self.decided.insert(draft.external_id.clone()) {
            return Decision::Skip(SkipReason::DuplicateWithinPage);
        }
        reconcile(draft, prior)
    }
}
