//! Taxonomy-driven skill extraction.
//!
//! The taxonomy lives in `rules/skills.yaml` and maps surface variants to a
//! canonical skill and its category. Matching is case-insensitive and only
//! accepts whole-word occurrences, so `R` never matches inside `HR`.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const BUILTIN_TAXONOMY: &str = include_str!("../../../rules/skills.yaml");
const SUPPORTED_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum TaxonomyError {
    #[error("failed to read taxonomy {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid taxonomy yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("unsupported taxonomy version {0}")]
    UnsupportedVersion(u32),
    #[error("skill `{0}` is declared more than once")]
    DuplicateSkill(String),
    #[error("variant `{variant}` is claimed by both `{first}` and `{second}`")]
    DuplicateVariant {
        variant: String,
        first: String,
        second: String,
    },
    #[error("skill `{0}` has an empty variant")]
    EmptyVariant(String),
}

/// A canonical skill found in a description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ExtractedSkill {
    pub name: String,
    pub category: String,
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    version: u32,
    categories: Vec<CategoryEntry>,
}

#[derive(Debug, Deserialize)]
struct CategoryEntry {
    category: String,
    skills: Vec<SkillEntry>,
}

#[derive(Debug, Deserialize)]
struct SkillEntry {
    name: String,
    #[serde(default)]
    variants: Vec<String>,
}

#[derive(Debug, Clone)]
struct Variant {
    surface: String,
    skill: usize,
}

#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    end: usize,
    skill: usize,
}

impl Span {
    fn len(&self) -> usize {
        self.end - self.start
    }

    fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Immutable variant table, shared read-only across parses.
#[derive(Debug, Clone)]
pub struct SkillTaxonomy {
    skills: Vec<ExtractedSkill>,
    variants: Vec<Variant>,
}

impl SkillTaxonomy {
    /// The taxonomy bundled with the crate, parsed once per process.
    pub fn builtin() -> &'static SkillTaxonomy {
        static BUILTIN: OnceLock<SkillTaxonomy> = OnceLock::new();
        BUILTIN.get_or_init(|| {
            SkillTaxonomy::from_yaml_str(BUILTIN_TAXONOMY).expect("bundled skill taxonomy is valid")
        })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, TaxonomyError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| TaxonomyError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&raw)
    }

    pub fn from_yaml_str(raw: &str) -> Result<Self, TaxonomyError> {
        let file: TaxonomyFile = serde_yaml::from_str(raw)?;
        if file.version != SUPPORTED_VERSION {
            return Err(TaxonomyError::UnsupportedVersion(file.version));
        }

        let mut skills = Vec::new();
        let mut variants = Vec::new();
        let mut names: HashMap<String, usize> = HashMap::new();
        let mut owners: HashMap<String, usize> = HashMap::new();

        for category in file.categories {
            for entry in category.skills {
                let index = skills.len();
                let folded_name = fold(&entry.name);
                if folded_name.is_empty() || names.insert(folded_name.clone(), index).is_some() {
                    return Err(TaxonomyError::DuplicateSkill(entry.name));
                }
                skills.push(ExtractedSkill {
                    name: entry.name.trim().to_string(),
                    category: category.category.trim().to_string(),
                });

                let surfaces = std::iter::once(folded_name).chain(entry.variants.iter().map(|v| fold(v)));
                for surface in surfaces {
                    if surface.is_empty() {
                        return Err(TaxonomyError::EmptyVariant(entry.name));
                    }
                    match owners.get(&surface) {
                        Some(&owner) if owner == index => continue,
                        Some(&owner) => {
                            return Err(TaxonomyError::DuplicateVariant {
                                variant: surface,
                                first: skills[owner].name.clone(),
                                second: entry.name,
                            })
                        }
                        None => {
                            owners.insert(surface.clone(), index);
                            variants.push(Variant { surface, skill: index });
                        }
                    }
                }
            }
        }

        tracing::debug!(skills = skills.len(), variants = variants.len(), "loaded skill taxonomy");
        Ok(Self { skills, variants })
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }

    pub fn categories(&self) -> BTreeSet<&str> {
        self.skills.iter().map(|s| s.category.as_str()).collect()
    }

    /// Canonical skills mentioned in `text`.
    ///
    /// Overlapping matches resolve to the longest span (earliest start, then
    /// canonical name, on ties). A skill whose only accepted spans are word
    /// aligned sub-phrases of a longer accepted skill is treated as shorthand
    /// for it and dropped: "Power BI and BI reporting" yields Power BI only.
    pub fn extract(&self, text: &str) -> BTreeSet<ExtractedSkill> {
        let haystack = fold(text);
        if haystack.is_empty() {
            return BTreeSet::new();
        }

        let mut candidates: Vec<Span> = self
            .variants
            .iter()
            .flat_map(|variant| {
                term_positions(&haystack, &variant.surface).map(move |start| Span {
                    start,
                    end: start + variant.surface.len(),
                    skill: variant.skill,
                })
            })
            .collect();
        candidates.sort_by(|a, b| {
            b.len()
                .cmp(&a.len())
                .then(a.start.cmp(&b.start))
                .then_with(|| self.skills[a.skill].name.cmp(&self.skills[b.skill].name))
        });

        let mut accepted: Vec<Span> = Vec::new();
        for candidate in candidates {
            if accepted.iter().all(|span| !span.overlaps(&candidate)) {
                accepted.push(candidate);
            }
        }

        accepted
            .iter()
            .filter(|span| {
                let surface = &haystack[span.start..span.end];
                !accepted.iter().any(|longer| {
                    longer.skill != span.skill
                        && longer.len() > span.len()
                        && term_positions(&haystack[longer.start..longer.end], surface)
                            .next()
                            .is_some()
                })
            })
            .map(|span| self.skills[span.skill].clone())
            .collect()
    }
}

/// Lowercases and collapses whitespace (including no-break spaces).
fn fold(text: &str) -> String {
    text.to_lowercase().split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Characters that glue a one-letter token into a longer word (`R&D`, `C's`).
fn is_letter_joiner(c: char) -> bool {
    c == '&' || c == '\''
}

/// Byte offsets where `term` occurs in `haystack` on word boundaries.
///
/// A boundary is only required on a side where the term itself starts or
/// ends with a word character, so `c#` and `.net` still match next to
/// punctuation.
pub(crate) fn term_positions<'a>(haystack: &'a str, term: &'a str) -> impl Iterator<Item = usize> + 'a {
    let starts_with_word = term.chars().next().is_some_and(is_word_char);
    let ends_with_word = term.chars().next_back().is_some_and(is_word_char);
    let single_letter = term.chars().count() == 1;
    let glued = move |c: char| is_word_char(c) || (single_letter && is_letter_joiner(c));
    haystack
        .match_indices(term)
        .map(|(start, _)| start)
        .filter(move |&start| {
            if term.is_empty() {
                return false;
            }
            let end = start + term.len();
            let clear_before = !starts_with_word
                || haystack[..start]
                    .chars()
                    .next_back()
                    .map_or(true, |c| !glued(c));
            let clear_after = !ends_with_word || haystack[end..].chars().next().map_or(true, |c| !glued(c));
            clear_before && clear_after
        })
}
