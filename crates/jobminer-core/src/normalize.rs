//! Field normalizer: raw text fragments to canonical typed values.
//!
//! Salary normalization is the only fallible entry point; every other
//! function degrades to an `Unknown` variant or `None`.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{EmploymentType, ExperienceLevel, OperatingMode, WorkType};

/// Average paid hours in a month: 21 working days of 8 hours.
pub const HOURS_PER_MONTH: f64 = 168.0;
pub const WORKING_DAYS_PER_MONTH: f64 = 21.0;
pub const WEEKS_PER_MONTH: f64 = 52.0 / 12.0;
pub const MONTHS_PER_YEAR: f64 = 12.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PayPeriod {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl PayPeriod {
    /// Factor that turns one amount of this period into a monthly amount.
    pub fn monthly_multiplier(&self) -> f64 {
        match self {
            PayPeriod::Hourly => HOURS_PER_MONTH,
            PayPeriod::Daily => WORKING_DAYS_PER_MONTH,
            PayPeriod::Weekly => WEEKS_PER_MONTH,
            PayPeriod::Monthly => 1.0,
            PayPeriod::Yearly => 1.0 / MONTHS_PER_YEAR,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PayPeriod::Hourly => "hourly",
            PayPeriod::Daily => "daily",
            PayPeriod::Weekly => "weekly",
            PayPeriod::Monthly => "monthly",
            PayPeriod::Yearly => "yearly",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "hourly" => Some(PayPeriod::Hourly),
            "daily" => Some(PayPeriod::Daily),
            "weekly" => Some(PayPeriod::Weekly),
            "monthly" => Some(PayPeriod::Monthly),
            "yearly" => Some(PayPeriod::Yearly),
            _ => None,
        }
    }
}

impl fmt::Display for PayPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Salary range expressed in monthly amounts.
///
/// `period` is the pay period found in the source text; when none was found
/// `period` is `Monthly` and `period_assumed` is set.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SalaryRange {
    pub min: u32,
    pub max: u32,
    pub currency: Option<String>,
    pub period: PayPeriod,
    pub period_assumed: bool,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("salary text is empty")]
    Empty,
    #[error("no amount found in salary text {0:?}")]
    NoAmount(String),
    #[error("salary range {min}-{max} is inverted")]
    InvertedRange { min: u32, max: u32 },
    #[error("salary amount {0} does not fit a monthly figure")]
    OutOfRange(f64),
}

const PERIOD_MARKERS: &[(PayPeriod, &[&str])] = &[
    (
        PayPeriod::Hourly,
        &["/h", "/godz", "godz.", "nagodzin", "zagodzin", "perhour", "hourly", "/hr", "/hour"],
    ),
    (
        PayPeriod::Daily,
        &["/day", "/dzień", "/dzien", "dziennie", "perday", "daily", "/dniówk"],
    ),
    (
        PayPeriod::Weekly,
        &["/week", "/tydz", "tygodniowo", "perweek", "weekly"],
    ),
    (
        PayPeriod::Monthly,
        &["/mies", "mies.", "miesięcznie", "miesiecznie", "/month", "permonth", "monthly", "/mth", "/mo"],
    ),
    (
        PayPeriod::Yearly,
        &["/year", "/rok", "rocznie", "peryear", "yearly", "annual", "/annum", "p.a.", "/yr"],
    ),
];

const CURRENCY_MARKERS: &[(&str, &[&str])] = &[
    ("PLN", &["pln", "zł"]),
    ("EUR", &["eur", "€"]),
    ("USD", &["usd", "$"]),
    ("GBP", &["gbp", "£"]),
    ("CHF", &["chf"]),
];

fn amount_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?P<lo>\d+(?:[.,]\d+)*)(?P<lok>k)?(?:[^\d\-–—]{0,4}?(?:-|–|—|to|do)[^\d]{0,4}?(?P<hi>\d+(?:[.,]\d+)*)(?P<hik>k)?)?",
        )
            .expect("salary amount pattern is valid")
    })
}

/// Parses `8000`, `8,000`, `8.000,50` and `25,50` style amounts.
fn parse_amount(raw: &str) -> Option<f64> {
    let digits_only = |s: &str| s.chars().filter(char::is_ascii_digit).collect::<String>();
    match raw.rfind(['.', ',']) {
        Some(idx) if raw.len() - idx - 1 != 3 => {
            let whole = digits_only(&raw[..idx]);
            format!("{whole}.{}", &raw[idx + 1..]).parse().ok()
        }
        _ => digits_only(raw).parse().ok(),
    }
}

fn earliest_marker<T: Copy>(haystack: &str, table: &[(T, &[&str])]) -> Option<T> {
    table
        .iter()
        .filter_map(|(value, markers)| {
            markers
                .iter()
                .filter_map(|m| haystack.find(m))
                .min()
                .map(|pos| (pos, *value))
        })
        .min_by_key(|(pos, _)| *pos)
        .map(|(_, value)| value)
}

pub fn detect_pay_period(text: &str) -> Option<PayPeriod> {
    earliest_marker(&compact(text), PERIOD_MARKERS)
}

pub fn detect_currency(text: &str) -> Option<String> {
    earliest_marker(&compact(text), CURRENCY_MARKERS).map(ToString::to_string)
}

/// Lowercases and drops every whitespace character, including non-breaking
/// and thin spaces used as thousands separators.
fn compact(text: &str) -> String {
    text.replace("&nbsp;", "")
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect()
}

/// Words that may follow an amount directly without making it part of a label.
const AMOUNT_QUALIFIERS: &[&str] = &["brutto", "netto", "gross", "net"];

/// Lowercases, maps every whitespace variant to a plain space and removes
/// the space inside digit groups (`12 000` becomes `12000`). A digit run
/// glued to a letter, as in `b2b 100`, is left alone.
fn join_digit_groups(text: &str) -> String {
    let chars: Vec<char> = text
        .replace("&nbsp;", " ")
        .to_lowercase()
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();

    let mut out = String::with_capacity(chars.len());
    for (i, &c) in chars.iter().enumerate() {
        if c == ' ' && i > 0 && chars[i - 1].is_ascii_digit() {
            let run_start = chars[..i]
                .iter()
                .rposition(|c| !c.is_ascii_digit() && *c != '.' && *c != ',')
                .map_or(0, |p| p + 1);
            let run_is_free = run_start == 0 || !chars[run_start - 1].is_alphabetic();
            let group = chars.get(i + 1..i + 4).is_some_and(|g| g.iter().all(char::is_ascii_digit));
            let group_ends = chars.get(i + 4).map_or(true, |n| !n.is_ascii_digit());
            if run_is_free && group && group_ends {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn starts_with_marker(tail: &str) -> bool {
    let marker = |table: &[&str]| table.iter().any(|m| tail.starts_with(m));
    PERIOD_MARKERS.iter().any(|(_, markers)| marker(markers))
        || CURRENCY_MARKERS.iter().any(|(_, markers)| marker(markers))
        || marker(AMOUNT_QUALIFIERS)
}

fn ends_with_currency(head: &str) -> bool {
    CURRENCY_MARKERS
        .iter()
        .any(|(_, markers)| markers.iter().any(|m| head.ends_with(m)))
}

/// Picks the salary figure out of `spaced` text. Digits fused with letters
/// (`b2b`, `1etat`) are labels, not amounts. A range wins over single
/// amounts; among singles the first one next to a currency or period
/// marker wins, then simply the first one.
fn salary_amount(spaced: &str) -> Option<regex::Captures<'_>> {
    let mut marked = None;
    let mut first = None;
    for caps in amount_pattern().captures_iter(spaced) {
        let Some(whole) = caps.get(0) else { continue };
        let before = &spaced[..whole.start()];
        let after = &spaced[whole.end()..];
        let tail = compact(after);
        let followed_by_marker = starts_with_marker(&tail);

        if before.chars().next_back().is_some_and(char::is_alphabetic) {
            continue;
        }
        if after.chars().next().is_some_and(char::is_alphabetic) && !followed_by_marker {
            continue;
        }
        if caps.name("hi").is_some() {
            return Some(caps);
        }
        if marked.is_none() && (followed_by_marker || ends_with_currency(&compact(before))) {
            marked = Some(caps);
        } else if first.is_none() {
            first = Some(caps);
        }
    }
    marked.or(first)
}

fn to_monthly(amount: f64, period: PayPeriod) -> Result<u32, ParseError> {
    let monthly = (amount * period.monthly_multiplier()).round();
    if !monthly.is_finite() || monthly < 0.0 || monthly > f64::from(u32::MAX) {
        return Err(ParseError::OutOfRange(amount));
    }
    Ok(monthly as u32)
}

/// Normalizes salary text such as `15-20 PLN/h` or `8 000–10 000 zł brutto / mies.`
/// into a monthly range.
pub fn normalize_salary(text: &str) -> Result<SalaryRange, ParseError> {
    if text.trim().is_empty() {
        return Err(ParseError::Empty);
    }
    let compacted = compact(text);
    let spaced = join_digit_groups(text);
    let caps = salary_amount(&spaced).ok_or_else(|| ParseError::NoAmount(text.trim().to_string()))?;

    let lo_raw = caps.name("lo").map(|m| m.as_str()).unwrap_or_default();
    let mut lo = parse_amount(lo_raw).ok_or_else(|| ParseError::NoAmount(text.trim().to_string()))?;
    let mut hi = match caps.name("hi") {
        Some(m) => parse_amount(m.as_str()).ok_or_else(|| ParseError::NoAmount(text.trim().to_string()))?,
        None => lo,
    };

    let lo_k = caps.name("lok").is_some();
    let hi_k = caps.name("hik").is_some();
    if lo_k {
        lo *= 1000.0;
    }
    if hi_k {
        hi *= 1000.0;
        if !lo_k && caps.name("hi").is_some() && lo < 1000.0 {
            lo *= 1000.0;
        }
    } else if caps.name("hi").is_none() && lo_k {
        hi = lo;
    }

    let detected = earliest_marker(&compacted, PERIOD_MARKERS);
    let period = detected.unwrap_or(PayPeriod::Monthly);
    let min = to_monthly(lo, period)?;
    let max = to_monthly(hi, period)?;
    if min > max {
        return Err(ParseError::InvertedRange { min, max });
    }

    Ok(SalaryRange {
        min,
        max,
        currency: earliest_marker(&compacted, CURRENCY_MARKERS).map(ToString::to_string),
        period,
        period_assumed: detected.is_none(),
    })
}

/// True when `term` occurs in `haystack` with no word character glued to
/// either edge. Both inputs are expected lowercase.
pub(crate) fn contains_term(haystack: &str, term: &str) -> bool {
    crate::skills::term_positions(haystack, term).next().is_some()
}

fn first_match<T: Copy>(lower: &str, table: &[(T, &[&str])]) -> Option<T> {
    table
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| contains_term(lower, t)))
        .map(|(value, _)| *value)
}

const EXPERIENCE_TERMS: &[(ExperienceLevel, &[&str])] = &[
    (
        ExperienceLevel::Intern,
        &["praktykant", "praktykantka", "stażysta", "stażystka", "intern", "internship", "trainee"],
    ),
    (
        ExperienceLevel::Manager,
        &["kierownik", "kierowniczka", "menedżer", "menedzer", "manager", "dyrektor", "director", "head of"],
    ),
    (ExperienceLevel::Expert, &["ekspert", "ekspertka", "expert", "principal"]),
    (ExperienceLevel::Senior, &["starszy specjalista", "starsza specjalistka", "senior"]),
    (
        ExperienceLevel::Junior,
        &[
            "młodszy specjalista",
            "młodsza specjalistka",
            "mlodszy specjalista",
            "junior",
            "asystent",
            "asystentka",
            "assistant",
            "entry-level",
            "entry level",
        ],
    ),
    (
        ExperienceLevel::Mid,
        &["specjalista", "specjalistka", "specialist", "mid", "regular"],
    ),
];

/// Maps a seniority label (Polish or English) to an [`ExperienceLevel`].
pub fn normalize_experience(text: &str) -> ExperienceLevel {
    first_match(&text.to_lowercase(), EXPERIENCE_TERMS).unwrap_or(ExperienceLevel::Unknown)
}

/// Maps a work-mode label to an [`OperatingMode`]; mixed remote and on-site
/// labels count as hybrid.
pub fn normalize_mode(text: &str) -> OperatingMode {
    let lower = text
        .to_lowercase()
        .replace("home office", "remote")
        .replace("home-office", "remote");
    if ["hybryd", "hybrid", "partly"].iter().any(|m| lower.contains(m)) {
        return OperatingMode::Hybrid;
    }
    let remote = ["zdaln", "remote"].iter().any(|m| lower.contains(m));
    let onsite = ["stacjonarn", "on-site", "onsite", "office", "biur", "w siedzibie"]
        .iter()
        .any(|m| lower.contains(m));
    match (remote, onsite) {
        (true, true) => OperatingMode::Hybrid,
        (true, false) => OperatingMode::Remote,
        (false, true) => OperatingMode::Onsite,
        (false, false) => OperatingMode::Unknown,
    }
}

const WORK_TYPE_TERMS: &[(WorkType, &[&str])] = &[
    (
        WorkType::FullTime,
        &["pełny etat", "pelny etat", "full-time", "full time", "full_time", "fulltime"],
    ),
    (
        WorkType::PartTime,
        &["część etatu", "czesc etatu", "part-time", "part time", "part_time", "parttime"],
    ),
    (WorkType::Contract, &["contract", "kontrakt", "freelance"]),
];

pub fn normalize_work_type(text: &str) -> WorkType {
    first_match(&text.to_lowercase(), WORK_TYPE_TERMS).unwrap_or(WorkType::Unknown)
}

const EMPLOYMENT_TERMS: &[(EmploymentType, &[&str])] = &[
    (
        EmploymentType::Temporary,
        &["umowa o pracę tymczasową", "praca tymczasowa", "temporary"],
    ),
    (
        EmploymentType::Internship,
        &["umowa o staż", "umowa o praktykę", "staż", "praktyki", "internship", "practice_internship"],
    ),
    (
        EmploymentType::EmploymentContract,
        &["umowa o pracę", "umowa o prace", "uop", "permanent", "employment contract"],
    ),
    (EmploymentType::B2b, &["b2b", "kontrakt b2b"]),
    (
        EmploymentType::MandateContract,
        &["umowa zlecenie", "zlecenie", "mandate contract", "mandate_contract"],
    ),
    (
        EmploymentType::SpecificTaskContract,
        &["umowa o dzieło", "umowa o dzielo", "specific-task", "specific_task"],
    ),
];

pub fn normalize_employment_type(text: &str) -> EmploymentType {
    first_match(&text.to_lowercase(), EMPLOYMENT_TERMS).unwrap_or(EmploymentType::Unknown)
}

fn years_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            r"(\d{1,2})\s*\+?\s*(?:[-–]\s*\d{1,2}\s*)?(?:lat|lata|rok|roku)\w*\s*(?:\w+\s+)?doświadcz",
            r"doświadczeni\w*\s*(?:\w+\s+)?(?:min(?:imum)?[.:]?\s*)?(\d{1,2})\s*\+?\s*(?:lat|lata|rok|roku)",
            r"min(?:imum)?[.:]?\s*(\d{1,2})\s*(?:lat|lata|rok|roku)\w*\s*(?:\w+\s+)?doświadcz",
            r"(\d{1,2})\s*\+?\s*(?:[-–]\s*\d{1,2}\s*)?(?:years?|yrs?)\b(?:\s+of)?(?:\s+\w+)?\s+(?:experience|exp)\b",
            r"experience\s*(?:of\s*)?(?:min(?:imum)?\.?\s*)?(\d{1,2})\s*\+?\s*(?:years?|yrs?)\b",
            r"(?:min(?:imum)?\.?|at least)\s*(\d{1,2})\s*\+?\s*(?:years?|yrs?)\b",
        ]
        .iter()
        .map(|p| Regex::new(p).expect("years-of-experience pattern is valid"))
        .collect()
    })
}

/// Finds a required years-of-experience figure; ranges yield the lower bound.
pub fn extract_years_of_experience(text: &str) -> Option<u32> {
    let lower = text.to_lowercase();
    years_patterns()
        .iter()
        .filter_map(|re| re.captures(&lower))
        .filter_map(|caps| caps.get(1)?.as_str().parse::<u32>().ok())
        .find(|years| *years <= 50)
}

const POLISH_MONTHS: [&str; 12] = [
    "stycznia", "lutego", "marca", "kwietnia", "maja", "czerwca", "lipca", "sierpnia", "września",
    "października", "listopada", "grudnia",
];

fn polish_date_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2})\s+(\p{L}+)\s+(\d{4})").expect("polish date pattern is valid")
    })
}

/// Reads a publication date: RFC 3339 timestamps, bare `YYYY-MM-DD`, or the
/// long Polish form (`Opublikowana: 2 marca 2026`). Dates without a time are
/// taken as midnight UTC.
pub fn parse_published_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if let Ok(stamp) = DateTime::parse_from_rfc3339(text) {
        return Some(stamp.with_timezone(&Utc));
    }
    let date = match NaiveDate::parse_from_str(text.get(..10).unwrap_or(text), "%Y-%m-%d") {
        Ok(date) => date,
        Err(_) => {
            let lower = text.to_lowercase();
            let caps = polish_date_pattern().captures(&lower)?;
            let month = POLISH_MONTHS.iter().position(|m| *m == &caps[2])? as u32 + 1;
            NaiveDate::from_ymd_opt(caps[3].parse().ok()?, month, caps[1].parse().ok()?)?
        }
    };
    Some(date.and_hms_opt(0, 0, 0)?.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hourly_salary_uses_documented_monthly_hours() {
        let salary = normalize_salary("15-20 PLN/h").unwrap();
        assert_eq!(salary.min, 15 * 168);
        assert_eq!(salary.max, 20 * 168);
        assert_eq!(salary.period, PayPeriod::Hourly);
        assert_eq!(salary.currency.as_deref(), Some("PLN"));
        assert!(!salary.period_assumed);
    }

    #[test]
    fn salary_without_period_is_kept_and_flagged_as_assumed_monthly() {
        let salary = normalize_salary("8000-10000 PLN").unwrap();
        assert_eq!((salary.min, salary.max), (8000, 10000));
        assert_eq!(salary.period, PayPeriod::Monthly);
        assert!(salary.period_assumed);
    }

    #[test]
    fn board_formatting_with_nbsp_and_dashes() {
        let salary = normalize_salary("12\u{a0}000–20\u{a0}000\u{a0}zł brutto / mies.").unwrap();
        assert_eq!((salary.min, salary.max), (12000, 20000));
        assert_eq!(salary.period, PayPeriod::Monthly);
        assert!(!salary.period_assumed);
        assert_eq!(salary.currency.as_deref(), Some("PLN"));
    }

    #[test]
    fn yearly_and_daily_are_converted() {
        let yearly = normalize_salary("120 000 EUR / year").unwrap();
        assert_eq!((yearly.min, yearly.max), (10000, 10000));
        assert_eq!(yearly.currency.as_deref(), Some("EUR"));

        let daily = normalize_salary("800 - 1000 zł netto (+ VAT) / dzień").unwrap();
        assert_eq!((daily.min, daily.max), (800 * 21, 1000 * 21));
    }

    #[test]
    fn thousands_suffix_and_separators() {
        let salary = normalize_salary("15k-20k USD").unwrap();
        assert_eq!((salary.min, salary.max), (15000, 20000));
        let shared_suffix = normalize_salary("15-20k PLN").unwrap();
        assert_eq!((shared_suffix.min, shared_suffix.max), (15000, 20000));
        let commas = normalize_salary("$8,000 - $9,500 per month").unwrap();
        assert_eq!((commas.min, commas.max), (8000, 9500));
        let decimal = normalize_salary("25,50 zł/godz.").unwrap();
        assert_eq!(decimal.min, (25.5f64 * 168.0).round() as u32);
    }

    #[test]
    fn label_digits_are_not_taken_for_amounts() {
        let b2b = normalize_salary("Umowa B2B 12 000 – 16 000 zł netto / mies.").unwrap();
        assert_eq!((b2b.min, b2b.max), (12000, 16000));
        assert_eq!(b2b.currency.as_deref(), Some("PLN"));
        assert!(!b2b.period_assumed);

        let hourly = normalize_salary("B2B: 15-20 PLN/h").unwrap();
        assert_eq!((hourly.min, hourly.max), (2520, 3360));

        let full_time = normalize_salary("1 etat: 8000-10000 PLN").unwrap();
        assert_eq!((full_time.min, full_time.max), (8000, 10000));

        let single = normalize_salary("B2B 9000 zł").unwrap();
        assert_eq!((single.min, single.max), (9000, 9000));
        assert!(matches!(normalize_salary("umowa b2b"), Err(ParseError::NoAmount(_))));
    }

    #[test]
    fn salary_errors_are_field_local() {
        assert_eq!(normalize_salary("   "), Err(ParseError::Empty));
        assert!(matches!(normalize_salary("do negocjacji"), Err(ParseError::NoAmount(_))));
        assert!(matches!(
            normalize_salary("20000-10000 PLN"),
            Err(ParseError::InvertedRange { min: 20000, max: 10000 })
        ));
    }

    #[test]
    fn experience_labels() {
        assert_eq!(normalize_experience("młodszy specjalista (Junior)"), ExperienceLevel::Junior);
        assert_eq!(normalize_experience("specjalista (Mid / Regular)"), ExperienceLevel::Mid);
        assert_eq!(normalize_experience("starszy specjalista (Senior)"), ExperienceLevel::Senior);
        assert_eq!(normalize_experience("asystent"), ExperienceLevel::Junior);
        assert_eq!(normalize_experience("praktykant / stażysta"), ExperienceLevel::Intern);
        assert_eq!(normalize_experience("kierownik / koordynator"), ExperienceLevel::Manager);
        assert_eq!(normalize_experience("Pyramid scheme"), ExperienceLevel::Unknown);
        assert_eq!(normalize_experience(""), ExperienceLevel::Unknown);
    }

    #[test]
    fn operating_modes() {
        assert_eq!(normalize_mode("praca zdalna"), OperatingMode::Remote);
        assert_eq!(normalize_mode("praca hybrydowa"), OperatingMode::Hybrid);
        assert_eq!(normalize_mode("praca stacjonarna"), OperatingMode::Onsite);
        assert_eq!(normalize_mode("praca stacjonarna, praca zdalna"), OperatingMode::Hybrid);
        assert_eq!(normalize_mode("Home office"), OperatingMode::Remote);
        assert_eq!(normalize_mode("office"), OperatingMode::Onsite);
        assert_eq!(normalize_mode("???"), OperatingMode::Unknown);
    }

    #[test]
    fn work_and_employment_types() {
        assert_eq!(normalize_work_type("pełny etat"), WorkType::FullTime);
        assert_eq!(normalize_work_type("part_time"), WorkType::PartTime);
        assert_eq!(normalize_work_type("freelance"), WorkType::Contract);
        assert_eq!(normalize_work_type("n/a"), WorkType::Unknown);

        assert_eq!(normalize_employment_type("umowa o pracę"), EmploymentType::EmploymentContract);
        assert_eq!(
            normalize_employment_type("umowa o pracę tymczasową"),
            EmploymentType::Temporary
        );
        assert_eq!(normalize_employment_type("kontrakt B2B"), EmploymentType::B2b);
        assert_eq!(normalize_employment_type("umowa zlecenie"), EmploymentType::MandateContract);
        assert_eq!(normalize_employment_type("umowa o dzieło"), EmploymentType::SpecificTaskContract);
        assert_eq!(normalize_employment_type("whatever"), EmploymentType::Unknown);
    }

    #[test]
    fn years_of_experience_phrases() {
        assert_eq!(extract_years_of_experience("Min. 2 lata doświadczenia w analizie danych"), Some(2));
        assert_eq!(extract_years_of_experience("3-5 lat doświadczenia"), Some(3));
        assert_eq!(extract_years_of_experience("doświadczenie min. 4 lata"), Some(4));
        assert_eq!(extract_years_of_experience("3+ years of experience with SQL"), Some(3));
        assert_eq!(extract_years_of_experience("at least 2 years in a BI role"), Some(2));
        assert_eq!(extract_years_of_experience("Znajomość SQL"), None);
    }

    #[test]
    fn published_dates_in_board_formats() {
        let midnight = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(0, 0, 0).unwrap().and_utc();
        assert_eq!(
            parse_published_date("2026-03-01T08:00:00.000Z").map(|d| d.to_rfc3339()),
            Some("2026-03-01T08:00:00+00:00".to_string())
        );
        assert_eq!(parse_published_date("2026-02-27"), Some(midnight(2026, 2, 27)));
        assert_eq!(parse_published_date("Opublikowana: 2 marca 2026"), Some(midnight(2026, 3, 2)));
        assert_eq!(parse_published_date("31 lutego 2026"), None);
        assert_eq!(parse_published_date("wczoraj"), None);
    }

    #[test]
    fn period_and_currency_detection_pick_earliest_marker() {
        assert_eq!(detect_pay_period("9000 zł / mies. (ok. 55 zł/h)"), Some(PayPeriod::Monthly));
        assert_eq!(detect_pay_period("8000"), None);
        assert_eq!(detect_currency("€ 5000 (approx. 21 000 PLN)").as_deref(), Some("EUR"));
    }
}
