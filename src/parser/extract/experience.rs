use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::model::Internship;
use crate::parser::document::{child_text, items, Document};

const MAX_INTERNSHIPS: usize = 2;

static SHORT_TENURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d+\s*months?\b|^\s*\d+\s*(?:yrs?|years?|mos?)\s*$").unwrap()
});

// Second term of "<start> – <end>".
static RANGE_END_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?:[A-Za-z]{3,9}\.?\s+)?\d{4}\s*(?:–|—|-)\s*((?:[A-Za-z]{3,9}\.?\s+)?\d{4}|Present)",
    )
    .unwrap()
});

static DATE_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:[A-Za-z]{3,9}\.?\s+)?\d{4}\b").unwrap());

/// Which job titles count as an internship.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InternshipRule {
    #[default]
    Intern,
    InternOrAnalyst,
}

impl InternshipRule {
    pub fn matches(&self, title: &str) -> bool {
        let title = title.to_lowercase();
        match self {
            InternshipRule::Intern => title.contains("intern"),
            InternshipRule::InternOrAnalyst => title.contains("intern") || title.contains("analyst"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExperienceEntry {
    pub title: Option<String>,
    pub company: Option<String>,
    pub duration: Option<String>,
}

pub fn entries(doc: &Document) -> Vec<ExperienceEntry> {
    let Some(section) = doc.section("experience", &["Experience"]) else {
        return Vec::new();
    };
    items(section, &["li.experience-item", "li.profile-section-card", "ul > li"])
        .into_iter()
        .map(|li| ExperienceEntry {
            title: child_text(li, "h3"),
            company: child_text(li, "h4"),
            duration: child_text(li, "span.date-range, .experience-item__duration"),
        })
        .filter(|e| e.title.is_some() || e.company.is_some())
        .collect()
}

/// First listed position as "<title> at <company>", dropping a missing half.
pub fn summary(doc: &Document) -> Option<String> {
    let first = entries(doc).into_iter().next()?;
    match (first.title, first.company) {
        (Some(t), Some(c)) => Some(format!("{} at {}", t, c)),
        (Some(t), None) => Some(t),
        (None, Some(c)) => Some(c),
        (None, None) => None,
    }
}

pub fn current_employer(doc: &Document) -> Option<String> {
    entries(doc).into_iter().next().and_then(|e| e.company)
}

/// Up to two internships. The `profile:internship_*` tags win when present; otherwise
/// short-tenure entries from the experience section, in document order.
pub fn internships(doc: &Document, rule: InternshipRule) -> Vec<Internship> {
    let tagged: Vec<Internship> = (1..=MAX_INTERNSHIPS)
        .filter_map(|n| {
            let company = doc.meta(&format!("profile:internship_company_{n}"))?;
            Some(Internship {
                company,
                title: None,
                end_date: doc.meta(&format!("profile:internship_end_date_{n}")),
            })
        })
        .collect();
    if !tagged.is_empty() {
        return tagged;
    }

    entries(doc)
        .into_iter()
        .filter(|e| e.title.as_deref().is_some_and(|t| rule.matches(t)))
        .filter(|e| e.duration.as_deref().is_some_and(is_short_tenure))
        .filter_map(|e| {
            let end_date = e.duration.as_deref().and_then(end_date);
            Some(Internship {
                company: e.company?,
                title: e.title,
                end_date,
            })
        })
        .take(MAX_INTERNSHIPS)
        .collect()
}

pub fn is_short_tenure(duration: &str) -> bool {
    duration.contains("mos") || SHORT_TENURE_RE.is_match(duration)
}

/// "Jun 2019 – Aug 2019 · 3 mos" → "Aug 2019". Without a range, the last date token.
pub fn end_date(duration: &str) -> Option<String> {
    if let Some(caps) = RANGE_END_RE.captures(duration) {
        return Some(caps[1].trim().to_string());
    }
    DATE_TOKEN_RE
        .find_iter(duration)
        .last()
        .map(|m| m.as_str().trim().to_string())
}
