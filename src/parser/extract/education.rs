use crate::parser::chain::{first_match, Rule};
use crate::parser::document::{child_text, items, Document};

use super::last_year;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EducationEntry {
    pub school: Option<String>,
    /// Degree line, e.g. "Bachelor of Science, Finance".
    pub secondary: Option<String>,
    pub dates: Option<String>,
    pub description: Option<String>,
}

impl EducationEntry {
    pub fn is_high_school(&self) -> bool {
        self.school
            .as_deref()
            .is_some_and(|s| s.to_lowercase().contains("high school"))
    }

    /// Text before the first comma of the degree line.
    pub fn degree(&self) -> Option<String> {
        let secondary = self.secondary.as_deref()?;
        let degree = secondary.split(',').next().unwrap_or(secondary).trim();
        (!degree.is_empty()).then(|| degree.to_string())
    }

    /// Field of study after the first comma of the degree line.
    pub fn major(&self) -> Option<String> {
        let (_, major) = self.secondary.as_deref()?.split_once(',')?;
        let major = major.trim();
        (!major.is_empty()).then(|| major.to_string())
    }

    pub fn graduation_year(&self) -> Option<String> {
        self.dates.as_deref().and_then(last_year)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Education {
    pub high_school: Option<String>,
    pub hs_graduation_year: Option<String>,
    pub university: Option<String>,
    pub degree: Option<String>,
    pub college_major: Option<String>,
    pub university_grad_year: Option<String>,
    pub university2: Option<String>,
    pub degree2: Option<String>,
}

pub fn entries(doc: &Document) -> Vec<EducationEntry> {
    let Some(section) = doc.section("educationsDetails", &["Education"]) else {
        return Vec::new();
    };
    items(section, &["li.education__list-item", "li.profile-section-card", "li"])
        .into_iter()
        .map(|li| EducationEntry {
            school: child_text(li, "h3"),
            secondary: child_text(li, "h4"),
            dates: child_text(li, "span.date-range, .education__item--duration"),
            description: child_text(li, ".education__item--details, p"),
        })
        .filter(|e| e.school.is_some())
        .collect()
}

/// Classifies entries into high school and up to two universities. The first entry of
/// each kind wins; `profile:*` tags take precedence over anything in the section.
pub fn extract(doc: &Document, entries: &[EducationEntry]) -> Education {
    let mut from_section = Education::default();
    let mut universities = 0;
    for entry in entries {
        if entry.is_high_school() {
            if from_section.high_school.is_none() {
                from_section.high_school = entry.school.clone();
                from_section.hs_graduation_year = entry.graduation_year();
            }
            continue;
        }
        match universities {
            0 => {
                from_section.university = entry.school.clone();
                from_section.degree = entry.degree();
                from_section.college_major = entry.major();
                from_section.university_grad_year = entry.graduation_year();
            }
            1 => {
                from_section.university2 = entry.school.clone();
                from_section.degree2 = entry.degree();
            }
            _ => {}
        }
        universities += 1;
    }

    let tagged = |key: &'static str| first_match(doc, &[Rule::Meta(key)]);
    Education {
        high_school: tagged("profile:high_school").or(from_section.high_school),
        hs_graduation_year: tagged("profile:hs_graduation_year").or(from_section.hs_graduation_year),
        university: tagged("profile:university").or(from_section.university),
        degree: tagged("profile:degree").or(from_section.degree),
        college_major: tagged("profile:college_major").or(from_section.college_major),
        university_grad_year: tagged("profile:university_graduation_year")
            .or(from_section.university_grad_year),
        university2: from_section.university2,
        degree2: from_section.degree2,
    }
}
