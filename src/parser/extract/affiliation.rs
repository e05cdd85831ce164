use crate::model::{AffiliationSignal, SignalSource};
use crate::parser::document::{child_text, element_text, items, Document};

use super::education::EducationEntry;
use super::find_verbatim;

const ACADEMY_MARKER: &str = "academy of finance";
const TRACK_MARKERS: &[&str] = &["naftrack", "naf track"];

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Affiliations {
    pub academy: Option<AffiliationSignal>,
    pub track: Option<AffiliationSignal>,
}

impl Affiliations {
    fn is_empty(&self) -> bool {
        self.academy.is_none() && self.track.is_none()
    }
}

#[derive(Debug, Clone)]
struct Credential {
    name: String,
    issuer: Option<String>,
    source: SignalSource,
}

fn credentials(doc: &Document) -> Vec<Credential> {
    let sections = [
        (
            doc.section("certifications", &["Licenses & Certifications", "Certifications"]),
            SignalSource::Certification,
        ),
        (
            doc.section("organizations", &["Organizations"]),
            SignalSource::Organization,
        ),
    ];
    sections
        .into_iter()
        .filter_map(|(section, source)| section.map(|s| (s, source)))
        .flat_map(|(section, source)| {
            items(section, &["li"]).into_iter().filter_map(move |li| {
                let name = child_text(li, "h3").unwrap_or_else(|| element_text(li));
                if name.is_empty() {
                    return None;
                }
                Some(Credential {
                    name,
                    issuer: child_text(li, "h4"),
                    source,
                })
            })
        })
        .collect()
}

/// Program affiliation signals, strongest evidence first: the `profile:NAF_*` tags,
/// then credential names, then an exact issuer match, then education entries.
/// A tag only decides its own field; the other one still goes through the scan.
pub fn extract(doc: &Document, education: &[EducationEntry], issuers: &[String]) -> Affiliations {
    let scanned = scan(doc, education, issuers);
    Affiliations {
        academy: tag_signal(doc, "profile:NAF_academy").or(scanned.academy),
        track: tag_signal(doc, "profile:NAF_certified").or(scanned.track),
    }
}

// Tag content is kept as the label; an explicit "false" is no signal.
fn tag_signal(doc: &Document, key: &str) -> Option<AffiliationSignal> {
    let content = doc.meta(key)?;
    if content.eq_ignore_ascii_case("false") {
        return None;
    }
    Some(AffiliationSignal {
        label: content,
        source: SignalSource::Metadata,
    })
}

fn scan(doc: &Document, education: &[EducationEntry], issuers: &[String]) -> Affiliations {
    let creds = credentials(doc);
    let mut found = Affiliations::default();

    for cred in &creds {
        let lower = cred.name.to_lowercase();
        if found.academy.is_none() && lower.contains(ACADEMY_MARKER) {
            found.academy = Some(AffiliationSignal {
                label: cred.name.clone(),
                source: cred.source,
            });
        }
        if found.track.is_none() && TRACK_MARKERS.iter().any(|m| lower.contains(m)) {
            found.track = Some(AffiliationSignal {
                label: cred.name.clone(),
                source: cred.source,
            });
        }
    }
    if !found.is_empty() {
        return found;
    }

    if let Some(cred) = creds.iter().find(|c| {
        c.issuer
            .as_deref()
            .is_some_and(|issuer| issuers.iter().any(|known| known == issuer))
    }) {
        found.track = Some(AffiliationSignal {
            label: cred.name.clone(),
            source: SignalSource::Issuer,
        });
        return found;
    }

    found.academy = education.iter().find_map(inferred_academy);
    found
}

fn inferred_academy(entry: &EducationEntry) -> Option<AffiliationSignal> {
    // A school named after the academy keeps its full name as the label.
    let label = match entry.school.as_deref() {
        Some(school) if find_verbatim(school, ACADEMY_MARKER).is_some() => school,
        _ => find_verbatim(entry.description.as_deref()?, ACADEMY_MARKER)?,
    };
    Some(AffiliationSignal {
        label: label.to_string(),
        source: SignalSource::EducationInferred,
    })
}
