pub mod chain;
pub mod document;
pub mod extract;

pub use extract::experience::InternshipRule;

use crate::error::ExtractError;
use crate::model::{CanonicalProfile, Location, RawDocument};
use document::Document;
use extract::{affiliation, education, experience, identity};

const PROFILE_BASE: &str = "https://www.linkedin.com/in/";

#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub internship_rule: InternshipRule,
    /// Issuer names accepted as confirming a program credential, compared exactly.
    pub program_issuers: Vec<String>,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        ExtractOptions {
            internship_rule: InternshipRule::Intern,
            program_issuers: vec![
                "NAF".to_string(),
                "NAF Academy".to_string(),
                "National Academy Foundation".to_string(),
            ],
        }
    }
}

/// Best-effort extraction. Every field is independent; anything missing is `None`.
pub fn extract(raw: &RawDocument, opts: &ExtractOptions) -> CanonicalProfile {
    let doc = Document::parse(&raw.html);
    extract_document(&doc, source_url(raw), opts)
}

/// Like [`extract`], but rejects documents with no usable structure.
pub fn extract_checked(
    raw: &RawDocument,
    opts: &ExtractOptions,
) -> Result<CanonicalProfile, ExtractError> {
    let malformed = |reason| ExtractError::Malformed {
        url: raw.url.clone(),
        reason,
    };
    if raw.html.trim().is_empty() {
        return Err(malformed("empty document"));
    }
    let doc = Document::parse(&raw.html);
    if doc.is_blank() {
        return Err(malformed("no markup content"));
    }
    let profile = extract_document(&doc, source_url(raw), opts);
    if profile.profile_id.is_none() {
        return Err(malformed("no profile id"));
    }
    Ok(profile)
}

fn source_url(raw: &RawDocument) -> &str {
    raw.final_url.as_deref().unwrap_or(&raw.url)
}

fn extract_document(doc: &Document, url: &str, opts: &ExtractOptions) -> CanonicalProfile {
    let declared = identity::declared_url(doc);
    let profile_id = declared
        .as_deref()
        .and_then(profile_id)
        .or_else(|| profile_id(url));
    let profile_url = profile_id
        .as_deref()
        .map(profile_url_for)
        .or(declared);

    let edu_entries = education::entries(doc);
    let edu = education::extract(doc, &edu_entries);
    let signals = affiliation::extract(doc, &edu_entries, &opts.program_issuers);

    CanonicalProfile {
        profile_id,
        profile_url,
        full_name: identity::full_name(doc),
        headline: identity::headline(doc),
        location: identity::location(doc),
        address: identity::street_address(doc),
        zip_code: identity::zip_code(doc),
        email: identity::email(doc),
        phone: identity::phone(doc),
        birthdate: identity::birthdate(doc),
        military_branch: identity::military_branch(doc),
        school_district: identity::school_district(doc),
        high_school: edu.high_school,
        hs_graduation_year: edu.hs_graduation_year,
        university: edu.university,
        degree: edu.degree,
        college_major: edu.college_major,
        university_grad_year: edu.university_grad_year,
        university2: edu.university2,
        degree2: edu.degree2,
        academy: signals.academy,
        track_certification: signals.track,
        current_job: identity::current_job(doc),
        current_employer: experience::current_employer(doc),
        internships: experience::internships(doc, opts.internship_rule),
    }
}

/// Path segment after `/in/`, cut at the next `/`, `?` or `#`.
pub fn profile_id(url: &str) -> Option<String> {
    let (_, rest) = url.split_once("/in/")?;
    let id = rest.split(['/', '?', '#']).next().unwrap_or(rest).trim();
    (!id.is_empty()).then(|| id.to_string())
}

/// `https://www.linkedin.com/in/<id>` for any profile URL variant.
pub fn canonical_profile_url(url: &str) -> Option<String> {
    profile_id(url).map(|id| profile_url_for(&id))
}

pub fn profile_url_for(id: &str) -> String {
    format!("{PROFILE_BASE}{id}")
}

/// "city, state[, country]" split positionally; no comma means city only.
pub fn decompose_location(text: &str) -> Location {
    let raw = text.trim();
    if raw.is_empty() {
        return Location::default();
    }
    let mut parts = raw
        .split(',')
        .map(str::trim)
        .map(|p| (!p.is_empty()).then(|| p.to_string()));
    Location {
        raw: Some(raw.to_string()),
        city: parts.next().flatten(),
        state: parts.next().flatten(),
        country: parts.next().flatten(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SignalSource;

    fn fixture(name: &str) -> RawDocument {
        let html = std::fs::read_to_string(format!("tests/fixtures/{}.html", name)).unwrap();
        RawDocument::new("https://www.linkedin.com/in/maria-lopez-4b2a1?trk=public_profile", html)
    }

    #[test]
    fn profile_id_rules() {
        assert_eq!(profile_id("https://www.linkedin.com/in/jdoe/").as_deref(), Some("jdoe"));
        assert_eq!(profile_id("https://linkedin.com/in/jdoe?trk=x").as_deref(), Some("jdoe"));
        assert_eq!(profile_id("https://uk.linkedin.com/in/jdoe/details/skills").as_deref(), Some("jdoe"));
        assert_eq!(profile_id("https://www.linkedin.com/company/acme"), None);
        assert_eq!(profile_id("https://www.linkedin.com/in/"), None);
        assert_eq!(
            canonical_profile_url("https://uk.linkedin.com/in/jdoe?x=1").as_deref(),
            Some("https://www.linkedin.com/in/jdoe")
        );
    }

    #[test]
    fn decompose_positions() {
        let loc = decompose_location("Austin, TX");
        assert_eq!(loc.city.as_deref(), Some("Austin"));
        assert_eq!(loc.state.as_deref(), Some("TX"));
        assert_eq!(loc.country, None);

        let loc = decompose_location("Miami, Florida, United States");
        assert_eq!(loc.country.as_deref(), Some("United States"));

        let loc = decompose_location("Greater Chicago Area");
        assert_eq!(loc.city.as_deref(), Some("Greater Chicago Area"));
        assert_eq!(loc.state, None);

        assert!(decompose_location("  ").is_empty());
    }

    #[test]
    fn public_profile_fixture() {
        let p = extract(&fixture("profile_public"), &ExtractOptions::default());
        assert_eq!(p.profile_id.as_deref(), Some("maria-lopez-4b2a1"));
        assert_eq!(p.profile_url.as_deref(), Some("https://www.linkedin.com/in/maria-lopez-4b2a1"));
        // Tagged name wins over the visible heading.
        assert_eq!(p.full_name.as_deref(), Some("Maria Lopez"));
        assert_eq!(p.headline.as_deref(), Some("Maria Lopez - Financial Analyst - Verizon"));
        assert_eq!(p.location.city.as_deref(), Some("Miami"));
        assert_eq!(p.location.state.as_deref(), Some("Florida"));
        assert_eq!(p.location.country.as_deref(), Some("United States"));
        assert_eq!(p.zip_code.as_deref(), Some("33125"));
        assert_eq!(p.address.as_deref(), Some("100 Main St"));
        assert_eq!(p.email.as_deref(), Some("maria.lopez@example.com"));
        assert_eq!(p.high_school.as_deref(), Some("Miami Senior High School"));
        assert_eq!(p.hs_graduation_year.as_deref(), Some("2015"));
        assert_eq!(p.university.as_deref(), Some("Florida International University"));
        assert_eq!(p.degree.as_deref(), Some("Bachelor of Business Administration"));
        assert_eq!(p.college_major.as_deref(), Some("Finance"));
        assert_eq!(p.university_grad_year.as_deref(), Some("2019"));
        assert_eq!(p.current_job.as_deref(), Some("Financial Analyst at Verizon"));
        assert_eq!(p.current_employer.as_deref(), Some("Verizon"));
        assert_eq!(p.internships.len(), 1);
        assert_eq!(p.internships[0].company, "Canva");
        assert_eq!(p.internships[0].end_date.as_deref(), Some("Aug 2018"));

        let track = p.track_certification.unwrap();
        assert_eq!(track.label, "NAFTrack Certified");
        assert_eq!(track.source, SignalSource::Certification);
        assert!(p.academy.is_none());
    }

    #[test]
    fn analyst_rule_changes_internships() {
        let opts = ExtractOptions {
            internship_rule: InternshipRule::InternOrAnalyst,
            ..Default::default()
        };
        let p = extract(&fixture("profile_public"), &opts);
        let companies: Vec<&str> = p.internships.iter().map(|i| i.company.as_str()).collect();
        assert_eq!(companies, vec!["Verizon", "Canva"]);
    }

    #[test]
    fn minimal_profile_degrades() {
        let p = extract(&fixture("profile_minimal"), &ExtractOptions::default());
        assert_eq!(p.full_name.as_deref(), Some("Jordan Smith"));
        assert_eq!(p.profile_id.as_deref(), Some("maria-lopez-4b2a1"));
        assert!(p.headline.is_none());
        assert!(p.high_school.is_none());
        assert!(p.internships.is_empty());
        assert!(p.academy.is_none() && p.track_certification.is_none());
        assert_eq!(p.location.city.as_deref(), Some("Glendale"));
        assert_eq!(p.location.state.as_deref(), Some("AZ"));
    }

    #[test]
    fn checked_rejects_structureless_input() {
        let opts = ExtractOptions::default();
        let empty = RawDocument::new("https://www.linkedin.com/in/x", "   ");
        assert!(matches!(extract_checked(&empty, &opts), Err(ExtractError::Malformed { .. })));

        let blank = RawDocument::new("https://www.linkedin.com/in/x", "<html><body></body></html>");
        assert!(extract_checked(&blank, &opts).is_err());

        let no_id = RawDocument::new("https://example.com/people/x", "<h1>Someone</h1>");
        assert!(extract_checked(&no_id, &opts).is_err());

        let ok = RawDocument::new("https://www.linkedin.com/in/x", "<h1>Someone</h1>");
        let p = extract_checked(&ok, &opts).unwrap();
        assert_eq!(p.full_name.as_deref(), Some("Someone"));
    }
}
