use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Markup captured for one profile URL. Never mutated after capture.
#[derive(Debug, Clone)]
pub struct RawDocument {
    pub url: String,
    pub final_url: Option<String>,
    pub html: String,
    pub captured_at: DateTime<Utc>,
}

impl RawDocument {
    pub fn new(url: impl Into<String>, html: impl Into<String>) -> Self {
        RawDocument {
            url: url.into(),
            final_url: None,
            html: html.into(),
            captured_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub raw: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
}

impl Location {
    pub fn is_empty(&self) -> bool {
        self.raw.is_none() && self.city.is_none() && self.state.is_none() && self.country.is_none()
    }

    /// Text handed to the geocoder: the raw subline if we have one, else the parts.
    pub fn query_text(&self) -> Option<String> {
        if let Some(raw) = &self.raw {
            return Some(raw.clone());
        }
        let parts: Vec<&str> = [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|p| p.as_deref())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Internship {
    pub company: String,
    pub title: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalSource {
    /// `profile:NAF_*` metadata tags.
    Metadata,
    Certification,
    Organization,
    Issuer,
    /// Found in an education entry rather than a credential; kept apart for audit.
    EducationInferred,
}

impl SignalSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalSource::Metadata => "metadata",
            SignalSource::Certification => "certification",
            SignalSource::Organization => "organization",
            SignalSource::Issuer => "issuer",
            SignalSource::EducationInferred => "education_inferred",
        }
    }
}

/// A program affiliation hit. `label` is always text lifted verbatim from the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffiliationSignal {
    pub label: String,
    pub source: SignalSource,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CanonicalProfile {
    pub profile_id: Option<String>,
    pub profile_url: Option<String>,
    pub full_name: Option<String>,
    pub headline: Option<String>,
    pub location: Location,
    pub address: Option<String>,
    pub zip_code: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub birthdate: Option<String>,
    pub military_branch: Option<String>,
    pub school_district: Option<String>,
    pub high_school: Option<String>,
    pub hs_graduation_year: Option<String>,
    pub university: Option<String>,
    pub degree: Option<String>,
    pub college_major: Option<String>,
    pub university_grad_year: Option<String>,
    pub university2: Option<String>,
    pub degree2: Option<String>,
    pub academy: Option<AffiliationSignal>,
    pub track_certification: Option<AffiliationSignal>,
    pub current_job: Option<String>,
    pub current_employer: Option<String>,
    pub internships: Vec<Internship>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const UNRESOLVED: Coordinates = Coordinates { lat: 0.0, lon: 0.0 };

    pub fn is_unresolved(&self) -> bool {
        self.lat == 0.0 && self.lon == 0.0
    }
}

impl Default for Coordinates {
    fn default() -> Self {
        Coordinates::UNRESOLVED
    }
}

/// The slice of a profile the scorer looks at, plus resolved coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringCriteria {
    pub academy: Option<String>,
    pub track_certified: bool,
    pub high_school: Option<String>,
    pub internships: Vec<String>,
    pub current_job: Option<String>,
    pub location: Coordinates,
}

impl ScoringCriteria {
    pub fn from_profile(profile: &CanonicalProfile, location: Coordinates) -> Self {
        ScoringCriteria {
            academy: profile.academy.as_ref().map(|s| s.label.clone()),
            track_certified: profile.track_certification.is_some(),
            high_school: profile.high_school.clone(),
            internships: profile.internships.iter().map(|i| i.company.clone()).collect(),
            current_job: profile
                .current_employer
                .clone()
                .or_else(|| profile.current_job.clone()),
            location,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcademyLocation {
    pub city: String,
    pub state: String,
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartnerCompany {
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightTable {
    pub high_school: f64,
    pub internship: f64,
    pub current_job: f64,
    pub proximity_near: f64,
    pub proximity_far: f64,
}

impl Default for WeightTable {
    fn default() -> Self {
        WeightTable {
            high_school: 0.25,
            internship: 0.20,
            current_job: 0.15,
            proximity_near: 0.10,
            proximity_far: 0.05,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub is_definite_alumni: bool,
    pub academy_match: bool,
    pub track_certified: bool,
    pub high_school_score: f64,
    pub internship_score: f64,
    pub current_job_score: f64,
    pub proximity_score: f64,
    pub nearest_academy_km: Option<f64>,
    /// Sum of the factor scores before clipping.
    pub raw_total: f64,
    pub confidence: f64,
}

pub fn default_academy_locations() -> Vec<AcademyLocation> {
    [
        ("Atmore", "AL", 31.025837, -87.506462),
        ("Glendale", "AZ", 33.548264, -112.191696),
        ("Los Angeles", "CA", 34.052235, -118.243683),
        ("Miami", "FL", 25.761681, -80.191788),
    ]
    .into_iter()
    .map(|(city, state, lat, lon)| AcademyLocation {
        city: city.to_string(),
        state: state.to_string(),
        lat,
        lon,
    })
    .collect()
}

pub fn default_partner_companies() -> Vec<PartnerCompany> {
    ["Canva", "HOSA", "Verizon"]
        .into_iter()
        .map(|name| PartnerCompany { name: name.to_string() })
        .collect()
}
