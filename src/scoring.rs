use crate::geo::distance::{distance_km, miles_to_km};
use crate::model::{AcademyLocation, PartnerCompany, ScoreBreakdown, ScoringCriteria, WeightTable};

const NEAR_MILES: f64 = 50.0;
const FAR_MILES: f64 = 100.0;

/// Reference data and weights bundled for repeated scoring calls.
pub struct ConfidenceScorer<'a> {
    pub weights: WeightTable,
    pub academies: &'a [AcademyLocation],
    pub partners: &'a [PartnerCompany],
}

impl<'a> ConfidenceScorer<'a> {
    pub fn new(
        weights: WeightTable,
        academies: &'a [AcademyLocation],
        partners: &'a [PartnerCompany],
    ) -> Self {
        ConfidenceScorer {
            weights,
            academies,
            partners,
        }
    }

    pub fn score(&self, criteria: &ScoringCriteria) -> ScoreBreakdown {
        score(criteria, &self.weights, self.academies, self.partners)
    }
}

/// Weighted confidence that `criteria` describes a program alumnus.
///
/// A direct academy or track-certification signal short-circuits to 1.0. Otherwise
/// the high-school, internship, current-job and proximity factors are summed and the
/// total clipped to 1.0; the breakdown keeps the unclipped per-factor values.
pub fn score(
    criteria: &ScoringCriteria,
    weights: &WeightTable,
    academies: &[AcademyLocation],
    partners: &[PartnerCompany],
) -> ScoreBreakdown {
    let academy_match = criteria.academy.is_some();
    if academy_match || criteria.track_certified {
        return ScoreBreakdown {
            is_definite_alumni: true,
            academy_match,
            track_certified: criteria.track_certified,
            high_school_score: 0.0,
            internship_score: 0.0,
            current_job_score: 0.0,
            proximity_score: 0.0,
            nearest_academy_km: None,
            raw_total: 1.0,
            confidence: 1.0,
        };
    }

    let high_school_score = if criteria.high_school.as_deref().is_some_and(|s| !s.is_empty()) {
        weights.high_school
    } else {
        0.0
    };

    let internship_score = if criteria
        .internships
        .iter()
        .any(|company| is_partner(partners, company))
    {
        weights.internship
    } else {
        0.0
    };

    let current_job_score = match criteria.current_job.as_deref() {
        Some(job) if is_partner(partners, job) => weights.current_job,
        _ => 0.0,
    };

    let nearest_academy_km = nearest_academy_km(criteria, academies);
    let proximity_score = match nearest_academy_km {
        Some(d) if d <= miles_to_km(NEAR_MILES) => weights.proximity_near,
        Some(d) if d <= miles_to_km(FAR_MILES) => weights.proximity_far,
        _ => 0.0,
    };

    let raw_total = high_school_score + internship_score + current_job_score + proximity_score;

    ScoreBreakdown {
        is_definite_alumni: false,
        academy_match: false,
        track_certified: false,
        high_school_score,
        internship_score,
        current_job_score,
        proximity_score,
        nearest_academy_km,
        raw_total,
        confidence: raw_total.clamp(0.0, 1.0),
    }
}

/// Exact, case-sensitive name comparison.
fn is_partner(partners: &[PartnerCompany], name: &str) -> bool {
    partners.iter().any(|p| p.name == name)
}

fn nearest_academy_km(criteria: &ScoringCriteria, academies: &[AcademyLocation]) -> Option<f64> {
    let here = criteria.location;
    if here.is_unresolved() {
        return None;
    }
    academies
        .iter()
        .map(|a| distance_km(here.lat, here.lon, a.lat, a.lon))
        .filter(|d| !d.is_nan())
        .min_by(|a, b| a.total_cmp(b))
}
