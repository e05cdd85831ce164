use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::model::{
    default_academy_locations, default_partner_companies, AcademyLocation, PartnerCompany,
    WeightTable,
};
use crate::parser::{ExtractOptions, InternshipRule};

pub const DEFAULT_CONFIG_FILE: &str = "naf_scout.toml";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub database: PathBuf,
    pub pages_dir: PathBuf,
    pub access: AccessSettings,
    pub extraction: ExtractionSettings,
    pub scoring: ScoringSettings,
    pub geocoder: GeocoderSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            database: PathBuf::from("data/naf_scout.sqlite"),
            pages_dir: PathBuf::from("data/pages"),
            access: AccessSettings::default(),
            extraction: ExtractionSettings::default(),
            scoring: ScoringSettings::default(),
            geocoder: GeocoderSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AccessSettings {
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Upper bound of the random extra added to every pause.
    pub jitter_ms: u64,
    /// Wait after each navigation before the page is inspected.
    pub settle_ms: u64,
    pub between_targets_ms: u64,
    pub neutral_url: String,
    pub default_referrer: String,
    pub cookie_domain: String,
    pub locale_cookie: CookieSetting,
    /// Wall-clock limit per acquisition; 0 disables it.
    pub deadline_secs: u64,
    pub workers: usize,
    pub headless: bool,
    pub chrome_path: Option<PathBuf>,
}

impl Default for AccessSettings {
    fn default() -> Self {
        AccessSettings {
            max_retries: 10,
            retry_delay_ms: 1000,
            jitter_ms: 1000,
            settle_ms: 3000,
            between_targets_ms: 3000,
            neutral_url: "https://www.google.com/".to_string(),
            default_referrer: "https://www.google.com/search?q=site%3Alinkedin.com%2Fin".to_string(),
            cookie_domain: ".linkedin.com".to_string(),
            locale_cookie: CookieSetting {
                name: "lang".to_string(),
                value: "v=2&lang=en-us".to_string(),
            },
            deadline_secs: 180,
            workers: 1,
            headless: true,
            chrome_path: None,
        }
    }
}

impl AccessSettings {
    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0).then(|| Duration::from_secs(self.deadline_secs))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CookieSetting {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExtractionSettings {
    pub internship_rule: InternshipRule,
    pub program_issuers: Vec<String>,
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        let opts = ExtractOptions::default();
        ExtractionSettings {
            internship_rule: opts.internship_rule,
            program_issuers: opts.program_issuers,
        }
    }
}

impl ExtractionSettings {
    pub fn options(&self) -> ExtractOptions {
        ExtractOptions {
            internship_rule: self.internship_rule,
            program_issuers: self.program_issuers.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScoringSettings {
    pub weights: WeightTable,
    pub academy_locations: Vec<AcademyLocation>,
    pub partner_companies: Vec<PartnerCompany>,
}

impl Default for ScoringSettings {
    fn default() -> Self {
        ScoringSettings {
            weights: WeightTable::default(),
            academy_locations: default_academy_locations(),
            partner_companies: default_partner_companies(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeocoderSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub user_agent: String,
    pub min_interval_ms: u64,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        GeocoderSettings {
            enabled: true,
            endpoint: "https://nominatim.openstreetmap.org/search".to_string(),
            user_agent: concat!("naf_scout/", env!("CARGO_PKG_VERSION")).to_string(),
            min_interval_ms: 1100,
        }
    }
}

/// Optional TOML file, overridden by `NAF_*` environment variables
/// (`NAF_ACCESS__MAX_RETRIES=15`).
pub fn load(path: Option<&Path>) -> Result<Settings> {
    let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    let name = file.to_string_lossy();
    config::Config::builder()
        .add_source(config::File::with_name(&name).required(path.is_some()))
        .add_source(environment())
        .build()
        .with_context(|| format!("Failed to read configuration from {}", name))?
        .try_deserialize()
        .context("Invalid configuration")
}

/// `NAF_` prefix, `__` between nested keys.
fn environment() -> config::Environment {
    config::Environment::with_prefix("NAF")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
}
