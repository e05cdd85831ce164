use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::config::GeocoderSettings;
use crate::model::Coordinates;

/// Turns free-text locations into coordinates. `Ok(None)` means "no usable result".
#[async_trait]
pub trait Geocoder: Send + Sync {
    async fn geocode(&self, text: &str) -> Result<Option<Coordinates>>;
}

/// Geocode `text`, collapsing every failure mode into the (0,0) sentinel.
pub async fn resolve(geocoder: &dyn Geocoder, text: Option<&str>) -> Coordinates {
    let Some(text) = text.map(str::trim).filter(|t| !t.is_empty()) else {
        return Coordinates::UNRESOLVED;
    };
    match geocoder.geocode(text).await {
        Ok(Some(coords)) => coords,
        Ok(None) => {
            debug!("No US geocode result for {:?}", text);
            Coordinates::UNRESOLVED
        }
        Err(e) => {
            warn!("Geocoding failed for {:?}: {:#}", text, e);
            Coordinates::UNRESOLVED
        }
    }
}

/// Used when geocoding is switched off in configuration.
pub struct NoGeocoder;

#[async_trait]
impl Geocoder for NoGeocoder {
    async fn geocode(&self, _text: &str) -> Result<Option<Coordinates>> {
        Ok(None)
    }
}

#[derive(Debug, Deserialize)]
struct Place {
    lat: String,
    lon: String,
    #[serde(default)]
    address: Option<PlaceAddress>,
}

#[derive(Debug, Deserialize)]
struct PlaceAddress {
    #[serde(default)]
    country: Option<String>,
    #[serde(default)]
    country_code: Option<String>,
}

/// OpenStreetMap Nominatim search client.
pub struct NominatimGeocoder {
    client: reqwest::Client,
    endpoint: String,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl NominatimGeocoder {
    pub fn new(settings: &GeocoderSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(Duration::from_secs(20))
            .build()
            .context("Failed to build geocoder HTTP client")?;
        Ok(NominatimGeocoder {
            client,
            endpoint: settings.endpoint.clone(),
            min_interval: Duration::from_millis(settings.min_interval_ms),
            last_request: Mutex::new(None),
        })
    }

    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                tokio::time::sleep(self.min_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

#[async_trait]
impl Geocoder for NominatimGeocoder {
    async fn geocode(&self, text: &str) -> Result<Option<Coordinates>> {
        self.throttle().await;
        let places: Vec<Place> = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", text),
                ("format", "jsonv2"),
                ("addressdetails", "1"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .context("Unexpected geocoder response")?;
        Ok(first_us_place(&places))
    }
}

/// First result only; anything outside the United States is rejected.
fn first_us_place(places: &[Place]) -> Option<Coordinates> {
    let place = places.first()?;
    if let Some(addr) = &place.address {
        let is_us = match (&addr.country_code, &addr.country) {
            (Some(code), _) => code.eq_ignore_ascii_case("us"),
            (None, Some(country)) => country.to_lowercase().contains("united states"),
            (None, None) => true,
        };
        if !is_us {
            return None;
        }
    }
    let lat = place.lat.parse::<f64>().ok()?;
    let lon = place.lon.parse::<f64>().ok()?;
    Some(Coordinates { lat, lon })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn places(json: &str) -> Vec<Place> {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn us_result_accepted() {
        let p = places(r#"[{"lat":"30.2711","lon":"-97.7437","address":{"country":"United States","country_code":"us"}}]"#);
        let c = first_us_place(&p).unwrap();
        assert!((c.lat - 30.2711).abs() < 1e-9);
        assert!((c.lon + 97.7437).abs() < 1e-9);
    }

    #[test]
    fn foreign_result_rejected() {
        let p = places(r#"[{"lat":"51.5","lon":"-0.12","address":{"country":"United Kingdom","country_code":"gb"}}]"#);
        assert!(first_us_place(&p).is_none());
    }

    #[test]
    fn empty_or_garbled_result_rejected() {
        assert!(first_us_place(&[]).is_none());
        let p = places(r#"[{"lat":"north","lon":"-0.12"}]"#);
        assert!(first_us_place(&p).is_none());
    }

    struct Failing;

    #[async_trait]
    impl Geocoder for Failing {
        async fn geocode(&self, _text: &str) -> Result<Option<Coordinates>> {
            anyhow::bail!("provider down")
        }
    }

    #[tokio::test]
    async fn failures_become_sentinel() {
        assert_eq!(resolve(&Failing, Some("Austin, TX")).await, Coordinates::UNRESOLVED);
        assert_eq!(resolve(&NoGeocoder, Some("Austin, TX")).await, Coordinates::UNRESOLVED);
        assert_eq!(resolve(&Failing, Some("   ")).await, Coordinates::UNRESOLVED);
        assert_eq!(resolve(&Failing, None).await, Coordinates::UNRESOLVED);
    }
}
