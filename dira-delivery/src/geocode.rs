use async_trait::async_trait;
use dira_core::config::GeocodingConfig;
use serde::Deserialize;
use std::sync::Arc;
use tracing;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Forward geocoding of a street address. Lookups are best-effort: any
/// failure yields `None` and the caller proceeds without coordinates.
#[async_trait]
pub trait Geocode: Send + Sync {
    async fn geocode(&self, street: &str, building_number: Option<&str>) -> Option<Coordinates>;
}

#[derive(Debug, Deserialize)]
struct NominatimHit {
    lat: String,
    lon: String,
}

/// Nominatim-backed geocoder. The search is pinned to the configured city
/// so a street name alone resolves to the right place.
pub struct Geocoder {
    client: Arc<reqwest::Client>,
    base_url: String,
    city: String,
}

impl Geocoder {
    pub fn new(config: &GeocodingConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("dira-geocoder")
            .build()?;

        Ok(Self {
            client: Arc::new(client),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            city: config.city.clone(),
        })
    }

    async fn lookup(&self, street: &str, building_number: Option<&str>) -> anyhow::Result<Option<Coordinates>> {
        let street_query = match building_number {
            Some(n) if !n.trim().is_empty() => format!("{} {}", n.trim(), street.trim()),
            _ => street.trim().to_string(),
        };

        let url = format!("{}/search", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("street", street_query.as_str()),
                ("city", self.city.as_str()),
                ("country", "Israel"),
                ("format", "json"),
                ("limit", "1"),
            ])
            .send()
            .await?
            .error_for_status()?;

        let hits: Vec<NominatimHit> = response.json().await?;
        let hit = match hits.into_iter().next() {
            Some(hit) => hit,
            None => return Ok(None),
        };

        let lat = hit.lat.parse::<f64>()?;
        let lon = hit.lon.parse::<f64>()?;
        Ok(Some(Coordinates { lat, lon }))
    }
}

#[async_trait]
impl Geocode for Geocoder {
    async fn geocode(&self, street: &str, building_number: Option<&str>) -> Option<Coordinates> {
        if street.trim().is_empty() {
            return None;
        }

        match self.lookup(street, building_number).await {
            Ok(Some(coords)) => Some(coords),
            Ok(None) => {
                tracing::debug!(street, "No geocoding result");
                None
            }
            Err(e) => {
                tracing::warn!(street, "Geocoding failed: {}", e);
                None
            }
        }
    }
}
