use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::address::{normalize_address, shorten_address};
use crate::errors::AppResult;
use crate::model::Coordinates;

/// Result of resolving one address. Failures of any kind collapse to `NotFound`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeocodeOutcome {
    Found(Coordinates),
    NotFound,
}

impl GeocodeOutcome {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match self {
            GeocodeOutcome::Found(coords) => Some(*coords),
            GeocodeOutcome::NotFound => None,
        }
    }
}

#[async_trait]
pub trait AddressLookup: Send + Sync {
    /// Candidate coordinates for `query`, best match first.
    async fn search(&self, query: &str) -> AppResult<Vec<Coordinates>>;
}

#[derive(Clone)]
pub struct Geocoder {
    inner: Arc<dyn AddressLookup>,
}

impl Geocoder {
    pub fn new(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(GsiAddressClient::new(http, endpoint)),
        }
    }

    pub fn from_lookup(lookup: Arc<dyn AddressLookup>) -> Self {
        Self { inner: lookup }
    }

    pub async fn geocode(&self, address: &str) -> GeocodeOutcome {
        match self.resolve(address).await {
            Ok(Some(coords)) => GeocodeOutcome::Found(coords),
            Ok(None) => GeocodeOutcome::NotFound,
            Err(err) => {
                warn!(?err, address, "geocode lookup failed");
                GeocodeOutcome::NotFound
            }
        }
    }

    async fn resolve(&self, address: &str) -> AppResult<Option<Coordinates>> {
        let normalized = normalize_address(address);
        if normalized.is_empty() {
            return Ok(None);
        }

        if let Some(coords) = self.inner.search(&normalized).await?.into_iter().next() {
            return Ok(Some(coords));
        }

        let shorter = shorten_address(&normalized);
        if shorter == normalized {
            return Ok(None);
        }
        debug!(address, retry = %shorter, "no match; retrying with municipality");
        Ok(self.inner.search(&shorter).await?.into_iter().next())
    }
}

/// Client for the GSI address search endpoint.
struct GsiAddressClient {
    http: Client,
    endpoint: String,
}

impl GsiAddressClient {
    fn new(http: Client, endpoint: impl Into<String>) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl AddressLookup for GsiAddressClient {
    async fn search(&self, query: &str) -> AppResult<Vec<Coordinates>> {
        #[derive(Deserialize)]
        struct Feature {
            geometry: Geometry,
        }

        #[derive(Deserialize)]
        struct Geometry {
            // GeoJSON order: [lng, lat]
            coordinates: Vec<f64>,
        }

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?;

        let features: Option<Vec<Feature>> = response.json().await?;
        Ok(features
            .unwrap_or_default()
            .into_iter()
            .filter_map(|feature| match feature.geometry.coordinates.as_slice() {
                [lng, lat, ..] => Some(Coordinates {
                    lat: *lat,
                    lng: *lng,
                }),
                _ => None,
            })
            .collect())
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedLookup;
    use super::*;

    #[tokio::test]
    async fn takes_first_result_for_normalized_query() {
        let lookup = Arc::new(
            ScriptedLookup::default()
                .answer("東京都千代田区1-2-3", 35.69, 139.75)
                .answer("東京都千代田区1-2-3", 10.0, 10.0),
        );
        let geocoder = Geocoder::from_lookup(lookup.clone());

        let outcome = geocoder.geocode("東京都千代田区１丁目２番３号").await;
        assert_eq!(
            outcome,
            GeocodeOutcome::Found(Coordinates {
                lat: 35.69,
                lng: 139.75
            })
        );
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn retries_with_shortened_address() {
        let lookup = Arc::new(ScriptedLookup::default().answer("東京都千代田区", 35.694, 139.753));
        let geocoder = Geocoder::from_lookup(lookup.clone());

        let outcome = geocoder.geocode("東京都千代田区１−２−３").await;
        assert_eq!(
            outcome.coordinates(),
            Some(Coordinates {
                lat: 35.694,
                lng: 139.753
            })
        );
        assert_eq!(
            *lookup.queries.lock(),
            vec!["東京都千代田区1-2-3".to_string(), "東京都千代田区".to_string()]
        );
    }

    #[tokio::test]
    async fn skips_retry_when_address_cannot_be_shortened() {
        let lookup = Arc::new(ScriptedLookup::default());
        let geocoder = Geocoder::from_lookup(lookup.clone());

        assert_eq!(geocoder.geocode("千代田区1-2-3").await, GeocodeOutcome::NotFound);
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn swallows_lookup_errors() {
        let lookup = Arc::new(
            ScriptedLookup::default()
                .fail_on("大阪府大阪市北区1")
                .answer("大阪府大阪市", 34.69, 135.5),
        );
        let geocoder = Geocoder::from_lookup(lookup.clone());

        assert_eq!(geocoder.geocode("大阪府大阪市北区１").await, GeocodeOutcome::NotFound);
        assert_eq!(lookup.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_address_never_queries() {
        let lookup = Arc::new(ScriptedLookup::default());
        let geocoder = Geocoder::from_lookup(lookup.clone());
        assert_eq!(geocoder.geocode("　 ").await, GeocodeOutcome::NotFound);
        assert_eq!(lookup.call_count(), 0);
    }
}
