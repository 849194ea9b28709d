//! Mapshaper server client.
//!
//! A mapshaper server exposes `/api/innerpoint`, which accepts a `GeoJSON`
//! `FeatureCollection` and returns the same collection with each polygon
//! replaced by a point guaranteed to fall inside it, plus `mps:latitude` /
//! `mps:longitude` properties. `/api/ping` answers when the server is up.
//!
//! Requests are sent one collection at a time; the shared
//! [`reqwest::Client`] pools connections across concurrent callers.

use std::time::Duration;

use async_trait::async_trait;
use geojson::FeatureCollection;

use crate::{CentroidError, CentroidService};

/// HTTP client for a mapshaper server.
#[derive(Debug, Clone)]
pub struct MapshaperClient {
    client: reqwest::Client,
    base_url: String,
}

impl MapshaperClient {
    /// Creates a client whose requests fail after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`CentroidError::Http`] if the HTTP client can't be built.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, CentroidError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// The server base URL.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Checks that the server is reachable.
    ///
    /// # Errors
    ///
    /// Returns [`CentroidError::Http`] if the request fails or
    /// [`CentroidError::Status`] if the server answers with an error.
    pub async fn ping(&self) -> Result<(), CentroidError> {
        let url = format!("{}/api/ping", self.base_url);
        let resp = self.client.get(&url).send().await?;

        if !resp.status().is_success() {
            return Err(CentroidError::Status {
                status: resp.status().as_u16(),
            });
        }

        Ok(())
    }
}

#[async_trait]
impl CentroidService for MapshaperClient {
    async fn append_centroids(
        &self,
        collection: FeatureCollection,
    ) -> Result<FeatureCollection, CentroidError> {
        let url = format!("{}/api/innerpoint", self.base_url);
        let expected = collection.features.len();

        log::debug!("Requesting centroids for {expected} feature(s) from {url}");

        let resp = self.client.post(&url).json(&collection).send().await?;

        if !resp.status().is_success() {
            return Err(CentroidError::Status {
                status: resp.status().as_u16(),
            });
        }

        let body: serde_json::Value = resp.json().await?;
        parse_response(body, expected)
    }
}

/// Parses an `/api/innerpoint` response, which must echo one feature per
/// input feature.
fn parse_response(
    body: serde_json::Value,
    expected: usize,
) -> Result<FeatureCollection, CentroidError> {
    let collection = FeatureCollection::try_from(body).map_err(|e| CentroidError::Parse {
        message: format!("response is not a FeatureCollection: {e}"),
    })?;

    if collection.features.len() != expected {
        return Err(CentroidError::Parse {
            message: format!(
                "expected {expected} feature(s), got {}",
                collection.features.len()
            ),
        });
    }

    Ok(collection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate_from_feature;

    #[test]
    fn parses_innerpoint_response() {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [-122.3867, 37.6163] },
                "properties": {
                    "wof:id": 1_159_396_131,
                    "mps:latitude": 37.6163,
                    "mps:longitude": -122.3867
                }
            }]
        });
        let collection = parse_response(body, 1).unwrap();
        let c = coordinate_from_feature(&collection.features[0]).unwrap();
        assert!((c.latitude() - 37.6163).abs() < 1e-9);
        assert!((c.longitude() - -122.3867).abs() < 1e-9);
    }

    #[test]
    fn rejects_feature_count_mismatch() {
        let body = serde_json::json!({
            "type": "FeatureCollection",
            "features": []
        });
        assert!(matches!(
            parse_response(body, 1),
            Err(CentroidError::Parse { .. })
        ));
    }

    #[test]
    fn rejects_non_collection() {
        let body = serde_json::json!({ "error": "bad request" });
        assert!(parse_response(body, 1).is_err());
    }

    #[test]
    fn trims_trailing_slash() {
        let client = MapshaperClient::new("http://localhost:8080/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.base_url(), "http://localhost:8080");
    }
}
