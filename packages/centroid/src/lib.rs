#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Centroid computation for polygon records.
//!
//! Area-weighted centroids of arbitrary polygons are delegated to an
//! external service behind the [`CentroidService`] trait. The
//! [`mapshaper`] module provides an HTTP client for a mapshaper server.
//!
//! Responses may carry explicit `mps:latitude` / `mps:longitude`
//! properties; when both are present they win over the returned geometry
//! (see [`coordinate_from_feature`]).

pub mod mapshaper;

use async_trait::async_trait;
use geojson::{Feature, FeatureCollection};
use pip_models::{Coordinate, RecordError};
use thiserror::Error;

/// Latitude override property set by the centroid service.
pub const LATITUDE_PROPERTY: &str = "mps:latitude";

/// Longitude override property set by the centroid service.
pub const LONGITUDE_PROPERTY: &str = "mps:longitude";

/// Errors from centroid computation.
#[derive(Debug, Error)]
pub enum CentroidError {
    /// HTTP request failed (including timeouts).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("Centroid service returned status {status}")]
    Status {
        /// HTTP status code.
        status: u16,
    },

    /// Response parsing failed.
    #[error("Parse error: {message}")]
    Parse {
        /// Description of the parsing failure.
        message: String,
    },

    /// The centroid lies outside the valid coordinate range.
    #[error("Invalid centroid: {0}")]
    InvalidCoordinate(#[from] RecordError),
}

/// Appends centroids to the features of a collection.
#[async_trait]
pub trait CentroidService: Send + Sync {
    /// Returns the collection with each feature's geometry replaced by (or
    /// annotated with) its centroid.
    async fn append_centroids(
        &self,
        collection: FeatureCollection,
    ) -> Result<FeatureCollection, CentroidError>;
}

/// Extracts the centroid from a feature returned by a [`CentroidService`].
///
/// Both override properties must be numbers to be used; otherwise the
/// feature geometry must be a `Point`.
///
/// # Errors
///
/// Returns [`CentroidError::Parse`] if neither the overrides nor a point
/// geometry are available, or [`CentroidError::InvalidCoordinate`] if the
/// position is out of range.
pub fn coordinate_from_feature(feature: &Feature) -> Result<Coordinate, CentroidError> {
    let latitude = feature
        .property(LATITUDE_PROPERTY)
        .and_then(serde_json::Value::as_f64);
    let longitude = feature
        .property(LONGITUDE_PROPERTY)
        .and_then(serde_json::Value::as_f64);

    if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
        return Ok(Coordinate::new(longitude, latitude)?);
    }

    let geometry = feature.geometry.as_ref().ok_or_else(|| CentroidError::Parse {
        message: "centroid feature has no geometry".to_string(),
    })?;

    match &geometry.value {
        geojson::Value::Point(position) if position.len() >= 2 => {
            Ok(Coordinate::new(position[0], position[1])?)
        }
        _ => Err(CentroidError::Parse {
            message: "centroid feature geometry is not a point".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(body: serde_json::Value) -> Feature {
        Feature::try_from(body).unwrap()
    }

    #[test]
    fn uses_point_geometry() {
        let f = feature(serde_json::json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [-122.38, 37.61] },
            "properties": {}
        }));
        let c = coordinate_from_feature(&f).unwrap();
        assert!((c.longitude() - -122.38).abs() < 1e-9);
        assert!((c.latitude() - 37.61).abs() < 1e-9);
    }

    #[test]
    fn overrides_take_precedence() {
        let f = feature(serde_json::json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
            "properties": { "mps:latitude": 37.5, "mps:longitude": -122.5 }
        }));
        let c = coordinate_from_feature(&f).unwrap();
        assert!((c.longitude() - -122.5).abs() < 1e-9);
        assert!((c.latitude() - 37.5).abs() < 1e-9);
    }

    #[test]
    fn a_single_override_is_ignored() {
        let f = feature(serde_json::json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [1.0, 2.0] },
            "properties": { "mps:latitude": 37.5 }
        }));
        let c = coordinate_from_feature(&f).unwrap();
        assert!((c.latitude() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn non_point_geometry_is_malformed() {
        let f = feature(serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 0.0]]]
            },
            "properties": {}
        }));
        assert!(matches!(
            coordinate_from_feature(&f),
            Err(CentroidError::Parse { .. })
        ));
    }
}
