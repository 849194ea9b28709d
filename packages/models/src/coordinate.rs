//! Validated longitude/latitude pairs.

use serde::{Deserialize, Serialize};

use crate::RecordError;

/// A WGS84 position used for point-in-polygon queries.
///
/// Deserializing goes through [`Coordinate::new`], so out-of-range input is
/// rejected there too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinate")]
pub struct Coordinate {
    longitude: f64,
    latitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinate {
    longitude: f64,
    latitude: f64,
}

impl TryFrom<RawCoordinate> for Coordinate {
    type Error = RecordError;

    fn try_from(raw: RawCoordinate) -> Result<Self, Self::Error> {
        Self::new(raw.longitude, raw.latitude)
    }
}

impl Coordinate {
    /// Creates a coordinate, rejecting non-finite or out-of-range values.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidCoordinate`] if either value is not
    /// finite, the longitude is outside `[-180, 180]`, or the latitude is
    /// outside `[-90, 90]`.
    pub fn new(longitude: f64, latitude: f64) -> Result<Self, RecordError> {
        let valid = longitude.is_finite()
            && latitude.is_finite()
            && (-180.0..=180.0).contains(&longitude)
            && (-90.0..=90.0).contains(&latitude);

        if !valid {
            return Err(RecordError::InvalidCoordinate {
                longitude,
                latitude,
            });
        }

        Ok(Self {
            longitude,
            latitude,
        })
    }

    /// Longitude (x).
    #[must_use]
    pub const fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Latitude (y).
    #[must_use]
    pub const fn latitude(&self) -> f64 {
        self.latitude
    }
}

impl From<Coordinate> for geo::Point<f64> {
    fn from(c: Coordinate) -> Self {
        Self::new(c.longitude, c.latitude)
    }
}

impl std::fmt::Display for Coordinate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.longitude, self.latitude)
    }
}
