#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Core data types for point-in-polygon parent resolution.
//!
//! A [`Record`] is a `GeoJSON` feature carrying Who's On First-style
//! properties (`wof:placetype`, `wof:parent_id`, `wof:hierarchy`, ...).
//! Spatial queries return [`StandardPlaceResult`] summaries, narrowed by an
//! [`SprFilter`] whose currency constraints use the tri-state
//! [`Existential`] flag.

pub mod coordinate;
pub mod existential;
pub mod filter;
pub mod record;
pub mod spr;

pub use coordinate::Coordinate;
pub use existential::Existential;
pub use filter::SprFilter;
pub use record::{Hierarchy, Record};
pub use spr::StandardPlaceResult;

use thiserror::Error;

/// Property paths read and written by the resolver.
pub mod props {
    /// Unique record identifier.
    pub const ID: &str = "wof:id";
    /// Human-readable name.
    pub const NAME: &str = "wof:name";
    /// Placetype name (e.g. `"venue"`).
    pub const PLACETYPE: &str = "wof:placetype";
    /// Identifier of the enclosing parent record.
    pub const PARENT_ID: &str = "wof:parent_id";
    /// ISO country code.
    pub const COUNTRY: &str = "wof:country";
    /// List of ancestor hierarchies.
    pub const HIERARCHY: &str = "wof:hierarchy";
    /// Tri-state "is current" flag.
    pub const IS_CURRENT: &str = "mz:is_current";
    /// EDTF inception date.
    pub const INCEPTION: &str = "edtf:inception";
    /// EDTF cessation date.
    pub const CESSATION: &str = "edtf:cessation";
    /// EDTF deprecation date.
    pub const DEPRECATED: &str = "edtf:deprecated";
    /// Records this record replaces.
    pub const SUPERSEDES: &str = "wof:supersedes";
    /// Records replacing this record.
    pub const SUPERSEDED_BY: &str = "wof:superseded_by";
    /// Last modification time, unix seconds.
    pub const LAST_MODIFIED: &str = "wof:lastmodified";
    /// Hash of the record geometry.
    pub const GEOM_HASH: &str = "wof:geomhash";
}

/// EDTF values with special meaning.
pub mod edtf {
    /// An open-ended date (still ongoing).
    pub const OPEN: &str = "..";
    /// An unknown date.
    pub const UNKNOWN: &str = "uuuu";
}

/// Errors from parsing or validating records and their properties.
#[derive(Debug, Error)]
pub enum RecordError {
    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The payload was valid JSON but not a `GeoJSON` feature.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The feature has no geometry.
    #[error("Record has no geometry")]
    MissingGeometry,

    /// A coordinate is not finite or lies outside the valid range.
    #[error("Invalid coordinate: longitude {longitude}, latitude {latitude}")]
    InvalidCoordinate {
        /// Offending longitude.
        longitude: f64,
        /// Offending latitude.
        latitude: f64,
    },

    /// A property exists but has an unexpected shape.
    #[error("Invalid property '{name}': {message}")]
    InvalidProperty {
        /// Property path.
        name: String,
        /// Description of what went wrong.
        message: String,
    },

    /// A tri-state flag value outside `-1`, `0`, `1`.
    #[error("Invalid existential flag '{0}' (expected -1, 0 or 1)")]
    InvalidExistential(String),
}
