#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Point-in-polygon parent resolution.
//!
//! Given a record, [`PointInPolygonTool`] works out which enclosing place
//! is its parent:
//!
//! 1. [`reduce`] turns the record geometry into a single coordinate.
//! 2. The record's placetype yields an ordered list of candidate ancestor
//!    placetypes (`pip_placetypes`).
//! 3. Each candidate is queried against the spatial database in turn; the
//!    first candidate with any match wins.
//! 4. A [`SelectionPolicy`] narrows the match set to one parent.
//! 5. [`merge`] copies the parent's id, country and hierarchy onto the
//!    record.
//!
//! When a record's parent changed since it was last written,
//! [`supersede`] retires the old record and produces a replacement.

pub mod export;
pub mod merge;
pub mod reduce;
pub mod select;
pub mod sort;
pub mod supersede;
pub mod tool;

pub use export::{Exporter, WhosOnFirstExporter};
pub use merge::merge;
pub use reduce::reduce;
pub use select::{ExactlyOne, FirstButForgiving, SelectionPolicy, SelectionStrategy};
pub use supersede::{Supersession, supersede};
pub use tool::PointInPolygonTool;

use pip_centroid::CentroidError;
use pip_models::RecordError;
use pip_placetypes::PlacetypeError;
use pip_spatial::SpatialError;
use thiserror::Error;

/// Errors that abort resolution of a single record.
#[derive(Debug, Error)]
pub enum PipError {
    /// The record has no `wof:placetype`.
    #[error("Missing 'wof:placetype' property")]
    MissingPlacetype,

    /// The placetype is unknown, or the taxonomy is broken.
    #[error(transparent)]
    Placetype(#[from] PlacetypeError),

    /// The geometry can't be reduced to a coordinate.
    #[error("Unsupported geometry type '{0}'")]
    UnsupportedGeometry(String),

    /// The geometry has no positions.
    #[error("Geometry of type '{0}' is empty")]
    EmptyGeometry(String),

    /// A polygon needs a centroid but no centroid service is configured.
    #[error("No centroid service configured for {0} geometry")]
    CentroidServiceUnavailable(String),

    /// The centroid service failed.
    #[error("Failed to append centroids: {0}")]
    Centroid(#[from] CentroidError),

    /// The spatial database failed.
    #[error("Spatial query failed: {0}")]
    Spatial(#[from] SpatialError),

    /// The selection policy needed exactly one match.
    #[error("Expected exactly one parent candidate, found {count}")]
    AmbiguousOrEmptyMatch {
        /// Number of candidates found.
        count: usize,
    },

    /// A record compared during supersession has no `wof:parent_id`.
    #[error("Missing 'wof:parent_id' property")]
    MissingParentId,

    /// A record that must have an id has none.
    #[error("Missing 'wof:id' property")]
    MissingId,

    /// A record or property was malformed.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Exporting a record failed.
    #[error("Export failed: {0}")]
    Export(#[from] export::ExportError),
}
