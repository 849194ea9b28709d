#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial database for parent resolution.
//!
//! Defines the [`SpatialDatabase`] and [`RecordReader`] interfaces the
//! resolver consumes, and an in-memory implementation backed by an R-tree.
//!
//! Indexing and querying are separate types: records are fed to a
//! [`SpatialIndexBuilder`], and only the [`SpatialIndex`] returned by
//! [`SpatialIndexBuilder::build`] can answer queries. Every query therefore
//! runs against a fully populated index.

use std::collections::BTreeMap;

use async_trait::async_trait;
use geo::{Area, BoundingRect, Contains, MultiPolygon};
use pip_models::{Coordinate, Record, RecordError, SprFilter, StandardPlaceResult};
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;

/// Errors from indexing or querying the spatial database.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// A record could not be summarized or its geometry read.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// No record with this id was indexed.
    #[error("Record {0} not found")]
    NotFound(i64),

    /// The geometry can't be used for containment tests.
    #[error("Geometry error: {message}")]
    Geometry {
        /// Description of the problem.
        message: String,
    },

    /// The backing store failed (for implementations other than the
    /// in-memory index).
    #[error("Backend error: {message}")]
    Backend {
        /// Description of the failure.
        message: String,
    },
}

/// Point-in-polygon queries against indexed boundaries.
#[async_trait]
pub trait SpatialDatabase: Send + Sync {
    /// Returns every indexed boundary containing `coord` that passes
    /// `filter`.
    async fn point_in_polygon(
        &self,
        coord: &Coordinate,
        filter: &SprFilter,
    ) -> Result<Vec<StandardPlaceResult>, SpatialError>;
}

/// Lookup of full records by id.
#[async_trait]
pub trait RecordReader: Send + Sync {
    /// Loads the record with the given `wof:id`.
    async fn load_record_by_id(&self, id: i64) -> Result<Record, SpatialError>;
}

/// A boundary polygon stored in the R-tree with its summary.
struct BoundaryEntry {
    spr: StandardPlaceResult,
    id: i64,
    area: f64,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for BoundaryEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Collects records before the index is built.
#[derive(Default)]
pub struct SpatialIndexBuilder {
    boundaries: Vec<BoundaryEntry>,
    records: BTreeMap<i64, Record>,
}

impl SpatialIndexBuilder {
    /// Creates an empty builder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a record.
    ///
    /// Every record is kept for [`RecordReader::load_record_by_id`]; only
    /// `Polygon` and `MultiPolygon` records become queryable boundaries.
    /// Returns whether the record was added as a boundary.
    ///
    /// # Errors
    ///
    /// Returns an error if the record has no `wof:id` or its polygon
    /// geometry is malformed.
    pub fn index_record(&mut self, record: Record) -> Result<bool, SpatialError> {
        let spr = StandardPlaceResult::from_record(&record)?;
        let id = spr.id_as_i64()?;

        let indexed = if record.is_polygonal() {
            let polygon = to_multipolygon(record.to_geo()?).ok_or_else(|| {
                SpatialError::Geometry {
                    message: format!("record {id} is not a polygon"),
                }
            })?;

            let envelope = compute_envelope(&polygon).ok_or_else(|| SpatialError::Geometry {
                message: format!("record {id} has an empty polygon"),
            })?;

            self.boundaries.push(BoundaryEntry {
                spr,
                id,
                area: polygon.unsigned_area(),
                envelope,
                polygon,
            });
            true
        } else {
            false
        };

        if self.records.insert(id, record).is_some() {
            log::warn!("Record {id} indexed more than once; keeping the latest");
        }

        Ok(indexed)
    }

    /// Number of boundaries added so far.
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    /// Bulk-loads the R-tree and freezes the index.
    #[must_use]
    pub fn build(self) -> SpatialIndex {
        let boundaries = RTree::bulk_load(self.boundaries);
        log::info!(
            "Built spatial index: {} boundaries, {} records",
            boundaries.size(),
            self.records.len()
        );

        SpatialIndex {
            boundaries,
            records: self.records,
        }
    }
}

/// An immutable, fully built spatial index.
///
/// Safe to share across workers behind an `Arc`; queries never mutate it.
pub struct SpatialIndex {
    boundaries: RTree<BoundaryEntry>,
    records: BTreeMap<i64, Record>,
}

impl SpatialIndex {
    /// Number of queryable boundaries.
    #[must_use]
    pub fn boundary_count(&self) -> usize {
        self.boundaries.size()
    }

    /// Number of records available by id.
    #[must_use]
    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    /// Boundaries containing the coordinate and passing the filter.
    ///
    /// Boundaries can overlap; the smallest area comes first, ties broken by
    /// id, so the order is stable across runs.
    #[must_use]
    pub fn lookup(&self, coord: &Coordinate, filter: &SprFilter) -> Vec<StandardPlaceResult> {
        let point: geo::Point<f64> = (*coord).into();
        let query_env = AABB::from_point([coord.longitude(), coord.latitude()]);

        let mut hits: Vec<&BoundaryEntry> = self
            .boundaries
            .locate_in_envelope_intersecting(&query_env)
            .filter(|entry| filter.matches(&entry.spr))
            .filter(|entry| entry.polygon.contains(&point))
            .collect();

        hits.sort_by(|a, b| a.area.total_cmp(&b.area).then(a.id.cmp(&b.id)));

        hits.into_iter().map(|entry| entry.spr.clone()).collect()
    }
}

#[async_trait]
impl SpatialDatabase for SpatialIndex {
    async fn point_in_polygon(
        &self,
        coord: &Coordinate,
        filter: &SprFilter,
    ) -> Result<Vec<StandardPlaceResult>, SpatialError> {
        Ok(self.lookup(coord, filter))
    }
}

#[async_trait]
impl RecordReader for SpatialIndex {
    async fn load_record_by_id(&self, id: i64) -> Result<Record, SpatialError> {
        self.records
            .get(&id)
            .cloned()
            .ok_or(SpatialError::NotFound(id))
    }
}

/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> Option<AABB<[f64; 2]>> {
    mp.bounding_rect()
        .map(|rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]))
}
