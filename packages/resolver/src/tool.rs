//! The point-in-polygon match loop.

use std::sync::Arc;

use pip_centroid::CentroidService;
use pip_models::{Record, SprFilter, StandardPlaceResult};
use pip_placetypes::{DEFAULT_ROLES, Role, Taxonomy};
use pip_spatial::{RecordReader, SpatialDatabase};

use crate::{PipError, SelectionPolicy, merge, reduce};

/// Resolves the parent of a record against a spatial database.
///
/// Cheap to share: every collaborator is behind an [`Arc`] and the tool
/// itself holds no mutable state, so one instance can serve any number of
/// concurrent records.
#[derive(Clone)]
pub struct PointInPolygonTool {
    spatial: Arc<dyn SpatialDatabase>,
    reader: Arc<dyn RecordReader>,
    centroids: Option<Arc<dyn CentroidService>>,
    taxonomy: Arc<Taxonomy>,
    roles: Vec<Role>,
}

impl PointInPolygonTool {
    /// Creates a tool using the built-in taxonomy and default roles, with no
    /// centroid service (so polygon records can't be resolved).
    #[must_use]
    pub fn new(spatial: Arc<dyn SpatialDatabase>, reader: Arc<dyn RecordReader>) -> Self {
        Self {
            spatial,
            reader,
            centroids: None,
            taxonomy: pip_placetypes::taxonomy(),
            roles: DEFAULT_ROLES.to_vec(),
        }
    }

    /// Sets the centroid service used for polygon records.
    #[must_use]
    pub fn with_centroid_service(mut self, centroids: Arc<dyn CentroidService>) -> Self {
        self.centroids = Some(centroids);
        self
    }

    /// Restricts candidate ancestors to these roles.
    #[must_use]
    pub fn with_roles(mut self, roles: Vec<Role>) -> Self {
        self.roles = roles;
        self
    }

    /// The record reader used to load parents.
    #[must_use]
    pub fn reader(&self) -> &dyn RecordReader {
        self.reader.as_ref()
    }

    /// Finds the candidate parents of `record`.
    ///
    /// Candidate placetypes are tried most specific first. For each one the
    /// caller's filter is copied, its placetypes replaced by the candidate
    /// alone, and the spatial database queried. The first non-empty result
    /// is returned and later candidates are never queried. An empty vector
    /// means no candidate matched.
    ///
    /// # Errors
    ///
    /// * [`PipError::MissingPlacetype`] if the record has no placetype
    /// * [`PipError::Placetype`] if the placetype is unknown
    /// * any geometry reduction error (see [`reduce`])
    /// * [`PipError::Spatial`] on the first failing query; no further
    ///   candidates are tried
    pub async fn point_in_polygon(
        &self,
        record: &Record,
        filter: &SprFilter,
    ) -> Result<Vec<StandardPlaceResult>, PipError> {
        let placetype = record.placetype().ok_or(PipError::MissingPlacetype)?;

        let candidates: Vec<String> = self
            .taxonomy
            .ancestors_for_roles(placetype, &self.roles)?
            .into_iter()
            .map(|pt| pt.name().to_string())
            .collect();

        let coord = reduce(record, self.centroids.as_deref()).await?;

        for candidate in &candidates {
            let mut query = filter.clone();
            query.set_placetype(candidate);

            let matches = self.spatial.point_in_polygon(&coord, &query).await?;

            log::debug!(
                "{placetype} at {coord}: {} {candidate} match(es)",
                matches.len()
            );

            if !matches.is_empty() {
                return Ok(matches);
            }
        }

        log::debug!(
            "{placetype} at {coord}: no parent among {} candidate(s)",
            candidates.len()
        );

        Ok(Vec::new())
    }

    /// Resolves the parent of `record` and merges it in.
    ///
    /// The record is returned unchanged when nothing matches or when
    /// `policy` chooses no parent.
    ///
    /// # Errors
    ///
    /// Any error from [`Self::point_in_polygon`], the selection policy, or
    /// [`merge`].
    pub async fn point_in_polygon_and_update(
        &self,
        record: Record,
        filter: &SprFilter,
        policy: &dyn SelectionPolicy,
    ) -> Result<Record, PipError> {
        let matches = self.point_in_polygon(&record, filter).await?;
        let parent = policy.select(&record, &matches)?;
        merge(record, parent.as_ref(), self.reader.as_ref()).await
    }
}
