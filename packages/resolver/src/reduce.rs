//! Reduces a record geometry to one representative coordinate.

use geo::BoundingRect;
use geojson::FeatureCollection;
use pip_centroid::{CentroidService, coordinate_from_feature};
use pip_models::{Coordinate, Record};

use crate::PipError;

/// Returns the coordinate used to point-in-polygon a record.
///
/// * `Point`: the point itself.
/// * `MultiPoint`: the center of the bounding box. This is a cheap
///   approximation, not an average of the points.
/// * `Polygon` / `MultiPolygon`: whatever the centroid service returns for
///   a single-feature collection. There is no local fallback.
///
/// # Errors
///
/// Returns [`PipError::UnsupportedGeometry`] for any other geometry type,
/// [`PipError::CentroidServiceUnavailable`] if a polygon needs a centroid
/// and `centroids` is `None`, and propagates centroid service failures.
pub async fn reduce(
    record: &Record,
    centroids: Option<&dyn CentroidService>,
) -> Result<Coordinate, PipError> {
    let geometry_type = record.geometry_type();

    match &record.geometry().value {
        geojson::Value::Point(position) => {
            if position.len() < 2 {
                return Err(PipError::EmptyGeometry(geometry_type.to_string()));
            }
            Ok(Coordinate::new(position[0], position[1])?)
        }
        geojson::Value::MultiPoint(_) => {
            let geo::Geometry::MultiPoint(points) = record.to_geo()? else {
                return Err(PipError::UnsupportedGeometry(geometry_type.to_string()));
            };
            let center = points
                .bounding_rect()
                .ok_or_else(|| PipError::EmptyGeometry(geometry_type.to_string()))?
                .center();
            Ok(Coordinate::new(center.x, center.y)?)
        }
        geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_) => {
            let service = centroids
                .ok_or_else(|| PipError::CentroidServiceUnavailable(geometry_type.to_string()))?;

            let collection = FeatureCollection {
                bbox: None,
                features: vec![record.to_feature()],
                foreign_members: None,
            };

            let collection = service.append_centroids(collection).await?;
            let feature = collection.features.first().ok_or_else(|| {
                pip_centroid::CentroidError::Parse {
                    message: "centroid service returned no features".to_string(),
                }
            })?;

            Ok(coordinate_from_feature(feature)?)
        }
        _ => Err(PipError::UnsupportedGeometry(geometry_type.to_string())),
    }
}
