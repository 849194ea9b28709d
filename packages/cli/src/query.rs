//! Point-in-polygon queries, answered the same way on the command line and
//! over HTTP.

use clap::ValueEnum;
use pip_models::{Coordinate, Record, RecordError, SprFilter, StandardPlaceResult};
use pip_resolver::sort::{NameSorter, Sorter as _};
use pip_spatial::{RecordReader as _, SpatialError, SpatialIndex};
use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

/// Errors from answering a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The requested point is not a valid coordinate.
    #[error(transparent)]
    Coordinate(#[from] RecordError),

    /// A result's id doesn't name a stored record.
    #[error("Result id '{0}' is not a record id")]
    InvalidId(String),

    /// Loading a result's record failed.
    #[error(transparent)]
    Spatial(#[from] SpatialError),

    /// Results couldn't be encoded.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// Whether the caller asked for something impossible, as opposed to the
    /// index failing.
    #[must_use]
    pub const fn is_bad_request(&self) -> bool {
        matches!(self, Self::Coordinate(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Name,
}

/// One query: a point, the usual filter, and optionally the record
/// properties to attach to each result.
#[derive(Debug, Clone, Deserialize)]
pub struct PointInPolygonRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(flatten)]
    pub filter: SprFilter,
    /// Property names to copy from each result's record. A trailing `*`
    /// matches by prefix (`wof:*`).
    #[serde(default)]
    pub properties: Vec<String>,
    #[serde(default)]
    pub sort: Option<SortOrder>,
}

/// Boundaries containing the requested point, smallest first unless a sort
/// is given.
///
/// Without requested properties the results are plain place results.
/// Otherwise each result also carries the matching properties of its
/// stored record.
///
/// # Errors
///
/// Fails if the point is out of range or a result's record can't be loaded.
pub async fn query(
    index: &SpatialIndex,
    request: &PointInPolygonRequest,
) -> Result<Value, QueryError> {
    let coord = Coordinate::new(request.longitude, request.latitude)?;

    let mut results = index.lookup(&coord, &request.filter);
    if request.sort == Some(SortOrder::Name) {
        NameSorter.sort(&mut results);
    }

    if request.properties.is_empty() {
        return Ok(serde_json::to_value(results)?);
    }

    let mut enriched = Vec::with_capacity(results.len());
    for spr in results {
        let record = load_record(index, &spr).await?;
        let Value::Object(mut fields) = serde_json::to_value(&spr)? else {
            continue;
        };
        fields.extend(select_properties(&record, &request.properties));
        enriched.push(Value::Object(fields));
    }

    Ok(Value::Array(enriched))
}

async fn load_record(
    index: &SpatialIndex,
    spr: &StandardPlaceResult,
) -> Result<Record, QueryError> {
    let id = spr
        .id
        .parse()
        .map_err(|_| QueryError::InvalidId(spr.id.clone()))?;
    Ok(index.load_record_by_id(id).await?)
}

fn select_properties(record: &Record, names: &[String]) -> Map<String, Value> {
    let mut selected = Map::new();

    for name in names {
        if let Some(prefix) = name.strip_suffix('*') {
            for (key, value) in record.properties() {
                if key.starts_with(prefix) {
                    selected.insert(key.clone(), value.clone());
                }
            }
        } else if let Some(value) = record.property(name) {
            selected.insert(name.clone(), value.clone());
        }
    }

    selected
}

#[cfg(test)]
pub(crate) mod tests {
    use pip_spatial::SpatialIndexBuilder;

    use super::*;

    fn square(id: i64, name: &str, placetype: &str, min: f64, max: f64) -> Record {
        let body = serde_json::json!({
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [[[min, min], [max, min], [max, max], [min, max], [min, min]]]
            },
            "properties": {
                "wof:id": id,
                "wof:name": name,
                "wof:placetype": placetype,
                "wof:country": "US",
                "wof:lang": ["eng"],
                "mz:is_current": 1,
                "src:geom": "quattroshapes"
            }
        });
        Record::from_bytes(body.to_string().as_bytes()).unwrap()
    }

    /// Two nested squares around the origin.
    pub(crate) fn index() -> SpatialIndex {
        let mut builder = SpatialIndexBuilder::new();
        builder
            .index_record(square(10, "Zeta", "neighbourhood", -1.0, 1.0))
            .unwrap();
        builder
            .index_record(square(20, "Alpha", "locality", -5.0, 5.0))
            .unwrap();
        builder.build()
    }

    pub(crate) fn request(body: serde_json::Value) -> PointInPolygonRequest {
        serde_json::from_value(body).unwrap()
    }

    fn ids(value: &Value) -> Vec<&str> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["id"].as_str().unwrap())
            .collect()
    }

    #[tokio::test]
    async fn smallest_first_or_by_name() {
        let index = index();

        let point = serde_json::json!({ "latitude": 0.5, "longitude": 0.5 });
        let results = query(&index, &request(point)).await.unwrap();
        assert_eq!(ids(&results), ["10", "20"]);

        let results = query(
            &index,
            &request(serde_json::json!({ "latitude": 0.5, "longitude": 0.5, "sort": "name" })),
        )
        .await
        .unwrap();
        assert_eq!(ids(&results), ["20", "10"]);
    }

    #[tokio::test]
    async fn filter_fields_sit_beside_the_point() {
        let results = query(
            &index(),
            &request(serde_json::json!({
                "latitude": 0.5,
                "longitude": 0.5,
                "placetypes": ["locality"],
                "is_current": [1]
            })),
        )
        .await
        .unwrap();
        assert_eq!(ids(&results), ["20"]);
    }

    #[tokio::test]
    async fn requested_properties_are_attached() {
        let results = query(
            &index(),
            &request(serde_json::json!({
                "latitude": 3.0,
                "longitude": 3.0,
                "properties": ["wof:lang", "src:*", "wof:missing"]
            })),
        )
        .await
        .unwrap();

        let result = &results.as_array().unwrap()[0];
        assert_eq!(result["id"], "20");
        assert_eq!(result["wof:lang"], serde_json::json!(["eng"]));
        assert_eq!(result["src:geom"], "quattroshapes");
        assert!(result.get("wof:missing").is_none());
    }

    #[tokio::test]
    async fn out_of_range_point_is_a_bad_request() {
        let err = query(
            &index(),
            &request(serde_json::json!({ "latitude": 91.0, "longitude": 0.0 })),
        )
        .await
        .unwrap_err();
        assert!(err.is_bad_request());
    }
}
