//! Geospatial records and their typed property accessors.
//!
//! Records are kept as a `GeoJSON` geometry plus an ordered property map.
//! Only the handful of paths the resolver touches get typed accessors;
//! every other property is carried through untouched.

use std::collections::BTreeMap;

use geojson::{Feature, JsonObject, JsonValue};

use crate::{Existential, RecordError, props};

/// Ancestor identifiers keyed by `"<placetype>_id"` (e.g. `"locality_id"`).
pub type Hierarchy = BTreeMap<String, i64>;

/// A geospatial feature being enriched.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    geometry: geojson::Geometry,
    properties: JsonObject,
    bbox: Option<geojson::Bbox>,
    foreign_members: Option<JsonObject>,
}

impl Record {
    /// Creates a record from a geometry and a property map.
    #[must_use]
    pub const fn new(geometry: geojson::Geometry, properties: JsonObject) -> Self {
        Self {
            geometry,
            properties,
            bbox: None,
            foreign_members: None,
        }
    }

    /// Parses a record from `GeoJSON` feature bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a `GeoJSON` feature or the
    /// feature has no geometry.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, RecordError> {
        let value: JsonValue = serde_json::from_slice(bytes)?;
        let feature = Feature::try_from(value)?;
        Self::try_from(feature)
    }

    /// Serializes the record as `GeoJSON` feature bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>, RecordError> {
        Ok(serde_json::to_vec(&self.to_feature())?)
    }

    /// Converts the record back into a `GeoJSON` feature. The feature's
    /// top-level `id` mirrors `wof:id`.
    #[must_use]
    pub fn to_feature(&self) -> Feature {
        Feature {
            bbox: self.bbox.clone(),
            geometry: Some(self.geometry.clone()),
            id: self
                .id()
                .map(|id| geojson::feature::Id::Number(serde_json::Number::from(id))),
            properties: Some(self.properties.clone()),
            foreign_members: self.foreign_members.clone(),
        }
    }

    /// The record geometry.
    #[must_use]
    pub const fn geometry(&self) -> &geojson::Geometry {
        &self.geometry
    }

    /// The `GeoJSON` type name of the geometry (e.g. `"MultiPolygon"`).
    #[must_use]
    pub const fn geometry_type(&self) -> &'static str {
        match &self.geometry.value {
            geojson::Value::Point(_) => "Point",
            geojson::Value::MultiPoint(_) => "MultiPoint",
            geojson::Value::LineString(_) => "LineString",
            geojson::Value::MultiLineString(_) => "MultiLineString",
            geojson::Value::Polygon(_) => "Polygon",
            geojson::Value::MultiPolygon(_) => "MultiPolygon",
            geojson::Value::GeometryCollection(_) => "GeometryCollection",
        }
    }

    /// Whether the geometry is a `Polygon` or `MultiPolygon`.
    #[must_use]
    pub const fn is_polygonal(&self) -> bool {
        matches!(
            self.geometry.value,
            geojson::Value::Polygon(_) | geojson::Value::MultiPolygon(_)
        )
    }

    /// Converts the geometry into a [`geo::Geometry`].
    ///
    /// # Errors
    ///
    /// Returns an error if the `GeoJSON` geometry is malformed.
    pub fn to_geo(&self) -> Result<geo::Geometry<f64>, RecordError> {
        let geometry: geo::Geometry<f64> = self.geometry.clone().try_into()?;
        Ok(geometry)
    }

    /// All properties.
    #[must_use]
    pub const fn properties(&self) -> &JsonObject {
        &self.properties
    }

    /// A single property by path.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&JsonValue> {
        self.properties.get(name)
    }

    /// Sets a property, replacing any previous value.
    pub fn set_property(&mut self, name: &str, value: impl Into<JsonValue>) {
        self.properties.insert(name.to_string(), value.into());
    }

    /// Removes a property, returning its previous value.
    pub fn remove_property(&mut self, name: &str) -> Option<JsonValue> {
        self.properties.remove(name)
    }

    /// `wof:id`, if present and an integer.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.property(props::ID).and_then(json_i64)
    }

    /// Sets `wof:id`.
    pub fn set_id(&mut self, id: i64) {
        self.set_property(props::ID, id);
    }

    /// Strips `wof:id` so the exporter mints a fresh one.
    pub fn clear_id(&mut self) {
        self.remove_property(props::ID);
    }

    /// `wof:placetype`, if present and non-empty.
    #[must_use]
    pub fn placetype(&self) -> Option<&str> {
        self.str_property(props::PLACETYPE)
    }

    /// `wof:name`.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.str_property(props::NAME)
    }

    /// `wof:parent_id`, if present and an integer.
    #[must_use]
    pub fn parent_id(&self) -> Option<i64> {
        self.property(props::PARENT_ID).and_then(json_i64)
    }

    /// Sets `wof:parent_id`.
    pub fn set_parent_id(&mut self, parent_id: i64) {
        self.set_property(props::PARENT_ID, parent_id);
    }

    /// `wof:country`.
    #[must_use]
    pub fn country(&self) -> Option<&str> {
        self.str_property(props::COUNTRY)
    }

    /// Sets `wof:country`.
    pub fn set_country(&mut self, country: &str) {
        self.set_property(props::COUNTRY, country);
    }

    /// `wof:hierarchy`. Missing means no hierarchies.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidProperty`] if the property is not a
    /// list of placetype-to-id maps.
    pub fn hierarchies(&self) -> Result<Vec<Hierarchy>, RecordError> {
        let Some(value) = self.property(props::HIERARCHY) else {
            return Ok(Vec::new());
        };

        let list = value.as_array().ok_or_else(|| RecordError::InvalidProperty {
            name: props::HIERARCHY.to_string(),
            message: "expected an array".to_string(),
        })?;

        list.iter()
            .map(|entry| {
                let object = entry.as_object().ok_or_else(|| RecordError::InvalidProperty {
                    name: props::HIERARCHY.to_string(),
                    message: "expected an array of objects".to_string(),
                })?;

                object
                    .iter()
                    .map(|(key, id)| {
                        json_i64(id).map(|id| (key.clone(), id)).ok_or_else(|| {
                            RecordError::InvalidProperty {
                                name: props::HIERARCHY.to_string(),
                                message: format!("'{key}' is not an integer id"),
                            }
                        })
                    })
                    .collect()
            })
            .collect()
    }

    /// Replaces `wof:hierarchy`.
    pub fn set_hierarchies(&mut self, hierarchies: &[Hierarchy]) {
        let list: Vec<JsonValue> = hierarchies
            .iter()
            .map(|h| {
                JsonValue::Object(
                    h.iter()
                        .map(|(k, v)| (k.clone(), JsonValue::from(*v)))
                        .collect(),
                )
            })
            .collect();
        self.set_property(props::HIERARCHY, list);
    }

    /// `mz:is_current`. Missing or malformed reads as unknown.
    #[must_use]
    pub fn is_current(&self) -> Existential {
        self.property(props::IS_CURRENT)
            .and_then(json_i64)
            .and_then(|v| Existential::from_i64(v).ok())
            .unwrap_or_default()
    }

    /// Sets `mz:is_current`.
    pub fn set_is_current(&mut self, flag: Existential) {
        self.set_property(props::IS_CURRENT, flag.as_i64());
    }

    /// `edtf:inception`.
    #[must_use]
    pub fn inception(&self) -> Option<&str> {
        self.str_property(props::INCEPTION)
    }

    /// Sets `edtf:inception`.
    pub fn set_inception(&mut self, date: &str) {
        self.set_property(props::INCEPTION, date);
    }

    /// `edtf:cessation`.
    #[must_use]
    pub fn cessation(&self) -> Option<&str> {
        self.str_property(props::CESSATION)
    }

    /// Sets `edtf:cessation`.
    pub fn set_cessation(&mut self, date: &str) {
        self.set_property(props::CESSATION, date);
    }

    /// `edtf:deprecated`.
    #[must_use]
    pub fn deprecated(&self) -> Option<&str> {
        self.str_property(props::DEPRECATED)
    }

    /// `wof:supersedes`.
    #[must_use]
    pub fn supersedes(&self) -> Vec<i64> {
        self.id_list(props::SUPERSEDES)
    }

    /// Replaces `wof:supersedes`.
    pub fn set_supersedes(&mut self, ids: &[i64]) {
        self.set_property(props::SUPERSEDES, ids.to_vec());
    }

    /// `wof:superseded_by`.
    #[must_use]
    pub fn superseded_by(&self) -> Vec<i64> {
        self.id_list(props::SUPERSEDED_BY)
    }

    /// Replaces `wof:superseded_by`.
    pub fn set_superseded_by(&mut self, ids: &[i64]) {
        self.set_property(props::SUPERSEDED_BY, ids.to_vec());
    }

    fn str_property(&self, name: &str) -> Option<&str> {
        self.property(name)
            .and_then(JsonValue::as_str)
            .filter(|s| !s.is_empty())
    }

    fn id_list(&self, name: &str) -> Vec<i64> {
        self.property(name)
            .and_then(JsonValue::as_array)
            .map(|ids| ids.iter().filter_map(json_i64).collect())
            .unwrap_or_default()
    }
}

impl TryFrom<Feature> for Record {
    type Error = RecordError;

    fn try_from(feature: Feature) -> Result<Self, Self::Error> {
        let geometry = feature.geometry.ok_or(RecordError::MissingGeometry)?;
        Ok(Self {
            geometry,
            properties: feature.properties.unwrap_or_default(),
            bbox: feature.bbox,
            foreign_members: feature.foreign_members,
        })
    }
}

/// Reads an integer from a JSON number or numeric string.
#[allow(clippy::cast_possible_truncation)]
fn json_i64(value: &JsonValue) -> Option<i64> {
    match value {
        JsonValue::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        JsonValue::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
