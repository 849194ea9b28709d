//! Standard place results: the lightweight summary a spatial query returns.

use serde::{Deserialize, Serialize};

use crate::{Existential, Hierarchy, Record, RecordError, edtf};

/// One spatial index hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StandardPlaceResult {
    /// External identifier. Must parse as an integer to be used as a parent.
    pub id: String,
    /// Parent identifier (`-1` when unknown).
    pub parent_id: i64,
    /// Human-readable name.
    pub name: String,
    /// Placetype name.
    pub placetype: String,
    /// ISO country code.
    pub country: String,
    /// EDTF inception date.
    pub inception: String,
    /// EDTF cessation date.
    pub cessation: String,
    /// Whether the place is current.
    pub is_current: Existential,
    /// Whether the place has ceased to exist.
    pub is_ceased: Existential,
    /// Whether the record is deprecated.
    pub is_deprecated: Existential,
    /// Whether the record has been superseded.
    pub is_superseded: Existential,
    /// Whether the record supersedes others.
    pub is_superseding: Existential,
    /// Records this place replaces.
    pub supersedes: Vec<i64>,
    /// Records replacing this place.
    pub superseded_by: Vec<i64>,
    /// Ancestor hierarchies.
    pub hierarchies: Vec<Hierarchy>,
}

impl StandardPlaceResult {
    /// Summarizes a record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidProperty`] if the record has no
    /// `wof:id` or its hierarchy is malformed.
    pub fn from_record(record: &Record) -> Result<Self, RecordError> {
        let id = record.id().ok_or_else(|| RecordError::InvalidProperty {
            name: crate::props::ID.to_string(),
            message: "missing or not an integer".to_string(),
        })?;

        let supersedes = record.supersedes();
        let superseded_by = record.superseded_by();
        let cessation = record.cessation().unwrap_or(edtf::UNKNOWN);

        Ok(Self {
            id: id.to_string(),
            parent_id: record.parent_id().unwrap_or(-1),
            name: record.name().unwrap_or_default().to_string(),
            placetype: record.placetype().unwrap_or_default().to_string(),
            country: record.country().unwrap_or_default().to_string(),
            inception: record.inception().unwrap_or(edtf::UNKNOWN).to_string(),
            cessation: cessation.to_string(),
            is_current: record.is_current(),
            is_ceased: ceased_flag(cessation),
            is_deprecated: Existential::from_bool(record.deprecated().is_some()),
            is_superseded: Existential::from_bool(!superseded_by.is_empty()),
            is_superseding: Existential::from_bool(!supersedes.is_empty()),
            supersedes,
            superseded_by,
            hierarchies: record.hierarchies()?,
        })
    }

    /// Parses [`Self::id`] as an integer key.
    ///
    /// # Errors
    ///
    /// Returns [`RecordError::InvalidProperty`] if the id is not an integer.
    pub fn id_as_i64(&self) -> Result<i64, RecordError> {
        self.id
            .trim()
            .parse()
            .map_err(|_| RecordError::InvalidProperty {
                name: crate::props::ID.to_string(),
                message: format!("'{}' is not an integer", self.id),
            })
    }
}

/// Open cessation means still going; unknown cessation means we can't say.
fn ceased_flag(cessation: &str) -> Existential {
    match cessation {
        "" | edtf::UNKNOWN => Existential::Unknown,
        edtf::OPEN => Existential::False,
        _ => Existential::True,
    }
}
