//! Copies a parent's identity onto a child record.

use pip_models::{Record, StandardPlaceResult};
use pip_spatial::RecordReader;

use crate::PipError;

/// Country code used when the parent has none.
pub const UNKNOWN_COUNTRY: &str = "XX";

/// Sets `wof:parent_id`, `wof:country` and `wof:hierarchy` on `record` from
/// the full parent record.
///
/// With no parent the record is returned unchanged. Applying the same parent
/// twice yields the same record.
///
/// # Errors
///
/// Returns [`PipError::Record`] if the parent id isn't an integer or the
/// parent hierarchy is malformed, and [`PipError::Spatial`] if the parent
/// can't be loaded.
pub async fn merge(
    mut record: Record,
    parent: Option<&StandardPlaceResult>,
    reader: &dyn RecordReader,
) -> Result<Record, PipError> {
    let Some(parent) = parent else {
        return Ok(record);
    };

    let parent_id = parent.id_as_i64()?;
    let parent_record = reader.load_record_by_id(parent_id).await?;

    record.set_parent_id(parent_id);
    record.set_country(parent_record.country().unwrap_or(UNKNOWN_COUNTRY));
    record.set_hierarchies(&parent_record.hierarchies()?);

    Ok(record)
}
