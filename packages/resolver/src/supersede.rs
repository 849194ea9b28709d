//! Supersession: retiring a record whose parent changed.
//!
//! A record that moves to a different parent is not edited in place. The
//! old record is marked as no longer current and superseded, and a new
//! record carrying the new parent takes its place.

use pip_models::{Existential, Record, edtf};
use pip_spatial::RecordReader;

use crate::merge::UNKNOWN_COUNTRY;
use crate::{Exporter, PipError};

/// The two records produced by a supersession.
#[derive(Debug, Clone, PartialEq)]
pub struct Supersession {
    /// The replacement, as exported (it carries its minted id).
    pub new_record: Record,
    /// The retired original.
    pub old_record: Record,
    /// Id minted for the replacement.
    pub new_id: i64,
}

/// Compares the parents of `old` and `resolved` (the same record before and
/// after resolution) and supersedes `old` when they differ. The replacement
/// takes its hierarchy and country from the new parent's stored record, with
/// `XX` for a parent without a country.
///
/// Returns `Ok(None)` when the parent is unchanged; neither record is
/// touched in that case. Otherwise the replacement is exported through
/// `exporter` before the old record is updated, since the old record must
/// point at the replacement's minted id.
///
/// Both records take their dates from the new parent's inception: the
/// replacement starts and the original ceases on that date. A parent
/// without an inception gives the unknown date `uuuu`.
///
/// # Errors
///
/// * [`PipError::MissingParentId`] if either record lacks `wof:parent_id`
/// * [`PipError::MissingId`] if `old` lacks `wof:id` or the exporter did
///   not assign one
/// * reader and exporter failures
pub async fn supersede(
    old: &Record,
    resolved: &Record,
    reader: &dyn RecordReader,
    exporter: &dyn Exporter,
) -> Result<Option<Supersession>, PipError> {
    let old_parent = old.parent_id().ok_or(PipError::MissingParentId)?;
    let new_parent = resolved.parent_id().ok_or(PipError::MissingParentId)?;

    if old_parent == new_parent {
        return Ok(None);
    }

    let old_id = old.id().ok_or(PipError::MissingId)?;
    let parent = reader.load_record_by_id(new_parent).await?;
    let inception = parent.inception().unwrap_or(edtf::UNKNOWN).to_string();

    log::info!("Superseding {old_id}: parent {old_parent} -> {new_parent}");

    let mut replacement = old.clone();
    replacement.clear_id();
    replacement.set_parent_id(new_parent);
    replacement.set_hierarchies(&parent.hierarchies()?);
    replacement.set_country(parent.country().unwrap_or(UNKNOWN_COUNTRY));
    replacement.set_is_current(Existential::True);
    replacement.set_inception(&inception);
    replacement.set_cessation(edtf::OPEN);
    replacement.set_supersedes(&[old_id]);

    let exported = exporter.export(&replacement.to_bytes()?).await?;
    let new_record = Record::from_bytes(&exported)?;
    let new_id = new_record.id().ok_or(PipError::MissingId)?;

    let mut old_record = old.clone();
    old_record.set_is_current(Existential::False);
    old_record.set_superseded_by(&[new_id]);
    old_record.set_cessation(&inception);

    Ok(Some(Supersession {
        new_record,
        old_record,
        new_id,
    }))
}
