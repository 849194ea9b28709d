//! Record export: id minting and canonical serialization.
//!
//! Exporting is the step that turns an in-memory record into the bytes that
//! get written. A record without a `wof:id` is given a fresh one here, which
//! is how supersession learns the id of a replacement record.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use pip_models::{Record, RecordError, props};
use thiserror::Error;

/// Errors from exporting a record.
#[derive(Debug, Error)]
pub enum ExportError {
    /// The input bytes are not a valid record.
    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    /// Serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serializes records for writing, assigning ids where needed.
#[async_trait]
pub trait Exporter: Send + Sync {
    /// Exports a record, returning the canonical bytes.
    async fn export(&self, bytes: &[u8]) -> Result<Vec<u8>, ExportError>;
}

/// Source of new record ids.
pub trait IdProvider: Send + Sync {
    /// Returns an id not handed out before.
    fn next_id(&self) -> i64;
}

/// Random positive ids from UUID v4 bits.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdProvider;

impl IdProvider for RandomIdProvider {
    fn next_id(&self) -> i64 {
        let (high, _) = uuid::Uuid::new_v4().as_u64_pair();
        i64::try_from(high >> 1).unwrap_or(i64::MAX).max(1)
    }
}

/// Sequential ids starting from a seed. Handy for reproducible output.
#[derive(Debug)]
pub struct SequenceIdProvider {
    next: AtomicI64,
}

impl SequenceIdProvider {
    /// The first call to [`IdProvider::next_id`] returns `start`.
    #[must_use]
    pub const fn new(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }
}

impl IdProvider for SequenceIdProvider {
    fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

/// Exports records in Who's On First style.
///
/// * mints `wof:id` when absent
/// * stamps `wof:lastmodified` with the current unix time
/// * stamps `wof:geomhash` with the md5 of the geometry JSON
/// * mirrors the id into the feature's top-level `id`
/// * pretty-prints with properties in key order
pub struct WhosOnFirstExporter {
    ids: Box<dyn IdProvider>,
}

impl WhosOnFirstExporter {
    /// Creates an exporter minting ids from `ids`.
    #[must_use]
    pub fn new(ids: Box<dyn IdProvider>) -> Self {
        Self { ids }
    }

    /// Exports a record directly.
    ///
    /// # Errors
    ///
    /// Returns [`ExportError::Json`] if serialization fails.
    pub fn export_record(&self, mut record: Record) -> Result<Vec<u8>, ExportError> {
        if record.id().is_none() {
            let id = self.ids.next_id();
            log::debug!("Minted id {id} for new record");
            record.set_id(id);
        }

        let geometry = serde_json::to_vec(record.geometry())?;
        record.set_property(props::GEOM_HASH, format!("{:x}", md5::compute(geometry)));
        record.set_property(props::LAST_MODIFIED, chrono::Utc::now().timestamp());

        Ok(serde_json::to_vec_pretty(&record.to_feature())?)
    }
}

impl Default for WhosOnFirstExporter {
    fn default() -> Self {
        Self::new(Box::new(RandomIdProvider))
    }
}

#[async_trait]
impl Exporter for WhosOnFirstExporter {
    async fn export(&self, bytes: &[u8]) -> Result<Vec<u8>, ExportError> {
        let record = Record::from_bytes(bytes)?;
        self.export_record(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(properties: serde_json::Value) -> Record {
        let body = serde_json::json!({
            "type": "Feature",
            "geometry": { "type": "Point", "coordinates": [-122.4, 37.6] },
            "properties": properties
        });
        Record::from_bytes(body.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn random_ids_are_positive() {
        for _ in 0..100 {
            assert!(RandomIdProvider.next_id() > 0);
        }
    }

    #[test]
    fn sequence_counts_up() {
        let ids = SequenceIdProvider::new(1000);
        assert_eq!(ids.next_id(), 1000);
        assert_eq!(ids.next_id(), 1001);
    }

    #[tokio::test]
    async fn mints_id_only_when_missing() {
        let exporter = WhosOnFirstExporter::new(Box::new(SequenceIdProvider::new(500)));

        let fresh = record(serde_json::json!({ "wof:placetype": "venue" }));
        let out = exporter.export(&fresh.to_bytes().unwrap()).await.unwrap();
        assert_eq!(Record::from_bytes(&out).unwrap().id(), Some(500));

        let existing = record(serde_json::json!({ "wof:id": 7, "wof:placetype": "venue" }));
        let out = exporter.export(&existing.to_bytes().unwrap()).await.unwrap();
        assert_eq!(Record::from_bytes(&out).unwrap().id(), Some(7));
    }

    #[tokio::test]
    async fn stamps_geomhash_and_lastmodified() {
        let exporter = WhosOnFirstExporter::default();
        let r = record(serde_json::json!({ "wof:id": 7, "wof:name": "Cafe" }));
        let out = exporter.export(&r.to_bytes().unwrap()).await.unwrap();
        let exported = Record::from_bytes(&out).unwrap();

        let hash = exported.property(props::GEOM_HASH).unwrap().as_str().unwrap();
        assert_eq!(hash.len(), 32);
        assert!(exported.property(props::LAST_MODIFIED).unwrap().is_i64());
        assert_eq!(exported.name(), Some("Cafe"));

        let again = exporter.export(&out).await.unwrap();
        let again = Record::from_bytes(&again).unwrap();
        assert_eq!(again.property(props::GEOM_HASH).unwrap().as_str(), Some(hash));
    }

    #[tokio::test]
    async fn rejects_garbage() {
        let exporter = WhosOnFirstExporter::default();
        assert!(matches!(
            exporter.export(b"not json").await,
            Err(ExportError::Record(_))
        ));
    }
}
