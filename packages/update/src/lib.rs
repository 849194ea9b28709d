#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Batch parent resolution.
//!
//! [`UpdateApplication::run`] works in three phases:
//!
//! 1. Index every spatial source. Resolution doesn't start until the index
//!    is complete.
//! 2. Resolve each target record, several at a time. A record is read,
//!    resolved, merged, optionally superseded, and exported entirely in
//!    memory; only then are its results handed to the writer.
//! 3. Close the writer.
//!
//! A failing record is logged and counted, and the run carries on unless
//! `fail_fast` is set.

pub mod iterate;
pub mod options;
pub mod progress;
pub mod writer;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt as _};
use pip_centroid::mapshaper::MapshaperClient;
use pip_centroid::{CentroidError, CentroidService};
use pip_models::{Record, RecordError};
use pip_resolver::export::{ExportError, IdProvider, RandomIdProvider, SequenceIdProvider};
use pip_resolver::{
    Exporter, PipError, PointInPolygonTool, SelectionPolicy, WhosOnFirstExporter, supersede,
};
use pip_spatial::SpatialError;
use thiserror::Error;
use tokio::sync::Mutex;

pub use options::UpdateOptions;
pub use progress::{NullProgress, ProgressCallback, null_progress};
pub use writer::{Writer, writer_from_uri};

/// How long to wait for the centroid service on each request.
const CENTROID_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors from an update run.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// Filesystem failure.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A file isn't a valid record.
    #[error("Invalid record {}: {source}", .path.display())]
    Record {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: RecordError,
    },

    /// A spatial source record couldn't be indexed.
    #[error("Failed to index {}: {source}", .path.display())]
    Index {
        /// Offending file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: SpatialError,
    },

    /// Resolution failed.
    #[error(transparent)]
    Pip(#[from] PipError),

    /// The centroid service is unreachable.
    #[error("Centroid service unavailable: {0}")]
    Centroid(#[from] CentroidError),

    /// Exporting failed.
    #[error(transparent)]
    Export(#[from] ExportError),

    /// Writer output couldn't be (de)serialized.
    #[error(
        "Serialization failed{}: {message}",
        .id.map(|id| format!(" for record {id}")).unwrap_or_default()
    )]
    Serialize {
        /// Record involved, if any.
        id: Option<i64>,
        /// Description of the failure.
        message: String,
    },

    /// The options file doesn't parse.
    #[error("Invalid configuration: {0}")]
    Config(#[from] toml::de::Error),

    /// The options are inconsistent.
    #[error("Invalid options: {0}")]
    InvalidOptions(String),

    /// No writer matches the URI.
    #[error("Unsupported writer URI '{0}'")]
    WriterUri(String),

    /// A record id can't be turned into a file path.
    #[error("Record id {0} can't be mapped to a path")]
    InvalidId(i64),

    /// A record took longer than the per-record limit.
    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    /// Wraps the first failure when running with `fail_fast`.
    #[error("Failed to update {}: {source}", .path.display())]
    RecordFailed {
        /// Target file.
        path: PathBuf,
        /// What went wrong.
        #[source]
        source: Box<Self>,
    },
}

/// Counts from a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateSummary {
    /// Target records attempted.
    pub processed: usize,
    /// Records rewritten with a new parent or hierarchy.
    pub updated: usize,
    /// Records retired in favour of a replacement.
    pub superseded: usize,
    /// Records whose resolution changed nothing. These aren't rewritten.
    pub unchanged: usize,
    /// Records that failed.
    pub failed: usize,
}

/// What resolving one record produced.
enum Outcome {
    Unchanged,
    Updated(Vec<(i64, Vec<u8>)>),
    Superseded(Vec<(i64, Vec<u8>)>),
}

/// Runs batch updates with fixed options.
pub struct UpdateApplication {
    options: UpdateOptions,
    progress: Arc<dyn ProgressCallback>,
    centroids: Option<Arc<dyn CentroidService>>,
}

impl UpdateApplication {
    /// Creates an application that reports no progress.
    #[must_use]
    pub fn new(options: UpdateOptions) -> Self {
        Self {
            options,
            progress: null_progress(),
            centroids: None,
        }
    }

    /// Reports per-record progress to `progress`.
    #[must_use]
    pub fn with_progress(mut self, progress: Arc<dyn ProgressCallback>) -> Self {
        self.progress = progress;
        self
    }

    /// Computes polygon centroids with `centroids` instead of the
    /// configured mapshaper server.
    #[must_use]
    pub fn with_centroid_service(mut self, centroids: Arc<dyn CentroidService>) -> Self {
        self.centroids = Some(centroids);
        self
    }

    /// The options this application runs with.
    #[must_use]
    pub const fn options(&self) -> &UpdateOptions {
        &self.options
    }

    /// Indexes the spatial sources, then resolves every record under
    /// `paths`.
    ///
    /// # Errors
    ///
    /// Fails before resolving anything if the options are invalid, a
    /// spatial source can't be indexed, the centroid service doesn't answer
    /// a ping, or the writer URI is unsupported. With `fail_fast`, also
    /// fails with [`UpdateError::RecordFailed`] on the first bad record,
    /// after the records already in flight finish and the writer is closed.
    /// Closing the writer can fail too.
    pub async fn run(&self, paths: &[PathBuf]) -> Result<UpdateSummary, UpdateError> {
        self.options.validate()?;
        let start = Instant::now();

        let writer = writer_from_uri(&self.options.writer_uri)?;

        self.progress.set_message("Indexing spatial sources".to_string());
        let index = Arc::new(iterate::build_index(&self.options.spatial_sources).await?);
        let mut tool =
            PointInPolygonTool::new(index.clone(), index).with_roles(self.options.roles.clone());

        if let Some(centroids) = &self.centroids {
            tool = tool.with_centroid_service(centroids.clone());
        } else if let Some(url) = &self.options.mapshaper_server {
            let client = MapshaperClient::new(url, CENTROID_TIMEOUT)?;
            client.ping().await?;
            log::info!("Using centroid service at {}", client.base_url());
            tool = tool.with_centroid_service(Arc::new(client) as Arc<dyn CentroidService>);
        }

        let ids: Box<dyn IdProvider> = match self.options.id_seed {
            Some(seed) => Box::new(SequenceIdProvider::new(seed)),
            None => Box::new(RandomIdProvider),
        };
        let exporter = WhosOnFirstExporter::new(ids);
        let policy = self.options.selection.policy();

        let targets = iterate::discover(paths)?;
        log::info!(
            "Resolving {} record(s) with concurrency {} ({} selection)",
            targets.len(),
            self.options.concurrency,
            self.options.selection
        );
        self.progress.set_message("Resolving records".to_string());
        self.progress.set_total(targets.len() as u64);

        let writer = Mutex::new(writer);
        let stop = AtomicBool::new(false);
        let (summary, first_failure) = {
            let resolver = RecordResolver {
                tool: &tool,
                exporter: &exporter,
                policy: policy.as_ref(),
                options: &self.options,
            };

            let mut results = stream::iter(targets.iter().map(|path| {
                let resolver = &resolver;
                let writer = &writer;
                let stop = &stop;
                async move {
                    if stop.load(Ordering::Relaxed) {
                        return (path, None);
                    }
                    let result = match resolver.resolve_within_limit(path).await {
                        Ok(outcome) => write_outcome(writer, outcome).await,
                        Err(e) => Err(e),
                    };
                    (path, Some(result))
                }
            }))
            .buffer_unordered(self.options.concurrency);

            // After a fail-fast failure, records not yet started are skipped
            // but those in flight run to completion, so no record is left
            // half written.
            let mut summary = UpdateSummary::default();
            let mut first_failure = None;
            while let Some((path, result)) = results.next().await {
                let Some(result) = result else {
                    continue;
                };
                summary.processed += 1;
                self.progress.inc(1);

                match result {
                    Ok(Outcome::Unchanged) => summary.unchanged += 1,
                    Ok(Outcome::Updated(_)) => summary.updated += 1,
                    Ok(Outcome::Superseded(_)) => summary.superseded += 1,
                    Err(e) => {
                        summary.failed += 1;
                        log::error!("Failed to update {}: {e}", path.display());
                        if self.options.fail_fast && first_failure.is_none() {
                            stop.store(true, Ordering::Relaxed);
                            first_failure = Some(UpdateError::RecordFailed {
                                path: path.clone(),
                                source: Box::new(e),
                            });
                        }
                    }
                }
            }
            (summary, first_failure)
        };

        writer.into_inner().close().await?;

        let message = format!(
            "{} updated, {} superseded, {} unchanged, {} failed",
            summary.updated, summary.superseded, summary.unchanged, summary.failed
        );
        log::info!(
            "Processed {} record(s) in {:.1}s: {message}",
            summary.processed,
            start.elapsed().as_secs_f64()
        );
        self.progress.finish(message);

        match first_failure {
            Some(e) => Err(e),
            None => Ok(summary),
        }
    }
}

/// Everything needed to resolve one record, shared by all in-flight records.
struct RecordResolver<'a> {
    tool: &'a PointInPolygonTool,
    exporter: &'a WhosOnFirstExporter,
    policy: &'a dyn SelectionPolicy,
    options: &'a UpdateOptions,
}

impl RecordResolver<'_> {
    async fn resolve_within_limit(&self, path: &Path) -> Result<Outcome, UpdateError> {
        match self.options.timeout() {
            Some(limit) => tokio::time::timeout(limit, self.resolve(path))
                .await
                .map_err(|_| UpdateError::Timeout(limit))?,
            None => self.resolve(path).await,
        }
    }

    /// Reads, resolves and exports one record without writing anything.
    async fn resolve(&self, path: &Path) -> Result<Outcome, UpdateError> {
        let record = iterate::read_record(path).await?;
        let resolved = self
            .tool
            .point_in_polygon_and_update(record.clone(), &self.options.filter, self.policy)
            .await?;

        if resolved == record {
            log::debug!("{}: unchanged", path.display());
            return Ok(Outcome::Unchanged);
        }

        if self.options.supersede {
            if let Some(s) =
                supersede(&record, &resolved, self.tool.reader(), self.exporter).await?
            {
                let old_id = s.old_record.id().ok_or(PipError::MissingId)?;
                let old_bytes = self.exporter.export_record(s.old_record)?;
                let new_bytes = self.exporter.export_record(s.new_record)?;
                log::debug!("{}: superseded {old_id} by {}", path.display(), s.new_id);
                return Ok(Outcome::Superseded(vec![
                    (s.new_id, new_bytes),
                    (old_id, old_bytes),
                ]));
            }
        }

        let bytes = resolved.to_bytes().map_err(|source| UpdateError::Record {
            path: path.to_path_buf(),
            source,
        })?;
        let exported = self.exporter.export(&bytes).await?;
        let id = Record::from_bytes(&exported)
            .map_err(|source| UpdateError::Record {
                path: path.to_path_buf(),
                source,
            })?
            .id()
            .ok_or(PipError::MissingId)?;

        log::debug!(
            "{}: parent {}",
            path.display(),
            resolved.parent_id().unwrap_or(-1)
        );

        Ok(Outcome::Updated(vec![(id, exported)]))
    }
}

async fn write_outcome(
    writer: &Mutex<Box<dyn Writer>>,
    outcome: Outcome,
) -> Result<Outcome, UpdateError> {
    let writes = match &outcome {
        Outcome::Unchanged => return Ok(outcome),
        Outcome::Updated(writes) | Outcome::Superseded(writes) => writes,
    };

    let mut writer = writer.lock().await;
    for (id, bytes) in writes {
        writer.write(*id, bytes).await?;
    }
    drop(writer);

    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use geojson::FeatureCollection;
    use pip_models::Existential;
    use pip_placetypes::Role;
    use pip_resolver::SelectionStrategy;

    use super::*;

    /// Never answers within any reasonable limit.
    struct StalledCentroids;

    #[async_trait]
    impl CentroidService for StalledCentroids {
        async fn append_centroids(
            &self,
            collection: FeatureCollection,
        ) -> Result<FeatureCollection, CentroidError> {
            tokio::time::sleep(Duration::from_secs(600)).await;
            Ok(collection)
        }
    }

    struct Fixture {
        dir: tempfile::TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            let fixture = Self {
                dir: tempfile::tempdir().unwrap(),
            };
            fixture.write(
                "admin/85865899.geojson",
                &serde_json::json!({
                    "type": "Feature",
                    "geometry": {
                        "type": "Polygon",
                        "coordinates": [[
                            [-122.5, 37.7], [-122.3, 37.7], [-122.3, 37.8],
                            [-122.5, 37.8], [-122.5, 37.7]
                        ]]
                    },
                    "properties": {
                        "wof:id": 85_865_899,
                        "wof:name": "Mission",
                        "wof:placetype": "neighbourhood",
                        "wof:country": "US",
                        "mz:is_current": 1,
                        "edtf:inception": "2010",
                        "wof:hierarchy": [{
                            "neighbourhood_id": 85_865_899,
                            "locality_id": 85_922_583
                        }]
                    }
                }),
            );
            fixture
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn write(&self, rel: &str, body: &serde_json::Value) {
            let path = self.path(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body.to_string()).unwrap();
        }

        fn venue(&self, rel: &str, id: i64, coordinates: [f64; 2], parent_id: i64) {
            self.write(
                rel,
                &serde_json::json!({
                    "type": "Feature",
                    "geometry": { "type": "Point", "coordinates": coordinates },
                    "properties": {
                        "wof:id": id,
                        "wof:placetype": "venue",
                        "wof:parent_id": parent_id,
                        "mz:is_current": 1
                    }
                }),
            );
        }

        fn options(&self) -> UpdateOptions {
            UpdateOptions {
                spatial_sources: vec![self.path("admin")],
                writer_uri: format!("fs://{}", self.path("out").display()),
                id_seed: Some(9000),
                ..UpdateOptions::default()
            }
        }

        fn output(&self, id: i64) -> Record {
            let rel = writer::id_to_path(id).unwrap();
            Record::from_bytes(&std::fs::read(self.path("out").join(rel)).unwrap()).unwrap()
        }
    }

    #[tokio::test]
    async fn updates_records_inside_a_boundary() {
        let fx = Fixture::new();
        fx.venue("targets/1.geojson", 1_001, [-122.41, 37.77], -1);
        fx.venue("targets/2.geojson", 1_002, [-100.0, 40.0], -1);

        let summary = UpdateApplication::new(fx.options())
            .run(&[fx.path("targets")])
            .await
            .unwrap();

        assert_eq!(
            summary,
            UpdateSummary {
                processed: 2,
                updated: 1,
                unchanged: 1,
                ..UpdateSummary::default()
            }
        );

        let updated = fx.output(1_001);
        assert_eq!(updated.parent_id(), Some(85_865_899));
        assert_eq!(updated.country(), Some("US"));
        assert!(!fx.path("out").join(writer::id_to_path(1_002).unwrap()).exists());
    }

    #[tokio::test]
    async fn supersedes_records_whose_parent_changed() {
        let fx = Fixture::new();
        fx.venue("targets/1.geojson", 1_001, [-122.41, 37.77], 100);

        let options = UpdateOptions {
            supersede: true,
            ..fx.options()
        };
        let summary = UpdateApplication::new(options)
            .run(&[fx.path("targets")])
            .await
            .unwrap();
        assert_eq!(summary.superseded, 1);

        let new = fx.output(9000);
        assert_eq!(new.parent_id(), Some(85_865_899));
        assert_eq!(new.supersedes(), vec![1_001]);
        assert_eq!(new.inception(), Some("2010"));

        let old = fx.output(1_001);
        assert_eq!(old.parent_id(), Some(100));
        assert_eq!(old.is_current(), Existential::False);
        assert_eq!(old.superseded_by(), vec![9000]);
        assert_eq!(old.cessation(), Some("2010"));
    }

    #[tokio::test]
    async fn failures_are_counted_or_fatal() {
        let fx = Fixture::new();
        fx.venue("targets/1.geojson", 1_001, [-122.41, 37.77], -1);
        fx.write(
            "targets/2.geojson",
            &serde_json::json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [-122.41, 37.77] },
                "properties": { "wof:id": 1_002, "wof:placetype": "spaceport" }
            }),
        );

        let summary = UpdateApplication::new(fx.options())
            .run(&[fx.path("targets")])
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.updated, 1);

        let options = UpdateOptions {
            fail_fast: true,
            concurrency: 1,
            ..fx.options()
        };
        let err = UpdateApplication::new(options)
            .run(&[fx.path("targets/2.geojson")])
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::RecordFailed { .. }));
    }

    #[tokio::test]
    async fn fail_fast_still_flushes_buffered_output() {
        let fx = Fixture::new();
        fx.venue("targets/1.geojson", 1_001, [-122.41, 37.77], -1);
        fx.write(
            "targets/2.geojson",
            &serde_json::json!({
                "type": "Feature",
                "geometry": { "type": "Point", "coordinates": [-122.41, 37.77] },
                "properties": { "wof:id": 1_002, "wof:placetype": "spaceport" }
            }),
        );

        let options = UpdateOptions {
            fail_fast: true,
            concurrency: 1,
            writer_uri: format!(
                "featurecollection://{}",
                fx.path("out.geojson").display()
            ),
            ..fx.options()
        };
        let err = UpdateApplication::new(options)
            .run(&[fx.path("targets")])
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::RecordFailed { .. }));

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(fx.path("out.geojson")).unwrap()).unwrap();
        let features = body["features"].as_array().unwrap();
        assert_eq!(features.len(), 1);
        assert_eq!(features[0]["properties"]["wof:id"], 1_001);
    }

    #[tokio::test]
    async fn timed_out_records_fail_without_writing() {
        let fx = Fixture::new();
        fx.write(
            "targets/1.geojson",
            &serde_json::json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-122.42, 37.76], [-122.40, 37.76], [-122.40, 37.78],
                        [-122.42, 37.78], [-122.42, 37.76]
                    ]]
                },
                "properties": { "wof:id": 1_003, "wof:placetype": "campus" }
            }),
        );

        let options = UpdateOptions {
            timeout_secs: Some(1),
            ..fx.options()
        };
        let summary = UpdateApplication::new(options.clone())
            .with_centroid_service(Arc::new(StalledCentroids))
            .run(&[fx.path("targets")])
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.processed, 1);
        assert!(!fx.path("out").exists());

        let err = UpdateApplication::new(UpdateOptions {
            fail_fast: true,
            ..options
        })
        .with_centroid_service(Arc::new(StalledCentroids))
        .run(&[fx.path("targets")])
        .await
        .unwrap_err();
        let UpdateError::RecordFailed { source, .. } = err else {
            panic!("expected a record failure");
        };
        assert!(matches!(*source, UpdateError::Timeout(_)));
    }

    #[tokio::test]
    async fn roles_limit_candidate_parents() {
        let fx = Fixture::new();
        fx.venue("targets/1.geojson", 1_001, [-122.41, 37.77], -1);

        let options = UpdateOptions {
            roles: vec![Role::Optional],
            ..fx.options()
        };
        let summary = UpdateApplication::new(options)
            .run(&[fx.path("targets")])
            .await
            .unwrap();
        assert_eq!(summary.unchanged, 1);
        assert!(!fx.path("out").exists());
    }

    #[tokio::test]
    async fn polygon_targets_need_a_centroid_service() {
        let fx = Fixture::new();
        fx.write(
            "targets/1.geojson",
            &serde_json::json!({
                "type": "Feature",
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[
                        [-122.42, 37.76], [-122.40, 37.76], [-122.40, 37.78],
                        [-122.42, 37.78], [-122.42, 37.76]
                    ]]
                },
                "properties": { "wof:id": 1_003, "wof:placetype": "campus" }
            }),
        );

        let summary = UpdateApplication::new(fx.options())
            .run(&[fx.path("targets")])
            .await
            .unwrap();
        assert_eq!(summary.failed, 1);
    }

    #[tokio::test]
    async fn exactly_one_with_a_single_match_updates() {
        let fx = Fixture::new();
        fx.venue("targets/1.geojson", 1_001, [-122.41, 37.77], -1);

        let options = UpdateOptions {
            selection: SelectionStrategy::ExactlyOne,
            writer_uri: format!(
                "featurecollection://{}",
                fx.path("out.geojson").display()
            ),
            ..fx.options()
        };
        let summary = UpdateApplication::new(options)
            .run(&[fx.path("targets")])
            .await
            .unwrap();
        assert_eq!(summary.updated, 1);

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(fx.path("out.geojson")).unwrap()).unwrap();
        assert_eq!(
            body["features"][0]["properties"]["wof:parent_id"],
            85_865_899
        );
    }

    #[tokio::test]
    async fn invalid_options_fail_up_front() {
        let err = UpdateApplication::new(UpdateOptions::default())
            .run(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, UpdateError::InvalidOptions(_)));
    }
}
