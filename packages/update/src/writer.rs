//! Output sinks for updated records.
//!
//! A writer is chosen by URI:
//!
//! | URI | Writer |
//! |---|---|
//! | `null://` | [`NullWriter`] |
//! | `fs:///path/to/data` | [`FsWriter`] |
//! | `featurecollection://stdout` | [`FeatureCollectionWriter`] to stdout |
//! | `featurecollection:///path/out.geojson` | [`FeatureCollectionWriter`] to a file |

use std::path::PathBuf;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt as _;

use crate::UpdateError;

/// Destination for exported records.
///
/// The update loop holds its writer behind a lock, so implementations see
/// one call at a time.
#[async_trait]
pub trait Writer: Send + Sync {
    /// Writes the exported bytes of record `id`.
    async fn write(&mut self, id: i64, bytes: &[u8]) -> Result<(), UpdateError>;

    /// Flushes anything buffered. Called once after the last write.
    async fn close(&mut self) -> Result<(), UpdateError>;
}

/// Creates the writer for `uri`.
///
/// # Errors
///
/// Returns [`UpdateError::WriterUri`] for an unrecognized scheme or a
/// missing path.
pub fn writer_from_uri(uri: &str) -> Result<Box<dyn Writer>, UpdateError> {
    let unsupported = || UpdateError::WriterUri(uri.to_string());

    let (scheme, rest) = uri.split_once("://").ok_or_else(unsupported)?;

    match scheme {
        "null" => Ok(Box::new(NullWriter)),
        "fs" if !rest.is_empty() => Ok(Box::new(FsWriter::new(rest))),
        "featurecollection" if rest == "stdout" => {
            Ok(Box::new(FeatureCollectionWriter::stdout()))
        }
        "featurecollection" if !rest.is_empty() => {
            Ok(Box::new(FeatureCollectionWriter::file(rest)))
        }
        _ => Err(unsupported()),
    }
}

/// Relative path of record `id` in a Who's On First data tree: the id's
/// digits in groups of three, then the file name.
/// `1234567` becomes `123/456/7/1234567.geojson`.
///
/// # Errors
///
/// Returns [`UpdateError::InvalidId`] for negative ids.
pub fn id_to_path(id: i64) -> Result<PathBuf, UpdateError> {
    if id < 0 {
        return Err(UpdateError::InvalidId(id));
    }

    let digits: Vec<char> = id.to_string().chars().collect();
    let mut path: PathBuf = digits
        .chunks(3)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect();
    path.push(format!("{id}.geojson"));

    Ok(path)
}

/// Discards everything.
#[derive(Debug, Default)]
pub struct NullWriter;

#[async_trait]
impl Writer for NullWriter {
    async fn write(&mut self, _id: i64, _bytes: &[u8]) -> Result<(), UpdateError> {
        Ok(())
    }

    async fn close(&mut self) -> Result<(), UpdateError> {
        Ok(())
    }
}

/// Writes each record to its own file under a root directory, using
/// [`id_to_path`]. Existing files are replaced.
#[derive(Debug)]
pub struct FsWriter {
    root: PathBuf,
}

impl FsWriter {
    /// Writes under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl Writer for FsWriter {
    async fn write(&mut self, id: i64, bytes: &[u8]) -> Result<(), UpdateError> {
        let path = self.root.join(id_to_path(id)?);

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| UpdateError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| UpdateError::Io { path, source })
    }

    async fn close(&mut self) -> Result<(), UpdateError> {
        Ok(())
    }
}

#[derive(Debug)]
enum Target {
    Stdout,
    File(PathBuf),
}

/// Buffers every record and writes a single `FeatureCollection` on close.
#[derive(Debug)]
pub struct FeatureCollectionWriter {
    target: Target,
    features: Vec<serde_json::Value>,
}

impl FeatureCollectionWriter {
    /// Writes the collection to stdout.
    #[must_use]
    pub const fn stdout() -> Self {
        Self {
            target: Target::Stdout,
            features: Vec::new(),
        }
    }

    /// Writes the collection to `path`.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            target: Target::File(path.into()),
            features: Vec::new(),
        }
    }

    fn target_path(&self) -> PathBuf {
        match &self.target {
            Target::Stdout => PathBuf::from("<stdout>"),
            Target::File(path) => path.clone(),
        }
    }
}

#[async_trait]
impl Writer for FeatureCollectionWriter {
    async fn write(&mut self, id: i64, bytes: &[u8]) -> Result<(), UpdateError> {
        let feature = serde_json::from_slice(bytes).map_err(|e| UpdateError::Serialize {
            id: Some(id),
            message: e.to_string(),
        })?;
        self.features.push(feature);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), UpdateError> {
        let collection = serde_json::json!({
            "type": "FeatureCollection",
            "features": std::mem::take(&mut self.features),
        });
        let mut bytes =
            serde_json::to_vec_pretty(&collection).map_err(|e| UpdateError::Serialize {
                id: None,
                message: e.to_string(),
            })?;
        bytes.push(b'\n');

        let io_err = |source| UpdateError::Io {
            path: self.target_path(),
            source,
        };

        match &self.target {
            Target::Stdout => {
                let mut stdout = tokio::io::stdout();
                stdout.write_all(&bytes).await.map_err(io_err)?;
                stdout.flush().await.map_err(io_err)
            }
            Target::File(path) => tokio::fs::write(path, &bytes).await.map_err(io_err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(id: i64) -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "type": "Feature",
            "id": id,
            "geometry": { "type": "Point", "coordinates": [0.0, 0.0] },
            "properties": { "wof:id": id }
        }))
        .unwrap()
    }

    #[test]
    fn maps_ids_to_nested_paths() {
        assert_eq!(
            id_to_path(1_234_567).unwrap(),
            PathBuf::from("123/456/7/1234567.geojson")
        );
        assert_eq!(
            id_to_path(85_922_583).unwrap(),
            PathBuf::from("859/225/83/85922583.geojson")
        );
        assert_eq!(id_to_path(42).unwrap(), PathBuf::from("42/42.geojson"));
        assert!(matches!(id_to_path(-1), Err(UpdateError::InvalidId(-1))));
    }

    #[test]
    fn parses_writer_uris() {
        assert!(writer_from_uri("null://").is_ok());
        assert!(writer_from_uri("fs:///tmp/out").is_ok());
        assert!(writer_from_uri("featurecollection://stdout").is_ok());
        assert!(writer_from_uri("featurecollection:///tmp/out.geojson").is_ok());

        for bad in ["fs://", "s3://bucket", "/tmp/out", "featurecollection://"] {
            assert!(
                matches!(writer_from_uri(bad), Err(UpdateError::WriterUri(_))),
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn fs_writer_uses_id_layout() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = FsWriter::new(dir.path());

        writer.write(1_234_567, &feature(1_234_567)).await.unwrap();
        writer.close().await.unwrap();

        let written = std::fs::read(dir.path().join("123/456/7/1234567.geojson")).unwrap();
        assert_eq!(written, feature(1_234_567));
    }

    #[tokio::test]
    async fn feature_collection_writer_buffers_until_close() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("out.geojson");
        let mut writer = FeatureCollectionWriter::file(&out);

        writer.write(1, &feature(1)).await.unwrap();
        writer.write(2, &feature(2)).await.unwrap();
        assert!(!out.exists());

        writer.close().await.unwrap();

        let body: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&out).unwrap()).unwrap();
        assert_eq!(body["type"], "FeatureCollection");
        assert_eq!(body["features"].as_array().unwrap().len(), 2);
        assert_eq!(body["features"][1]["id"], 2);
    }

    #[tokio::test]
    async fn feature_collection_writer_rejects_non_json() {
        let mut writer = FeatureCollectionWriter::stdout();
        assert!(matches!(
            writer.write(9, b"<xml/>").await,
            Err(UpdateError::Serialize { id: Some(9), .. })
        ));
    }
}
