//! Record discovery and the indexing phase.

use std::path::{Path, PathBuf};
use std::time::Instant;

use pip_models::Record;
use pip_spatial::{SpatialIndex, SpatialIndexBuilder};

use crate::UpdateError;

/// File extension of record files.
pub const RECORD_EXTENSION: &str = "geojson";

/// Marker in the file name of alternate-geometry records, which are never
/// resolved or indexed.
pub const ALT_MARKER: &str = "-alt-";

/// Expands files and directories into a sorted list of record files.
///
/// Directories are walked recursively and contribute every `.geojson` file
/// that isn't an alternate geometry. Paths naming a file are taken as-is.
///
/// # Errors
///
/// Returns [`UpdateError::Io`] if a path doesn't exist or a directory can't
/// be read.
pub fn discover(paths: &[PathBuf]) -> Result<Vec<PathBuf>, UpdateError> {
    let mut found = Vec::new();

    for path in paths {
        let metadata = std::fs::metadata(path).map_err(|source| UpdateError::Io {
            path: path.clone(),
            source,
        })?;

        if metadata.is_dir() {
            walk(path, &mut found)?;
        } else {
            found.push(path.clone());
        }
    }

    found.sort();
    found.dedup();
    Ok(found)
}

fn walk(dir: &Path, found: &mut Vec<PathBuf>) -> Result<(), UpdateError> {
    let io_err = |source| UpdateError::Io {
        path: dir.to_path_buf(),
        source,
    };

    for entry in std::fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            walk(&path, found)?;
        } else if is_record_file(&path) {
            found.push(path);
        }
    }

    Ok(())
}

/// Whether a file name looks like a primary record.
#[must_use]
pub fn is_record_file(path: &Path) -> bool {
    let has_extension = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(RECORD_EXTENSION));
    let is_alt = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.contains(ALT_MARKER));

    has_extension && !is_alt
}

/// Reads and parses one record file.
///
/// # Errors
///
/// Returns [`UpdateError::Io`] or [`UpdateError::Record`], with the path.
pub async fn read_record(path: &Path) -> Result<Record, UpdateError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| UpdateError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    Record::from_bytes(&bytes).map_err(|source| UpdateError::Record {
        path: path.to_path_buf(),
        source,
    })
}

/// Indexes every record under `sources` and builds the spatial index.
///
/// Nothing can be queried until this returns, so the whole index is in
/// place before the first record is resolved.
///
/// # Errors
///
/// Fails on the first unreadable, malformed, or unindexable record.
pub async fn build_index(sources: &[PathBuf]) -> Result<SpatialIndex, UpdateError> {
    let start = Instant::now();
    let files = discover(sources)?;

    log::info!("Indexing {} spatial source file(s)...", files.len());

    let mut builder = SpatialIndexBuilder::new();
    for path in &files {
        let record = read_record(path).await?;
        builder
            .index_record(record)
            .map_err(|source| UpdateError::Index {
                path: path.clone(),
                source,
            })?;
    }

    let index = builder.build();

    log::info!(
        "Indexed {} boundaries from {} records in {:.1}s",
        index.boundary_count(),
        index.record_count(),
        start.elapsed().as_secs_f64()
    );

    Ok(index)
}
