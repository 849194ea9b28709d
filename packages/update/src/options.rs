//! Update run configuration.
//!
//! Options can be read from a TOML file and then adjusted by the caller
//! (the CLI applies its flags on top). Missing keys take their defaults:
//!
//! ```toml
//! spatial_sources = ["/data/whosonfirst-data-admin-us/data"]
//! mapshaper_server = "http://localhost:8080"
//! writer_uri = "fs:///data/out"
//! selection = "exactly-one"
//! concurrency = 16
//! timeout_secs = 30
//! roles = ["common", "common_optional"]
//!
//! [filter]
//! is_current = [1]
//! is_deprecated = [0]
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use pip_models::SprFilter;
use pip_placetypes::{DEFAULT_ROLES, Role};
use pip_resolver::SelectionStrategy;
use serde::{Deserialize, Serialize};

use crate::UpdateError;

/// Records resolved at once unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Everything an [`crate::UpdateApplication`] needs to know.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UpdateOptions {
    /// Files or directories of candidate parent records.
    pub spatial_sources: Vec<PathBuf>,
    /// Currency constraints applied to every spatial query. Its placetypes
    /// are ignored; the resolver sets one per candidate.
    pub filter: SprFilter,
    /// How to pick one parent from several matches.
    pub selection: SelectionStrategy,
    /// Placetype roles eligible as candidate parents.
    pub roles: Vec<Role>,
    /// Mapshaper server base URL, needed to resolve polygon records.
    pub mapshaper_server: Option<String>,
    /// Where results go (`null://`, `fs:///dir`, `featurecollection://stdout`,
    /// `featurecollection:///file.geojson`).
    pub writer_uri: String,
    /// Records resolved concurrently.
    pub concurrency: usize,
    /// Per-record time limit, in seconds.
    pub timeout_secs: Option<u64>,
    /// Supersede records whose parent changed instead of updating them in
    /// place.
    pub supersede: bool,
    /// Stop at the first failed record.
    pub fail_fast: bool,
    /// Mint new ids sequentially from this value instead of randomly.
    pub id_seed: Option<i64>,
}

impl Default for UpdateOptions {
    fn default() -> Self {
        Self {
            spatial_sources: Vec::new(),
            filter: SprFilter::default(),
            selection: SelectionStrategy::default(),
            roles: DEFAULT_ROLES.to_vec(),
            mapshaper_server: None,
            writer_uri: "null://".to_string(),
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: None,
            supersede: false,
            fail_fast: false,
            id_seed: None,
        }
    }
}

impl UpdateOptions {
    /// Parses options from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Config`] if the TOML is malformed or has
    /// unknown keys.
    pub fn from_toml(s: &str) -> Result<Self, UpdateError> {
        Ok(toml::from_str(s)?)
    }

    /// Reads options from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::Io`] if the file can't be read, or
    /// [`UpdateError::Config`] if it doesn't parse.
    pub fn load(path: &Path) -> Result<Self, UpdateError> {
        let text = std::fs::read_to_string(path).map_err(|source| UpdateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// The per-record time limit.
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Checks the options describe a runnable update.
    ///
    /// # Errors
    ///
    /// Returns [`UpdateError::InvalidOptions`] if there are no spatial
    /// sources, no roles, or concurrency is zero.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.spatial_sources.is_empty() {
            return Err(UpdateError::InvalidOptions(
                "at least one spatial source is required".to_string(),
            ));
        }
        if self.roles.is_empty() {
            return Err(UpdateError::InvalidOptions(
                "at least one placetype role is required".to_string(),
            ));
        }
        if self.concurrency == 0 {
            return Err(UpdateError::InvalidOptions(
                "concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use pip_models::Existential;

    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        assert_eq!(UpdateOptions::from_toml("").unwrap(), UpdateOptions::default());
    }

    #[test]
    fn parses_full_config() {
        let options = UpdateOptions::from_toml(
            r#"
            spatial_sources = ["/data/admin"]
            mapshaper_server = "http://localhost:8080"
            writer_uri = "fs:///data/out"
            selection = "exactly-one"
            concurrency = 16
            timeout_secs = 30
            supersede = true
            roles = ["common"]

            [filter]
            is_current = [1]
            is_deprecated = [0, -1]
            "#,
        )
        .unwrap();

        assert_eq!(options.spatial_sources, vec![PathBuf::from("/data/admin")]);
        assert_eq!(options.selection, SelectionStrategy::ExactlyOne);
        assert_eq!(options.concurrency, 16);
        assert_eq!(options.timeout(), Some(Duration::from_secs(30)));
        assert!(options.supersede);
        assert!(!options.fail_fast);
        assert_eq!(options.roles, vec![Role::Common]);
        assert_eq!(options.filter.is_current, vec![Existential::True]);
        assert_eq!(
            options.filter.is_deprecated,
            vec![Existential::False, Existential::Unknown]
        );
        assert!(options.filter.placetypes.is_empty());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(matches!(
            UpdateOptions::from_toml("concurency = 4"),
            Err(UpdateError::Config(_))
        ));
    }

    #[test]
    fn validation() {
        let mut options = UpdateOptions::default();
        assert!(options.validate().is_err());

        options.spatial_sources.push(PathBuf::from("/data"));
        assert!(options.validate().is_ok());

        options.roles.clear();
        assert!(matches!(
            options.validate(),
            Err(UpdateError::InvalidOptions(_))
        ));

        options.roles = DEFAULT_ROLES.to_vec();
        options.concurrency = 0;
        assert!(matches!(
            options.validate(),
            Err(UpdateError::InvalidOptions(_))
        ));
    }
}
