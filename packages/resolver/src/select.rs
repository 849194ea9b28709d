//! Policies that pick one parent out of a match set.

use std::str::FromStr;
use std::sync::Arc;

use pip_models::{Record, StandardPlaceResult};
use serde::{Deserialize, Serialize};

use crate::PipError;

/// Reduces a set of candidate parents to at most one.
///
/// The match loop doesn't care how the choice is made, so deployments can
/// plug in their own tie-breaking.
pub trait SelectionPolicy: Send + Sync {
    /// Picks the parent for `record` from `matches`. `Ok(None)` means "no
    /// parent", which leaves the record untouched.
    ///
    /// # Errors
    ///
    /// Implementations return an error when the match set is unacceptable.
    fn select(
        &self,
        record: &Record,
        matches: &[StandardPlaceResult],
    ) -> Result<Option<StandardPlaceResult>, PipError>;
}

/// Fails unless there is exactly one match.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactlyOne;

impl SelectionPolicy for ExactlyOne {
    fn select(
        &self,
        _record: &Record,
        matches: &[StandardPlaceResult],
    ) -> Result<Option<StandardPlaceResult>, PipError> {
        match matches {
            [only] => Ok(Some(only.clone())),
            _ => Err(PipError::AmbiguousOrEmptyMatch {
                count: matches.len(),
            }),
        }
    }
}

/// Takes the first match, or nothing if there are none.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstButForgiving;

impl SelectionPolicy for FirstButForgiving {
    fn select(
        &self,
        record: &Record,
        matches: &[StandardPlaceResult],
    ) -> Result<Option<StandardPlaceResult>, PipError> {
        if matches.len() > 1 {
            log::debug!(
                "{} candidate parents for {}; taking the first",
                matches.len(),
                record.id().map_or_else(|| "new record".to_string(), |id| id.to_string())
            );
        }
        Ok(matches.first().cloned())
    }
}

/// Named selection policies, for configuration.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelectionStrategy {
    /// [`FirstButForgiving`].
    #[default]
    First,
    /// [`ExactlyOne`].
    ExactlyOne,
}

impl SelectionStrategy {
    /// Builds the policy.
    #[must_use]
    pub fn policy(self) -> Arc<dyn SelectionPolicy> {
        match self {
            Self::First => Arc::new(FirstButForgiving),
            Self::ExactlyOne => Arc::new(ExactlyOne),
        }
    }
}

impl FromStr for SelectionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "first" => Ok(Self::First),
            "exactly-one" => Ok(Self::ExactlyOne),
            other => Err(format!(
                "unknown selection policy '{other}' (expected 'first' or 'exactly-one')"
            )),
        }
    }
}

impl std::fmt::Display for SelectionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::First => "first",
            Self::ExactlyOne => "exactly-one",
        })
    }
}
