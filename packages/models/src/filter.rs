//! Filter criteria applied to spatial query results.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::{Existential, StandardPlaceResult};

/// Constraints on which [`StandardPlaceResult`]s a query may return.
///
/// An empty placetype set or an empty flag list means "no constraint" for
/// that field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SprFilter {
    /// Accepted placetypes.
    pub placetypes: BTreeSet<String>,
    /// Accepted `is_current` values.
    pub is_current: Vec<Existential>,
    /// Accepted `is_ceased` values.
    pub is_ceased: Vec<Existential>,
    /// Accepted `is_deprecated` values.
    pub is_deprecated: Vec<Existential>,
    /// Accepted `is_superseded` values.
    pub is_superseded: Vec<Existential>,
    /// Accepted `is_superseding` values.
    pub is_superseding: Vec<Existential>,
}

impl SprFilter {
    /// Replaces the placetype set with a single placetype, leaving the
    /// currency constraints alone.
    pub fn set_placetype(&mut self, placetype: &str) {
        self.placetypes.clear();
        self.placetypes.insert(placetype.to_string());
    }

    /// Whether a result passes every constraint.
    #[must_use]
    pub fn matches(&self, spr: &StandardPlaceResult) -> bool {
        if !self.placetypes.is_empty() && !self.placetypes.contains(&spr.placetype) {
            return false;
        }

        accepts(&self.is_current, spr.is_current)
            && accepts(&self.is_ceased, spr.is_ceased)
            && accepts(&self.is_deprecated, spr.is_deprecated)
            && accepts(&self.is_superseded, spr.is_superseded)
            && accepts(&self.is_superseding, spr.is_superseding)
    }
}

fn accepts(allowed: &[Existential], value: Existential) -> bool {
    allowed.is_empty() || allowed.contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spr(placetype: &str, is_current: Existential) -> StandardPlaceResult {
        StandardPlaceResult {
            id: "1".to_string(),
            parent_id: -1,
            name: "Somewhere".to_string(),
            placetype: placetype.to_string(),
            country: "US".to_string(),
            inception: "uuuu".to_string(),
            cessation: "uuuu".to_string(),
            is_current,
            is_ceased: Existential::Unknown,
            is_deprecated: Existential::False,
            is_superseded: Existential::False,
            is_superseding: Existential::False,
            supersedes: Vec::new(),
            superseded_by: Vec::new(),
            hierarchies: Vec::new(),
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(SprFilter::default().matches(&spr("locality", Existential::Unknown)));
    }

    #[test]
    fn placetype_and_flags_must_all_match() {
        let mut filter = SprFilter {
            is_current: vec![Existential::True],
            ..SprFilter::default()
        };
        filter.set_placetype("locality");

        assert!(filter.matches(&spr("locality", Existential::True)));
        assert!(!filter.matches(&spr("locality", Existential::False)));
        assert!(!filter.matches(&spr("region", Existential::True)));
    }

    #[test]
    fn set_placetype_overwrites_and_keeps_flags() {
        let mut filter = SprFilter {
            is_current: vec![Existential::True, Existential::Unknown],
            ..SprFilter::default()
        };
        filter.set_placetype("building");
        filter.set_placetype("neighbourhood");

        assert_eq!(filter.placetypes.len(), 1);
        assert!(filter.placetypes.contains("neighbourhood"));
        assert_eq!(
            filter.is_current,
            vec![Existential::True, Existential::Unknown]
        );
    }
}
