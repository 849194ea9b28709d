#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Placetype taxonomy and ancestor resolution.
//!
//! The taxonomy is a static DAG embedded at compile time from
//! `placetypes.toml`. Placetypes live in an arena indexed by
//! [`PlacetypeId`]; parent links are adjacency lists of ids, so the graph
//! never holds references to itself.
//!
//! [`Taxonomy::ancestors_for_roles`] returns the placetypes a record may be
//! enclosed by, most specific first. That order drives the point-in-polygon
//! loop, which stops at the first ancestor with a match.

use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use thiserror::Error;

const PLACETYPES_TOML: &str = include_str!("../placetypes.toml");

/// Roles used when no explicit role list is given.
pub const DEFAULT_ROLES: &[Role] = &[Role::Common, Role::Optional, Role::CommonOptional];

/// Errors from loading or querying the taxonomy.
#[derive(Debug, Error)]
pub enum PlacetypeError {
    /// The placetype name is not in the taxonomy.
    #[error("Unknown placetype '{0}'")]
    UnknownPlacetype(String),

    /// The role name is not one of the known roles.
    #[error("Unknown placetype role '{0}'")]
    UnknownRole(String),

    /// The taxonomy TOML failed to parse.
    #[error("Failed to parse placetype taxonomy: {0}")]
    Parse(#[from] toml::de::Error),

    /// A placetype names a parent that does not exist.
    #[error("Placetype '{placetype}' has unknown parent '{parent}'")]
    UnknownParent {
        /// The placetype declaring the parent.
        placetype: String,
        /// The missing parent name.
        parent: String,
    },

    /// A placetype is declared more than once.
    #[error("Placetype '{0}' is declared more than once")]
    Duplicate(String),

    /// The parent links contain a cycle.
    #[error("Placetype '{0}' is its own ancestor")]
    Cycle(String),
}

/// How commonly a placetype is used, which decides whether it is
/// eligible as a query candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Used everywhere (e.g. country, locality).
    Common,
    /// Used only in some places (e.g. macrohood).
    Optional,
    /// Common in some regions, optional elsewhere (e.g. county).
    CommonOptional,
}

impl Role {
    /// The role's name as written in the taxonomy.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Common => "common",
            Self::Optional => "optional",
            Self::CommonOptional => "common_optional",
        }
    }
}

impl FromStr for Role {
    type Err = PlacetypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "common" => Ok(Self::Common),
            "optional" => Ok(Self::Optional),
            "common_optional" => Ok(Self::CommonOptional),
            other => Err(PlacetypeError::UnknownRole(other.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Index of a placetype in the taxonomy arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PlacetypeId(usize);

/// A named category in the taxonomy.
#[derive(Debug, Clone)]
pub struct Placetype {
    id: PlacetypeId,
    name: String,
    role: Role,
    parents: Vec<PlacetypeId>,
    /// Longest parent chain to a root. Children always sit higher than
    /// their parents.
    height: usize,
}

impl Placetype {
    /// Arena id.
    #[must_use]
    pub const fn id(&self) -> PlacetypeId {
        self.id
    }

    /// Placetype name (e.g. `"neighbourhood"`).
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Role tag.
    #[must_use]
    pub const fn role(&self) -> Role {
        self.role
    }

    /// Direct parent ids, most specific first.
    #[must_use]
    pub fn parents(&self) -> &[PlacetypeId] {
        &self.parents
    }
}

#[derive(Debug, Deserialize)]
struct TaxonomyFile {
    placetype: Vec<PlacetypeEntry>,
}

#[derive(Debug, Deserialize)]
struct PlacetypeEntry {
    name: String,
    role: Role,
    #[serde(default)]
    parents: Vec<String>,
}

/// The placetype DAG.
#[derive(Debug, Clone)]
pub struct Taxonomy {
    placetypes: Vec<Placetype>,
    by_name: BTreeMap<String, PlacetypeId>,
}

impl Taxonomy {
    /// Parses a taxonomy from TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if the TOML is malformed, a name is declared twice,
    /// a parent is unknown, or the parent links form a cycle.
    pub fn from_toml(s: &str) -> Result<Self, PlacetypeError> {
        let file: TaxonomyFile = toml::from_str(s)?;

        let mut by_name = BTreeMap::new();
        for (idx, entry) in file.placetype.iter().enumerate() {
            if by_name
                .insert(entry.name.clone(), PlacetypeId(idx))
                .is_some()
            {
                return Err(PlacetypeError::Duplicate(entry.name.clone()));
            }
        }

        let mut parent_links = Vec::with_capacity(file.placetype.len());
        for entry in &file.placetype {
            let ids = entry
                .parents
                .iter()
                .map(|parent| {
                    by_name
                        .get(parent)
                        .map(|id: &PlacetypeId| id.0)
                        .ok_or_else(|| PlacetypeError::UnknownParent {
                            placetype: entry.name.clone(),
                            parent: parent.clone(),
                        })
                })
                .collect::<Result<Vec<_>, _>>()?;
            parent_links.push(ids);
        }

        let names: Vec<&str> = file.placetype.iter().map(|e| e.name.as_str()).collect();
        let heights = compute_heights(&parent_links, &names)?;

        let placetypes = file
            .placetype
            .into_iter()
            .zip(parent_links)
            .zip(heights)
            .enumerate()
            .map(|(idx, ((entry, parents), height))| Placetype {
                id: PlacetypeId(idx),
                name: entry.name,
                role: entry.role,
                parents: parents.into_iter().map(PlacetypeId).collect(),
                height,
            })
            .collect();

        Ok(Self {
            placetypes,
            by_name,
        })
    }

    /// Looks up a placetype by name.
    ///
    /// # Errors
    ///
    /// Returns [`PlacetypeError::UnknownPlacetype`] if the name is not in
    /// the taxonomy.
    pub fn get(&self, name: &str) -> Result<&Placetype, PlacetypeError> {
        self.by_name
            .get(name)
            .map(|id| &self.placetypes[id.0])
            .ok_or_else(|| PlacetypeError::UnknownPlacetype(name.to_string()))
    }

    /// Looks up a placetype by arena id.
    #[must_use]
    pub fn get_by_id(&self, id: PlacetypeId) -> Option<&Placetype> {
        self.placetypes.get(id.0)
    }

    /// Whether `name` is a known placetype.
    #[must_use]
    pub fn is_valid(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// All placetypes in declaration order.
    pub fn all(&self) -> impl Iterator<Item = &Placetype> {
        self.placetypes.iter()
    }

    /// Every ancestor of `name` whose role is in `roles`, most specific
    /// first.
    ///
    /// Ancestors with other roles are still walked through, so a record
    /// whose only direct parent is filtered out can still reach the
    /// placetypes above it. Ordering is by descending height in the DAG,
    /// ties broken by declaration order, which guarantees a placetype
    /// always precedes its own ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`PlacetypeError::UnknownPlacetype`] if `name` is not in the
    /// taxonomy.
    pub fn ancestors_for_roles(
        &self,
        name: &str,
        roles: &[Role],
    ) -> Result<Vec<&Placetype>, PlacetypeError> {
        let start = self.get(name)?;

        let mut seen = BTreeSet::new();
        let mut stack: Vec<PlacetypeId> = start.parents.clone();
        while let Some(id) = stack.pop() {
            if seen.insert(id) {
                stack.extend(self.placetypes[id.0].parents.iter().copied());
            }
        }

        let mut ancestors: Vec<&Placetype> = seen
            .into_iter()
            .map(|id| &self.placetypes[id.0])
            .filter(|pt| roles.contains(&pt.role))
            .collect();

        ancestors.sort_by(|a, b| b.height.cmp(&a.height).then(a.id.cmp(&b.id)));

        Ok(ancestors)
    }

    /// [`Self::ancestors_for_roles`] with [`DEFAULT_ROLES`].
    ///
    /// # Errors
    ///
    /// Returns [`PlacetypeError::UnknownPlacetype`] if `name` is not in the
    /// taxonomy.
    pub fn ancestors(&self, name: &str) -> Result<Vec<&Placetype>, PlacetypeError> {
        self.ancestors_for_roles(name, DEFAULT_ROLES)
    }
}

/// Longest path from each node to a root, rejecting cycles.
fn compute_heights(parents: &[Vec<usize>], names: &[&str]) -> Result<Vec<usize>, PlacetypeError> {
    #[derive(Clone, Copy, PartialEq, Eq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    fn visit(
        idx: usize,
        parents: &[Vec<usize>],
        names: &[&str],
        marks: &mut [Mark],
        heights: &mut [usize],
    ) -> Result<usize, PlacetypeError> {
        match marks[idx] {
            Mark::Done => return Ok(heights[idx]),
            Mark::Visiting => return Err(PlacetypeError::Cycle(names[idx].to_string())),
            Mark::New => {}
        }

        marks[idx] = Mark::Visiting;
        let mut height = 0;
        for &parent in &parents[idx] {
            height = height.max(visit(parent, parents, names, marks, heights)? + 1);
        }
        marks[idx] = Mark::Done;
        heights[idx] = height;

        Ok(height)
    }

    let mut marks = vec![Mark::New; parents.len()];
    let mut heights = vec![0; parents.len()];
    for idx in 0..parents.len() {
        visit(idx, parents, names, &mut marks, &mut heights)?;
    }

    Ok(heights)
}

static TAXONOMY: OnceLock<Arc<Taxonomy>> = OnceLock::new();

/// Returns the embedded taxonomy, parsed on first use.
///
/// # Panics
///
/// Panics if the embedded `placetypes.toml` is malformed (it is checked by
/// this crate's tests).
#[must_use]
pub fn taxonomy() -> Arc<Taxonomy> {
    TAXONOMY
        .get_or_init(|| {
            Arc::new(
                Taxonomy::from_toml(PLACETYPES_TOML)
                    .unwrap_or_else(|e| panic!("Failed to load embedded placetypes: {e}")),
            )
        })
        .clone()
}
