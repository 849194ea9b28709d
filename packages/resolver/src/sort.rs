//! Ordering of query results for display.

use pip_models::StandardPlaceResult;

/// Reorders a list of results in place.
pub trait Sorter: Send + Sync {
    /// Sorts `results`.
    fn sort(&self, results: &mut [StandardPlaceResult]);
}

/// Orders results by name. Results sharing a name keep their relative
/// order, so the index's smallest-area-first order survives within a name.
#[derive(Debug, Default, Clone, Copy)]
pub struct NameSorter;

impl Sorter for NameSorter {
    fn sort(&self, results: &mut [StandardPlaceResult]) {
        results.sort_by(|a, b| a.name.cmp(&b.name));
    }
}
