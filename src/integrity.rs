use std::collections::HashSet;

use crate::types::{Coordinate, ElevationResultSet};

/// Ids of source coordinates with no elevation at the same position, in
/// source order, each id at most once.
pub fn missing_elevations(sources: &[Coordinate], results: &ElevationResultSet) -> Vec<String> {
    let covered: HashSet<_> = results.iter().map(|p| p.key()).collect();
    let mut reported = HashSet::new();

    sources
        .iter()
        .filter(|c| !covered.contains(&c.key()))
        .filter(|c| reported.insert(c.id.as_str()))
        .map(|c| c.id.clone())
        .collect()
}
