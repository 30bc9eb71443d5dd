use std::collections::HashSet;

use crate::types::Coordinate;

/// Drops coordinates whose `(latitude, longitude)` was already seen, keeping
/// the first occurrence and the input order.
pub fn dedup_coordinates(coordinates: impl IntoIterator<Item = Coordinate>) -> Vec<Coordinate> {
    let mut seen = HashSet::new();
    coordinates
        .into_iter()
        .filter(|c| seen.insert(c.key()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input() {
        assert!(dedup_coordinates(Vec::new()).is_empty());
    }

    #[test]
    fn test_keeps_first_occurrence_across_tables() {
        let rows = vec![
            Coordinate::new("stop-1", 53.1, -6.1),
            Coordinate::new("stop-2", 53.2, -6.2),
            Coordinate::new("depot-1", 53.1, -6.1),
            Coordinate::new("stop-3", 53.3, -6.3),
        ];
        let out = dedup_coordinates(rows);
        let ids: Vec<_> = out.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, ["stop-1", "stop-2", "stop-3"]);
    }

    #[test]
    fn test_is_a_fixed_point() {
        let rows: Vec<_> = (0..50)
            .map(|i| Coordinate::new(format!("s{i}"), (i % 7) as f64, (i % 5) as f64))
            .collect();
        let once = dedup_coordinates(rows);
        let twice = dedup_coordinates(once.clone());
        assert_eq!(once, twice);
        assert_eq!(once.len(), 35);
    }
}
