//! Data types shared across the pipeline stages.

use serde::{Deserialize, Serialize};

/// A coordinate row read from a source table.
///
/// Two coordinates with the same latitude and longitude are the same request
/// unit regardless of `id`. Only the position is sent to the elevation API.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Coordinate {
    #[serde(skip_serializing)]
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }

    /// Hashable identity of the position. `-0.0` and `0.0` map to the same key.
    pub fn key(&self) -> (u64, u64) {
        position_key(self.latitude, self.longitude)
    }
}

pub(crate) fn position_key(latitude: f64, longitude: f64) -> (u64, u64) {
    ((latitude + 0.0).to_bits(), (longitude + 0.0).to_bits())
}

/// One outbound request body: `{"locations": [{"latitude": .., "longitude": ..}, ..]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LocationBatch {
    pub locations: Vec<Coordinate>,
}

impl LocationBatch {
    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    /// Exact byte length of the JSON request body.
    pub fn encoded_len(&self) -> serde_json::Result<usize> {
        Ok(serde_json::to_vec(self)?.len())
    }
}

/// A single elevation returned by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElevationPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub elevation: f64,
}

impl ElevationPoint {
    pub fn key(&self) -> (u64, u64) {
        position_key(self.latitude, self.longitude)
    }
}

/// The finalized, deduplicated union of all batch results.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ElevationResultSet {
    pub points: Vec<ElevationPoint>,
}

impl ElevationResultSet {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ElevationPoint> {
        self.points.iter()
    }
}

impl<'a> IntoIterator for &'a ElevationResultSet {
    type Item = &'a ElevationPoint;
    type IntoIter = std::slice::Iter<'a, ElevationPoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_serializes_without_ids() {
        let batch = LocationBatch {
            locations: vec![Coordinate::new("8220DB000002", 53.35, -6.26)],
        };
        let json = serde_json::to_string(&batch).unwrap();
        assert_eq!(json, r#"{"locations":[{"latitude":53.35,"longitude":-6.26}]}"#);
        assert_eq!(batch.encoded_len().unwrap(), json.len());
    }

    #[test]
    fn test_signed_zero_shares_key() {
        let a = Coordinate::new("a", 0.0, -0.0);
        let b = Coordinate::new("b", -0.0, 0.0);
        assert_eq!(a.key(), b.key());
    }

    #[test]
    fn test_result_set_serializes_as_array() {
        let set = ElevationResultSet {
            points: vec![ElevationPoint {
                latitude: 1.0,
                longitude: 2.0,
                elevation: 3.5,
            }],
        };
        let json = serde_json::to_string(&set).unwrap();
        assert!(json.starts_with('['));
        assert!(json.contains("\"elevation\":3.5"));
    }
}
