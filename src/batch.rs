//! Packs coordinates into request batches bounded by serialized size.
//!
//! Sizes are exact JSON byte lengths of the request body, computed
//! incrementally: the envelope, plus each record, plus one comma between
//! records.

use tracing::debug;

use crate::config::PipelineConfig;
use crate::error::PackError;
use crate::types::{Coordinate, LocationBatch};

/// Byte length of `{"locations":[]}`.
const ENVELOPE_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct BatchPacker {
    size_budget: usize,
    hard_ceiling: usize,
}

impl BatchPacker {
    pub fn new(size_budget: usize, hard_ceiling: usize) -> Self {
        Self {
            size_budget,
            hard_ceiling,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.size_budget, config.hard_ceiling)
    }

    /// Splits `coordinates` into batches, in input order.
    ///
    /// A coordinate whose addition brings the batch to the size budget or
    /// beyond still joins that batch, which is then sealed. A trailing
    /// partial batch is sealed at the end; empty input gives no batches.
    ///
    /// # Errors
    ///
    /// [`PackError::OversizedBatch`] if any sealed batch is not strictly
    /// below the hard ceiling.
    #[tracing::instrument(skip_all, fields(coordinates = coordinates.len()))]
    pub fn pack(&self, coordinates: Vec<Coordinate>) -> Result<Vec<LocationBatch>, PackError> {
        let mut batches = Vec::new();
        let mut current = LocationBatch::default();
        let mut current_len = ENVELOPE_LEN;

        for coordinate in coordinates {
            let record_len = serde_json::to_vec(&coordinate)?.len();
            let separator = usize::from(!current.is_empty());
            current_len += separator + record_len;
            current.locations.push(coordinate);

            if current_len >= self.size_budget {
                debug!(
                    index = batches.len(),
                    size = current_len,
                    locations = current.len(),
                    "Sealing batch"
                );
                batches.push(std::mem::take(&mut current));
                current_len = ENVELOPE_LEN;
            }
        }

        if !current.is_empty() {
            batches.push(current);
        }

        for (index, batch) in batches.iter().enumerate() {
            let size = batch.encoded_len()?;
            if size >= self.hard_ceiling {
                return Err(PackError::OversizedBatch {
                    index,
                    size,
                    ceiling: self.hard_ceiling,
                });
            }
        }

        Ok(batches)
    }
}

impl Default for BatchPacker {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coords(n: usize) -> Vec<Coordinate> {
        (0..n)
            .map(|i| {
                Coordinate::new(
                    format!("{i}"),
                    53.0 + i as f64 * 0.000_137,
                    -6.0 - i as f64 * 0.000_291,
                )
            })
            .collect()
    }

    fn encoded(coordinates: &[Coordinate]) -> usize {
        LocationBatch {
            locations: coordinates.to_vec(),
        }
        .encoded_len()
        .unwrap()
    }

    #[test]
    fn test_empty_input_gives_no_batches() {
        let batches = BatchPacker::default().pack(Vec::new()).unwrap();
        assert!(batches.is_empty());
    }

    #[test]
    fn test_envelope_len_matches_serde() {
        assert_eq!(LocationBatch::default().encoded_len().unwrap(), ENVELOPE_LEN);
    }

    #[test]
    fn test_every_coordinate_lands_in_exactly_one_batch() {
        let input = coords(2_000);
        let batches = BatchPacker::default().pack(input.clone()).unwrap();
        let flattened: Vec<_> = batches.iter().flat_map(|b| b.locations.clone()).collect();
        assert_eq!(flattened, input);
        assert!(batches.iter().all(|b| !b.is_empty()));
    }

    #[test]
    fn test_sealed_batches_reached_the_budget() {
        let packer = BatchPacker::new(9_700, 10_000);
        let batches = packer.pack(coords(5_000)).unwrap();
        assert!(batches.len() > 1);

        let (last, sealed) = batches.split_last().unwrap();
        for batch in sealed {
            let size = batch.encoded_len().unwrap();
            assert!(size >= 9_700, "sealed early at {size} bytes");
            assert!(size < 10_000);
        }
        assert!(last.encoded_len().unwrap() < 10_000);
    }

    #[test]
    fn test_coordinate_hitting_budget_exactly_is_kept() {
        let input = coords(3);
        let budget = encoded(&input[..2]);
        let batches = BatchPacker::new(budget, 10_000).pack(input.clone()).unwrap();

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].locations, input[..2]);
        assert_eq!(batches[1].locations, input[2..]);
    }

    #[test]
    fn test_one_byte_below_budget_does_not_seal() {
        let input = coords(3);
        let budget = encoded(&input[..2]) + 1;
        let batches = BatchPacker::new(budget, 10_000).pack(input.clone()).unwrap();

        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].locations, input);
    }

    #[test]
    fn test_incremental_size_matches_serialized_size() {
        let input = coords(40);
        for n in 1..=input.len() {
            let budget = encoded(&input[..n]);
            let batches = BatchPacker::new(budget, usize::MAX).pack(input.clone()).unwrap();
            assert_eq!(batches[0].len(), n);
        }
    }

    #[test]
    fn test_oversized_batch_is_fatal() {
        let err = BatchPacker::new(200, 100).pack(coords(10)).unwrap_err();
        match err {
            PackError::OversizedBatch { index, ceiling, .. } => {
                assert_eq!(index, 0);
                assert_eq!(ceiling, 100);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
