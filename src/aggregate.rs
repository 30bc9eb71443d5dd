//! Flattens per-batch API responses into a single deduplicated result set.

use std::collections::HashSet;

use serde_json::{Map, Value};

use crate::elevation::ElevationResponse;
use crate::error::AggregateError;
use crate::types::{ElevationPoint, ElevationResultSet};

/// Collects the records of every successful batch for one run.
#[derive(Debug, Default)]
pub struct ResultAggregator {
    records: Vec<Map<String, Value>>,
    responses: usize,
}

impl ResultAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends the records of one response. Every list-valued entry of the
    /// top-level object is taken as a list of records; non-object elements
    /// are skipped.
    pub fn push(&mut self, response: ElevationResponse) {
        self.responses += 1;
        for (_, value) in response {
            if let Value::Array(items) = value {
                self.records.extend(items.into_iter().filter_map(|item| match item {
                    Value::Object(record) => Some(record),
                    _ => None,
                }));
            }
        }
    }

    /// Like [`push`](Self::push), for a response read back as a bare JSON value.
    pub fn push_value(&mut self, response: Value) -> Result<(), AggregateError> {
        match response {
            Value::Object(map) => {
                self.push(map);
                Ok(())
            }
            _ => Err(AggregateError::NotAnObject {
                response: self.responses,
            }),
        }
    }

    pub fn responses(&self) -> usize {
        self.responses
    }

    /// Records collected so far, before deduplication.
    pub fn raw_len(&self) -> usize {
        self.records.len()
    }

    /// Removes structurally identical records, keeping the first, and
    /// converts the rest into [`ElevationPoint`]s.
    ///
    /// # Errors
    ///
    /// [`AggregateError::MissingField`] if a retained record lacks a numeric
    /// `latitude`, `longitude` or `elevation`.
    pub fn finish(self) -> Result<ElevationResultSet, AggregateError> {
        let mut seen = HashSet::new();
        let mut points = Vec::with_capacity(self.records.len());

        for record in self.records {
            // serde_json maps are key-ordered, so equal records encode identically.
            if !seen.insert(Value::Object(record.clone()).to_string()) {
                continue;
            }
            let index = points.len();
            points.push(ElevationPoint {
                latitude: number(&record, "latitude", index)?,
                longitude: number(&record, "longitude", index)?,
                elevation: number(&record, "elevation", index)?,
            });
        }

        Ok(ElevationResultSet { points })
    }
}

fn number(
    record: &Map<String, Value>,
    field: &'static str,
    index: usize,
) -> Result<f64, AggregateError> {
    record
        .get(field)
        .and_then(Value::as_f64)
        .ok_or(AggregateError::MissingField {
            field,
            record: index,
        })
}
