//! Error types for the elevation collection pipeline.
//!
//! Each stage has its own error so callers can tell a misconfigured batch
//! budget apart from a flaky API or an unreachable store.

use thiserror::Error;

/// Failure while packing coordinates into request batches.
#[derive(Error, Debug)]
pub enum PackError {
    /// A sealed batch serialized to at least the hard ceiling.
    #[error("batch {index} serializes to {size} bytes (hard ceiling {ceiling}); reduce the size budget")]
    OversizedBatch {
        index: usize,
        size: usize,
        ceiling: usize,
    },

    #[error("failed to serialize batch: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Failure of a single elevation request, or of a batch once retries run out.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("could not build elevation request: {0}")]
    InvalidRequest(String),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("elevation API returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("elevation API returned an unreadable body: {0}")]
    Body(String),

    /// Every attempt for the batch failed; the batch is dropped.
    #[error("gave up after {attempts} attempts, last error: {last}")]
    RetriesExhausted {
        attempts: u32,
        last: Box<FetchError>,
    },
}

/// Failure while flattening API responses into the result set.
#[derive(Error, Debug)]
pub enum AggregateError {
    #[error("elevation record {record} has no usable `{field}` field")]
    MissingField { field: &'static str, record: usize },

    #[error("elevation response {response} is not a JSON object")]
    NotAnObject { response: usize },
}

/// Failure at the storage boundary, on either the read or the write side.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage for table `{table}` is unavailable: {source}")]
    StorageUnavailable {
        table: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("table `{table}` conflicts with an existing object: {reason}")]
    SchemaConflict { table: String, reason: String },

    #[error("table `{table}` row {row} is not a coordinate: {reason}")]
    MalformedRow {
        table: String,
        row: usize,
        reason: String,
    },
}

impl StorageError {
    pub fn unavailable(
        table: &str,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        StorageError::StorageUnavailable {
            table: table.to_string(),
            source: source.into(),
        }
    }
}

/// Fatal errors that abort a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Pack(#[from] PackError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("invalid configuration: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PackError::OversizedBatch {
            index: 3,
            size: 10_412,
            ceiling: 10_000,
        };
        assert!(err.to_string().contains("10412"));
        assert!(err.to_string().contains("batch 3"));

        let err = AggregateError::MissingField {
            field: "elevation",
            record: 7,
        };
        assert!(err.to_string().contains("`elevation`"));

        let err = StorageError::unavailable("stopElevations", "connection refused");
        assert!(err.to_string().contains("stopElevations"));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn test_retries_exhausted_reports_last_error() {
        let err = FetchError::RetriesExhausted {
            attempts: 5,
            last: Box::new(FetchError::Status {
                status: 503,
                body: "busy".into(),
            }),
        };
        let msg = err.to_string();
        assert!(msg.contains("5 attempts"));
        assert!(msg.contains("503"));
    }

    #[test]
    fn test_pipeline_error_is_transparent() {
        let err: PipelineError = StorageError::SchemaConflict {
            table: "elevations".into(),
            reason: "is a directory".into(),
        }
        .into();
        assert!(err.to_string().starts_with("table `elevations`"));
    }
}
