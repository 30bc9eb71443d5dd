//! Storage collaborators: where coordinates come from and where elevations go.
//!
//! [`CoordinateSource`] and [`ResultSink`] are the only contracts the
//! pipeline needs. [`CsvStore`] implements both over a directory of CSV
//! tables; [`S3Sink`] publishes results as JSON objects.

mod csv_store;
mod s3;

pub use csv_store::CsvStore;
pub use s3::S3Sink;

use async_trait::async_trait;

use crate::error::StorageError;
use crate::types::{Coordinate, ElevationResultSet};

/// How the id, latitude and longitude columns of a table are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnMap {
    Named {
        id: String,
        latitude: String,
        longitude: String,
    },
    /// First three columns, in id, latitude, longitude order.
    Positional,
}

impl ColumnMap {
    pub fn named(id: &str, latitude: &str, longitude: &str) -> Self {
        ColumnMap::Named {
            id: id.to_string(),
            latitude: latitude.to_string(),
            longitude: longitude.to_string(),
        }
    }
}

/// A source table and how to read coordinates out of it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub name: String,
    pub columns: ColumnMap,
}

impl TableSpec {
    pub fn new(name: &str, columns: ColumnMap) -> Self {
        Self {
            name: name.to_string(),
            columns,
        }
    }
}

#[async_trait]
pub trait CoordinateSource: Send + Sync {
    /// Returns every coordinate row of `table`, in stored order.
    async fn select_all(&self, table: &TableSpec) -> Result<Vec<Coordinate>, StorageError>;
}

#[async_trait]
pub trait ResultSink: Send + Sync {
    /// Replaces any existing `table` with `results`.
    async fn upload(&self, results: &ElevationResultSet, table: &str) -> Result<(), StorageError>;
}

#[async_trait]
impl<T: CoordinateSource + ?Sized> CoordinateSource for &T {
    async fn select_all(&self, table: &TableSpec) -> Result<Vec<Coordinate>, StorageError> {
        (**self).select_all(table).await
    }
}

#[async_trait]
impl<T: ResultSink + ?Sized> ResultSink for &T {
    async fn upload(&self, results: &ElevationResultSet, table: &str) -> Result<(), StorageError> {
        (**self).upload(results, table).await
    }
}

#[async_trait]
impl<T: ResultSink + ?Sized> ResultSink for Box<T> {
    async fn upload(&self, results: &ElevationResultSet, table: &str) -> Result<(), StorageError> {
        (**self).upload(results, table).await
    }
}
