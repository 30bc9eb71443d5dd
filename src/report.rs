//! Run summary: what was attempted, what was dropped, what was persisted.
//!
//! Supports logging the report and appending it to a CSV history file.

use anyhow::Result;
use chrono::{DateTime, Utc};
use csv::WriterBuilder;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use tracing::{debug, info};

use crate::types::ElevationResultSet;

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub profile: String,
    pub table: String,
    pub coordinates_read: usize,
    pub unique_coordinates: usize,
    pub batches_attempted: usize,
    pub batches_dropped: usize,
    pub records_persisted: usize,

    // elevation summary
    pub elevation_mean: f64,
    pub elevation_stddev: f64,
    pub elevation_min: Option<f64>,
    pub elevation_max: Option<f64>,
}

impl RunReport {
    pub fn new(profile: &str, table: &str) -> Self {
        Self {
            started_at: Utc::now(),
            profile: profile.to_string(),
            table: table.to_string(),
            ..Self::default()
        }
    }

    /// Records what is about to be persisted and stamps the finish time.
    pub fn finish(&mut self, results: &ElevationResultSet) {
        let elevations: Vec<f64> = results.iter().map(|p| p.elevation).collect();
        let avg = mean(&elevations);

        self.records_persisted = results.len();
        self.elevation_mean = avg;
        self.elevation_stddev = stddev(&elevations, avg);
        self.elevation_min = elevations.iter().copied().reduce(f64::min);
        self.elevation_max = elevations.iter().copied().reduce(f64::max);
        self.finished_at = Utc::now();
    }

    pub fn log(&self) {
        info!(
            profile = %self.profile,
            table = %self.table,
            coordinates_read = self.coordinates_read,
            unique_coordinates = self.unique_coordinates,
            batches_attempted = self.batches_attempted,
            batches_dropped = self.batches_dropped,
            records_persisted = self.records_persisted,
            elevation_mean = self.elevation_mean,
            "Elevation run complete"
        );
    }
}

/// Appends a [`RunReport`] as a row to a CSV file.
///
/// Creates the file with headers if it does not already exist.
pub fn append_report(path: &Path, report: &RunReport) -> Result<()> {
    let file_exists = path.exists();
    debug!(path = %path.display(), file_exists, "Appending run report");

    let file = OpenOptions::new().append(true).create(true).open(path)?;

    let mut writer = WriterBuilder::new()
        .has_headers(!file_exists)
        .from_writer(file);

    writer.serialize(report)?;
    writer.flush()?;

    Ok(())
}

/// Arithmetic mean. Returns 0.0 for empty input.
fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation given a pre-computed mean.
fn stddev(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;

    variance.sqrt()
}
