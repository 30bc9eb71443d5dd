//! End-to-end elevation collection:
//! source -> dedup -> pack -> fetch (sequential, retried) -> aggregate -> sink.

use std::fmt;
use std::str::FromStr;

use tracing::{error, info, warn};

use crate::aggregate::ResultAggregator;
use crate::archive::{ArchiveManifest, ResponseArchive};
use crate::batch::BatchPacker;
use crate::config::PipelineConfig;
use crate::dedup::dedup_coordinates;
use crate::elevation::ElevationClient;
use crate::error::{AggregateError, PipelineError, StorageError};
use crate::fetch::HttpClient;
use crate::report::RunReport;
use crate::storage::{ColumnMap, CoordinateSource, ResultSink, TableSpec};
use crate::types::Coordinate;

/// What to collect elevations for, and where the results land.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    /// Bus stops plus depots, into `stopElevations`.
    Stops,
    /// Route shape points, into `elevations`.
    Shapes,
}

impl Profile {
    /// Source tables, merged in this order before deduplication.
    pub fn tables(&self) -> Vec<TableSpec> {
        match self {
            Profile::Stops => vec![
                TableSpec::new("stops", ColumnMap::named("stop_id", "stop_lat", "stop_lon")),
                TableSpec::new("depots", ColumnMap::Positional),
            ],
            Profile::Shapes => vec![TableSpec::new(
                "shapes",
                ColumnMap::named("shape_id", "shape_pt_lat", "shape_pt_lon"),
            )],
        }
    }

    pub fn destination(&self) -> &'static str {
        match self {
            Profile::Stops => "stopElevations",
            Profile::Shapes => "elevations",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Stops => "stops",
            Profile::Shapes => "shapes",
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "stops" => Ok(Profile::Stops),
            "shapes" => Ok(Profile::Shapes),
            other => Err(format!("unknown profile `{other}` (expected stops or shapes)")),
        }
    }
}

pub struct Pipeline<S, K, C> {
    config: PipelineConfig,
    source: S,
    sink: K,
    client: ElevationClient<C>,
    archive: Option<ResponseArchive>,
}

impl<S, K, C> Pipeline<S, K, C>
where
    S: CoordinateSource,
    K: ResultSink,
    C: HttpClient,
{
    pub fn new(config: PipelineConfig, source: S, sink: K, http: C) -> Result<Self, PipelineError> {
        config.validate()?;
        let client = ElevationClient::from_config(http, &config);
        Ok(Self {
            config,
            source,
            sink,
            client,
            archive: None,
        })
    }

    /// Keeps a copy of every successful response in `archive`.
    pub fn with_archive(mut self, archive: ResponseArchive) -> Self {
        self.archive = Some(archive);
        self
    }

    /// Reads all of the profile's source tables, in order.
    pub async fn load_coordinates(&self, profile: Profile) -> Result<Vec<Coordinate>, StorageError> {
        let mut rows = Vec::new();
        for table in profile.tables() {
            rows.extend(self.source.select_all(&table).await?);
        }
        Ok(rows)
    }

    /// Runs a full collection for `profile` and replaces its destination table.
    ///
    /// Batches that exhaust their retries are dropped and counted in the
    /// report; oversized batches, missing fields and storage failures abort
    /// the run.
    #[tracing::instrument(skip(self, profile), fields(profile = %profile))]
    pub async fn run(&self, profile: Profile) -> Result<RunReport, PipelineError> {
        let table = profile.destination();
        let mut report = RunReport::new(profile.name(), table);

        let rows = self.load_coordinates(profile).await?;
        report.coordinates_read = rows.len();

        let unique = dedup_coordinates(rows);
        report.unique_coordinates = unique.len();

        let batches = BatchPacker::from_config(&self.config).pack(unique)?;
        info!(
            coordinates = report.coordinates_read,
            unique = report.unique_coordinates,
            batches = batches.len(),
            "Batches ready to collect"
        );

        // Until the run finishes, every batch counts as missing from the archive.
        let mut manifest = ArchiveManifest {
            batches: batches.len(),
            missing: (0..batches.len()).collect(),
        };
        if let Some(archive) = &self.archive {
            if let Err(e) = archive.clear() {
                warn!(error = %e, "Failed to clear response archive");
            }
            if let Err(e) = archive.write_manifest(&manifest) {
                warn!(error = %e, "Failed to write archive manifest");
            }
        }
        manifest.missing.clear();

        let mut aggregator = ResultAggregator::new();
        for (index, batch) in batches.iter().enumerate() {
            if index > 0 && !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }

            report.batches_attempted += 1;
            match self.client.fetch_batch(index, batch).await {
                Ok(response) => {
                    if let Some(archive) = &self.archive {
                        if let Err(e) = archive.store(index, &response) {
                            warn!(index, error = %e, "Failed to archive elevation response");
                            manifest.missing.push(index);
                        }
                    }
                    aggregator.push(response);
                    info!(
                        batch = index + 1,
                        total = batches.len(),
                        "Elevation batch collected"
                    );
                }
                Err(e) => {
                    report.batches_dropped += 1;
                    manifest.missing.push(index);
                    error!(
                        batch = index + 1,
                        locations = batch.len(),
                        error = %e,
                        "Dropping elevation batch"
                    );
                }
            }
        }

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.write_manifest(&manifest) {
                warn!(error = %e, "Failed to write archive manifest");
            }
        }

        self.persist(aggregator, report).await
    }

    /// Re-aggregates archived responses and replaces the destination table,
    /// without calling the elevation API.
    ///
    /// Batches the archiving run packed but never archived are reported as
    /// dropped, so the rebuilt table's gaps show up in the report.
    #[tracing::instrument(skip(self, profile, archive), fields(profile = %profile))]
    pub async fn rebuild(
        &self,
        profile: Profile,
        archive: &ResponseArchive,
    ) -> Result<RunReport, PipelineError> {
        let mut report = RunReport::new(profile.name(), profile.destination());

        let responses = archive
            .load_all()
            .map_err(|e| StorageError::unavailable("archive", e))?;
        let manifest = archive
            .load_manifest()
            .map_err(|e| StorageError::unavailable("archive", e))?;
        info!(responses = responses.len(), "Rebuilding from archived responses");

        let mut aggregator = ResultAggregator::new();
        for response in responses {
            aggregator.push_value(response)?;
        }

        let archived = aggregator.responses();
        match manifest {
            Some(manifest) => {
                report.batches_attempted = manifest.batches.max(archived);
                report.batches_dropped = report.batches_attempted - archived;
                if report.batches_dropped > 0 {
                    warn!(
                        dropped = report.batches_dropped,
                        batches = manifest.batches,
                        missing = ?manifest.missing,
                        "Archive is missing batches; their coordinates have no elevation"
                    );
                }
            }
            None => {
                warn!("Archive has no manifest, dropped batches cannot be counted");
                report.batches_attempted = archived;
            }
        }

        self.persist(aggregator, report).await
    }

    async fn persist(
        &self,
        aggregator: ResultAggregator,
        mut report: RunReport,
    ) -> Result<RunReport, PipelineError> {
        let raw = aggregator.raw_len();
        let results = aggregator.finish().inspect_err(|e: &AggregateError| {
            error!(error = %e, "Elevation results incomplete, not uploading");
        })?;
        info!(raw, unique = results.len(), "Elevation results aggregated");

        self.sink.upload(&results, &report.table).await?;
        report.finish(&results);
        report.log();

        Ok(report)
    }
}
