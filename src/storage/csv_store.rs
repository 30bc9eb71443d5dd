//! CSV-backed table store: one `<table>.csv` file per table in a directory.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use csv::WriterBuilder;
use tracing::{debug, info};

use super::{ColumnMap, CoordinateSource, ResultSink, TableSpec};
use crate::error::StorageError;
use crate::types::{Coordinate, ElevationPoint, ElevationResultSet};

const ELEVATION_HEADER: [&str; 3] = ["latitude", "longitude", "elevation"];

#[derive(Debug, Clone)]
pub struct CsvStore {
    dir: PathBuf,
}

impl CsvStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn table_path(&self, table: &str) -> PathBuf {
        self.dir.join(format!("{table}.csv"))
    }

    /// Reads back an elevation table written by [`ResultSink::upload`].
    pub fn load_elevations(&self, table: &str) -> Result<ElevationResultSet, StorageError> {
        let path = self.table_path(table);
        let mut rdr =
            csv::Reader::from_path(&path).map_err(|e| StorageError::unavailable(table, e))?;

        let mut points = Vec::new();
        for (row, result) in rdr.deserialize().enumerate() {
            let point: ElevationPoint = result.map_err(|e| StorageError::MalformedRow {
                table: table.to_string(),
                row,
                reason: e.to_string(),
            })?;
            points.push(point);
        }

        Ok(ElevationResultSet { points })
    }

    fn ensure_dir(&self, table: &str) -> Result<(), StorageError> {
        let meta = fs::metadata(&self.dir).map_err(|e| StorageError::unavailable(table, e))?;
        if !meta.is_dir() {
            return Err(StorageError::unavailable(
                table,
                format!("{} is not a directory", self.dir.display()),
            ));
        }
        Ok(())
    }
}

/// Resolves the id, latitude and longitude column indices of a table.
fn column_indices(
    table: &TableSpec,
    headers: &csv::StringRecord,
) -> Result<[usize; 3], StorageError> {
    match &table.columns {
        ColumnMap::Positional => {
            if headers.len() < 3 {
                return Err(StorageError::SchemaConflict {
                    table: table.name.clone(),
                    reason: format!("expected at least 3 columns, found {}", headers.len()),
                });
            }
            Ok([0, 1, 2])
        }
        ColumnMap::Named {
            id,
            latitude,
            longitude,
        } => {
            let find = |name: &str| {
                headers
                    .iter()
                    .position(|h| h.trim() == name)
                    .ok_or_else(|| StorageError::SchemaConflict {
                        table: table.name.clone(),
                        reason: format!("column `{name}` not found"),
                    })
            };
            Ok([find(id)?, find(latitude)?, find(longitude)?])
        }
    }
}

fn parse_row(
    table: &str,
    row: usize,
    record: &csv::StringRecord,
    [id, lat, lon]: [usize; 3],
) -> Result<Coordinate, StorageError> {
    let malformed = |reason: String| StorageError::MalformedRow {
        table: table.to_string(),
        row,
        reason,
    };
    let field = |idx: usize| {
        record
            .get(idx)
            .map(str::trim)
            .ok_or_else(|| malformed(format!("missing column {idx}")))
    };
    // NaN and infinities would serialize as `null` in the request body.
    let coord = |idx: usize, limit: f64| -> Result<f64, StorageError> {
        let raw = field(idx)?;
        let value: f64 = raw
            .parse()
            .map_err(|_| malformed(format!("`{raw}` is not a number")))?;
        if !value.is_finite() || value.abs() > limit {
            return Err(malformed(format!("`{raw}` is outside ±{limit}")));
        }
        Ok(value)
    };

    Ok(Coordinate::new(field(id)?, coord(lat, 90.0)?, coord(lon, 180.0)?))
}

#[async_trait]
impl CoordinateSource for CsvStore {
    async fn select_all(&self, table: &TableSpec) -> Result<Vec<Coordinate>, StorageError> {
        let path = self.table_path(&table.name);
        debug!(path = %path.display(), "Reading coordinate table");

        let mut rdr = csv::ReaderBuilder::new()
            .flexible(true)
            .from_path(&path)
            .map_err(|e| StorageError::unavailable(&table.name, e))?;
        let headers = rdr
            .headers()
            .map_err(|e| StorageError::unavailable(&table.name, e))?
            .clone();
        let indices = column_indices(table, &headers)?;

        let mut rows = Vec::new();
        for (row, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| StorageError::MalformedRow {
                table: table.name.clone(),
                row,
                reason: e.to_string(),
            })?;
            rows.push(parse_row(&table.name, row, &record, indices)?);
        }

        info!(table = %table.name, rows = rows.len(), "Coordinate table loaded");
        Ok(rows)
    }
}

#[async_trait]
impl ResultSink for CsvStore {
    /// Writes to a hidden temporary file first and renames it over the
    /// table, so readers never see a half-written table.
    async fn upload(&self, results: &ElevationResultSet, table: &str) -> Result<(), StorageError> {
        self.ensure_dir(table)?;

        let path = self.table_path(table);
        if path.is_dir() {
            return Err(StorageError::SchemaConflict {
                table: table.to_string(),
                reason: format!("{} is a directory", path.display()),
            });
        }

        let tmp = self.dir.join(format!(".{table}.csv.tmp"));
        write_elevations(&tmp, results).map_err(|e| {
            let _ = fs::remove_file(&tmp);
            StorageError::unavailable(table, e)
        })?;
        fs::rename(&tmp, &path).map_err(|e| StorageError::unavailable(table, e))?;

        info!(table, path = %path.display(), rows = results.len(), "Elevation table replaced");
        Ok(())
    }
}

fn write_elevations(path: &Path, results: &ElevationResultSet) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(path)?;

    writer.write_record(ELEVATION_HEADER)?;
    for point in results {
        writer.serialize(point)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_table(dir: &Path, name: &str, content: &str) {
        let mut file = fs::File::create(dir.join(format!("{name}.csv"))).unwrap();
        file.write_all(content.as_bytes()).unwrap();
    }

    fn stops_spec() -> TableSpec {
        TableSpec::new("stops", ColumnMap::named("stop_id", "stop_lat", "stop_lon"))
    }

    #[tokio::test]
    async fn test_select_named_columns() {
        let dir = tempfile::tempdir().unwrap();
        write_table(
            dir.path(),
            "stops",
            "stop_id,stop_name,stop_lat,stop_lon\n\
             8220DB000002,Parnell Square,53.3522443611,-6.2637232564\n\
             8220DB000003,Parnell Street,53.3524263,-6.2640685\n",
        );

        let store = CsvStore::new(dir.path());
        let rows = store.select_all(&stops_spec()).await.unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, "8220DB000002");
        assert_eq!(rows[0].latitude, 53.3522443611);
        assert_eq!(rows[1].longitude, -6.2640685);
    }

    #[tokio::test]
    async fn test_select_positional_columns() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "depots", "name,lat,lon\nBroadstone,53.3564,-6.2738\n");

        let store = CsvStore::new(dir.path());
        let spec = TableSpec::new("depots", ColumnMap::Positional);
        let rows = store.select_all(&spec).await.unwrap();

        assert_eq!(rows, vec![Coordinate::new("Broadstone", 53.3564, -6.2738)]);
    }

    #[tokio::test]
    async fn test_missing_table_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        let err = store.select_all(&stops_spec()).await.unwrap_err();
        assert!(matches!(err, StorageError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_missing_column_is_schema_conflict() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "stops", "stop_id,lat,lon\nx,1,2\n");
        let store = CsvStore::new(dir.path());
        let err = store.select_all(&stops_spec()).await.unwrap_err();
        assert!(matches!(err, StorageError::SchemaConflict { .. }));
    }

    #[tokio::test]
    async fn test_bad_number_is_malformed_row() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "stops", "stop_id,stop_lat,stop_lon\na,1,2\nb,north,2\n");
        let store = CsvStore::new(dir.path());
        let err = store.select_all(&stops_spec()).await.unwrap_err();
        assert!(matches!(err, StorageError::MalformedRow { row: 1, .. }));
    }

    #[tokio::test]
    async fn test_non_finite_coordinate_is_malformed_row() {
        let dir = tempfile::tempdir().unwrap();
        write_table(dir.path(), "stops", "stop_id,stop_lat,stop_lon\na,NaN,inf\n");
        let store = CsvStore::new(dir.path());
        let err = store.select_all(&stops_spec()).await.unwrap_err();
        assert!(matches!(err, StorageError::MalformedRow { row: 0, .. }));
    }

    #[tokio::test]
    async fn test_out_of_range_coordinate_is_malformed_row() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());

        write_table(dir.path(), "stops", "stop_id,stop_lat,stop_lon\na,-6.26,53.35\nb,91,2\n");
        let err = store.select_all(&stops_spec()).await.unwrap_err();
        assert!(matches!(err, StorageError::MalformedRow { row: 1, .. }));

        write_table(dir.path(), "stops", "stop_id,stop_lat,stop_lon\na,90,-180\nb,1,180.5\n");
        let err = store.select_all(&stops_spec()).await.unwrap_err();
        assert!(matches!(err, StorageError::MalformedRow { row: 1, .. }));
    }

    #[tokio::test]
    async fn test_upload_replaces_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        write_table(dir.path(), "stopElevations", "something,else\n1,2\n");

        let results = ElevationResultSet {
            points: vec![
                ElevationPoint {
                    latitude: 53.35,
                    longitude: -6.26,
                    elevation: 14.0,
                },
                ElevationPoint {
                    latitude: 53.36,
                    longitude: -6.27,
                    elevation: 21.5,
                },
            ],
        };
        store.upload(&results, "stopElevations").await.unwrap();

        assert_eq!(store.load_elevations("stopElevations").unwrap(), results);
        assert!(!dir.path().join(".stopElevations.csv.tmp").exists());
    }

    #[tokio::test]
    async fn test_upload_empty_writes_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path());
        store
            .upload(&ElevationResultSet::default(), "elevations")
            .await
            .unwrap();

        let content = fs::read_to_string(store.table_path("elevations")).unwrap();
        assert_eq!(content.trim(), "latitude,longitude,elevation");
    }

    #[tokio::test]
    async fn test_upload_into_missing_dir_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvStore::new(dir.path().join("nope"));
        let err = store
            .upload(&ElevationResultSet::default(), "elevations")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::StorageUnavailable { .. }));
    }

    #[tokio::test]
    async fn test_directory_in_the_way_is_schema_conflict() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("elevations.csv")).unwrap();
        let store = CsvStore::new(dir.path());
        let err = store
            .upload(&ElevationResultSet::default(), "elevations")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::SchemaConflict { .. }));
    }
}
