use std::io::Write;

use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::info;

use super::ResultSink;
use crate::error::StorageError;
use crate::types::ElevationResultSet;

/// Publishes each elevation table as a JSON array object in an S3 bucket.
///
/// The key is `<prefix>/<table>.json`, or `<prefix>/<table>.json.gz` with
/// `Content-Encoding: gzip` when `gzip` is set.
pub struct S3Sink {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    gzip: bool,
}

impl S3Sink {
    pub fn new(client: aws_sdk_s3::Client, bucket: &str, prefix: &str, gzip: bool) -> Self {
        Self {
            client,
            bucket: bucket.to_string(),
            prefix: prefix.trim_matches('/').to_string(),
            gzip,
        }
    }

    /// Uses the ambient AWS configuration (env vars, instance profile, ...).
    pub async fn from_env(bucket: &str, prefix: &str, gzip: bool) -> Self {
        let config = aws_config::load_from_env().await;
        Self::new(aws_sdk_s3::Client::new(&config), bucket, prefix, gzip)
    }

    pub fn key(&self, table: &str) -> String {
        object_key(&self.prefix, table, self.gzip)
    }

    /// Fails if an object that is not JSON already sits at `key`.
    async fn check_existing(&self, key: &str, table: &str) -> Result<(), StorageError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(head) => match head.content_type() {
                Some(ct) if !ct.starts_with("application/json") => {
                    Err(StorageError::SchemaConflict {
                        table: table.to_string(),
                        reason: format!("s3://{}/{key} has content type {ct}", self.bucket),
                    })
                }
                _ => Ok(()),
            },
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(()),
            Err(e) => Err(StorageError::unavailable(table, e)),
        }
    }
}

fn object_key(prefix: &str, table: &str, gzip: bool) -> String {
    let ext = if gzip { "json.gz" } else { "json" };
    if prefix.is_empty() {
        format!("{table}.{ext}")
    } else {
        format!("{prefix}/{table}.{ext}")
    }
}

fn encode(results: &ElevationResultSet, gzip: bool) -> std::io::Result<Vec<u8>> {
    let body = serde_json::to_vec(results)?;
    if !gzip {
        return Ok(body);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&body)?;
    encoder.finish()
}

#[async_trait]
impl ResultSink for S3Sink {
    async fn upload(&self, results: &ElevationResultSet, table: &str) -> Result<(), StorageError> {
        let key = self.key(table);
        self.check_existing(&key, table).await?;

        let body = encode(results, self.gzip).map_err(|e| StorageError::unavailable(table, e))?;

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .body(ByteStream::from(body))
            .content_type("application/json");
        if self.gzip {
            put = put.content_encoding("gzip");
        }
        put.send()
            .await
            .map_err(|e| StorageError::unavailable(table, e))?;

        info!(table, bucket = %self.bucket, key = %key, rows = results.len(), "Elevation table uploaded to S3");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ElevationPoint;
    use flate2::read::GzDecoder;
    use std::io::Read;

    fn results() -> ElevationResultSet {
        ElevationResultSet {
            points: vec![ElevationPoint {
                latitude: 53.35,
                longitude: -6.26,
                elevation: 14.0,
            }],
        }
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("aggregates", "elevations", false), "aggregates/elevations.json");
        assert_eq!(object_key("", "stopElevations", true), "stopElevations.json.gz");
    }

    #[test]
    fn test_encode_gzip_round_trips() {
        let compressed = encode(&results(), true).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(&compressed[..])
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded.as_bytes(), encode(&results(), false).unwrap());
    }
}
