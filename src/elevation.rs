//! Client for the external elevation lookup API.

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::config::PipelineConfig;
use crate::error::FetchError;
use crate::fetch::{HttpClient, post_json};
use crate::types::LocationBatch;

/// A parsed API response: a JSON object whose list-valued entries hold the
/// elevation records (`{"results": [...]}` for open-elevation).
pub type ElevationResponse = Map<String, Value>;

pub struct ElevationClient<C> {
    http: C,
    endpoint: String,
    max_attempts: u32,
}

impl<C: HttpClient> ElevationClient<C> {
    pub fn new(http: C, endpoint: impl Into<String>, max_attempts: u32) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(http: C, config: &PipelineConfig) -> Self {
        Self::new(http, config.endpoint.clone(), config.max_retries)
    }

    /// Sends one batch and parses the reply.
    pub async fn request(&self, batch: &LocationBatch) -> Result<ElevationResponse, FetchError> {
        let body = serde_json::to_vec(batch)
            .map_err(|e| FetchError::InvalidRequest(e.to_string()))?;
        let bytes = post_json(&self.http, &self.endpoint, body).await?;
        parse_response(&bytes)
    }

    /// Sends one batch, retrying failed attempts back to back until the
    /// attempt budget is spent. `index` only tags the span, so retry
    /// warnings can be matched to their batch.
    ///
    /// # Errors
    ///
    /// [`FetchError::RetriesExhausted`] carrying the last attempt's error.
    #[tracing::instrument(skip(self, batch), fields(locations = batch.len()))]
    pub async fn fetch_batch(
        &self,
        index: usize,
        batch: &LocationBatch,
    ) -> Result<ElevationResponse, FetchError> {
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.request(batch).await {
                Ok(response) => {
                    debug!(attempt, "Elevation batch collected");
                    return Ok(response);
                }
                Err(e) if attempt >= self.max_attempts => {
                    return Err(FetchError::RetriesExhausted {
                        attempts: attempt,
                        last: Box::new(e),
                    });
                }
                Err(e) => {
                    warn!(attempt, max_attempts = self.max_attempts, error = %e, "Elevation request failed, retrying");
                }
            }
        }
    }
}

/// Parses a response body, which must be a JSON object.
pub fn parse_response(bytes: &[u8]) -> Result<ElevationResponse, FetchError> {
    match serde_json::from_slice(bytes) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(FetchError::Body(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(FetchError::Body(e.to_string())),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
