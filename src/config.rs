//! Pipeline configuration.
//!
//! Defaults match the budget wired into the full stop-elevation run; any of
//! them can be overridden from the environment (the binary loads `.env`
//! into it at startup).

use std::env;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

use crate::error::PipelineError;

pub const DEFAULT_ENDPOINT: &str = "https://api.open-elevation.com/api/v1/lookup";

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineConfig {
    /// Batches are sealed once their serialized size reaches this many bytes.
    pub size_budget: usize,
    /// No sealed batch may serialize to this many bytes or more.
    pub hard_ceiling: usize,
    /// Total attempts per batch, including the first.
    pub max_retries: u32,
    /// Pause between consecutive batches.
    pub retry_delay: Duration,
    pub request_timeout: Duration,
    pub endpoint: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            size_budget: 9_700,
            hard_ceiling: 10_000,
            max_retries: 5,
            retry_delay: Duration::from_secs(2),
            request_timeout: Duration::from_secs(30),
            endpoint: DEFAULT_ENDPOINT.to_string(),
        }
    }
}

impl PipelineConfig {
    /// Builds a config from `ELEVATION_*` environment variables. Unset or
    /// unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            size_budget: env_or("ELEVATION_SIZE_BUDGET", defaults.size_budget),
            hard_ceiling: env_or("ELEVATION_HARD_CEILING", defaults.hard_ceiling),
            max_retries: env_or("ELEVATION_MAX_RETRIES", defaults.max_retries),
            retry_delay: Duration::from_secs(env_or(
                "ELEVATION_RETRY_DELAY_SECS",
                defaults.retry_delay.as_secs(),
            )),
            request_timeout: Duration::from_secs(env_or(
                "ELEVATION_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )),
            endpoint: env::var("ELEVATION_ENDPOINT").unwrap_or(defaults.endpoint),
        }
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.size_budget >= self.hard_ceiling {
            return Err(PipelineError::Config(format!(
                "size budget {} must be below the hard ceiling {}",
                self.size_budget, self.hard_ceiling
            )));
        }
        if self.max_retries == 0 {
            return Err(PipelineError::Config(
                "at least one attempt per batch is required".into(),
            ));
        }
        if self.endpoint.trim().is_empty() {
            return Err(PipelineError::Config("elevation endpoint is empty".into()));
        }
        Ok(())
    }
}

fn env_or<T: FromStr + Copy>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(key, value = %raw, "Ignoring unparsable config value");
            default
        }),
        Err(_) => default,
    }
}

/// How the elevation API expects its key, if it needs one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ApiCredentials {
    None,
    Header { name: String, key: String },
    QueryParam { name: String, key: String },
}

impl ApiCredentials {
    /// Reads `ELEVATION_API_KEY` plus either `ELEVATION_API_KEY_HEADER` or
    /// `ELEVATION_API_KEY_PARAM`. A key with neither is sent as a bearer token.
    pub fn from_env() -> Self {
        let Ok(key) = env::var("ELEVATION_API_KEY") else {
            return ApiCredentials::None;
        };
        if let Ok(name) = env::var("ELEVATION_API_KEY_PARAM") {
            return ApiCredentials::QueryParam { name, key };
        }
        match env::var("ELEVATION_API_KEY_HEADER") {
            Ok(name) => ApiCredentials::Header { name, key },
            Err(_) => ApiCredentials::Header {
                name: "Authorization".to_string(),
                key: format!("Bearer {key}"),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.size_budget, 9_700);
        assert_eq!(config.hard_ceiling, 10_000);
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.retry_delay, Duration::from_secs(2));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_budget_at_ceiling() {
        let config = PipelineConfig {
            size_budget: 10_000,
            ..PipelineConfig::default()
        };
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_attempts() {
        let config = PipelineConfig {
            max_retries: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_or_falls_back_on_garbage() {
        // SAFETY: no other test touches this variable.
        unsafe { env::set_var("ELEVATION_TEST_ONLY_BUDGET", "lots") };
        assert_eq!(env_or("ELEVATION_TEST_ONLY_BUDGET", 42usize), 42);
        unsafe { env::set_var("ELEVATION_TEST_ONLY_BUDGET", " 512 ") };
        assert_eq!(env_or("ELEVATION_TEST_ONLY_BUDGET", 42usize), 512);
        unsafe { env::remove_var("ELEVATION_TEST_ONLY_BUDGET") };
    }
}
