use crate::validate::UploadLimits;
use std::env;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
#[error("configuration error: {0}")]
pub struct ConfigError(pub String);

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    /// Timeout for JSON calls to the backend API.
    pub request_timeout: Duration,
    /// Timeout for the storage PUT. Large but finite; a long-running
    /// transfer must eventually fail rather than hang.
    pub transfer_timeout: Duration,
    pub max_concurrent_transfers: usize,
    pub part_size: usize,
    pub limits: UploadLimits,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:3000".to_string(),
            request_timeout: Duration::from_secs(30),
            transfer_timeout: Duration::from_secs(15 * 60),
            max_concurrent_transfers: 3,
            part_size: 8 * 1024 * 1024,
            limits: UploadLimits::default(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        Ok(Self {
            api_url: env::var("HAKOBU_API_URL").unwrap_or(defaults.api_url),

            request_timeout: Duration::from_secs(parse_var(
                "HAKOBU_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),

            transfer_timeout: Duration::from_secs(parse_var(
                "HAKOBU_TRANSFER_TIMEOUT_SECS",
                defaults.transfer_timeout.as_secs(),
            )?),

            max_concurrent_transfers: parse_var(
                "HAKOBU_MAX_CONCURRENT_TRANSFERS",
                defaults.max_concurrent_transfers,
            )?,

            part_size: parse_var("HAKOBU_PART_SIZE_MB", defaults.part_size / (1024 * 1024))?
                * 1024
                * 1024,

            limits: defaults.limits,
        })
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError(format!("invalid {name}: {raw}"))),
        Err(_) => Ok(default),
    }
}
