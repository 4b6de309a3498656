use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("Port cannot be 0")]
    InvalidPort,

    #[error("Listener and admin listener cannot share an address: {0}")]
    DuplicateListener(String),

    #[error("Bulk batch size cannot be 0")]
    InvalidBatchSize,

    #[error("Bulk max_in_flight cannot be 0")]
    InvalidMaxInFlight,

    #[error("Session secret cannot be empty")]
    EmptySessionSecret,
}

/// Gateway configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Config {
    /// Listener for the client-facing API
    pub listener: Listener,
    /// Listener for health and readiness probes
    pub admin_listener: Listener,
    /// Base URLs of the upstream services
    pub upstreams: Upstreams,
    #[serde(default)]
    pub timeouts: Timeouts,
    #[serde(default)]
    pub bulk: BulkConfig,
    pub auth: AuthConfig,
}

impl Config {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.listener.validate()?;
        self.admin_listener.validate()?;

        if self.listener == self.admin_listener {
            return Err(ValidationError::DuplicateListener(format!(
                "{}:{}",
                self.listener.host, self.listener.port
            )));
        }

        self.bulk.validate()?;

        if self.auth.session_secret.is_empty() {
            return Err(ValidationError::EmptySessionSecret);
        }

        Ok(())
    }
}

/// Network listener configuration
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Listener {
    /// Host address to bind to (e.g., "0.0.0.0" or "127.0.0.1")
    pub host: String,
    /// Port number to listen on
    pub port: u16,
}

impl Listener {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort);
        }
        Ok(())
    }
}

/// Upstream base URLs.
///
/// Note: `url::Url` rejects malformed URLs while the config is deserialized.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct Upstreams {
    pub core_url: Url,
    pub product_catalog_url: Url,
    pub scoring_url: Url,
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Timeouts {
    /// Subscription, quota, job and transaction log calls
    pub control_plane_secs: u64,
    /// Product data calls
    pub product_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Timeouts {
            control_plane_secs: 5,
            product_secs: 10,
        }
    }
}

impl Timeouts {
    pub fn control_plane(&self) -> Duration {
        Duration::from_secs(self.control_plane_secs)
    }

    pub fn product(&self) -> Duration {
        Duration::from_secs(self.product_secs)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct BulkConfig {
    /// Rows dispatched per wave
    pub batch_size: usize,
    /// Minimum time between the start of two waves
    pub batch_interval_ms: u64,
    /// Optional cap on concurrently running product calls
    pub max_in_flight: Option<usize>,
    /// Largest accepted CSV upload
    pub max_upload_bytes: usize,
}

impl Default for BulkConfig {
    fn default() -> Self {
        BulkConfig {
            batch_size: 100,
            batch_interval_ms: 1000,
            max_in_flight: None,
            max_upload_bytes: 30 * 1024 * 1024,
        }
    }
}

impl BulkConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_size == 0 {
            return Err(ValidationError::InvalidBatchSize);
        }
        if self.max_in_flight == Some(0) {
            return Err(ValidationError::InvalidMaxInFlight);
        }
        Ok(())
    }

    pub fn batch_interval(&self) -> Duration {
        Duration::from_millis(self.batch_interval_ms)
    }
}

#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct AuthConfig {
    /// HS256 secret session tokens are signed with
    pub session_secret: String,
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
}

fn default_cookie_name() -> String {
    "session".to_string()
}
