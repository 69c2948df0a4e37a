use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

pub const DEFAULT_URL: &str = "http://localhost:8083";
pub const DEFAULT_PARALLELISM: usize = 3;

/// Everything needed to talk to one Kafka Connect cluster and to drive deploys against it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Base URL of the Connect REST API, e.g. `http://localhost:8083`.
    pub url: String,
    pub request_timeout_secs: u64,
    /// How many times a 409 Conflict is retried before it is surfaced.
    pub conflict_retries: u32,
    pub retry_wait_ms: u64,
    pub retry_max_wait_ms: u64,
    pub insecure_skip_verify: bool,
    /// PEM certificate and PEM private key for mutual TLS. Both or neither.
    pub client_certificate: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub basic_auth: Option<BasicAuth>,
    pub headers: Vec<CustomHeader>,
    pub parallelism: usize,
    pub pause_before_deploy: bool,
    /// Deadline for each synchronous wait (create, update, delete, pause, resume).
    pub sync_timeout_secs: u64,
    pub poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            request_timeout_secs: 10,
            conflict_retries: 5,
            retry_wait_ms: 500,
            retry_max_wait_ms: 5_000,
            insecure_skip_verify: false,
            client_certificate: None,
            client_key: None,
            basic_auth: None,
            headers: Vec::new(),
            parallelism: DEFAULT_PARALLELISM,
            pause_before_deploy: false,
            sync_timeout_secs: 120,
            poll_interval_ms: 1_000,
        }
    }
}

impl ClientConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_wait(&self) -> Duration {
        Duration::from_millis(self.retry_wait_ms)
    }

    pub fn retry_max_wait(&self) -> Duration {
        Duration::from_millis(self.retry_max_wait_ms)
    }

    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Check the settings that would otherwise only fail on first request.
    pub fn validate(&self) -> Result<(), AppError> {
        let parsed = url::Url::parse(&self.url)
            .map_err(|e| AppError::Config(format!("invalid url '{}': {}", self.url, e)))?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            return Err(AppError::Config(format!(
                "unsupported url scheme '{}', expected http or https",
                parsed.scheme()
            )));
        }

        match (&self.client_certificate, &self.client_key) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(AppError::Config(
                    "client certificate and client key must be given together".into(),
                ))
            }
            _ => {}
        }

        if self.parallelism == 0 {
            return Err(AppError::Config("parallelism must be at least 1".into()));
        }

        Ok(())
    }
}

// ============================================================================
// Basic auth
// ============================================================================

#[derive(Clone, Serialize, Deserialize)]
pub struct BasicAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for BasicAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BasicAuth")
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

// ============================================================================
// Extra headers
// ============================================================================

/// One extra HTTP header attached to every request, parsed from `<name>:<value>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomHeader {
    pub name: String,
    pub value: String,
}

impl FromStr for CustomHeader {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let mut parts = raw.split(':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(name), Some(value), None) if !name.trim().is_empty() => Ok(Self {
                name: name.trim().to_string(),
                value: value.trim_start().to_string(),
            }),
            _ => Err("invalid header flag format, expected '<name>:<value>'".into()),
        }
    }
}

impl fmt::Display for CustomHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.value)
    }
}
