use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::{NetworkError, Result, WrapPolicy};

/// Client configuration, loaded once at startup and read-only afterwards.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct NetworkConfig {
    /// Base URI every route template is appended to.
    pub host: String,
    /// Per-attempt timeout for API calls in milliseconds.
    pub http_timeout_ms: u64,
    /// Per-exchange timeout for downloads in milliseconds.
    pub download_timeout_ms: u64,
    /// Retries granted to connection-level (status 0) failures.
    pub max_retries: u32,
    /// Fixed wait between retry attempts in milliseconds.
    pub retry_delay_ms: u64,
    /// Global retry switch. When off, a status 0 failure ends the call at once.
    pub allow_retry: bool,
    /// Prefix placed before the query fragment.
    pub param_delimiter: String,
    /// Joins `name=value` pairs inside the query fragment.
    pub param_separator: String,
    /// Sent as the `client-version` header when present.
    pub client_version: Option<String>,
    /// Streaming socket endpoint handed to a [`crate::SocketService`].
    pub socket_uri: Option<String>,
    /// Base directory for relative download paths.
    pub download_root: Option<PathBuf>,
    /// Envelope policy for payloads.
    pub wrap_policy: WrapPolicy,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            http_timeout_ms: 30_000,
            download_timeout_ms: 600_000,
            max_retries: 5,
            retry_delay_ms: 100,
            allow_retry: true,
            param_delimiter: "?".to_owned(),
            param_separator: "&".to_owned(),
            client_version: None,
            socket_uri: None,
            download_root: None,
            wrap_policy: WrapPolicy::WRAPPED,
        }
    }
}

impl NetworkConfig {
    /// Creates a configuration with defaults for everything but the host.
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    /// Builds a configuration from `NETSERVICE_*` environment variables.
    ///
    /// `NETSERVICE_HOST` is required. Optional overrides:
    /// `NETSERVICE_HTTP_TIMEOUT_MS`, `NETSERVICE_DOWNLOAD_TIMEOUT_MS`,
    /// `NETSERVICE_MAX_RETRIES`, `NETSERVICE_RETRY_DELAY_MS`,
    /// `NETSERVICE_ALLOW_RETRY`, `NETSERVICE_CLIENT_VERSION`,
    /// `NETSERVICE_SOCKET_URI`, `NETSERVICE_DOWNLOAD_ROOT`,
    /// `NETSERVICE_WRAP_POLICY`.
    pub fn from_env() -> Result<Self> {
        let host = std::env::var("NETSERVICE_HOST").map_err(|_| {
            NetworkError::Configuration("missing NETSERVICE_HOST environment variable".to_owned())
        })?;
        if host.trim().is_empty() {
            return Err(NetworkError::Configuration(
                "NETSERVICE_HOST is set but empty".to_owned(),
            ));
        }

        let mut config = Self::new(host.trim());
        if let Some(value) = env_parsed("NETSERVICE_HTTP_TIMEOUT_MS")? {
            config.http_timeout_ms = value;
        }
        if let Some(value) = env_parsed("NETSERVICE_DOWNLOAD_TIMEOUT_MS")? {
            config.download_timeout_ms = value;
        }
        if let Some(value) = env_parsed("NETSERVICE_MAX_RETRIES")? {
            config.max_retries = value;
        }
        if let Some(value) = env_parsed("NETSERVICE_RETRY_DELAY_MS")? {
            config.retry_delay_ms = value;
        }
        if let Some(value) = env_parsed("NETSERVICE_ALLOW_RETRY")? {
            config.allow_retry = value;
        }
        if let Some(value) = env_parsed("NETSERVICE_WRAP_POLICY")? {
            config.wrap_policy = value;
        }
        config.client_version = std::env::var("NETSERVICE_CLIENT_VERSION").ok();
        config.socket_uri = std::env::var("NETSERVICE_SOCKET_URI").ok();
        config.download_root = std::env::var_os("NETSERVICE_DOWNLOAD_ROOT").map(PathBuf::from);
        Ok(config)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_millis(self.download_timeout_ms)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Resolves a download destination against [`NetworkConfig::download_root`].
    ///
    /// Absolute paths, and every path when no root is configured, pass through.
    pub fn download_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        match &self.download_root {
            Some(root) if path.is_relative() => root.join(path),
            _ => path.to_path_buf(),
        }
    }
}

fn env_parsed<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw.trim().parse::<T>().map(Some).map_err(|err| {
            NetworkError::Configuration(format!("invalid {name} value '{raw}': {err}"))
        }),
        Err(_) => Ok(None),
    }
}
