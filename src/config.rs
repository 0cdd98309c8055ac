use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::{Error, Result, Variants};

/// Instance name used when none is configured.
pub const DEFAULT_INSTANCE: &str = "$default_instance";

/// Which deployment region the SDK talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ServerZone {
    /// United States data center.
    #[default]
    Us,
    /// European Union data center.
    Eu,
}

impl ServerZone {
    pub(crate) fn server_url(self) -> &'static str {
        match self {
            ServerZone::Us => ExperimentConfig::DEFAULT_SERVER_URL_US,
            ServerZone::Eu => ExperimentConfig::DEFAULT_SERVER_URL_EU,
        }
    }
}

impl FromStr for ServerZone {
    type Err = Error;

    fn from_str(s: &str) -> Result<ServerZone> {
        match s.to_ascii_lowercase().as_str() {
            "us" => Ok(ServerZone::Us),
            "eu" => Ok(ServerZone::Eu),
            other => Err(Error::InvalidConfig(format!(
                "unrecognized server zone: {other:?}"
            ))),
        }
    }
}

/// Validated, immutable client configuration.
///
/// Construct via [`ExperimentConfig::builder`]; validation happens in
/// [`ExperimentConfigBuilder::build`].
///
/// # Examples
/// ```
/// # use experiment::{ExperimentConfig, ServerZone};
/// let config = ExperimentConfig::builder()
///     .server_zone(ServerZone::Us)
///     .fetch_timeout_millis(1_000)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ExperimentConfig {
    pub(crate) debug: bool,
    pub(crate) server_zone: ServerZone,
    pub(crate) server_url: Option<String>,
    pub(crate) fetch_timeout: Duration,
    pub(crate) retry_on_failure: bool,
    pub(crate) automatic_exposure_tracking: bool,
    pub(crate) fetch_on_start: bool,
    pub(crate) instance_name: String,
    pub(crate) initial_variants: Variants,
    pub(crate) storage_dir: Option<PathBuf>,
}

impl ExperimentConfig {
    /// Default server URL for [`ServerZone::Us`].
    pub const DEFAULT_SERVER_URL_US: &'static str = "https://api.lab.amplitude.com";
    /// Default server URL for [`ServerZone::Eu`].
    pub const DEFAULT_SERVER_URL_EU: &'static str = "https://api.lab.eu.amplitude.com";
    /// Default value for [`ExperimentConfigBuilder::fetch_timeout_millis`].
    pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

    /// Start building a configuration.
    pub fn builder() -> ExperimentConfigBuilder {
        ExperimentConfigBuilder::default()
    }

    /// Name identifying this client instance. Scopes persisted variants.
    pub fn instance_name(&self) -> &str {
        &self.instance_name
    }

    /// The URL the transport fetches from: the explicit override if set,
    /// otherwise the server zone default.
    pub(crate) fn resolved_server_url(&self) -> &str {
        self.server_url
            .as_deref()
            .unwrap_or_else(|| self.server_zone.server_url())
    }
}

impl Default for ExperimentConfig {
    fn default() -> ExperimentConfig {
        ExperimentConfig::builder()
            .build()
            .expect("default configuration is valid")
    }
}

/// Builder for [`ExperimentConfig`].
#[derive(Debug, Clone, Default)]
pub struct ExperimentConfigBuilder {
    debug: bool,
    server_zone: ServerZone,
    server_url: Option<String>,
    fetch_timeout_millis: Option<u64>,
    retry_on_failure: Option<bool>,
    automatic_exposure_tracking: Option<bool>,
    fetch_on_start: bool,
    instance_name: Option<String>,
    initial_variants: Variants,
    storage_dir: Option<PathBuf>,
}

impl ExperimentConfigBuilder {
    /// Enable verbose SDK diagnostics.
    pub fn debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Select the deployment region.
    pub fn server_zone(mut self, server_zone: ServerZone) -> Self {
        self.server_zone = server_zone;
        self
    }

    /// Override the server URL, e.g. to point at a proxy. Takes precedence
    /// over the server zone default.
    pub fn server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = Some(server_url.into());
        self
    }

    /// Timeout for a single fetch attempt, in milliseconds. Must be positive.
    pub fn fetch_timeout_millis(mut self, millis: u64) -> Self {
        self.fetch_timeout_millis = Some(millis);
        self
    }

    /// Retry a failed fetch once after a fixed backoff. Defaults to true.
    pub fn retry_on_failure(mut self, retry: bool) -> Self {
        self.retry_on_failure = Some(retry);
        self
    }

    /// Track an exposure automatically when a variant is served. Defaults to
    /// true.
    pub fn automatic_exposure_tracking(mut self, automatic: bool) -> Self {
        self.automatic_exposure_tracking = Some(automatic);
        self
    }

    /// Fetch variants during initialization, with no user context. A failed
    /// startup fetch is logged and does not fail initialization.
    pub fn fetch_on_start(mut self, fetch_on_start: bool) -> Self {
        self.fetch_on_start = fetch_on_start;
        self
    }

    /// Name this client instance. Must be non-empty. Variants persisted by
    /// different instance names never collide.
    pub fn instance_name(mut self, name: impl Into<String>) -> Self {
        self.instance_name = Some(name.into());
        self
    }

    /// Variants to seed the store with when no persisted snapshot exists.
    pub fn initial_variants(mut self, variants: Variants) -> Self {
        self.initial_variants = variants;
        self
    }

    /// Directory for durable variant storage. When unset, variants live in
    /// memory only and do not survive the process.
    pub fn storage_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.storage_dir = Some(dir.into());
        self
    }

    /// Validate and produce the immutable configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if the fetch timeout is zero, the
    /// instance name is empty, or the server URL override does not parse.
    pub fn build(self) -> Result<ExperimentConfig> {
        let fetch_timeout = match self.fetch_timeout_millis {
            None => ExperimentConfig::DEFAULT_FETCH_TIMEOUT,
            Some(0) => {
                return Err(Error::InvalidConfig(
                    "fetch timeout must be positive".to_owned(),
                ))
            }
            Some(millis) => Duration::from_millis(millis),
        };

        let instance_name = match self.instance_name {
            None => DEFAULT_INSTANCE.to_owned(),
            Some(name) if name.is_empty() => {
                return Err(Error::InvalidConfig(
                    "instance name must not be empty".to_owned(),
                ))
            }
            Some(name) => name,
        };

        if let Some(server_url) = &self.server_url {
            url::Url::parse(server_url).map_err(|err| {
                Error::InvalidConfig(format!("invalid server_url {server_url:?}: {err}"))
            })?;
        }

        Ok(ExperimentConfig {
            debug: self.debug,
            server_zone: self.server_zone,
            server_url: self.server_url,
            fetch_timeout,
            retry_on_failure: self.retry_on_failure.unwrap_or(true),
            automatic_exposure_tracking: self.automatic_exposure_tracking.unwrap_or(true),
            fetch_on_start: self.fetch_on_start,
            instance_name,
            initial_variants: self.initial_variants,
            storage_dir: self.storage_dir,
        })
    }
}
