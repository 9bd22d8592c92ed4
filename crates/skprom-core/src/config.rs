//! Exporter options and the `skpromd.toml` daemon configuration.
//!
//! Exporter option names follow the Signal K plugin schema
//! (`blackOrWhite`, `blackOrWhitelist`, `selfOrAll`, `maxAge`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, ConfigResult};
use crate::filter::{FilterMode, PathFilter};
use crate::flatten::FlattenMode;

/// Sample age limit used when `maxAge` is unset or zero.
pub const DEFAULT_MAX_AGE_SECS: u64 = 600;

/// Which contexts are exported.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContextScope {
    /// Only the local vessel.
    #[default]
    #[serde(rename = "Self")]
    OwnVessel,
    /// Every context, labelled by `context`.
    All,
}

/// How internal paths turn into metric names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MetricNaming {
    /// `.` and `-` both become `_`.
    #[default]
    DotsAndDashes,
    /// Only `.` becomes `_`.
    DotsOnly,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExporterConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_or_white: Option<FilterMode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub black_or_whitelist: Option<Vec<String>>,
    #[serde(default)]
    pub self_or_all: ContextScope,
    /// Seconds; fractions allowed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_age: Option<f64>,
    #[serde(default)]
    pub strict_numeric: bool,
    #[serde(default)]
    pub metric_naming: MetricNaming,
}

impl ExporterConfig {
    pub fn path_filter(&self) -> PathFilter {
        PathFilter::configure(self.black_or_white, self.black_or_whitelist.as_deref())
    }

    pub fn include_all_contexts(&self) -> bool {
        self.self_or_all == ContextScope::All
    }

    pub fn max_age(&self) -> Duration {
        match self.max_age {
            Some(secs) if secs > 0.0 => Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX),
            _ => Duration::from_secs(DEFAULT_MAX_AGE_SECS),
        }
    }

    pub fn max_age_ms(&self) -> i64 {
        i64::try_from(self.max_age().as_millis()).unwrap_or(i64::MAX)
    }

    pub fn flatten_mode(&self) -> FlattenMode {
        if self.strict_numeric {
            FlattenMode::Strict
        } else {
            FlattenMode::Lenient
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub listen: SocketAddr,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9091)),
        }
    }
}

/// Signal K server TCP delta stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SignalKConfig {
    /// `host:port`; Signal K servers stream deltas on 8375.
    pub address: String,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
}

impl Default for SignalKConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8375".to_string(),
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
        }
    }
}

/// Top-level `skpromd.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DaemonConfig {
    /// Vessel id; the self context becomes `vessels.<self_id>`. When absent
    /// the daemon adopts the id announced by the server's hello message.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub self_id: Option<String>,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub signalk: SignalKConfig,
    #[serde(default)]
    pub exporter: ExporterConfig,
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: DaemonConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.signalk.address.trim().is_empty() {
            return Err(ConfigError::Invalid("signalk.address must not be empty".to_string()));
        }
        if self.signalk.reconnect_initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "signalk.reconnect_initial_ms must be positive".to_string(),
            ));
        }
        if self.signalk.reconnect_max_ms < self.signalk.reconnect_initial_ms {
            return Err(ConfigError::Invalid(format!(
                "signalk.reconnect_max_ms ({}) is below reconnect_initial_ms ({})",
                self.signalk.reconnect_max_ms, self.signalk.reconnect_initial_ms
            )));
        }
        if self.self_id.as_deref().is_some_and(|id| id.trim().is_empty()) {
            return Err(ConfigError::Invalid("self_id must not be empty".to_string()));
        }
        Ok(())
    }
}
