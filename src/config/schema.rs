//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the server.
//! All types derive Serde traits for deserialization from config files.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::filter::FilterSettings;

/// Root configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServerConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// Server-scope filter settings, inherited by every route.
    pub filter: FilterConfig,

    /// Signature classifier settings.
    pub classifier: ClassifierConfig,

    /// Extension overrides for the static type table (`js = "application/javascript"`).
    pub types: BTreeMap<String, String>,

    /// Route definitions.
    pub routes: Vec<RouteConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Server-scope response filter settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Enable content-type inference.
    pub guess_mime: bool,

    /// Type used when neither the table nor the classifier knows better.
    pub default_type: String,

    /// Add an `x-guess-mime` header naming where the type came from.
    pub diagnostic_header: bool,

    /// Add `X-Content-Type-Options: nosniff`.
    pub nosniff: bool,
}

impl Default for FilterConfig {
    fn default() -> Self {
        let defaults = FilterSettings::default();
        Self {
            guess_mime: defaults.guess_mime,
            default_type: defaults.default_type,
            diagnostic_header: defaults.diagnostic_header,
            nosniff: defaults.nosniff,
        }
    }
}

impl FilterConfig {
    /// Settings for requests that match no route.
    pub fn settings(&self) -> FilterSettings {
        FilterSettings {
            guess_mime: self.guess_mime,
            default_type: self.default_type.clone(),
            diagnostic_header: self.diagnostic_header,
            nosniff: self.nosniff,
        }
    }
}

/// Signature classifier configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// Initialise the signature classifier for this worker.
    pub enabled: bool,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Route configuration.
///
/// Filter fields left unset inherit the `[filter]` value.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging.
    pub name: String,

    /// Host header to match (exact match).
    pub host: Option<String>,

    /// Path prefix to match.
    pub path_prefix: Option<String>,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,

    /// Directory served for this route, with the prefix stripped.
    pub root: Option<PathBuf>,

    /// Upstream `host:port` the request is proxied to.
    pub upstream: Option<String>,

    pub guess_mime: Option<bool>,

    pub default_type: Option<String>,

    pub diagnostic_header: Option<bool>,

    pub nosniff: Option<bool>,
}

impl RouteConfig {
    /// Merge the server scope into this route; route values win.
    pub fn filter_settings(&self, parent: &FilterConfig) -> FilterSettings {
        FilterSettings {
            guess_mime: self.guess_mime.unwrap_or(parent.guess_mime),
            default_type: self
                .default_type
                .clone()
                .unwrap_or_else(|| parent.default_type.clone()),
            diagnostic_header: self.diagnostic_header.unwrap_or(parent.diagnostic_header),
            nosniff: self.nosniff.unwrap_or(parent.nosniff),
        }
    }
}

/// Timeout configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}
