//! Configuration management using Figment
//!
//! Configuration is loaded from multiple sources with the following precedence (highest to lowest):
//! 1. Environment variables (prefix: HOOKLINE_, nested keys separated by `__`)
//! 2. Current working directory: ./config.toml
//! 3. XDG config directory: ~/.config/hookline/config.toml
//! 4. System directory: /etc/hookline/config.toml
//! 5. Default values

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::Result;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,

    /// Webhook event log configuration
    #[serde(default)]
    pub event_log: EventLogConfig,

    /// Graph API client configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Webhook intake configuration
    #[serde(default)]
    pub webhook: WebhookConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Service name
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format ("json" or "pretty")
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    /// Maximum accepted request body in megabytes
    #[serde(default = "default_body_limit_mb")]
    pub body_limit_mb: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            port: default_port(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            timeout_secs: default_timeout(),
            body_limit_mb: default_body_limit_mb(),
        }
    }
}

impl ServiceConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Webhook event log configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventLogConfig {
    /// Path of the JSON Lines log file
    ///
    /// When unset the service keeps events in memory only.
    #[serde(default = "default_event_log_path")]
    pub path: Option<PathBuf>,

    /// Number of entries returned by `GET /logs` when `count` is absent or invalid
    #[serde(default = "default_recent_count")]
    pub default_count: usize,

    /// Number of entries retained by `POST /logs/rotate` when `keep` is absent
    #[serde(default = "default_rotate_keep")]
    pub default_keep: usize,

    /// Directory receiving entries discarded by rotation (not archived when unset)
    #[serde(default)]
    pub archive_dir: Option<PathBuf>,
}

impl Default for EventLogConfig {
    fn default() -> Self {
        Self {
            path: default_event_log_path(),
            default_count: default_recent_count(),
            default_keep: default_rotate_keep(),
            archive_dir: None,
        }
    }
}

/// Graph API client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Versioned base URL of the Graph API
    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_graph_timeout")]
    pub timeout_secs: u64,

    /// Page access token used for webhook enrichment lookups
    #[serde(default)]
    pub access_token: Option<String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            base_url: default_graph_base_url(),
            timeout_secs: default_graph_timeout(),
            access_token: None,
        }
    }
}

impl GraphConfig {
    /// Request timeout as a duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Webhook intake configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    /// Token the upstream echoes during the subscription handshake
    ///
    /// When unset every verification attempt is refused.
    #[serde(default)]
    pub verify_token: Option<String>,

    /// Time budget for sender lookups per delivery, in seconds
    ///
    /// Capped at half of `service.timeout_secs` so the delivery is always
    /// acknowledged before the request timeout.
    #[serde(default = "default_enrichment_timeout")]
    pub enrichment_timeout_secs: u64,

    /// Most distinct senders looked up per delivery
    #[serde(default = "default_max_lookups")]
    pub max_lookups: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            verify_token: None,
            enrichment_timeout_secs: default_enrichment_timeout(),
            max_lookups: default_max_lookups(),
        }
    }
}

impl Config {
    /// Time allowed for sender lookups while handling one delivery
    pub fn enrichment_budget(&self) -> Duration {
        Duration::from_secs(self.webhook.enrichment_timeout_secs).min(self.service.timeout() / 2)
    }
}

fn default_service_name() -> String {
    "hookline".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_body_limit_mb() -> usize {
    2
}

fn default_event_log_path() -> Option<PathBuf> {
    Some(PathBuf::from("logs/webhook-events.jsonl"))
}

fn default_recent_count() -> usize {
    50
}

fn default_rotate_keep() -> usize {
    1000
}

fn default_graph_base_url() -> String {
    "https://graph.instagram.com/v21.0".to_string()
}

fn default_graph_timeout() -> u64 {
    10
}

fn default_enrichment_timeout() -> u64 {
    5
}

fn default_max_lookups() -> usize {
    20
}

impl Config {
    /// Load configuration from all sources
    ///
    /// Searches for config files in this order (first found wins):
    /// 1. Current working directory: ./config.toml
    /// 2. XDG config directory: ~/.config/hookline/config.toml
    /// 3. System directory: /etc/hookline/config.toml
    ///
    /// Environment variables (HOOKLINE_ prefix) override all file-based configs.
    pub fn load() -> Result<Self> {
        let config_paths = Self::find_config_paths();

        tracing::debug!("Searching for config files in order:");
        for path in &config_paths {
            tracing::debug!("  - {}", path.display());
        }

        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        // Lowest priority first so higher priority files override
        for path in config_paths.iter().rev() {
            if path.exists() {
                tracing::info!("Loading configuration from: {}", path.display());
                figment = figment.merge(Toml::file(path));
            }
        }

        figment = figment.merge(Env::prefixed("HOOKLINE_").split("__"));

        let config = figment.extract()?;
        Ok(config)
    }

    /// Load configuration from a specific file
    ///
    /// This bypasses XDG directories and loads directly from the given path.
    pub fn load_from(path: &str) -> Result<Self> {
        let config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("HOOKLINE_").split("__"))
            .extract()?;

        Ok(config)
    }

    /// Find all possible config file paths
    ///
    /// Returns paths in priority order (highest first).
    fn find_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("config.toml")];

        let xdg_dirs = xdg::BaseDirectories::with_prefix("hookline");
        if let Some(path) = xdg_dirs.find_config_file("config.toml") {
            paths.push(path);
        }

        paths.push(PathBuf::from("/etc/hookline/config.toml"));

        paths
    }
}
