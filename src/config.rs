// src/config.rs

//! Manages collector configuration: loading the JSON config file, applying
//! defaults, and validating the result.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;

/// Address of a single storage node as configured: `[host, port, family]`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct NodeInfo(pub String, pub u16, pub u32);

impl NodeInfo {
    pub fn host(&self) -> &str {
        &self.0
    }

    pub fn port(&self) -> u16 {
        self.1
    }

    pub fn family(&self) -> u32 {
        self.2
    }
}

/// The `elliptics` section: seed nodes and the monitor endpoint parameters.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct EllipticsConfig {
    #[serde(default)]
    pub nodes: Vec<NodeInfo>,
    /// TCP port of the per-node HTTP monitor endpoint.
    #[serde(default = "default_monitor_port")]
    pub monitor_port: u16,
    /// Per-request timeout for stat downloads, in seconds.
    #[serde(default = "default_wait_timeout")]
    pub wait_timeout: u64,
}

impl Default for EllipticsConfig {
    fn default() -> Self {
        Self {
            nodes: vec![],
            monitor_port: default_monitor_port(),
            wait_timeout: default_wait_timeout(),
        }
    }
}

fn default_monitor_port() -> u16 {
    10025
}
fn default_wait_timeout() -> u64 {
    10
}

/// Connection options for the metadata database.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct MetadataOptions {
    #[serde(rename = "connectTimeoutMS", default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl Default for MetadataOptions {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

/// A named database inside the metadata storage.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DbName {
    #[serde(default)]
    pub db: String,
}

/// The `metadata` section: jobs, group history, and inventory databases.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct MetadataConfig {
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub options: MetadataOptions,
    #[serde(default)]
    pub history: DbName,
    #[serde(default)]
    pub jobs: DbName,
    #[serde(default)]
    pub inventory: DbName,
}

/// The `cache` section: detection of unmarked cache groups.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct CacheConfig {
    /// Backends whose base path starts with this prefix belong to cache
    /// groups even when the group carries no metadata.
    #[serde(default)]
    pub group_path_prefix: String,
}

/// The HTTP API listener.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: default_http_port(),
        }
    }
}

fn default_http_port() -> u16 {
    8878
}

/// The final, validated collector configuration.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct Config {
    #[serde(default)]
    pub elliptics: EllipticsConfig,

    #[serde(default)]
    pub forbidden_dht_groups: bool,
    #[serde(default)]
    pub forbidden_unmatched_group_total_space: bool,
    #[serde(default)]
    pub forbidden_ns_without_settings: bool,
    #[serde(default)]
    pub forbidden_dc_sharing_among_groups: bool,

    /// Reserved space in bytes, withheld from every backend's effective
    /// space proportionally to the backend's share of its filesystem.
    #[serde(default = "default_reserved_space")]
    pub reserved_space: u64,

    #[serde(default = "default_dnet_log_mask")]
    pub dnet_log_mask: u64,
    #[serde(default = "default_thread_num")]
    pub net_thread_num: u64,
    #[serde(default = "default_thread_num")]
    pub io_thread_num: u64,
    #[serde(default = "default_thread_num")]
    pub nonblocking_io_thread_num: u64,

    #[serde(default)]
    pub metadata: MetadataConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default = "default_app_name")]
    pub app_name: String,

    /// Period of the background inventory rescan, in seconds.
    #[serde(default = "default_dc_cache_update_period")]
    pub infrastructure_dc_cache_update_period: u64,
    /// Age after which a cached host→DC row is re-resolved, in seconds.
    #[serde(default = "default_dc_cache_valid_time")]
    pub infrastructure_dc_cache_valid_time: u64,
    #[serde(default = "default_inventory_worker_timeout")]
    pub inventory_worker_timeout: u64,

    #[serde(default)]
    pub http: HttpConfig,

    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Upper bound on concurrent downloads and metakey reads per round.
    #[serde(default = "default_worker_pool_size")]
    pub worker_pool_size: usize,

    #[serde(default = "default_round_interval_secs")]
    pub round_interval_secs: u64,
}

fn default_reserved_space() -> u64 {
    112_742_891_519
}
fn default_dnet_log_mask() -> u64 {
    3
}
fn default_thread_num() -> u64 {
    3
}
fn default_app_name() -> String {
    "mastermind".to_string()
}
fn default_dc_cache_update_period() -> u64 {
    150
}
fn default_dc_cache_valid_time() -> u64 {
    604_800
}
fn default_inventory_worker_timeout() -> u64 {
    5
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_worker_pool_size() -> usize {
    8
}
fn default_round_interval_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        // An empty JSON object carries every default.
        serde_json::from_str("{}").expect("default config must deserialize")
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a JSON file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_json(&contents).with_context(|| format!("Failed to parse JSON from '{path}'"))
    }

    /// Parses and validates a configuration from a JSON string.
    pub fn from_json(contents: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    fn validate(&self) -> Result<()> {
        if self.reserved_space == 0 {
            return Err(anyhow!("reserved_space cannot be 0"));
        }
        if self.elliptics.monitor_port == 0 {
            return Err(anyhow!("elliptics.monitor_port cannot be 0"));
        }
        if self.elliptics.wait_timeout == 0 {
            return Err(anyhow!("elliptics.wait_timeout cannot be 0"));
        }
        if self.http.port == 0 {
            return Err(anyhow!("http.port cannot be 0"));
        }
        if self.worker_pool_size == 0 {
            return Err(anyhow!("worker_pool_size cannot be 0"));
        }
        if self.round_interval_secs == 0 {
            return Err(anyhow!("round_interval_secs cannot be 0"));
        }

        for (i, node) in self.elliptics.nodes.iter().enumerate() {
            if node.host().trim().is_empty() {
                return Err(anyhow!("elliptics.nodes[{}]: host cannot be empty", i));
            }
            if node.port() == 0 {
                return Err(anyhow!("elliptics.nodes[{}]: port cannot be 0", i));
            }
        }

        Ok(())
    }
}
