//! Configuration for the pipeline and the shipper binary.

use crate::error::{ShipperError, ShipperResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Per-business pipeline tuning.
///
/// Fixed for the lifetime of a pipeline; there is no runtime resizing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum events per batch.
    pub batch_size: usize,
    /// Capacity of the ingest buffer producers write into.
    pub ingest_capacity: usize,
    /// Capacity of the assembled-batch queue.
    pub batch_queue_capacity: usize,
    /// Number of dispatch workers.
    pub workers: usize,
    /// Delivery attempts per batch before it is dropped.
    pub max_attempts: u32,
    /// How long to wait for a client from the pool.
    pub acquire_timeout_ms: u64,
    /// Time trigger of the assembler, checked when an event arrives.
    pub flush_interval_ms: u64,
    /// Optional wall-clock flush of a partial batch during quiet periods.
    pub idle_flush_interval_ms: Option<u64>,
    /// Grace period between the stop signal and detaching from the pool.
    pub shutdown_grace_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            batch_size: 300,
            ingest_capacity: 500,
            batch_queue_capacity: 300,
            workers: 10,
            max_attempts: 3,
            acquire_timeout_ms: 5000,
            flush_interval_ms: 1000,
            idle_flush_interval_ms: None,
            shutdown_grace_ms: 5000,
        }
    }
}

impl PipelineConfig {
    /// Reject configurations that would stall or spin the pipeline.
    pub fn validate(&self) -> ShipperResult<()> {
        let checks = [
            ("batch_size", self.batch_size as u64),
            ("ingest_capacity", self.ingest_capacity as u64),
            ("batch_queue_capacity", self.batch_queue_capacity as u64),
            ("workers", self.workers as u64),
            ("max_attempts", self.max_attempts as u64),
            ("flush_interval_ms", self.flush_interval_ms),
        ];
        for (name, value) in checks {
            if value == 0 {
                return Err(ShipperError::Config(format!("{} must be greater than zero", name)));
            }
        }
        if self.idle_flush_interval_ms == Some(0) {
            return Err(ShipperError::Config(
                "idle_flush_interval_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn idle_flush_interval(&self) -> Option<Duration> {
        self.idle_flush_interval_ms.map(Duration::from_millis)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human readable lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Top-level configuration for the shipper binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
    /// Collector endpoints as `host:port`.
    pub endpoints: Vec<String>,
    /// Connection cap per collector endpoint.
    pub max_clients_per_endpoint: usize,
    /// TCP connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Per-batch request timeout in milliseconds.
    pub request_timeout_ms: u64,
    /// How often throughput is reported, in seconds.
    pub monitor_interval_secs: u64,
    /// Pipeline tuning applied to every business.
    pub pipeline: PipelineConfig,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Text,
            endpoints: Vec::new(),
            max_clients_per_endpoint: 8,
            connect_timeout_ms: 3000,
            request_timeout_ms: 10_000,
            monitor_interval_secs: 10,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl ShipperConfig {
    /// Load configuration from a file if it exists, otherwise use defaults.
    /// Environment overrides are applied on top either way.
    pub fn load(path: Option<&Path>) -> ShipperResult<Self> {
        let mut config = match path {
            Some(path) if path.exists() => Self::load_from_file(path)?,
            _ => Self::default(),
        };
        config.load_from_env();
        Ok(config)
    }

    /// Load configuration from a specific JSON file.
    pub fn load_from_file(path: &Path) -> ShipperResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ShipperConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override configuration from environment variables.
    fn load_from_env(&mut self) {
        if let Ok(log_level) = std::env::var("LOG_SHIPPER_LOG_LEVEL") {
            self.log_level = log_level;
        }
        if let Ok(endpoints) = std::env::var("LOG_SHIPPER_ENDPOINTS") {
            self.endpoints = parse_endpoints(&endpoints);
        }
    }

    /// Validate the whole configuration.
    pub fn validate(&self) -> ShipperResult<()> {
        if self.endpoints.is_empty() {
            return Err(ShipperError::Config("at least one endpoint is required".to_string()));
        }
        if self.max_clients_per_endpoint == 0 {
            return Err(ShipperError::Config(
                "max_clients_per_endpoint must be greater than zero".to_string(),
            ));
        }
        self.pipeline.validate()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs.max(1))
    }
}

/// Split a comma separated endpoint list, skipping blanks.
pub fn parse_endpoints(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
