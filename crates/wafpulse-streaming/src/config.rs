//! # Streaming Configuration
//!
//! Configuration for the inbound stream, the metrics store and geo enrichment

use crate::sink::SinkOptions;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;
use wafpulse_store::BufferOptions;

/// Processor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// Inbound stream
    pub kafka: KafkaConfig,

    /// Metrics store
    pub metrics: MetricsConfig,

    /// Geo enrichment
    pub geo: GeoConfig,
}

/// Kafka configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    /// Bootstrap servers
    pub brokers: Vec<String>,

    /// Topic to consume from
    pub topic: String,

    /// Consumer group ID
    pub group_id: String,

    /// Additional librdkafka properties
    pub properties: HashMap<String, String>,
}

/// Metrics store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// InfluxDB base URL
    pub url: String,

    /// API token
    pub token: String,

    pub org: String,

    pub bucket: String,

    /// Measurement of the legacy schema
    pub legacy_measurement: String,

    /// Measurement of the current schema
    pub current_measurement: String,

    /// Also write the current schema
    pub dual_write: bool,

    /// Points per buffered write request
    pub batch_size: usize,

    /// Buffered write flush interval in milliseconds
    pub flush_interval_ms: u64,

    /// Points queued before the buffered path starts dropping
    pub queue_capacity: usize,
}

/// Geo enrichment configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeoConfig {
    /// MaxMind City database; enrichment is disabled when absent
    pub database_path: Option<PathBuf>,
}

impl MetricsConfig {
    pub fn buffer_options(&self) -> BufferOptions {
        BufferOptions {
            batch_size: self.batch_size,
            flush_interval: Duration::from_millis(self.flush_interval_ms),
            queue_capacity: self.queue_capacity,
        }
    }

    pub fn sink_options(&self) -> SinkOptions {
        SinkOptions {
            legacy_measurement: self.legacy_measurement.clone(),
            current_measurement: self.current_measurement.clone(),
            dual_write: self.dual_write,
            buffer: self.buffer_options(),
        }
    }
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            brokers: vec!["kafka:9092".to_string()],
            topic: "waf-realtime-events".to_string(),
            group_id: "realtime-processor".to_string(),
            properties: HashMap::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8086".to_string(),
            token: "admin-token-change-me".to_string(),
            org: "waf-org".to_string(),
            bucket: "waf-realtime".to_string(),
            legacy_measurement: "waf_events".to_string(),
            current_measurement: "waf_requests".to_string(),
            dual_write: true,
            batch_size: 100,
            flush_interval_ms: 1000,
            queue_capacity: 10_000,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            kafka: KafkaConfig::default(),
            metrics: MetricsConfig::default(),
            geo: GeoConfig {
                database_path: Some(PathBuf::from("/data/GeoLite2-City.mmdb")),
            },
        }
    }
}

impl StreamingConfig {
    /// Reject configurations the processor cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.kafka.brokers.iter().all(|b| b.trim().is_empty()) {
            return Err(ConfigError::Missing("kafka.brokers"));
        }
        if self.kafka.topic.trim().is_empty() {
            return Err(ConfigError::Missing("kafka.topic"));
        }
        if self.kafka.group_id.trim().is_empty() {
            return Err(ConfigError::Missing("kafka.group_id"));
        }
        if self.metrics.org.trim().is_empty() {
            return Err(ConfigError::Missing("metrics.org"));
        }
        if self.metrics.bucket.trim().is_empty() {
            return Err(ConfigError::Missing("metrics.bucket"));
        }
        if self.metrics.legacy_measurement.is_empty() || self.metrics.current_measurement.is_empty() {
            return Err(ConfigError::Missing("metrics measurement name"));
        }
        if self.metrics.legacy_measurement == self.metrics.current_measurement {
            return Err(ConfigError::Invalid(format!(
                "legacy and current measurement are both {}",
                self.metrics.legacy_measurement
            )));
        }
        if self.metrics.batch_size == 0 {
            return Err(ConfigError::Invalid("metrics.batch_size must be positive".to_string()));
        }
        Ok(())
    }
}

/// Split a comma-separated broker list
pub fn parse_brokers(list: &str) -> Vec<String> {
    list.split(',')
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string)
        .collect()
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration value: {0}")]
    Missing(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
