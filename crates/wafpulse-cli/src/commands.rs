//! Command-line arguments

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use wafpulse_streaming::{parse_brokers, GeoConfig, KafkaConfig, MetricsConfig, StreamingConfig};

#[derive(Parser, Debug)]
#[command(name = "wafpulse")]
#[command(about = "Real-time WAF security event processor")]
#[command(version)]
pub struct Cli {
    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json, env = "LOG_FORMAT", global = true)]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Consume events and persist enriched metrics until shutdown
    Run(ProcessorArgs),

    /// Print the resolved configuration as JSON
    Config(ProcessorArgs),

    /// Decode and score one event without persisting it
    Score {
        /// File containing the event JSON
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Event JSON
        #[arg(short, long)]
        json: Option<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Text,
}

/// Processor settings, each with an environment fallback
#[derive(Args, Debug, Clone)]
pub struct ProcessorArgs {
    /// Comma-separated Kafka bootstrap servers
    #[arg(long, env = "KAFKA_BROKERS", default_value = "kafka:9092")]
    pub brokers: String,

    #[arg(long, env = "KAFKA_TOPIC", default_value = "waf-realtime-events")]
    pub topic: String,

    /// Consumer group ID
    #[arg(long, env = "KAFKA_GROUP", default_value = "realtime-processor")]
    pub group: String,

    #[arg(long, env = "INFLUXDB_URL", default_value = "http://localhost:8086")]
    pub influxdb_url: String,

    #[arg(long, env = "INFLUXDB_TOKEN", default_value = "admin-token-change-me", hide_env_values = true)]
    pub influxdb_token: String,

    #[arg(long, env = "INFLUXDB_ORG", default_value = "waf-org")]
    pub influxdb_org: String,

    #[arg(long, env = "INFLUXDB_BUCKET", default_value = "waf-realtime")]
    pub influxdb_bucket: String,

    /// MaxMind City database; empty disables geo enrichment
    #[arg(long, env = "GEOIP_DB_PATH", default_value = "/data/GeoLite2-City.mmdb")]
    pub geoip_db: String,

    /// Also write the current schema
    #[arg(
        long,
        env = "DUAL_WRITE_ENABLED",
        default_value = "true",
        action = ArgAction::Set,
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    pub dual_write: bool,

    #[arg(long, default_value_t = 100)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 1000)]
    pub flush_interval_ms: u64,

    /// Read newline-delimited events from stdin instead of Kafka
    #[arg(long)]
    pub stdin: bool,
}

impl ProcessorArgs {
    pub fn to_config(&self) -> StreamingConfig {
        let geoip_db = self.geoip_db.trim();

        StreamingConfig {
            kafka: KafkaConfig {
                brokers: parse_brokers(&self.brokers),
                topic: self.topic.clone(),
                group_id: self.group.clone(),
                ..KafkaConfig::default()
            },
            metrics: MetricsConfig {
                url: self.influxdb_url.clone(),
                token: self.influxdb_token.clone(),
                org: self.influxdb_org.clone(),
                bucket: self.influxdb_bucket.clone(),
                dual_write: self.dual_write,
                batch_size: self.batch_size,
                flush_interval_ms: self.flush_interval_ms,
                ..MetricsConfig::default()
            },
            geo: GeoConfig {
                database_path: (!geoip_db.is_empty()).then(|| PathBuf::from(geoip_db)),
            },
        }
    }
}
