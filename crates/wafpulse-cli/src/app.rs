//! Wiring of the processor from command-line settings

use crate::commands::{LogFormat, ProcessorArgs};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use wafpulse_core::decode_event;
use wafpulse_domain_waf::{GeoResolver, SeverityScorer, StaticHighRiskList};
use wafpulse_store::TimeSeriesClient;
use wafpulse_streaming::{
    is_blocked, AlertTrigger, MessageSource, MetricsConfig, MetricsSink, ProcessorReport, Shutdown,
    StreamProcessor, StreamingConfig,
};

/// Install the global subscriber; `RUST_LOG` overrides the `info` default
pub fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

/// Resolve on Ctrl-C or SIGTERM
pub async fn shutdown_signal() -> std::io::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result,
            _ = terminate.recv() => Ok(()),
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await
    }
}

/// Configuration as printed by `wafpulse config`, with the token masked
pub fn redacted(config: &StreamingConfig) -> StreamingConfig {
    let mut config = config.clone();
    if !config.metrics.token.is_empty() {
        config.metrics.token = "<redacted>".to_string();
    }
    config
}

fn metrics_client(config: &MetricsConfig) -> Arc<dyn TimeSeriesClient> {
    #[cfg(feature = "influxdb")]
    {
        Arc::new(wafpulse_store::InfluxClient::new(
            &config.url,
            &config.org,
            &config.token,
            &config.bucket,
        ))
    }

    #[cfg(not(feature = "influxdb"))]
    {
        info!(url = %config.url, "Built without InfluxDB support, metric points are logged only");
        Arc::new(wafpulse_store::LogClient)
    }
}

async fn message_source(args: &ProcessorArgs, config: &StreamingConfig) -> Result<Box<dyn MessageSource>> {
    #[cfg(feature = "kafka")]
    {
        if !args.stdin {
            let kafka = config.kafka.clone();
            let consumer = tokio::task::spawn_blocking(move || wafpulse_streaming::KafkaConsumer::connect(&kafka))
                .await
                .context("Kafka connect task failed")?
                .context("Failed to connect to Kafka")?;
            return Ok(Box::new(consumer));
        }
    }

    #[cfg(not(feature = "kafka"))]
    {
        if !args.stdin {
            info!(
                topic = %config.kafka.topic,
                "Built without Kafka support, reading newline-delimited events from stdin"
            );
        }
    }

    Ok(Box::new(wafpulse_streaming::LineSource::stdin()))
}

/// Build every component and run the processor until shutdown
pub async fn run(args: &ProcessorArgs, shutdown: Shutdown) -> Result<ProcessorReport> {
    let config = args.to_config();
    config.validate().context("Invalid configuration")?;

    let source = message_source(args, &config).await?;

    let client = metrics_client(&config.metrics);
    if let Err(e) = client.health_check().await {
        warn!(client = client.name(), error = %e, "Metrics store health check failed");
    }

    let geo = GeoResolver::open(config.geo.database_path.as_ref());
    let (sink, write_errors) = MetricsSink::new(client, geo.clone(), config.metrics.sink_options());
    let scorer = SeverityScorer::new(Arc::new(StaticHighRiskList::placeholder()));

    info!(
        topic = %config.kafka.topic,
        bucket = %config.metrics.bucket,
        dual_write = config.metrics.dual_write,
        geo_enabled = geo.is_enabled(),
        "Starting real-time WAF event processor"
    );

    let processor = StreamProcessor::new(source, sink, write_errors, scorer, AlertTrigger::new(geo));
    Ok(processor.run(shutdown).await)
}

/// Offline scoring result
#[derive(Debug, Clone, Serialize)]
pub struct ScoreSummary {
    pub tx_id: String,
    pub client_ip: String,
    pub severity: u32,
    pub level: String,
    pub attack_type: String,
    pub blocked: bool,
    pub critical: bool,
}

/// Decode and score one payload with the placeholder high-risk list
pub fn score_payload(payload: &[u8]) -> Result<ScoreSummary> {
    let (event, classification) = decode_event(payload).context("Failed to decode event")?;
    let scorer = SeverityScorer::new(Arc::new(StaticHighRiskList::placeholder()));
    let score = scorer.score(&event, &classification);

    Ok(ScoreSummary {
        tx_id: event.transaction_id,
        client_ip: event.client_ip,
        severity: score.value,
        level: score.level.to_string(),
        attack_type: scorer.attack_type(&classification).to_string(),
        blocked: is_blocked(event.response_code, &score),
        critical: score.is_critical(),
    })
}
