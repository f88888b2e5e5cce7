//! # Metrics Sink
//!
//! Dual-schema persistence of scored events. The legacy point always goes
//! through the buffered write path; the current point, when dual-write is
//! enabled, is written synchronously and must be acknowledged. Neither
//! write affects the other.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;
use wafpulse_core::{resolve_event_time, Classification, GeoLocation, SecurityEvent, SeverityScore};
use wafpulse_domain_waf::{attack_type, GeoResolver};
use wafpulse_store::{BufferOptions, BufferedWriter, MetricPoint, TimeSeriesClient, TimeSeriesError, WriteErrors};

/// Response code the WAF returns when it denies a request
pub const DENIED_RESPONSE_CODE: u16 = 403;

/// Sink options
#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub legacy_measurement: String,
    pub current_measurement: String,
    pub dual_write: bool,
    pub buffer: BufferOptions,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            legacy_measurement: "waf_events".to_string(),
            current_measurement: "waf_requests".to_string(),
            dual_write: true,
            buffer: BufferOptions::default(),
        }
    }
}

/// Result of the current-schema write
#[derive(Debug, Clone)]
pub enum CurrentWrite {
    /// Dual-write is off
    Disabled,
    Acknowledged,
    Failed(TimeSeriesError),
}

/// What `persist` did with one event
#[derive(Debug, Clone)]
pub struct PersistOutcome {
    /// Legacy point accepted by the buffered path
    pub legacy_queued: bool,
    pub current: CurrentWrite,
}

/// Dual-schema metrics sink
pub struct MetricsSink {
    client: Arc<dyn TimeSeriesClient>,
    writer: BufferedWriter,
    geo: GeoResolver,
    options: SinkOptions,
}

/// Whether the WAF blocked, or would block, the request
pub fn is_blocked(response_code: u16, score: &SeverityScore) -> bool {
    response_code == DENIED_RESPONSE_CODE || score.value >= wafpulse_core::SeverityLevel::CRITICAL_THRESHOLD
}

impl MetricsSink {
    /// Create a sink and start its buffered write path.
    ///
    /// Buffered write failures arrive on the returned [`WriteErrors`].
    pub fn new(client: Arc<dyn TimeSeriesClient>, geo: GeoResolver, options: SinkOptions) -> (Self, WriteErrors) {
        let (writer, errors) = BufferedWriter::spawn(client.clone(), options.buffer.clone());
        (
            Self {
                client,
                writer,
                geo,
                options,
            },
            errors,
        )
    }

    pub fn dual_write(&self) -> bool {
        self.options.dual_write
    }

    /// Persist one scored event under both schemas
    pub async fn persist(
        &self,
        event: &SecurityEvent,
        classification: &Classification,
        score: &SeverityScore,
    ) -> PersistOutcome {
        let location = self.geo.resolve(&event.client_ip);
        let timestamp = resolve_event_time(&[&event.timestamp, &classification.timestamp], Utc::now());

        let legacy_queued = self
            .writer
            .write(self.legacy_point(event, classification, score, &location, timestamp));

        let current = if self.options.dual_write {
            let point = self.current_point(event, classification, score, &location, timestamp);
            match self.client.write_point(point).await {
                Ok(()) => CurrentWrite::Acknowledged,
                Err(e) => {
                    error!(
                        tx_id = %event.transaction_id,
                        measurement = %self.options.current_measurement,
                        error = %e,
                        "Current schema write failed"
                    );
                    CurrentWrite::Failed(e)
                }
            }
        } else {
            CurrentWrite::Disabled
        };

        PersistOutcome { legacy_queued, current }
    }

    /// Point under the legacy schema at the event's resolved time
    pub fn legacy_point(
        &self,
        event: &SecurityEvent,
        classification: &Classification,
        score: &SeverityScore,
        location: &GeoLocation,
        timestamp: DateTime<Utc>,
    ) -> MetricPoint {
        MetricPoint::new(&self.options.legacy_measurement, timestamp)
            .with_tag("client_ip", event.client_ip.as_str())
            .with_tag("method", event.request.method.as_str())
            .with_tag("rule_id", classification.rule_id.as_str())
            .with_tag("severity_level", score.level.as_str())
            .with_tag("geo_country", location.country())
            .with_tag("geo_city", location.city())
            .with_field("anomaly_score", event.anomaly_score)
            .with_field("severity", score.value)
            .with_field("response_code", event.response_code)
            .with_field("uri", event.request.uri.as_str())
            .with_field("geo_latitude", location.latitude())
            .with_field("geo_longitude", location.longitude())
    }

    /// Point under the current schema: the legacy shape plus attack type,
    /// block decision, transaction id and track
    pub fn current_point(
        &self,
        event: &SecurityEvent,
        classification: &Classification,
        score: &SeverityScore,
        location: &GeoLocation,
        timestamp: DateTime<Utc>,
    ) -> MetricPoint {
        let mut point = self.legacy_point(event, classification, score, location, timestamp);
        point.measurement = self.options.current_measurement.clone();

        let blocked = is_blocked(event.response_code, score);
        point
            .with_tag("attack_type", attack_type(&classification.rule_id).as_str())
            .with_tag("blocked", blocked.to_string())
            .with_field("tx_id", event.transaction_id.as_str())
            .with_field("track", classification.track.as_str())
    }

    /// Flush the buffered path and stop its task
    pub async fn close(self) -> Result<(), TimeSeriesError> {
        self.writer.close().await
    }
}
