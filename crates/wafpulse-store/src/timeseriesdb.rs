//! # Time Series Database Integration
//!
//! Client abstraction over the metrics store, with an InfluxDB 2.x
//! implementation, an in-memory client and a log-only client for dry runs.

use crate::point::MetricPoint;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use tracing::debug;

#[cfg(feature = "influxdb")]
use influxdb2::models::DataPoint;

/// Time-series database client
#[async_trait]
pub trait TimeSeriesClient: Send + Sync {
    /// Write one point and wait for the store to acknowledge it
    async fn write_point(&self, point: MetricPoint) -> Result<(), TimeSeriesError>;

    /// Write a batch of points in one request
    async fn write_batch(&self, points: Vec<MetricPoint>) -> Result<(), TimeSeriesError>;

    async fn health_check(&self) -> Result<(), TimeSeriesError>;

    fn name(&self) -> &'static str;
}

/// InfluxDB 2.x client bound to one organization and bucket
#[cfg(feature = "influxdb")]
pub struct InfluxClient {
    client: influxdb2::Client,
    bucket: String,
}

#[cfg(feature = "influxdb")]
impl InfluxClient {
    pub fn new(url: &str, org: &str, token: &str, bucket: &str) -> Self {
        Self {
            client: influxdb2::Client::new(url, org, token),
            bucket: bucket.to_string(),
        }
    }

    fn to_data_point(point: MetricPoint) -> Result<DataPoint, TimeSeriesError> {
        use crate::point::FieldValue;

        let mut builder = DataPoint::builder(point.measurement);
        for (key, value) in point.tags.into_iter().filter(|(_, v)| !v.is_empty()) {
            builder = builder.tag(key, value);
        }
        for (key, value) in point.fields {
            builder = match value {
                FieldValue::Integer(i) => builder.field(key, i),
                FieldValue::Float(f) => builder.field(key, f),
                FieldValue::Boolean(b) => builder.field(key, b),
                FieldValue::Text(s) => builder.field(key, s),
            };
        }
        if let Some(nanos) = point.timestamp.timestamp_nanos_opt() {
            builder = builder.timestamp(nanos);
        }

        builder
            .build()
            .map_err(|e| TimeSeriesError::SerializationError(e.to_string()))
    }
}

#[cfg(feature = "influxdb")]
#[async_trait]
impl TimeSeriesClient for InfluxClient {
    async fn write_point(&self, point: MetricPoint) -> Result<(), TimeSeriesError> {
        self.write_batch(vec![point]).await
    }

    async fn write_batch(&self, points: Vec<MetricPoint>) -> Result<(), TimeSeriesError> {
        let data_points = points
            .into_iter()
            .map(Self::to_data_point)
            .collect::<Result<Vec<_>, _>>()?;

        self.client
            .write(&self.bucket, futures::stream::iter(data_points))
            .await
            .map_err(|e| TimeSeriesError::WriteError(e.to_string()))
    }

    async fn health_check(&self) -> Result<(), TimeSeriesError> {
        self.client
            .health()
            .await
            .map(|_| ())
            .map_err(|e| TimeSeriesError::HealthCheckError(e.to_string()))
    }

    fn name(&self) -> &'static str {
        "influxdb"
    }
}

#[derive(Default)]
struct MemoryState {
    points: Vec<MetricPoint>,
    attempts: HashMap<String, usize>,
}

/// In-memory client that records every written point.
///
/// Writes to measurements registered with [`MemoryClient::failing`] are
/// counted as attempts and then rejected.
#[derive(Default)]
pub struct MemoryClient {
    state: Mutex<MemoryState>,
    failing: HashSet<String>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every write to `measurement`
    pub fn failing(mut self, measurement: &str) -> Self {
        self.failing.insert(measurement.to_string());
        self
    }

    /// Points accepted so far
    pub async fn points(&self) -> Vec<MetricPoint> {
        self.state.lock().await.points.clone()
    }

    /// Accepted points of one measurement
    pub async fn points_for(&self, measurement: &str) -> Vec<MetricPoint> {
        self.state
            .lock()
            .await
            .points
            .iter()
            .filter(|p| p.measurement == measurement)
            .cloned()
            .collect()
    }

    /// Write attempts for one measurement, accepted or not
    pub async fn attempts(&self, measurement: &str) -> usize {
        self.state
            .lock()
            .await
            .attempts
            .get(measurement)
            .copied()
            .unwrap_or(0)
    }
}

#[async_trait]
impl TimeSeriesClient for MemoryClient {
    async fn write_point(&self, point: MetricPoint) -> Result<(), TimeSeriesError> {
        self.write_batch(vec![point]).await
    }

    async fn write_batch(&self, points: Vec<MetricPoint>) -> Result<(), TimeSeriesError> {
        let mut state = self.state.lock().await;
        let mut rejected = Vec::new();

        for point in points {
            *state.attempts.entry(point.measurement.clone()).or_insert(0) += 1;
            if self.failing.contains(&point.measurement) {
                rejected.push(point.measurement);
            } else {
                state.points.push(point);
            }
        }

        if rejected.is_empty() {
            Ok(())
        } else {
            Err(TimeSeriesError::WriteError(format!(
                "{} point(s) rejected for measurement {}",
                rejected.len(),
                rejected[0]
            )))
        }
    }

    async fn health_check(&self) -> Result<(), TimeSeriesError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Client that only logs points in line protocol
#[derive(Debug, Default, Clone, Copy)]
pub struct LogClient;

#[async_trait]
impl TimeSeriesClient for LogClient {
    async fn write_point(&self, point: MetricPoint) -> Result<(), TimeSeriesError> {
        debug!(line = %point.to_line_protocol(), "Metric point");
        Ok(())
    }

    async fn write_batch(&self, points: Vec<MetricPoint>) -> Result<(), TimeSeriesError> {
        for point in points {
            self.write_point(point).await?;
        }
        Ok(())
    }

    async fn health_check(&self) -> Result<(), TimeSeriesError> {
        Ok(())
    }

    fn name(&self) -> &'static str {
        "log"
    }
}

/// Time-series database error
#[derive(Debug, Clone, thiserror::Error)]
pub enum TimeSeriesError {
    #[error("Write error: {0}")]
    WriteError(String),

    #[error("Write buffer full, point dropped")]
    BufferFull,

    #[error("Writer closed")]
    WriterClosed,

    #[error("Writer task failed: {0}")]
    WriterTask(String),

    #[error("Health check error: {0}")]
    HealthCheckError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[tokio::test]
    async fn test_memory_client_records_points() {
        let client = MemoryClient::new();
        client
            .write_point(MetricPoint::new("waf_events", Utc::now()).with_field("severity", 10u32))
            .await
            .unwrap();

        assert_eq!(client.points().await.len(), 1);
        assert_eq!(client.attempts("waf_events").await, 1);
        assert!(client.health_check().await.is_ok());
    }

    #[tokio::test]
    async fn test_memory_client_failure_injection() {
        let client = MemoryClient::new().failing("waf_requests");
        let result = client
            .write_batch(vec![
                MetricPoint::new("waf_events", Utc::now()),
                MetricPoint::new("waf_requests", Utc::now()),
            ])
            .await;

        assert!(matches!(result, Err(TimeSeriesError::WriteError(_))));
        assert_eq!(client.points_for("waf_events").await.len(), 1);
        assert!(client.points_for("waf_requests").await.is_empty());
        assert_eq!(client.attempts("waf_requests").await, 1);
    }

    #[tokio::test]
    async fn test_log_client_accepts_everything() {
        let client = LogClient;
        assert!(client
            .write_batch(vec![MetricPoint::new("waf_events", Utc::now())])
            .await
            .is_ok());
        assert_eq!(client.name(), "log");
    }

    #[test]
    fn test_error_display() {
        assert_eq!(TimeSeriesError::BufferFull.to_string(), "Write buffer full, point dropped");
        assert_eq!(
            TimeSeriesError::WriteError("timeout".to_string()).to_string(),
            "Write error: timeout"
        );
    }
}
