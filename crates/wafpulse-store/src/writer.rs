//! # Buffered Writer
//!
//! Non-blocking write path. Points are queued to a background task that
//! batches them by size or interval; delivery failures are reported on a
//! [`WriteErrors`] channel instead of to the caller.

use crate::point::MetricPoint;
use crate::timeseriesdb::{TimeSeriesClient, TimeSeriesError};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

/// Buffering options
#[derive(Debug, Clone)]
pub struct BufferOptions {
    /// Points per write request
    pub batch_size: usize,

    /// Maximum time a point waits in the buffer
    pub flush_interval: Duration,

    /// Points that may be queued before new points are dropped
    pub queue_capacity: usize,
}

impl Default for BufferOptions {
    fn default() -> Self {
        Self {
            batch_size: 100,
            flush_interval: Duration::from_millis(1000),
            queue_capacity: 10_000,
        }
    }
}

/// Receiver of asynchronous write failures
pub struct WriteErrors {
    rx: mpsc::UnboundedReceiver<TimeSeriesError>,
}

impl WriteErrors {
    /// Next failure; `None` once the writer is closed and drained
    pub async fn recv(&mut self) -> Option<TimeSeriesError> {
        self.rx.recv().await
    }

    /// Failure already reported, if any
    pub fn try_recv(&mut self) -> Option<TimeSeriesError> {
        self.rx.try_recv().ok()
    }
}

/// Handle to the buffered write path
pub struct BufferedWriter {
    tx: mpsc::Sender<MetricPoint>,
    errors: mpsc::UnboundedSender<TimeSeriesError>,
    task: JoinHandle<()>,
}

impl BufferedWriter {
    /// Start the background flush task
    pub fn spawn(client: Arc<dyn TimeSeriesClient>, options: BufferOptions) -> (Self, WriteErrors) {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let (errors_tx, errors_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(run_flusher(client, rx, errors_tx.clone(), options));

        (
            Self {
                tx,
                errors: errors_tx,
                task,
            },
            WriteErrors { rx: errors_rx },
        )
    }

    /// Queue a point without waiting.
    ///
    /// Returns `false` when the point was dropped; the reason is reported
    /// on the error channel.
    pub fn write(&self, point: MetricPoint) -> bool {
        match self.tx.try_send(point) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                let _ = self.errors.send(TimeSeriesError::BufferFull);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                let _ = self.errors.send(TimeSeriesError::WriterClosed);
                false
            }
        }
    }

    /// Flush queued points and stop the background task
    pub async fn close(self) -> Result<(), TimeSeriesError> {
        let Self { tx, errors, task } = self;
        drop(tx);
        drop(errors);

        task.await
            .map_err(|e| TimeSeriesError::WriterTask(e.to_string()))
    }
}

async fn run_flusher(
    client: Arc<dyn TimeSeriesClient>,
    mut rx: mpsc::Receiver<MetricPoint>,
    errors: mpsc::UnboundedSender<TimeSeriesError>,
    options: BufferOptions,
) {
    let batch_size = options.batch_size.max(1);
    let mut buffer = Vec::with_capacity(batch_size);
    let mut ticker = tokio::time::interval(options.flush_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            received = rx.recv() => match received {
                Some(point) => {
                    buffer.push(point);
                    if buffer.len() >= batch_size {
                        flush(client.as_ref(), &mut buffer, &errors).await;
                    }
                }
                None => {
                    flush(client.as_ref(), &mut buffer, &errors).await;
                    break;
                }
            },
            _ = ticker.tick() => {
                flush(client.as_ref(), &mut buffer, &errors).await;
            }
        }
    }

    debug!(client = client.name(), "Buffered writer stopped");
}

async fn flush(
    client: &dyn TimeSeriesClient,
    buffer: &mut Vec<MetricPoint>,
    errors: &mpsc::UnboundedSender<TimeSeriesError>,
) {
    if buffer.is_empty() {
        return;
    }

    let points = std::mem::take(buffer);
    let count = points.len();
    match client.write_batch(points).await {
        Ok(()) => debug!(count, "Flushed metric points"),
        Err(e) => {
            let _ = errors.send(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timeseriesdb::MemoryClient;
    use chrono::Utc;

    fn point(measurement: &str) -> MetricPoint {
        MetricPoint::new(measurement, Utc::now()).with_field("severity", 1u32)
    }

    #[tokio::test]
    async fn test_close_flushes_pending_points() {
        let client = Arc::new(MemoryClient::new());
        let options = BufferOptions {
            batch_size: 100,
            flush_interval: Duration::from_secs(3600),
            queue_capacity: 16,
        };
        let (writer, _errors) = BufferedWriter::spawn(client.clone(), options);

        assert!(writer.write(point("waf_events")));
        assert!(writer.write(point("waf_events")));
        writer.close().await.unwrap();

        assert_eq!(client.points_for("waf_events").await.len(), 2);
    }

    #[tokio::test]
    async fn test_batch_size_triggers_flush() {
        let client = Arc::new(MemoryClient::new());
        let options = BufferOptions {
            batch_size: 2,
            flush_interval: Duration::from_secs(3600),
            queue_capacity: 16,
        };
        let (writer, _errors) = BufferedWriter::spawn(client.clone(), options);

        writer.write(point("waf_events"));
        writer.write(point("waf_events"));

        for _ in 0..50 {
            if client.points().await.len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(client.points().await.len(), 2);
        writer.close().await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_reported_asynchronously() {
        let client = Arc::new(MemoryClient::new().failing("waf_events"));
        let (writer, mut errors) = BufferedWriter::spawn(client.clone(), BufferOptions::default());

        assert!(writer.write(point("waf_events")));
        writer.close().await.unwrap();

        assert!(matches!(errors.recv().await, Some(TimeSeriesError::WriteError(_))));
        assert!(errors.recv().await.is_none());
        assert_eq!(client.attempts("waf_events").await, 1);
    }
}
