//! # Stream Processor
//!
//! Sequential consumption loop: decode, score, persist, and alert on each
//! message, with a background task draining buffered write failures.

use crate::alert::AlertTrigger;
use crate::shutdown::Shutdown;
use crate::sink::{CurrentWrite, MetricsSink, PersistOutcome};
use crate::stream::{MessageSource, StreamErrorKind};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};
use wafpulse_core::{decode_event, AlertEvent, Classification, DecodeError, SecurityEvent, SeverityScore};
use wafpulse_domain_waf::SeverityScorer;
use wafpulse_store::{TimeSeriesError, WriteErrors};

/// Processor lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProcessorState {
    /// Pulling and processing messages
    Running,
    /// No further messages are pulled; buffered writes are being flushed
    Draining,
    /// All resources released
    Stopped,
}

/// Counters owned by one processor instance
#[derive(Debug, Default)]
pub struct ProcessorStats {
    received: AtomicU64,
    decoded: AtomicU64,
    decode_failures: AtomicU64,
    transient_stream_errors: AtomicU64,
    stream_errors: AtomicU64,
    legacy_queued: AtomicU64,
    current_acknowledged: AtomicU64,
    current_failed: AtomicU64,
    buffered_write_failures: AtomicU64,
    alerts: AtomicU64,
}

impl ProcessorStats {
    fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> ProcessorReport {
        ProcessorReport {
            received: self.received.load(Ordering::Relaxed),
            decoded: self.decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            transient_stream_errors: self.transient_stream_errors.load(Ordering::Relaxed),
            stream_errors: self.stream_errors.load(Ordering::Relaxed),
            legacy_queued: self.legacy_queued.load(Ordering::Relaxed),
            current_acknowledged: self.current_acknowledged.load(Ordering::Relaxed),
            current_failed: self.current_failed.load(Ordering::Relaxed),
            buffered_write_failures: self.buffered_write_failures.load(Ordering::Relaxed),
            alerts: self.alerts.load(Ordering::Relaxed),
        }
    }
}

/// Processor counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProcessorReport {
    pub received: u64,
    pub decoded: u64,
    pub decode_failures: u64,
    pub transient_stream_errors: u64,
    pub stream_errors: u64,
    pub legacy_queued: u64,
    pub current_acknowledged: u64,
    pub current_failed: u64,
    pub buffered_write_failures: u64,
    pub alerts: u64,
}

/// Outcome of one successfully decoded message
#[derive(Debug, Clone)]
pub struct ProcessedEvent {
    pub event: SecurityEvent,
    pub classification: Classification,
    pub score: SeverityScore,
    pub persisted: PersistOutcome,
    /// Present when the event was critical
    pub alert: Option<AlertEvent>,
}

/// Stream processor
pub struct StreamProcessor {
    source: Box<dyn MessageSource>,
    sink: MetricsSink,
    write_errors: Option<WriteErrors>,
    scorer: SeverityScorer,
    alerts: AlertTrigger,
    stats: Arc<ProcessorStats>,
    state: watch::Sender<ProcessorState>,
}

impl StreamProcessor {
    pub fn new(
        source: Box<dyn MessageSource>,
        sink: MetricsSink,
        write_errors: WriteErrors,
        scorer: SeverityScorer,
        alerts: AlertTrigger,
    ) -> Self {
        let (state, _) = watch::channel(ProcessorState::Running);
        Self {
            source,
            sink,
            write_errors: Some(write_errors),
            scorer,
            alerts,
            stats: Arc::new(ProcessorStats::default()),
            state,
        }
    }

    /// Watch lifecycle transitions
    pub fn state(&self) -> watch::Receiver<ProcessorState> {
        self.state.subscribe()
    }

    pub fn stats(&self) -> Arc<ProcessorStats> {
        Arc::clone(&self.stats)
    }

    /// Run one raw payload through decode, score, persist and alert
    pub async fn process_payload(&self, payload: &[u8]) -> Result<ProcessedEvent, DecodeError> {
        ProcessorStats::incr(&self.stats.received);

        let (event, classification) = match decode_event(payload) {
            Ok(decoded) => decoded,
            Err(e) => {
                ProcessorStats::incr(&self.stats.decode_failures);
                error!(error = %e, bytes = payload.len(), "Failed to decode security event");
                return Err(e);
            }
        };
        ProcessorStats::incr(&self.stats.decoded);

        let score = self.scorer.score(&event, &classification);

        let persisted = self.sink.persist(&event, &classification, &score).await;
        if persisted.legacy_queued {
            ProcessorStats::incr(&self.stats.legacy_queued);
        }
        match persisted.current {
            CurrentWrite::Acknowledged => ProcessorStats::incr(&self.stats.current_acknowledged),
            CurrentWrite::Failed(_) => ProcessorStats::incr(&self.stats.current_failed),
            CurrentWrite::Disabled => {}
        }

        info!(
            tx_id = %event.transaction_id,
            client_ip = %event.client_ip,
            severity = score.value,
            level = %score.level,
            rule_id = %classification.rule_id,
            "Processed security event"
        );

        let alert = if score.is_critical() {
            ProcessorStats::incr(&self.stats.alerts);
            Some(self.alerts.trigger(&event, &classification, &score))
        } else {
            None
        };

        Ok(ProcessedEvent {
            event,
            classification,
            score,
            persisted,
            alert,
        })
    }

    /// Consume until shutdown or end of stream, then drain and release.
    pub async fn run(mut self, shutdown: Shutdown) -> ProcessorReport {
        info!(
            source = self.source.name(),
            dual_write = self.sink.dual_write(),
            "Stream processor started"
        );

        let drain = self.write_errors.take().map(|errors| {
            tokio::spawn(drain_write_errors(errors, shutdown.clone(), Arc::clone(&self.stats)))
        });

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Shutdown requested, draining");
                    break;
                }
                next = self.source.next_message() => next,
            };

            match next {
                Ok(message) => {
                    // Decode failures are logged and counted in the pipeline
                    let _ = self.process_payload(&message.payload).await;
                }
                Err(e) => match e.kind() {
                    StreamErrorKind::Transient => {
                        ProcessorStats::incr(&self.stats.transient_stream_errors);
                        debug!(error = %e, "Transient stream error");
                    }
                    StreamErrorKind::Closed => {
                        info!(source = self.source.name(), "Inbound stream closed, draining");
                        break;
                    }
                    StreamErrorKind::Other => {
                        ProcessorStats::incr(&self.stats.stream_errors);
                        error!(error = %e, "Stream read error");
                    }
                },
            }
        }

        self.state.send_replace(ProcessorState::Draining);

        let Self {
            mut source,
            sink,
            stats,
            state,
            ..
        } = self;

        if let Err(e) = sink.close().await {
            error!(error = %e, "Failed to flush buffered writes");
        }

        if let Some(handle) = drain {
            match handle.await {
                Ok(mut errors) => {
                    while let Some(e) = errors.try_recv() {
                        report_write_error(&stats, &e);
                    }
                }
                Err(e) => error!(error = %e, "Write error drain task failed"),
            }
        }

        if let Err(e) = source.close().await {
            warn!(error = %e, "Failed to close inbound stream");
        }

        state.send_replace(ProcessorState::Stopped);

        let report = stats.snapshot();
        info!(
            received = report.received,
            decoded = report.decoded,
            alerts = report.alerts,
            "Stream processor stopped"
        );
        report
    }
}

/// Log buffered write failures until shutdown or until the writer closes
async fn drain_write_errors(
    mut errors: WriteErrors,
    shutdown: Shutdown,
    stats: Arc<ProcessorStats>,
) -> WriteErrors {
    loop {
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            received = errors.recv() => match received {
                Some(e) => report_write_error(&stats, &e),
                None => break,
            },
        }
    }
    errors
}

fn report_write_error(stats: &ProcessorStats, error: &TimeSeriesError) {
    ProcessorStats::incr(&stats.buffered_write_failures);
    error!(error = %error, "Buffered metrics write failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkOptions;
    use crate::stream::{ChannelSource, EventSender, StreamError};
    use wafpulse_domain_waf::{GeoResolver, StaticHighRiskList};
    use wafpulse_store::MemoryClient;

    fn processor(client: Arc<MemoryClient>) -> (StreamProcessor, EventSender) {
        let (source, sender) = ChannelSource::new();
        let geo = GeoResolver::disabled();
        let (sink, errors) = MetricsSink::new(client, geo.clone(), SinkOptions::default());
        let scorer = SeverityScorer::new(Arc::new(StaticHighRiskList::placeholder()));
        let processor = StreamProcessor::new(Box::new(source), sink, errors, scorer, AlertTrigger::new(geo));
        (processor, sender)
    }

    fn payload(anomaly_score: u32, rule_id: &str, client_ip: &str) -> Vec<u8> {
        serde_json::json!({
            "transaction": {
                "id": "tx-1",
                "client_ip": client_ip,
                "anomaly_score": anomaly_score,
                "time_stamp": "Tue Jan 16 10:20:30 2024",
                "request": { "method": "GET", "uri": "/" },
                "response": { "http_code": 200 }
            },
            "classification": { "track": "attack", "anomaly_score": anomaly_score, "rule_id": rule_id }
        })
        .to_string()
        .into_bytes()
    }

    #[tokio::test]
    async fn test_process_payload_critical() {
        let client = Arc::new(MemoryClient::new());
        let (processor, _sender) = processor(client);

        let processed = processor
            .process_payload(&payload(50, "942100", "203.0.113.5"))
            .await
            .unwrap();

        assert_eq!(processed.score.value, 80);
        assert!(processed.alert.is_some());
        assert!(matches!(processed.persisted.current, CurrentWrite::Acknowledged));
        assert_eq!(processor.stats().snapshot().alerts, 1);
    }

    #[tokio::test]
    async fn test_process_payload_decode_failure() {
        let client = Arc::new(MemoryClient::new());
        let (processor, _sender) = processor(client.clone());

        assert!(processor.process_payload(b"\xc3\x28").await.is_err());
        assert!(processor.process_payload(b"[1, 2]").await.is_err());

        let report = processor.stats().snapshot();
        assert_eq!(report.received, 2);
        assert_eq!(report.decode_failures, 2);
        assert_eq!(client.attempts("waf_requests").await, 0);
    }

    #[tokio::test]
    async fn test_run_until_stream_closes() {
        let client = Arc::new(MemoryClient::new());
        let (processor, sender) = processor(client.clone());
        let mut state = processor.state();

        sender.send_payload(payload(10, "", "10.1.2.3")).unwrap();
        sender.send_error(StreamError::Transient("rebalance".to_string())).unwrap();
        sender.send_error(StreamError::ReceiveError("broker gone".to_string())).unwrap();
        sender.send_payload("not json").unwrap();
        sender.send_payload(payload(70, "941100", "203.0.113.5")).unwrap();
        drop(sender);

        let report = processor.run(Shutdown::new()).await;

        assert_eq!(report.received, 3);
        assert_eq!(report.decoded, 2);
        assert_eq!(report.decode_failures, 1);
        assert_eq!(report.transient_stream_errors, 1);
        assert_eq!(report.stream_errors, 1);
        assert_eq!(report.legacy_queued, 2);
        assert_eq!(report.current_acknowledged, 2);
        assert_eq!(report.alerts, 1);
        assert_eq!(*state.borrow_and_update(), ProcessorState::Stopped);
        assert_eq!(client.points_for("waf_events").await.len(), 2);
    }

    #[tokio::test]
    async fn test_run_counts_buffered_failures() {
        let client = Arc::new(MemoryClient::new().failing("waf_events"));
        let (processor, sender) = processor(client);

        sender.send_payload(payload(10, "", "10.1.2.3")).unwrap();
        drop(sender);

        let report = processor.run(Shutdown::new()).await;
        assert_eq!(report.buffered_write_failures, 1);
        assert_eq!(report.current_acknowledged, 1);
    }

    #[tokio::test]
    async fn test_run_after_shutdown_pulls_nothing() {
        let client = Arc::new(MemoryClient::new());
        let (processor, sender) = processor(client.clone());
        sender.send_payload(payload(10, "", "10.1.2.3")).unwrap();

        let shutdown = Shutdown::new();
        shutdown.trigger();
        let report = processor.run(shutdown).await;

        assert_eq!(report.received, 0);
        assert!(client.points().await.is_empty());
    }
}
