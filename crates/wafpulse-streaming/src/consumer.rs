//! # Stream Consumer
//!
//! Stream consumer implementations

use crate::stream::{MessageSource, StreamError, StreamMessage};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Stdin};

#[cfg(feature = "kafka")]
pub use kafka::KafkaConsumer;

#[cfg(feature = "kafka")]
mod kafka {
    use crate::config::KafkaConfig;
    use crate::stream::{MessageSource, StreamError, StreamMessage};
    use async_trait::async_trait;
    use rdkafka::config::ClientConfig;
    use rdkafka::consumer::{Consumer, StreamConsumer};
    use rdkafka::error::KafkaError;
    use rdkafka::message::Message;
    use rdkafka::types::RDKafkaErrorCode;
    use std::time::Duration;
    use tracing::info;

    const METADATA_TIMEOUT: Duration = Duration::from_secs(10);

    /// Kafka consumer-group subscription to one topic
    pub struct KafkaConsumer {
        consumer: StreamConsumer,
        topic: String,
    }

    impl KafkaConsumer {
        /// Subscribe and verify the brokers are reachable.
        ///
        /// Blocks on a metadata request; call from a blocking context.
        pub fn connect(config: &KafkaConfig) -> Result<Self, StreamError> {
            let mut client_config = ClientConfig::new();
            client_config
                .set("bootstrap.servers", config.brokers.join(","))
                .set("group.id", &config.group_id)
                .set("enable.auto.commit", "true")
                .set("auto.offset.reset", "latest");
            for (key, value) in &config.properties {
                client_config.set(key, value);
            }

            let consumer: StreamConsumer = client_config
                .create()
                .map_err(|e| StreamError::ConnectionError(e.to_string()))?;

            consumer
                .subscribe(&[config.topic.as_str()])
                .map_err(|e| StreamError::ConnectionError(e.to_string()))?;

            consumer
                .fetch_metadata(Some(&config.topic), METADATA_TIMEOUT)
                .map_err(|e| StreamError::ConnectionError(e.to_string()))?;

            info!(
                brokers = %config.brokers.join(","),
                topic = %config.topic,
                group = %config.group_id,
                "Subscribed to Kafka topic"
            );

            Ok(Self {
                consumer,
                topic: config.topic.clone(),
            })
        }

        pub fn topic(&self) -> &str {
            &self.topic
        }
    }

    /// Rebalance, coordinator and deadline errors do not lose messages
    fn is_transient(error: &KafkaError) -> bool {
        matches!(
            error.rdkafka_error_code(),
            Some(
                RDKafkaErrorCode::RebalanceInProgress
                    | RDKafkaErrorCode::NotCoordinator
                    | RDKafkaErrorCode::CoordinatorNotAvailable
                    | RDKafkaErrorCode::CoordinatorLoadInProgress
                    | RDKafkaErrorCode::RequestTimedOut
                    | RDKafkaErrorCode::OperationTimedOut
                    | RDKafkaErrorCode::IllegalGeneration
                    | RDKafkaErrorCode::UnknownMemberId
            )
        )
    }

    #[async_trait]
    impl MessageSource for KafkaConsumer {
        async fn next_message(&mut self) -> Result<StreamMessage, StreamError> {
            match self.consumer.recv().await {
                Ok(message) => Ok(StreamMessage {
                    key: message.key().map(<[u8]>::to_vec),
                    payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                    partition: Some(message.partition()),
                    offset: Some(message.offset()),
                    timestamp: message.timestamp().to_millis(),
                }),
                Err(e) if is_transient(&e) => Err(StreamError::Transient(e.to_string())),
                Err(e) => Err(StreamError::ReceiveError(e.to_string())),
            }
        }

        fn name(&self) -> &'static str {
            "kafka_consumer"
        }

        async fn close(&mut self) -> Result<(), StreamError> {
            self.consumer.unsubscribe();
            info!(topic = %self.topic, "Unsubscribed from Kafka topic");
            Ok(())
        }
    }
}

/// Newline-delimited JSON source; one event per line.
///
/// End of input closes the stream.
pub struct LineSource<R> {
    reader: R,
    line: Vec<u8>,
    line_number: u64,
}

impl<R: AsyncBufRead + Unpin + Send> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line: Vec::new(),
            line_number: 0,
        }
    }
}

impl LineSource<BufReader<Stdin>> {
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R: AsyncBufRead + Unpin + Send> MessageSource for LineSource<R> {
    async fn next_message(&mut self) -> Result<StreamMessage, StreamError> {
        loop {
            self.line.clear();
            let read = self
                .reader
                .read_until(b'\n', &mut self.line)
                .await
                .map_err(|e| StreamError::ReceiveError(e.to_string()))?;

            if read == 0 {
                return Err(StreamError::StreamClosed);
            }
            self.line_number += 1;

            let payload = self.line.trim_ascii();
            if payload.is_empty() {
                continue;
            }

            return Ok(StreamMessage::new(payload.to_vec()).with_offset(self.line_number as i64 - 1));
        }
    }

    fn name(&self) -> &'static str {
        "ndjson"
    }
}
