//! # Stream Abstraction
//!
//! Inbound message sources and the classification of their errors

use async_trait::async_trait;
use tokio::sync::mpsc;

/// One inbound message
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamMessage {
    pub key: Option<Vec<u8>>,
    pub payload: Vec<u8>,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
    /// Broker timestamp in milliseconds
    pub timestamp: Option<i64>,
}

impl StreamMessage {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            ..Default::default()
        }
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// Inbound stream of raw messages
#[async_trait]
pub trait MessageSource: Send {
    /// Wait for the next message
    async fn next_message(&mut self) -> Result<StreamMessage, StreamError>;

    fn name(&self) -> &'static str;

    /// Release the underlying connection
    async fn close(&mut self) -> Result<(), StreamError> {
        Ok(())
    }
}

/// How the processor reacts to a stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamErrorKind {
    /// Rebalance, coordinator or deadline class; no message loss
    Transient,
    /// The stream ended; no further messages will arrive
    Closed,
    Other,
}

/// Stream error
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Transient stream error: {0}")]
    Transient(String),

    #[error("Receive error: {0}")]
    ReceiveError(String),

    #[error("Stream closed")]
    StreamClosed,
}

impl StreamError {
    pub fn kind(&self) -> StreamErrorKind {
        match self {
            StreamError::Transient(_) => StreamErrorKind::Transient,
            StreamError::StreamClosed => StreamErrorKind::Closed,
            StreamError::ConnectionError(_) | StreamError::ReceiveError(_) => StreamErrorKind::Other,
        }
    }
}

/// In-process source fed through an [`EventSender`]
pub struct ChannelSource {
    receiver: mpsc::UnboundedReceiver<Result<StreamMessage, StreamError>>,
}

impl ChannelSource {
    /// Create a source and the handle that feeds it
    pub fn new() -> (Self, EventSender) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { receiver }, EventSender { sender })
    }
}

#[async_trait]
impl MessageSource for ChannelSource {
    async fn next_message(&mut self) -> Result<StreamMessage, StreamError> {
        match self.receiver.recv().await {
            Some(received) => received,
            None => Err(StreamError::StreamClosed),
        }
    }

    fn name(&self) -> &'static str {
        "channel"
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.receiver.close();
        Ok(())
    }
}

/// Event sender handle for external components.
///
/// Dropping every sender closes the source.
#[derive(Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<Result<StreamMessage, StreamError>>,
}

impl EventSender {
    pub fn send(&self, message: StreamMessage) -> Result<(), StreamError> {
        self.sender
            .send(Ok(message))
            .map_err(|_| StreamError::StreamClosed)
    }

    /// Send a raw payload
    pub fn send_payload(&self, payload: impl Into<Vec<u8>>) -> Result<(), StreamError> {
        self.send(StreamMessage::new(payload))
    }

    /// Deliver a read error to the consumer of the source
    pub fn send_error(&self, error: StreamError) -> Result<(), StreamError> {
        self.sender
            .send(Err(error))
            .map_err(|_| StreamError::StreamClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(StreamError::Transient("rebalance".to_string()).kind(), StreamErrorKind::Transient);
        assert_eq!(StreamError::StreamClosed.kind(), StreamErrorKind::Closed);
        assert_eq!(StreamError::ReceiveError("broker down".to_string()).kind(), StreamErrorKind::Other);
        assert_eq!(StreamError::ConnectionError("refused".to_string()).kind(), StreamErrorKind::Other);
    }

    #[test]
    fn test_stream_error_display() {
        assert_eq!(StreamError::StreamClosed.to_string(), "Stream closed");
        assert_eq!(
            StreamError::ConnectionError("connection failed".to_string()).to_string(),
            "Connection error: connection failed"
        );
    }

    #[tokio::test]
    async fn test_channel_source_delivers_in_order() {
        let (mut source, sender) = ChannelSource::new();
        sender.send_payload("first").unwrap();
        sender.send_error(StreamError::Transient("rebalance".to_string())).unwrap();
        sender.send(StreamMessage::new("second").with_offset(7)).unwrap();
        drop(sender);

        assert_eq!(source.next_message().await.unwrap().payload, b"first".to_vec());
        assert!(matches!(source.next_message().await, Err(StreamError::Transient(_))));
        let second = source.next_message().await.unwrap();
        assert_eq!(second.offset, Some(7));
        assert!(matches!(source.next_message().await, Err(StreamError::StreamClosed)));
    }

    #[tokio::test]
    async fn test_send_after_close_fails() {
        let (mut source, sender) = ChannelSource::new();
        source.close().await.unwrap();
        assert!(sender.send_payload("late").is_err());
    }
}
