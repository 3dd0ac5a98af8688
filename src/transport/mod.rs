//! Transport layer for broker communication.
//!
//! The service depends only on the [`Transport`] capability surface, not on
//! any specific protocol implementation; the production MQTT binding lives in
//! [`mqtt`], mocks in [`crate::testing::mocks`].

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

pub mod mqtt;

/// Delivery guarantee requested from the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Qos {
    /// No acknowledgment or retry from the transport.
    AtMostOnce,
    /// Acknowledged delivery.
    AtLeastOnce,
}

/// A raw message received on a subscribed topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// Transport-level errors.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Invalid broker address: {0}")]
    InvalidBrokerAddress(String),
    #[error("Connection failed")]
    ConnectionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Connection confirmation timed out")]
    ConnAckTimeout,
    #[error("Subscription failed")]
    SubscriptionFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Publishing failed")]
    PublishFailed(#[source] Box<dyn std::error::Error + Send + Sync>),
    #[error("Not connected")]
    NotConnected,
}

/// Capability surface of one broker connection.
///
/// One instance represents one connection attempt's handle; the supervisor
/// discards the whole instance on reset and asks its factory for a fresh one
/// when reconnecting.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the connection and authenticate with the session identifier.
    async fn connect(&mut self, session_id: &str) -> Result<(), TransportError>;

    /// Whether the connection is currently usable.
    fn is_connected(&self) -> bool;

    /// Register the sink that receives inbound messages.
    fn set_message_sink(&self, sink: mpsc::Sender<InboundMessage>);

    /// Subscribe to a topic filter.
    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), TransportError>;

    /// Send one payload to a topic.
    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError>;
}

/// Creates fresh [`Transport`] instances for (re)connection attempts.
pub trait TransportFactory: Send + Sync {
    fn create(&self) -> Box<dyn Transport>;
}

pub use mqtt::{
    ConnectionManager, ConnectionPhase, LinkState, MqttTransport, MqttTransportFactory, Publisher,
    RetryPolicy,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        let errors = vec![
            TransportError::InvalidBrokerAddress("not-a-url".to_string()),
            TransportError::ConnectionFailed("refused".to_string().into()),
            TransportError::ConnAckTimeout,
            TransportError::SubscriptionFailed("denied".to_string().into()),
            TransportError::PublishFailed("closed".to_string().into()),
            TransportError::NotConnected,
        ];

        for error in errors {
            assert!(!error.to_string().is_empty());
        }
    }
}
