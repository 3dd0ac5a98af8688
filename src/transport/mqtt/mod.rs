//! MQTT binding of the transport layer.
//!
//! The module is split into four focused sub-modules:
//!
//! - [`link`] - Pure link-availability flags fed by platform notifications
//! - [`supervisor`] - Connection lifecycle: connect, retry, reset, reconnect
//! - [`publisher`] - Serialized outbound publishing with pacing and a ceiling
//! - [`client`] - Impure I/O against the broker via `rumqttc`

pub mod client;
pub mod link;
pub mod publisher;
pub mod supervisor;

pub use client::{MqttTransport, MqttTransportFactory};
pub use link::LinkState;
pub use publisher::{PublishPacing, Publisher, PUBLISH_CEILING};
pub use supervisor::{
    ConnectionManager, ConnectionPhase, RetryPolicy, LINK_POLL_INTERVAL, NETWORK_SETTLE_INTERVAL,
};
