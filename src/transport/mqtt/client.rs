//! Impure I/O against the broker via `rumqttc`.
//!
//! Wraps the v5 `AsyncClient`/`EventLoop` pair behind the [`Transport`]
//! capability surface: connect success is tied to the broker's ConnAck,
//! inbound publishes are forwarded to the registered sink, and the polling
//! task is aborted when the transport is dropped.

use crate::transport::{InboundMessage, Qos, Transport, TransportError, TransportFactory};
use async_trait::async_trait;
use bytes::Bytes;
use rumqttc::v5::mqttbytes::v5::Packet;
use rumqttc::v5::{mqttbytes::QoS, AsyncClient, Event, EventLoop, MqttOptions};
use rumqttc::Transport as RumqttcTransport;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};
use url::Url;

/// How long to wait for the broker's ConnAck before failing the attempt.
const CONNACK_TIMEOUT: Duration = Duration::from_secs(30);

const KEEP_ALIVE: Duration = Duration::from_secs(60);

type MessageSink = Arc<Mutex<Option<mpsc::Sender<InboundMessage>>>>;

/// Production MQTT transport.
pub struct MqttTransport {
    broker_url: String,
    client: Option<AsyncClient>,
    connected_rx: Option<watch::Receiver<bool>>,
    sink: MessageSink,
    event_loop_handle: Option<JoinHandle<()>>,
}

impl MqttTransport {
    pub fn new(broker_url: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
            client: None,
            connected_rx: None,
            sink: Arc::new(Mutex::new(None)),
            event_loop_handle: None,
        }
    }
}

/// Parse a broker URL into MQTT options for one session.
fn configure_mqtt_options(
    broker_url: &str,
    session_id: &str,
) -> Result<MqttOptions, TransportError> {
    let url = Url::parse(broker_url)
        .map_err(|_| TransportError::InvalidBrokerAddress(broker_url.to_string()))?;

    let host = url
        .host_str()
        .ok_or_else(|| TransportError::InvalidBrokerAddress(broker_url.to_string()))?;
    let port = url
        .port()
        .unwrap_or(if url.scheme() == "mqtts" { 8883 } else { 1883 });

    let mut options = MqttOptions::new(session_id, host, port);
    if url.scheme() == "mqtts" {
        options.set_transport(RumqttcTransport::tls_with_default_config());
    }
    options.set_keep_alive(KEEP_ALIVE);

    Ok(options)
}

/// Poll the event loop, tracking the connected flag and forwarding inbound
/// publishes. Ends on the first transport error; recovery is the
/// supervisor's job.
async fn run_event_loop(
    mut event_loop: EventLoop,
    connected_tx: watch::Sender<bool>,
    sink: MessageSink,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                debug!("broker acknowledged connection");
                let _ = connected_tx.send(true);
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                let message = InboundMessage {
                    topic: String::from_utf8_lossy(&publish.topic).to_string(),
                    payload: publish.payload.to_vec(),
                };
                let sender = sink.lock().ok().and_then(|slot| slot.clone());
                match sender {
                    Some(sender) => {
                        if let Err(error) = sender.send(message).await {
                            warn!(%error, "inbound message dropped: sink closed");
                        }
                    }
                    None => {
                        debug!("inbound message dropped: no sink registered");
                    }
                }
            }
            Ok(Event::Incoming(Packet::Disconnect(_))) => {
                warn!("broker disconnected session");
                let _ = connected_tx.send(false);
            }
            Ok(event) => {
                trace!(?event, "transport event");
            }
            Err(error) => {
                warn!(%error, "transport event loop error");
                let _ = connected_tx.send(false);
                break;
            }
        }
    }
}

/// Wait until the event loop reports ConnAck, or fail.
async fn wait_for_connack(
    mut connected_rx: watch::Receiver<bool>,
    deadline: Duration,
) -> Result<(), TransportError> {
    let confirmed = tokio::time::timeout(deadline, async {
        loop {
            if *connected_rx.borrow() {
                return true;
            }
            if connected_rx.changed().await.is_err() {
                return false;
            }
        }
    })
    .await;

    match confirmed {
        Ok(true) => Ok(()),
        Ok(false) => Err(TransportError::ConnectionFailed(
            "event loop ended before ConnAck".into(),
        )),
        Err(_elapsed) => Err(TransportError::ConnAckTimeout),
    }
}

#[async_trait]
impl Transport for MqttTransport {
    async fn connect(&mut self, session_id: &str) -> Result<(), TransportError> {
        let options = configure_mqtt_options(&self.broker_url, session_id)?;
        let (client, event_loop) = AsyncClient::new(options, 10);
        let (connected_tx, connected_rx) = watch::channel(false);

        let handle = tokio::spawn(run_event_loop(event_loop, connected_tx, self.sink.clone()));

        self.client = Some(client);
        self.connected_rx = Some(connected_rx.clone());
        self.event_loop_handle = Some(handle);

        wait_for_connack(connected_rx, CONNACK_TIMEOUT).await
    }

    fn is_connected(&self) -> bool {
        self.connected_rx.as_ref().map_or(false, |rx| *rx.borrow())
    }

    fn set_message_sink(&self, sink: mpsc::Sender<InboundMessage>) {
        if let Ok(mut slot) = self.sink.lock() {
            *slot = Some(sink);
        }
    }

    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .subscribe(filter, map_qos(qos))
            .await
            .map_err(|error| TransportError::SubscriptionFailed(Box::new(error)))
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let client = self.client.as_ref().ok_or(TransportError::NotConnected)?;
        client
            .publish(topic, QoS::AtMostOnce, false, Bytes::copy_from_slice(payload))
            .await
            .map_err(|error| TransportError::PublishFailed(Box::new(error)))
    }
}

impl Drop for MqttTransport {
    fn drop(&mut self) {
        if let Some(handle) = self.event_loop_handle.take() {
            handle.abort();
        }
    }
}

fn map_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Creates [`MqttTransport`] instances against a fixed broker address.
pub struct MqttTransportFactory {
    broker_url: String,
}

impl MqttTransportFactory {
    pub fn new(broker_url: impl Into<String>) -> Self {
        Self {
            broker_url: broker_url.into(),
        }
    }
}

impl TransportFactory for MqttTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        Box::new(MqttTransport::new(self.broker_url.clone()))
    }
}
