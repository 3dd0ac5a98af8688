//! Mock implementations for exercising the service without a broker.
//!
//! `MockTransportState` is shared between a factory and every transport it
//! creates, so tests can observe reconnects across transport generations and
//! force failures at specific points.

use crate::command::{ActionExecutor, Command};
use crate::transport::{InboundMessage, Qos, Transport, TransportError, TransportFactory};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};

pub type PublishedMessage = (String, Vec<u8>);

/// Shared state recording everything that happened to mock transports.
#[derive(Debug, Default)]
pub struct MockTransportState {
    published: Mutex<Vec<PublishedMessage>>,
    subscriptions: Mutex<Vec<(String, Qos)>>,
    created: AtomicU32,
    connect_calls: AtomicU32,
    fail_connect: AtomicBool,
    fail_publish: AtomicBool,
    publish_delay_ms: AtomicU64,
    in_flight: AtomicU32,
    max_in_flight: AtomicU32,
    sink: std::sync::Mutex<Option<mpsc::Sender<InboundMessage>>>,
}

impl MockTransportState {
    /// Number of transports the factory has created (one per connect cycle).
    pub fn created(&self) -> u32 {
        self.created.load(Ordering::SeqCst)
    }

    /// Number of connect attempts across all transports.
    pub fn connect_calls(&self) -> u32 {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.published.lock().await.clone()
    }

    pub async fn subscriptions(&self) -> Vec<(String, Qos)> {
        self.subscriptions.lock().await.clone()
    }

    /// Highest number of sends observed in flight at once.
    pub fn max_in_flight(&self) -> u32 {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn fail_connect(&self, fail: bool) {
        self.fail_connect.store(fail, Ordering::SeqCst);
    }

    pub fn fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Hold each send open for `delay`, to observe serialization and drive
    /// the publish ceiling.
    pub fn set_publish_delay(&self, delay: Duration) {
        self.publish_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Sink registered by the most recent connect cycle, for injecting
    /// inbound messages.
    pub fn sink(&self) -> Option<mpsc::Sender<InboundMessage>> {
        self.sink.lock().ok().and_then(|slot| slot.clone())
    }
}

/// Mock transport wired to shared [`MockTransportState`].
pub struct MockTransport {
    state: Arc<MockTransportState>,
    connected: AtomicBool,
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&mut self, _session_id: &str) -> Result<(), TransportError> {
        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_connect.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectionFailed(
                "forced connect failure".into(),
            ));
        }
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn set_message_sink(&self, sink: mpsc::Sender<InboundMessage>) {
        if let Ok(mut slot) = self.state.sink.lock() {
            *slot = Some(sink);
        }
    }

    async fn subscribe(&self, filter: &str, qos: Qos) -> Result<(), TransportError> {
        self.state
            .subscriptions
            .lock()
            .await
            .push((filter.to_string(), qos));
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        if self.state.fail_publish.load(Ordering::SeqCst) {
            return Err(TransportError::PublishFailed(
                "forced publish failure".into(),
            ));
        }

        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);

        let delay = Duration::from_millis(self.state.publish_delay_ms.load(Ordering::SeqCst));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        self.state
            .published
            .lock()
            .await
            .push((topic.to_string(), payload.to_vec()));
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Factory producing [`MockTransport`]s bound to one shared state.
pub struct MockTransportFactory {
    state: Arc<MockTransportState>,
}

impl MockTransportFactory {
    pub fn new(state: Arc<MockTransportState>) -> Self {
        Self { state }
    }
}

impl TransportFactory for MockTransportFactory {
    fn create(&self) -> Box<dyn Transport> {
        self.state.created.fetch_add(1, Ordering::SeqCst);
        Box::new(MockTransport {
            state: self.state.clone(),
            connected: AtomicBool::new(false),
        })
    }
}

/// Mock action executor with a canned result.
pub struct MockExecutor {
    handled: Mutex<Vec<Command>>,
    result: Option<Vec<String>>,
}

impl MockExecutor {
    /// Executor that always produces `items`.
    pub fn with_result(items: Vec<String>) -> Self {
        Self {
            handled: Mutex::new(Vec::new()),
            result: Some(items),
        }
    }

    /// Executor that never produces a result.
    pub fn silent() -> Self {
        Self {
            handled: Mutex::new(Vec::new()),
            result: None,
        }
    }

    pub async fn handled(&self) -> Vec<Command> {
        self.handled.lock().await.clone()
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn execute(&self, command: &Command) -> Option<Vec<String>> {
        self.handled.lock().await.push(command.clone());
        self.result.clone()
    }
}
