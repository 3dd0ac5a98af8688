//! Broker connection lifecycle: connect, retry, reset, reconnect.
//!
//! [`ConnectionManager`] exclusively owns the transport handle; every
//! transport mutation happens through its operations, so link notifications
//! and inbound callbacks never touch the connection from foreign contexts.

use super::link::LinkState;
use crate::error::{ServiceError, ServiceResult};
use crate::identity::DeviceIdentity;
use crate::transport::{InboundMessage, Qos, Transport, TransportError, TransportFactory};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::sleep;
use tracing::{debug, info, warn};

/// Wait inserted after a link-layer change before protocol operations, giving
/// DHCP and friends time to finish.
pub const NETWORK_SETTLE_INTERVAL: Duration = Duration::from_secs(6);

/// Polling interval while the link is unavailable.
pub const LINK_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Lifecycle phase of the broker connection.
///
/// Moves forward through connect and subscribe, and falls back to
/// `Disconnected` on any detected failure or an explicit reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Subscribing,
    Connected,
}

/// Retry policy for connection attempts.
///
/// Only failed transport attempts count; waiting for the link to come back is
/// not an attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of failed attempts (None = unlimited).
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    /// Retry until connected, however long it takes.
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    /// Give up after `max_attempts` failed attempts.
    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts),
        }
    }

    pub fn is_exhausted(&self, failed_attempts: u32) -> bool {
        self.max_attempts
            .map_or(false, |max| failed_attempts >= max)
    }
}

/// Owns the single broker connection and its recovery state.
pub struct ConnectionManager {
    identity: DeviceIdentity,
    subscribe_filter: String,
    networked: bool,
    factory: Box<dyn TransportFactory>,
    transport: Mutex<Option<Box<dyn Transport>>>,
    link: LinkState,
    error_count: AtomicU32,
    inbound_tx: mpsc::Sender<InboundMessage>,
    phase_tx: watch::Sender<ConnectionPhase>,
}

impl ConnectionManager {
    pub fn new(
        identity: DeviceIdentity,
        subscribe_filter: String,
        networked: bool,
        factory: Box<dyn TransportFactory>,
        inbound_tx: mpsc::Sender<InboundMessage>,
    ) -> Self {
        let (phase_tx, _phase_rx) = watch::channel(ConnectionPhase::Disconnected);
        Self {
            identity,
            subscribe_filter,
            networked,
            factory,
            transport: Mutex::new(None),
            link: LinkState::new(),
            error_count: AtomicU32::new(0),
            inbound_tx,
            phase_tx,
        }
    }

    /// Current lifecycle phase of the connection.
    pub fn phase(&self) -> ConnectionPhase {
        *self.phase_tx.borrow()
    }

    /// Watch phase transitions, e.g. for health reporting.
    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase_tx.subscribe()
    }

    fn set_phase(&self, phase: ConnectionPhase) {
        self.phase_tx.send_replace(phase);
    }

    /// Link flags shared with platform availability notifications.
    pub fn link(&self) -> &LinkState {
        &self.link
    }

    pub fn is_networked(&self) -> bool {
        self.networked
    }

    /// Running count of publish failures. Never resets.
    pub fn error_count(&self) -> u32 {
        self.error_count.load(Ordering::SeqCst)
    }

    pub(crate) fn record_publish_failure(&self) {
        self.error_count.fetch_add(1, Ordering::SeqCst);
    }

    /// Open the transport, register the inbound sink and subscribe to the
    /// device's command topics, honoring the retry policy.
    ///
    /// Waits the settle interval before the first attempt, and again after
    /// the link reports unavailable and comes back, to avoid hammering a
    /// just-restored link. A non-networked device returns immediately.
    pub async fn connect(&self, policy: &RetryPolicy) -> ServiceResult<()> {
        if !self.networked {
            return Ok(());
        }

        sleep(NETWORK_SETTLE_INTERVAL).await;

        let mut failed_attempts = 0u32;
        loop {
            let mut link_reset = false;
            while !self.link.is_available() {
                sleep(LINK_POLL_INTERVAL).await;
                link_reset = true;
            }
            if link_reset {
                sleep(NETWORK_SETTLE_INTERVAL).await;
            }

            match self.try_open().await {
                Ok(()) => {
                    info!(
                        session_id = %self.identity.session_id,
                        filter = %self.subscribe_filter,
                        "broker connection established"
                    );
                    return Ok(());
                }
                Err(error) => {
                    self.set_phase(ConnectionPhase::Disconnected);
                    failed_attempts += 1;
                    debug!(%error, failed_attempts, "connection attempt failed");
                    if policy.is_exhausted(failed_attempts) {
                        warn!(failed_attempts, "giving up on broker connection");
                        return Err(ServiceError::ConnectRetriesExhausted {
                            attempts: failed_attempts,
                        });
                    }
                }
            }
        }
    }

    /// One full attempt: fresh transport, connect, sink, subscribe, install.
    async fn try_open(&self) -> Result<(), TransportError> {
        self.set_phase(ConnectionPhase::Connecting);
        let mut transport = self.factory.create();
        transport.connect(&self.identity.session_id).await?;
        transport.set_message_sink(self.inbound_tx.clone());

        self.set_phase(ConnectionPhase::Subscribing);
        transport
            .subscribe(&self.subscribe_filter, Qos::AtMostOnce)
            .await?;

        *self.transport.lock().await = Some(transport);
        self.set_phase(ConnectionPhase::Connected);
        Ok(())
    }

    /// Release the transport without reconnecting, detaching the inbound
    /// callback with it. Idempotent.
    pub async fn reset(&self) {
        let mut slot = self.transport.lock().await;
        if slot.take().is_some() {
            debug!("transport released");
        }
        self.set_phase(ConnectionPhase::Disconnected);
    }

    /// Tear down and re-establish the connection; retries without bound.
    pub async fn reconnect(&self) -> ServiceResult<()> {
        self.reset().await;
        self.connect(&RetryPolicy::unbounded()).await
    }

    pub async fn is_connected(&self) -> bool {
        match self.transport.lock().await.as_ref() {
            Some(transport) => transport.is_connected(),
            None => false,
        }
    }

    /// Send a payload on the current transport.
    pub(crate) async fn send(&self, topic: &str, payload: &[u8]) -> Result<(), TransportError> {
        let slot = self.transport.lock().await;
        match slot.as_ref() {
            Some(transport) => transport.publish(topic, payload).await,
            None => Err(TransportError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::mocks::{MockTransportFactory, MockTransportState};
    use std::sync::Arc;

    fn manager_with_state(
        networked: bool,
    ) -> (ConnectionManager, Arc<MockTransportState>, mpsc::Receiver<InboundMessage>) {
        let state = Arc::new(MockTransportState::default());
        let factory = Box::new(MockTransportFactory::new(state.clone()));
        let (inbound_tx, inbound_rx) = mpsc::channel(8);
        let manager = ConnectionManager::new(
            DeviceIdentity {
                unique_id: "ab12".to_string(),
                session_id: "101112-ab12".to_string(),
            },
            "gbcmd/#".to_string(),
            networked,
            factory,
            inbound_tx,
        );
        (manager, state, inbound_rx)
    }

    #[test]
    fn test_retry_policy_unbounded_never_exhausts() {
        let policy = RetryPolicy::unbounded();
        assert!(!policy.is_exhausted(0));
        assert!(!policy.is_exhausted(u32::MAX));
    }

    #[test]
    fn test_retry_policy_bounded() {
        let policy = RetryPolicy::bounded(10);
        assert!(!policy.is_exhausted(9));
        assert!(policy.is_exhausted(10));
        assert!(policy.is_exhausted(11));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_installs_transport_and_subscribes() {
        let (manager, state, _inbound_rx) = manager_with_state(true);
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);

        manager.connect(&RetryPolicy::bounded(1)).await.unwrap();

        assert!(manager.is_connected().await);
        assert_eq!(manager.phase(), ConnectionPhase::Connected);
        assert_eq!(state.created(), 1);
        let subscriptions = state.subscriptions().await;
        assert_eq!(subscriptions, vec![("gbcmd/#".to_string(), Qos::AtMostOnce)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_connect_falls_back_to_disconnected() {
        let (manager, state, _inbound_rx) = manager_with_state(true);
        state.fail_connect(true);

        let result = manager.connect(&RetryPolicy::bounded(2)).await;

        assert!(result.is_err());
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_is_noop_when_not_networked() {
        let (manager, state, _inbound_rx) = manager_with_state(false);

        manager.connect(&RetryPolicy::bounded(1)).await.unwrap();

        assert!(!manager.is_connected().await);
        assert_eq!(state.created(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_connect_gives_up_after_ceiling() {
        let (manager, state, _inbound_rx) = manager_with_state(true);
        state.fail_connect(true);

        let result = manager.connect(&RetryPolicy::bounded(10)).await;

        assert!(matches!(
            result,
            Err(ServiceError::ConnectRetriesExhausted { attempts: 10 })
        ));
        assert_eq!(state.connect_calls(), 10);
        assert!(!manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_is_idempotent() {
        let (manager, _state, _inbound_rx) = manager_with_state(true);
        manager.connect(&RetryPolicy::bounded(1)).await.unwrap();

        manager.reset().await;
        assert!(!manager.is_connected().await);
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);

        manager.reset().await;
        assert!(!manager.is_connected().await);
        assert_eq!(manager.phase(), ConnectionPhase::Disconnected);
        assert!(matches!(
            manager.send("gbdevice/ab12", b"x").await,
            Err(TransportError::NotConnected)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_waits_for_link_availability() {
        let (manager, state, _inbound_rx) = manager_with_state(true);
        manager.link().set_available(false);
        manager.link().take_changed();

        let manager = Arc::new(manager);
        let connecting = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.connect(&RetryPolicy::unbounded()).await })
        };

        // Give the retry loop a few poll cycles against the downed link.
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(state.created(), 0);

        manager.link().set_available(true);
        connecting.await.unwrap().unwrap();
        assert!(manager.is_connected().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_transport() {
        let (manager, state, _inbound_rx) = manager_with_state(true);
        manager.connect(&RetryPolicy::bounded(1)).await.unwrap();
        assert_eq!(state.created(), 1);

        manager.reconnect().await.unwrap();

        assert!(manager.is_connected().await);
        assert_eq!(state.created(), 2);
    }
}
