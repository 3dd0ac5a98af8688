//! Service wiring: identity, supervisor, publisher, dispatcher.
//!
//! `DeviceService::start` is the construction-time entry point. Its initial
//! connect is bounded so construction always completes; every later reconnect
//! happens on demand inside the publish path and is unbounded.

use crate::command::{ActionExecutor, CommandDispatcher};
use crate::config::ServiceConfig;
use crate::identity::DeviceIdentity;
use crate::transport::mqtt::{ConnectionManager, LinkState, PublishPacing, Publisher, RetryPolicy};
use crate::transport::TransportFactory;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Failed-attempt ceiling for the construction-time connect.
pub const STARTUP_RETRY_CEILING: u32 = 10;

const INBOUND_CHANNEL_CAPACITY: usize = 32;

/// A running device link service.
pub struct DeviceService {
    manager: Arc<ConnectionManager>,
    publisher: Publisher,
    identity: DeviceIdentity,
    dispatcher_handle: JoinHandle<()>,
}

impl DeviceService {
    /// Build and start the service.
    ///
    /// Startup-connect exhaustion is logged, not returned: the service stays
    /// usable and repairs the connection on the first publish that needs it.
    pub async fn start(
        config: &ServiceConfig,
        factory: Box<dyn TransportFactory>,
        executor: Arc<dyn ActionExecutor>,
    ) -> Self {
        let identity = DeviceIdentity::resolve(&config.device.network_id);
        let (inbound_tx, inbound_rx) = mpsc::channel(INBOUND_CHANNEL_CAPACITY);

        let manager = Arc::new(ConnectionManager::new(
            identity.clone(),
            config.mqtt.subscribe_filter.clone(),
            config.device.networked,
            factory,
            inbound_tx,
        ));
        let publisher = Publisher::new(
            manager.clone(),
            PublishPacing {
                pre_publish_delay: config.pre_publish_delay(),
                post_publish_delay: config.post_publish_delay(),
            },
        );

        let dispatcher = CommandDispatcher::new(
            executor,
            publisher.clone(),
            config.device.id.clone(),
            identity.clone(),
            &config.mqtt.announce_prefix,
        );
        let dispatcher_handle = tokio::spawn(dispatcher.run(inbound_rx));

        if let Err(error) = manager
            .connect(&RetryPolicy::bounded(STARTUP_RETRY_CEILING))
            .await
        {
            warn!(%error, "startup connect gave up; will reconnect on demand");
        }

        info!(
            device_id = %config.device.id,
            unique_id = %identity.unique_id,
            networked = config.device.networked,
            "device link service started"
        );

        Self {
            manager,
            publisher,
            identity,
            dispatcher_handle,
        }
    }

    /// Publish application data over the shared connection; returns the
    /// running publish-failure count.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> u32 {
        self.publisher.publish(topic, payload).await
    }

    pub fn publisher(&self) -> &Publisher {
        &self.publisher
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Link flags to wire into the platform's availability notifications.
    pub fn link(&self) -> &LinkState {
        self.manager.link()
    }

    pub fn error_count(&self) -> u32 {
        self.manager.error_count()
    }

    /// Stop the dispatcher and release the transport.
    pub async fn shutdown(self) {
        self.manager.reset().await;
        self.dispatcher_handle.abort();
        info!("device link service stopped");
    }
}
