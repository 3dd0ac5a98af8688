//! Serialized outbound publishing with pacing and a hard time ceiling.
//!
//! All outbound sends, and any reconnect a send triggers, run strictly one at
//! a time behind a single lock. Failures never propagate to callers; they are
//! absorbed into the error counter and force a reconnect on the next publish.

use super::supervisor::ConnectionManager;
use crate::error::ServiceResult;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{sleep, timeout};
use tracing::warn;

/// Hard ceiling on one publish operation, reconnects included.
pub const PUBLISH_CEILING: Duration = Duration::from_secs(20);

/// Pacing delays around each outbound publish, for constrained links.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PublishPacing {
    pub pre_publish_delay: Duration,
    pub post_publish_delay: Duration,
}

/// Outbound publishing endpoint over the shared connection.
///
/// Cheap to clone; all clones share the same lock and counter.
#[derive(Clone)]
pub struct Publisher {
    manager: Arc<ConnectionManager>,
    pacing: PublishPacing,
    lock: Arc<Mutex<()>>,
}

impl Publisher {
    pub fn new(manager: Arc<ConnectionManager>, pacing: PublishPacing) -> Self {
        Self {
            manager,
            pacing,
            lock: Arc::new(Mutex::new(())),
        }
    }

    /// Publish `payload` to `topic` and return the running publish-failure
    /// count.
    ///
    /// Returns `0` without touching the transport when the device is not
    /// networked. Otherwise the connection is repaired first when it is
    /// absent, dead, or the link reported a change since the last check.
    pub async fn publish(&self, topic: &str, payload: &[u8]) -> u32 {
        let _guard = self.lock.lock().await;

        if !self.manager.is_networked() {
            return 0;
        }

        sleep(self.pacing.pre_publish_delay).await;

        match timeout(PUBLISH_CEILING, self.repair_and_send(topic, payload)).await {
            Ok(Ok(())) => {}
            Ok(Err(error)) => {
                warn!(%error, topic, "publish failed");
                self.manager.link().mark_changed();
                self.manager.record_publish_failure();
            }
            Err(_elapsed) => {
                warn!(topic, "publish exceeded time ceiling");
                self.manager.link().mark_changed();
                self.manager.record_publish_failure();
            }
        }

        sleep(self.pacing.post_publish_delay).await;
        self.manager.error_count()
    }

    async fn repair_and_send(&self, topic: &str, payload: &[u8]) -> ServiceResult<()> {
        loop {
            let connected = self.manager.is_connected().await;
            let link_changed = self.manager.link().take_changed();
            if connected && !link_changed {
                break;
            }
            self.manager.reconnect().await?;
        }
        self.manager.send(topic, payload).await?;
        Ok(())
    }
}
