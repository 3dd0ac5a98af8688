//! Decoded-command dispatch and result announcement.
//!
//! The dispatcher owns the inbound side of the pipeline: admission, decoding,
//! forwarding to the action executor, and publishing any produced result to
//! the device's announce topic.

use super::decoder::{decode, FloodGuard};
use super::{ActionExecutor, Command};
use crate::identity::DeviceIdentity;
use crate::transport::mqtt::Publisher;
use crate::transport::InboundMessage;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Result announcement published after a command produced output.
#[derive(Debug, Serialize)]
struct Announcement<'a> {
    #[serde(rename = "Dev")]
    device: &'a str,
    #[serde(rename = "Id")]
    unique_id: &'a str,
    #[serde(rename = "Items")]
    items: &'a [String],
}

/// Consumes decoded commands and routes results back out.
pub struct CommandDispatcher {
    executor: Arc<dyn ActionExecutor>,
    publisher: Publisher,
    device_id: String,
    identity: DeviceIdentity,
    announce_topic: String,
    guard: FloodGuard,
}

impl CommandDispatcher {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        publisher: Publisher,
        device_id: String,
        identity: DeviceIdentity,
        announce_prefix: &str,
    ) -> Self {
        let announce_topic = format!("{announce_prefix}{device_id}");
        Self {
            executor,
            publisher,
            device_id,
            identity,
            announce_topic,
            guard: FloodGuard::new(),
        }
    }

    /// Consume inbound messages until the channel closes.
    pub async fn run(mut self, mut inbound: mpsc::Receiver<InboundMessage>) {
        while let Some(message) = inbound.recv().await {
            self.process(message).await;
        }
        debug!("inbound channel closed, dispatcher stopping");
    }

    /// Admission and decoding for one raw inbound message.
    async fn process(&mut self, message: InboundMessage) {
        if !self.guard.admit(&message.topic, message.payload.len()) {
            debug!(topic = %message.topic, "inbound message dropped by flood guard");
            return;
        }

        let parameters = String::from_utf8_lossy(&message.payload);
        let Some(command) = decode(&message.topic, &parameters, &self.identity.unique_id) else {
            debug!(topic = %message.topic, "inbound topic not addressed to this device");
            return;
        };

        self.handle(command).await;
    }

    /// Forward a decoded command to the executor and announce any result.
    pub async fn handle(&self, command: Command) {
        let Some(items) = self.executor.execute(&command).await else {
            return;
        };

        let announcement = Announcement {
            device: &self.device_id,
            unique_id: &self.identity.unique_id,
            items: &items,
        };
        let payload = match serde_json::to_vec(&announcement) {
            Ok(payload) => payload,
            Err(error) => {
                warn!(%error, "failed to encode announcement");
                return;
            }
        };

        let errors = self.publisher.publish(&self.announce_topic, &payload).await;
        info!(
            topic = %self.announce_topic,
            items = items.len(),
            errors,
            "published command result"
        );
    }
}
