//! Inbound topic parsing and flood protection.
//!
//! [`decode`] is a pure function over the topic string. [`FloodGuard`]
//! carries the admission state for the inbound loop: size limits and a
//! global debounce window that applies regardless of topic or sender.

use super::Command;
use std::time::{Duration, Instant};

/// Longest accepted payload, in bytes.
pub const MAX_PAYLOAD_BYTES: usize = 4096;

/// Longest accepted topic, in bytes.
pub const MAX_TOPIC_BYTES: usize = 256;

/// Minimum spacing between two admitted inbound messages.
pub const DEBOUNCE_WINDOW: Duration = Duration::from_secs(2);

const PREFIX_LEN: usize = 9;
const BROADCAST_PREFIX: &str = "gbcmd/all";
const UNICAST_PREFIX: &str = "gbcmd/dev";

/// Decode an inbound topic and payload text into a command for this device.
///
/// Topics are matched case-insensitively against `gbcmd/all/...` (command
/// segments from index 2) and `gbcmd/dev/<id>/...` (accepted only when `<id>`
/// equals this device's identifier, segments from index 3). Anything else,
/// including unicast traffic for other devices, decodes to `None`.
pub fn decode(topic: &str, payload_text: &str, device_id: &str) -> Option<Command> {
    let lowered = topic.to_lowercase();
    let prefix = lowered.get(..PREFIX_LEN)?;
    let parts: Vec<&str> = lowered.split('/').collect();

    match prefix {
        BROADCAST_PREFIX => Some(command_parts(&parts, 2, payload_text)),
        UNICAST_PREFIX => {
            let own_id = device_id.to_lowercase();
            match parts.get(2) {
                Some(id) if !id.is_empty() && **id == *own_id => {
                    Some(command_parts(&parts, 3, payload_text))
                }
                _ => None,
            }
        }
        _ => None,
    }
}

/// Positionally map topic segments onto a command. Empty segments leave their
/// position absent without shifting later segments; extras are ignored.
fn command_parts(parts: &[&str], start: usize, payload_text: &str) -> Command {
    let mut command = Command {
        parameters: payload_text.to_string(),
        ..Default::default()
    };

    for (position, part) in parts.iter().skip(start).enumerate() {
        if part.is_empty() {
            continue;
        }
        match position {
            0 => command.cmd = Some((*part).to_string()),
            1 => command.item = Some((*part).to_string()),
            2 => command.sub_item = Some((*part).to_string()),
            _ => {}
        }
    }

    command
}

/// Admission control for inbound messages.
///
/// Oversized messages never stamp the window; an admitted one does, even if
/// it later fails to decode.
#[derive(Debug)]
pub struct FloodGuard {
    window: Duration,
    last_admitted: Option<Instant>,
}

impl FloodGuard {
    pub fn new() -> Self {
        Self::with_window(DEBOUNCE_WINDOW)
    }

    pub fn with_window(window: Duration) -> Self {
        Self {
            window,
            last_admitted: None,
        }
    }

    /// Decide whether an inbound message may proceed to decoding.
    pub fn admit(&mut self, topic: &str, payload_len: usize) -> bool {
        if payload_len > MAX_PAYLOAD_BYTES || topic.len() > MAX_TOPIC_BYTES {
            return false;
        }

        let now = Instant::now();
        if let Some(last) = self.last_admitted {
            if now.duration_since(last) < self.window {
                return false;
            }
        }

        self.last_admitted = Some(now);
        true
    }
}

impl Default for FloodGuard {
    fn default() -> Self {
        Self::new()
    }
}
