//! Stable device identity and per-session client identifier.
//!
//! Resolved once at startup and never mutated afterwards.

use chrono::{Timelike, Utc};
use uuid::Uuid;

/// MQTT allows at most 23 bytes for a client identifier.
pub const MAX_SESSION_ID_LEN: usize = 23;

/// Immutable identity of this device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable identifier used to match unicast command topics.
    pub unique_id: String,
    /// Time-seeded transport client identifier, bounded to the MQTT maximum.
    pub session_id: String,
}

impl DeviceIdentity {
    /// Resolve the identity from the configured network id.
    ///
    /// A non-empty network id is used verbatim apart from stripping path
    /// separators (they would corrupt topic matching). An empty one falls
    /// back to a platform-derived id, then to a freshly generated UUID.
    pub fn resolve(network_id: &str) -> Self {
        let unique_id = resolve_unique_id(network_id);
        let session_id = create_session_id(&unique_id);
        Self {
            unique_id,
            session_id,
        }
    }
}

fn resolve_unique_id(network_id: &str) -> String {
    if network_id.is_empty() {
        match platform_device_id() {
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        }
    } else {
        network_id.replace('/', "")
    }
}

/// Machine-scoped identifier, when the platform exposes one.
fn platform_device_id() -> Option<String> {
    std::fs::read_to_string("/etc/machine-id")
        .ok()
        .map(|raw| raw.trim().to_string())
        .filter(|id| !id.is_empty())
}

fn create_session_id(unique_id: &str) -> String {
    let now = Utc::now();
    let session_id = format!(
        "{}{}{}-{}",
        now.hour(),
        now.minute(),
        now.second(),
        unique_id
    );
    truncate_to(session_id, MAX_SESSION_ID_LEN)
}

fn truncate_to(mut value: String, max_bytes: usize) -> String {
    if value.len() <= max_bytes {
        return value;
    }
    let mut cut = max_bytes;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    value.truncate(cut);
    value
}
