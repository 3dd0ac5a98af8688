//! Structured device commands and the action-executor seam.

use async_trait::async_trait;

pub mod decoder;
pub mod dispatcher;

pub use decoder::{decode, FloodGuard};
pub use dispatcher::CommandDispatcher;

/// A decoded control command addressed to this device.
///
/// Segments missing from the topic stay absent; `parameters` carries the raw
/// payload text verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Command {
    pub cmd: Option<String>,
    pub item: Option<String>,
    pub sub_item: Option<String>,
    pub parameters: String,
}

/// Maps a decoded command to an ordered sequence of result strings, or to no
/// result. Implemented by the application; the dispatcher only routes.
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn execute(&self, command: &Command) -> Option<Vec<String>>;
}
