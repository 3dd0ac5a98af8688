//! Observability support for the device link service.

pub mod logging;

pub use logging::{init_default_logging, init_logging, LogFormat};
