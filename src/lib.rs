//! Resilient connection-and-dispatch layer between a constrained device and
//! an MQTT broker.
//!
//! # Overview
//!
//! This crate keeps a single logical broker connection alive across network
//! outages, decodes inbound control messages into structured commands,
//! rate-limits and dispatches them to an application-provided action
//! executor, and serializes result publishes back over the shared connection:
//!
//! - [`identity`] - stable device id and bounded session id
//! - [`command`] - topic decoding, flood guard, and dispatch
//! - [`transport`] - the connection supervisor, publisher, and MQTT binding
//! - [`service`] - wiring and lifecycle
//!
//! Publish failures are never thrown at callers; they are absorbed into a
//! monotonically increasing error counter returned from every publish.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use gblink::transport::mqtt::MqttTransportFactory;
//! use gblink::{ActionExecutor, Command, DeviceService, ServiceConfig};
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ActionExecutor for Echo {
//!     async fn execute(&self, command: &Command) -> Option<Vec<String>> {
//!         command.cmd.clone().map(|cmd| vec![cmd])
//!     }
//! }
//!
//! # tokio_test::block_on(async {
//! let config = ServiceConfig::load_from_file(Path::new("gblink.toml"))?;
//! let factory = Box::new(MqttTransportFactory::new(config.mqtt.broker_url.clone()));
//! let service = DeviceService::start(&config, factory, Arc::new(Echo)).await;
//!
//! let errors = service.publish("gbdevice/demo", b"hello").await;
//! assert_eq!(errors, service.error_count());
//! # Ok::<(), gblink::ServiceError>(())
//! # });
//! ```

pub mod command;
pub mod config;
pub mod error;
pub mod identity;
pub mod observability;
pub mod service;
pub mod testing;
pub mod transport;

pub use command::{ActionExecutor, Command, CommandDispatcher};
pub use config::ServiceConfig;
pub use error::{ServiceError, ServiceResult};
pub use identity::DeviceIdentity;
pub use service::DeviceService;
pub use transport::mqtt::{ConnectionManager, ConnectionPhase, LinkState, Publisher, RetryPolicy};
