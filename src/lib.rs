//! `dht-mqtt` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, wiring and process
//! exit codes. The measurement cycle lives in [`crate::poller`] where it can be
//! tested deterministically with an injected sensor, sink and logger.

use std::future::Future;
use std::pin::Pin;

pub mod announce;
pub mod config;
pub mod logger;
pub mod mqtt;
pub mod poller;
pub mod publisher;
pub mod reading;
pub mod sensor;
pub mod topic;

#[cfg(test)]
mod test_utils;

/// Boxed future returned by the object-safe capability traits.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// Re-export commonly used types at the crate root
pub use announce::{AnnouncePolicy, Announcer, Discovery};
pub use config::{Config, ConfigError};
pub use logger::{Logger, TracingLogger};
pub use poller::{PollStats, Poller};
pub use publisher::{MessageSink, PublishError, StatePayload, TransportError, publish};
pub use reading::{Reading, TemperatureUnit};
pub use sensor::{SensorError, SensorSource, SensorType};
pub use topic::{TopicRoute, config_topic};
