//! Cache-invalidation event propagation between cooperating nodes.
//!
//! A host caching framework owns a [`channel::CacheChannelConnector`],
//! publishes a [`event::CacheEvent`] whenever it mutates content and evicts
//! entries when a peer's event arrives through its
//! [`channel::CacheChannelEventListener`]. Three interchangeable transports
//! implement the connector: topic messaging, registry push over gRPC and
//! broker-less ZeroMQ sockets.
pub mod channel;
pub mod config;
pub mod constants;
pub mod event;
pub mod metrics;
pub mod proto;
pub mod transport;

mod errors;
pub use errors::*;

pub use channel::build_connector;
pub use channel::CacheChannelConnector;
pub use channel::CacheChannelEventListener;
pub use channel::ConnectionState;
pub use channel::ConnectorDeps;
pub use config::ChannelConfig;
pub use config::TransportKind;
pub use event::CacheEvent;
pub use event::CacheEventType;
pub use event::CacheKey;

//-----------------------------------------------------------
// Test utils

#[cfg(test)]
pub(crate) mod test_utils;
