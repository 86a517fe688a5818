//! Channel contract shared by every transport.
//!
//! A host framework drives a connector through
//! `configure -> validate (polled) -> broadcast_event* -> close` and receives
//! remote events and connection transitions through a
//! [`CacheChannelEventListener`].
//!
//! ```text
//! Unconfigured --configure--> Configured --validate--> Connected
//!                                                        |  ^
//!                                        transport fault v  | validate
//!                                                    Disconnected
//! any state --close--> Closed (terminal)
//! ```
mod factory;
mod listener;
mod null;
mod state;
pub use factory::*;
pub use listener::*;
pub use null::*;
pub use state::*;


use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tonic::async_trait;

use crate::config::ChannelConfig;
use crate::event::CacheEvent;
use crate::Result;

/// Callbacks a connector raises towards the host framework
#[cfg_attr(test, automock)]
pub trait CacheChannelEventListener: Send + Sync {
    /// A peer published an event
    fn on_remote_event(
        &self,
        event: CacheEvent,
    );

    /// The connector lost its connection; events may be missed until the
    /// next successful `validate`
    fn on_disconnect(&self);

    /// The connector (re)established its connection
    fn on_connect(&self);

    /// Human-readable lifecycle line
    fn on_log(
        &self,
        _message: &str,
    ) {
    }
}

#[async_trait]
pub trait CacheChannelConnector: Send + Sync {
    /// Process-unique identifier tagging every outbound message
    fn identifier(&self) -> &str;

    fn state(&self) -> ConnectionState;

    /// One-time setup; fails when a required parameter of the selected
    /// transport is missing
    fn configure(
        &self,
        config: &ChannelConfig,
    ) -> Result<()>;

    /// Establishes connectivity when absent and checks liveness when present.
    ///
    /// Hosts poll this periodically; it is cheap when already connected.
    async fn validate(&self) -> Result<()>;

    /// Publishes one event to all peers.
    ///
    /// A connection error means the event was not sent; the caller decides
    /// whether to retry after calling `validate`.
    async fn broadcast_event(
        &self,
        event: &CacheEvent,
    ) -> Result<()>;

    /// Replaces the active listener; `None` installs [`NoopListener`]
    fn set_listener(
        &self,
        listener: Option<Arc<dyn CacheChannelEventListener>>,
    );

    /// Terminal; releases every transport resource. Repeated calls are no-ops.
    async fn close(&self);

    async fn connect(&self) -> Result<()> {
        self.validate().await
    }

    async fn disconnect(&self) {
        self.close().await
    }
}

/// Generates a connector identifier of the form `<transport>-<uuid>`
pub fn new_identifier(transport: &str) -> String {
    format!("{}-{}", transport, uuid::Uuid::new_v4())
}
