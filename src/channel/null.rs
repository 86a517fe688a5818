use std::sync::Arc;

use tonic::async_trait;
use tracing::debug;

use super::new_identifier;
use super::CacheChannelConnector;
use super::CacheChannelEventListener;
use super::ConnectionState;
use super::ListenerSlot;
use super::StateTracker;
use crate::config::ChannelConfig;
use crate::constants::NULL_CLIENT_PREFIX;
use crate::event::CacheEvent;
use crate::Result;

/// Connector used when propagation is disabled.
///
/// Every call succeeds and nothing is ever delivered, but a closed instance
/// still rejects calls like any other connector.
pub struct NullConnector {
    identifier: String,
    state: StateTracker,
    listener: ListenerSlot,
}

impl Default for NullConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl NullConnector {
    pub fn new() -> Self {
        Self {
            identifier: new_identifier(NULL_CLIENT_PREFIX),
            state: StateTracker::new(NULL_CLIENT_PREFIX),
            listener: ListenerSlot::new(),
        }
    }
}

#[async_trait]
impl CacheChannelConnector for NullConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn configure(
        &self,
        _config: &ChannelConfig,
    ) -> Result<()> {
        self.state.mark_configured()
    }

    async fn validate(&self) -> Result<()> {
        self.state.ensure_configured()?;
        if self.state.mark_connected() {
            self.listener.connected();
        }
        Ok(())
    }

    async fn broadcast_event(
        &self,
        event: &CacheEvent,
    ) -> Result<()> {
        self.state.ensure_open()?;
        debug!(client = %self.identifier, "propagation disabled, discarding {}", event);
        Ok(())
    }

    fn set_listener(
        &self,
        listener: Option<Arc<dyn CacheChannelEventListener>>,
    ) {
        self.listener.set(listener);
    }

    async fn close(&self) {
        if let Some(ConnectionState::Connected) = self.state.mark_closed() {
            self.listener.disconnected();
        }
    }
}
