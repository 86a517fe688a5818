use std::sync::Arc;

use arc_swap::ArcSwap;

use super::CacheChannelEventListener;
use crate::event::CacheEvent;

/// Listener used until the host installs its own
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopListener;

impl CacheChannelEventListener for NoopListener {
    fn on_remote_event(
        &self,
        _event: CacheEvent,
    ) {
    }

    fn on_disconnect(&self) {}

    fn on_connect(&self) {}
}

/// Holds the active listener.
///
/// Replacement is a single atomic swap, so background tasks always see
/// either the old or the new listener, never a missing one.
pub struct ListenerSlot {
    inner: ArcSwap<Arc<dyn CacheChannelEventListener>>,
}

impl Default for ListenerSlot {
    fn default() -> Self {
        Self::new()
    }
}

impl ListenerSlot {
    pub fn new() -> Self {
        let noop: Arc<dyn CacheChannelEventListener> = Arc::new(NoopListener);
        Self {
            inner: ArcSwap::from_pointee(noop),
        }
    }

    pub fn set(
        &self,
        listener: Option<Arc<dyn CacheChannelEventListener>>,
    ) {
        let listener = listener.unwrap_or_else(|| Arc::new(NoopListener));
        self.inner.store(Arc::new(listener));
    }

    pub fn current(&self) -> Arc<dyn CacheChannelEventListener> {
        let guard = self.inner.load();
        Arc::clone(&**guard)
    }

    pub fn remote_event(
        &self,
        event: CacheEvent,
    ) {
        self.current().on_remote_event(event);
    }

    pub fn connected(&self) {
        self.current().on_connect();
    }

    pub fn disconnected(&self) {
        self.current().on_disconnect();
    }

    pub fn log(
        &self,
        message: &str,
    ) {
        self.current().on_log(message);
    }
}
