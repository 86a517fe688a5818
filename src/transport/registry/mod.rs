//! Registry-push transport.
//!
//! A connector looks up the shared cache channel service, registers itself
//! as a listener and keeps the returned handle. Broadcasts are direct remote
//! calls tagged with the connector identifier; the service pushes every
//! other client's events back over the registration stream.
//!
//! Broadcast failures are never retried here: the handle is discarded, the
//! disconnect callback fires and the error is returned. The host is
//! expected to call `validate` before retrying.
mod client;
mod server;
pub use client::*;
pub use server::*;


use std::fmt;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
use mockall::automock;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::channel::new_identifier;
use crate::channel::CacheChannelConnector;
use crate::channel::CacheChannelEventListener;
use crate::channel::ConnectionState;
use crate::channel::ListenerSlot;
use crate::channel::StateTracker;
use crate::config::ChannelConfig;
use crate::config::RegistryConfig;
use crate::constants::CLOSE_TIMEOUT_MS;
use crate::constants::REGISTRY_CLIENT_PREFIX;
use crate::constants::REGISTRY_SERVICE_NAME;
use crate::event::CacheEvent;
use crate::metrics::BROADCAST_EVENTS;
use crate::metrics::DROPPED_EVENTS;
use crate::metrics::RECEIVED_EVENTS;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

/// Location of the shared service, rendered as `//host:port/name`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceUri {
    host: String,
    port: u16,
    name: String,
}

impl ServiceUri {
    pub fn new(
        host: impl Into<String>,
        port: u16,
        instance: Option<&str>,
    ) -> Self {
        Self {
            host: host.into(),
            port,
            name: service_name(instance),
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.host.trim(), config.port, config.instance_suffix())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Name the service is bound under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// HTTP/2 endpoint of the gRPC binding
    pub fn endpoint(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServiceUri {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "//{}:{}/{}", self.host, self.port, self.name)
    }
}

/// `CacheChannelService` or `CacheChannelService_<instance>`
pub fn service_name(instance: Option<&str>) -> String {
    match instance.map(str::trim).filter(|s| !s.is_empty()) {
        Some(instance) => format!("{}_{}", REGISTRY_SERVICE_NAME, instance),
        None => REGISTRY_SERVICE_NAME.to_string(),
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceLocator: Send + Sync {
    /// Resolves the service bound at `uri`
    async fn lookup(
        &self,
        uri: &ServiceUri,
    ) -> Result<Arc<dyn RemoteCacheChannelService>>;
}

/// Operations of the shared cache channel service
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteCacheChannelService: Send + Sync {
    /// Registers `client_id`; events broadcast by other clients arrive on
    /// the returned channel until the registration ends
    async fn add_listener(
        &self,
        client_id: &str,
    ) -> Result<mpsc::Receiver<CacheEvent>>;

    async fn remove_listener(
        &self,
        client_id: &str,
    ) -> Result<()>;

    async fn broadcast_event(
        &self,
        client_id: &str,
        event: &CacheEvent,
    ) -> Result<()>;

    /// Whether the service still considers `client_id` registered
    async fn is_alive(
        &self,
        client_id: &str,
    ) -> Result<bool>;
}

/// State shared with the push pump
struct Inbound {
    identifier: String,
    state: StateTracker,
    listener: ListenerSlot,
}

impl Inbound {
    fn handle_event(
        &self,
        event: CacheEvent,
    ) {
        if self.state.is_closed() {
            trace!(client = %self.identifier, "dropping push on closed connector");
            DROPPED_EVENTS
                .with_label_values(&[REGISTRY_CLIENT_PREFIX, "closed"])
                .inc();
            return;
        }
        RECEIVED_EVENTS.with_label_values(&[REGISTRY_CLIENT_PREFIX]).inc();
        self.listener.remote_event(event);
    }

    fn disconnected(&self) {
        if self.state.mark_disconnected() {
            self.listener.disconnected();
        }
    }

    fn log(
        &self,
        message: String,
    ) {
        info!(client = %self.identifier, "{}", message);
        self.listener.log(&message);
    }
}

struct ServiceHandle {
    service: Arc<dyn RemoteCacheChannelService>,
    cancel: CancellationToken,
    pump: JoinHandle<()>,
}

impl ServiceHandle {
    /// The push stream is still open
    fn is_usable(&self) -> bool {
        !self.pump.is_finished()
    }

    async fn discard(self) {
        self.cancel.cancel();
        let _ = self.pump.await;
    }
}

pub struct RegistryConnector {
    inbound: Arc<Inbound>,
    locator: Arc<dyn ServiceLocator>,
    uri: Mutex<Option<ServiceUri>>,
    handle: tokio::sync::Mutex<Option<ServiceHandle>>,
}

impl RegistryConnector {
    pub fn new(locator: Arc<dyn ServiceLocator>) -> Self {
        Self {
            inbound: Arc::new(Inbound {
                identifier: new_identifier(REGISTRY_CLIENT_PREFIX),
                state: StateTracker::new(REGISTRY_CLIENT_PREFIX),
                listener: ListenerSlot::new(),
            }),
            locator,
            uri: Mutex::new(None),
            handle: tokio::sync::Mutex::new(None),
        }
    }

    /// Service location set by `configure`
    pub fn service_uri(&self) -> Option<ServiceUri> {
        self.uri.lock().clone()
    }

    /// Entry point for events pushed by the service.
    ///
    /// Forwards to the listener unless the connector is closed, in which
    /// case the event is dropped silently.
    pub fn handle_event(
        &self,
        event: CacheEvent,
    ) {
        self.inbound.handle_event(event);
    }

    async fn connect(
        &self,
        handle: &mut Option<ServiceHandle>,
    ) -> Result<()> {
        let uri = self.uri.lock().clone().ok_or(Error::NotConfigured)?;
        let id = &self.inbound.identifier;

        self.inbound
            .log(format!("Attempting to look up cache channel service on {}", uri));
        let service = self.locator.lookup(&uri).await?;
        let pushes = service.add_listener(id).await?;

        let cancel = CancellationToken::new();
        let pump = tokio::spawn(pump(pushes, self.inbound.clone(), cancel.clone()));
        *handle = Some(ServiceHandle {
            service,
            cancel,
            pump,
        });
        self.inbound.log("Successfully set cache channel service".to_string());

        if self.inbound.state.mark_connected() {
            self.inbound.listener.connected();
        }
        Ok(())
    }

    /// Probes a held handle; `true` when the service still knows this client
    async fn probe(
        &self,
        handle: &ServiceHandle,
    ) -> bool {
        if !handle.is_usable() {
            return false;
        }
        match handle.service.is_alive(&self.inbound.identifier).await {
            Ok(true) => true,
            Ok(false) => {
                self.inbound.log(
                    "Client no longer valid according to service, will attempt to reconnect"
                        .to_string(),
                );
                false
            }
            Err(e) => {
                warn!(client = %self.inbound.identifier, "liveness probe failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl CacheChannelConnector for RegistryConnector {
    fn identifier(&self) -> &str {
        &self.inbound.identifier
    }

    fn state(&self) -> ConnectionState {
        self.inbound.state.get()
    }

    fn configure(
        &self,
        config: &ChannelConfig,
    ) -> Result<()> {
        self.inbound.state.ensure_open()?;
        config.registry.validate()?;
        let uri = ServiceUri::from_config(&config.registry);
        self.inbound.state.mark_configured()?;
        debug!(client = %self.inbound.identifier, "configured for {}", uri);
        *self.uri.lock() = Some(uri);
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        self.inbound.state.ensure_configured()?;
        let mut handle = self.handle.lock().await;
        self.inbound.state.ensure_open()?;

        if let Some(held) = handle.as_ref() {
            if self.probe(held).await {
                return Ok(());
            }
            if let Some(stale) = handle.take() {
                stale.discard().await;
            }
            self.inbound.disconnected();
        }

        self.connect(&mut handle).await
    }

    async fn broadcast_event(
        &self,
        event: &CacheEvent,
    ) -> Result<()> {
        self.inbound.state.ensure_configured()?;
        let mut handle = self.handle.lock().await;
        self.inbound.state.ensure_open()?;

        if !handle.as_ref().is_some_and(ServiceHandle::is_usable) {
            if let Some(stale) = handle.take() {
                stale.discard().await;
            }
            self.connect(&mut handle).await?;
        }
        let Some(held) = handle.as_ref() else {
            return Err(Error::NotConfigured);
        };

        self.inbound
            .log(format!("Starting broadcasting event for key: {}", event.key()));
        match held.service.broadcast_event(&self.inbound.identifier, event).await {
            Ok(()) => {
                BROADCAST_EVENTS.with_label_values(&[REGISTRY_CLIENT_PREFIX]).inc();
                self.inbound
                    .log(format!("Broadcasting event finished for key: {}", event.key()));
                Ok(())
            }
            Err(e) => {
                warn!(client = %self.inbound.identifier, "broadcast failed, dropping service handle: {}", e);
                if let Some(stale) = handle.take() {
                    stale.discard().await;
                }
                self.inbound.disconnected();
                Err(ConnectionError::Remote {
                    operation: "broadcast_event",
                    source: Box::new(e),
                }
                .into())
            }
        }
    }

    fn set_listener(
        &self,
        listener: Option<Arc<dyn CacheChannelEventListener>>,
    ) {
        self.inbound.listener.set(listener);
    }

    async fn close(&self) {
        let Some(previous) = self.inbound.state.mark_closed() else {
            return;
        };

        if let Some(held) = self.handle.lock().await.take() {
            let service = held.service.clone();
            held.discard().await;
            let deregister = timeout(
                Duration::from_millis(CLOSE_TIMEOUT_MS),
                service.remove_listener(&self.inbound.identifier),
            );
            match deregister.await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!(client = %self.inbound.identifier, "remove_listener failed: {}", e),
                Err(_) => debug!(client = %self.inbound.identifier, "remove_listener timed out"),
            }
        }

        if previous == ConnectionState::Connected {
            self.inbound.listener.disconnected();
        }
        info!(client = %self.inbound.identifier, "registry connector closed");
    }
}

async fn pump(
    mut pushes: mpsc::Receiver<CacheEvent>,
    inbound: Arc<Inbound>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            received = pushes.recv() => match received {
                Some(event) => inbound.handle_event(event),
                None => {
                    warn!(client = %inbound.identifier, "push stream from cache channel service ended");
                    inbound.disconnected();
                    return;
                }
            }
        }
    }
}
