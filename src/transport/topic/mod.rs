//! Topic-messaging transport.
//!
//! Every connector publishes encoded events on one shared topic and keeps a
//! non-durable subscription on it. Messages carry the publisher identifier
//! in the `Client` property; a connector discards its own publications on
//! receipt, the same way the socket transport does.
mod broker;
mod memory;
pub use broker::*;
pub use memory::*;

#[cfg(test)]
mod topic_test;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
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
use crate::constants::CLIENT_PROPERTY;
use crate::constants::TOPIC_CLIENT_PREFIX;
use crate::event::codec;
use crate::event::CacheEvent;
use crate::metrics::BROADCAST_EVENTS;
use crate::metrics::DROPPED_EVENTS;
use crate::metrics::RECEIVED_EVENTS;
use crate::metrics::SELF_ECHO_SUPPRESSED;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone)]
struct TopicSettings {
    connection_factory: String,
    topic: String,
    naming_properties: HashMap<String, String>,
}

/// Live broker session: one connection, its subscription pump and the
/// resolved topic
struct TopicSession {
    connection: Arc<dyn TopicConnection>,
    topic: Topic,
    cancel: CancellationToken,
    delivery: JoinHandle<()>,
}

impl TopicSession {
    fn is_alive(&self) -> bool {
        !self.delivery.is_finished()
    }

    /// Best-effort teardown; errors are only logged
    async fn shutdown(self) {
        self.cancel.cancel();
        let _ = self.delivery.await;
        if let Err(e) = self.connection.close().await {
            debug!("error while closing topic connection: {}", e);
        }
    }
}

pub struct TopicConnector {
    identifier: String,
    naming: Arc<dyn NamingContext>,
    state: Arc<StateTracker>,
    listener: Arc<ListenerSlot>,
    settings: Mutex<Option<TopicSettings>>,
    session: tokio::sync::Mutex<Option<TopicSession>>,
}

impl TopicConnector {
    pub fn new(naming: Arc<dyn NamingContext>) -> Self {
        Self {
            identifier: new_identifier(TOPIC_CLIENT_PREFIX),
            naming,
            state: Arc::new(StateTracker::new(TOPIC_CLIENT_PREFIX)),
            listener: Arc::new(ListenerSlot::new()),
            settings: Mutex::new(None),
            session: tokio::sync::Mutex::new(None),
        }
    }

    /// Makes sure a live session is held, opening one if needed.
    ///
    /// Fires the connect callback when the connector was not connected.
    async fn ensure_session(
        &self,
        session: &mut Option<TopicSession>,
    ) -> Result<()> {
        if session.as_ref().is_some_and(TopicSession::is_alive) {
            return Ok(());
        }
        if let Some(stale) = session.take() {
            warn!(client = %self.identifier, "topic delivery stopped, reopening session");
            stale.shutdown().await;
            if self.state.mark_disconnected() {
                self.listener.disconnected();
            }
        }

        let opened = self.open_session().await?;
        *session = Some(opened);
        if self.state.mark_connected() {
            info!(client = %self.identifier, "connected to topic");
            self.listener.connected();
        }
        Ok(())
    }

    async fn open_session(&self) -> Result<TopicSession> {
        let settings = self.settings.lock().clone().ok_or(Error::NotConfigured)?;

        let factory = self
            .naming
            .lookup_factory(&settings.connection_factory, &settings.naming_properties)
            .await?;
        let topic = self.naming.lookup_topic(&settings.topic).await?;
        let connection = factory.create_connection(&self.identifier).await?;

        let subscription = match connection.subscribe(&topic).await {
            Ok(rx) => rx,
            Err(e) => {
                let _ = connection.close().await;
                return Err(e);
            }
        };

        let cancel = CancellationToken::new();
        let delivery = tokio::spawn(deliver(
            subscription,
            self.identifier.clone(),
            self.state.clone(),
            self.listener.clone(),
            cancel.clone(),
        ));

        debug!(client = %self.identifier, topic = %topic.name(), "topic session opened");
        Ok(TopicSession {
            connection,
            topic,
            cancel,
            delivery,
        })
    }
}

#[async_trait]
impl CacheChannelConnector for TopicConnector {
    fn identifier(&self) -> &str {
        &self.identifier
    }

    fn state(&self) -> ConnectionState {
        self.state.get()
    }

    fn configure(
        &self,
        config: &ChannelConfig,
    ) -> Result<()> {
        self.state.ensure_open()?;
        let settings = TopicSettings {
            connection_factory: config.topic.connection_factory_name()?.to_string(),
            topic: config.topic.topic_name()?.to_string(),
            naming_properties: config.topic.naming_properties.clone(),
        };
        self.state.mark_configured()?;
        debug!(client = %self.identifier, "configured with {:?}", settings);
        *self.settings.lock() = Some(settings);
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        self.state.ensure_configured()?;
        let mut session = self.session.lock().await;
        self.state.ensure_open()?;
        self.ensure_session(&mut session).await
    }

    async fn broadcast_event(
        &self,
        event: &CacheEvent,
    ) -> Result<()> {
        self.state.ensure_configured()?;
        let body = codec::encode(event)?;

        let mut guard = self.session.lock().await;
        self.state.ensure_open()?;
        self.ensure_session(&mut guard).await?;

        let Some(session) = guard.as_ref() else {
            return Err(Error::NotConfigured);
        };
        let message = TopicMessage::text(body).with_property(CLIENT_PROPERTY, self.identifier.as_str());

        match session
            .connection
            .publish(&session.topic, message, DeliveryMode::NonPersistent)
            .await
        {
            Ok(()) => {
                BROADCAST_EVENTS.with_label_values(&[TOPIC_CLIENT_PREFIX]).inc();
                trace!(client = %self.identifier, "published {}", event);
                Ok(())
            }
            Err(e) => {
                warn!(client = %self.identifier, "publish failed, dropping session: {}", e);
                if let Some(stale) = guard.take() {
                    stale.shutdown().await;
                }
                if self.state.mark_disconnected() {
                    self.listener.disconnected();
                }
                Err(ConnectionError::Remote {
                    operation: "publish",
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
        self.listener.set(listener);
    }

    async fn close(&self) {
        let Some(previous) = self.state.mark_closed() else {
            return;
        };
        if let Some(session) = self.session.lock().await.take() {
            session.shutdown().await;
        }
        if previous == ConnectionState::Connected {
            self.listener.disconnected();
        }
        info!(client = %self.identifier, "topic connector closed");
    }
}

async fn deliver(
    mut subscription: mpsc::UnboundedReceiver<TopicMessage>,
    identifier: String,
    state: Arc<StateTracker>,
    listener: Arc<ListenerSlot>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            received = subscription.recv() => match received {
                Some(message) => {
                    let received = on_message(message, &identifier, &state, &listener);
                    trace!(client = %identifier, "topic message {:?}", received);
                }
                None => {
                    warn!(client = %identifier, "topic subscription lost");
                    if state.mark_disconnected() {
                        listener.disconnected();
                    }
                    return;
                }
            }
        }
    }
}

/// What became of one received message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Received {
    Delivered,
    OwnPublication,
    Ignored,
    Dropped,
}

fn on_message(
    message: TopicMessage,
    identifier: &str,
    state: &StateTracker,
    listener: &ListenerSlot,
) -> Received {
    if message
        .property(CLIENT_PROPERTY)
        .is_some_and(|sender| sender.eq_ignore_ascii_case(identifier))
    {
        trace!(client = %identifier, "discarding own publication");
        SELF_ECHO_SUPPRESSED.with_label_values(&[TOPIC_CLIENT_PREFIX]).inc();
        return Received::OwnPublication;
    }

    let text = match &message.body {
        MessageBody::Text(text) => text,
        MessageBody::Bytes(bytes) => {
            warn!(client = %identifier, "ignoring non-text message of {} bytes", bytes.len());
            DROPPED_EVENTS
                .with_label_values(&[TOPIC_CLIENT_PREFIX, "non_text"])
                .inc();
            return Received::Dropped;
        }
    };

    let event = match codec::decode(text) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(client = %identifier, "ignoring message that is not a cache event");
            return Received::Ignored;
        }
        Err(e) => {
            error!(client = %identifier, "failed to decode topic message: {}", e);
            DROPPED_EVENTS
                .with_label_values(&[TOPIC_CLIENT_PREFIX, "decode"])
                .inc();
            return Received::Dropped;
        }
    };
    if state.is_closed() {
        return Received::Ignored;
    }

    RECEIVED_EVENTS.with_label_values(&[TOPIC_CLIENT_PREFIX]).inc();
    listener.remote_event(event);
    Received::Delivered
}
