use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use parking_lot::RwLock;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::warn;

use super::DeliveryMode;
use super::NamingContext;
use super::Topic;
use super::TopicConnection;
use super::TopicConnectionFactory;
use super::TopicMessage;
use crate::constants::INPROC_CHANNEL_CAPACITY;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

/// Embedded topic broker.
///
/// Acts as naming context, connection factory and broker at once. Taking it
/// offline drops every live subscription and rejects publishes and new
/// connections until it is brought back.
#[derive(Clone)]
pub struct InMemoryTopicBroker {
    inner: Arc<BrokerInner>,
}

struct BrokerInner {
    factories: RwLock<HashSet<String>>,
    topics: DashMap<String, broadcast::Sender<TopicMessage>>,
    available: AtomicBool,
    /// Cancelled when the broker goes offline; replaced when it comes back
    outage: Mutex<CancellationToken>,
}

impl Default for InMemoryTopicBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryTopicBroker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                factories: RwLock::new(HashSet::new()),
                topics: DashMap::new(),
                available: AtomicBool::new(true),
                outage: Mutex::new(CancellationToken::new()),
            }),
        }
    }

    /// Makes a connection factory resolvable under `name`
    pub fn register_factory(
        &self,
        name: impl Into<String>,
    ) -> &Self {
        self.inner.factories.write().insert(name.into());
        self
    }

    /// Makes a topic resolvable under `name`
    pub fn register_topic(
        &self,
        name: impl Into<String>,
    ) -> &Self {
        self.inner
            .topics
            .entry(name.into())
            .or_insert_with(|| broadcast::channel(INPROC_CHANNEL_CAPACITY).0);
        self
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    /// Simulates a broker outage (`false`) or recovery (`true`)
    pub fn set_available(
        &self,
        available: bool,
    ) {
        let was = self.inner.available.swap(available, Ordering::AcqRel);
        if was && !available {
            let mut outage = self.inner.outage.lock();
            outage.cancel();
            *outage = CancellationToken::new();
            warn!("in-memory topic broker went offline");
        } else if !was && available {
            debug!("in-memory topic broker is back online");
        }
    }

    fn ensure_available(&self) -> Result<()> {
        if !self.is_available() {
            return Err(ConnectionError::Broker("broker is unavailable".into()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl NamingContext for InMemoryTopicBroker {
    async fn lookup_factory(
        &self,
        name: &str,
        _properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn TopicConnectionFactory>> {
        self.ensure_available()?;
        if !self.inner.factories.read().contains(name) {
            return Err(lookup_failed(name));
        }
        Ok(Arc::new(self.clone()))
    }

    async fn lookup_topic(
        &self,
        name: &str,
    ) -> Result<Topic> {
        self.ensure_available()?;
        if !self.inner.topics.contains_key(name) {
            return Err(lookup_failed(name));
        }
        Ok(Topic::new(name))
    }
}

#[async_trait]
impl TopicConnectionFactory for InMemoryTopicBroker {
    async fn create_connection(
        &self,
        client_id: &str,
    ) -> Result<Arc<dyn TopicConnection>> {
        self.ensure_available()?;
        let outage = self.inner.outage.lock().child_token();
        Ok(Arc::new(InMemoryTopicConnection {
            broker: self.clone(),
            client_id: client_id.to_string(),
            closed: AtomicBool::new(false),
            shutdown: outage,
        }))
    }
}

struct InMemoryTopicConnection {
    broker: InMemoryTopicBroker,
    client_id: String,
    closed: AtomicBool,
    /// Cancelled on close or broker outage
    shutdown: CancellationToken,
}

impl InMemoryTopicConnection {
    fn ensure_usable(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) || self.shutdown.is_cancelled() {
            return Err(ConnectionError::Broker(format!(
                "connection of {} is closed",
                self.client_id
            ))
            .into());
        }
        self.broker.ensure_available()
    }

    fn sender(
        &self,
        topic: &Topic,
    ) -> Result<broadcast::Sender<TopicMessage>> {
        self.broker
            .inner
            .topics
            .get(topic.name())
            .map(|entry| entry.value().clone())
            .ok_or_else(|| lookup_failed(topic.name()))
    }
}

#[async_trait]
impl TopicConnection for InMemoryTopicConnection {
    async fn publish(
        &self,
        topic: &Topic,
        message: TopicMessage,
        _mode: DeliveryMode,
    ) -> Result<()> {
        self.ensure_usable()?;
        // no subscribers is not an error for a topic
        let _ = self.sender(topic)?.send(message);
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &Topic,
    ) -> Result<mpsc::UnboundedReceiver<TopicMessage>> {
        self.ensure_usable()?;
        let mut source = self.sender(topic)?.subscribe();
        let (tx, rx) = mpsc::unbounded_channel();
        let shutdown = self.shutdown.clone();
        let client_id = self.client_id.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    received = source.recv() => match received {
                        Ok(message) => {
                            if tx.send(message).is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(client = %client_id, "subscriber lagged, {} messages skipped", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            }
            debug!(client = %client_id, "subscription ended");
        });

        Ok(rx)
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.shutdown.cancel();
        Ok(())
    }
}

fn lookup_failed(name: &str) -> Error {
    ConnectionError::Lookup {
        name: name.to_string(),
        reason: "name not bound in naming context".into(),
    }
    .into()
}
