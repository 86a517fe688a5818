//! Message-broker primitives the topic connector is written against.
//!
//! A naming context resolves a connection factory and a topic by name; the
//! connection publishes to and subscribes on that topic. Implementations
//! wrap a concrete broker client; [`super::InMemoryTopicBroker`] is the
//! embedded one.
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(test)]
use mockall::automock;
use tokio::sync::mpsc;
use tonic::async_trait;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Fire-and-forget; lost on broker restart
    NonPersistent,
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageBody {
    Text(String),
    Bytes(Vec<u8>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    pub body: MessageBody,
    pub properties: HashMap<String, String>,
}

impl TopicMessage {
    pub fn text(body: impl Into<String>) -> Self {
        Self {
            body: MessageBody::Text(body.into()),
            properties: HashMap::new(),
        }
    }

    pub fn with_property(
        mut self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    pub fn property(
        &self,
        name: &str,
    ) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// Resolved topic destination
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    name: String,
}

impl Topic {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait NamingContext: Send + Sync {
    async fn lookup_factory(
        &self,
        name: &str,
        properties: &HashMap<String, String>,
    ) -> Result<Arc<dyn TopicConnectionFactory>>;

    async fn lookup_topic(
        &self,
        name: &str,
    ) -> Result<Topic>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopicConnectionFactory: Send + Sync {
    async fn create_connection(
        &self,
        client_id: &str,
    ) -> Result<Arc<dyn TopicConnection>>;
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait TopicConnection: Send + Sync {
    async fn publish(
        &self,
        topic: &Topic,
        message: TopicMessage,
        mode: DeliveryMode,
    ) -> Result<()>;

    /// Non-durable subscription receiving every message published on
    /// `topic`, own publications included. The stream ends when the
    /// connection is lost.
    async fn subscribe(
        &self,
        topic: &Topic,
    ) -> Result<mpsc::UnboundedReceiver<TopicMessage>>;

    async fn close(&self) -> Result<()>;
}
