use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

use super::require;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct TopicConfig {
    /// Name under which the connection factory is registered in the naming service
    /// Required when the topic transport is selected
    #[serde(default)]
    pub connection_factory: Option<String>,

    /// Name of the topic carrying cache events
    /// Required when the topic transport is selected
    #[serde(default)]
    pub topic: Option<String>,

    /// Free-form properties handed to the naming lookup
    /// (provider URL, credentials, ...)
    #[serde(default)]
    pub naming_properties: HashMap<String, String>,
}

impl TopicConfig {
    pub fn validate(&self) -> Result<()> {
        self.connection_factory_name()?;
        self.topic_name()?;
        Ok(())
    }

    pub fn connection_factory_name(&self) -> Result<&str> {
        require(&self.connection_factory, "topic.connection_factory")
    }

    pub fn topic_name(&self) -> Result<&str> {
        require(&self.topic, "topic.topic")
    }
}
