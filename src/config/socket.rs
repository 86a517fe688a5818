use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use super::require;
use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::constants::DEFAULT_TOPIC;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct SocketConfig {
    /// Endpoint the SUB socket connects to (relay PUB side)
    /// Required when the socket transport is selected
    #[serde(default)]
    pub subscription_uri: Option<String>,

    /// Endpoint the PUSH socket connects to (relay PULL side)
    /// Required when the socket transport is selected
    #[serde(default)]
    pub submission_uri: Option<String>,

    /// Topic filter; also sent as the first frame of every message
    /// Default: "CacheChannel"
    #[serde(default = "default_topic")]
    pub topic: String,

    /// Bounded wait used by both background loops; cancellation is
    /// observed within one interval
    /// Default: 1000
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            subscription_uri: None,
            submission_uri: None,
            topic: default_topic(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl SocketConfig {
    pub fn validate(&self) -> Result<()> {
        self.subscription_endpoint()?;
        self.submission_endpoint()?;
        if self.poll_interval_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "socket.poll_interval_ms must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    pub fn subscription_endpoint(&self) -> Result<&str> {
        require(&self.subscription_uri, "socket.subscription_uri")
    }

    pub fn submission_endpoint(&self) -> Result<&str> {
        require(&self.submission_uri, "socket.submission_uri")
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_topic() -> String {
    DEFAULT_TOPIC.to_string()
}
fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}
