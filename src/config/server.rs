use std::net::SocketAddr;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_LISTENER_BUFFER;
use crate::Error;
use crate::Result;

/// Settings of the `cache-channel` service host
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ServerConfig {
    /// Run the shared registry service
    /// Default: false
    #[serde(default)]
    pub registry_enabled: bool,

    /// Default: "0.0.0.0:1099"
    #[serde(default = "default_registry_listen_addr")]
    pub registry_listen_addr: String,

    /// Instance suffix the registry service is bound under
    #[serde(default)]
    pub registry_instance: Option<String>,

    /// Pushes buffered per registered listener before it is considered dead
    /// Default: 1024
    #[serde(default = "default_listener_buffer")]
    pub listener_buffer: usize,

    /// Run the PULL -> PUB socket relay
    /// Default: false
    #[serde(default)]
    pub relay_enabled: bool,

    /// Default: "tcp://0.0.0.0:5557"
    #[serde(default = "default_relay_submission_uri")]
    pub relay_submission_uri: String,

    /// Default: "tcp://0.0.0.0:5556"
    #[serde(default = "default_relay_subscription_uri")]
    pub relay_subscription_uri: String,

    /// Port of the prometheus `/metrics` endpoint, 0 disables it
    /// Default: 0
    #[serde(default)]
    pub metrics_port: u16,

    /// Directory for `cache-channel.log`; logs go to stdout when unset
    #[serde(default)]
    pub log_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            registry_enabled: false,
            registry_listen_addr: default_registry_listen_addr(),
            registry_instance: None,
            listener_buffer: default_listener_buffer(),
            relay_enabled: false,
            relay_submission_uri: default_relay_submission_uri(),
            relay_subscription_uri: default_relay_subscription_uri(),
            metrics_port: 0,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.registry_enabled {
            self.registry_addr()?;
            if self.listener_buffer == 0 {
                return Err(Error::Config(ConfigError::Message(
                    "server.listener_buffer must be greater than 0".into(),
                )));
            }
        }
        if self.relay_enabled {
            if self.relay_submission_uri.trim().is_empty() {
                return Err(Error::Config(ConfigError::NotFound(
                    "server.relay_submission_uri".into(),
                )));
            }
            if self.relay_subscription_uri.trim().is_empty() {
                return Err(Error::Config(ConfigError::NotFound(
                    "server.relay_subscription_uri".into(),
                )));
            }
        }
        Ok(())
    }

    pub fn registry_addr(&self) -> Result<SocketAddr> {
        self.registry_listen_addr.parse().map_err(|e| {
            Error::Config(ConfigError::Message(format!(
                "Invalid server.registry_listen_addr '{}': {}",
                self.registry_listen_addr, e
            )))
        })
    }

    pub fn registry_instance_suffix(&self) -> Option<&str> {
        self.registry_instance.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }
}

fn default_registry_listen_addr() -> String {
    "0.0.0.0:1099".to_string()
}
fn default_listener_buffer() -> usize {
    DEFAULT_LISTENER_BUFFER
}
fn default_relay_submission_uri() -> String {
    "tcp://0.0.0.0:5557".to_string()
}
fn default_relay_subscription_uri() -> String {
    "tcp://0.0.0.0:5556".to_string()
}
