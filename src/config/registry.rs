use std::time::Duration;

use config::ConfigError;
use serde::Deserialize;
use serde::Serialize;

use crate::constants::DEFAULT_CONNECT_TIMEOUT_MS;
use crate::constants::DEFAULT_REGISTRY_HOST;
use crate::constants::DEFAULT_REGISTRY_PORT;
use crate::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use crate::Error;
use crate::Result;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RegistryConfig {
    /// Host running the shared cache channel service
    /// Default: "127.0.0.1"
    #[serde(default = "default_host")]
    pub host: String,

    /// Registry port
    /// Default: 1099
    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional instance suffix; the service is looked up as
    /// `CacheChannelService_<instance>`. An empty string means no suffix.
    #[serde(default)]
    pub instance: Option<String>,

    /// Timeout for establishing the connection to the service
    /// Default: 3000
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Upper bound for each unary remote call
    /// Default: 5000
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            instance: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl RegistryConfig {
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::Config(ConfigError::NotFound("registry.host".into())));
        }
        if self.port == 0 {
            return Err(Error::Config(ConfigError::Message(
                "registry.port must be greater than 0".into(),
            )));
        }
        if self.connect_timeout_ms == 0 || self.request_timeout_ms == 0 {
            return Err(Error::Config(ConfigError::Message(
                "registry timeouts must be greater than 0".into(),
            )));
        }
        Ok(())
    }

    /// Instance suffix with empty strings treated as absent
    pub fn instance_suffix(&self) -> Option<&str> {
        self.instance.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

fn default_host() -> String {
    DEFAULT_REGISTRY_HOST.to_string()
}
fn default_port() -> u16 {
    DEFAULT_REGISTRY_PORT
}
fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
fn default_request_timeout_ms() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_MS
}
