//! Configuration management for cache channel connectors and the service host.
//!
//! Provides hierarchical configuration loading and validation with:
//! - Default values as code base
//! - Configuration file support
//! - Environment variable overrides
//! - Section-wise validation
mod registry;
mod server;
mod socket;
mod topic;
pub use registry::*;
pub use server::*;
pub use socket::*;
pub use topic::*;

use std::env;

use config::Config;
use config::ConfigError;
use config::Environment;
use config::File;
use serde::Deserialize;
use serde::Serialize;

use crate::Error;
use crate::Result;

/// Prefix of environment variables overriding configuration values,
/// e.g. `CACHE_CHANNEL__SOCKET__TOPIC`
pub const ENV_PREFIX: &str = "CACHE_CHANNEL";

/// Transport binding used by a connector
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Publish/subscribe over a named topic of a message broker
    Topic,
    /// Register with a shared remote service that pushes events back
    Registry,
    /// Broker-less PUSH/SUB sockets
    Socket,
    /// No propagation; events are accepted and discarded
    #[default]
    Disabled,
}

impl std::fmt::Display for TransportKind {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        let name = match self {
            TransportKind::Topic => "topic",
            TransportKind::Registry => "registry",
            TransportKind::Socket => "socket",
            TransportKind::Disabled => "disabled",
        };
        f.write_str(name)
    }
}

/// Main configuration container for cache channel components
///
/// Combines all section configurations with hierarchical override support:
/// 1. Default values from code implementation
/// 2. Configuration file specified by `CONFIG_PATH`
/// 3. Environment variables (highest priority)
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct ChannelConfig {
    /// Transport selection
    #[serde(default)]
    pub transport: TransportKind,
    /// Topic-messaging parameters
    #[serde(default)]
    pub topic: TopicConfig,
    /// Registry-push parameters
    #[serde(default)]
    pub registry: RegistryConfig,
    /// Socket-messaging parameters
    #[serde(default)]
    pub socket: SocketConfig,
    /// Service host parameters (registry server, socket relay, metrics, logging)
    #[serde(default)]
    pub server: ServerConfig,
}

impl ChannelConfig {
    /// Loads configuration from hierarchical sources without validation.
    ///
    /// Configuration sources are merged in the following order (later sources override earlier):
    /// 1. Type defaults (lowest priority)
    /// 2. Configuration file from `CONFIG_PATH` environment variable (if set)
    /// 3. Environment variables with `CACHE_CHANNEL__` prefix (highest priority)
    ///
    /// # Note
    /// Validation is deferred so further overrides can be applied with
    /// `with_override_config()`. Callers must call `validate()` before use.
    ///
    /// # Examples
    /// ```ignore
    /// std::env::set_var("CONFIG_PATH", "config/channel.toml");
    /// std::env::set_var("CACHE_CHANNEL__TRANSPORT", "socket");
    /// let cfg = ChannelConfig::new()?.validate()?;
    /// ```
    pub fn new() -> Result<Self> {
        let mut builder = Config::builder().add_source(Config::try_from(&Self::default())?);

        if let Ok(config_path) = env::var("CONFIG_PATH") {
            builder = builder.add_source(File::with_name(&config_path).required(true));
        }

        builder = builder.add_source(env_source());

        let config: Self = builder.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Applies additional configuration overrides from file without validation.
    ///
    /// Merging order (later sources override earlier):
    /// 1. Current configuration values
    /// 2. New configuration file
    /// 3. Latest environment variables (highest priority)
    pub fn with_override_config(
        &self,
        path: &str,
    ) -> Result<Self> {
        let config: Self = Config::builder()
            .add_source(Config::try_from(self)?)
            .add_source(File::with_name(path))
            .add_source(env_source())
            .build()?
            .try_deserialize()?;
        Ok(config)
    }

    /// Validates configuration and returns validated instance.
    ///
    /// Only the section of the selected transport is checked for required
    /// parameters; the server section is always checked.
    pub fn validate(self) -> Result<Self> {
        match self.transport {
            TransportKind::Topic => self.topic.validate()?,
            TransportKind::Registry => self.registry.validate()?,
            TransportKind::Socket => self.socket.validate()?,
            TransportKind::Disabled => {}
        }
        self.server.validate()?;
        Ok(self)
    }
}

fn env_source() -> Environment {
    Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .ignore_empty(true)
        .try_parsing(true)
}

/// Returns the value of a required parameter or a `NotFound` configuration
/// error naming `<section>.<key>`.
pub(crate) fn require<'a>(
    value: &'a Option<String>,
    path: &str,
) -> Result<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::Config(ConfigError::NotFound(path.to_string()))),
    }
}
