use std::sync::Arc;

use config::ConfigError;
use tracing::info;

use super::CacheChannelConnector;
use super::NullConnector;
use crate::config::ChannelConfig;
use crate::config::TransportKind;
use crate::transport::registry::GrpcServiceLocator;
use crate::transport::registry::RegistryConnector;
use crate::transport::registry::ServiceLocator;
use crate::transport::socket::SocketConnector;
use crate::transport::socket::SocketFactory;
use crate::transport::socket::ZmqSocketFactory;
use crate::transport::topic::NamingContext;
use crate::transport::topic::TopicConnector;
use crate::Error;
use crate::Result;

/// Network primitives handed to the connectors.
///
/// Unset entries fall back to the gRPC locator and the ZeroMQ sockets.
/// The topic transport has no built-in naming context, so it must be
/// provided when that transport is selected.
#[derive(Clone, Default)]
pub struct ConnectorDeps {
    pub naming: Option<Arc<dyn NamingContext>>,
    pub service_locator: Option<Arc<dyn ServiceLocator>>,
    pub socket_factory: Option<Arc<dyn SocketFactory>>,
}

impl ConnectorDeps {
    pub fn with_naming(
        mut self,
        naming: Arc<dyn NamingContext>,
    ) -> Self {
        self.naming = Some(naming);
        self
    }

    pub fn with_service_locator(
        mut self,
        locator: Arc<dyn ServiceLocator>,
    ) -> Self {
        self.service_locator = Some(locator);
        self
    }

    pub fn with_socket_factory(
        mut self,
        factory: Arc<dyn SocketFactory>,
    ) -> Self {
        self.socket_factory = Some(factory);
        self
    }
}

/// Creates and configures the connector selected by `config.transport`
pub fn build_connector(
    config: &ChannelConfig,
    deps: ConnectorDeps,
) -> Result<Arc<dyn CacheChannelConnector>> {
    let connector: Arc<dyn CacheChannelConnector> = match config.transport {
        TransportKind::Topic => {
            let naming = deps.naming.ok_or_else(|| {
                Error::Config(ConfigError::Message(
                    "topic transport requires a naming context".to_string(),
                ))
            })?;
            Arc::new(TopicConnector::new(naming))
        }
        TransportKind::Registry => {
            let locator = deps
                .service_locator
                .unwrap_or_else(|| Arc::new(GrpcServiceLocator::from_config(&config.registry)));
            Arc::new(RegistryConnector::new(locator))
        }
        TransportKind::Socket => {
            let factory = deps
                .socket_factory
                .unwrap_or_else(|| Arc::new(ZmqSocketFactory::new()));
            Arc::new(SocketConnector::new(factory))
        }
        TransportKind::Disabled => Arc::new(NullConnector::new()),
    };

    connector.configure(config)?;
    info!(
        "created {} connector {}",
        config.transport,
        connector.identifier()
    );
    Ok(connector)
}
