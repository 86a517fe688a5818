use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::timeout;
use tonic::async_trait;
use tonic::transport::Channel;
use tonic::transport::Endpoint;
use tonic::Code;
use tonic::Status;
use tracing::debug;
use tracing::error;
use tracing::warn;

use super::RemoteCacheChannelService;
use super::ServiceLocator;
use super::ServiceUri;
use crate::config::RegistryConfig;
use crate::constants::DEFAULT_LISTENER_BUFFER;
use crate::event::CacheEvent;
use crate::proto::cache_channel_service_client::CacheChannelServiceClient;
use crate::proto::AddListenerRequest;
use crate::proto::BroadcastEventRequest;
use crate::proto::CacheEventMessage;
use crate::proto::IsAliveRequest;
use crate::proto::RemoveListenerRequest;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

/// Resolves the cache channel service over gRPC
#[derive(Debug, Clone)]
pub struct GrpcServiceLocator {
    connect_timeout: Duration,
    request_timeout: Duration,
}

impl GrpcServiceLocator {
    pub fn new(
        connect_timeout: Duration,
        request_timeout: Duration,
    ) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        Self::new(config.connect_timeout(), config.request_timeout())
    }

    async fn create_channel(
        &self,
        uri: &ServiceUri,
    ) -> Result<Channel> {
        debug!("create_channel, uri = {}", uri);
        Endpoint::from_shared(uri.endpoint())
            .map_err(|e| ConnectionError::InvalidUri(format!("{}: {}", uri, e)))?
            .connect_timeout(self.connect_timeout)
            .connect()
            .await
            .map_err(|e| {
                ConnectionError::Lookup {
                    name: uri.to_string(),
                    reason: e.to_string(),
                }
                .into()
            })
    }
}

#[async_trait]
impl ServiceLocator for GrpcServiceLocator {
    async fn lookup(
        &self,
        uri: &ServiceUri,
    ) -> Result<Arc<dyn RemoteCacheChannelService>> {
        let channel = self.create_channel(uri).await?;
        let service = GrpcRemoteService {
            client: CacheChannelServiceClient::new(channel),
            service_name: uri.name().to_string(),
            request_timeout: self.request_timeout,
        };

        // An empty client id is never registered; the call only verifies the
        // service name is bound.
        service.is_alive("").await?;
        Ok(Arc::new(service))
    }
}

/// Client side of one bound cache channel service
#[derive(Clone)]
pub struct GrpcRemoteService {
    client: CacheChannelServiceClient<Channel>,
    service_name: String,
    request_timeout: Duration,
}

impl GrpcRemoteService {
    async fn call<T, F>(
        &self,
        operation: &'static str,
        client_id: &str,
        request: F,
    ) -> Result<T>
    where
        F: Future<Output = std::result::Result<tonic::Response<T>, Status>>,
    {
        match timeout(self.request_timeout, request).await {
            Ok(Ok(response)) => Ok(response.into_inner()),
            Ok(Err(status)) => Err(self.map_status(operation, client_id, status)),
            Err(_) => Err(ConnectionError::Timeout {
                operation,
                duration: self.request_timeout,
            }
            .into()),
        }
    }

    fn map_status(
        &self,
        operation: &'static str,
        client_id: &str,
        status: Status,
    ) -> Error {
        match status.code() {
            Code::NotFound => ConnectionError::NotBound(self.service_name.clone()).into(),
            Code::InvalidArgument => ConnectionError::Registration {
                client: client_id.to_string(),
                reason: status.message().to_string(),
            }
            .into(),
            _ => ConnectionError::Remote {
                operation,
                source: Box::new(status),
            }
            .into(),
        }
    }
}

#[async_trait]
impl RemoteCacheChannelService for GrpcRemoteService {
    async fn add_listener(
        &self,
        client_id: &str,
    ) -> Result<mpsc::Receiver<CacheEvent>> {
        let mut client = self.client.clone();
        let request = AddListenerRequest {
            service_name: self.service_name.clone(),
            client_id: client_id.to_string(),
        };
        let mut stream = self.call("add_listener", client_id, client.add_listener(request)).await?;

        let (tx, rx) = mpsc::channel(DEFAULT_LISTENER_BUFFER);
        let client_id = client_id.to_string();
        tokio::spawn(async move {
            loop {
                let message = tokio::select! {
                    _ = tx.closed() => break,
                    message = stream.message() => message,
                };
                match message {
                    Ok(Some(message)) => match CacheEvent::try_from(message) {
                        Ok(event) => {
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => error!(client = %client_id, "dropping invalid push: {}", e),
                    },
                    Ok(None) => {
                        debug!(client = %client_id, "push stream closed by service");
                        break;
                    }
                    Err(status) => {
                        warn!(client = %client_id, "push stream failed: {}", status);
                        break;
                    }
                }
            }
        });

        Ok(rx)
    }

    async fn remove_listener(
        &self,
        client_id: &str,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let request = RemoveListenerRequest {
            service_name: self.service_name.clone(),
            client_id: client_id.to_string(),
        };
        self.call("remove_listener", client_id, client.remove_listener(request)).await?;
        Ok(())
    }

    async fn broadcast_event(
        &self,
        client_id: &str,
        event: &CacheEvent,
    ) -> Result<()> {
        let mut client = self.client.clone();
        let request = BroadcastEventRequest {
            service_name: self.service_name.clone(),
            client_id: client_id.to_string(),
            event: Some(CacheEventMessage::from(event)),
        };
        let response = self.call("broadcast_event", client_id, client.broadcast_event(request)).await?;
        debug!(client = %client_id, "event delivered to {} listeners", response.delivered);
        Ok(())
    }

    async fn is_alive(
        &self,
        client_id: &str,
    ) -> Result<bool> {
        let mut client = self.client.clone();
        let request = IsAliveRequest {
            service_name: self.service_name.clone(),
            client_id: client_id.to_string(),
        };
        let response = self.call("is_alive", client_id, client.is_alive(request)).await?;
        Ok(response.alive)
    }
}
