//! The shared cache channel service.
//!
//! Clients register a push stream with `AddListener`; `BroadcastEvent`
//! fans an event out to every registered client except its originator.
//! A listener whose stream is closed or whose buffer is full is pruned and
//! reported as dead by `IsAlive`, which makes the client reconnect.
use std::sync::Arc;

use dashmap::DashMap;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::watch;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::codec::CompressionEncoding;
use tonic::Request;
use tonic::Response;
use tonic::Status;
use tonic_health::server::health_reporter;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::service_name;
use crate::metrics::DROPPED_EVENTS;
use crate::metrics::REGISTERED_LISTENERS;
use crate::proto::cache_channel_service_server::CacheChannelService;
use crate::proto::cache_channel_service_server::CacheChannelServiceServer;
use crate::proto::AddListenerRequest;
use crate::proto::BroadcastEventRequest;
use crate::proto::BroadcastEventResponse;
use crate::proto::CacheEventMessage;
use crate::proto::IsAliveRequest;
use crate::proto::IsAliveResponse;
use crate::proto::RemoveListenerRequest;
use crate::proto::RemoveListenerResponse;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

type PushSender = mpsc::Sender<std::result::Result<CacheEventMessage, Status>>;

#[derive(Clone)]
pub struct CacheChannelRegistry {
    service_name: String,
    listener_buffer: usize,
    listeners: Arc<DashMap<String, PushSender>>,
}

impl CacheChannelRegistry {
    pub fn new(
        instance: Option<&str>,
        listener_buffer: usize,
    ) -> Self {
        Self {
            service_name: service_name(instance),
            listener_buffer: listener_buffer.max(1),
            listeners: Arc::new(DashMap::new()),
        }
    }

    /// Name the service answers to
    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_registered(
        &self,
        client_id: &str,
    ) -> bool {
        self.listeners.get(client_id).is_some_and(|tx| !tx.is_closed())
    }

    /// Drops every registration; clients notice through their liveness probe
    /// or the end of their push stream
    pub fn clear_listeners(&self) -> usize {
        let count = self.listeners.len();
        self.listeners.clear();
        self.update_gauge();
        warn!("dropped {} listener registrations", count);
        count
    }

    /// Pushes `event` to every listener except `origin`; returns the number
    /// of listeners reached
    pub fn broadcast(
        &self,
        origin: &str,
        event: &CacheEventMessage,
    ) -> u32 {
        let mut delivered = 0;
        let mut dead = Vec::new();

        for entry in self.listeners.iter() {
            if entry.key().eq_ignore_ascii_case(origin) {
                continue;
            }
            match entry.value().try_send(Ok(event.clone())) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    warn!(client = %entry.key(), "listener buffer full, dropping listener");
                    DROPPED_EVENTS.with_label_values(&["registry", "buffer_full"]).inc();
                    dead.push(entry.key().clone());
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(client = %entry.key(), "listener stream closed");
                    dead.push(entry.key().clone());
                }
            }
        }

        for client in dead {
            self.listeners.remove(&client);
        }
        self.update_gauge();
        delivered
    }

    fn check_name(
        &self,
        requested: &str,
    ) -> std::result::Result<(), Status> {
        if requested != self.service_name {
            return Err(Status::not_found(format!(
                "The remote service was not bound to {}",
                requested
            )));
        }
        Ok(())
    }

    fn update_gauge(&self) {
        REGISTERED_LISTENERS.set(self.listeners.len() as i64);
    }
}

#[tonic::async_trait]
impl CacheChannelService for CacheChannelRegistry {
    type AddListenerStream = ReceiverStream<std::result::Result<CacheEventMessage, Status>>;

    async fn add_listener(
        &self,
        request: Request<AddListenerRequest>,
    ) -> std::result::Result<Response<Self::AddListenerStream>, Status> {
        let request = request.into_inner();
        self.check_name(&request.service_name)?;
        if request.client_id.is_empty() {
            return Err(Status::invalid_argument("client_id is required"));
        }

        let (tx, rx) = mpsc::channel(self.listener_buffer);
        if self.listeners.insert(request.client_id.clone(), tx).is_some() {
            debug!(client = %request.client_id, "replacing existing registration");
        }
        self.update_gauge();
        info!(client = %request.client_id, "listener registered");

        Ok(Response::new(ReceiverStream::new(rx)))
    }

    async fn remove_listener(
        &self,
        request: Request<RemoveListenerRequest>,
    ) -> std::result::Result<Response<RemoveListenerResponse>, Status> {
        let request = request.into_inner();
        self.check_name(&request.service_name)?;

        let removed = self.listeners.remove(&request.client_id).is_some();
        self.update_gauge();
        if removed {
            info!(client = %request.client_id, "listener removed");
        }
        Ok(Response::new(RemoveListenerResponse { removed }))
    }

    async fn broadcast_event(
        &self,
        request: Request<BroadcastEventRequest>,
    ) -> std::result::Result<Response<BroadcastEventResponse>, Status> {
        let request = request.into_inner();
        self.check_name(&request.service_name)?;
        let event = request
            .event
            .ok_or_else(|| Status::invalid_argument("event is required"))?;

        let delivered = self.broadcast(&request.client_id, &event);
        debug!(client = %request.client_id, "broadcast reached {} listeners", delivered);
        Ok(Response::new(BroadcastEventResponse { delivered }))
    }

    async fn is_alive(
        &self,
        request: Request<IsAliveRequest>,
    ) -> std::result::Result<Response<IsAliveResponse>, Status> {
        let request = request.into_inner();
        self.check_name(&request.service_name)?;

        let alive = self.is_registered(&request.client_id);
        Ok(Response::new(IsAliveResponse { alive }))
    }
}

/// Serves `registry` on `listener` until `shutdown_signal` changes
pub async fn start_registry_server(
    listener: TcpListener,
    registry: CacheChannelRegistry,
    mut shutdown_signal: watch::Receiver<()>,
) -> Result<()> {
    let (mut health_reporter, health_service) = health_reporter();
    health_reporter
        .set_serving::<CacheChannelServiceServer<CacheChannelRegistry>>()
        .await;

    let local_addr = listener.local_addr()?;
    info!("cache channel service {} listening on {}", registry.service_name(), local_addr);

    if let Err(e) = tonic::transport::Server::builder()
        .add_service(health_service)
        .add_service(
            CacheChannelServiceServer::new(registry)
                .accept_compressed(CompressionEncoding::Gzip)
                .send_compressed(CompressionEncoding::Gzip),
        )
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), async move {
            let _ = shutdown_signal.changed().await;
            warn!("Stopping cache channel service. {}", local_addr);
        })
        .await
    {
        error!("error to start cache channel service :{:?}.", e);
        return Err(Error::Connection(ConnectionError::Transport(e)));
    }
    debug!("cache channel service finished!");
    Ok(())
}
