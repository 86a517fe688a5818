//! Socket-messaging transport.
//!
//! Two background tasks per connector: the sender drains the outbound queue
//! into a PUSH socket, the receiver reads the SUB socket and hands peer
//! events to the listener. Frames carry the sender identifier, which is how
//! a connector recognises and discards its own publications.
mod inproc;
mod relay;
mod sockets;
mod zmq;
pub use inproc::*;
pub use relay::*;
pub use sockets::*;
pub use zmq::*;


use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tonic::async_trait;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::trace;
use tracing::warn;

use crate::channel::new_identifier;
use crate::channel::CacheChannelConnector;
use crate::channel::CacheChannelEventListener;
use crate::channel::ConnectionState;
use crate::channel::ListenerSlot;
use crate::channel::StateTracker;
use crate::config::ChannelConfig;
use crate::constants::SOCKET_CLIENT_PREFIX;
use crate::event::codec;
use crate::event::CacheEvent;
use crate::metrics::BROADCAST_EVENTS;
use crate::metrics::DROPPED_EVENTS;
use crate::metrics::RECEIVED_EVENTS;
use crate::metrics::SELF_ECHO_SUPPRESSED;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

type OutboundQueue = mpsc::UnboundedReceiver<String>;

#[derive(Debug, Clone)]
struct SocketSettings {
    subscription_uri: String,
    submission_uri: String,
    topic: String,
    poll_interval: Duration,
}

/// Running sender and receiver tasks.
///
/// The sender hands the outbound queue back when it finishes so a restart
/// keeps every event that was enqueued meanwhile.
struct Loops {
    cancel: CancellationToken,
    sender: JoinHandle<OutboundQueue>,
    receiver: JoinHandle<()>,
}

impl Loops {
    fn is_running(&self) -> bool {
        !self.sender.is_finished() && !self.receiver.is_finished()
    }

    /// Cancels both tasks and waits for them; sockets are closed by the
    /// tasks themselves before they return
    async fn stop(self) -> Option<OutboundQueue> {
        self.cancel.cancel();
        let queue = match self.sender.await {
            Ok(queue) => Some(queue),
            Err(e) => {
                error!("socket sender task failed: {}", e);
                None
            }
        };
        if let Err(e) = self.receiver.await {
            error!("socket receiver task failed: {}", e);
        }
        queue
    }
}

/// State shared with the receiver task
struct Inbound {
    identifier: String,
    state: StateTracker,
    listener: ListenerSlot,
}

pub struct SocketConnector {
    inbound: Arc<Inbound>,
    factory: Arc<dyn SocketFactory>,
    settings: Mutex<Option<SocketSettings>>,
    outbound: Mutex<mpsc::UnboundedSender<String>>,
    /// Queue receiver while no sender task owns it
    parked_queue: Mutex<Option<OutboundQueue>>,
    loops: tokio::sync::Mutex<Option<Loops>>,
    shutdown: CancellationToken,
}

impl SocketConnector {
    pub fn new(factory: Arc<dyn SocketFactory>) -> Self {
        let (outbound, queue) = mpsc::unbounded_channel();
        Self {
            inbound: Arc::new(Inbound {
                identifier: new_identifier(SOCKET_CLIENT_PREFIX),
                state: StateTracker::new(SOCKET_CLIENT_PREFIX),
                listener: ListenerSlot::new(),
            }),
            factory,
            settings: Mutex::new(None),
            outbound: Mutex::new(outbound),
            parked_queue: Mutex::new(Some(queue)),
            loops: tokio::sync::Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    /// Opens both sockets and spawns the loops
    async fn start_loops(&self) -> Result<Loops> {
        let settings = self.settings.lock().clone().ok_or(Error::NotConfigured)?;
        let identifier = &self.inbound.identifier;

        let sink = self.factory.push(&settings.submission_uri, identifier).await?;
        let source = match self
            .factory
            .subscribe(&settings.subscription_uri, identifier, &settings.topic)
            .await
        {
            Ok(source) => source,
            Err(e) => {
                sink.close().await;
                return Err(e);
            }
        };
        let queue = self
            .parked_queue
            .lock()
            .take()
            .ok_or(ConnectionError::QueueUnavailable)?;

        let cancel = self.shutdown.child_token();
        let sender = tokio::spawn(send_loop(
            sink,
            queue,
            settings.topic.clone(),
            identifier.clone(),
            settings.poll_interval,
            cancel.clone(),
        ));
        let receiver = tokio::spawn(receive_loop(
            source,
            self.inbound.clone(),
            settings.poll_interval,
            cancel.clone(),
        ));

        debug!(
            client = %identifier,
            "socket loops started (submission {}, subscription {})",
            settings.submission_uri,
            settings.subscription_uri
        );
        Ok(Loops {
            cancel,
            sender,
            receiver,
        })
    }

    /// Tears down loops that exited on their own and reports the loss of
    /// connection. Keeps the outbound queue, or replaces it when it died
    /// with the sender task.
    async fn reclaim(
        &self,
        stale: Loops,
    ) {
        warn!(client = %self.inbound.identifier, "socket loop exited, restarting");
        if self.inbound.state.mark_disconnected() {
            self.inbound.listener.disconnected();
        }
        let queue = match stale.stop().await {
            Some(queue) => queue,
            None => {
                warn!(client = %self.inbound.identifier, "outbound queue lost with the sender task, pending events dropped");
                let (outbound, queue) = mpsc::unbounded_channel();
                *self.outbound.lock() = outbound;
                queue
            }
        };
        *self.parked_queue.lock() = Some(queue);
    }
}

impl Drop for SocketConnector {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[async_trait]
impl CacheChannelConnector for SocketConnector {
    fn identifier(&self) -> &str {
        &self.inbound.identifier
    }

    fn state(&self) -> ConnectionState {
        self.inbound.state.get()
    }

    fn configure(
        &self,
        config: &ChannelConfig,
    ) -> Result<()> {
        self.inbound.state.ensure_open()?;
        config.socket.validate()?;
        let settings = SocketSettings {
            subscription_uri: config.socket.subscription_endpoint()?.to_string(),
            submission_uri: config.socket.submission_endpoint()?.to_string(),
            topic: config.socket.topic.clone(),
            poll_interval: config.socket.poll_interval(),
        };
        self.inbound.state.mark_configured()?;
        debug!(client = %self.inbound.identifier, "configured with {:?}", settings);
        *self.settings.lock() = Some(settings);
        Ok(())
    }

    async fn validate(&self) -> Result<()> {
        self.inbound.state.ensure_configured()?;
        let mut loops = self.loops.lock().await;
        self.inbound.state.ensure_open()?;

        if loops.as_ref().is_some_and(Loops::is_running) {
            return Ok(());
        }
        if let Some(stale) = loops.take() {
            self.reclaim(stale).await;
        }

        *loops = Some(self.start_loops().await?);
        if self.inbound.state.mark_connected() {
            info!(client = %self.inbound.identifier, "socket loops running");
            self.inbound.listener.connected();
        }
        Ok(())
    }

    async fn broadcast_event(
        &self,
        event: &CacheEvent,
    ) -> Result<()> {
        self.inbound.state.ensure_open()?;
        let payload = codec::encode(event)?;

        let queued = self.outbound.lock().send(payload);
        match queued {
            Ok(()) => {
                BROADCAST_EVENTS.with_label_values(&[SOCKET_CLIENT_PREFIX]).inc();
                trace!(client = %self.inbound.identifier, "queued {}", event);
            }
            Err(_) => {
                error!(client = %self.inbound.identifier, "outbound queue rejected {}, dropping", event);
                DROPPED_EVENTS
                    .with_label_values(&[SOCKET_CLIENT_PREFIX, "enqueue"])
                    .inc();
            }
        }
        Ok(())
    }

    fn set_listener(
        &self,
        listener: Option<Arc<dyn CacheChannelEventListener>>,
    ) {
        self.inbound.listener.set(listener);
    }

    async fn close(&self) {
        let Some(previous) = self.inbound.state.mark_closed() else {
            return;
        };
        self.shutdown.cancel();
        if let Some(loops) = self.loops.lock().await.take() {
            let _ = loops.stop().await;
        }
        if previous == ConnectionState::Connected {
            self.inbound.listener.disconnected();
        }
        info!(client = %self.inbound.identifier, "socket connector closed");
    }
}

async fn send_loop(
    mut sink: Box<dyn FrameSink>,
    mut queue: OutboundQueue,
    topic: String,
    identifier: String,
    poll_interval: Duration,
    cancel: CancellationToken,
) -> OutboundQueue {
    loop {
        let payload = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = timeout(poll_interval, queue.recv()) => match next {
                Err(_) => continue,
                Ok(Some(payload)) => payload,
                // connector dropped
                Ok(None) => break,
            }
        };

        let frame = Frame::new(topic.as_str(), identifier.as_str(), payload);
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = sink.send(frame) => match sent {
                Ok(()) => debug!(client = %identifier, "frame sent"),
                Err(e) => {
                    error!(client = %identifier, "failed to send frame, dropping event: {}", e);
                    DROPPED_EVENTS
                        .with_label_values(&[SOCKET_CLIENT_PREFIX, "send"])
                        .inc();
                }
            }
        }
    }

    sink.close().await;
    debug!(client = %identifier, "socket sender stopped");
    queue
}

async fn receive_loop(
    mut source: Box<dyn FrameSource>,
    inbound: Arc<Inbound>,
    poll_interval: Duration,
    cancel: CancellationToken,
) {
    let identifier = inbound.identifier.as_str();
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = timeout(poll_interval, source.recv()) => match next {
                Err(_) => continue,
                Ok(Ok(frame)) => on_frame(frame, &inbound),
                Ok(Err(Error::Codec(e))) => {
                    error!(client = %identifier, "dropping malformed frame: {}", e);
                    DROPPED_EVENTS
                        .with_label_values(&[SOCKET_CLIENT_PREFIX, "frame"])
                        .inc();
                }
                Ok(Err(e)) => {
                    warn!(client = %identifier, "socket receive failed: {}", e);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(poll_interval) => {}
                    }
                }
            }
        }
    }

    source.close().await;
    debug!(client = %identifier, "socket receiver stopped");
}

fn on_frame(
    frame: Frame,
    inbound: &Inbound,
) {
    let identifier = inbound.identifier.as_str();
    debug!(client = %identifier, sender = %frame.client, topic = %frame.topic, "frame received");

    if frame.client.eq_ignore_ascii_case(identifier) {
        trace!(client = %identifier, "discarding own publication");
        SELF_ECHO_SUPPRESSED.with_label_values(&[SOCKET_CLIENT_PREFIX]).inc();
        return;
    }

    let event = match codec::decode(&frame.payload) {
        Ok(Some(event)) => event,
        Ok(None) => {
            debug!(client = %identifier, "ignoring payload that is not a cache event");
            return;
        }
        Err(e) => {
            error!(client = %identifier, "failed to decode frame payload: {}", e);
            DROPPED_EVENTS
                .with_label_values(&[SOCKET_CLIENT_PREFIX, "decode"])
                .inc();
            return;
        }
    };
    if inbound.state.is_closed() {
        return;
    }

    RECEIVED_EVENTS.with_label_values(&[SOCKET_CLIENT_PREFIX]).inc();
    inbound.listener.remote_event(event);
}
