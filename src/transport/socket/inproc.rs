use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tonic::async_trait;
use tracing::debug;
use tracing::warn;

use super::push_identity;
use super::sub_identity;
use super::Frame;
use super::FrameSink;
use super::FrameSource;
use super::SocketFactory;
use crate::constants::INPROC_CHANNEL_CAPACITY;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

/// In-process socket hub.
///
/// Stands in for a relay plus its two endpoints: every frame pushed by any
/// sink reaches every source whose topic filter is a prefix of the frame
/// topic, as with ZeroMQ subscriptions. Endpoints are accepted and ignored.
#[derive(Clone)]
pub struct InProcHub {
    inner: Arc<HubInner>,
}

struct HubInner {
    frames: broadcast::Sender<Frame>,
    available: AtomicBool,
}

impl Default for InProcHub {
    fn default() -> Self {
        Self::new()
    }
}

impl InProcHub {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HubInner {
                frames: broadcast::channel(INPROC_CHANNEL_CAPACITY).0,
                available: AtomicBool::new(true),
            }),
        }
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    /// While unavailable, opening sockets and sending fail
    pub fn set_available(
        &self,
        available: bool,
    ) {
        if self.inner.available.swap(available, Ordering::AcqRel) != available {
            debug!("in-process hub available: {}", available);
        }
    }

    /// Publishes a raw frame as if a foreign peer had sent it
    pub fn inject(
        &self,
        frame: Frame,
    ) -> usize {
        self.inner.frames.send(frame).unwrap_or(0)
    }

    /// Number of open sources
    pub fn subscriber_count(&self) -> usize {
        self.inner.frames.receiver_count()
    }

    fn ensure_available(
        &self,
        endpoint: &str,
    ) -> Result<()> {
        if !self.is_available() {
            return Err(ConnectionError::Socket {
                endpoint: endpoint.to_string(),
                reason: "in-process hub is unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

#[async_trait]
impl SocketFactory for InProcHub {
    async fn push(
        &self,
        endpoint: &str,
        identity: &str,
    ) -> Result<Box<dyn FrameSink>> {
        self.ensure_available(endpoint)?;
        debug!("{} connected to in-process hub", push_identity(identity));
        Ok(Box::new(InProcSink {
            hub: self.clone(),
            endpoint: endpoint.to_string(),
        }))
    }

    async fn subscribe(
        &self,
        endpoint: &str,
        identity: &str,
        topic: &str,
    ) -> Result<Box<dyn FrameSource>> {
        self.ensure_available(endpoint)?;
        debug!("{} subscribed to '{}' on in-process hub", sub_identity(identity), topic);
        Ok(Box::new(InProcSource {
            frames: self.inner.frames.subscribe(),
            filter: topic.to_string(),
            endpoint: endpoint.to_string(),
        }))
    }
}

struct InProcSink {
    hub: InProcHub,
    endpoint: String,
}

#[async_trait]
impl FrameSink for InProcSink {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<()> {
        self.hub.ensure_available(&self.endpoint)?;
        // no subscribers is not an error for a PUSH socket behind a relay
        let _ = self.hub.inner.frames.send(frame);
        Ok(())
    }

    async fn close(self: Box<Self>) {}
}

struct InProcSource {
    frames: broadcast::Receiver<Frame>,
    filter: String,
    endpoint: String,
}

#[async_trait]
impl FrameSource for InProcSource {
    async fn recv(&mut self) -> Result<Frame> {
        loop {
            match self.frames.recv().await {
                Ok(frame) if frame.topic.starts_with(&self.filter) => return Ok(frame),
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("in-process subscriber lagged, {} frames lost", skipped);
                }
                Err(RecvError::Closed) => {
                    return Err(Error::Connection(ConnectionError::Socket {
                        endpoint: self.endpoint.clone(),
                        reason: "in-process hub closed".to_string(),
                    }))
                }
            }
        }
    }

    async fn close(self: Box<Self>) {}
}
