//! Forwarder between the client-facing endpoints of the socket transport.
//!
//! Clients PUSH to the submission endpoint; the relay PULLs every frame and
//! republishes it unchanged on the PUB subscription endpoint.
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::FrameSink;
use super::FrameSource;
use super::ZmqSocketFactory;
use crate::constants::DEFAULT_POLL_INTERVAL_MS;
use crate::metrics::DROPPED_EVENTS;
use crate::Error;
use crate::Result;

const RELAY_LABEL: &str = "relay";

pub struct SocketRelay {
    source: Box<dyn FrameSource>,
    sink: Box<dyn FrameSink>,
    backoff: Duration,
}

impl SocketRelay {
    pub fn new(
        source: Box<dyn FrameSource>,
        sink: Box<dyn FrameSink>,
    ) -> Self {
        Self {
            source,
            sink,
            backoff: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }

    /// Binds PULL on `submission_uri` and PUB on `subscription_uri`
    pub async fn bind(
        submission_uri: &str,
        subscription_uri: &str,
    ) -> Result<Self> {
        let factory = ZmqSocketFactory::new();
        let source = factory.bind_pull(submission_uri).await?;
        let sink = match factory.bind_publish(subscription_uri).await {
            Ok(sink) => sink,
            Err(e) => {
                source.close().await;
                return Err(e);
            }
        };
        info!(
            "socket relay accepting on {} and publishing on {}",
            submission_uri, subscription_uri
        );
        Ok(Self::new(source, sink))
    }

    /// Pause after a failed receive
    pub fn with_backoff(
        mut self,
        backoff: Duration,
    ) -> Self {
        self.backoff = backoff;
        self
    }

    /// Forwards frames until `cancel` fires; returns the number forwarded
    pub async fn run(
        mut self,
        cancel: CancellationToken,
    ) -> u64 {
        let mut forwarded = 0;
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = self.source.recv() => match received {
                    Ok(frame) => {
                        debug!(topic = %frame.topic, client = %frame.client, "relaying frame");
                        match self.sink.send(frame).await {
                            Ok(()) => forwarded += 1,
                            Err(e) => {
                                warn!("relay failed to publish frame: {}", e);
                                DROPPED_EVENTS.with_label_values(&[RELAY_LABEL, "send"]).inc();
                            }
                        }
                    }
                    Err(Error::Codec(e)) => {
                        error!("relay dropped malformed frame: {}", e);
                        DROPPED_EVENTS.with_label_values(&[RELAY_LABEL, "decode"]).inc();
                    }
                    Err(e) => {
                        warn!("relay receive failed: {}", e);
                        tokio::select! {
                            biased;
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(self.backoff) => {}
                        }
                    }
                }
            }
        }

        self.source.close().await;
        self.sink.close().await;
        info!("socket relay stopped after forwarding {} frames", forwarded);
        forwarded
    }
}
