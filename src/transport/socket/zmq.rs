//! ZeroMQ binding of the socket seams, built on the pure-Rust `zeromq` crate.
//!
//! Clients connect a PUSH socket to the relay's submission endpoint and a
//! SUB socket to its subscription endpoint; the relay binds PULL and PUB.
use bytes::Bytes;
use tonic::async_trait;
use tracing::debug;
use zeromq::util::PeerIdentity;
use zeromq::PubSocket;
use zeromq::PullSocket;
use zeromq::PushSocket;
use zeromq::Socket;
use zeromq::SocketOptions;
use zeromq::SocketRecv;
use zeromq::SocketSend;
use zeromq::SubSocket;
use zeromq::ZmqError;
use zeromq::ZmqMessage;

use super::push_identity;
use super::sub_identity;
use super::Frame;
use super::FrameSink;
use super::FrameSource;
use super::SocketFactory;
use crate::CodecError;
use crate::ConnectionError;
use crate::Error;
use crate::Result;

#[derive(Debug, Clone, Copy, Default)]
pub struct ZmqSocketFactory;

impl ZmqSocketFactory {
    pub fn new() -> Self {
        Self
    }

    /// PULL socket bound to `endpoint` (relay submission side)
    pub async fn bind_pull(
        &self,
        endpoint: &str,
    ) -> Result<Box<dyn FrameSource>> {
        let mut socket = PullSocket::new();
        let bound = socket.bind(endpoint).await.map_err(|e| socket_error(endpoint, e))?;
        debug!("PULL socket bound to {}", bound);
        Ok(Box::new(ZmqSource {
            socket: ZmqReceiver::Pull(socket),
            endpoint: endpoint.to_string(),
        }))
    }

    /// PUB socket bound to `endpoint` (relay subscription side)
    pub async fn bind_publish(
        &self,
        endpoint: &str,
    ) -> Result<Box<dyn FrameSink>> {
        let mut socket = PubSocket::new();
        let bound = socket.bind(endpoint).await.map_err(|e| socket_error(endpoint, e))?;
        debug!("PUB socket bound to {}", bound);
        Ok(Box::new(ZmqSink {
            socket: ZmqSender::Pub(socket),
            endpoint: endpoint.to_string(),
        }))
    }
}

#[async_trait]
impl SocketFactory for ZmqSocketFactory {
    async fn push(
        &self,
        endpoint: &str,
        identity: &str,
    ) -> Result<Box<dyn FrameSink>> {
        let mut socket = PushSocket::with_options(options(endpoint, &push_identity(identity))?);
        socket.connect(endpoint).await.map_err(|e| socket_error(endpoint, e))?;
        debug!("PUSH socket connected to {}", endpoint);
        Ok(Box::new(ZmqSink {
            socket: ZmqSender::Push(socket),
            endpoint: endpoint.to_string(),
        }))
    }

    async fn subscribe(
        &self,
        endpoint: &str,
        identity: &str,
        topic: &str,
    ) -> Result<Box<dyn FrameSource>> {
        let mut socket = SubSocket::with_options(options(endpoint, &sub_identity(identity))?);
        socket.connect(endpoint).await.map_err(|e| socket_error(endpoint, e))?;
        socket.subscribe(topic).await.map_err(|e| socket_error(endpoint, e))?;
        debug!("SUB socket connected to {} with filter '{}'", endpoint, topic);
        Ok(Box::new(ZmqSource {
            socket: ZmqReceiver::Sub(socket),
            endpoint: endpoint.to_string(),
        }))
    }
}

enum ZmqSender {
    Push(PushSocket),
    Pub(PubSocket),
}

enum ZmqReceiver {
    Sub(SubSocket),
    Pull(PullSocket),
}

struct ZmqSink {
    socket: ZmqSender,
    endpoint: String,
}

struct ZmqSource {
    socket: ZmqReceiver,
    endpoint: String,
}

#[async_trait]
impl FrameSink for ZmqSink {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<()> {
        let message = to_message(frame);
        let sent = match &mut self.socket {
            ZmqSender::Push(socket) => socket.send(message).await,
            ZmqSender::Pub(socket) => socket.send(message).await,
        };
        sent.map_err(|e| socket_error(&self.endpoint, e))
    }

    async fn close(self: Box<Self>) {
        let errors = match self.socket {
            ZmqSender::Push(socket) => socket.close().await,
            ZmqSender::Pub(socket) => socket.close().await,
        };
        for e in errors {
            debug!("error while closing socket on {}: {}", self.endpoint, e);
        }
    }
}

#[async_trait]
impl FrameSource for ZmqSource {
    async fn recv(&mut self) -> Result<Frame> {
        let received = match &mut self.socket {
            ZmqReceiver::Sub(socket) => socket.recv().await,
            ZmqReceiver::Pull(socket) => socket.recv().await,
        };
        let message = received.map_err(|e| socket_error(&self.endpoint, e))?;
        from_message(&message)
    }

    async fn close(self: Box<Self>) {
        let errors = match self.socket {
            ZmqReceiver::Sub(socket) => socket.close().await,
            ZmqReceiver::Pull(socket) => socket.close().await,
        };
        for e in errors {
            debug!("error while closing socket on {}: {}", self.endpoint, e);
        }
    }
}

fn options(
    endpoint: &str,
    identity: &str,
) -> Result<SocketOptions> {
    let peer_identity = PeerIdentity::try_from(identity.as_bytes().to_vec())
        .map_err(|e| socket_error(endpoint, e))?;
    let mut options = SocketOptions::default();
    options.peer_identity(peer_identity);
    Ok(options)
}

fn to_message(frame: Frame) -> ZmqMessage {
    let mut message = ZmqMessage::from(frame.topic);
    message.push_back(Bytes::from(frame.client));
    message.push_back(Bytes::from(frame.payload));
    message
}

fn from_message(message: &ZmqMessage) -> Result<Frame> {
    if message.len() != 3 {
        return Err(CodecError::Malformed(format!(
            "expected 3 message parts, got {}",
            message.len()
        ))
        .into());
    }
    let part = |index: usize| -> Result<String> {
        let bytes = message
            .get(index)
            .ok_or_else(|| CodecError::Malformed(format!("missing message part {index}")))?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::Codec(CodecError::Malformed(e.to_string())))
    };
    Ok(Frame {
        topic: part(0)?,
        client: part(1)?,
        payload: part(2)?,
    })
}

fn socket_error(
    endpoint: &str,
    e: ZmqError,
) -> Error {
    ConnectionError::Socket {
        endpoint: endpoint.to_string(),
        reason: e.to_string(),
    }
    .into()
}
