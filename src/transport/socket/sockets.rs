use tonic::async_trait;

use crate::Result;

/// Three-part socket message: topic, sender identifier, encoded event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub topic: String,
    pub client: String,
    pub payload: String,
}

impl Frame {
    pub fn new(
        topic: impl Into<String>,
        client: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            client: client.into(),
            payload: payload.into(),
        }
    }
}

/// Outgoing side of a socket
#[async_trait]
pub trait FrameSink: Send {
    async fn send(
        &mut self,
        frame: Frame,
    ) -> Result<()>;

    /// Releases the socket; errors are swallowed
    async fn close(self: Box<Self>);
}

/// Incoming side of a socket.
///
/// `recv` must be cancel safe: the loops race it against a poll timeout.
#[async_trait]
pub trait FrameSource: Send {
    async fn recv(&mut self) -> Result<Frame>;

    /// Releases the socket; errors are swallowed
    async fn close(self: Box<Self>);
}

/// Opens the client-side sockets of the socket transport
#[async_trait]
pub trait SocketFactory: Send + Sync {
    /// PUSH socket connected to `endpoint`, identity `<identity>-PUSH`
    async fn push(
        &self,
        endpoint: &str,
        identity: &str,
    ) -> Result<Box<dyn FrameSink>>;

    /// SUB socket connected to `endpoint` and subscribed to `topic`,
    /// identity `<identity>-SUB`
    async fn subscribe(
        &self,
        endpoint: &str,
        identity: &str,
        topic: &str,
    ) -> Result<Box<dyn FrameSource>>;
}

pub(crate) fn push_identity(identity: &str) -> String {
    format!("{identity}-PUSH")
}

pub(crate) fn sub_identity(identity: &str) -> String {
    format!("{identity}-SUB")
}
