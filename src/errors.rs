//! Cache Channel Error Hierarchy
//!
//! Errors are grouped by how the host is expected to react:
//! configuration errors are fatal at configure time, connection errors are
//! retried by the host, codec errors never leave a transport, and invalid-state
//! errors reject the call without touching the network.

use std::num::ParseIntError;
use std::time::Duration;

use config::ConfigError;

#[doc(hidden)]
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Lookup, registration or transport failure; the caller may retry
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Event could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Operation attempted on a closed connector
    #[error("Method was called on closed instance")]
    Closed,

    /// `validate`/`connect` was called before `configure`
    #[error("Connector has not been configured")]
    NotConfigured,

    /// `configure` was called after the connector went live
    #[error("Connector is already configured and connected")]
    AlreadyConfigured,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Unrecoverable failures requiring process termination
    #[error("Fatal error: {0}")]
    Fatal(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// Naming/registry lookup failed
    #[error("Lookup of {name} failed: {reason}")]
    Lookup { name: String, reason: String },

    /// The remote service is not bound under the requested name
    #[error("The remote service was not bound to {0}")]
    NotBound(String),

    /// The remote service refused to register this client
    #[error("Registration of client {client} failed: {reason}")]
    Registration { client: String, reason: String },

    /// A remote call failed after the connection was established
    #[error("{operation} failed: {source}")]
    Remote {
        operation: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Socket could not be opened, connected or bound
    #[error("Socket error on {endpoint}: {reason}")]
    Socket { endpoint: String, reason: String },

    /// Message broker rejected the operation
    #[error("Broker error: {0}")]
    Broker(String),

    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        operation: &'static str,
        duration: Duration,
    },

    /// Malformed endpoint address
    #[error("Invalid URI format: {0}")]
    InvalidUri(String),

    /// gRPC transport layer errors
    #[error(transparent)]
    Transport(#[from] tonic::transport::Error),

    /// gRPC status code errors
    #[error(transparent)]
    Status(#[from] Box<tonic::Status>),

    /// Outbound queue is gone (sender stopped)
    #[error("Outbound message queue is unavailable")]
    QueueUnavailable,
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Document could not be parsed
    #[error("Malformed event document: {0}")]
    Malformed(String),

    #[error("Event document is missing attribute '{0}'")]
    MissingAttribute(&'static str),

    /// Key has no delimiter and is not an integer
    #[error("Invalid numeric key '{key}'")]
    InvalidKey {
        key: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Invalid event type '{value}'")]
    InvalidEventType {
        value: String,
        #[source]
        source: ParseIntError,
    },

    #[error("Failed to encode event: {0}")]
    Encode(String),

    /// Message body is not text
    #[error("Unexpected message body: {0}")]
    UnexpectedBody(String),
}

impl Error {
    /// Whether the host should retry the operation after calling `validate`
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection(_))
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(e: tonic::transport::Error) -> Self {
        Error::Connection(ConnectionError::Transport(e))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Error::Connection(ConnectionError::Status(Box::new(status)))
    }
}
