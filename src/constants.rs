// -
// Wire format

/// Root element name of an encoded cache event
pub const EVENT_ELEMENT: &str = "cacheEvent";
pub(crate) const ATTR_REGION_PATH: &str = "regionPath";
pub(crate) const ATTR_KEY: &str = "key";
pub(crate) const ATTR_TYPE: &str = "type";

/// Separator used by the host when it builds composite cache keys.
/// A key containing it is never parsed as a number.
pub const KEY_DELIMITER: &str = ":";

/// Message property carrying the publisher identifier on topic messages
pub const CLIENT_PROPERTY: &str = "Client";

// -
// Transport defaults

pub(crate) const DEFAULT_TOPIC: &str = "CacheChannel";

pub(crate) const DEFAULT_REGISTRY_HOST: &str = "127.0.0.1";
pub(crate) const DEFAULT_REGISTRY_PORT: u16 = 1099;
/// Name the registry service is bound under; an instance suffix is appended as `_<instance>`
pub const REGISTRY_SERVICE_NAME: &str = "CacheChannelService";

pub(crate) const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
pub(crate) const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 3000;
pub(crate) const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5000;

/// Per-listener push buffer on the registry server
pub(crate) const DEFAULT_LISTENER_BUFFER: usize = 1024;

/// Capacity of the in-process fan-out channels
pub(crate) const INPROC_CHANNEL_CAPACITY: usize = 1024;

/// Upper bound for best-effort deregistration during close
pub(crate) const CLOSE_TIMEOUT_MS: u64 = 1000;

// -
// Identifier prefixes

pub(crate) const TOPIC_CLIENT_PREFIX: &str = "topic";
pub(crate) const REGISTRY_CLIENT_PREFIX: &str = "registry";
pub(crate) const SOCKET_CLIENT_PREFIX: &str = "socket";
pub(crate) const NULL_CLIENT_PREFIX: &str = "null";
