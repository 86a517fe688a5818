//! Protocol Buffer definitions and generated code for the registry service.
//!
//! Types are generated by [`tonic-build`] from `proto/cache_channel.proto`.
//! Events travel typed: the key keeps its numeric or composite form, so no
//! wire codec is involved on this path.
#![allow(clippy::all)]

tonic::include_proto!("cache_channel");

use crate::event::CacheEvent;
use crate::event::CacheEventType;
use crate::event::CacheKey;
use crate::CodecError;

impl From<&CacheEvent> for CacheEventMessage {
    fn from(event: &CacheEvent) -> Self {
        let key = match event.key() {
            CacheKey::Numeric(n) => cache_event_message::Key::NumericKey(*n),
            CacheKey::Composite(s) => cache_event_message::Key::CompositeKey(s.clone()),
        };
        Self {
            region_path: event.region_path().to_string(),
            key: Some(key),
            event_type: event.event_type().code(),
        }
    }
}

impl TryFrom<CacheEventMessage> for CacheEvent {
    type Error = CodecError;

    fn try_from(message: CacheEventMessage) -> Result<Self, Self::Error> {
        let key = match message.key {
            Some(cache_event_message::Key::NumericKey(n)) => CacheKey::Numeric(n),
            Some(cache_event_message::Key::CompositeKey(s)) => CacheKey::Composite(s),
            None => return Err(CodecError::MissingAttribute("key")),
        };
        Ok(CacheEvent::new(
            message.region_path,
            key,
            CacheEventType(message.event_type),
        ))
    }
}
