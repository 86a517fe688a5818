//! XML wire codec shared by the topic and socket transports.
//!
//! An event is a single empty element carrying three attributes:
//!
//! ```text
//! <cacheEvent regionPath="/products" key="42" type="1"/>
//! ```
//!
//! No declaration is written and no envelope or version field exists.
use quick_xml::events::BytesStart;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;

use super::CacheEvent;
use super::CacheEventType;
use super::CacheKey;
use crate::constants::ATTR_KEY;
use crate::constants::ATTR_REGION_PATH;
use crate::constants::ATTR_TYPE;
use crate::constants::EVENT_ELEMENT;
use crate::CodecError;

pub fn encode(event: &CacheEvent) -> Result<String, CodecError> {
    let key = event.key().to_string();
    let event_type = event.event_type().to_string();

    let mut element = BytesStart::new(EVENT_ELEMENT);
    element.push_attribute((ATTR_REGION_PATH, event.region_path()));
    element.push_attribute((ATTR_KEY, key.as_str()));
    element.push_attribute((ATTR_TYPE, event_type.as_str()));

    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Empty(element))
        .map_err(|e| CodecError::Encode(e.to_string()))?;

    String::from_utf8(writer.into_inner()).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Decodes one wire document.
///
/// Returns `Ok(None)` for a well-formed document whose root element is not
/// a cache event; such messages are not addressed to this channel.
pub fn decode(document: &str) -> Result<Option<CacheEvent>, CodecError> {
    if document.trim().is_empty() {
        return Err(CodecError::Malformed("empty document".into()));
    }

    let mut reader = Reader::from_str(document);
    let mut depth: usize = 0;
    let mut root_seen = false;
    let mut decoded: Option<CacheEvent> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::Malformed(format!("at {}: {}", reader.buffer_position(), e)))?;

        match event {
            Event::Start(ref start) | Event::Empty(ref start) => {
                if depth == 0 {
                    if root_seen {
                        return Err(CodecError::Malformed("multiple root elements".into()));
                    }
                    root_seen = true;
                    if start.name().as_ref() == EVENT_ELEMENT.as_bytes() {
                        decoded = Some(read_event_attributes(start)?);
                    }
                }
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                }
            }
            Event::End(_) => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| CodecError::Malformed("unbalanced end tag".into()))?;
            }
            Event::Text(ref text) => {
                if depth == 0 && !text.iter().all(u8::is_ascii_whitespace) {
                    return Err(CodecError::Malformed("text outside of root element".into()));
                }
            }
            Event::CData(_) => {
                if depth == 0 {
                    return Err(CodecError::Malformed("CDATA outside of root element".into()));
                }
            }
            Event::Decl(_) | Event::Comment(_) | Event::PI(_) | Event::DocType(_) => {}
            Event::Eof => break,
        }
    }

    if depth != 0 {
        return Err(CodecError::Malformed("unexpected end of document".into()));
    }
    if !root_seen {
        return Err(CodecError::Malformed("no root element".into()));
    }
    Ok(decoded)
}

fn read_event_attributes(start: &BytesStart<'_>) -> Result<CacheEvent, CodecError> {
    let mut region_path: Option<String> = None;
    let mut key: Option<String> = None;
    let mut event_type: Option<String> = None;

    for attribute in start.attributes() {
        let attribute = attribute.map_err(|e| CodecError::Malformed(e.to_string()))?;
        let value = attribute
            .unescape_value()
            .map_err(|e| CodecError::Malformed(e.to_string()))?
            .into_owned();

        match attribute.key.as_ref() {
            k if k == ATTR_REGION_PATH.as_bytes() => region_path = Some(value),
            k if k == ATTR_KEY.as_bytes() => key = Some(value),
            k if k == ATTR_TYPE.as_bytes() => event_type = Some(value),
            _ => {}
        }
    }

    let region_path = region_path.ok_or(CodecError::MissingAttribute(ATTR_REGION_PATH))?;
    let key = key.ok_or(CodecError::MissingAttribute(ATTR_KEY))?;
    let event_type = event_type.ok_or(CodecError::MissingAttribute(ATTR_TYPE))?;

    let key = CacheKey::parse(&key)?;
    let code = event_type
        .trim()
        .parse::<i32>()
        .map_err(|source| CodecError::InvalidEventType {
            value: event_type.clone(),
            source,
        })?;

    Ok(CacheEvent::new(region_path, key, CacheEventType(code)))
}
