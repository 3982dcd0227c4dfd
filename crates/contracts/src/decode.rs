//! Payload decoding.
//!
//! Hosts deliver raw bytes; a decoder registered per context type
//! upgrades them to a typed payload. Unknown types pass through as
//! `Raw` rather than failing the event.

use std::collections::HashMap;

use bytes::Bytes;

use crate::{ContextEvent, ContextType, EventPayload, FORMAT_JSON, FORMAT_TEXT};

/// Upgrade raw bytes to a typed payload.
///
/// Returning `None` means "not decodable as this shape"; the registry
/// then falls back to `Raw`.
pub trait PayloadDecoder: Send + Sync {
    fn decode(&self, raw: &Bytes) -> Option<EventPayload>;
}

/// UTF-8 text decoder.
pub struct Utf8TextDecoder;

impl PayloadDecoder for Utf8TextDecoder {
    fn decode(&self, raw: &Bytes) -> Option<EventPayload> {
        std::str::from_utf8(raw)
            .ok()
            .map(|s| EventPayload::Text(s.to_string()))
    }
}

/// JSON decoder.
pub struct JsonDecoder;

impl PayloadDecoder for JsonDecoder {
    fn decode(&self, raw: &Bytes) -> Option<EventPayload> {
        serde_json::from_slice(raw).ok().map(EventPayload::Json)
    }
}

/// Per-context-type decoder table with a pass-through fallback.
#[derive(Default)]
pub struct DecoderRegistry {
    decoders: HashMap<ContextType, Box<dyn PayloadDecoder>>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a decoder for a context type, replacing any previous one.
    pub fn register(&mut self, context_type: ContextType, decoder: Box<dyn PayloadDecoder>) {
        self.decoders.insert(context_type, decoder);
    }

    /// Decode raw bytes for the given type.
    ///
    /// No registered decoder, or a decoder miss, yields `Raw` so the
    /// event is never dropped at the decode step.
    pub fn decode(&self, context_type: &ContextType, raw: Bytes) -> EventPayload {
        match self.decoders.get(context_type) {
            Some(decoder) => decoder
                .decode(&raw)
                .unwrap_or(EventPayload::Raw(raw)),
            None => EventPayload::Raw(raw),
        }
    }

    /// Upgrade a raw event; events already carrying a typed payload
    /// pass through untouched.
    ///
    /// The advertised formats follow the decoded shape so `render`
    /// works on the upgraded event.
    pub fn upgrade(&self, event: ContextEvent) -> ContextEvent {
        let ContextEvent {
            source_id,
            context_type,
            payload,
            produced_at,
            formats,
        } = event;

        let (payload, formats) = match payload {
            EventPayload::Raw(raw) => {
                let payload = self.decode(&context_type, raw);
                let formats = match &payload {
                    EventPayload::Text(_) => vec![FORMAT_TEXT.to_string()],
                    EventPayload::Json(_) => {
                        vec![FORMAT_TEXT.to_string(), FORMAT_JSON.to_string()]
                    }
                    EventPayload::Raw(_) => Vec::new(),
                };
                (payload, formats)
            }
            typed => (typed, formats),
        };

        ContextEvent {
            source_id,
            context_type,
            payload,
            produced_at,
            formats,
        }
    }
}
