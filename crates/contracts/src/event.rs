//! ContextEvent - raw broker input
//!
//! One context observation from one source. Immutable once created:
//! owned by the ingest queue until consumed, then by the snapshot store.

use std::sync::Arc;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::{ContextType, SourceId};

/// Mime-style format every text-capable event supports.
pub const FORMAT_TEXT: &str = "text/plain";

/// Mime-style format JSON-typed events additionally support.
pub const FORMAT_JSON: &str = "application/json";

/// Listener callback invoked by the host layer when a push source
/// delivers an event.
///
/// `Arc` so the same listener can be attached to many subscriptions.
pub type ContextListener = Arc<dyn Fn(ContextEvent) + Send + Sync>;

/// A single context observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEvent {
    /// Producing source
    pub source_id: SourceId,

    /// Aggregation key
    pub context_type: ContextType,

    /// Typed payload
    pub payload: EventPayload,

    /// Production time, unix seconds (f64) - primary clock
    pub produced_at: f64,

    /// String representation formats the source advertises for this event
    #[serde(default)]
    pub formats: Vec<String>,
}

impl ContextEvent {
    /// Convenience constructor for a plain-text event.
    pub fn text(
        source_id: impl Into<SourceId>,
        context_type: impl Into<ContextType>,
        payload: impl Into<String>,
        produced_at: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            context_type: context_type.into(),
            payload: EventPayload::Text(payload.into()),
            produced_at,
            formats: vec![FORMAT_TEXT.to_string()],
        }
    }

    /// Convenience constructor for an undecoded raw event.
    ///
    /// Raw events advertise no representation format until a decoder
    /// upgrades them.
    pub fn raw(
        source_id: impl Into<SourceId>,
        context_type: impl Into<ContextType>,
        payload: impl Into<Bytes>,
        produced_at: f64,
    ) -> Self {
        Self {
            source_id: source_id.into(),
            context_type: context_type.into(),
            payload: EventPayload::Raw(payload.into()),
            produced_at,
            formats: Vec::new(),
        }
    }

    /// Render the payload in the requested representation format.
    ///
    /// Returns `None` when the format is not supported for this payload,
    /// mirroring the "unsupported format" contract of the inbound surface.
    pub fn render(&self, format: &str) -> Option<String> {
        match (format, &self.payload) {
            (FORMAT_TEXT, EventPayload::Text(s)) => Some(s.clone()),
            (FORMAT_TEXT, EventPayload::Json(v)) => Some(v.to_string()),
            (FORMAT_JSON, EventPayload::Json(v)) => serde_json::to_string(v).ok(),
            _ => None,
        }
    }
}

/// Typed event payload.
///
/// The declared `context_type` plus this tag replace runtime
/// reflection on provider-specific result classes: consumers match on
/// the variant, and raw bytes are upgraded by a registered decoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    /// Plain text value
    Text(String),

    /// Structured value
    Json(serde_json::Value),

    /// Undecoded bytes (fallback)
    Raw(Bytes),
}

impl EventPayload {
    /// Payload size in bytes (for queue metrics).
    pub fn len(&self) -> usize {
        match self {
            EventPayload::Text(s) => s.len(),
            EventPayload::Json(v) => v.to_string().len(),
            EventPayload::Raw(b) => b.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_constructor_advertises_text_format() {
        let event = ContextEvent::text("s1", "battery", "87%", 10.0);
        assert_eq!(event.formats, vec![FORMAT_TEXT.to_string()]);
        assert_eq!(event.render(FORMAT_TEXT).as_deref(), Some("87%"));
    }

    #[test]
    fn test_raw_constructor_advertises_no_formats() {
        let event = ContextEvent::raw("s1", "battery", &b"87%"[..], 10.0);
        assert!(event.formats.is_empty());
        assert_eq!(event.render(FORMAT_TEXT), None);
    }

    #[test]
    fn test_render_unsupported_format() {
        let event = ContextEvent::text("s1", "battery", "87%", 10.0);
        assert_eq!(event.render(FORMAT_JSON), None);
        assert_eq!(event.render("application/xml"), None);
    }

    #[test]
    fn test_render_json_payload() {
        let event = ContextEvent {
            source_id: "s1".into(),
            context_type: "location".into(),
            payload: EventPayload::Json(serde_json::json!({"lat": 1.5})),
            produced_at: 10.0,
            formats: vec![FORMAT_TEXT.to_string(), FORMAT_JSON.to_string()],
        };
        assert!(event.render(FORMAT_JSON).unwrap().contains("lat"));
        assert!(event.render(FORMAT_TEXT).is_some());
    }
}
