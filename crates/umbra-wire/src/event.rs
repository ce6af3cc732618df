//! Inbound event messages
//!
//! What the browser sends back: the target element's identifier, the DOM
//! event name, and an input payload applied to the element before its
//! handler runs.

use serde::{Deserialize, Serialize};

/// A client-originated event notification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Identifier of the element the event fired on
    pub element_id: String,
    /// DOM event name, e.g. `click` or `input`
    pub event_name: String,
    /// Input state accompanying the event
    #[serde(default)]
    pub payload: EventPayload,
}

/// Input state carried by an inbound event
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EventPayload {
    /// Current `value` of the target, for value-carrying elements
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    /// Current `checked` state of the target
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked: Option<bool>,
    /// Free-form extra data attached by the client
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl InboundEvent {
    /// Parse an inbound event from its JSON message body
    pub fn from_json(body: &str) -> Result<Self, crate::WireError> {
        Ok(serde_json::from_str(body)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_event() {
        let event =
            InboundEvent::from_json(r#"{"elementId":"_e4","eventName":"click"}"#).unwrap();
        assert_eq!(event.element_id, "_e4");
        assert_eq!(event.event_name, "click");
        assert_eq!(event.payload, EventPayload::default());
    }

    #[test]
    fn test_parse_input_payload() {
        let event = InboundEvent::from_json(
            r#"{"elementId":"_e2","eventName":"input","payload":{"value":"7","checked":true}}"#,
        )
        .unwrap();
        assert_eq!(event.payload.value.as_deref(), Some("7"));
        assert_eq!(event.payload.checked, Some(true));
    }
}
