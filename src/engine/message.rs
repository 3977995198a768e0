//! Inbound and outbound turn payloads

use super::state::{SessionStatus, WaitingFor};
use crate::flow::MediaKind;
use crate::variables::{parse_spans, TextSpan};
use serde::{Deserialize, Serialize};

/// What the end user sent
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub button_id: Option<String>,
}

impl InboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            button_id: None,
        }
    }

    pub fn button(id: impl Into<String>) -> Self {
        Self {
            text: None,
            button_id: Some(id.into()),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_none() && self.button_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundMessage {
    Text {
        text: String,
        spans: Vec<TextSpan>,
    },
    Media {
        kind: MediaKind,
        url: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        alt: Option<String>,
    },
}

impl OutboundMessage {
    /// Text message with its links split out
    pub fn text(text: String) -> Self {
        OutboundMessage::Text {
            spans: parse_spans(&text),
            text,
        }
    }

    #[allow(dead_code)] // Used in tests
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OutboundMessage::Text { text, .. } => Some(text),
            OutboundMessage::Media { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonOption {
    pub id: String,
    pub label: String,
}

/// Effects delivered outside the message stream
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SideEffects {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_url: Option<String>,
}

impl SideEffects {
    pub fn is_empty(&self) -> bool {
        self.redirect_url.is_none()
    }
}

/// Everything one turn produced for the end user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnOutput {
    pub messages: Vec<OutboundMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub buttons: Vec<ButtonOption>,
    pub waiting_for: Option<WaitingFor>,
    #[serde(skip_serializing_if = "SideEffects::is_empty", default)]
    pub side_effects: SideEffects,
    pub status: SessionStatus,
}

impl TurnOutput {
    /// Plain text of every text message, in order
    #[allow(dead_code)] // Used in tests
    pub fn texts(&self) -> Vec<&str> {
        self.messages.iter().filter_map(OutboundMessage::as_text).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_payload_parsing() {
        let payload: InboundPayload =
            serde_json::from_value(serde_json::json!({"buttonId": "b1"})).unwrap();
        assert_eq!(payload, InboundPayload::button("b1"));
        let empty: InboundPayload = serde_json::from_value(serde_json::json!({})).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn test_turn_output_wire_shape() {
        let output = TurnOutput {
            messages: vec![
                OutboundMessage::text("Hi [there](https://x.example)".to_string()),
                OutboundMessage::Media {
                    kind: MediaKind::Image,
                    url: "https://cdn.example/cat.png".to_string(),
                    alt: Some("A cat".to_string()),
                },
            ],
            buttons: vec![ButtonOption {
                id: "b1".to_string(),
                label: "Yes".to_string(),
            }],
            waiting_for: Some(WaitingFor::Buttons),
            side_effects: SideEffects::default(),
            status: SessionStatus::Active,
        };
        let json = serde_json::to_value(&output).unwrap();
        assert_eq!(json["messages"][0]["type"], "text");
        assert_eq!(json["messages"][0]["spans"][1]["type"], "link");
        assert_eq!(json["messages"][1]["kind"], "image");
        assert_eq!(json["waitingFor"], "buttons");
        assert!(json.get("sideEffects").is_none());
        assert_eq!(output.texts(), vec!["Hi [there](https://x.example)"]);
    }
}
