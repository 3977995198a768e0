//! API request and response types

use crate::engine::{InboundPayload, OutboundMessage, TurnOutput, WaitingFor};
use crate::flow::{FlowDefinition, ValidationIssue};
use crate::runtime::TurnErrorKind;
use crate::script::ClientContext;
use serde::{Deserialize, Serialize};

/// Turn request; no `session_id` starts a session on `flow_id`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequest {
    pub session_id: Option<String>,
    pub flow_id: Option<String>,
    pub version: Option<i64>,
    pub inbound_payload: Option<InboundPayload>,
    #[serde(default)]
    pub client: ClientContext,
}

/// Response for a completed turn
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatResponse {
    pub session_id: String,
    #[serde(flatten)]
    pub output: TurnOutput,
}

/// Response for a failed turn
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatFailureResponse {
    /// Failure class only; details stay in the server log
    pub error: TurnErrorKind,
    pub messages: Vec<OutboundMessage>,
    pub waiting_for: Option<WaitingFor>,
}

/// Request to publish a flow version
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFlowRequest {
    pub flow_id: Option<String>,
    pub definition: FlowDefinition,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishFlowResponse {
    pub flow_id: String,
    pub version: i64,
    pub checksum: String,
    pub created: bool,
    pub warnings: Vec<ValidationIssue>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FlowQuery {
    pub version: Option<i64>,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            error: message.into(),
        }
    }
}
