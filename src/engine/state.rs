//! Durable per-conversation state

use super::message::{InboundPayload, OutboundMessage};
use crate::flow::InputKind;
use crate::variables::VariableStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Kind of answer the session is suspended on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WaitingFor {
    #[serde(rename = "input-text")]
    Text,
    #[serde(rename = "input-number")]
    Number,
    #[serde(rename = "input-phone")]
    Phone,
    #[serde(rename = "input-mail")]
    Email,
    #[serde(rename = "input-webSite")]
    Website,
    #[serde(rename = "input-image")]
    Image,
    #[serde(rename = "input-video")]
    Video,
    #[serde(rename = "input-audio")]
    Audio,
    #[serde(rename = "input-document")]
    Document,
    #[serde(rename = "buttons")]
    Buttons,
}

impl From<InputKind> for WaitingFor {
    fn from(kind: InputKind) -> Self {
        match kind {
            InputKind::Text => WaitingFor::Text,
            InputKind::Number => WaitingFor::Number,
            InputKind::Phone => WaitingFor::Phone,
            InputKind::Email => WaitingFor::Email,
            InputKind::Website => WaitingFor::Website,
            InputKind::Image => WaitingFor::Image,
            InputKind::Video => WaitingFor::Video,
            InputKind::Audio => WaitingFor::Audio,
            InputKind::Document => WaitingFor::Document,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Running or suspended on an input
    #[default]
    Active,
    /// Handed control to the transport (redirect); resumes after the script node
    Yielded,
    /// Reached a dead end; further inbound events produce nothing
    Ended,
}

/// One line of the conversation transcript
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum LogEntry {
    Inbound {
        payload: InboundPayload,
        at: DateTime<Utc>,
    },
    Outbound {
        message: OutboundMessage,
        at: DateTime<Utc>,
    },
    Redirect {
        url: String,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
    pub session_id: String,
    pub flow_id: String,
    pub flow_version: i64,
    pub current_container_id: String,
    pub current_node_index: usize,
    pub variables: VariableStore,
    /// Values recorded by set-variable nodes with `saveInResults`
    #[serde(default)]
    pub results: BTreeMap<String, String>,
    #[serde(default)]
    pub message_log: Vec<LogEntry>,
    pub waiting_for: Option<WaitingFor>,
    #[serde(default)]
    pub status: SessionStatus,
    /// Bumped by every successful save
    #[serde(default)]
    pub revision: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(
        session_id: impl Into<String>,
        flow_id: impl Into<String>,
        flow_version: i64,
        start_container_id: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            flow_id: flow_id.into(),
            flow_version,
            current_container_id: start_container_id.into(),
            current_node_index: 0,
            variables: VariableStore::new(),
            results: BTreeMap::new(),
            message_log: Vec::new(),
            waiting_for: None,
            status: SessionStatus::Active,
            revision: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_ended(&self) -> bool {
        self.status == SessionStatus::Ended
    }
}
