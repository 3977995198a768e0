//! Flow definition data model
//!
//! This is the shape the authoring surface publishes. Node configuration is a
//! tagged union keyed by `type` with a per-type `config` record.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A published chatbot definition (immutable per version)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowDefinition {
    pub containers: Vec<Container>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Explicit entry point; otherwise the first container with no incoming edge
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_container_id: Option<String>,
    /// Cosmetic metadata, ignored by the interpreter
    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    pub settings: serde_json::Value,
}

/// A block of nodes executed in array order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Container {
    pub id: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: String,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Connection from a container exit to another container.
///
/// `source_handle` names a node exit inside the source container; `None` is
/// the container's fall-through exit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    pub target: String,
}

// ============================================================================
// Node kinds
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "config")]
pub enum NodeKind {
    #[serde(rename = "bubble-text")]
    BubbleText(TextBubble),
    #[serde(rename = "bubble-number")]
    BubbleNumber(TextBubble),
    #[serde(rename = "bubble-image")]
    BubbleImage(MediaBubble),
    #[serde(rename = "bubble-video")]
    BubbleVideo(MediaBubble),
    #[serde(rename = "bubble-audio")]
    BubbleAudio(MediaBubble),
    #[serde(rename = "bubble-document")]
    BubbleDocument(MediaBubble),

    #[serde(rename = "input-text")]
    InputText(InputConfig),
    #[serde(rename = "input-number")]
    InputNumber(InputConfig),
    #[serde(rename = "input-phone")]
    InputPhone(InputConfig),
    #[serde(rename = "input-mail")]
    InputMail(InputConfig),
    #[serde(rename = "input-webSite")]
    InputWebsite(InputConfig),
    #[serde(rename = "input-image")]
    InputImage(InputConfig),
    #[serde(rename = "input-video")]
    InputVideo(InputConfig),
    #[serde(rename = "input-audio")]
    InputAudio(InputConfig),
    #[serde(rename = "input-document")]
    InputDocument(InputConfig),

    #[serde(rename = "input-buttons")]
    InputButtons(ButtonsConfig),
    #[serde(rename = "condition")]
    Condition(ConditionConfig),
    #[serde(rename = "set-variable")]
    SetVariable(SetVariableConfig),
    #[serde(rename = "script")]
    Script(ScriptConfig),
}

/// Borrowed view of an output node
#[derive(Debug, Clone, Copy)]
pub enum Bubble<'a> {
    Text(&'a TextBubble),
    Media(MediaKind, &'a MediaBubble),
}

impl NodeKind {
    /// Wire name of this node type
    pub fn type_name(&self) -> &'static str {
        match self {
            NodeKind::BubbleText(_) => "bubble-text",
            NodeKind::BubbleNumber(_) => "bubble-number",
            NodeKind::BubbleImage(_) => "bubble-image",
            NodeKind::BubbleVideo(_) => "bubble-video",
            NodeKind::BubbleAudio(_) => "bubble-audio",
            NodeKind::BubbleDocument(_) => "bubble-document",
            NodeKind::InputButtons(_) => "input-buttons",
            NodeKind::Condition(_) => "condition",
            NodeKind::SetVariable(_) => "set-variable",
            NodeKind::Script(_) => "script",
            other => other.as_input().map_or("input", |(kind, _)| kind.type_name()),
        }
    }

    pub fn as_bubble(&self) -> Option<Bubble<'_>> {
        match self {
            NodeKind::BubbleText(b) | NodeKind::BubbleNumber(b) => Some(Bubble::Text(b)),
            NodeKind::BubbleImage(m) => Some(Bubble::Media(MediaKind::Image, m)),
            NodeKind::BubbleVideo(m) => Some(Bubble::Media(MediaKind::Video, m)),
            NodeKind::BubbleAudio(m) => Some(Bubble::Media(MediaKind::Audio, m)),
            NodeKind::BubbleDocument(m) => Some(Bubble::Media(MediaKind::Document, m)),
            _ => None,
        }
    }

    /// Simple (non-button) input nodes
    pub fn as_input(&self) -> Option<(InputKind, &InputConfig)> {
        let kind = match self {
            NodeKind::InputText(_) => InputKind::Text,
            NodeKind::InputNumber(_) => InputKind::Number,
            NodeKind::InputPhone(_) => InputKind::Phone,
            NodeKind::InputMail(_) => InputKind::Email,
            NodeKind::InputWebsite(_) => InputKind::Website,
            NodeKind::InputImage(_) => InputKind::Image,
            NodeKind::InputVideo(_) => InputKind::Video,
            NodeKind::InputAudio(_) => InputKind::Audio,
            NodeKind::InputDocument(_) => InputKind::Document,
            _ => return None,
        };
        match self {
            NodeKind::InputText(c)
            | NodeKind::InputNumber(c)
            | NodeKind::InputPhone(c)
            | NodeKind::InputMail(c)
            | NodeKind::InputWebsite(c)
            | NodeKind::InputImage(c)
            | NodeKind::InputVideo(c)
            | NodeKind::InputAudio(c)
            | NodeKind::InputDocument(c) => Some((kind, c)),
            _ => None,
        }
    }

    /// Input-class nodes suspend the engine until answered
    #[cfg(test)]
    pub fn is_input(&self) -> bool {
        self.as_input().is_some() || matches!(self, NodeKind::InputButtons(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextBubble {
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaBubble {
    pub url: String,
    #[serde(default)]
    pub alt: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Video,
    Audio,
    Document,
}

/// Simple input subtypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InputKind {
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
}

impl InputKind {
    pub fn type_name(self) -> &'static str {
        match self {
            InputKind::Text => "input-text",
            InputKind::Number => "input-number",
            InputKind::Phone => "input-phone",
            InputKind::Email => "input-mail",
            InputKind::Website => "input-webSite",
            InputKind::Image => "input-image",
            InputKind::Video => "input-video",
            InputKind::Audio => "input-audio",
            InputKind::Document => "input-document",
        }
    }

    /// Validation applied when the node does not configure one.
    /// Media inputs receive the uploaded file's URL.
    pub fn default_validation(self) -> Option<Validation> {
        match self {
            InputKind::Text => None,
            InputKind::Number => Some(Validation::Number),
            InputKind::Phone => Some(Validation::Phone),
            InputKind::Email => Some(Validation::Email),
            InputKind::Website
            | InputKind::Image
            | InputKind::Video
            | InputKind::Audio
            | InputKind::Document => Some(Validation::Url),
        }
    }
}

impl fmt::Display for InputKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Validation {
    Number,
    Email,
    Phone,
    Url,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_variable: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Validation>,
    /// Emitted ahead of the re-prompt when validation fails
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ButtonsConfig {
    pub buttons: Vec<ButtonConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ButtonConfig {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_variable: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    pub groups: Vec<ConditionGroup>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionGroup {
    pub id: String,
    pub comparisons: Vec<ConditionComparison>,
    #[serde(default)]
    pub logical_operator: LogicalOperator,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogicalOperator {
    #[default]
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionComparison {
    pub id: String,
    pub variable_name: String,
    pub operator: ComparisonOperator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsSet,
    IsEmpty,
    StartsWith,
    EndsWith,
    MatchesRegex,
    NotMatchesRegex,
}

impl ComparisonOperator {
    /// `is_set` and `is_empty` ignore `value`
    pub fn takes_value(self) -> bool {
        !matches!(self, ComparisonOperator::IsSet | ComparisonOperator::IsEmpty)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableConfig {
    pub variable_name: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub save_in_results: bool,
    #[serde(default)]
    pub execute_on_client: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValueType {
    #[default]
    Custom,
    Empty,
    Now,
    Today,
    Yesterday,
    Tomorrow,
    Random,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptConfig {
    pub code: String,
    #[serde(default)]
    pub execute_on_server: bool,
}
