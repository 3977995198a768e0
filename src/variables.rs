//! Per-session variable store
//!
//! Values are strings; numbers and dates are stored in their text form.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::LazyLock;

static VARIABLE_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("variable token pattern"));

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)").expect("link pattern"));

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VariableStore {
    values: BTreeMap<String, String>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    /// Substitute `{{name}}` tokens. Unknown names are left as written.
    pub fn interpolate(&self, text: &str) -> String {
        VARIABLE_TOKEN
            .replace_all(text, |caps: &regex::Captures<'_>| {
                match self.values.get(&caps[1]) {
                    Some(value) => value.clone(),
                    None => caps[0].to_string(),
                }
            })
            .into_owned()
    }
}

/// Piece of rendered text content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TextSpan {
    Plain { text: String },
    Link { label: String, url: String },
}

/// Split text on `[label](url)` links
pub fn parse_spans(text: &str) -> Vec<TextSpan> {
    let mut spans = Vec::new();
    let mut last = 0;

    for caps in MARKDOWN_LINK.captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        if whole.start() > last {
            spans.push(TextSpan::Plain {
                text: text.get(last..whole.start()).unwrap_or_default().to_string(),
            });
        }
        spans.push(TextSpan::Link {
            label: caps[1].to_string(),
            url: caps[2].to_string(),
        });
        last = whole.end();
    }

    if last < text.len() {
        spans.push(TextSpan::Plain {
            text: text.get(last..).unwrap_or_default().to_string(),
        });
    }
    spans
}
