//! Agent response normalization
//!
//! Whatever the agent hands back is converted once, at the boundary, into an
//! [`AgentReply`]. Everything downstream matches on that closed set and calls
//! [`AgentReply::as_text`] to obtain a display string.

use serde_json::{Map, Value};

/// Field names tried, in order, when a structured reply is not a chat message.
const TEXT_FIELDS: [&str; 5] = ["text", "content", "message", "output", "response"];

#[derive(Debug, Clone, PartialEq)]
pub enum AgentReply {
    Text(String),
    Structured(Map<String, Value>),
    Sequence(Vec<AgentReply>),
    /// Scalars and nulls with no textual shape of their own.
    Unknown(Value),
}

impl AgentReply {
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::String(s) => AgentReply::Text(s),
            Value::Object(map) => AgentReply::Structured(map),
            Value::Array(items) => {
                AgentReply::Sequence(items.into_iter().map(AgentReply::from_value).collect())
            }
            other => AgentReply::Unknown(other),
        }
    }

    /// Best-effort display text. Never fails.
    pub fn as_text(&self) -> String {
        match self {
            AgentReply::Text(s) => s.clone(),
            AgentReply::Structured(map) => structured_text(map),
            AgentReply::Sequence(items) => sequence_text(items),
            AgentReply::Unknown(Value::Null) => String::new(),
            AgentReply::Unknown(other) => other.to_string(),
        }
    }
}

impl From<Value> for AgentReply {
    fn from(value: Value) -> Self {
        AgentReply::from_value(value)
    }
}

impl From<&str> for AgentReply {
    fn from(text: &str) -> Self {
        AgentReply::Text(text.to_string())
    }
}

/// Normalize an arbitrary JSON value to display text.
pub fn as_text(value: &Value) -> String {
    AgentReply::from_value(value.clone()).as_text()
}

fn structured_text(map: &Map<String, Value>) -> String {
    if map.contains_key("role") {
        if let Some(content) = map.get("content") {
            return as_text(content);
        }
    }
    for field in TEXT_FIELDS {
        if let Some(value) = map.get(field) {
            return as_text(value);
        }
    }
    Value::Object(map.clone()).to_string()
}

fn sequence_text(items: &[AgentReply]) -> String {
    let parts: Vec<String> = items
        .iter()
        .map(AgentReply::as_text)
        .filter(|part| !part.is_empty())
        .collect();
    if parts.is_empty() {
        return String::new();
    }

    // Many tiny fragments are a token stream; glue them back together.
    let total: usize = parts.iter().map(|p| p.chars().count()).sum();
    let average = total as f64 / parts.len() as f64;
    let separator = if average < 3.0 && parts.len() > 20 { "" } else { "\n\n" };
    parts.join(separator)
}
