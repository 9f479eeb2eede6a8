//! Conversation message types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A message in a task conversation
///
/// Messages are the unit of exchange between the supervisor, specialist
/// agents and the model. Each message has a role (user or agent) and one or
/// more parts (text or tool results).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    /// Role of the message sender
    pub role: Role,

    /// Message content parts (at least one required)
    pub parts: Vec<MessagePart>,

    /// When the message was authored
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Create a new message with text content
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            parts: vec![MessagePart::Text { text: text.into() }],
            timestamp: Utc::now(),
        }
    }

    /// Create a user message with text content
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    /// Create an agent message with text content
    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, text)
    }

    /// Create a user message carrying one tool result per executed call
    ///
    /// Results must be supplied in the order the model requested the calls,
    /// so the next model turn observes them in request order.
    pub fn tool_results(results: Vec<(String, Value)>) -> Self {
        Self {
            role: Role::User,
            parts: results
                .into_iter()
                .map(|(tool_use_id, content)| MessagePart::ToolResult {
                    tool_use_id,
                    content,
                })
                .collect(),
            timestamp: Utc::now(),
        }
    }

    /// Add a message part
    pub fn with_part(mut self, part: MessagePart) -> Self {
        self.parts.push(part);
        self
    }

    /// Concatenated text content of this message, if any text parts exist
    pub fn text(&self) -> Option<String> {
        let texts: Vec<&str> = self
            .parts
            .iter()
            .filter_map(|part| match part {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        if texts.is_empty() {
            None
        } else {
            Some(texts.join("\n"))
        }
    }
}

/// Role of a message sender
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Message from a user (or from tool results fed back to the model)
    User,

    /// Message from an AI agent
    Agent,
}

/// A part of a message
///
/// A part is either plain text or the result of one tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum MessagePart {
    /// Text content
    Text {
        /// The text content
        text: String,
    },

    /// Result of a tool invocation
    #[serde(rename_all = "camelCase")]
    ToolResult {
        /// Identifier of the tool call this result answers
        tool_use_id: String,

        /// Tool output, or a structured error object when the tool failed
        content: Value,
    },
}

impl MessagePart {
    /// Create a text part
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool result part
    pub fn tool_result(tool_use_id: impl Into<String>, content: Value) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content,
        }
    }

    /// Create a tool result part carrying a structured error
    pub fn tool_error(tool_use_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self::ToolResult {
            tool_use_id: tool_use_id.into(),
            content: serde_json::json!({ "error": error.into() }),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_message_creation() {
        let msg = Message::user("Hello, agent!");
        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.parts.len(), 1);

        match &msg.parts[0] {
            MessagePart::Text { text } => assert_eq!(text, "Hello, agent!"),
            _ => panic!("Expected text part"),
        }
    }

    #[test]
    fn test_tool_results_preserve_order() {
        let msg = Message::tool_results(vec![
            ("call-1".to_string(), json!({"ok": true})),
            ("call-2".to_string(), json!({"error": "boom"})),
        ]);

        assert_eq!(msg.role, Role::User);
        assert_eq!(msg.parts.len(), 2);
        match &msg.parts[0] {
            MessagePart::ToolResult { tool_use_id, .. } => assert_eq!(tool_use_id, "call-1"),
            _ => panic!("Expected tool result part"),
        }
        match &msg.parts[1] {
            MessagePart::ToolResult { tool_use_id, .. } => assert_eq!(tool_use_id, "call-2"),
            _ => panic!("Expected tool result part"),
        }
    }

    #[test]
    fn test_message_text_concatenation() {
        let msg = Message::agent("First").with_part(MessagePart::text("Second"));
        assert_eq!(msg.text(), Some("First\nSecond".to_string()));

        let msg = Message::tool_results(vec![("call-1".to_string(), json!(null))]);
        assert_eq!(msg.text(), None);
    }

    #[test]
    fn test_message_serialization() {
        let msg = Message::user("Test message");
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["parts"][0]["kind"], "text");
        assert_eq!(json["parts"][0]["text"], "Test message");

        let deserialized: Message = serde_json::from_value(json).unwrap();
        assert_eq!(msg, deserialized);
    }

    #[test]
    fn test_tool_result_serialization() {
        let part = MessagePart::tool_result("call-7", json!({"refundId": "RF-1"}));
        let json = serde_json::to_value(&part).unwrap();

        assert_eq!(json["kind"], "toolResult");
        assert_eq!(json["toolUseId"], "call-7");
        assert_eq!(json["content"]["refundId"], "RF-1");
        assert!(json.get("tool_use_id").is_none());
    }

    #[test]
    fn test_tool_error_part() {
        let part = MessagePart::tool_error("call-9", "record not found");
        match part {
            MessagePart::ToolResult { content, .. } => {
                assert_eq!(content["error"], "record not found");
            }
            _ => panic!("Expected tool result part"),
        }
    }
}
