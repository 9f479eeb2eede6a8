//! Agent discovery and capability types

use serde::{Deserialize, Serialize};
use url::Url;

/// Capability descriptor published by an agent at startup
///
/// The card tells a supervisor what an agent can do and where to reach it.
/// Cards are immutable once published; re-publishing replaces the previous
/// card wholesale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentCard {
    /// Name of the agent, unique within a directory
    pub name: String,

    /// Human-readable description of the agent
    pub description: String,

    /// Address where the agent accepts task requests
    pub endpoint: Url,

    /// Skills this agent advertises
    pub skills: Vec<Skill>,

    /// Agent capabilities
    pub capabilities: AgentCapabilities,
}

impl AgentCard {
    /// Create a new agent card
    pub fn new(name: impl Into<String>, description: impl Into<String>, endpoint: Url) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            endpoint,
            skills: Vec::new(),
            capabilities: AgentCapabilities::default(),
        }
    }

    /// Add a skill to the agent card
    pub fn with_skill(mut self, skill: Skill) -> Self {
        self.skills.push(skill);
        self
    }

    /// Set the agent capabilities
    pub fn with_capabilities(mut self, capabilities: AgentCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }
}

/// One advertised capability
///
/// Skills are purely descriptive; they drive discovery and documentation and
/// are not enforced at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Skill {
    /// Stable identifier for the skill
    pub id: String,

    /// Display name
    pub name: String,

    /// What the skill does
    pub description: String,

    /// Example requests this skill handles
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub examples: Vec<String>,

    /// Free-form tags for discovery
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl Skill {
    /// Create a new skill
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            description: description.into(),
            examples: Vec::new(),
            tags: Vec::new(),
        }
    }

    /// Add an example request
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.examples.push(example.into());
        self
    }

    /// Add a discovery tag
    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Agent capabilities
#[derive(Debug, Default, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentCapabilities {
    /// Supports streaming status updates
    #[serde(default)]
    pub streaming: bool,

    /// Supports push notifications via webhooks
    #[serde(rename = "pushNotifications", default)]
    pub push_notifications: bool,
}

impl AgentCapabilities {
    /// Create capabilities with default values (all false)
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable streaming
    pub fn with_streaming(mut self) -> Self {
        self.streaming = true;
        self
    }

    /// Enable push notifications
    pub fn with_push_notifications(mut self) -> Self {
        self.push_notifications = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> Url {
        "https://agents.example.com/orders".parse().unwrap()
    }

    #[test]
    fn test_agent_card_creation() {
        let card = AgentCard::new("order-agent", "Handles order mutations", endpoint())
            .with_capabilities(AgentCapabilities::new().with_streaming())
            .with_skill(
                Skill::new("order-update", "Order update", "Update order status and contents")
                    .with_example("Mark order ORD-1 as delayed")
                    .with_tag("orders"),
            );

        assert_eq!(card.name, "order-agent");
        assert!(card.capabilities.streaming);
        assert!(!card.capabilities.push_notifications);
        assert_eq!(card.skills.len(), 1);
        assert_eq!(card.skills[0].examples.len(), 1);
    }

    #[test]
    fn test_agent_card_serialization() {
        let card = AgentCard::new("order-agent", "Handles orders", endpoint())
            .with_capabilities(AgentCapabilities::new().with_push_notifications());

        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["name"], "order-agent");
        assert_eq!(json["capabilities"]["pushNotifications"], true);
        assert!(json["skills"].as_array().unwrap().is_empty());

        let deserialized: AgentCard = serde_json::from_value(json).unwrap();
        assert_eq!(card, deserialized);
    }
}
