//! Agent directory and card exchange
//!
//! Specialists publish a capability descriptor at startup so a supervisor
//! can discover what it can delegate to. Publication is idempotent (last
//! write wins per agent name); cards are read-only once published.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use tracing::debug;

use crate::{
    dispatch::TaskRequest,
    protocol::{agent::AgentCard, error::MeshError, message::MessagePart, MeshResult},
};

/// Registry of published agent cards
///
/// Cloning shares the underlying directory; handlers all see the same set
/// of cards.
#[derive(Debug, Clone, Default)]
pub struct AgentDirectory {
    cards: Arc<RwLock<HashMap<String, AgentCard>>>,
}

impl AgentDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish an agent card
    ///
    /// Idempotent: re-publishing under the same name replaces the previous
    /// card wholesale, with no duplication or accumulation.
    pub fn publish(&self, card: AgentCard) {
        debug!(agent = %card.name, "publishing agent card");
        let mut cards = self.cards.write().expect("directory lock poisoned");
        cards.insert(card.name.clone(), card);
    }

    /// Look up an agent's card by name
    pub fn describe(&self, name: &str) -> Option<AgentCard> {
        let cards = self.cards.read().expect("directory lock poisoned");
        cards.get(name).cloned()
    }

    /// All published cards, sorted by agent name
    pub fn list(&self) -> Vec<AgentCard> {
        let cards = self.cards.read().expect("directory lock poisoned");
        let mut all: Vec<AgentCard> = cards.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        all
    }
}

/// Validate that an inbound payload is a well-formed task-message envelope
///
/// Pure input validation, no business logic: a context id must be present
/// and the message must carry at least one non-empty part.
pub fn validate_envelope(request: &TaskRequest) -> MeshResult<()> {
    if request.context_id.trim().is_empty() {
        return Err(MeshError::Validation(
            "Task request must carry a context id".into(),
        ));
    }

    if request.message.parts.is_empty() {
        return Err(MeshError::Validation(
            "Message must have at least one part".into(),
        ));
    }

    for part in &request.message.parts {
        match part {
            MessagePart::Text { text } => {
                if text.trim().is_empty() {
                    return Err(MeshError::Validation("Text part cannot be empty".into()));
                }
            }
            MessagePart::ToolResult { tool_use_id, .. } => {
                if tool_use_id.is_empty() {
                    return Err(MeshError::Validation(
                        "Tool result part must reference a tool call".into(),
                    ));
                }
            }
        }
    }

    Ok(())
}
