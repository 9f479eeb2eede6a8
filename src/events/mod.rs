//! Conversation event publishing
//!
//! Every task status transition is projected into a [`ConversationEvent`]
//! and broadcast on the channel belonging to its context id, so observers
//! can render a live sequence of agent activity. Publishing is
//! fire-and-forget: a failed send is logged and dropped, never surfaced to
//! the control loop.

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::protocol::{
    message::Message,
    task::{TaskStatus, TaskTransition},
};

/// Default per-context channel capacity
const CHANNEL_CAPACITY: usize = 64;

/// The externally observable projection of a task transition
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationEvent {
    /// Event kind discriminator, always `"task"`
    pub kind: String,

    /// Id of the task that transitioned
    #[serde(rename = "taskId")]
    pub task_id: String,

    /// Context the task belongs to
    #[serde(rename = "contextId")]
    pub context_id: String,

    /// Specialist the task was delegated to
    #[serde(rename = "agentId")]
    pub agent_id: String,

    /// Status after the transition
    pub status: TaskStatus,

    /// Latest human-readable status annotation
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<Message>,

    /// When the transition occurred
    pub timestamp: DateTime<Utc>,
}

impl ConversationEvent {
    /// Project a transition record into its event form
    pub fn from_transition(transition: &TaskTransition) -> Self {
        Self {
            kind: "task".to_string(),
            task_id: transition.task_id.clone(),
            context_id: transition.context_id.clone(),
            agent_id: transition.agent_id.clone(),
            status: transition.status,
            status_message: transition.status_message.clone(),
            timestamp: transition.timestamp,
        }
    }

    /// Check if this event closes out its task
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Broadcast publisher for conversation events
///
/// One broadcast channel per context id, created lazily on first subscribe
/// or emit. Ordering is strict within one context channel; nothing is
/// guaranteed across contexts. Cloning shares the underlying channels.
#[derive(Debug, Clone, Default)]
pub struct EventPublisher {
    channels: Arc<RwLock<HashMap<String, broadcast::Sender<Bytes>>>>,
}

impl EventPublisher {
    /// Create a publisher with no channels yet
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to the event stream for one context
    pub fn subscribe(&self, context_id: &str) -> broadcast::Receiver<Bytes> {
        let mut channels = self.channels.write().expect("event channel lock poisoned");
        channels
            .entry(context_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publish a task transition to its context channel
    ///
    /// Fire-and-forget relative to the caller: serialization failures and
    /// send failures (no subscribers) are logged and dropped. Observability
    /// must never become a correctness dependency of the control loop.
    pub fn emit(&self, transition: &TaskTransition) {
        let event = ConversationEvent::from_transition(transition);
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => Bytes::from(payload),
            Err(err) => {
                warn!(task_id = %transition.task_id, error = %err, "dropping unserializable event");
                return;
            }
        };

        let sender = {
            let channels = self.channels.read().expect("event channel lock poisoned");
            channels.get(&transition.context_id).cloned()
        };

        match sender {
            Some(sender) => {
                if sender.send(payload).is_err() {
                    warn!(
                        context_id = %transition.context_id,
                        task_id = %transition.task_id,
                        "dropping event: no live subscribers"
                    );
                }
            }
            None => {
                debug!(
                    context_id = %transition.context_id,
                    "no channel for context, event dropped"
                );
            }
        }
    }
}
