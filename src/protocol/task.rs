//! Task types and lifecycle management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{error::MeshError, message::Message};

/// A unit of work delegated from the supervisor to a specialist agent
///
/// Tasks move through a lifecycle from submitted to a terminal state. The
/// status field changes only through [`Task::transition`], which enforces the
/// lifecycle graph and hands back the record the event publisher emits.
/// History is append-only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Task {
    /// Unique identifier for the task
    pub id: String,

    /// Groups all tasks belonging to one end-to-end resolution
    #[serde(rename = "contextId")]
    pub context_id: String,

    /// Name of the specialist agent this task was delegated to
    #[serde(rename = "agentId")]
    pub agent_id: String,

    /// Current status of the task
    pub status: TaskStatus,

    /// Ordered conversation history, starting with the initiating message
    pub history: Vec<Message>,

    /// Latest human-readable status annotation
    #[serde(rename = "statusMessage", skip_serializing_if = "Option::is_none")]
    pub status_message: Option<Message>,

    /// When the task was created
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,

    /// When the task was last updated
    #[serde(rename = "updatedAt", skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Create a new task in the `submitted` state
    ///
    /// A fresh id is minted per delegation; tasks are never reused across
    /// invocations.
    pub fn new(
        context_id: impl Into<String>,
        agent_id: impl Into<String>,
        initiating: Message,
    ) -> Self {
        Self {
            id: Uuid::now_v7().to_string(),
            context_id: context_id.into(),
            agent_id: agent_id.into(),
            status: TaskStatus::Submitted,
            history: vec![initiating],
            status_message: None,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    /// Check if the task is in a terminal state
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Check if the task is awaiting missing input
    pub fn requires_input(&self) -> bool {
        self.status == TaskStatus::InputRequired
    }

    /// Move the task to a new status
    ///
    /// Returns the transition record to hand to the event publisher, or
    /// `InvalidTransition` if the requested status is not reachable from the
    /// current one. On error the task is left untouched.
    pub fn transition(
        &mut self,
        status: TaskStatus,
        status_message: Option<Message>,
    ) -> Result<TaskTransition, MeshError> {
        if !self.status.can_transition_to(status) {
            return Err(MeshError::InvalidTransition {
                from: self.status,
                to: status,
            });
        }

        self.status = status;
        self.status_message = status_message;
        self.updated_at = Some(Utc::now());

        Ok(TaskTransition {
            task_id: self.id.clone(),
            context_id: self.context_id.clone(),
            agent_id: self.agent_id.clone(),
            status,
            status_message: self.status_message.clone(),
            timestamp: self.updated_at.unwrap_or(self.created_at),
        })
    }

    /// Snapshot the current state as a transition record
    ///
    /// Used to announce a freshly created task on the event channel before
    /// any transition has happened.
    pub fn as_transition(&self) -> TaskTransition {
        TaskTransition {
            task_id: self.id.clone(),
            context_id: self.context_id.clone(),
            agent_id: self.agent_id.clone(),
            status: self.status,
            status_message: self.status_message.clone(),
            timestamp: self.updated_at.unwrap_or(self.created_at),
        }
    }

    /// Append a message to the task history
    pub fn append_message(&mut self, message: Message) {
        self.history.push(message);
        self.updated_at = Some(Utc::now());
    }

    /// Final agent-authored text, scanning history from the most recent turn
    pub fn final_text(&self) -> Option<String> {
        self.history
            .iter()
            .rev()
            .filter(|m| m.role == super::message::Role::Agent)
            .find_map(|m| m.text())
    }
}

/// Task status in the delegation lifecycle
///
/// Lifecycle graph: submitted → working → {input-required, completed,
/// failed}; input-required → working; any non-terminal state → cancelled.
/// Completed, failed and cancelled are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
    /// Task has been received and is queued for processing
    Submitted,

    /// Task is currently being processed
    Working,

    /// Task requires additional input before it can continue
    InputRequired,

    /// Task completed successfully
    Completed,

    /// Task failed with an error
    Failed,

    /// Task was cancelled externally
    Cancelled,
}

impl TaskStatus {
    /// Check if this is a terminal status
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled
        )
    }

    /// Check whether the lifecycle graph permits moving to `next`
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == TaskStatus::Cancelled {
            return true;
        }
        match self {
            TaskStatus::Submitted => next == TaskStatus::Working,
            TaskStatus::Working => matches!(
                next,
                TaskStatus::InputRequired | TaskStatus::Completed | TaskStatus::Failed
            ),
            TaskStatus::InputRequired => next == TaskStatus::Working,
            _ => false,
        }
    }

    /// All statuses, for exhaustive property checks
    pub fn all() -> [TaskStatus; 6] {
        [
            TaskStatus::Submitted,
            TaskStatus::Working,
            TaskStatus::InputRequired,
            TaskStatus::Completed,
            TaskStatus::Failed,
            TaskStatus::Cancelled,
        ]
    }
}

/// Record of one successful status transition
///
/// This is the only form in which state changes become observable: every
/// transition produces exactly one of these for the event publisher.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskTransition {
    pub task_id: String,
    pub context_id: String,
    pub agent_id: String,
    pub status: TaskStatus,
    pub status_message: Option<Message>,
    pub timestamp: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use crate::protocol::message::Message;

    use super::*;

    #[test]
    fn test_task_creation() {
        let task = Task::new("ctx-1", "order-agent", Message::user("Test"));

        assert_eq!(task.context_id, "ctx-1");
        assert_eq!(task.agent_id, "order-agent");
        assert_eq!(task.status, TaskStatus::Submitted);
        assert_eq!(task.history.len(), 1);
        assert!(!task.is_terminal());
    }

    #[test]
    fn test_task_lifecycle() {
        let mut task = Task::new("ctx-1", "order-agent", Message::user("Test"));

        let transition = task.transition(TaskStatus::Working, None).unwrap();
        assert_eq!(transition.status, TaskStatus::Working);
        assert_eq!(transition.task_id, task.id);

        task.transition(TaskStatus::InputRequired, Some(Message::agent("Need the order id")))
            .unwrap();
        assert!(task.requires_input());

        task.transition(TaskStatus::Working, None).unwrap();
        task.transition(TaskStatus::Completed, None).unwrap();
        assert!(task.is_terminal());
    }

    #[test]
    fn test_invalid_transition_rejected() {
        let mut task = Task::new("ctx-1", "order-agent", Message::user("Test"));

        // submitted cannot jump straight to completed
        let err = task.transition(TaskStatus::Completed, None).unwrap_err();
        assert!(matches!(
            err,
            MeshError::InvalidTransition {
                from: TaskStatus::Submitted,
                to: TaskStatus::Completed,
            }
        ));
        assert_eq!(task.status, TaskStatus::Submitted);
    }

    #[test]
    fn test_terminal_states_reject_every_transition() {
        for terminal in [TaskStatus::Completed, TaskStatus::Failed, TaskStatus::Cancelled] {
            for next in TaskStatus::all() {
                assert!(
                    !terminal.can_transition_to(next),
                    "{terminal:?} must not transition to {next:?}"
                );
            }
        }
    }

    #[test]
    fn test_cancel_from_any_non_terminal() {
        for state in [TaskStatus::Submitted, TaskStatus::Working, TaskStatus::InputRequired] {
            assert!(state.can_transition_to(TaskStatus::Cancelled));
        }
    }

    #[test]
    fn test_history_is_append_only() {
        let mut task = Task::new("ctx-1", "order-agent", Message::user("Test"));
        let mut last_len = task.history.len();

        task.transition(TaskStatus::Working, None).unwrap();
        assert!(task.history.len() >= last_len);
        last_len = task.history.len();

        task.append_message(Message::agent("Looking into it"));
        assert!(task.history.len() > last_len);
    }

    #[test]
    fn test_final_text_scans_backwards() {
        let mut task = Task::new("ctx-1", "order-agent", Message::user("Test"));
        assert_eq!(task.final_text(), None);

        task.append_message(Message::agent("partial answer"));
        task.append_message(Message::tool_results(vec![(
            "call-1".to_string(),
            serde_json::json!({"ok": true}),
        )]));

        assert_eq!(task.final_text(), Some("partial answer".to_string()));
    }

    #[test]
    fn test_task_serialization() {
        let task = Task::new("ctx-1", "order-agent", Message::user("Test"));

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "submitted");
        assert_eq!(json["contextId"], "ctx-1");
        assert_eq!(json["agentId"], "order-agent");

        let deserialized: Task = serde_json::from_value(json).unwrap();
        assert_eq!(task, deserialized);
    }

    #[test]
    fn test_status_wire_format() {
        let mut task = Task::new("ctx-1", "order-agent", Message::user("Test"));
        task.transition(TaskStatus::Working, None).unwrap();
        task.transition(TaskStatus::InputRequired, None).unwrap();

        let json = serde_json::to_value(&task).unwrap();
        assert_eq!(json["status"], "input-required");
    }
}
