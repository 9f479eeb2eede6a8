//! Core orchestration protocol types and definitions

pub mod agent;
pub mod error;
pub mod message;
pub mod task;

pub use agent::{AgentCapabilities, AgentCard, Skill};
pub use error::{MeshError, MeshResult, ToolError};
pub use message::{Message, MessagePart, Role};
pub use task::{Task, TaskStatus, TaskTransition};
