//! # Courier Mesh
//!
//! A multi-agent orchestration core for delivery exception resolution.
//!
//! An inbound exception (damaged package, failed delivery attempt, theft) is
//! handled by a supervisor reasoning loop that classifies it against a
//! declarative decision policy and delegates sub-tasks to flat, independently
//! addressable specialist agents (orders, payments, warehouse). Each
//! delegation is tracked as a task moving through a status lifecycle, and
//! every status transition is republished on a per-conversation event channel
//! for live observers.
//!
//! ## Features
//!
//! - **Bounded reasoning loops**: model turns and delegated tasks carry
//!   iteration bounds and deadlines; a hallucinated tool-calling spiral never
//!   blocks a caller indefinitely
//! - **Composable dispatch**: the supervisor ↔ specialist channel is a Tower
//!   service; validation and deadlines compose as layers, in-process and HTTP
//!   dispatchers share one contract
//! - **Tenant isolation**: tenant identity flows from the trusted ingress
//!   context to every tool invocation, never from model output
//! - **At-most-once effects**: side-effecting tools (refunds, allocation) go
//!   through conditional writes, so retries fail loudly instead of applying
//!   twice
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use courier_mesh::prelude::*;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(llm: Arc<dyn courier_mesh::llm::LlmClient>) {
//! let store: Arc<dyn courier_mesh::store::RecordStore> =
//!     Arc::new(courier_mesh::store::MemoryStore::new());
//! let directory = AgentDirectory::new();
//! let dispatcher = LocalDispatcher::new();
//!
//! let supervisor = Supervisor::new(
//!     llm,
//!     DispatchService::new(dispatcher),
//!     directory,
//!     store,
//!     SupervisorConfig::default(),
//! );
//!
//! let exception = ExceptionEvent::new("DEL-1", "ctx-1", "Package Damaged", "crushed box")
//!     .with_order_value(250.0);
//! let summary = supervisor
//!     .resolve(exception, &TenantContext::new("acme"), CancellationToken::new())
//!     .await;
//! println!("{}: {:?}", summary.classification, summary.status);
//! # }
//! ```

pub mod directory;
pub mod dispatch;
pub mod events;
pub mod layer;
pub mod llm;
pub mod protocol;
pub mod runtime;
pub mod store;
pub mod supervisor;
pub mod tool;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        directory::AgentDirectory,
        dispatch::{DispatchService, LocalDispatcher, TaskRequest},
        events::{ConversationEvent, EventPublisher},
        protocol::{
            AgentCard, MeshError, Message, MessagePart, Role, Skill, Task, TaskStatus,
        },
        runtime::{AgentRuntime, RuntimeConfig},
        supervisor::{
            ExceptionEvent, ResolutionStatus, ResolutionSummary, Supervisor, SupervisorConfig,
        },
        tool::{TenantContext, ToolRegistry, ToolSpec},
    };
}
