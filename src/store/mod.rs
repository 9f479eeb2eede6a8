//! Record and conversation-history store interfaces
//!
//! The orchestration core never talks to a concrete database; it depends on
//! these traits. Domain records live in a tenant-scoped key-value store with
//! optimistic concurrency, conversation memory behind a load/append pair.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::protocol::{error::MeshError, message::Message, MeshResult};

/// A stored record together with its write version
#[derive(Debug, Clone, PartialEq)]
pub struct VersionedRecord {
    /// Monotonically increasing write counter, starting at 1
    pub version: u64,

    /// The record payload
    pub value: Value,
}

/// Tenant-scoped key-value store with conditional writes
///
/// Concurrent tool invocations against the same record are serialized by the
/// store's conditional-write discipline: an update only succeeds if the
/// expected prior version still holds, and fails with [`MeshError::Conflict`]
/// otherwise rather than silently overwriting.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Fetch a record, if present
    async fn get(&self, tenant: &str, key: &str) -> MeshResult<Option<VersionedRecord>>;

    /// Create or replace a record unconditionally
    async fn put(&self, tenant: &str, key: &str, value: Value) -> MeshResult<VersionedRecord>;

    /// Create a record only if the key does not exist yet
    ///
    /// This is the at-most-once primitive for side-effecting tools: a second
    /// attempt against the same key fails with `Conflict` instead of applying
    /// the effect again.
    async fn create(&self, tenant: &str, key: &str, value: Value) -> MeshResult<VersionedRecord>;

    /// Replace a record only if its current version matches `expected_version`
    async fn update(
        &self,
        tenant: &str,
        key: &str,
        expected_version: u64,
        value: Value,
    ) -> MeshResult<VersionedRecord>;
}

/// In-memory record store
///
/// Records are namespaced by `(tenant, key)`, so identically named keys under
/// different tenants never observe each other.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<(String, String), VersionedRecord>>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get(&self, tenant: &str, key: &str) -> MeshResult<Option<VersionedRecord>> {
        let records = self.records.read().await;
        Ok(records.get(&(tenant.to_string(), key.to_string())).cloned())
    }

    async fn put(&self, tenant: &str, key: &str, value: Value) -> MeshResult<VersionedRecord> {
        let mut records = self.records.write().await;
        let slot = (tenant.to_string(), key.to_string());
        let version = records.get(&slot).map(|r| r.version).unwrap_or(0) + 1;
        let record = VersionedRecord { version, value };
        records.insert(slot, record.clone());
        Ok(record)
    }

    async fn create(&self, tenant: &str, key: &str, value: Value) -> MeshResult<VersionedRecord> {
        let mut records = self.records.write().await;
        let slot = (tenant.to_string(), key.to_string());
        if let Some(existing) = records.get(&slot) {
            return Err(MeshError::Conflict {
                key: key.to_string(),
                expected: 0,
                found: existing.version,
            });
        }
        let record = VersionedRecord { version: 1, value };
        records.insert(slot, record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        tenant: &str,
        key: &str,
        expected_version: u64,
        value: Value,
    ) -> MeshResult<VersionedRecord> {
        let mut records = self.records.write().await;
        let slot = (tenant.to_string(), key.to_string());
        let found = records.get(&slot).map(|r| r.version).unwrap_or(0);
        if found != expected_version {
            return Err(MeshError::Conflict {
                key: key.to_string(),
                expected: expected_version,
                found,
            });
        }
        let record = VersionedRecord {
            version: expected_version + 1,
            value,
        };
        records.insert(slot, record.clone());
        Ok(record)
    }
}

/// Conversation memory behind an explicit interface
///
/// The reasoning loops depend only on this pair, not on any backing store.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Load the accumulated history for a session
    async fn load_history(&self, session_id: &str) -> MeshResult<Vec<Message>>;

    /// Append messages to a session's history
    async fn append_history(&self, session_id: &str, messages: &[Message]) -> MeshResult<()>;
}

/// In-memory history store
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    sessions: RwLock<HashMap<String, Vec<Message>>>,
}

impl MemoryHistoryStore {
    /// Create an empty history store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn load_history(&self, session_id: &str) -> MeshResult<Vec<Message>> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(session_id).cloned().unwrap_or_default())
    }

    async fn append_history(&self, session_id: &str, messages: &[Message]) -> MeshResult<()> {
        let mut sessions = self.sessions.write().await;
        sessions
            .entry(session_id.to_string())
            .or_default()
            .extend_from_slice(messages);
        Ok(())
    }
}
