//! Trait abstractions for runtime I/O
//!
//! These traits enable testing the runtime with mock implementations.

use crate::db::{Database, PublishedFlow, StorageError};
use crate::engine::SessionState;
use crate::flow::FlowDefinition;
use async_trait::async_trait;
use std::sync::Arc;

/// Storage for published flow versions
#[async_trait]
pub trait FlowStore: Send + Sync {
    /// Store the next version, or return the existing one for an identical definition.
    /// The flag is `true` when a new version was written.
    async fn publish_flow(
        &self,
        flow_id: &str,
        definition: &FlowDefinition,
    ) -> Result<(PublishedFlow, bool), StorageError>;

    /// A specific version, or the latest
    async fn get_flow(
        &self,
        flow_id: &str,
        version: Option<i64>,
    ) -> Result<PublishedFlow, StorageError>;
}

/// Storage for session state
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn insert_session(&self, state: &SessionState) -> Result<(), StorageError>;

    async fn get_session(&self, session_id: &str) -> Result<SessionState, StorageError>;

    /// Compare-and-swap on `state.revision`; returns the state as stored
    async fn save_session(&self, state: &SessionState) -> Result<SessionState, StorageError>;
}

/// Combined storage trait for convenience
pub trait Storage: FlowStore + SessionStore {}
impl<T: FlowStore + SessionStore> Storage for T {}

// ============================================================================
// Arc implementations for trait objects
// ============================================================================

#[async_trait]
impl<T: FlowStore + ?Sized> FlowStore for Arc<T> {
    async fn publish_flow(
        &self,
        flow_id: &str,
        definition: &FlowDefinition,
    ) -> Result<(PublishedFlow, bool), StorageError> {
        (**self).publish_flow(flow_id, definition).await
    }

    async fn get_flow(
        &self,
        flow_id: &str,
        version: Option<i64>,
    ) -> Result<PublishedFlow, StorageError> {
        (**self).get_flow(flow_id, version).await
    }
}

#[async_trait]
impl<T: SessionStore + ?Sized> SessionStore for Arc<T> {
    async fn insert_session(&self, state: &SessionState) -> Result<(), StorageError> {
        (**self).insert_session(state).await
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionState, StorageError> {
        (**self).get_session(session_id).await
    }

    async fn save_session(&self, state: &SessionState) -> Result<SessionState, StorageError> {
        (**self).save_session(state).await
    }
}

// ============================================================================
// Production Adapter
// ============================================================================

/// Adapter to use Database as Storage
#[derive(Clone)]
pub struct DatabaseStorage {
    db: Database,
}

impl DatabaseStorage {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl FlowStore for DatabaseStorage {
    async fn publish_flow(
        &self,
        flow_id: &str,
        definition: &FlowDefinition,
    ) -> Result<(PublishedFlow, bool), StorageError> {
        self.db.publish_flow(flow_id, definition)
    }

    async fn get_flow(
        &self,
        flow_id: &str,
        version: Option<i64>,
    ) -> Result<PublishedFlow, StorageError> {
        self.db.get_flow(flow_id, version)
    }
}

#[async_trait]
impl SessionStore for DatabaseStorage {
    async fn insert_session(&self, state: &SessionState) -> Result<(), StorageError> {
        self.db.insert_session(state)
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionState, StorageError> {
        self.db.get_session(session_id)
    }

    async fn save_session(&self, state: &SessionState) -> Result<SessionState, StorageError> {
        self.db.save_session(state)
    }
}
