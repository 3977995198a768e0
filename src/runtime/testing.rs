//! Mock implementations for testing
//!
//! These mocks enable runtime testing without real I/O.

use super::traits::*;
use crate::db::{checksum, PublishedFlow, StorageError};
use crate::engine::SessionState;
use crate::flow::FlowDefinition;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

// ============================================================================
// In-Memory Storage
// ============================================================================

/// In-memory storage with the same versioning and revision rules as sqlite
#[derive(Default)]
pub struct InMemoryStorage {
    flows: Mutex<HashMap<String, Vec<PublishedFlow>>>,
    sessions: Mutex<HashMap<String, SessionState>>,
    fail_saves: AtomicBool,
}

#[allow(dead_code)]
impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `save_session` fail with a storage error
    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Stored copy of a session, bypassing the trait
    pub fn session(&self, session_id: &str) -> Option<SessionState> {
        self.sessions.lock().unwrap().get(session_id).cloned()
    }
}

#[async_trait]
impl FlowStore for InMemoryStorage {
    async fn publish_flow(
        &self,
        flow_id: &str,
        definition: &FlowDefinition,
    ) -> Result<(PublishedFlow, bool), StorageError> {
        let checksum = checksum(definition)?;
        let mut flows = self.flows.lock().unwrap();
        let versions = flows.entry(flow_id.to_string()).or_default();

        if let Some(latest) = versions.last().filter(|f| f.checksum == checksum) {
            return Ok((latest.clone(), false));
        }

        let flow = PublishedFlow {
            flow_id: flow_id.to_string(),
            version: versions.last().map_or(1, |f| f.version + 1),
            definition: definition.clone(),
            checksum,
            published_at: Utc::now(),
        };
        versions.push(flow.clone());
        Ok((flow, true))
    }

    async fn get_flow(
        &self,
        flow_id: &str,
        version: Option<i64>,
    ) -> Result<PublishedFlow, StorageError> {
        let flows = self.flows.lock().unwrap();
        flows
            .get(flow_id)
            .and_then(|versions| match version {
                Some(v) => versions.iter().find(|f| f.version == v),
                None => versions.last(),
            })
            .cloned()
            .ok_or_else(|| StorageError::FlowNotFound(flow_id.to_string()))
    }
}

#[async_trait]
impl SessionStore for InMemoryStorage {
    async fn insert_session(&self, state: &SessionState) -> Result<(), StorageError> {
        let mut sessions = self.sessions.lock().unwrap();
        if sessions.contains_key(&state.session_id) {
            return Err(StorageError::SessionExists(state.session_id.clone()));
        }
        sessions.insert(state.session_id.clone(), state.clone());
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> Result<SessionState, StorageError> {
        self.sessions
            .lock()
            .unwrap()
            .get(session_id)
            .cloned()
            .ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))
    }

    async fn save_session(&self, state: &SessionState) -> Result<SessionState, StorageError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StorageError::Sqlite(rusqlite::Error::InvalidQuery));
        }
        let mut sessions = self.sessions.lock().unwrap();
        let stored = sessions
            .get_mut(&state.session_id)
            .ok_or_else(|| StorageError::SessionNotFound(state.session_id.clone()))?;
        if stored.revision != state.revision {
            return Err(StorageError::RevisionConflict {
                session_id: state.session_id.clone(),
                expected: state.revision,
            });
        }
        let mut next = state.clone();
        next.revision += 1;
        *stored = next.clone();
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(text: &str) -> FlowDefinition {
        serde_json::from_value(serde_json::json!({
            "containers": [{"id": "A", "nodes": [
                {"id": "n", "type": "bubble-text", "config": {"content": text}}
            ]}]
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn test_in_memory_flow_versions() {
        let storage = InMemoryStorage::new();
        let (v1, created) = storage.publish_flow("f", &definition("a")).await.unwrap();
        assert!(created);
        assert_eq!(v1.version, 1);

        let (again, created) = storage.publish_flow("f", &definition("a")).await.unwrap();
        assert!(!created);
        assert_eq!(again.version, 1);

        storage.publish_flow("f", &definition("b")).await.unwrap();
        assert_eq!(storage.get_flow("f", None).await.unwrap().version, 2);
        assert_eq!(storage.get_flow("f", Some(1)).await.unwrap().definition, definition("a"));

        // Reverting to "a" makes it the latest again
        let (reverted, created) = storage.publish_flow("f", &definition("a")).await.unwrap();
        assert!(created);
        assert_eq!(reverted.version, 3);
        assert_eq!(storage.get_flow("f", None).await.unwrap().definition, definition("a"));
        assert!(storage.get_flow("g", None).await.is_err());
    }

    #[tokio::test]
    async fn test_in_memory_session_revisions() {
        let storage = InMemoryStorage::new();
        let state = SessionState::new("s", "f", 1, "A", Utc::now());
        storage.insert_session(&state).await.unwrap();
        assert!(matches!(
            storage.insert_session(&state).await,
            Err(StorageError::SessionExists(_))
        ));

        let saved = storage.save_session(&state).await.unwrap();
        assert_eq!(saved.revision, 1);
        assert!(matches!(
            storage.save_session(&state).await,
            Err(StorageError::RevisionConflict { .. })
        ));

        storage.fail_saves(true);
        assert!(matches!(
            storage.save_session(&saved).await,
            Err(StorageError::Sqlite(_))
        ));
        assert_eq!(storage.session("s").unwrap().revision, 1);
    }
}
