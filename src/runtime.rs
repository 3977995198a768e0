//! Runtime for executing conversations
//!
//! Glue between the transport and the engine: load the session and the flow
//! version it is pinned to, run one turn, persist the result. A failed turn
//! persists nothing, so the session stays at its last good state.

pub mod traits;

#[cfg(test)]
pub mod testing;

pub use traits::*;

use crate::config::EngineConfig;
use crate::db::{PublishedFlow, StorageError};
use crate::engine::{
    new_session, run_turn, Clock, EngineError, InboundPayload, RandomIds, SessionState,
    SystemClock, TurnContext, TurnOutcome, TurnOutput, WaitingFor,
};
use crate::flow::{validate, FlowDefinition, FlowGraph, ValidationIssue};
use crate::script::{ClientContext, EmbeddedSandbox};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Type alias for production runtime with concrete implementations
pub type ProductionRuntime = ChatRuntime<DatabaseStorage>;

/// What the end user sees when a turn fails
pub const GENERIC_FAILURE: &str = "Something went wrong, please try again.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnErrorKind {
    GraphIntegrity,
    Script,
    Storage,
    Conflict,
    NotFound,
    BadRequest,
}

/// A turn that could not complete. `waiting_for` is the last persisted value.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct TurnError {
    pub kind: TurnErrorKind,
    pub message: String,
    pub waiting_for: Option<WaitingFor>,
}

impl TurnError {
    pub fn new(kind: TurnErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            waiting_for: None,
        }
    }

    #[must_use]
    pub fn waiting_for(mut self, waiting_for: Option<WaitingFor>) -> Self {
        self.waiting_for = waiting_for;
        self
    }
}

impl From<StorageError> for TurnError {
    fn from(e: StorageError) -> Self {
        let kind = match e {
            StorageError::FlowNotFound(_) | StorageError::SessionNotFound(_) => {
                TurnErrorKind::NotFound
            }
            StorageError::RevisionConflict { .. } | StorageError::SessionExists(_) => {
                TurnErrorKind::Conflict
            }
            StorageError::Sqlite(_) | StorageError::Serde(_) => TurnErrorKind::Storage,
        };
        TurnError::new(kind, e.to_string())
    }
}

impl From<EngineError> for TurnError {
    fn from(e: EngineError) -> Self {
        let kind = match e {
            EngineError::Graph(_) => TurnErrorKind::GraphIntegrity,
            EngineError::Script { .. } => TurnErrorKind::Script,
        };
        TurnError::new(kind, e.to_string())
    }
}

/// One inbound event as the transport received it
#[derive(Debug, Clone, Default)]
pub struct TurnRequest {
    /// Absent for a conversation start
    pub session_id: Option<String>,
    pub flow_id: Option<String>,
    /// Version to start on; latest when absent
    pub version: Option<i64>,
    pub inbound: Option<InboundPayload>,
    pub client: ClientContext,
}

#[derive(Debug, Clone)]
pub struct TurnReply {
    pub session_id: String,
    pub output: TurnOutput,
}

/// Result of a publish request
#[derive(Debug, Clone)]
pub struct PublishOutcome {
    pub flow: PublishedFlow,
    /// `false` when an identical version already existed
    pub created: bool,
    pub warnings: Vec<ValidationIssue>,
}

pub struct ChatRuntime<S: Storage> {
    storage: S,
    config: EngineConfig,
    sandbox: EmbeddedSandbox,
    clock: Arc<dyn Clock>,
}

impl<S: Storage> ChatRuntime<S> {
    pub fn new(storage: S, config: EngineConfig) -> Self {
        Self {
            sandbox: EmbeddedSandbox::new(config.script_limits),
            storage,
            config,
            clock: Arc::new(SystemClock),
        }
    }

    #[must_use]
    #[allow(dead_code)] // Used in tests
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[allow(dead_code)] // Useful for tests
    pub fn storage(&self) -> &S {
        &self.storage
    }

    // ==================== Flows ====================

    /// Validate and store a definition. A generated id is used when `flow_id` is absent.
    pub async fn publish_flow(
        &self,
        flow_id: Option<String>,
        definition: FlowDefinition,
    ) -> Result<PublishOutcome, TurnError> {
        let flow_id = flow_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
        let report = validate(&definition);
        if !report.is_publishable() {
            let problems: Vec<&str> = report.errors().map(|i| i.message.as_str()).collect();
            tracing::warn!(flow_id = %flow_id, errors = problems.len(), "Rejected flow definition");
            return Err(TurnError::new(
                TurnErrorKind::BadRequest,
                format!("Flow is not publishable: {}", problems.join("; ")),
            ));
        }

        let (flow, created) = self.storage.publish_flow(&flow_id, &definition).await?;
        tracing::info!(
            flow_id = %flow.flow_id,
            version = flow.version,
            created,
            checksum = %flow.checksum,
            "Published flow"
        );
        Ok(PublishOutcome {
            flow,
            created,
            warnings: report.warnings().cloned().collect(),
        })
    }

    pub async fn get_flow(
        &self,
        flow_id: &str,
        version: Option<i64>,
    ) -> Result<PublishedFlow, TurnError> {
        Ok(self.storage.get_flow(flow_id, version).await?)
    }

    // ==================== Sessions ====================

    pub async fn get_session(&self, session_id: &str) -> Result<SessionState, TurnError> {
        Ok(self.storage.get_session(session_id).await?)
    }

    /// Route a turn request to a new or an existing session
    pub async fn handle_turn(&self, request: TurnRequest) -> Result<TurnReply, TurnError> {
        match request.session_id {
            Some(session_id) => {
                self.continue_session(&session_id, request.inbound.as_ref(), &request.client)
                    .await
            }
            None => {
                let flow_id = request.flow_id.ok_or_else(|| {
                    TurnError::new(
                        TurnErrorKind::BadRequest,
                        "Either sessionId or flowId is required",
                    )
                })?;
                self.start_session(
                    &flow_id,
                    request.version,
                    request.inbound.as_ref(),
                    &request.client,
                )
                .await
            }
        }
    }

    /// Create a session on a published flow and run it to its first suspension
    pub async fn start_session(
        &self,
        flow_id: &str,
        version: Option<i64>,
        inbound: Option<&InboundPayload>,
        client: &ClientContext,
    ) -> Result<TurnReply, TurnError> {
        let flow = self.storage.get_flow(flow_id, version).await?;
        let graph = FlowGraph::new(flow.definition);
        let session_id = uuid::Uuid::new_v4().to_string();

        let state = new_session(&graph, &session_id, flow_id, flow.version, self.clock.now())
            .map_err(|e| turn_failed(&session_id, e, None))?;
        let outcome = self
            .run(&graph, &state, inbound, client)
            .map_err(|e| turn_failed(&session_id, e, None))?;

        self.storage.insert_session(&outcome.state).await?;
        tracing::info!(
            session_id = %session_id,
            flow_id = %flow_id,
            flow_version = flow.version,
            "Session started"
        );

        Ok(TurnReply {
            session_id,
            output: outcome.output,
        })
    }

    async fn continue_session(
        &self,
        session_id: &str,
        inbound: Option<&InboundPayload>,
        client: &ClientContext,
    ) -> Result<TurnReply, TurnError> {
        let state = self.storage.get_session(session_id).await?;
        let last_waiting = state.waiting_for;

        let flow = self
            .storage
            .get_flow(&state.flow_id, Some(state.flow_version))
            .await
            .map_err(|e| TurnError::from(e).waiting_for(last_waiting))?;
        let graph = FlowGraph::new(flow.definition);

        let outcome = self
            .run(&graph, &state, inbound, client)
            .map_err(|e| turn_failed(session_id, e, last_waiting))?;

        self.storage
            .save_session(&outcome.state)
            .await
            .map_err(|e| {
                tracing::error!(session_id = %session_id, error = %e, "Failed to persist session");
                TurnError::from(e).waiting_for(last_waiting)
            })?;

        Ok(TurnReply {
            session_id: session_id.to_string(),
            output: outcome.output,
        })
    }

    fn run(
        &self,
        graph: &FlowGraph,
        state: &SessionState,
        inbound: Option<&InboundPayload>,
        client: &ClientContext,
    ) -> Result<TurnOutcome, EngineError> {
        let started = Instant::now();
        let mut random = RandomIds::from_entropy();
        let mut ctx = TurnContext {
            clock: self.clock.as_ref(),
            random: &mut random,
            sandbox: &self.sandbox,
            config: &self.config,
            client,
        };
        let outcome = run_turn(graph, state, inbound, &mut ctx)?;

        tracing::info!(
            session_id = %state.session_id,
            flow_id = %state.flow_id,
            container_id = %outcome.state.current_container_id,
            messages = outcome.output.messages.len(),
            status = ?outcome.state.status,
            duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Turn completed"
        );
        Ok(outcome)
    }
}

fn turn_failed(session_id: &str, error: EngineError, last_waiting: Option<WaitingFor>) -> TurnError {
    tracing::error!(session_id = %session_id, error = %error, "Turn failed");
    TurnError::from(error).waiting_for(last_waiting)
}

#[cfg(test)]
mod tests {
    use super::testing::InMemoryStorage;
    use super::*;
    use crate::config::ScriptFailurePolicy;
    use crate::engine::{FixedClock, SessionStatus};
    use chrono::{DateTime, Utc};
    use serde_json::json;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-05-04T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn runtime(config: EngineConfig) -> ChatRuntime<Arc<InMemoryStorage>> {
        ChatRuntime::new(Arc::new(InMemoryStorage::new()), config)
            .with_clock(Arc::new(FixedClock(at())))
    }

    fn name_flow() -> FlowDefinition {
        serde_json::from_value(json!({
            "containers": [
                {"id": "A", "nodes": [
                    {"id": "hello", "type": "bubble-text", "config": {"content": "Welcome!"}},
                    {"id": "ask", "type": "input-text", "config": {"prompt": "Your name?", "saveVariable": "name"}}
                ]},
                {"id": "B", "nodes": [
                    {"id": "bye", "type": "bubble-text", "config": {"content": "Bye {{name}}"}}
                ]}
            ],
            "edges": [{"source": "A", "target": "B"}]
        }))
        .unwrap()
    }

    fn start(flow_id: &str) -> TurnRequest {
        TurnRequest {
            flow_id: Some(flow_id.to_string()),
            ..TurnRequest::default()
        }
    }

    fn answer(session_id: &str, text: &str) -> TurnRequest {
        TurnRequest {
            session_id: Some(session_id.to_string()),
            inbound: Some(InboundPayload::text(text)),
            ..TurnRequest::default()
        }
    }

    #[tokio::test]
    async fn test_full_conversation_is_persisted() {
        let rt = runtime(EngineConfig::default());
        rt.publish_flow(Some("greet".into()), name_flow()).await.unwrap();

        let first = rt.handle_turn(start("greet")).await.unwrap();
        assert_eq!(first.output.texts(), vec!["Welcome!", "Your name?"]);
        assert_eq!(first.output.waiting_for, Some(WaitingFor::Text));

        let stored = rt.get_session(&first.session_id).await.unwrap();
        assert_eq!(stored.revision, 0);
        assert_eq!(stored.created_at, at());

        let second = rt.handle_turn(answer(&first.session_id, "Ada")).await.unwrap();
        assert_eq!(second.output.texts(), vec!["Bye Ada"]);
        assert_eq!(second.output.status, SessionStatus::Ended);

        let stored = rt.get_session(&first.session_id).await.unwrap();
        assert_eq!(stored.revision, 1);
        assert_eq!(stored.variables.get("name"), Some("Ada"));
    }

    #[tokio::test]
    async fn test_session_stays_on_its_flow_version() {
        let rt = runtime(EngineConfig::default());
        rt.publish_flow(Some("greet".into()), name_flow()).await.unwrap();
        let first = rt.handle_turn(start("greet")).await.unwrap();

        let mut changed = name_flow();
        changed.containers[1].nodes[0] = serde_json::from_value(json!(
            {"id": "bye", "type": "bubble-text", "config": {"content": "Changed"}}
        ))
        .unwrap();
        let published = rt.publish_flow(Some("greet".into()), changed).await.unwrap();
        assert_eq!(published.flow.version, 2);

        let reply = rt.handle_turn(answer(&first.session_id, "Ada")).await.unwrap();
        assert_eq!(reply.output.texts(), vec!["Bye Ada"]);
    }

    #[tokio::test]
    async fn test_unpublishable_flow_is_rejected() {
        let rt = runtime(EngineConfig::default());
        let broken: FlowDefinition = serde_json::from_value(json!({
            "containers": [{"id": "A", "nodes": []}],
            "edges": [{"source": "A", "target": "Z"}]
        }))
        .unwrap();

        let err = rt.publish_flow(None, broken).await.unwrap_err();
        assert_eq!(err.kind, TurnErrorKind::BadRequest);
        assert!(err.message.contains("'Z'"), "{}", err.message);
    }

    #[tokio::test]
    async fn test_missing_ids() {
        let rt = runtime(EngineConfig::default());
        let err = rt.handle_turn(TurnRequest::default()).await.unwrap_err();
        assert_eq!(err.kind, TurnErrorKind::BadRequest);

        let err = rt.handle_turn(start("nope")).await.unwrap_err();
        assert_eq!(err.kind, TurnErrorKind::NotFound);

        let err = rt.handle_turn(answer("ghost", "hi")).await.unwrap_err();
        assert_eq!(err.kind, TurnErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_failed_turn_keeps_last_good_state() {
        let config = EngineConfig {
            script_failure: ScriptFailurePolicy::Retry,
            ..EngineConfig::default()
        };
        let rt = runtime(config);
        let flow: FlowDefinition = serde_json::from_value(json!({
            "containers": [{"id": "A", "nodes": [
                {"id": "ask", "type": "input-text", "config": {"prompt": "Code?", "saveVariable": "code"}},
                {"id": "boom", "type": "script", "config": {"code": "throw 'nope'", "executeOnServer": true}}
            ]}]
        }))
        .unwrap();
        rt.publish_flow(Some("f".into()), flow).await.unwrap();
        let first = rt.handle_turn(start("f")).await.unwrap();

        let err = rt.handle_turn(answer(&first.session_id, "42")).await.unwrap_err();
        assert_eq!(err.kind, TurnErrorKind::Script);
        assert_eq!(err.waiting_for, Some(WaitingFor::Text));

        let stored = rt.get_session(&first.session_id).await.unwrap();
        assert_eq!(stored.revision, 0);
        assert_eq!(stored.variables.get("code"), None);
    }

    #[tokio::test]
    async fn test_storage_failure_reports_last_waiting_for() {
        let rt = runtime(EngineConfig::default());
        rt.publish_flow(Some("greet".into()), name_flow()).await.unwrap();
        let first = rt.handle_turn(start("greet")).await.unwrap();

        rt.storage().fail_saves(true);
        let err = rt.handle_turn(answer(&first.session_id, "Ada")).await.unwrap_err();
        assert_eq!(err.kind, TurnErrorKind::Storage);
        assert_eq!(err.waiting_for, Some(WaitingFor::Text));
    }

    #[test]
    fn test_storage_error_kinds() {
        let conflict = TurnError::from(StorageError::RevisionConflict {
            session_id: "s".into(),
            expected: 3,
        });
        assert_eq!(conflict.kind, TurnErrorKind::Conflict);
        let missing = TurnError::from(StorageError::SessionNotFound("s".into()));
        assert_eq!(missing.kind, TurnErrorKind::NotFound);
    }
}
