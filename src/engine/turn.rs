//! Run-to-suspension turn function
//!
//! `run_turn` is pure over its inputs: it works on a copy of the session and
//! returns the new state only when the whole turn succeeds, so a failed turn
//! leaves nothing to persist.

use super::clock::{Clock, RandomIds};
use super::input;
use super::message::{ButtonOption, InboundPayload, OutboundMessage, TurnOutput};
use super::state::{LogEntry, SessionState, SessionStatus, WaitingFor};
use crate::condition::{self, ConditionMatch};
use crate::config::{EngineConfig, ScriptFailurePolicy};
use crate::flow::{
    Bubble, ButtonConfig, FlowGraph, GraphIntegrityError, Handle, InputConfig, InputKind, Node,
    NodeKind, SetVariableConfig, ValueType,
};
use crate::script::{ClientContext, ScriptError, ScriptMode, ScriptOutcome, ScriptSandbox};
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Graph(#[from] GraphIntegrityError),
    /// Only raised under [`ScriptFailurePolicy::Retry`]
    #[error("Script node {node_id} failed: {source}")]
    Script {
        node_id: String,
        #[source]
        source: ScriptError,
    },
}

/// Collaborators a turn consults
pub struct TurnContext<'a> {
    pub clock: &'a dyn Clock,
    pub random: &'a mut RandomIds,
    pub sandbox: &'a dyn ScriptSandbox,
    pub config: &'a EngineConfig,
    pub client: &'a ClientContext,
}

#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub state: SessionState,
    pub output: TurnOutput,
}

/// Fresh session positioned on the first node of the flow's start container
pub fn new_session(
    graph: &FlowGraph,
    session_id: &str,
    flow_id: &str,
    flow_version: i64,
    now: DateTime<Utc>,
) -> Result<SessionState, EngineError> {
    let start = graph.start_container()?;
    Ok(SessionState::new(
        session_id,
        flow_id,
        flow_version,
        &start.id,
        now,
    ))
}

/// Advance `state` by one inbound event (or none, for a conversation start or
/// reconnect) until the next suspension point.
pub fn run_turn(
    graph: &FlowGraph,
    state: &SessionState,
    inbound: Option<&InboundPayload>,
    ctx: &mut TurnContext<'_>,
) -> Result<TurnOutcome, EngineError> {
    let now = ctx.clock.now();
    let inbound = inbound.filter(|p| !p.is_empty());
    let mut turn = Turn {
        graph,
        state: state.clone(),
        ctx,
        output: TurnOutput::default(),
        hops: 0,
        now,
    };

    if turn.state.is_ended() {
        tracing::debug!(session_id = %state.session_id, "Inbound event on ended conversation");
        return Ok(turn.finish());
    }

    if let Some(payload) = inbound {
        turn.state.message_log.push(LogEntry::Inbound {
            payload: payload.clone(),
            at: now,
        });
    }

    if turn.state.status == SessionStatus::Yielded {
        // Control comes back after a redirect: continue past the script node
        turn.state.status = SessionStatus::Active;
        turn.state.current_node_index += 1;
    } else if turn.state.waiting_for.is_some() {
        match inbound {
            None => {
                turn.reemit_pending()?;
                return Ok(turn.finish());
            }
            Some(payload) => {
                if !turn.consume_answer(payload)? {
                    return Ok(turn.finish());
                }
            }
        }
    }

    turn.run_to_suspension()?;
    Ok(turn.finish())
}

struct Turn<'g, 'c, 'a> {
    graph: &'g FlowGraph,
    state: SessionState,
    ctx: &'c mut TurnContext<'a>,
    output: TurnOutput,
    hops: usize,
    now: DateTime<Utc>,
}

impl Turn<'_, '_, '_> {
    fn finish(mut self) -> TurnOutcome {
        self.state.updated_at = self.now;
        self.output.waiting_for = self.state.waiting_for;
        self.output.status = self.state.status;
        TurnOutcome {
            state: self.state,
            output: self.output,
        }
    }

    fn cursor_mismatch(&self) -> GraphIntegrityError {
        GraphIntegrityError::CursorMismatch {
            container: self.state.current_container_id.clone(),
            index: self.state.current_node_index,
        }
    }

    // ------------------------------------------------------------------
    // Output
    // ------------------------------------------------------------------

    fn emit(&mut self, message: OutboundMessage) {
        self.state.message_log.push(LogEntry::Outbound {
            message: message.clone(),
            at: self.now,
        });
        self.output.messages.push(message);
    }

    fn emit_text(&mut self, template: &str) {
        let text = self.state.variables.interpolate(template);
        self.emit(OutboundMessage::text(text));
    }

    fn emit_prompt(&mut self, config: &InputConfig) {
        if let Some(prompt) = &config.prompt {
            self.emit_text(prompt);
        }
    }

    fn emit_buttons(&mut self, buttons: &[ButtonConfig]) {
        self.output.buttons = buttons
            .iter()
            .map(|b| ButtonOption {
                id: b.id.clone(),
                label: self.state.variables.interpolate(&b.label),
            })
            .collect();
    }

    /// Same prompt or buttons as the turn that suspended
    fn reemit_pending(&mut self) -> Result<(), GraphIntegrityError> {
        let graph = self.graph;
        let node = graph
            .node_at(&self.state.current_container_id, self.state.current_node_index)?
            .ok_or_else(|| self.cursor_mismatch())?;
        match &node.kind {
            NodeKind::InputButtons(config) => self.emit_buttons(&config.buttons),
            kind => match kind.as_input() {
                Some((_, config)) => self.emit_prompt(config),
                None => return Err(self.cursor_mismatch()),
            },
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Answers
    // ------------------------------------------------------------------

    /// Apply the answer to the pending input. `false` means it was rejected
    /// and the prompt has been re-emitted.
    fn consume_answer(&mut self, payload: &InboundPayload) -> Result<bool, EngineError> {
        let graph = self.graph;
        let node = graph
            .node_at(&self.state.current_container_id, self.state.current_node_index)?
            .ok_or_else(|| self.cursor_mismatch())?;

        if let NodeKind::InputButtons(config) = &node.kind {
            self.state.waiting_for = None;
            let handle = match choose_button(&config.buttons, payload) {
                Some(button) => {
                    if let Some(var) = &button.save_variable {
                        let label = self.state.variables.interpolate(&button.label);
                        self.state.variables.set(var.clone(), label);
                    }
                    tracing::debug!(node_id = %node.id, button_id = %button.id, "Button chosen");
                    // A button without its own edge behaves like the default exit
                    let own = Handle::button(&node.id, &button.id);
                    if graph
                        .handle_target(&self.state.current_container_id, &own)?
                        .is_some()
                    {
                        own
                    } else {
                        Handle::default_for(&node.id)
                    }
                }
                None => {
                    tracing::debug!(node_id = %node.id, "Unrecognized choice, taking default exit");
                    Handle::default_for(&node.id)
                }
            };
            self.follow_exit(&handle)?;
            return Ok(true);
        }

        let Some((kind, config)) = node.kind.as_input() else {
            return Err(self.cursor_mismatch().into());
        };
        let answer = payload.text.as_deref().unwrap_or_default().trim();
        let validation = config.validation.or(kind.default_validation());

        if !input::is_valid(validation, answer) {
            tracing::warn!(
                session_id = %self.state.session_id,
                node_id = %node.id,
                input = %kind,
                "Answer failed validation, re-prompting"
            );
            if let Some(retry) = &config.retry_message {
                self.emit_text(retry);
            }
            self.emit_prompt(config);
            return Ok(false);
        }

        if let Some(var) = &config.save_variable {
            self.state.variables.set(var.clone(), answer);
        }
        self.state.waiting_for = None;
        self.state.current_node_index += 1;
        Ok(true)
    }

    // ------------------------------------------------------------------
    // Traversal
    // ------------------------------------------------------------------

    /// Move to the start of `container_id`, counting the hop
    fn jump(&mut self, container_id: &str) -> Result<(), GraphIntegrityError> {
        self.hops += 1;
        if self.hops > self.ctx.config.max_hops {
            return Err(GraphIntegrityError::TraversalLimit {
                limit: self.ctx.config.max_hops,
            });
        }
        tracing::debug!(
            from = %self.state.current_container_id,
            to = %container_id,
            hops = self.hops,
            "Following edge"
        );
        self.state.current_container_id = container_id.to_string();
        self.state.current_node_index = 0;
        Ok(())
    }

    /// Follow a node exit. With no edge on it, carry on with the next node;
    /// a handle-bearing node that closes its container ends the conversation
    /// instead of taking the container's fall-through edge.
    fn follow_exit(&mut self, handle: &Handle) -> Result<(), GraphIntegrityError> {
        let graph = self.graph;
        if let Some(target) = graph.handle_target(&self.state.current_container_id, handle)? {
            return self.jump(&target.id);
        }
        self.state.current_node_index += 1;
        if graph
            .node_at(&self.state.current_container_id, self.state.current_node_index)?
            .is_none()
        {
            tracing::debug!(handle = %handle, "Unconnected exit on last node");
            self.end_conversation();
        }
        Ok(())
    }

    fn end_conversation(&mut self) {
        tracing::info!(
            session_id = %self.state.session_id,
            container_id = %self.state.current_container_id,
            "Conversation ended"
        );
        self.state.status = SessionStatus::Ended;
        self.state.waiting_for = None;
    }

    fn yield_for_redirect(&mut self, node: &Node, url: String) {
        tracing::info!(
            session_id = %self.state.session_id,
            node_id = %node.id,
            url = %url,
            "Script redirected, yielding to transport"
        );
        self.state.message_log.push(LogEntry::Redirect {
            url: url.clone(),
            at: self.now,
        });
        self.output.side_effects.redirect_url = Some(url);
        self.state.status = SessionStatus::Yielded;
    }

    fn run_to_suspension(&mut self) -> Result<(), EngineError> {
        let graph = self.graph;
        loop {
            if self.state.is_ended() {
                return Ok(());
            }
            let Some(node) = graph
                .node_at(&self.state.current_container_id, self.state.current_node_index)?
            else {
                match graph.fallthrough_target(&self.state.current_container_id)? {
                    Some(next) => self.jump(&next.id)?,
                    None => self.end_conversation(),
                }
                continue;
            };

            tracing::debug!(
                session_id = %self.state.session_id,
                container_id = %self.state.current_container_id,
                node_id = %node.id,
                node_type = node.kind.type_name(),
                "Executing node"
            );

            match &node.kind {
                NodeKind::InputButtons(config) => {
                    self.emit_buttons(&config.buttons);
                    self.state.waiting_for = Some(WaitingFor::Buttons);
                    return Ok(());
                }
                NodeKind::Condition(config) => {
                    let handle = match condition::evaluate(&config.groups, &self.state.variables) {
                        ConditionMatch::Group(group_id) => Handle::condition(&node.id, group_id),
                        ConditionMatch::None => Handle::else_for(&node.id),
                    };
                    self.follow_exit(&handle)?;
                }
                NodeKind::SetVariable(config) => {
                    if let Some(url) = self.set_variable(node, config)? {
                        self.yield_for_redirect(node, url);
                        return Ok(());
                    }
                    self.state.current_node_index += 1;
                }
                NodeKind::Script(config) => {
                    let mode = ScriptMode::for_node(config.execute_on_server);
                    if let Some(outcome) = self.run_script(node, &config.code, mode)? {
                        self.apply_mutations(&outcome);
                        if let Some(url) = outcome.redirect_url {
                            self.yield_for_redirect(node, url);
                            return Ok(());
                        }
                    }
                    self.state.current_node_index += 1;
                }
                kind => {
                    if let Some(bubble) = kind.as_bubble() {
                        self.emit_bubble(bubble);
                        self.state.current_node_index += 1;
                    } else if let Some((input_kind, config)) = kind.as_input() {
                        self.suspend_on_input(input_kind, config);
                        return Ok(());
                    } else {
                        self.state.current_node_index += 1;
                    }
                }
            }
        }
    }

    fn suspend_on_input(&mut self, kind: InputKind, config: &InputConfig) {
        self.emit_prompt(config);
        self.state.waiting_for = Some(kind.into());
    }

    fn emit_bubble(&mut self, bubble: Bubble<'_>) {
        match bubble {
            Bubble::Text(text) => self.emit_text(&text.content),
            Bubble::Media(kind, media) => {
                let alt = self.state.variables.interpolate(&media.alt);
                self.emit(OutboundMessage::Media {
                    kind,
                    url: self.state.variables.interpolate(&media.url),
                    alt: (!alt.is_empty()).then_some(alt),
                });
            }
        }
    }

    // ------------------------------------------------------------------
    // Variables and scripts
    // ------------------------------------------------------------------

    /// Returns the redirect a client-side value script asked for
    fn set_variable(
        &mut self,
        node: &Node,
        config: &SetVariableConfig,
    ) -> Result<Option<String>, EngineError> {
        let today = self.now.date_naive();
        let mut redirect = None;
        let value = match config.value_type {
            ValueType::Empty => String::new(),
            ValueType::Now => self.now.to_rfc3339(),
            ValueType::Today => today.format("%Y-%m-%d").to_string(),
            ValueType::Yesterday => today.pred_opt().unwrap_or(today).format("%Y-%m-%d").to_string(),
            ValueType::Tomorrow => today.succ_opt().unwrap_or(today).format("%Y-%m-%d").to_string(),
            ValueType::Random => self.ctx.random.token(),
            ValueType::Custom if config.execute_on_client => {
                match self.run_script(node, &config.value, ScriptMode::Client)? {
                    Some(outcome) => {
                        self.apply_mutations(&outcome);
                        redirect = outcome.redirect_url;
                        outcome.result.unwrap_or_default()
                    }
                    // Skipped failure leaves the variable untouched
                    None => return Ok(None),
                }
            }
            ValueType::Custom => self.state.variables.interpolate(&config.value),
        };

        if config.save_in_results {
            self.state
                .results
                .insert(config.variable_name.clone(), value.clone());
        }
        self.state.variables.set(config.variable_name.clone(), value);
        Ok(redirect)
    }

    /// `Ok(None)` is a failure skipped by policy
    fn run_script(
        &mut self,
        node: &Node,
        code: &str,
        mode: ScriptMode,
    ) -> Result<Option<ScriptOutcome>, EngineError> {
        match self
            .ctx
            .sandbox
            .run(code, &self.state.variables, mode, self.ctx.client)
        {
            Ok(outcome) => Ok(Some(outcome)),
            Err(source) => match self.ctx.config.script_failure {
                ScriptFailurePolicy::Skip => {
                    tracing::warn!(
                        session_id = %self.state.session_id,
                        node_id = %node.id,
                        error = %source,
                        "Script failed, skipping node"
                    );
                    Ok(None)
                }
                ScriptFailurePolicy::Retry => Err(EngineError::Script {
                    node_id: node.id.clone(),
                    source,
                }),
            },
        }
    }

    fn apply_mutations(&mut self, outcome: &ScriptOutcome) {
        for mutation in &outcome.mutations {
            self.state
                .variables
                .set(mutation.name.clone(), mutation.value.clone());
        }
    }
}

/// By id first, then by label text for typed replies
fn choose_button<'b>(buttons: &'b [ButtonConfig], payload: &InboundPayload) -> Option<&'b ButtonConfig> {
    if let Some(id) = &payload.button_id {
        if let Some(button) = buttons.iter().find(|b| &b.id == id) {
            return Some(button);
        }
    }
    let text = payload.text.as_deref()?.trim();
    buttons
        .iter()
        .find(|b| b.label.trim().eq_ignore_ascii_case(text))
}
