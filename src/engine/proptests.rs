//! Property-based tests for the engine
//!
//! Flows are generated as a chain of containers whose exits only point
//! forward, so every walk terminates. Answers are drawn at random.

use super::*;
use crate::config::EngineConfig;
use crate::flow::FlowGraph;
use crate::script::{ClientContext, EmbeddedSandbox};
use chrono::{DateTime, Utc};
use proptest::prelude::*;
use serde_json::{json, Value};

// ============================================================================
// Arbitrary Generators
// ============================================================================

/// One node; `index` is the container position, `n` the node position.
/// `later` lists containers after this one that exits may target.
fn arb_node(index: usize, n: usize) -> impl Strategy<Value = Value> {
    let id = format!("c{index}n{n}");
    prop_oneof![
        "[a-z ]{1,12}".prop_map({
            let id = id.clone();
            move |content| json!({"id": id, "type": "bubble-text", "config": {"content": content}})
        }),
        Just(json!({"id": id.clone(), "type": "input-text",
            "config": {"prompt": "Name?", "saveVariable": "name"}})),
        Just(json!({"id": id.clone(), "type": "input-number",
            "config": {"prompt": "Age?", "saveVariable": "age"}})),
        Just(json!({"id": id.clone(), "type": "input-buttons", "config": {"buttons": [
            {"id": "b1", "label": "Left"}, {"id": "b2", "label": "Right"}
        ]}})),
        Just(json!({"id": id.clone(), "type": "set-variable",
            "config": {"variableName": "token", "valueType": "random"}})),
        Just(json!({"id": id.clone(), "type": "set-variable",
            "config": {"variableName": "stamp", "valueType": "now"}})),
        Just(json!({"id": id.clone(), "type": "script", "config": {
            "code": "setVariable('seen', (Number(getVariable('seen')) || 0) + 1)",
            "executeOnServer": true
        }})),
        Just(json!({"id": id, "type": "condition", "config": {"groups": [
            {"id": "g", "comparisons": [
                {"id": "k", "variableName": "age", "operator": "greater_than", "value": "30"}
            ]}
        ]}})),
    ]
}

fn arb_container(index: usize) -> impl Strategy<Value = Value> {
    (1usize..4)
        .prop_flat_map(move |len| {
            (0..len)
                .map(|n| arb_node(index, n))
                .collect::<Vec<_>>()
        })
        .prop_map(move |nodes| json!({"id": format!("c{index}"), "nodes": nodes}))
}

/// Edges for every exit of container `index`, each pointing at a later container
fn forward_edges(containers: &[Value], index: usize, picks: &[usize]) -> Vec<Value> {
    let total = containers.len();
    if index + 1 >= total {
        return Vec::new();
    }
    let mut pick = picks.iter().cycle();
    let mut target = || {
        let offset = pick.next().copied().unwrap_or(0) % (total - index - 1);
        format!("c{}", index + 1 + offset)
    };

    let source = format!("c{index}");
    let mut edges = vec![json!({"source": source, "target": target()})];
    for node in containers[index]["nodes"].as_array().into_iter().flatten() {
        let node_id = node["id"].as_str().unwrap_or_default();
        let handles: Vec<String> = match node["type"].as_str() {
            Some("input-buttons") => vec![
                format!("{node_id}-btn-b1"),
                format!("{node_id}-default"),
            ],
            Some("condition") => vec![format!("{node_id}-cond-g"), format!("{node_id}-else")],
            _ => Vec::new(),
        };
        for handle in handles {
            edges.push(json!({"source": source, "sourceHandle": handle, "target": target()}));
        }
    }
    edges
}

fn arb_flow() -> impl Strategy<Value = FlowGraph> {
    (1usize..5)
        .prop_flat_map(|count| {
            (
                (0..count).map(arb_container).collect::<Vec<_>>(),
                proptest::collection::vec(0usize..8, 16),
            )
        })
        .prop_map(|(containers, picks)| {
            let edges: Vec<Value> = (0..containers.len())
                .flat_map(|i| forward_edges(&containers, i, &picks))
                .collect();
            let definition = json!({
                "containers": containers,
                "edges": edges,
                "startContainerId": "c0"
            });
            FlowGraph::new(serde_json::from_value(definition).expect("generated flow"))
        })
}

fn arb_payload() -> impl Strategy<Value = Option<InboundPayload>> {
    prop_oneof![
        Just(None),
        "[a-z]{1,8}".prop_map(|t| Some(InboundPayload::text(t))),
        (0u32..80).prop_map(|n| Some(InboundPayload::text(n.to_string()))),
        Just(Some(InboundPayload::button("b1"))),
        Just(Some(InboundPayload::button("b2"))),
        Just(Some(InboundPayload::text("right"))),
    ]
}

// ============================================================================
// Helpers
// ============================================================================

fn fixed_now() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-01-15T12:00:00Z")
        .expect("timestamp")
        .with_timezone(&Utc)
}

/// Run a full conversation and return every intermediate state and output
fn replay(
    graph: &FlowGraph,
    payloads: &[Option<InboundPayload>],
) -> Vec<(SessionState, TurnOutput)> {
    let clock = FixedClock(fixed_now());
    let mut random = RandomIds::seeded(9);
    let sandbox = EmbeddedSandbox::default();
    let config = EngineConfig::default();
    let client = ClientContext::default();
    let mut ctx = TurnContext {
        clock: &clock,
        random: &mut random,
        sandbox: &sandbox,
        config: &config,
        client: &client,
    };

    let mut state = new_session(graph, "prop", "flow", 1, fixed_now()).expect("start container");
    let mut history = Vec::new();
    for payload in std::iter::once(&None).chain(payloads) {
        let outcome = run_turn(graph, &state, payload.as_ref(), &mut ctx).expect("turn succeeds");
        state = outcome.state.clone();
        history.push((outcome.state, outcome.output));
    }
    history
}

fn cursor_on_input(graph: &FlowGraph, state: &SessionState) -> bool {
    graph
        .node_at(&state.current_container_id, state.current_node_index)
        .ok()
        .flatten()
        .is_some_and(|node| node.kind.is_input())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    // Invariant 1: identical inputs give identical states and outputs
    #[test]
    fn prop_turns_are_deterministic(
        graph in arb_flow(),
        payloads in proptest::collection::vec(arb_payload(), 0..8),
    ) {
        prop_assert_eq!(replay(&graph, &payloads), replay(&graph, &payloads));
    }

    // Invariant 2: waitingFor is set exactly when the cursor rests on an unanswered input
    #[test]
    fn prop_waiting_iff_cursor_on_input(
        graph in arb_flow(),
        payloads in proptest::collection::vec(arb_payload(), 0..8),
    ) {
        for (state, output) in replay(&graph, &payloads) {
            prop_assert_eq!(output.waiting_for, state.waiting_for);
            prop_assert_eq!(
                state.waiting_for.is_some(),
                cursor_on_input(&graph, &state),
                "state: {:?}",
                state
            );
        }
    }

    // Invariant 3: once ended, a conversation stays ended and silent
    #[test]
    fn prop_ended_is_terminal(
        graph in arb_flow(),
        payloads in proptest::collection::vec(arb_payload(), 0..8),
    ) {
        let mut ended = false;
        for (state, output) in replay(&graph, &payloads) {
            if ended {
                prop_assert_eq!(state.status, SessionStatus::Ended);
                prop_assert!(output.messages.is_empty());
            }
            ended = state.is_ended();
        }
    }
}
