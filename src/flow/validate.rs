//! Publish-time checks
//!
//! Errors block publishing. Warnings are reported back to the author but the
//! definition is still stored, since the engine degrades gracefully on them.

use super::graph::{FlowGraph, Handle};
use super::types::{ComparisonOperator, FlowDefinition, Node, NodeKind, ValueType};
use crate::script;
use regex::RegexBuilder;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub severity: Severity,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn is_publishable(&self) -> bool {
        self.errors().next().is_none()
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Error)
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|i| i.severity == Severity::Warning)
    }

    fn push(
        &mut self,
        severity: Severity,
        message: String,
        container_id: Option<&str>,
        node_id: Option<&str>,
    ) {
        self.issues.push(ValidationIssue {
            severity,
            message,
            container_id: container_id.map(String::from),
            node_id: node_id.map(String::from),
        });
    }

    fn error(&mut self, message: String, container_id: Option<&str>, node_id: Option<&str>) {
        self.push(Severity::Error, message, container_id, node_id);
    }

    fn warning(&mut self, message: String, container_id: &str, node_id: &str) {
        self.push(Severity::Warning, message, Some(container_id), Some(node_id));
    }
}

/// Check a definition before it becomes a published version
pub fn validate(definition: &FlowDefinition) -> ValidationReport {
    let mut report = ValidationReport::default();

    let mut container_ids = HashSet::new();
    let mut node_ids = HashSet::new();
    // Every handle a container's nodes expose, in wire form
    let mut handles: HashMap<&str, HashSet<String>> = HashMap::new();

    for container in &definition.containers {
        if !container_ids.insert(container.id.as_str()) {
            report.error(
                format!("Duplicate container id '{}'", container.id),
                Some(&container.id),
                None,
            );
        }
        let exits = handles.entry(container.id.as_str()).or_default();
        for node in &container.nodes {
            if !node_ids.insert(node.id.as_str()) {
                report.error(
                    format!("Duplicate node id '{}'", node.id),
                    Some(&container.id),
                    Some(&node.id),
                );
            }
            exits.extend(node_handles(node).iter().map(ToString::to_string));
            check_node(&mut report, &container.id, node);
        }
    }

    let mut seen_exits = HashSet::new();
    for edge in &definition.edges {
        for end in [&edge.source, &edge.target] {
            if !container_ids.contains(end.as_str()) {
                report.error(
                    format!("Edge references unknown container '{end}'"),
                    Some(&edge.source),
                    None,
                );
            }
        }
        if let Some(handle) = &edge.source_handle {
            let known = handles
                .get(edge.source.as_str())
                .is_some_and(|exits| exits.contains(handle));
            if !known {
                report.error(
                    format!(
                        "Handle '{handle}' does not name a button or condition exit in container '{}'",
                        edge.source
                    ),
                    Some(&edge.source),
                    None,
                );
            }
        }
        if !seen_exits.insert((edge.source.as_str(), edge.source_handle.as_deref())) {
            let exit = edge.source_handle.as_deref().unwrap_or("fall-through");
            report.error(
                format!(
                    "More than one edge leaves container '{}' via {exit}",
                    edge.source
                ),
                Some(&edge.source),
                None,
            );
        }
    }

    match &definition.start_container_id {
        Some(start) if !container_ids.contains(start.as_str()) => {
            report.error(format!("Unknown start container '{start}'"), Some(start), None);
        }
        Some(_) => {}
        None => {
            if FlowGraph::new(definition.clone()).start_container().is_err() {
                report.error(
                    "No start container: every container has an incoming edge".to_string(),
                    None,
                    None,
                );
            }
        }
    }

    report
}

fn node_handles(node: &Node) -> Vec<Handle> {
    match &node.kind {
        NodeKind::InputButtons(config) => config
            .buttons
            .iter()
            .map(|b| Handle::button(&node.id, &b.id))
            .chain(std::iter::once(Handle::default_for(&node.id)))
            .collect(),
        NodeKind::Condition(config) => config
            .groups
            .iter()
            .map(|g| Handle::condition(&node.id, &g.id))
            .chain(std::iter::once(Handle::else_for(&node.id)))
            .collect(),
        _ => Vec::new(),
    }
}

fn check_node(report: &mut ValidationReport, container_id: &str, node: &Node) {
    match &node.kind {
        NodeKind::SetVariable(config) => {
            if config.variable_name.trim().is_empty() {
                report.error(
                    "set-variable node has no variable name".to_string(),
                    Some(container_id),
                    Some(&node.id),
                );
            }
            if config.execute_on_client && config.value_type == ValueType::Custom {
                if let Err(e) = script::parse(&config.value) {
                    report.warning(format!("Value script does not parse: {e}"), container_id, &node.id);
                }
            }
        }
        NodeKind::Script(config) => {
            if let Err(e) = script::parse(&config.code) {
                report.warning(format!("Script does not parse: {e}"), container_id, &node.id);
            }
        }
        NodeKind::Condition(config) => {
            for comparison in config.groups.iter().flat_map(|g| &g.comparisons) {
                if comparison.operator.takes_value() && comparison.value.is_none() {
                    report.warning(
                        format!(
                            "Comparison '{}' on '{}' has no value to compare against",
                            comparison.id, comparison.variable_name
                        ),
                        container_id,
                        &node.id,
                    );
                }
            }
            let patterns = config
                .groups
                .iter()
                .flat_map(|g| &g.comparisons)
                .filter(|c| {
                    matches!(
                        c.operator,
                        ComparisonOperator::MatchesRegex
                            | ComparisonOperator::NotMatchesRegex
                    )
                })
                .filter_map(|c| c.value.as_deref())
                // Patterns built from variables can only be checked at runtime
                .filter(|pattern| !pattern.contains("{{"));
            for pattern in patterns {
                if let Err(e) = RegexBuilder::new(pattern).build() {
                    report.warning(
                        format!("Pattern '{pattern}' does not compile and will never match: {e}"),
                        container_id,
                        &node.id,
                    );
                }
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(json: serde_json::Value) -> FlowDefinition {
        serde_json::from_value(json).unwrap()
    }

    fn buttons_flow() -> serde_json::Value {
        serde_json::json!({
            "containers": [
                {"id": "A", "nodes": [
                    {"id": "n1", "type": "bubble-text", "config": {"content": "Hi"}},
                    {"id": "n2", "type": "input-buttons", "config": {"buttons": [
                        {"id": "b1", "label": "Yes"},
                        {"id": "b2", "label": "No"}
                    ]}}
                ]},
                {"id": "B", "nodes": []},
                {"id": "C", "nodes": []}
            ],
            "edges": [
                {"source": "A", "sourceHandle": "n2-btn-b1", "target": "B"},
                {"source": "A", "sourceHandle": "n2-btn-b2", "target": "C"}
            ]
        })
    }

    #[test]
    fn test_valid_flow_has_no_issues() {
        let report = validate(&definition(buttons_flow()));
        assert!(report.is_publishable());
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn test_duplicate_edge_is_rejected() {
        let mut json = buttons_flow();
        json["edges"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::json!({"source": "A", "sourceHandle": "n2-btn-b1", "target": "C"}));
        let report = validate(&definition(json));
        assert!(!report.is_publishable());
        assert!(report.errors().any(|e| e.message.contains("More than one edge")));
    }

    #[test]
    fn test_unknown_handle_and_target_are_rejected() {
        let mut json = buttons_flow();
        json["edges"] = serde_json::json!([
            {"source": "A", "sourceHandle": "n2-btn-zzz", "target": "B"},
            {"source": "A", "target": "nowhere"}
        ]);
        let report = validate(&definition(json));
        let messages: Vec<_> = report.errors().map(|e| e.message.as_str()).collect();
        assert!(messages.iter().any(|m| m.contains("n2-btn-zzz")));
        assert!(messages.iter().any(|m| m.contains("nowhere")));
    }

    #[test]
    fn test_duplicate_ids_are_rejected() {
        let json = serde_json::json!({
            "containers": [
                {"id": "A", "nodes": [{"id": "n1", "type": "bubble-text", "config": {"content": "x"}}]},
                {"id": "A", "nodes": [{"id": "n1", "type": "bubble-text", "config": {"content": "y"}}]}
            ]
        });
        let report = validate(&definition(json));
        assert_eq!(report.errors().count(), 2);
    }

    #[test]
    fn test_cyclic_flow_without_start_is_rejected_unless_designated() {
        let mut json = serde_json::json!({
            "containers": [{"id": "A", "nodes": []}, {"id": "B", "nodes": []}],
            "edges": [{"source": "A", "target": "B"}, {"source": "B", "target": "A"}]
        });
        assert!(!validate(&definition(json.clone())).is_publishable());
        json["startContainerId"] = serde_json::json!("B");
        assert!(validate(&definition(json.clone())).is_publishable());
        json["startContainerId"] = serde_json::json!("Z");
        assert!(!validate(&definition(json)).is_publishable());
    }

    #[test]
    fn test_script_and_regex_problems_are_warnings() {
        let json = serde_json::json!({
            "containers": [{"id": "A", "nodes": [
                {"id": "s", "type": "script", "config": {"code": "setVariable('x',"}},
                {"id": "c", "type": "condition", "config": {"groups": [
                    {"id": "g", "comparisons": [
                        {"id": "k1", "variableName": "x", "operator": "matches_regex", "value": "("},
                        {"id": "k2", "variableName": "x", "operator": "matches_regex", "value": "{{pattern}}"}
                    ]}
                ]}}
            ]}]
        });
        let report = validate(&definition(json));
        assert!(report.is_publishable());
        assert_eq!(report.warnings().count(), 2);
    }

    #[test]
    fn test_comparison_without_value_is_a_warning() {
        let json = serde_json::json!({
            "containers": [{"id": "A", "nodes": [
                {"id": "c", "type": "condition", "config": {"groups": [
                    {"id": "g", "comparisons": [
                        {"id": "k1", "variableName": "age", "operator": "greater_than"},
                        {"id": "k2", "variableName": "age", "operator": "is_set"}
                    ]}
                ]}}
            ]}]
        });
        let report = validate(&definition(json));
        let warnings: Vec<_> = report.warnings().map(|w| w.message.as_str()).collect();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("'k1'"));
    }

    #[test]
    fn test_set_variable_without_name_is_rejected() {
        let json = serde_json::json!({
            "containers": [{"id": "A", "nodes": [
                {"id": "v", "type": "set-variable", "config": {"variableName": " ", "valueType": "now"}}
            ]}]
        });
        assert!(!validate(&definition(json)).is_publishable());
    }
}
