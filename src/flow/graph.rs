//! Read-only accessor over a flow definition
//!
//! Resolves containers, nodes and edges for the engine. Unknown references
//! are reported as `GraphIntegrityError`; nothing here guesses a fallback.

use super::types::{Container, FlowDefinition, Node};
use std::collections::{HashMap, HashSet};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphIntegrityError {
    #[error("Unknown container: {0}")]
    UnknownContainer(String),
    #[error("Ambiguous edge: {count} edges leave container {container} via {exit}")]
    AmbiguousEdge {
        container: String,
        exit: String,
        count: usize,
    },
    #[error("Flow has no start container")]
    NoStartContainer,
    #[error("Session cursor {container}[{index}] does not point at the pending input")]
    CursorMismatch { container: String, index: usize },
    #[error("Traversal exceeded {limit} hops without reaching a suspension point")]
    TraversalLimit { limit: usize },
}

/// A named exit on a node inside a container
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Handle {
    Button { node_id: String, button_id: String },
    Default { node_id: String },
    Condition { node_id: String, group_id: String },
    Else { node_id: String },
}

impl Handle {
    pub fn button(node_id: &str, button_id: &str) -> Self {
        Handle::Button {
            node_id: node_id.to_string(),
            button_id: button_id.to_string(),
        }
    }

    pub fn default_for(node_id: &str) -> Self {
        Handle::Default {
            node_id: node_id.to_string(),
        }
    }

    pub fn condition(node_id: &str, group_id: &str) -> Self {
        Handle::Condition {
            node_id: node_id.to_string(),
            group_id: group_id.to_string(),
        }
    }

    pub fn else_for(node_id: &str) -> Self {
        Handle::Else {
            node_id: node_id.to_string(),
        }
    }
}

/// Serialized form used in `Edge::source_handle`
impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handle::Button { node_id, button_id } => write!(f, "{node_id}-btn-{button_id}"),
            Handle::Default { node_id } => write!(f, "{node_id}-default"),
            Handle::Condition { node_id, group_id } => write!(f, "{node_id}-cond-{group_id}"),
            Handle::Else { node_id } => write!(f, "{node_id}-else"),
        }
    }
}

/// Indexed, immutable view of one flow version
#[derive(Debug, Clone)]
pub struct FlowGraph {
    definition: FlowDefinition,
    containers: HashMap<String, usize>,
    /// (source container, handle or None for fall-through) -> targets in edge order
    exits: HashMap<(String, Option<String>), Vec<String>>,
}

impl FlowGraph {
    pub fn new(definition: FlowDefinition) -> Self {
        let mut containers = HashMap::new();
        for (idx, container) in definition.containers.iter().enumerate() {
            // First occurrence wins; duplicates are rejected at publish time
            containers.entry(container.id.clone()).or_insert(idx);
        }

        let mut exits: HashMap<(String, Option<String>), Vec<String>> = HashMap::new();
        for edge in &definition.edges {
            exits
                .entry((edge.source.clone(), edge.source_handle.clone()))
                .or_default()
                .push(edge.target.clone());
        }

        Self {
            definition,
            containers,
            exits,
        }
    }

    pub fn container(&self, id: &str) -> Result<&Container, GraphIntegrityError> {
        self.containers
            .get(id)
            .map(|&idx| &self.definition.containers[idx])
            .ok_or_else(|| GraphIntegrityError::UnknownContainer(id.to_string()))
    }

    /// Node at `(container, index)`; `Ok(None)` once the cursor is past the last node
    pub fn node_at(
        &self,
        container_id: &str,
        index: usize,
    ) -> Result<Option<&Node>, GraphIntegrityError> {
        Ok(self.container(container_id)?.nodes.get(index))
    }

    /// Where execution begins for a new session
    pub fn start_container(&self) -> Result<&Container, GraphIntegrityError> {
        if let Some(id) = &self.definition.start_container_id {
            return self.container(id);
        }

        let targeted: HashSet<&str> = self
            .definition
            .edges
            .iter()
            .map(|e| e.target.as_str())
            .collect();

        self.definition
            .containers
            .iter()
            .find(|c| !targeted.contains(c.id.as_str()))
            .ok_or(GraphIntegrityError::NoStartContainer)
    }

    /// Target of the edge leaving `handle`, if one exists
    pub fn handle_target(
        &self,
        container_id: &str,
        handle: &Handle,
    ) -> Result<Option<&Container>, GraphIntegrityError> {
        self.resolve_exit(container_id, Some(handle.to_string()))
    }

    /// Target of the container's fall-through edge, if one exists
    pub fn fallthrough_target(
        &self,
        container_id: &str,
    ) -> Result<Option<&Container>, GraphIntegrityError> {
        self.resolve_exit(container_id, None)
    }

    fn resolve_exit(
        &self,
        container_id: &str,
        handle: Option<String>,
    ) -> Result<Option<&Container>, GraphIntegrityError> {
        let key = (container_id.to_string(), handle);
        match self.exits.get(&key).map(Vec::as_slice) {
            None | Some([]) => Ok(None),
            Some([target]) => self.container(target).map(Some),
            Some(targets) => Err(GraphIntegrityError::AmbiguousEdge {
                container: key.0,
                exit: key.1.unwrap_or_else(|| "fall-through".to_string()),
                count: targets.len(),
            }),
        }
    }
}
