//! Flow graph model
//!
//! The published definition (`types`), its read-only runtime accessor
//! (`graph`) and the checks a definition must pass before it is published
//! (`validate`).

mod graph;
pub mod types;
mod validate;

pub use graph::{FlowGraph, GraphIntegrityError, Handle};
pub use types::{
    Bubble, ButtonConfig, ComparisonOperator, ConditionComparison, ConditionGroup, Container,
    Edge, FlowDefinition, InputConfig, InputKind, LogicalOperator, MediaKind, Node, NodeKind,
    SetVariableConfig, Validation, ValueType,
};
pub use validate::{validate, Severity, ValidationIssue, ValidationReport};
