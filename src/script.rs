//! Script sandbox
//!
//! Operator-authored code runs in a small embedded interpreter with no access
//! to the host. The only ways out are variable mutations and a redirect, both
//! returned in [`ScriptOutcome`] and applied by the engine.

mod interpreter;
mod lexer;
mod parser;

pub use parser::{parse, Program};

use crate::variables::VariableStore;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Syntax error on line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Uncaught exception: {0}")]
    Thrown(String),
    #[error("Script exceeded its {0:?} time budget")]
    Timeout(Duration),
    #[error("Script exceeded its step budget")]
    StepLimit,
    #[error("Script wrote more than {0} variables")]
    TooManyVariables(usize),
    #[error("Script variables exceed {0} bytes")]
    VariableBytes(usize),
    #[error("{0} is not available in server scripts")]
    UnavailableGlobal(String),
}

impl ScriptError {
    pub(crate) fn parse(line: usize, message: impl Into<String>) -> Self {
        ScriptError::Parse {
            line,
            message: message.into(),
        }
    }
}

/// Which global surface a script sees
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptMode {
    /// Browser-like globals (`location`, `navigator`, `document`) backed by [`ClientContext`]
    Client,
    Server,
}

impl ScriptMode {
    pub fn for_node(execute_on_server: bool) -> Self {
        if execute_on_server {
            ScriptMode::Server
        } else {
            ScriptMode::Client
        }
    }
}

/// What the transport knows about the end user's page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientContext {
    pub url: String,
    pub user_agent: String,
    pub language: String,
    pub referrer: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScriptLimits {
    pub timeout: Duration,
    pub max_steps: u64,
    /// Distinct variables one run may write
    pub max_variables: usize,
    /// Names plus latest values of everything one run has written
    pub max_variable_bytes: usize,
}

impl Default for ScriptLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(250),
            max_steps: 100_000,
            max_variables: 256,
            max_variable_bytes: 2 << 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mutation {
    pub name: String,
    pub value: String,
}

/// Result of a successful run. Mutations hold one entry per variable: the
/// last value written, in order of first write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptOutcome {
    pub redirect_url: Option<String>,
    pub mutations: Vec<Mutation>,
    /// `return` value, or the value of the last expression statement
    pub result: Option<String>,
}

/// Seam between the engine and whatever executes scripts
pub trait ScriptSandbox: Send + Sync {
    fn run(
        &self,
        code: &str,
        store: &VariableStore,
        mode: ScriptMode,
        client: &ClientContext,
    ) -> Result<ScriptOutcome, ScriptError>;
}

/// In-process interpreter with step and wall-clock budgets
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSandbox {
    limits: ScriptLimits,
}

impl EmbeddedSandbox {
    pub fn new(limits: ScriptLimits) -> Self {
        Self { limits }
    }
}

impl ScriptSandbox for EmbeddedSandbox {
    fn run(
        &self,
        code: &str,
        store: &VariableStore,
        mode: ScriptMode,
        client: &ClientContext,
    ) -> Result<ScriptOutcome, ScriptError> {
        let program = parse(code)?;
        interpreter::execute(&program, store, mode, client, self.limits)
    }
}
