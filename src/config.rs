//! Environment-driven configuration

use crate::script::ScriptLimits;
use std::str::FromStr;
use std::time::Duration;

/// What the engine does when a script node fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScriptFailurePolicy {
    /// Log the failure, discard the script's mutations and advance past the node
    #[default]
    Skip,
    /// Fail the turn; the next inbound event re-runs the script
    Retry,
}

impl FromStr for ScriptFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "skip" => Ok(ScriptFailurePolicy::Skip),
            "retry" => Ok(ScriptFailurePolicy::Retry),
            other => Err(format!("unknown script failure policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Edge traversals allowed in one turn without reaching a suspension point
    pub max_hops: usize,
    pub script_failure: ScriptFailurePolicy,
    pub script_limits: ScriptLimits,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_hops: 64,
            script_failure: ScriptFailurePolicy::default(),
            script_limits: ScriptLimits::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            max_hops: parse_or(&lookup, "CHATFLOW_MAX_HOPS", defaults.max_hops),
            script_failure: parse_or(&lookup, "CHATFLOW_SCRIPT_FAILURE", defaults.script_failure),
            script_limits: ScriptLimits {
                timeout: Duration::from_millis(parse_or(
                    &lookup,
                    "CHATFLOW_SCRIPT_TIMEOUT_MS",
                    250,
                )),
                max_steps: parse_or(
                    &lookup,
                    "CHATFLOW_SCRIPT_MAX_STEPS",
                    defaults.script_limits.max_steps,
                ),
                max_variables: parse_or(
                    &lookup,
                    "CHATFLOW_SCRIPT_MAX_VARIABLES",
                    defaults.script_limits.max_variables,
                ),
                max_variable_bytes: parse_or(
                    &lookup,
                    "CHATFLOW_SCRIPT_MAX_VARIABLE_BYTES",
                    defaults.script_limits.max_variable_bytes,
                ),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub db_path: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("CHATFLOW_DB_PATH").unwrap_or_else(|| {
            let home = lookup("HOME").unwrap_or_else(|| "/tmp".to_string());
            format!("{home}/.chatflow/chatflow.db")
        });
        Self {
            db_path,
            port: parse_or(&lookup, "CHATFLOW_PORT", 8000),
        }
    }
}

/// Parse `key` if set; unparseable values fall back to `default` with a warning
fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Debug,
    T::Err: std::fmt::Display,
{
    let Some(raw) = lookup(key) else {
        return default;
    };
    match raw.trim().parse() {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!(key, value = %raw, error = %e, ?default, "Invalid configuration value, using default");
            default
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_engine_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.max_hops, 64);
        assert_eq!(config.script_failure, ScriptFailurePolicy::Skip);
        assert_eq!(config.script_limits.timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_engine_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CHATFLOW_MAX_HOPS", "8"),
            ("CHATFLOW_SCRIPT_FAILURE", "Retry"),
            ("CHATFLOW_SCRIPT_TIMEOUT_MS", "50"),
            ("CHATFLOW_SCRIPT_MAX_STEPS", "1000"),
            ("CHATFLOW_SCRIPT_MAX_VARIABLES", "16"),
        ]));
        assert_eq!(config.max_hops, 8);
        assert_eq!(config.script_failure, ScriptFailurePolicy::Retry);
        assert_eq!(config.script_limits.timeout, Duration::from_millis(50));
        assert_eq!(config.script_limits.max_steps, 1000);
        assert_eq!(config.script_limits.max_variables, 16);
        assert_eq!(
            config.script_limits.max_variable_bytes,
            ScriptLimits::default().max_variable_bytes
        );
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("CHATFLOW_MAX_HOPS", "lots"),
            ("CHATFLOW_SCRIPT_FAILURE", "ignore"),
        ]));
        assert_eq!(config.max_hops, 64);
        assert_eq!(config.script_failure, ScriptFailurePolicy::Skip);
    }

    #[test]
    fn test_server_config() {
        let config = ServerConfig::from_lookup(lookup(&[("HOME", "/home/ada")]));
        assert_eq!(config.db_path, "/home/ada/.chatflow/chatflow.db");
        assert_eq!(config.port, 8000);

        let config = ServerConfig::from_lookup(lookup(&[
            ("CHATFLOW_DB_PATH", "/var/lib/chatflow.db"),
            ("CHATFLOW_PORT", "9090"),
        ]));
        assert_eq!(config.db_path, "/var/lib/chatflow.db");
        assert_eq!(config.port, 9090);
    }
}
