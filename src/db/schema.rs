//! Database schema and row types

use crate::flow::FlowDefinition;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// SQL schema for initialization
pub const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS flows (
    flow_id TEXT NOT NULL,
    version INTEGER NOT NULL,
    definition TEXT NOT NULL,
    checksum TEXT NOT NULL,
    published_at TEXT NOT NULL,

    PRIMARY KEY (flow_id, version)
);

CREATE INDEX IF NOT EXISTS idx_flows_checksum ON flows(flow_id, checksum);

CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    flow_id TEXT NOT NULL,
    flow_version INTEGER NOT NULL,
    state TEXT NOT NULL,
    revision INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    FOREIGN KEY (flow_id, flow_version) REFERENCES flows(flow_id, version)
);

CREATE INDEX IF NOT EXISTS idx_sessions_flow ON sessions(flow_id, flow_version);
";

/// One immutable version of a flow
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublishedFlow {
    pub flow_id: String,
    pub version: i64,
    pub definition: FlowDefinition,
    pub checksum: String,
    pub published_at: DateTime<Utc>,
}

/// Hex SHA-256 of the definition's JSON encoding
pub fn checksum(definition: &FlowDefinition) -> serde_json::Result<String> {
    let bytes = serde_json::to_vec(definition)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(content: &str) -> FlowDefinition {
        serde_json::from_value(serde_json::json!({
            "containers": [{"id": "A", "nodes": [
                {"id": "n", "type": "bubble-text", "config": {"content": content}}
            ]}]
        }))
        .unwrap()
    }

    #[test]
    fn test_checksum_is_stable_and_content_sensitive() {
        let a = checksum(&definition("hello")).unwrap();
        assert_eq!(a.len(), 64);
        assert_eq!(a, checksum(&definition("hello")).unwrap());
        assert_ne!(a, checksum(&definition("hello!")).unwrap());
    }
}
