//! Database module for chatflow
//!
//! Provides persistence for published flow versions and session state.

mod schema;

pub use schema::*;

use crate::engine::SessionState;
use crate::flow::FlowDefinition;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("Flow not found: {0}")]
    FlowNotFound(String),
    #[error("Session not found: {0}")]
    SessionNotFound(String),
    #[error("Session {session_id} was modified concurrently (expected revision {expected})")]
    RevisionConflict { session_id: String, expected: i64 },
    #[error("Session already exists: {0}")]
    SessionExists(String),
}

pub type DbResult<T> = Result<T, StorageError>;

/// Thread-safe database handle
#[derive(Clone)]
pub struct Database {
    conn: Arc<Mutex<Connection>>,
}

impl Database {
    /// Open or create database at the given path
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path)?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Open an in-memory database (for testing)
    #[allow(dead_code)] // Used in tests
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&self) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    // ==================== Flow Operations ====================

    /// Store `definition` as the next version of `flow_id`.
    ///
    /// A definition identical to an already published version is not stored
    /// again; that version is returned with `false`.
    pub fn publish_flow(
        &self,
        flow_id: &str,
        definition: &FlowDefinition,
    ) -> DbResult<(PublishedFlow, bool)> {
        let checksum = checksum(definition)?;
        let body = serde_json::to_string(definition)?;

        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        // Only the latest version dedupes; re-publishing an older definition
        // makes it the latest again under a new version.
        let latest: Option<(i64, String, String)> = tx
            .query_row(
                "SELECT version, checksum, published_at FROM flows
                 WHERE flow_id = ?1
                 ORDER BY version DESC LIMIT 1",
                params![flow_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        if let Some((version, _, published_at)) = latest
            .as_ref()
            .filter(|(_, latest_checksum, _)| *latest_checksum == checksum)
        {
            return Ok((
                PublishedFlow {
                    flow_id: flow_id.to_string(),
                    version: *version,
                    definition: definition.clone(),
                    checksum,
                    published_at: parse_datetime(published_at),
                },
                false,
            ));
        }

        let version = latest.map_or(1, |(version, _, _)| version + 1);
        let now = Utc::now();
        tx.execute(
            "INSERT INTO flows (flow_id, version, definition, checksum, published_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![flow_id, version, body, checksum, now.to_rfc3339()],
        )?;
        tx.commit()?;

        Ok((
            PublishedFlow {
                flow_id: flow_id.to_string(),
                version,
                definition: definition.clone(),
                checksum,
                published_at: now,
            },
            true,
        ))
    }

    /// A specific version, or the latest when `version` is `None`
    pub fn get_flow(&self, flow_id: &str, version: Option<i64>) -> DbResult<PublishedFlow> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT version, definition, checksum, published_at FROM flows
                 WHERE flow_id = ?1 AND (?2 IS NULL OR version = ?2)
                 ORDER BY version DESC LIMIT 1",
                params![flow_id, version],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((version, definition, checksum, published_at)) = row else {
            let wanted = match version {
                Some(v) => format!("{flow_id} v{v}"),
                None => flow_id.to_string(),
            };
            return Err(StorageError::FlowNotFound(wanted));
        };

        Ok(PublishedFlow {
            flow_id: flow_id.to_string(),
            version,
            definition: serde_json::from_str(&definition)?,
            checksum,
            published_at: parse_datetime(&published_at),
        })
    }

    // ==================== Session Operations ====================

    /// Persist a brand-new session
    pub fn insert_session(&self, state: &SessionState) -> DbResult<()> {
        let conn = self.conn.lock().unwrap();
        let body = serde_json::to_string(state)?;
        conn.execute(
            "INSERT INTO sessions (session_id, flow_id, flow_version, state, revision, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                state.session_id,
                state.flow_id,
                state.flow_version,
                body,
                state.revision,
                state.created_at.to_rfc3339(),
                state.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| match e {
            rusqlite::Error::SqliteFailure(err, _)
                if err.code == ErrorCode::ConstraintViolation
                    && self_exists(&conn, &state.session_id) =>
            {
                StorageError::SessionExists(state.session_id.clone())
            }
            other => StorageError::Sqlite(other),
        })?;
        Ok(())
    }

    pub fn get_session(&self, session_id: &str) -> DbResult<SessionState> {
        let conn = self.conn.lock().unwrap();
        let body: Option<String> = conn
            .query_row(
                "SELECT state FROM sessions WHERE session_id = ?1",
                params![session_id],
                |row| row.get(0),
            )
            .optional()?;
        let body = body.ok_or_else(|| StorageError::SessionNotFound(session_id.to_string()))?;
        Ok(serde_json::from_str(&body)?)
    }

    /// Write `state` if nobody saved since it was loaded.
    ///
    /// `state.revision` must be the revision that was read; the stored copy
    /// (and the returned one) carries the next revision.
    pub fn save_session(&self, state: &SessionState) -> DbResult<SessionState> {
        let mut next = state.clone();
        next.revision = state.revision + 1;
        let body = serde_json::to_string(&next)?;

        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE sessions SET state = ?1, revision = ?2, updated_at = ?3
             WHERE session_id = ?4 AND revision = ?5",
            params![
                body,
                next.revision,
                next.updated_at.to_rfc3339(),
                state.session_id,
                state.revision,
            ],
        )?;

        if updated == 0 {
            return Err(if self_exists(&conn, &state.session_id) {
                StorageError::RevisionConflict {
                    session_id: state.session_id.clone(),
                    expected: state.revision,
                }
            } else {
                StorageError::SessionNotFound(state.session_id.clone())
            });
        }
        Ok(next)
    }
}

fn self_exists(conn: &Connection, session_id: &str) -> bool {
    conn.query_row(
        "SELECT 1 FROM sessions WHERE session_id = ?1",
        params![session_id],
        |_| Ok(()),
    )
    .is_ok()
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
