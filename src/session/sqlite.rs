//! SQLite-backed session store.
//!
//! Uses `rusqlite` behind a mutex; every call runs on the blocking pool.
//! Sequence numbers are assigned inside an IMMEDIATE transaction so racing
//! writers cannot interleave.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{
    stored_turn, AppendOutcome, CommitOutcome, PendingMessage, PersistedMessageRecord,
    SessionStore, TurnOutcome,
};
use crate::error::{AgentError, Result};
use crate::types::Message;

const SELECT_COLUMNS: &str =
    "session_id, sequence_number, operation_id, message, created_at, turn_outcome FROM session_messages";

/// Session store persisted in a SQLite database file.
#[derive(Clone)]
pub struct SqliteSessionStore {
    conn: Arc<Mutex<Connection>>,
}

impl std::fmt::Debug for SqliteSessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteSessionStore").finish_non_exhaustive()
    }
}

impl SqliteSessionStore {
    /// Open (or create) the database at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        Self::from_connection(conn)
    }

    /// In-memory database, for tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS session_messages (
                session_id TEXT NOT NULL,
                sequence_number INTEGER NOT NULL,
                operation_id TEXT NOT NULL,
                role TEXT NOT NULL,
                content TEXT,
                tool_calls TEXT,
                tool_call_id TEXT,
                message TEXT NOT NULL,
                created_at TEXT NOT NULL,
                turn_outcome TEXT,
                PRIMARY KEY (session_id, sequence_number),
                UNIQUE (session_id, operation_id)
            );
            ",
        )?;
        let has_outcome_column = conn
            .prepare("SELECT 1 FROM pragma_table_info('session_messages') WHERE name = 'turn_outcome'")?
            .exists([])?;
        if !has_outcome_column {
            conn.execute_batch("ALTER TABLE session_messages ADD COLUMN turn_outcome TEXT;")?;
        }
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            f(&mut guard)
        })
        .await
        .map_err(|e| AgentError::Store(format!("store task failed: {e}")))?
    }
}

fn find_by_operation(
    conn: &Connection,
    session_id: &str,
    operation_id: &str,
) -> Result<Option<PersistedMessageRecord>> {
    let sql = format!("SELECT {SELECT_COLUMNS} WHERE session_id = ?1 AND operation_id = ?2");
    let row = conn
        .query_row(&sql, params![session_id, operation_id], read_row)
        .optional()?;
    row.map(decode_row).transpose()
}

fn load_history(conn: &Connection, session_id: &str) -> Result<Vec<PersistedMessageRecord>> {
    let sql = format!("SELECT {SELECT_COLUMNS} WHERE session_id = ?1 ORDER BY sequence_number");
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map(params![session_id], read_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    rows.into_iter().map(decode_row).collect()
}

fn next_sequence(conn: &Connection, session_id: &str) -> Result<u64> {
    let next: i64 = conn.query_row(
        "SELECT COALESCE(MAX(sequence_number), 0) + 1 FROM session_messages WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(next as u64)
}

fn insert_record(conn: &Connection, record: &PersistedMessageRecord) -> Result<()> {
    let message = &record.message;
    let tool_calls = match message.tool_calls() {
        [] => None,
        calls => Some(serde_json::to_string(calls)?),
    };
    let turn_outcome = record
        .turn_outcome
        .as_ref()
        .map(serde_json::to_string)
        .transpose()?;
    conn.execute(
        "INSERT INTO session_messages
            (session_id, sequence_number, operation_id, role, content, tool_calls, tool_call_id, message, created_at, turn_outcome)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            record.session_id,
            record.sequence_number as i64,
            record.operation_id,
            message.role().to_string(),
            message.text(),
            tool_calls,
            message.tool_call_id(),
            serde_json::to_string(message)?,
            record.created_at.to_rfc3339(),
            turn_outcome,
        ],
    )?;
    Ok(())
}

type RawRow = (String, i64, String, String, String, Option<String>);

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn decode_row(
    (session_id, sequence, operation_id, message, created_at, turn_outcome): RawRow,
) -> Result<PersistedMessageRecord> {
    let message: Message = serde_json::from_str(&message)?;
    let turn_outcome: Option<TurnOutcome> = turn_outcome
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map_err(|e| AgentError::Store(format!("bad timestamp '{created_at}': {e}")))?
        .with_timezone(&Utc);
    Ok(PersistedMessageRecord {
        session_id,
        sequence_number: sequence as u64,
        operation_id,
        message,
        created_at,
        turn_outcome,
    })
}

#[async_trait]
impl SessionStore for SqliteSessionStore {
    async fn append(
        &self,
        session_id: &str,
        message: &Message,
        operation_id: &str,
    ) -> Result<AppendOutcome> {
        let session_id = session_id.to_string();
        let operation_id = operation_id.to_string();
        let message = message.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if let Some(existing) = find_by_operation(&tx, &session_id, &operation_id)? {
                tracing::debug!(session_id = %session_id, operation_id = %operation_id, "duplicate append ignored");
                return Ok(AppendOutcome::AlreadyExists(existing));
            }

            let record = PersistedMessageRecord {
                sequence_number: next_sequence(&tx, &session_id)?,
                session_id,
                operation_id,
                message,
                created_at: Utc::now(),
                turn_outcome: None,
            };
            insert_record(&tx, &record)?;
            tx.commit()?;
            Ok(AppendOutcome::Created(record))
        })
        .await
    }

    async fn commit_turn(
        &self,
        session_id: &str,
        messages: &[PendingMessage],
        outcome: &TurnOutcome,
    ) -> Result<CommitOutcome> {
        let Some(first_operation) = messages.first().map(|m| m.operation_id.clone()) else {
            return Err(AgentError::InvalidArgument("a turn needs at least one message".into()));
        };
        let session_id = session_id.to_string();
        let messages = messages.to_vec();
        let outcome = outcome.clone();
        self.with_conn(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if find_by_operation(&tx, &session_id, &first_operation)?.is_some() {
                tracing::debug!(session_id = %session_id, operation_id = %first_operation, "turn already committed");
                let history = load_history(&tx, &session_id)?;
                let stored = stored_turn(&history, &first_operation).unwrap_or_default();
                return Ok(CommitOutcome::Duplicate(stored));
            }

            let first_sequence = next_sequence(&tx, &session_id)?;
            let created_at = Utc::now();
            let mut records = Vec::with_capacity(messages.len());
            for (index, pending) in messages.into_iter().enumerate() {
                let record = PersistedMessageRecord {
                    session_id: session_id.clone(),
                    sequence_number: first_sequence + index as u64,
                    operation_id: pending.operation_id,
                    message: pending.message,
                    created_at,
                    turn_outcome: (index == 0).then(|| outcome.clone()),
                };
                insert_record(&tx, &record)?;
                records.push(record);
            }
            tx.commit()?;
            Ok(CommitOutcome::Created(records))
        })
        .await
    }

    async fn delete_after(&self, session_id: &str, after_sequence: u64) -> Result<u64> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| {
            let removed = conn.execute(
                "DELETE FROM session_messages WHERE session_id = ?1 AND sequence_number > ?2",
                params![session_id, after_sequence as i64],
            )?;
            Ok(removed as u64)
        })
        .await
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<PersistedMessageRecord>> {
        let session_id = session_id.to_string();
        self.with_conn(move |conn| load_history(conn, &session_id))
            .await
    }
}
