//! In-process session store.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;

use super::{
    stored_turn, AppendOutcome, CommitOutcome, PendingMessage, PersistedMessageRecord,
    SessionStore, TurnOutcome,
};
use crate::error::{AgentError, Result};
use crate::types::Message;

#[derive(Debug, Default)]
struct SessionLog {
    records: Vec<PersistedMessageRecord>,
    by_operation: HashMap<String, usize>,
}

impl SessionLog {
    fn push(&mut self, record: PersistedMessageRecord) {
        self.by_operation
            .insert(record.operation_id.clone(), self.records.len());
        self.records.push(record);
    }
}

/// Session store kept in memory.
///
/// Each session has its own async lock, so appends to one session are
/// serialized while different sessions proceed independently.
#[derive(Debug, Default, Clone)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<SessionLog>>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self, session_id: &str) -> Arc<tokio::sync::Mutex<SessionLog>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(sessions.entry(session_id.to_string()).or_default())
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn append(
        &self,
        session_id: &str,
        message: &Message,
        operation_id: &str,
    ) -> Result<AppendOutcome> {
        let session = self.session(session_id);
        let mut log = session.lock().await;

        if let Some(&slot) = log.by_operation.get(operation_id) {
            tracing::debug!(session_id, operation_id, "duplicate append ignored");
            return Ok(AppendOutcome::AlreadyExists(log.records[slot].clone()));
        }

        let sequence_number = log.records.last().map_or(1, |r| r.sequence_number + 1);
        let record = PersistedMessageRecord {
            session_id: session_id.to_string(),
            sequence_number,
            operation_id: operation_id.to_string(),
            message: message.clone(),
            created_at: Utc::now(),
            turn_outcome: None,
        };
        log.push(record.clone());
        Ok(AppendOutcome::Created(record))
    }

    async fn commit_turn(
        &self,
        session_id: &str,
        messages: &[PendingMessage],
        outcome: &TurnOutcome,
    ) -> Result<CommitOutcome> {
        let Some(first) = messages.first() else {
            return Err(AgentError::InvalidArgument("a turn needs at least one message".into()));
        };
        let session = self.session(session_id);
        let mut log = session.lock().await;

        if log.by_operation.contains_key(&first.operation_id) {
            tracing::debug!(session_id, operation_id = %first.operation_id, "turn already committed");
            let stored = stored_turn(&log.records, &first.operation_id).unwrap_or_default();
            return Ok(CommitOutcome::Duplicate(stored));
        }
        if let Some(clash) = messages[1..]
            .iter()
            .find(|m| log.by_operation.contains_key(&m.operation_id))
        {
            return Err(AgentError::Store(format!(
                "operation id '{}' already stored",
                clash.operation_id
            )));
        }

        let first_sequence = log.records.last().map_or(1, |r| r.sequence_number + 1);
        let created_at = Utc::now();
        let records: Vec<PersistedMessageRecord> = messages
            .iter()
            .enumerate()
            .map(|(index, pending)| PersistedMessageRecord {
                session_id: session_id.to_string(),
                sequence_number: first_sequence + index as u64,
                operation_id: pending.operation_id.clone(),
                message: pending.message.clone(),
                created_at,
                turn_outcome: (index == 0).then(|| outcome.clone()),
            })
            .collect();
        for record in &records {
            log.push(record.clone());
        }
        Ok(CommitOutcome::Created(records))
    }

    async fn delete_after(&self, session_id: &str, after_sequence: u64) -> Result<u64> {
        let session = self.session(session_id);
        let mut log = session.lock().await;

        let keep = log
            .records
            .iter()
            .take_while(|r| r.sequence_number <= after_sequence)
            .count();
        let removed: Vec<_> = log.records.drain(keep..).collect();
        for record in &removed {
            log.by_operation.remove(&record.operation_id);
        }
        Ok(removed.len() as u64)
    }

    async fn get_history(&self, session_id: &str) -> Result<Vec<PersistedMessageRecord>> {
        let session = self.session(session_id);
        let log = session.lock().await;
        Ok(log.records.clone())
    }
}
