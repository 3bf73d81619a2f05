//! Best-effort move history sink.
//!
//! The persistence collaborator is out of scope; the registry only needs an
//! append-only audit seam that may fail without affecting gameplay. Failures
//! are logged by the caller and otherwise ignored.

use crate::session::{MoveRecord, SessionId};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Append-only sink for applied moves.
#[async_trait]
pub trait HistorySink: Send + Sync {
    async fn append(&self, session_id: SessionId, record: &MoveRecord) -> Result<(), String>;
}

/// Discards everything. The default when no audit store is wired in.
#[derive(Debug, Default)]
pub struct NoopHistory;

#[async_trait]
impl HistorySink for NoopHistory {
    async fn append(&self, _session_id: SessionId, _record: &MoveRecord) -> Result<(), String> {
        Ok(())
    }
}

/// In-memory sink for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    moves: Mutex<HashMap<SessionId, Vec<MoveRecord>>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn moves_for(&self, session_id: SessionId) -> Vec<MoveRecord> {
        let moves = self.moves.lock().await;
        moves.get(&session_id).cloned().unwrap_or_default()
    }
}

#[async_trait]
impl HistorySink for MemoryHistory {
    async fn append(&self, session_id: SessionId, record: &MoveRecord) -> Result<(), String> {
        let mut moves = self.moves.lock().await;
        moves.entry(session_id).or_default().push(record.clone());
        Ok(())
    }
}
