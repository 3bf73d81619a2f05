//! Session data model.

use crate::game::{GameLogic, GameState, Move, ParticipantId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session ID type
pub type SessionId = Uuid;

/// Lifecycle of a session. Transitions are monotonic:
/// `Created -> InProgress -> {Completed, Cancelled}`.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum SessionStatus {
    Created,
    InProgress,
    Completed,
    Cancelled,
}

impl SessionStatus {
    /// Whether the session has reached a terminal status.
    pub fn is_finished(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }
}

/// One applied move in a session's log.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MoveRecord {
    /// Strictly increasing, gapless, starting at 1.
    pub sequence: u64,
    pub participant: ParticipantId,
    pub mov: Move,
    pub played_at: DateTime<Utc>,
}

/// A single in-progress or finished game instance. Owned exclusively by the
/// [`SessionRegistry`](super::SessionRegistry); mutated only through it.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Session {
    pub id: SessionId,
    pub game_type: String,
    pub participants: Vec<ParticipantId>,
    pub state: GameState,
    pub status: SessionStatus,
    /// Set only when `status == Completed` and the variant declared a winner.
    pub winner: Option<ParticipantId>,
    pub move_log: Vec<MoveRecord>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Session {
    /// Next move-log sequence number.
    pub fn next_sequence(&self) -> u64 {
        self.move_log.last().map_or(1, |m| m.sequence + 1)
    }
}

/// Read-only consistent view of a session.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct SessionSnapshot {
    pub id: SessionId,
    pub game_type: String,
    pub participants: Vec<ParticipantId>,
    pub status: SessionStatus,
    pub winner: Option<ParticipantId>,
    pub move_log: Vec<MoveRecord>,
    pub state_summary: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl SessionSnapshot {
    pub(crate) fn of(session: &Session) -> Self {
        Self {
            id: session.id,
            game_type: session.game_type.clone(),
            participants: session.participants.clone(),
            status: session.status,
            winner: session.winner.clone(),
            move_log: session.move_log.clone(),
            state_summary: session.state.summary(),
            created_at: session.created_at,
            completed_at: session.completed_at,
        }
    }
}
