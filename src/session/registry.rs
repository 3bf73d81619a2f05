//! Concurrent session registry.
//!
//! The registry owns every live session and serializes mutation per session:
//! each session sits behind its own `Mutex` inside a shared map, so two bots
//! racing to move in the same session are ordered while unrelated sessions
//! proceed fully in parallel. No registry-wide lock is ever held across game
//! logic.

use super::models::{MoveRecord, Session, SessionId, SessionSnapshot, SessionStatus};
use crate::events::{ChannelKey, EngineEvent, EventHub};
use crate::game::{GameError, GameKind, GameLogic, Move, MoveOutcome, ParticipantId};
use crate::history::{HistorySink, NoopHistory};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// Session registry errors. All variants are recoverable and caller-facing;
/// a rejected operation leaves every session untouched.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SessionError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("session {0} is already finished")]
    SessionAlreadyFinished(SessionId),

    #[error("session {0} is not finished; cancel it first")]
    SessionNotFinished(SessionId),

    #[error(transparent)]
    Game(#[from] GameError),

    /// A defect in the registry itself (e.g. a move-log sequence gap).
    /// Aborts only the offending operation.
    #[error("internal invariant violation: {0}")]
    InternalInvariantViolation(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Registry of all live sessions.
pub struct SessionRegistry {
    sessions: RwLock<HashMap<SessionId, Arc<Mutex<Session>>>>,
    hub: Arc<EventHub>,
    history: Arc<dyn HistorySink>,
}

impl SessionRegistry {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self::with_history(hub, Arc::new(NoopHistory))
    }

    /// Registry with an audit sink. Sink failures are logged and ignored;
    /// they never affect gameplay.
    pub fn with_history(hub: Arc<EventHub>, history: Arc<dyn HistorySink>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            hub,
            history,
        }
    }

    /// Create a session for `participants` playing `game_type`.
    ///
    /// The session starts in `Created` and is advanced immediately to
    /// `InProgress` (or `Completed` if the variant is terminal at its initial
    /// state). Publishes `SessionCreated` on the session's channel.
    pub async fn create(
        &self,
        game_type: &str,
        participants: Vec<ParticipantId>,
        config: &serde_json::Value,
    ) -> SessionResult<SessionId> {
        let kind = GameKind::from_tag(game_type)?;
        let state = kind.initial_state(&participants, config)?;

        let id = Uuid::new_v4();
        let now = Utc::now();
        let mut session = Session {
            id,
            game_type: kind.tag().to_string(),
            participants,
            state,
            status: SessionStatus::Created,
            winner: None,
            move_log: Vec::new(),
            created_at: now,
            completed_at: None,
        };

        let terminal_at_start = session.state.is_terminal();
        if terminal_at_start {
            session.status = SessionStatus::Completed;
            session.winner = session.state.winner();
            session.completed_at = Some(now);
        } else {
            session.status = SessionStatus::InProgress;
        }
        let winner = session.winner.clone();

        let mut sessions = self.sessions.write().await;
        sessions.insert(id, Arc::new(Mutex::new(session)));
        drop(sessions);

        log::info!("created session {id} ({})", kind.tag());
        self.hub
            .publish(
                ChannelKey::Session(id),
                EngineEvent::SessionCreated { session_id: id },
            )
            .await;
        if terminal_at_start {
            self.hub
                .publish(
                    ChannelKey::Session(id),
                    EngineEvent::SessionCompleted {
                        session_id: id,
                        winner,
                    },
                )
                .await;
        }

        Ok(id)
    }

    /// Apply one move. Serialized against other moves on the same session.
    ///
    /// On success the move is appended to the log with the next sequence
    /// number and `MoveApplied` (then, if terminal, `SessionCompleted`) is
    /// published, in that order, before returning.
    pub async fn apply_move(
        &self,
        session_id: SessionId,
        participant: &ParticipantId,
        mov: &Move,
    ) -> SessionResult<MoveOutcome> {
        let cell = self.cell(session_id).await?;
        let mut session = cell.lock().await;

        if session.status.is_finished() {
            return Err(SessionError::SessionAlreadyFinished(session_id));
        }

        let outcome = session.state.apply_move(participant, mov)?;

        let sequence = session.next_sequence();
        if sequence != session.move_log.len() as u64 + 1 {
            log::error!(
                "session {session_id}: move log sequence gap (next {sequence}, len {})",
                session.move_log.len()
            );
            return Err(SessionError::InternalInvariantViolation(format!(
                "move log sequence gap in session {session_id}"
            )));
        }
        let record = MoveRecord {
            sequence,
            participant: participant.clone(),
            mov: mov.clone(),
            played_at: Utc::now(),
        };
        session.move_log.push(record.clone());

        if outcome.terminal {
            session.status = SessionStatus::Completed;
            session.winner = outcome.winner.clone();
            session.completed_at = Some(Utc::now());
        }

        // Published while the session lock is held so subscribers observe
        // events in move order.
        let channel = ChannelKey::Session(session_id);
        self.hub
            .publish(
                channel,
                EngineEvent::MoveApplied {
                    session_id,
                    participant: participant.clone(),
                    mov: mov.clone(),
                    summary: session.state.summary(),
                },
            )
            .await;
        if outcome.terminal {
            log::info!(
                "session {session_id} completed, winner: {:?}",
                outcome.winner
            );
            self.hub
                .publish(
                    channel,
                    EngineEvent::SessionCompleted {
                        session_id,
                        winner: outcome.winner.clone(),
                    },
                )
                .await;
        }

        if let Err(e) = self.history.append(session_id, &record).await {
            log::warn!("history append failed for session {session_id}: {e}");
        }

        Ok(outcome)
    }

    /// Consistent read-only snapshot; safe to call concurrently with moves on
    /// the same session.
    pub async fn get(&self, session_id: SessionId) -> SessionResult<SessionSnapshot> {
        let cell = self.cell(session_id).await?;
        let session = cell.lock().await;
        Ok(SessionSnapshot::of(&session))
    }

    /// Explicitly cancel a running session. No winner is recorded.
    pub async fn cancel(&self, session_id: SessionId) -> SessionResult<()> {
        let cell = self.cell(session_id).await?;
        let mut session = cell.lock().await;
        if session.status.is_finished() {
            return Err(SessionError::SessionAlreadyFinished(session_id));
        }
        session.status = SessionStatus::Cancelled;
        session.completed_at = Some(Utc::now());
        log::info!("cancelled session {session_id}");
        Ok(())
    }

    /// Treat a configured move-timer expiry as the acting participant
    /// forfeiting: the session completes as if they had played a losing move.
    /// The timer itself belongs to the admission layer, not the core.
    pub async fn forfeit(
        &self,
        session_id: SessionId,
        participant: &ParticipantId,
    ) -> SessionResult<()> {
        let cell = self.cell(session_id).await?;
        let mut session = cell.lock().await;
        if session.status.is_finished() {
            return Err(SessionError::SessionAlreadyFinished(session_id));
        }
        if !session.participants.contains(participant) {
            return Err(SessionError::Game(GameError::IllegalMove(format!(
                "{participant} is not a participant in session {session_id}"
            ))));
        }

        let others: Vec<ParticipantId> = session
            .participants
            .iter()
            .filter(|p| *p != participant)
            .cloned()
            .collect();
        // A two-player forfeit has a clear winner; with more players the
        // session ends without one.
        let winner = match others.as_slice() {
            [only] => Some(only.clone()),
            _ => None,
        };

        session.status = SessionStatus::Completed;
        session.winner = winner.clone();
        session.completed_at = Some(Utc::now());

        log::info!("session {session_id}: {participant} forfeited");
        self.hub
            .publish(
                ChannelKey::Session(session_id),
                EngineEvent::SessionCompleted { session_id, winner },
            )
            .await;
        Ok(())
    }

    /// Remove a finished session. Running sessions must be cancelled first.
    pub async fn delete(&self, session_id: SessionId) -> SessionResult<()> {
        let cell = self.cell(session_id).await?;
        {
            let session = cell.lock().await;
            if !session.status.is_finished() {
                return Err(SessionError::SessionNotFinished(session_id));
            }
        }
        // Statuses are monotonic, so the session cannot un-finish between the
        // check and the removal.
        let mut sessions = self.sessions.write().await;
        sessions.remove(&session_id);
        log::debug!("deleted session {session_id}");
        Ok(())
    }

    /// Number of live sessions.
    pub async fn session_count(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Drop all sessions. Test support for process-wide state.
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    async fn cell(&self, session_id: SessionId) -> SessionResult<Arc<Mutex<Session>>> {
        let sessions = self.sessions.read().await;
        sessions
            .get(&session_id)
            .cloned()
            .ok_or(SessionError::SessionNotFound(session_id))
    }
}
