//! Bracket scheduler: builds brackets and drives them to completion.
//!
//! The scheduler is a caller of the session registry, never a mutator of
//! session state: it creates sessions for runnable matches, consumes their
//! `SessionCompleted` events through its own hub subscription, records
//! results, and materializes downstream matches. Event delivery is
//! at-least-once, so consumption is idempotent: each session id advances a
//! bracket at most once.

use super::models::{
    Bracket, BracketFormat, BracketId, BracketStatus, DrawPolicy, MatchSlot, MatchStatus, Seeding,
    TournamentConfig, downstream_of,
};
use crate::events::{ChannelKey, EngineEvent, EventHub, ObserverId};
use crate::game::{GameKind, ParticipantId};
use crate::session::{SessionError, SessionId, SessionRegistry};
use chrono::Utc;
use rand::seq::SliceRandom;
use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};
use thiserror::Error;
use tokio::sync::{Mutex, RwLock, mpsc};
use uuid::Uuid;

/// Bracket scheduler errors.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum BracketError {
    #[error("need at least 2 participants, got {0}")]
    TooFewParticipants(usize),

    #[error("duplicate participant: {0}")]
    DuplicateParticipant(ParticipantId),

    #[error("bracket not found: {0}")]
    BracketNotFound(BracketId),

    #[error("bracket {0} is not ready to start")]
    BracketNotReady(BracketId),

    #[error("bracket {0} has already started")]
    BracketAlreadyStarted(BracketId),

    #[error("bracket {0} is already finished")]
    BracketAlreadyFinished(BracketId),

    #[error(transparent)]
    Session(#[from] SessionError),
}

pub type BracketResult<T> = Result<T, BracketError>;

/// A bracket plus the bookkeeping that drives it: which session feeds which
/// match, and which session completions have already been consumed.
struct BracketRun {
    bracket: Bracket,
    session_to_match: HashMap<SessionId, (usize, usize)>,
    consumed: HashSet<SessionId>,
    rounds_announced: u32,
}

/// Scheduler owning all brackets. Brackets are mutated under a per-bracket
/// lock, mirroring the registry's per-session discipline.
pub struct BracketScheduler {
    registry: Arc<SessionRegistry>,
    hub: Arc<EventHub>,
    brackets: RwLock<HashMap<BracketId, Arc<Mutex<BracketRun>>>>,
    /// Which bracket a tournament session belongs to.
    session_index: RwLock<HashMap<SessionId, BracketId>>,
    observer: ObserverId,
    events_tx: mpsc::Sender<EngineEvent>,
}

impl BracketScheduler {
    /// Create the scheduler and spawn its completion-event driver.
    ///
    /// The driver consumes `SessionCompleted` events from every session
    /// channel the scheduler subscribes to and feeds them into
    /// [`advance_on_completion`](Self::advance_on_completion).
    pub fn spawn(registry: Arc<SessionRegistry>, hub: Arc<EventHub>) -> Arc<Self> {
        let (events_tx, mut events_rx) = mpsc::channel(256);
        let scheduler = Arc::new(Self {
            registry,
            hub,
            brackets: RwLock::new(HashMap::new()),
            session_index: RwLock::new(HashMap::new()),
            observer: Uuid::new_v4(),
            events_tx,
        });

        let driver = Arc::clone(&scheduler);
        tokio::spawn(async move {
            while let Some(event) = events_rx.recv().await {
                if let EngineEvent::SessionCompleted { session_id, winner } = event
                    && let Err(e) = driver.advance_on_completion(session_id, winner).await
                {
                    log::warn!("failed to advance bracket for session {session_id}: {e}");
                }
            }
        });

        scheduler
    }

    /// Build a bracket for a roster. The bracket starts in `Registration`.
    ///
    /// The roster and game config are fully validated here, so a later
    /// `start_bracket` cannot fail while creating sessions and leave the
    /// bracket half-started.
    pub async fn create_bracket(
        &self,
        participants: Vec<ParticipantId>,
        game_type: &str,
        format: BracketFormat,
        seeding: Seeding,
        config: TournamentConfig,
    ) -> BracketResult<BracketId> {
        if participants.len() < 2 {
            return Err(BracketError::TooFewParticipants(participants.len()));
        }
        let kind = GameKind::from_tag(game_type).map_err(SessionError::from)?;
        kind.validate_config(&config.game_config)
            .map_err(SessionError::from)?;
        let mut seen = HashSet::new();
        for participant in &participants {
            if !seen.insert(participant) {
                return Err(BracketError::DuplicateParticipant(participant.clone()));
            }
        }

        let mut seeded = participants;
        if seeding == Seeding::Random {
            seeded.shuffle(&mut rand::rng());
        }

        let BracketFormat::SingleElimination = format;
        let bracket = Bracket::single_elimination(kind.tag().to_string(), &seeded, config);
        let id = bracket.id;

        let mut brackets = self.brackets.write().await;
        brackets.insert(
            id,
            Arc::new(Mutex::new(BracketRun {
                bracket,
                session_to_match: HashMap::new(),
                consumed: HashSet::new(),
                rounds_announced: 0,
            })),
        );
        drop(brackets);

        log::info!(
            "created bracket {id} ({}, {} participants)",
            kind.tag(),
            seeded.len()
        );
        Ok(id)
    }

    /// Start a bracket: `Registration -> Ready -> InProgress`, resolve
    /// round-1 byes, and create sessions for the runnable matches.
    pub async fn start_bracket(&self, bracket_id: BracketId) -> BracketResult<()> {
        let run_cell = self.run(bracket_id).await?;
        let mut run = run_cell.lock().await;

        match run.bracket.status {
            BracketStatus::Registration => {}
            BracketStatus::Cancelled => return Err(BracketError::BracketNotReady(bracket_id)),
            _ => return Err(BracketError::BracketAlreadyStarted(bracket_id)),
        }
        run.bracket.status = BracketStatus::Ready;
        run.bracket.started_at = Some(Utc::now());
        run.bracket.status = BracketStatus::InProgress;
        log::info!("started bracket {bracket_id}");

        self.schedule_ready_matches(bracket_id, &mut run).await
    }

    /// Consume one session completion. Idempotent: a session id that has
    /// already been consumed is ignored, so at-least-once event delivery
    /// advances the bracket exactly once.
    pub async fn advance_on_completion(
        &self,
        session_id: SessionId,
        winner: Option<ParticipantId>,
    ) -> BracketResult<()> {
        let bracket_id = {
            let index = self.session_index.read().await;
            match index.get(&session_id) {
                Some(id) => *id,
                // Not a tournament session.
                None => return Ok(()),
            }
        };
        let run_cell = self.run(bracket_id).await?;
        let mut run = run_cell.lock().await;

        if run.consumed.contains(&session_id) {
            log::debug!("duplicate completion for session {session_id}, ignoring");
            return Ok(());
        }
        run.consumed.insert(session_id);

        if run.bracket.status == BracketStatus::Cancelled {
            return Ok(());
        }
        let Some(&(round_idx, match_idx)) = run.session_to_match.get(&session_id) else {
            return Ok(());
        };

        let winner = match winner {
            Some(winner) => winner,
            None => {
                match self
                    .resolve_draw(bracket_id, &mut run, round_idx, match_idx)
                    .await?
                {
                    Some(winner) => winner,
                    // A replay session was scheduled; nothing to record yet.
                    None => return Ok(()),
                }
            }
        };

        {
            let m = &mut run.bracket.rounds[round_idx].matches[match_idx];
            m.status = MatchStatus::Completed;
            m.winner = Some(winner.clone());
        }
        log::debug!(
            "bracket {bracket_id}: round {} match {match_idx} won by {winner}",
            round_idx + 1
        );
        self.record_advancement(bracket_id, &mut run, round_idx, match_idx, winner)
            .await;
        self.schedule_ready_matches(bracket_id, &mut run).await
    }

    /// Cancel a bracket. In-flight sessions finish naturally, but no further
    /// sessions will be scheduled for it.
    pub async fn cancel_bracket(&self, bracket_id: BracketId) -> BracketResult<()> {
        let run_cell = self.run(bracket_id).await?;
        let mut run = run_cell.lock().await;
        match run.bracket.status {
            BracketStatus::Completed | BracketStatus::Cancelled => {
                Err(BracketError::BracketAlreadyFinished(bracket_id))
            }
            _ => {
                run.bracket.status = BracketStatus::Cancelled;
                run.bracket.completed_at = Some(Utc::now());
                log::info!("cancelled bracket {bracket_id}");
                Ok(())
            }
        }
    }

    /// Consistent snapshot of a bracket.
    pub async fn get_bracket(&self, bracket_id: BracketId) -> BracketResult<Bracket> {
        let run_cell = self.run(bracket_id).await?;
        let run = run_cell.lock().await;
        Ok(run.bracket.clone())
    }

    /// Number of tracked brackets.
    pub async fn bracket_count(&self) -> usize {
        let brackets = self.brackets.read().await;
        brackets.len()
    }

    /// Drop all brackets. Test support for process-wide state.
    pub async fn clear(&self) {
        self.brackets.write().await.clear();
        self.session_index.write().await.clear();
    }

    /// Fixed-point scan: resolve every match whose slots are settled, byes
    /// without a session, player pairs by creating one. Cascades bye
    /// propagation across rounds.
    async fn schedule_ready_matches(
        &self,
        bracket_id: BracketId,
        run: &mut BracketRun,
    ) -> BracketResult<()> {
        if run.bracket.status == BracketStatus::Cancelled {
            return Ok(());
        }
        'fixed_point: loop {
            for round_idx in 0..run.bracket.rounds.len() {
                for match_idx in 0..run.bracket.rounds[round_idx].matches.len() {
                    let m = &run.bracket.rounds[round_idx].matches[match_idx];
                    if m.status != MatchStatus::Waiting
                        || !m.slots.iter().all(MatchSlot::is_resolved)
                    {
                        continue;
                    }

                    self.announce_round(bracket_id, run, round_idx).await;

                    let m = &run.bracket.rounds[round_idx].matches[match_idx];
                    if let Some(winner) = m.bye_winner().cloned() {
                        // A bye resolves the match immediately, no session.
                        let m = &mut run.bracket.rounds[round_idx].matches[match_idx];
                        m.status = MatchStatus::Completed;
                        m.winner = Some(winner.clone());
                        log::debug!(
                            "bracket {bracket_id}: {winner} advances on a bye in round {}",
                            round_idx + 1
                        );
                        self.record_advancement(bracket_id, run, round_idx, match_idx, winner)
                            .await;
                    } else if let Some((a, b)) = m.players() {
                        let participants = vec![a.clone(), b.clone()];
                        run.bracket.rounds[round_idx].matches[match_idx].status =
                            MatchStatus::Ready;
                        let session_id = self
                            .bind_match_session(bracket_id, run, round_idx, match_idx, participants)
                            .await?;
                        log::debug!(
                            "bracket {bracket_id}: round {} match {match_idx} running as session {session_id}",
                            round_idx + 1
                        );
                    }

                    // State changed; rescan from the top.
                    continue 'fixed_point;
                }
            }
            return Ok(());
        }
    }

    /// Create and bind a session for a runnable match, subscribing the
    /// scheduler's driver to its completion.
    async fn bind_match_session(
        &self,
        bracket_id: BracketId,
        run: &mut BracketRun,
        round_idx: usize,
        match_idx: usize,
        participants: Vec<ParticipantId>,
    ) -> BracketResult<SessionId> {
        let session_id = self
            .registry
            .create(
                &run.bracket.game_type,
                participants,
                &run.bracket.config.game_config,
            )
            .await?;
        self.hub
            .subscribe(
                ChannelKey::Session(session_id),
                self.observer,
                self.events_tx.clone(),
            )
            .await;

        let m = &mut run.bracket.rounds[round_idx].matches[match_idx];
        m.session_id = Some(session_id);
        m.status = MatchStatus::InProgress;
        run.session_to_match
            .insert(session_id, (round_idx, match_idx));
        self.session_index
            .write()
            .await
            .insert(session_id, bracket_id);

        // A variant terminal at its initial state completes before the
        // driver's subscription exists; feed that completion to the driver
        // directly so the match does not stall.
        let snapshot = self.registry.get(session_id).await?;
        if snapshot.status.is_finished()
            && let Err(e) = self.events_tx.try_send(EngineEvent::SessionCompleted {
                session_id,
                winner: snapshot.winner,
            })
        {
            log::warn!("failed to queue completion for session {session_id}: {e}");
        }
        Ok(session_id)
    }

    /// Feed a match winner downstream, or crown the champion if this was the
    /// final.
    async fn record_advancement(
        &self,
        bracket_id: BracketId,
        run: &mut BracketRun,
        round_idx: usize,
        match_idx: usize,
        winner: ParticipantId,
    ) {
        if round_idx + 1 == run.bracket.rounds.len() {
            run.bracket.status = BracketStatus::Completed;
            run.bracket.champion = Some(winner.clone());
            run.bracket.completed_at = Some(Utc::now());
            log::info!("bracket {bracket_id} completed, champion: {winner}");
            self.hub
                .publish(
                    ChannelKey::Bracket(bracket_id),
                    EngineEvent::BracketCompleted {
                        bracket_id,
                        champion: winner,
                    },
                )
                .await;
        } else {
            let (next_round, next_match, slot) = downstream_of(round_idx, match_idx);
            run.bracket.rounds[next_round].matches[next_match].slots[slot] =
                MatchSlot::Player(winner);
        }
    }

    /// Handle a drawn session per the tournament's draw policy. Returns the
    /// decided winner, or `None` when a replay session was scheduled instead.
    async fn resolve_draw(
        &self,
        bracket_id: BracketId,
        run: &mut BracketRun,
        round_idx: usize,
        match_idx: usize,
    ) -> BracketResult<Option<ParticipantId>> {
        let (a, b) = {
            let m = &run.bracket.rounds[round_idx].matches[match_idx];
            match m.players() {
                Some((a, b)) => (a.clone(), b.clone()),
                None => {
                    return Err(BracketError::Session(
                        SessionError::InternalInvariantViolation(format!(
                            "drawn session bound to unresolved match in bracket {bracket_id}"
                        )),
                    ));
                }
            }
        };

        let on_draw = run.bracket.config.on_draw;
        let replays = run.bracket.rounds[round_idx].matches[match_idx].draw_replays;
        if on_draw == DrawPolicy::Replay && replays < run.bracket.config.max_draw_replays {
            run.bracket.rounds[round_idx].matches[match_idx].draw_replays = replays + 1;
            let session_id = self
                .bind_match_session(bracket_id, run, round_idx, match_idx, vec![a, b])
                .await?;
            log::info!(
                "bracket {bracket_id}: round {} match {match_idx} drawn, replay {} as session {session_id}",
                round_idx + 1,
                replays + 1
            );
            Ok(None)
        } else {
            // Replay budget exhausted (or coin-flip policy): decide by coin
            // flip so the bracket always terminates.
            let winner = if rand::random_bool(0.5) { a } else { b };
            log::info!(
                "bracket {bracket_id}: round {} match {match_idx} drawn, coin flip chose {winner}",
                round_idx + 1
            );
            Ok(Some(winner))
        }
    }

    /// Publish `BracketRoundAdvanced` the first time a round is reached.
    async fn announce_round(&self, bracket_id: BracketId, run: &mut BracketRun, round_idx: usize) {
        let round_number = run.bracket.rounds[round_idx].number;
        if round_number > run.rounds_announced {
            run.rounds_announced = round_number;
            log::info!("bracket {bracket_id} advanced to round {round_number}");
            self.hub
                .publish(
                    ChannelKey::Bracket(bracket_id),
                    EngineEvent::BracketRoundAdvanced {
                        bracket_id,
                        round_number,
                    },
                )
                .await;
        }
    }

    async fn run(&self, bracket_id: BracketId) -> BracketResult<Arc<Mutex<BracketRun>>> {
        let brackets = self.brackets.read().await;
        brackets
            .get(&bracket_id)
            .cloned()
            .ok_or(BracketError::BracketNotFound(bracket_id))
    }
}
