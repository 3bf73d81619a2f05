//! Tournament bracket data model and single-elimination construction.
//!
//! The match graph is stored arena-style: matches live in flat per-round
//! lists and downstream references are (round, index) pairs, so the DAG of
//! matches feeding matches never needs pointers.

use crate::game::ParticipantId;
use crate::session::SessionId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bracket ID type
pub type BracketId = Uuid;

/// Match ID type
pub type MatchId = Uuid;

/// Tournament format. Only single elimination is implemented in depth.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BracketFormat {
    SingleElimination,
}

/// Bracket lifecycle: `Registration -> Ready -> InProgress -> Completed`,
/// with `Cancelled` terminal from any non-terminal state.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum BracketStatus {
    Registration,
    Ready,
    InProgress,
    Completed,
    Cancelled,
}

/// Match lifecycle: `Waiting -> Ready -> InProgress -> Completed`; a bye
/// resolves straight from `Ready` to `Completed` without a session.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MatchStatus {
    Waiting,
    Ready,
    InProgress,
    Completed,
}

/// One side of a match.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum MatchSlot {
    /// Awaits an upstream match's winner.
    Pending,
    /// Automatic advancement for the other slot.
    Bye,
    Player(ParticipantId),
}

impl MatchSlot {
    /// A slot is resolved once it holds a participant or a bye.
    pub fn is_resolved(&self) -> bool {
        !matches!(self, MatchSlot::Pending)
    }

    pub fn player(&self) -> Option<&ParticipantId> {
        match self {
            MatchSlot::Player(p) => Some(p),
            _ => None,
        }
    }
}

/// One scheduled pairing within a round, bound to at most one session.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Match {
    pub id: MatchId,
    pub slots: [MatchSlot; 2],
    pub session_id: Option<SessionId>,
    pub status: MatchStatus,
    pub winner: Option<ParticipantId>,
    /// Draw replays already burned for this match.
    pub draw_replays: u32,
}

impl Match {
    fn new(slots: [MatchSlot; 2]) -> Self {
        Self {
            id: Uuid::new_v4(),
            slots,
            session_id: None,
            status: MatchStatus::Waiting,
            winner: None,
            draw_replays: 0,
        }
    }

    /// Both participants, once both slots hold players.
    pub fn players(&self) -> Option<(&ParticipantId, &ParticipantId)> {
        match (&self.slots[0], &self.slots[1]) {
            (MatchSlot::Player(a), MatchSlot::Player(b)) => Some((a, b)),
            _ => None,
        }
    }

    /// The participant advanced by a bye, if one slot is a bye.
    pub fn bye_winner(&self) -> Option<&ParticipantId> {
        match (&self.slots[0], &self.slots[1]) {
            (MatchSlot::Player(p), MatchSlot::Bye) | (MatchSlot::Bye, MatchSlot::Player(p)) => {
                Some(p)
            }
            _ => None,
        }
    }
}

/// One round of a bracket.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct Round {
    /// 1-based round number.
    pub number: u32,
    pub matches: Vec<Match>,
}

/// Seeding policy assigning participants to initial bracket positions.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum Seeding {
    /// Roster order is seed order.
    InOrder,
    /// Shuffle the roster before seeding.
    Random,
}

/// What to do when an elimination session ends in a draw.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawPolicy {
    /// Replay the match with a fresh session, up to the configured cap,
    /// then fall back to a coin flip.
    Replay,
    CoinFlip,
}

/// Per-tournament configuration.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct TournamentConfig {
    pub on_draw: DrawPolicy,
    /// Replay cap before the draw policy falls back to a coin flip, so a
    /// variant that never declares a winner cannot loop the bracket.
    pub max_draw_replays: u32,
    /// Opaque configuration handed to the game variant for every session.
    pub game_config: serde_json::Value,
}

impl TournamentConfig {
    pub fn new(game_config: serde_json::Value) -> Self {
        Self {
            on_draw: DrawPolicy::Replay,
            max_draw_replays: 3,
            game_config,
        }
    }

    pub fn with_draw_policy(mut self, on_draw: DrawPolicy) -> Self {
        self.on_draw = on_draw;
        self
    }
}

/// The full elimination schedule for one tournament.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct Bracket {
    pub id: BracketId,
    pub game_type: String,
    pub format: BracketFormat,
    pub status: BracketStatus,
    pub rounds: Vec<Round>,
    /// Set only once the final match completes.
    pub champion: Option<ParticipantId>,
    pub config: TournamentConfig,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Bracket {
    /// Build a single-elimination bracket for an already-seeded roster
    /// (index 0 is the top seed). Callers validate the roster size.
    pub(crate) fn single_elimination(
        game_type: String,
        seeded: &[ParticipantId],
        config: TournamentConfig,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            game_type,
            format: BracketFormat::SingleElimination,
            status: BracketStatus::Registration,
            rounds: build_rounds(seeded),
            champion: None,
            config,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }
}

/// Standard bracket seed order for a field of `size` (a power of two):
/// expand [1] by pairing each seed s with its mirror `2m + 1 - s`, so the
/// top seed meets the weakest possible opposition each round.
/// For size 8: [1, 8, 4, 5, 2, 7, 3, 6].
fn seed_order(size: usize) -> Vec<usize> {
    let mut order = vec![1];
    while order.len() < size {
        let mirror = order.len() * 2 + 1;
        let mut next = Vec::with_capacity(order.len() * 2);
        for &seed in &order {
            next.push(seed);
            next.push(mirror - seed);
        }
        order = next;
    }
    order
}

/// Lay out all rounds for a seeded roster of at least 2 participants.
///
/// Seeds beyond the roster become byes, which by the mirror pairing land on
/// the highest seeds first: `next_power_of_two(n) - n` byes in round 1.
fn build_rounds(seeded: &[ParticipantId]) -> Vec<Round> {
    let n = seeded.len();
    let size = n.next_power_of_two();

    let order = seed_order(size);
    let first_round: Vec<Match> = order
        .chunks(2)
        .map(|pair| {
            let slot = |seed: usize| {
                if seed <= n {
                    MatchSlot::Player(seeded[seed - 1].clone())
                } else {
                    MatchSlot::Bye
                }
            };
            Match::new([slot(pair[0]), slot(pair[1])])
        })
        .collect();

    let mut rounds = vec![Round {
        number: 1,
        matches: first_round,
    }];
    let mut matches_in_round = size / 2;
    while matches_in_round > 1 {
        matches_in_round /= 2;
        rounds.push(Round {
            number: rounds.len() as u32 + 1,
            matches: (0..matches_in_round)
                .map(|_| Match::new([MatchSlot::Pending, MatchSlot::Pending]))
                .collect(),
        });
    }
    rounds
}

/// Downstream (round index, match index, slot index) fed by a match.
pub(crate) fn downstream_of(round_idx: usize, match_idx: usize) -> (usize, usize, usize) {
    (round_idx + 1, match_idx / 2, match_idx % 2)
}
