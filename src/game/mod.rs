//! Game variant interface and the variant registry.
//!
//! Every game type is pure state-transition logic behind one capability
//! surface: build an initial state from a validated configuration, report
//! legal moves, apply a move, and report termination and the winner. Variants
//! are dispatched through [`GameState`] with `enum_dispatch`, so the session
//! registry and the bracket scheduler never name a concrete game.

pub mod rps;

use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use rps::RpsState;

/// Identifier for a participant (bot) as issued by the auth collaborator.
pub type ParticipantId = String;

/// A move in a variant's own move vocabulary (e.g. `"rock"`).
pub type Move = String;

/// Errors produced by game-variant logic.
#[derive(Clone, Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    #[error("invalid participants: need {expected}, got {actual}")]
    InvalidParticipants { expected: String, actual: usize },

    #[error("unknown game type: {0}")]
    UnknownGameType(String),

    #[error("illegal move: {0}")]
    IllegalMove(String),
}

/// What a successfully applied move did to the game.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MoveOutcome {
    /// The move ended the game.
    pub terminal: bool,
    /// Winner if the game ended with one; `None` mid-game or on a draw.
    pub winner: Option<ParticipantId>,
}

/// Capability surface every game variant implements.
///
/// `apply_move` must be a pure function of (state, participant, move): no
/// clocks, no randomness, no global state. Replaying a move log from the
/// initial state must reproduce the final state exactly.
#[enum_dispatch]
pub trait GameLogic {
    /// Legal moves for `participant` right now; empty when it is not their
    /// turn or the game is terminal.
    fn legal_moves(&self, participant: &ParticipantId) -> Vec<Move>;

    /// Apply `mov` for `participant`, failing with [`GameError::IllegalMove`]
    /// (and leaving the state untouched) if it is not currently legal.
    fn apply_move(
        &mut self,
        participant: &ParticipantId,
        mov: &Move,
    ) -> Result<MoveOutcome, GameError>;

    fn is_terminal(&self) -> bool;

    /// Winner once terminal; `None` mid-game or on a draw.
    fn winner(&self) -> Option<ParticipantId>;

    /// Compact observer-facing summary of the current state.
    fn summary(&self) -> serde_json::Value;
}

/// Opaque, serializable game state for any registered variant.
#[enum_dispatch(GameLogic)]
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum GameState {
    Rps(RpsState),
}

/// The set of registered game types, keyed by their wire tags.
///
/// New variants are added here and in [`GameState`]; the session registry and
/// the bracket scheduler need no changes.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GameKind {
    Rps,
}

impl GameKind {
    /// Look up a variant by its game-type tag.
    pub fn from_tag(tag: &str) -> Result<Self, GameError> {
        match tag {
            "rps" | "rock_paper_scissors" => Ok(GameKind::Rps),
            other => Err(GameError::UnknownGameType(other.to_string())),
        }
    }

    /// Canonical tag for this variant.
    pub fn tag(&self) -> &'static str {
        match self {
            GameKind::Rps => "rps",
        }
    }

    /// Validate a raw game config without building a state. Lets callers
    /// that schedule sessions later (the bracket scheduler) reject a bad
    /// config up front instead of failing mid-schedule.
    pub fn validate_config(&self, config: &serde_json::Value) -> Result<(), GameError> {
        match self {
            GameKind::Rps => rps::RpsConfig::parse(config).map(|_| ()),
        }
    }

    /// Build the starting state, validating configuration and participant
    /// arity.
    pub fn initial_state(
        &self,
        participants: &[ParticipantId],
        config: &serde_json::Value,
    ) -> Result<GameState, GameError> {
        match self {
            GameKind::Rps => Ok(GameState::Rps(RpsState::new(participants, config)?)),
        }
    }
}
