//! Rock-Paper-Scissors, the minimal concrete game variant.
//!
//! Two participants submit a choice each round; the round resolves when both
//! have submitted. Rock beats scissors, scissors beats paper, paper beats
//! rock. A tied round replays without changing either score. The game ends
//! when one participant's round-win count reaches `rounds_to_win`.

use super::{GameError, GameLogic, Move, MoveOutcome, ParticipantId};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::fmt;

/// Validated RPS configuration.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RpsConfig {
    pub rounds_to_win: u32,
}

impl RpsConfig {
    /// Parse and validate a raw JSON config.
    pub(crate) fn parse(config: &serde_json::Value) -> Result<Self, GameError> {
        let config: RpsConfig = serde_json::from_value(config.clone())
            .map_err(|e| GameError::InvalidConfig(e.to_string()))?;
        if config.rounds_to_win < 1 {
            return Err(GameError::InvalidConfig(
                "rounds_to_win must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RpsChoice {
    Rock,
    Paper,
    Scissors,
}

impl RpsChoice {
    const ALL: [RpsChoice; 3] = [RpsChoice::Rock, RpsChoice::Paper, RpsChoice::Scissors];

    fn parse(mov: &str) -> Option<Self> {
        match mov {
            "rock" => Some(RpsChoice::Rock),
            "paper" => Some(RpsChoice::Paper),
            "scissors" => Some(RpsChoice::Scissors),
            _ => None,
        }
    }

    /// The choice this one defeats (rock > scissors > paper > rock).
    fn beats(self) -> RpsChoice {
        match self {
            RpsChoice::Rock => RpsChoice::Scissors,
            RpsChoice::Scissors => RpsChoice::Paper,
            RpsChoice::Paper => RpsChoice::Rock,
        }
    }
}

impl fmt::Display for RpsChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RpsChoice::Rock => "rock",
            RpsChoice::Paper => "paper",
            RpsChoice::Scissors => "scissors",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one completed round.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RoundRecord {
    pub round: u32,
    pub choices: BTreeMap<ParticipantId, RpsChoice>,
    /// `None` means the round tied and was replayed.
    pub winner: Option<ParticipantId>,
}

/// Full RPS game state.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct RpsState {
    participants: Vec<ParticipantId>,
    rounds_to_win: u32,
    round_number: u32,
    /// Choices submitted for the round in progress.
    pending: BTreeMap<ParticipantId, RpsChoice>,
    scores: BTreeMap<ParticipantId, u32>,
    rounds: Vec<RoundRecord>,
    winner: Option<ParticipantId>,
}

impl RpsState {
    pub fn new(
        participants: &[ParticipantId],
        config: &serde_json::Value,
    ) -> Result<Self, GameError> {
        if participants.len() != 2 {
            return Err(GameError::InvalidParticipants {
                expected: "exactly 2".to_string(),
                actual: participants.len(),
            });
        }
        if participants[0] == participants[1] {
            return Err(GameError::InvalidParticipants {
                expected: "2 distinct participants".to_string(),
                actual: 1,
            });
        }

        let config = RpsConfig::parse(config)?;

        Ok(Self {
            participants: participants.to_vec(),
            rounds_to_win: config.rounds_to_win,
            round_number: 1,
            pending: BTreeMap::new(),
            scores: participants.iter().map(|p| (p.clone(), 0)).collect(),
            rounds: Vec::new(),
            winner: None,
        })
    }

    pub fn score(&self, participant: &ParticipantId) -> u32 {
        self.scores.get(participant).copied().unwrap_or(0)
    }

    pub fn round_number(&self) -> u32 {
        self.round_number
    }

    pub fn rounds(&self) -> &[RoundRecord] {
        &self.rounds
    }

    /// Resolve a round once both choices are in; returns the round winner.
    fn resolve_round(&mut self) -> Option<ParticipantId> {
        let a = &self.participants[0];
        let b = &self.participants[1];
        let choice_a = self.pending[a];
        let choice_b = self.pending[b];

        let round_winner = if choice_a == choice_b {
            None
        } else if choice_a.beats() == choice_b {
            Some(a.clone())
        } else {
            Some(b.clone())
        };

        self.rounds.push(RoundRecord {
            round: self.round_number,
            choices: std::mem::take(&mut self.pending),
            winner: round_winner.clone(),
        });
        self.round_number += 1;

        if let Some(ref winner) = round_winner {
            let score = self.scores.entry(winner.clone()).or_insert(0);
            *score += 1;
            if *score >= self.rounds_to_win {
                self.winner = Some(winner.clone());
            }
        }

        round_winner
    }
}

impl GameLogic for RpsState {
    fn legal_moves(&self, participant: &ParticipantId) -> Vec<Move> {
        if self.is_terminal()
            || !self.participants.contains(participant)
            || self.pending.contains_key(participant)
        {
            return Vec::new();
        }
        RpsChoice::ALL.iter().map(|c| c.to_string()).collect()
    }

    fn apply_move(
        &mut self,
        participant: &ParticipantId,
        mov: &Move,
    ) -> Result<MoveOutcome, GameError> {
        if self.is_terminal() {
            return Err(GameError::IllegalMove("game is already over".to_string()));
        }
        if !self.participants.contains(participant) {
            return Err(GameError::IllegalMove(format!(
                "{participant} is not a participant in this game"
            )));
        }
        if self.pending.contains_key(participant) {
            return Err(GameError::IllegalMove(
                "already moved this round".to_string(),
            ));
        }
        let choice = RpsChoice::parse(mov)
            .ok_or_else(|| GameError::IllegalMove(format!("unrecognized move: {mov}")))?;

        self.pending.insert(participant.clone(), choice);

        if self.pending.len() == self.participants.len() {
            self.resolve_round();
        }

        Ok(MoveOutcome {
            terminal: self.is_terminal(),
            winner: self.winner.clone(),
        })
    }

    fn is_terminal(&self) -> bool {
        self.winner.is_some()
    }

    fn winner(&self) -> Option<ParticipantId> {
        self.winner.clone()
    }

    fn summary(&self) -> serde_json::Value {
        let awaiting: Vec<&ParticipantId> = self
            .participants
            .iter()
            .filter(|p| !self.pending.contains_key(*p))
            .collect();
        json!({
            "round": self.round_number,
            "rounds_to_win": self.rounds_to_win,
            "scores": self.scores,
            "awaiting": awaiting,
            "winner": self.winner,
        })
    }
}
