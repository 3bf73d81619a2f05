//! Elimination tournaments: bracket model and scheduling.

pub mod models;
pub mod scheduler;

pub use models::{
    Bracket, BracketFormat, BracketId, BracketStatus, DrawPolicy, Match, MatchId, MatchSlot,
    MatchStatus, Round, Seeding, TournamentConfig,
};
pub use scheduler::{BracketError, BracketResult, BracketScheduler};
