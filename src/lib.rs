//! # Chip Engine
//!
//! A game-session and tournament-scheduling engine for bot competitions.
//!
//! Remote bots play turn-based games against each other through whatever API
//! layer sits in front of this crate; the engine owns the parts with real
//! algorithmic and concurrency content:
//!
//! - [`game`]: polymorphic turn-based game variants behind one capability
//!   interface (Rock-Paper-Scissors is the bundled concrete variant)
//! - [`session`]: the concurrent session registry, which serializes moves
//!   per session while unrelated sessions run fully in parallel
//! - [`bracket`]: the single-elimination bracket generator and
//!   round-advancement scheduler
//! - [`events`]: publish/subscribe fan-out keeping observers synchronized
//!   with session and tournament state
//! - [`history`]: the best-effort move audit seam
//!
//! Everything is in-memory; persistence, authentication, rate limiting, and
//! transport are external collaborators.
//!
//! ## Example
//!
//! ```no_run
//! use chip_engine::{EventHub, SessionRegistry};
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), chip_engine::SessionError> {
//! let hub = Arc::new(EventHub::new());
//! let registry = SessionRegistry::new(hub);
//! let session_id = registry
//!     .create(
//!         "rps",
//!         vec!["alice".into(), "bob".into()],
//!         &serde_json::json!({"rounds_to_win": 2}),
//!     )
//!     .await?;
//! registry.apply_move(session_id, &"alice".into(), &"rock".into()).await?;
//! # Ok(())
//! # }
//! ```

/// Game variant interface and registered variants.
pub mod game;
pub use game::{GameError, GameKind, GameLogic, GameState, Move, MoveOutcome, ParticipantId};

/// Sessions and the concurrent session registry.
pub mod session;
pub use session::{
    MoveRecord, Session, SessionError, SessionId, SessionRegistry, SessionSnapshot, SessionStatus,
};

/// Event fan-out.
pub mod events;
pub use events::{ChannelKey, EngineEvent, EventHub, ObserverId};

/// Elimination tournaments.
pub mod bracket;
pub use bracket::{
    Bracket, BracketError, BracketFormat, BracketId, BracketScheduler, BracketStatus, DrawPolicy,
    Match, MatchId, MatchSlot, MatchStatus, Round, Seeding, TournamentConfig,
};

/// Best-effort move history sink.
pub mod history;
pub use history::{HistorySink, MemoryHistory, NoopHistory};
