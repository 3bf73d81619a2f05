//! Game sessions and the concurrent session registry.

pub mod models;
pub mod registry;

pub use models::{MoveRecord, Session, SessionId, SessionSnapshot, SessionStatus};
pub use registry::{SessionError, SessionRegistry, SessionResult};
