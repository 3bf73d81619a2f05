//! Event fan-out for session and tournament state changes.
//!
//! Producers (the session registry and the bracket scheduler) publish onto
//! named channels; observers subscribe with a bounded mpsc sender. Publishing
//! is fire-and-forget: a full subscriber queue drops that one delivery, a
//! closed subscriber is removed, and the publisher never blocks on a slow
//! consumer. Within one channel, every subscriber sees events in publish
//! order. Delivery is at-least-once overall, so consumers must tolerate
//! duplicates.

use crate::bracket::BracketId;
use crate::game::{Move, ParticipantId};
use crate::session::SessionId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::{RwLock, mpsc};
use uuid::Uuid;

/// Handle identifying one observer across subscriptions.
pub type ObserverId = Uuid;

/// Fan-out channel key: one channel per session, one per bracket.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ChannelKey {
    Session(SessionId),
    Bracket(BracketId),
}

/// Events emitted by the engine, consumed by the real-time delivery layer
/// and by the bracket scheduler itself.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum EngineEvent {
    SessionCreated {
        session_id: SessionId,
    },
    MoveApplied {
        session_id: SessionId,
        participant: ParticipantId,
        mov: Move,
        summary: serde_json::Value,
    },
    SessionCompleted {
        session_id: SessionId,
        /// `None` means the session ended in a draw.
        winner: Option<ParticipantId>,
    },
    BracketRoundAdvanced {
        bracket_id: BracketId,
        round_number: u32,
    },
    BracketCompleted {
        bracket_id: BracketId,
        champion: ParticipantId,
    },
}

/// Publish/subscribe hub decoupling producers from observers.
#[derive(Default)]
pub struct EventHub {
    channels: RwLock<HashMap<ChannelKey, HashMap<ObserverId, mpsc::Sender<EngineEvent>>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe `observer` to `channel`. Subscribing an already-subscribed
    /// observer replaces its sender and is otherwise a no-op.
    pub async fn subscribe(
        &self,
        channel: ChannelKey,
        observer: ObserverId,
        sender: mpsc::Sender<EngineEvent>,
    ) {
        let mut channels = self.channels.write().await;
        channels.entry(channel).or_default().insert(observer, sender);
        log::debug!("observer {observer} subscribed to {channel:?}");
    }

    /// Unsubscribe `observer` from `channel`; unsubscribing a non-member is a
    /// no-op. The channel entry is dropped with its last subscriber.
    pub async fn unsubscribe(&self, channel: ChannelKey, observer: ObserverId) {
        let mut channels = self.channels.write().await;
        if let Some(subscribers) = channels.get_mut(&channel) {
            subscribers.remove(&observer);
            if subscribers.is_empty() {
                channels.remove(&channel);
            }
        }
    }

    /// Deliver `event` to every current subscriber of `channel`.
    ///
    /// Subscribers whose queue is full miss this delivery; subscribers whose
    /// receiver is gone are unsubscribed.
    pub async fn publish(&self, channel: ChannelKey, event: EngineEvent) {
        let mut channels = self.channels.write().await;
        let Some(subscribers) = channels.get_mut(&channel) else {
            return;
        };
        subscribers.retain(|observer, sender| match sender.try_send(event.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                log::warn!("observer {observer} queue full on {channel:?}, dropping event");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                log::debug!("observer {observer} disconnected from {channel:?}, removing");
                false
            }
        });
        if subscribers.is_empty() {
            channels.remove(&channel);
        }
    }

    /// Number of subscribers currently on `channel`.
    pub async fn subscriber_count(&self, channel: ChannelKey) -> usize {
        let channels = self.channels.read().await;
        channels.get(&channel).map_or(0, HashMap::len)
    }
}
