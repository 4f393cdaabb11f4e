//! Events and snapshots published to session observers.

use std::time::Duration;

use tokio::sync::{broadcast, watch};

use super::status::AuthState;
use crate::crest::location::LocationObservation;

pub const NO_CHARACTER: &str = "No character";

const EVENT_BUFFER: usize = 64;

/// Notifications fanned out to every subscriber.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    StatusChanged(AuthState),
    CharacterInfoUpdated { name: String, portrait: Vec<u8> },
    LocationChanged(String),
    /// A new refresh token was issued; collaborators may persist it.
    RefreshTokenIssued(String),
}

/// Point-in-time view of the session, kept current for late observers.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: AuthState,
    pub character_name: String,
    /// Raw image bytes; empty means the blank portrait.
    pub portrait: Vec<u8>,
    pub location: Option<LocationObservation>,
    /// Delay of the currently armed token renewal, if any.
    pub refresh_scheduled_in: Option<Duration>,
}

impl Default for SessionSnapshot {
    fn default() -> Self {
        Self {
            state: AuthState::Blank,
            character_name: NO_CHARACTER.to_string(),
            portrait: Vec::new(),
            location: None,
            refresh_scheduled_in: None,
        }
    }
}

/// Publisher side of the observer mechanism.
///
/// Publishing never blocks: events go to a bounded broadcast buffer and slow
/// subscribers lose the oldest entries.
#[derive(Debug, Clone)]
pub struct EventBus {
    events: broadcast::Sender<SessionEvent>,
    snapshot: watch::Sender<SessionSnapshot>,
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_BUFFER);
        let (snapshot, _) = watch::channel(SessionSnapshot::default());
        Self { events, snapshot }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> AuthState {
        self.snapshot.borrow().state
    }

    pub fn set_state(&self, state: AuthState) {
        tracing::debug!(%state, "Session status changed");
        self.snapshot.send_modify(|snap| snap.state = state);
        self.publish(SessionEvent::StatusChanged(state));
    }

    pub fn character_updated(&self, name: String, portrait: Vec<u8>) {
        self.snapshot.send_modify(|snap| {
            snap.character_name = name.clone();
            snap.portrait = portrait.clone();
        });
        self.publish(SessionEvent::CharacterInfoUpdated { name, portrait });
    }

    pub fn location_changed(&self, observation: LocationObservation) {
        let label = observation.location.to_string();
        self.snapshot
            .send_modify(|snap| snap.location = Some(observation));
        self.publish(SessionEvent::LocationChanged(label));
    }

    /// Record an observation that did not change the location.
    pub fn location_observed(&self, observation: LocationObservation) {
        self.snapshot
            .send_modify(|snap| snap.location = Some(observation));
    }

    pub fn refresh_token_issued(&self, token: String) {
        self.publish(SessionEvent::RefreshTokenIssued(token));
    }

    pub fn refresh_scheduled(&self, delay: Option<Duration>) {
        self.snapshot
            .send_modify(|snap| snap.refresh_scheduled_in = delay);
    }

    /// Drop character identity and location, back to the sentinels.
    pub fn reset_character(&self) {
        self.snapshot.send_modify(|snap| {
            snap.character_name = NO_CHARACTER.to_string();
            snap.portrait.clear();
            snap.location = None;
        });
        self.publish(SessionEvent::CharacterInfoUpdated {
            name: NO_CHARACTER.to_string(),
            portrait: Vec::new(),
        });
    }

    fn publish(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
