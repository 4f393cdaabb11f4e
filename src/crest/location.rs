//! Adaptive character location polling.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::CrestHttp;
use crate::auth::events::EventBus;
use crate::auth::status::AuthState;
use crate::auth::AuthHeaderProvider;
use crate::error::SessionError;

pub const OFFLINE: &str = "Offline";

/// Where the character is, as far as the API will say.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Location {
    System(String),
    /// The location resource has no `solarSystem`: the character is not logged in.
    Offline,
}

impl Location {
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::System(name) => f.write_str(name),
            Self::Offline => f.write_str(OFFLINE),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LocationObservation {
    pub location: Location,
    pub observed_at: DateTime<Utc>,
}

impl LocationObservation {
    pub fn now(location: Location) -> Self {
        Self {
            location,
            observed_at: Utc::now(),
        }
    }
}

/// Change detection and interval selection, independent of any timer.
#[derive(Debug, Clone)]
pub struct LocationTracker {
    last: Option<Location>,
    online: Duration,
    offline: Duration,
    interval: Duration,
}

impl LocationTracker {
    pub fn new(online: Duration, offline: Duration) -> Self {
        Self {
            last: None,
            online,
            offline,
            interval: online,
        }
    }

    /// Carry over the last observation of a previous poller so a restart does
    /// not report an unchanged location again.
    pub fn with_last(mut self, last: Option<Location>) -> Self {
        if let Some(location) = &last {
            self.interval = if location.is_offline() {
                self.offline
            } else {
                self.online
            };
        }
        self.last = last;
        self
    }

    /// Record a fetch result. Returns `true` when it differs from the last
    /// observation (the first observation always counts as a change).
    pub fn observe(&mut self, location: &Location) -> bool {
        let changed = self.last.as_ref() != Some(location);
        if changed {
            self.last = Some(location.clone());
        }
        // The resource is cached server side for 5s; offline characters need
        // far less frequent checks.
        self.interval = if location.is_offline() {
            self.offline
        } else {
            self.online
        };
        changed
    }

    pub fn last(&self) -> Option<&Location> {
        self.last.as_ref()
    }

    /// Delay before the next fetch.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

#[derive(Debug, Deserialize)]
struct LocationDocument {
    #[serde(rename = "solarSystem")]
    solar_system: Option<SolarSystem>,
}

#[derive(Debug, Deserialize)]
struct SolarSystem {
    name: String,
}

pub async fn fetch_location(
    http: &CrestHttp,
    location_url: &str,
    authorization: &str,
) -> Result<Location, SessionError> {
    let document: LocationDocument = http.get_json(location_url, Some(authorization)).await?;
    Ok(match document.solar_system {
        Some(system) => Location::System(system.name),
        None => Location::Offline,
    })
}

/// Background task polling the location resource on an adaptive timer.
#[derive(Debug)]
pub struct LocationPoller {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl LocationPoller {
    /// Spawn the polling task. The first fetch happens immediately.
    ///
    /// The task stops when `parent` is cancelled or [`stop`](Self::stop) is called.
    pub fn start(
        http: CrestHttp,
        location_url: String,
        auth: Arc<dyn AuthHeaderProvider>,
        tracker: LocationTracker,
        events: EventBus,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let task = tokio::spawn(poll_loop(
            http,
            location_url,
            auth,
            tracker,
            events,
            cancel.clone(),
        ));
        Self {
            cancel,
            task: Some(task),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Cancel the timer. Calling it again is a no-op.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for LocationPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    http: CrestHttp,
    location_url: String,
    auth: Arc<dyn AuthHeaderProvider>,
    mut tracker: LocationTracker,
    events: EventBus,
    cancel: CancellationToken,
) {
    let mut delay = Duration::ZERO;
    let mut degraded = false;
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
        if degraded {
            events.set_state(AuthState::GettingCharacterPosition);
        }

        let result = match auth.authorization_header() {
            Ok(header) => fetch_location(&http, &location_url, &header).await,
            Err(e) => Err(e),
        };
        if cancel.is_cancelled() {
            break;
        }

        match result {
            Ok(location) => {
                let observation = LocationObservation::now(location);
                if tracker.observe(&observation.location) {
                    tracing::info!(location = %observation.location, "Character location changed");
                    events.location_changed(observation);
                } else {
                    events.location_observed(observation);
                }
                if degraded {
                    degraded = false;
                    events.set_state(AuthState::Connected);
                }
            }
            Err(e) => {
                // Keep polling at the previous interval.
                tracing::warn!(error = %e, "Location fetch failed");
                degraded = true;
                events.set_state(AuthState::Error);
            }
        }
        delay = tracker.interval();
    }
    tracing::debug!("Location poller stopped");
}
