//! Tests for the adaptive location poller against a mocked location resource.

mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::*;
use crestwatch::auth::{AuthHeaderProvider, AuthState, EventBus, SessionEvent};
use crestwatch::crest::location::fetch_location;
use crestwatch::crest::{CrestHttp, Location, LocationPoller, LocationTracker};
use crestwatch::error::SessionError;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, Request, Respond, ResponseTemplate};

const FAST: Duration = Duration::from_millis(50);

struct StaticHeader;

impl AuthHeaderProvider for StaticHeader {
    fn authorization_header(&self) -> Result<String, SessionError> {
        Ok(BEARER.to_string())
    }
}

/// Serves the given responses in order, repeating the last one.
struct Sequence {
    responses: Vec<ResponseTemplate>,
    next: AtomicUsize,
}

impl Sequence {
    fn new(responses: Vec<ResponseTemplate>) -> Self {
        Self {
            responses,
            next: AtomicUsize::new(0),
        }
    }
}

impl Respond for Sequence {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        let index = self.next.fetch_add(1, Ordering::SeqCst);
        self.responses[index.min(self.responses.len() - 1)].clone()
    }
}

fn json(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

fn start_poller(crest: &CrestFixture, events: &EventBus, cancel: &CancellationToken) -> LocationPoller {
    let http = CrestHttp::new(&crest.config()).unwrap();
    LocationPoller::start(
        http,
        crest.url("/characters/90000001/location/"),
        Arc::new(StaticHeader),
        LocationTracker::new(FAST, FAST),
        events.clone(),
        cancel,
    )
}

fn location_events(events: &[SessionEvent]) -> Vec<SessionEvent> {
    events
        .iter()
        .filter(|event| {
            matches!(
                event,
                SessionEvent::LocationChanged(_) | SessionEvent::StatusChanged(_)
            )
        })
        .cloned()
        .collect()
}

#[tokio::test]
async fn missing_solar_system_means_offline() {
    let crest = CrestFixture::start().await;
    crest.location_mock(offline()).mount(&crest.server).await;
    let http = CrestHttp::new(&crest.config()).unwrap();

    let location = fetch_location(&http, &crest.url("/characters/90000001/location/"), BEARER)
        .await
        .unwrap();

    assert_eq!(location, Location::Offline);
    assert_eq!(location.to_string(), "Offline");
}

#[tokio::test]
async fn poller_announces_changes_and_recovers_from_errors() {
    let crest = CrestFixture::start().await;
    Mock::given(method("GET"))
        .and(path("/characters/90000001/location/"))
        .respond_with(Sequence::new(vec![
            json(in_system("Jita")),
            json(in_system("Jita")),
            ResponseTemplate::new(503),
            json(in_system("Jita")),
            json(offline()),
            json(in_system("Amarr")),
        ]))
        .mount(&crest.server)
        .await;
    let events = EventBus::new();
    events.set_state(AuthState::Connected);
    let mut rx = events.subscribe();
    let cancel = CancellationToken::new();

    let mut poller = start_poller(&crest, &events, &cancel);
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(10), async {
        while seen.last() != Some(&SessionEvent::LocationChanged("Amarr".to_string())) {
            seen.push(rx.recv().await.unwrap());
        }
    })
    .await
    .expect("poller never reached Amarr");
    poller.stop();

    assert_eq!(
        location_events(&seen),
        vec![
            SessionEvent::LocationChanged("Jita".to_string()),
            SessionEvent::StatusChanged(AuthState::Error),
            SessionEvent::StatusChanged(AuthState::GettingCharacterPosition),
            SessionEvent::StatusChanged(AuthState::Connected),
            SessionEvent::LocationChanged("Offline".to_string()),
            SessionEvent::LocationChanged("Amarr".to_string()),
        ]
    );
    assert_eq!(
        events.snapshot().location.map(|obs| obs.location),
        Some(Location::System("Amarr".to_string()))
    );
}

#[tokio::test]
async fn stop_cancels_further_polls() {
    let crest = CrestFixture::start().await;
    crest
        .location_mock(in_system("Jita"))
        .mount(&crest.server)
        .await;
    let events = EventBus::new();
    let cancel = CancellationToken::new();

    let mut poller = start_poller(&crest, &events, &cancel);
    tokio::time::sleep(FAST * 3).await;
    assert!(poller.is_running());
    poller.stop();
    poller.stop();
    tokio::time::sleep(FAST).await;
    let after_stop = crest.server.received_requests().await.unwrap().len();

    tokio::time::sleep(FAST * 4).await;
    assert!(!poller.is_running());
    assert_eq!(crest.server.received_requests().await.unwrap().len(), after_stop);
}

#[tokio::test]
async fn parent_cancellation_stops_the_poller() {
    let crest = CrestFixture::start().await;
    crest
        .location_mock(in_system("Jita"))
        .mount(&crest.server)
        .await;
    let events = EventBus::new();
    let cancel = CancellationToken::new();

    let poller = start_poller(&crest, &events, &cancel);
    tokio::time::sleep(FAST * 2).await;
    cancel.cancel();
    tokio::time::sleep(FAST * 2).await;

    assert!(!poller.is_running());
}
