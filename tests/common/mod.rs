//! Shared test helpers: a wiremock stand-in for the SSO provider and CREST.
#![allow(dead_code)]

use std::time::Duration;

use crestwatch::auth::{AuthState, SessionEvent, SessionSnapshot};
use crestwatch::config::SessionConfig;
use serde_json::{json, Value};
use tokio::sync::{broadcast, watch};
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub const ACCESS_TOKEN: &str = "access-1";
pub const BEARER: &str = "Bearer access-1";
/// base64("client:secret")
pub const BASIC: &str = "Basic Y2xpZW50OnNlY3JldA==";
pub const CHARACTER_NAME: &str = "Ana Nobody";
pub const PORTRAIT: &[u8] = b"\x89PNG portrait";

const WAIT: Duration = Duration::from_secs(10);

pub struct CrestFixture {
    pub server: MockServer,
}

impl CrestFixture {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.server.uri())
    }

    /// Quiet, fast configuration pointed at the mock server.
    pub fn config(&self) -> SessionConfig {
        SessionConfig::new()
            .with_port(0)
            .with_public_url(self.url("/"))
            .with_token_url(self.url("/oauth/token"))
            .with_authorize_url(self.url("/oauth/authorize"))
            .with_request_timeout(Duration::from_secs(2))
            .with_retry_delay(Duration::from_millis(50))
            .with_login_timeout(Duration::from_secs(30))
            .with_poll_intervals(Duration::from_secs(60), Duration::from_secs(60))
            .with_warm_up(false)
    }

    pub fn public_root(&self) -> Value {
        json!({
            "decode": {"href": self.url("/decode/")},
            "authEndpoint": {"href": self.url("/oauth/token")},
            "serverName": "TRANQUILITY",
            "userCount": 31337
        })
    }

    pub fn public_root_mock(&self) -> Mock {
        Mock::given(method("GET"))
            .and(path("/"))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.public_root()))
    }

    pub async fn mount_public_root(&self) {
        self.public_root_mock().mount(&self.server).await;
    }

    pub fn token_mock(&self, grant_type: &str, body: Value) -> Mock {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(header("Authorization", BASIC))
            .and(body_string_contains(format!("grant_type={grant_type}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    }

    /// Decode, character, portrait and location resources.
    pub async fn mount_authenticated(&self, location: Value) {
        Mock::given(method("GET"))
            .and(path("/decode/"))
            .and(header("Authorization", BEARER))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "character": {"href": self.url("/characters/90000001/")}
            })))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/characters/90000001/"))
            .and(header("Authorization", BEARER))
            .respond_with(ResponseTemplate::new(200).set_body_json(self.character()))
            .mount(&self.server)
            .await;
        Mock::given(method("GET"))
            .and(path("/portraits/90000001_128.png"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PORTRAIT.to_vec()))
            .mount(&self.server)
            .await;
        self.location_mock(location).mount(&self.server).await;
    }

    pub fn character(&self) -> Value {
        json!({
            "name": CHARACTER_NAME,
            "portrait": {
                "32x32": {"href": self.url("/portraits/90000001_32.png")},
                "128x128": {"href": self.url("/portraits/90000001_128.png")}
            },
            "location": {"href": self.url("/characters/90000001/location/")}
        })
    }

    pub fn location_mock(&self, body: Value) -> Mock {
        Mock::given(method("GET"))
            .and(path("/characters/90000001/location/"))
            .and(header("Authorization", BEARER))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
    }
}

pub fn in_system(name: &str) -> Value {
    json!({"solarSystem": {"name": name, "href": "https://crest.example/solarsystems/30000142/"}})
}

pub fn offline() -> Value {
    json!({})
}

pub fn token_body(expires_in: u64, refresh_token: Option<&str>) -> Value {
    let mut body = json!({
        "access_token": ACCESS_TOKEN,
        "token_type": "Bearer",
        "expires_in": expires_in
    });
    if let Some(refresh) = refresh_token {
        body["refresh_token"] = json!(refresh);
    }
    body
}

/// Collect status changes until `last` is published.
pub async fn states_until(
    events: &mut broadcast::Receiver<SessionEvent>,
    last: AuthState,
) -> Vec<AuthState> {
    let mut states = Vec::new();
    let finished = tokio::time::timeout(WAIT, async {
        loop {
            match events.recv().await {
                Ok(SessionEvent::StatusChanged(state)) => {
                    states.push(state);
                    if state == last {
                        break;
                    }
                }
                Ok(_) => {}
                Err(e) => panic!("event stream ended: {e}"),
            }
        }
    })
    .await;
    assert!(finished.is_ok(), "timed out waiting for {last:?}, saw {states:?}");
    states
}

/// Next event matching `pick`, skipping everything else.
pub async fn next_matching<T>(
    events: &mut broadcast::Receiver<SessionEvent>,
    mut pick: impl FnMut(SessionEvent) -> Option<T>,
) -> T {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event stream ended");
            if let Some(value) = pick(event) {
                return value;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

pub async fn wait_for_snapshot(
    snapshot: &mut watch::Receiver<SessionSnapshot>,
    mut predicate: impl FnMut(&SessionSnapshot) -> bool,
) -> SessionSnapshot {
    tokio::time::timeout(WAIT, snapshot.wait_for(|snap| predicate(snap)))
        .await
        .expect("timed out waiting for snapshot")
        .expect("snapshot channel closed")
        .clone()
}
