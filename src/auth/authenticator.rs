//! The session worker: owns the token store, endpoint table, timers, the
//! redirect listener and the location poller, and drives [`AuthState`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::callback::{CallbackListener, PendingCallback};
use super::client::LoginAttempt;
use super::events::EventBus;
use super::exchange::{exchange_token, Grant};
use super::status::AuthState;
use super::token::SharedTokenStore;
use super::{AuthHeaderProvider, BrowserLauncher};
use crate::config::{Credentials, SessionConfig};
use crate::crest::character::{fetch_character, fetch_portrait};
use crate::crest::endpoints::{AUTH_ENDPOINT, DECODE};
use crate::crest::{CrestHttp, EndpointResolver, LocationPoller, LocationTracker};
use crate::error::SessionError;
use crate::util::retry::RetryPolicy;

/// Work for the worker. Each variant that starts a session generation carries
/// the token the client minted for it; the client cancels that token before
/// sending the next command.
pub(crate) enum Command {
    Configure {
        credentials: Credentials,
        generation: CancellationToken,
    },
    BeginLogin {
        reply: oneshot::Sender<Result<LoginAttempt, SessionError>>,
        generation: CancellationToken,
    },
    Logout(CancellationToken),
    Shutdown,
}

struct ActiveLogin {
    listener: CallbackListener,
    code: oneshot::Receiver<String>,
    deadline: Instant,
}

pub(crate) struct SessionWorker {
    config: SessionConfig,
    http: CrestHttp,
    resolver: EndpointResolver,
    tokens: SharedTokenStore,
    credentials: Option<Credentials>,
    events: EventBus,
    retry: RetryPolicy,
    browser: Arc<dyn BrowserLauncher>,
    commands: mpsc::Receiver<Command>,
    generation: CancellationToken,
    login: Option<ActiveLogin>,
    refresh_at: Option<Instant>,
    poller: Option<LocationPoller>,
}

impl SessionWorker {
    pub(crate) fn new(
        config: SessionConfig,
        http: CrestHttp,
        events: EventBus,
        browser: Arc<dyn BrowserLauncher>,
        commands: mpsc::Receiver<Command>,
        generation: CancellationToken,
    ) -> Self {
        let resolver = EndpointResolver::new(http.clone(), config.public_url.clone());
        let retry = RetryPolicy::new(config.retry_delay);
        Self {
            config,
            http,
            resolver,
            tokens: SharedTokenStore::new(),
            credentials: None,
            events,
            retry,
            browser,
            commands,
            generation,
            login: None,
            refresh_at: None,
            poller: None,
        }
    }

    pub(crate) async fn run(mut self) {
        if self.config.warm_up {
            self.warm_up().await;
        }
        loop {
            let login_deadline = self.login.as_ref().map(|login| login.deadline);
            let refresh_at = self.refresh_at;
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                code = next_code(&mut self.login) => match code {
                    Some(code) => self.on_authorization_code(code).await,
                    None => self.abandon_login("redirect listener exited").await,
                },
                _ = sleep_until(login_deadline) => self.abandon_login("no redirect before the login timeout").await,
                _ = sleep_until(refresh_at) => {
                    self.set_refresh(None);
                    self.refresh_via_token().await;
                }
            }
        }
        self.teardown().await;
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Configure {
                credentials,
                generation,
            } => {
                self.generation = generation;
                self.configure(credentials).await;
            }
            Command::BeginLogin { reply, generation } => {
                self.generation = generation;
                let result = self.begin_interactive_login().await;
                let _ = reply.send(result);
            }
            Command::Logout(generation) => {
                self.generation = generation;
                self.logout().await;
            }
            Command::Shutdown => {}
        }
    }

    /// Best-effort public endpoint load at startup; one attempt only.
    async fn warm_up(&mut self) {
        let previous = self.events.state();
        self.events.set_state(AuthState::ObtainingPublicEndpoints);
        if let Err(e) = self.resolver.load_public_endpoints().await {
            tracing::warn!(error = %e, "Public endpoint warmup failed, will retry on login");
        }
        self.events.set_state(previous);
    }

    async fn configure(&mut self, credentials: Credentials) {
        self.set_refresh(None);
        self.stop_poller();
        let refresh_token = credentials.refresh_token.clone();
        self.credentials = Some(credentials);
        match refresh_token {
            Some(token) => {
                self.tokens.write().set_refresh_token(token);
                self.refresh_via_token().await;
            }
            None => self.events.set_state(AuthState::WaitingForCredentials),
        }
    }

    async fn begin_interactive_login(&mut self) -> Result<LoginAttempt, SessionError> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            SessionError::Configuration("client id and secret are not configured".to_string())
        })?;
        self.stop_login().await;
        // Renewal and interactive login share the exchange path; no overlap.
        self.set_refresh(None);
        self.stop_poller();

        let (pending, code) = PendingCallback::new();
        let state = pending.expected_state().to_string();
        let listener = CallbackListener::start(self.config.port, pending).await?;
        let port = listener.port();
        let authorize_url = authorization_url(&self.config, &credentials.client_id, port, &state)?;
        if let Err(e) = self.browser.open(&authorize_url) {
            tracing::warn!(error = %e, "Could not open the browser");
        }
        self.events.set_state(AuthState::WaitingForHttpResponse);
        self.login = Some(ActiveLogin {
            listener,
            code,
            deadline: Instant::now() + self.config.login_timeout,
        });
        tracing::info!(port, "Waiting for SSO redirect");
        Ok(LoginAttempt {
            authorize_url,
            port,
        })
    }

    async fn on_authorization_code(&mut self, code: String) {
        self.stop_login().await;
        self.run_flow(Grant::AuthorizationCode(code)).await;
    }

    async fn refresh_via_token(&mut self) {
        let refresh_token = self.tokens.read().refresh_token().map(str::to_string);
        match refresh_token {
            Some(token) => self.run_flow(Grant::RefreshToken(token)).await,
            None => {
                tracing::warn!("No refresh token available, interactive login required");
                self.events.set_state(AuthState::WaitingForCredentials);
            }
        }
    }

    async fn abandon_login(&mut self, reason: &str) {
        tracing::info!(reason, "Abandoning SSO login attempt");
        self.stop_login().await;
        self.events.set_state(AuthState::WaitingForCredentials);
    }

    async fn logout(&mut self) {
        self.stop_login().await;
        self.set_refresh(None);
        self.stop_poller();
        self.tokens.write().clear();
        self.resolver.clear_authenticated();
        self.events.set_state(AuthState::WaitingForCredentials);
        self.events.reset_character();
        tracing::info!("Logged out");
    }

    async fn teardown(&mut self) {
        self.generation.cancel();
        self.stop_login().await;
        self.set_refresh(None);
        self.stop_poller();
        tracing::debug!("Session worker stopped");
    }

    /// Run a token exchange followed by the connect chain, swallowing the
    /// outcome into status events.
    async fn run_flow(&mut self, grant: Grant) {
        let cancel = self.generation.clone();
        match self.connect(grant, &cancel).await {
            Ok(()) => {}
            Err(SessionError::Cancelled) => tracing::debug!("Session flow cancelled"),
            Err(SessionError::GrantRejected { status }) => {
                tracing::warn!(status, "Grant rejected, interactive login required");
                self.tokens.write().clear();
                self.events.set_state(AuthState::WaitingForCredentials);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Session flow failed");
                self.events.set_state(AuthState::Error);
            }
        }
    }

    async fn connect(&mut self, grant: Grant, cancel: &CancellationToken) -> Result<(), SessionError> {
        let credentials = self.credentials.clone().ok_or_else(|| {
            SessionError::Configuration("client id and secret are not configured".to_string())
        })?;
        self.stop_poller();

        let exchange_state = match grant {
            Grant::AuthorizationCode(_) => AuthState::WaitingForHttpResponse,
            Grant::RefreshToken(_) => AuthState::AuthenticatingViaRefreshToken,
        };
        let token_url = self
            .resolver
            .get(AUTH_ENDPOINT)
            .unwrap_or(self.config.token_url.as_str())
            .to_string();
        let response = step(&self.retry, &self.events, exchange_state, cancel, || {
            exchange_token(&self.http, &token_url, &credentials, &grant)
        })
        .await?;
        ensure_active(cancel)?;

        let issued = {
            let mut tokens = self.tokens.write();
            match (&grant, response.refresh_token) {
                (Grant::AuthorizationCode(_), Some(refresh)) => {
                    tokens.set_from_code_exchange(response.access_token, refresh.clone(), response.expires_in);
                    Some(refresh)
                }
                (Grant::RefreshToken(_), Some(rotated)) => {
                    tokens.set_from_refresh_exchange(response.access_token, response.expires_in);
                    tokens.set_refresh_token(rotated.clone());
                    Some(rotated)
                }
                (_, None) => {
                    tokens.set_from_refresh_exchange(response.access_token, response.expires_in);
                    None
                }
            }
        };
        if let Some(token) = issued {
            self.events.refresh_token_issued(token);
        }
        let refresh_in = Duration::from_secs(self.tokens.read().seconds_until_refresh());
        self.set_refresh(Some(refresh_in));
        tracing::info!(refresh_in_secs = refresh_in.as_secs(), "Access token obtained");

        let authorization = self.tokens.authorization_header()?;
        if self.resolver.get(DECODE).is_none() {
            // Repair the public table in its own step so later retries keep it.
            let resolver = self.resolver.clone();
            self.resolver = step(
                &self.retry,
                &self.events,
                AuthState::ObtainingAuthenticatedEndpoints,
                cancel,
                || {
                    let mut resolver = resolver.clone();
                    async move {
                        resolver.load_public_endpoints().await?;
                        Ok::<_, SessionError>(resolver)
                    }
                },
            )
            .await?;
        }
        let resolver = self.resolver.clone();
        let (endpoints, resolver) = step(
            &self.retry,
            &self.events,
            AuthState::ObtainingAuthenticatedEndpoints,
            cancel,
            || {
                let mut resolver = resolver.clone();
                let authorization = authorization.clone();
                async move {
                    let endpoints = resolver.resolve_authenticated_endpoints(&authorization).await?;
                    Ok::<_, SessionError>((endpoints, resolver))
                }
            },
        )
        .await?;
        self.resolver = resolver;

        let character = step(&self.retry, &self.events, AuthState::GettingCharacterName, cancel, || {
            fetch_character(&self.http, &endpoints.character, &authorization)
        })
        .await?;
        let portrait = step(&self.retry, &self.events, AuthState::GettingCharacterPortrait, cancel, || {
            fetch_portrait(
                &self.http,
                &endpoints.character,
                &authorization,
                &self.config.portrait_size,
            )
        })
        .await?;
        ensure_active(cancel)?;

        self.events.set_state(AuthState::Connected);
        self.events.character_updated(character.name.clone(), portrait);
        tracing::info!(character = %character.name, "Connected");

        let tracker = LocationTracker::new(
            self.config.poll_interval_online,
            self.config.poll_interval_offline,
        )
        .with_last(self.events.snapshot().location.map(|obs| obs.location));
        self.poller = Some(LocationPoller::start(
            self.http.clone(),
            endpoints.location,
            Arc::new(self.tokens.clone()),
            tracker,
            self.events.clone(),
            cancel,
        ));
        Ok(())
    }

    fn set_refresh(&mut self, delay: Option<Duration>) {
        self.refresh_at = delay.map(|d| Instant::now() + d);
        self.events.refresh_scheduled(delay);
    }

    fn stop_poller(&mut self) {
        if let Some(mut poller) = self.poller.take() {
            poller.stop();
        }
    }

    async fn stop_login(&mut self) {
        if let Some(mut login) = self.login.take() {
            login.listener.stop().await;
        }
    }
}

/// Retry one remote step, publishing `state` before each attempt and
/// [`AuthState::Error`] after each retryable failure.
async fn step<T, F, Fut>(
    retry: &RetryPolicy,
    events: &EventBus,
    state: AuthState,
    cancel: &CancellationToken,
    mut operation: F,
) -> Result<T, SessionError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, SessionError>>,
{
    retry
        .run(
            cancel,
            |_| events.set_state(AuthState::Error),
            || {
                if events.state() != state {
                    events.set_state(state);
                }
                operation()
            },
        )
        .await
}

fn ensure_active(cancel: &CancellationToken) -> Result<(), SessionError> {
    if cancel.is_cancelled() {
        Err(SessionError::Cancelled)
    } else {
        Ok(())
    }
}

async fn next_code(login: &mut Option<ActiveLogin>) -> Option<String> {
    match login {
        Some(login) => (&mut login.code).await.ok(),
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Provider authorization page for a login attempt listening on `port`.
pub fn authorization_url(
    config: &SessionConfig,
    client_id: &str,
    port: u16,
    state: &str,
) -> Result<String, SessionError> {
    let redirect_uri = config.redirect_uri(port);
    let url = Url::parse_with_params(
        &config.authorize_url,
        &[
            ("response_type", "code"),
            ("redirect_uri", redirect_uri.as_str()),
            ("client_id", client_id),
            ("scope", config.scope.as_str()),
            ("state", state),
        ],
    )
    .map_err(|e| SessionError::Configuration(format!("invalid authorize url: {e}")))?;
    Ok(url.to_string())
}
