use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::authenticator::{Command, SessionWorker};
use super::events::{EventBus, SessionEvent, SessionSnapshot};
use super::status::AuthState;
use super::{BrowserLauncher, LogBrowser};
use crate::config::{Credentials, SessionConfig};
use crate::crest::CrestHttp;
use crate::error::SessionError;

const COMMAND_BUFFER: usize = 16;

/// A started interactive login: the page to open and where the redirect lands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginAttempt {
    pub authorize_url: String,
    pub port: u16,
}

/// Handle to a background session worker.
///
/// All network I/O happens on the worker task; methods here only enqueue
/// commands, so a UI thread is never blocked by the remote service. Progress
/// is observed through [`subscribe`](Self::subscribe) and
/// [`watch_snapshot`](Self::watch_snapshot).
///
/// # Example
/// ```no_run
/// use crestwatch::auth::SessionClient;
/// use crestwatch::config::{Credentials, SessionConfig};
///
/// # async fn example() -> crestwatch::error::Result<()> {
/// let client = SessionClient::spawn(SessionConfig::from_env())?;
/// let mut events = client.subscribe();
/// client.configure(Credentials::new("client-id", "secret")).await?;
/// let attempt = client.begin_interactive_login().await?;
/// println!("Log in at {}", attempt.authorize_url);
/// while let Ok(event) = events.recv().await {
///     println!("{event:?}");
/// }
/// # Ok(())
/// # }
/// ```
pub struct SessionClient {
    commands: mpsc::Sender<Command>,
    events: EventBus,
    /// Token of the most recently sent command; held across the send so the
    /// worker sees generations in the order they were minted.
    generation: Mutex<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

impl SessionClient {
    /// Spawn the worker on the current tokio runtime.
    pub fn spawn(config: SessionConfig) -> Result<Self, SessionError> {
        Self::spawn_with_browser(config, Arc::new(LogBrowser))
    }

    pub fn spawn_with_browser(
        config: SessionConfig,
        browser: Arc<dyn BrowserLauncher>,
    ) -> Result<Self, SessionError> {
        let http = CrestHttp::new(&config)?;
        let events = EventBus::new();
        let generation = CancellationToken::new();
        let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
        let worker =
            SessionWorker::new(config, http, events.clone(), browser, rx, generation.clone());
        let handle = tokio::spawn(worker.run());
        Ok(Self {
            commands: tx,
            events,
            generation: Mutex::new(generation),
            worker: Some(handle),
        })
    }

    /// Supply client credentials. With a stored refresh token the refresh
    /// flow starts right away, otherwise the session waits for
    /// [`begin_interactive_login`](Self::begin_interactive_login).
    pub async fn configure(&self, credentials: Credentials) -> Result<(), SessionError> {
        self.send(|generation| Command::Configure {
            credentials,
            generation,
        })
        .await
    }

    /// Start the redirect listener and return the authorization URL.
    ///
    /// Fails with [`SessionError::Bind`] when the local port is taken; the
    /// caller may simply try again.
    pub async fn begin_interactive_login(&self) -> Result<LoginAttempt, SessionError> {
        let (reply, response) = oneshot::channel();
        self.send(|generation| Command::BeginLogin { reply, generation })
            .await?;
        response.await.map_err(|_| worker_gone())?
    }

    /// Stop every timer, drop the session and wait for new credentials.
    pub async fn logout(&self) -> Result<(), SessionError> {
        self.send(Command::Logout).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn watch_snapshot(&self) -> watch::Receiver<SessionSnapshot> {
        self.events.watch_snapshot()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.events.snapshot()
    }

    pub fn status(&self) -> AuthState {
        self.events.state()
    }

    /// Cancel outstanding work and wait for the worker to exit.
    pub async fn shutdown(mut self) {
        self.generation.get_mut().cancel();
        let _ = self.commands.send(Command::Shutdown).await;
        if let Some(worker) = self.worker.take() {
            let _ = worker.await;
        }
    }

    /// Cancel the running flow, so its retry loop exits between attempts, and
    /// send `command` carrying the token of the generation it starts.
    async fn send(
        &self,
        command: impl FnOnce(CancellationToken) -> Command,
    ) -> Result<(), SessionError> {
        let mut current = self.generation.lock().await;
        current.cancel();
        *current = CancellationToken::new();
        self.commands
            .send(command(current.clone()))
            .await
            .map_err(|_| worker_gone())
    }
}

impl Drop for SessionClient {
    fn drop(&mut self) {
        // Dropping the command sender ends the worker loop.
        self.generation.get_mut().cancel();
    }
}

fn worker_gone() -> SessionError {
    SessionError::Configuration("session worker has stopped".to_string())
}
