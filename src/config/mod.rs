//! Session configuration (layered: code > env > defaults).
//!
//! The core never reads or writes persistent settings on its own. Collaborators
//! hand it a [`SessionConfig`] and [`Credentials`] when the session is spawned
//! and configured.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

pub const DEFAULT_PORT: u16 = 4173;
pub const DEFAULT_USER_AGENT: &str = "crestwatch";
pub const DEFAULT_AUTHORIZE_URL: &str = "https://login.eveonline.com/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://login.eveonline.com/oauth/token";
pub const DEFAULT_PUBLIC_URL: &str = "https://crest-tq.eveonline.com";
pub const DEFAULT_SCOPE: &str = "characterLocationRead";

/// Runtime settings for a session worker.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Local port for the SSO redirect listener. `0` picks an ephemeral port.
    pub port: u16,
    pub user_agent: String,
    pub authorize_url: String,
    pub token_url: String,
    pub public_url: String,
    pub scope: String,
    /// Per-request timeout for every remote call.
    pub request_timeout: Duration,
    /// Fixed delay between retries of a failed remote call.
    pub retry_delay: Duration,
    /// How long the redirect listener waits before the login attempt is abandoned.
    pub login_timeout: Duration,
    pub poll_interval_online: Duration,
    pub poll_interval_offline: Duration,
    pub portrait_size: String,
    /// Load the public endpoint table once when the worker starts.
    pub warm_up: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            user_agent: DEFAULT_USER_AGENT.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
            public_url: DEFAULT_PUBLIC_URL.to_string(),
            scope: DEFAULT_SCOPE.to_string(),
            request_timeout: Duration::from_secs(10),
            retry_delay: Duration::from_secs(5),
            login_timeout: Duration::from_secs(60),
            poll_interval_online: Duration::from_secs(5),
            poll_interval_offline: Duration::from_secs(60),
            portrait_size: "128x128".to_string(),
            warm_up: true,
        }
    }
}

impl SessionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load overrides from environment variables (and `.env` if present).
    pub fn from_env() -> Self {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error
        let mut config = Self::new();

        if let Some(port) = env_var("CRESTWATCH_PORT").and_then(|p| p.parse().ok()) {
            config.port = port;
        }
        if let Some(agent) = env_var("CRESTWATCH_USER_AGENT") {
            config.user_agent = agent;
        }
        if let Some(url) = env_var("CRESTWATCH_PUBLIC_URL") {
            config.public_url = url;
        }
        if let Some(url) = env_var("CRESTWATCH_AUTHORIZE_URL") {
            config.authorize_url = url;
        }
        if let Some(url) = env_var("CRESTWATCH_TOKEN_URL") {
            config.token_url = url;
        }
        config
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_authorize_url(mut self, url: impl Into<String>) -> Self {
        self.authorize_url = url.into();
        self
    }

    pub fn with_token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }

    pub fn with_public_url(mut self, url: impl Into<String>) -> Self {
        self.public_url = url.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_login_timeout(mut self, timeout: Duration) -> Self {
        self.login_timeout = timeout;
        self
    }

    pub fn with_poll_intervals(mut self, online: Duration, offline: Duration) -> Self {
        self.poll_interval_online = online;
        self.poll_interval_offline = offline;
        self
    }

    pub fn with_warm_up(mut self, warm_up: bool) -> Self {
        self.warm_up = warm_up;
        self
    }

    pub fn redirect_uri(&self, port: u16) -> String {
        format!("http://localhost:{port}/")
    }
}

/// Application credentials registered with the SSO provider.
#[derive(Clone, Default)]
pub struct Credentials {
    pub client_id: String,
    pub secret: String,
    /// Previously issued refresh token, if the collaborator stored one.
    pub refresh_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("client_id", &self.client_id)
            .field("secret", &"..")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| ".."))
            .finish()
    }
}

impl Credentials {
    pub fn new(client_id: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            secret: secret.into(),
            refresh_token: None,
        }
    }

    /// Attach a stored refresh token. Empty strings are treated as absent.
    pub fn with_refresh_token(mut self, token: impl Into<String>) -> Self {
        let token = token.into();
        self.refresh_token = if token.trim().is_empty() {
            None
        } else {
            Some(token)
        };
        self
    }

    /// Read `CRESTWATCH_CLIENT_ID`, `CRESTWATCH_SECRET` and
    /// `CRESTWATCH_REFRESH_TOKEN`. Returns `None` without a client id and secret.
    pub fn from_env() -> Option<Self> {
        let _ = dotenvy::dotenv();
        let client_id = env_var("CRESTWATCH_CLIENT_ID")?;
        let secret = env_var("CRESTWATCH_SECRET")?;
        let mut credentials = Self::new(client_id, secret);
        if let Some(token) = env_var("CRESTWATCH_REFRESH_TOKEN") {
            credentials = credentials.with_refresh_token(token);
        }
        Some(credentials)
    }

    /// `Authorization` header value for the token endpoint.
    pub fn basic_authorization(&self) -> String {
        let raw = format!("{}:{}", self.client_id, self.secret);
        format!("Basic {}", STANDARD.encode(raw.as_bytes()))
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
