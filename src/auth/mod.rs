//! SSO authorization-code and refresh-token flows, session state and the
//! observer surface.

pub mod authenticator;
pub mod callback;
pub mod client;
pub mod events;
pub mod exchange;
pub mod status;
pub mod token;

pub use callback::{CallbackListener, PendingCallback};
pub use client::{LoginAttempt, SessionClient};
pub use events::{EventBus, SessionEvent, SessionSnapshot};
pub use exchange::{Grant, TokenResponse};
pub use status::AuthState;
pub use token::{SharedTokenStore, TokenStore};

use crate::error::SessionError;

/// Read-only access to the current bearer header, injected into components
/// that call authenticated endpoints but must not mutate the session.
pub trait AuthHeaderProvider: Send + Sync {
    fn authorization_header(&self) -> Result<String, SessionError>;
}

/// Opens the provider's authorization page for the user.
pub trait BrowserLauncher: Send + Sync {
    fn open(&self, url: &str) -> Result<(), SessionError>;
}

/// Launcher that only logs the URL; the caller shows it to the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogBrowser;

impl BrowserLauncher for LogBrowser {
    fn open(&self, url: &str) -> Result<(), SessionError> {
        tracing::info!(%url, "Open this URL to log in");
        Ok(())
    }
}
