//! Error types for crestwatch.

use thiserror::Error;

/// Primary error type for all session operations.
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Could not bind callback listener on port {port}: {message}")]
    Bind { port: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Endpoint discovery failed: {0}")]
    Discovery(String),

    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Redirect state did not match the pending login")]
    StateCorrelationMismatch,

    #[error("Token endpoint rejected the grant (status {status})")]
    GrantRejected { status: u16 },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SessionError {
    /// Whether the retry policy should try the failed call again.
    ///
    /// Transport and protocol failures are assumed to be transient: the remote
    /// service is expected to recover eventually.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_) | Self::Protocol(_) | Self::Discovery(_)
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

impl From<reqwest::Error> for SessionError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::Protocol(error.to_string())
        } else {
            Self::Transport(error.to_string())
        }
    }
}

impl From<serde_json::Error> for SessionError {
    fn from(error: serde_json::Error) -> Self {
        Self::Protocol(error.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_and_protocol_errors_are_retryable() {
        assert!(SessionError::Transport("reset".into()).is_retryable());
        assert!(SessionError::Protocol("bad json".into()).is_retryable());
        assert!(SessionError::Discovery("no decode".into()).is_retryable());
    }

    #[test]
    fn local_failures_are_not_retryable() {
        let bind = SessionError::Bind {
            port: 4173,
            message: "in use".into(),
        };
        assert!(!bind.is_retryable());
        assert!(!SessionError::NotAuthenticated.is_retryable());
        assert!(!SessionError::GrantRejected { status: 400 }.is_retryable());
        assert!(!SessionError::Cancelled.is_retryable());
    }

    #[test]
    fn serde_errors_map_to_protocol() {
        let err = serde_json::from_str::<serde_json::Value>("{nope").unwrap_err();
        assert!(matches!(SessionError::from(err), SessionError::Protocol(_)));
    }
}
