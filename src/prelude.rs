//! Convenience re-exports for common use.

pub use crate::auth::{AuthState, LoginAttempt, SessionClient, SessionEvent, SessionSnapshot};
pub use crate::config::{Credentials, SessionConfig};
pub use crate::crest::{Location, LocationObservation};
pub use crate::error::{Result, SessionError};
