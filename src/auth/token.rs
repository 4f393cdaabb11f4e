use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use tokio::time::Instant;

use super::AuthHeaderProvider;
use crate::error::SessionError;

/// Renew the access token this many seconds before it expires.
pub const REFRESH_MARGIN_SECS: u64 = 30;

/// In-memory OAuth session: access token, refresh token and expiry.
///
/// Only the session worker mutates it; the endpoint resolver and location
/// poller read it through [`AuthHeaderProvider`](crate::auth::AuthHeaderProvider).
#[derive(Debug, Clone, Default)]
pub struct TokenStore {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<Instant>,
    expires_in: u64,
}

impl TokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the session with the result of an authorization-code exchange.
    pub fn set_from_code_exchange(
        &mut self,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        expires_in_secs: u64,
    ) {
        *self = Self {
            access_token: Some(access_token.into()),
            refresh_token: Some(refresh_token.into()),
            expires_at: Some(Instant::now() + Duration::from_secs(expires_in_secs)),
            expires_in: expires_in_secs,
        };
    }

    /// Replace the access token after a refresh-token exchange. The refresh
    /// token itself is kept.
    pub fn set_from_refresh_exchange(&mut self, access_token: impl Into<String>, expires_in_secs: u64) {
        *self = Self {
            access_token: Some(access_token.into()),
            refresh_token: self.refresh_token.take(),
            expires_at: Some(Instant::now() + Duration::from_secs(expires_in_secs)),
            expires_in: expires_in_secs,
        };
    }

    /// Seed the refresh token supplied by a collaborator before any exchange.
    pub fn set_refresh_token(&mut self, refresh_token: impl Into<String>) {
        self.refresh_token = Some(refresh_token.into());
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn refresh_token(&self) -> Option<&str> {
        self.refresh_token.as_deref()
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.expires_at
    }

    /// `"Bearer <access token>"`.
    pub fn authorization_header_value(&self) -> Result<String, SessionError> {
        self.access_token
            .as_ref()
            .map(|token| format!("Bearer {token}"))
            .ok_or(SessionError::NotAuthenticated)
    }

    /// Whether the access token is still valid for at least `margin`.
    pub fn is_fresh(&self, margin: Duration) -> bool {
        match (self.access_token.as_ref(), self.expires_at) {
            (Some(_), Some(expires_at)) => Instant::now() + margin < expires_at,
            _ => false,
        }
    }

    /// Seconds from the last exchange until the token should be renewed,
    /// never negative.
    pub fn seconds_until_refresh(&self) -> u64 {
        self.expires_in.saturating_sub(REFRESH_MARGIN_SECS)
    }
}

/// Session shared between the worker (sole writer) and read-only consumers.
#[derive(Debug, Clone, Default)]
pub struct SharedTokenStore {
    inner: Arc<RwLock<TokenStore>>,
}

impl SharedTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&self) -> RwLockReadGuard<'_, TokenStore> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, TokenStore> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthHeaderProvider for SharedTokenStore {
    fn authorization_header(&self) -> Result<String, SessionError> {
        self.read().authorization_header_value()
    }
}
