//! Crestwatch: EVE Online CREST single sign-on session client.
//!
//! Runs the OAuth2 authorization-code and refresh-token flows against the SSO
//! provider, discovers the authenticated CREST endpoints, fetches the
//! character's name and portrait, and polls the character's solar system on
//! an adaptive timer. All network work happens on a background task; callers
//! observe progress through events and a snapshot channel.
//!
//! # Quick Start
//!
//! ```no_run
//! use crestwatch::prelude::*;
//!
//! # async fn example() -> crestwatch::error::Result<()> {
//! let client = SessionClient::spawn(SessionConfig::from_env())?;
//! client
//!     .configure(Credentials::new("client-id", "secret").with_refresh_token("stored"))
//!     .await?;
//! let mut snapshot = client.watch_snapshot();
//! while snapshot.changed().await.is_ok() {
//!     let current = snapshot.borrow().clone();
//!     println!("{} ({})", current.state, current.character_name);
//! }
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod crest;
pub mod error;
pub mod prelude;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;
