//! CLI handlers for `watch` and `forget`.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::time::Instant;

use super::store::RefreshTokenFile;
use super::WatchArgs;
use crate::auth::{AuthState, BrowserLauncher, SessionClient, SessionEvent};
use crate::config::{Credentials, SessionConfig};
use crate::error::SessionError;

/// Wait before listening again after the redirect port was busy.
const LOGIN_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Prints the authorization page for the user to open.
struct PrintBrowser;

impl BrowserLauncher for PrintBrowser {
    fn open(&self, url: &str) -> Result<(), SessionError> {
        println!("Open this URL to log in:\n  {url}");
        Ok(())
    }
}

/// Handle `crestwatch watch`.
pub async fn handle_watch(args: WatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let store = RefreshTokenFile::new_default();
    let mut config = SessionConfig::from_env();
    if let Some(port) = args.port {
        config = config.with_port(port);
    }
    let credentials = resolve_credentials(&args, &store)?;

    let client = SessionClient::spawn_with_browser(config, Arc::new(PrintBrowser))?;
    let mut events = client.subscribe();
    client.configure(credentials).await?;

    let mut login_retry: Option<Instant> = None;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = sleep_until(login_retry) => login_retry = start_login(&client).await?,
            event = events.recv() => match event {
                Ok(event) => {
                    if let Some(at) = on_event(event, &client, &store).await? {
                        login_retry = Some(at);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Event printer fell behind");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    client.shutdown().await;
    Ok(())
}

/// Handle `crestwatch forget`.
pub fn handle_forget() -> Result<(), Box<dyn std::error::Error>> {
    let store = RefreshTokenFile::new_default();
    store.clear()?;
    println!("Removed {}", store.path().display());
    Ok(())
}

fn resolve_credentials(
    args: &WatchArgs,
    store: &RefreshTokenFile,
) -> Result<Credentials, Box<dyn std::error::Error>> {
    let from_env = Credentials::from_env();
    let client_id = args
        .client_id
        .clone()
        .or_else(|| from_env.as_ref().map(|c| c.client_id.clone()));
    let secret = args
        .secret
        .clone()
        .or_else(|| from_env.as_ref().map(|c| c.secret.clone()));
    let (Some(client_id), Some(secret)) = (client_id, secret) else {
        return Err("missing client id or secret (use --client-id/--secret or CRESTWATCH_CLIENT_ID/CRESTWATCH_SECRET)".into());
    };

    let mut credentials = Credentials::new(client_id, secret);
    if !args.fresh {
        let stored = match store.load()? {
            Some(token) => Some(token),
            None => from_env.and_then(|c| c.refresh_token),
        };
        if let Some(token) = stored {
            credentials = credentials.with_refresh_token(token);
        }
    }
    Ok(credentials)
}

/// Print one event; returns when to retry the login if it could not start.
async fn on_event(
    event: SessionEvent,
    client: &SessionClient,
    store: &RefreshTokenFile,
) -> Result<Option<Instant>, SessionError> {
    match event {
        SessionEvent::StatusChanged(state) => {
            println!("[{state}]");
            if state == AuthState::WaitingForCredentials {
                // A stored token that led here was rejected.
                store.clear()?;
                return start_login(client).await;
            }
        }
        SessionEvent::CharacterInfoUpdated { name, portrait } => {
            println!("Character: {name} ({} byte portrait)", portrait.len());
        }
        SessionEvent::LocationChanged(location) => println!("Location: {location}"),
        SessionEvent::RefreshTokenIssued(token) => {
            if let Err(e) = store.save(&token) {
                tracing::warn!(error = %e, "Could not persist refresh token");
            }
        }
    }
    Ok(None)
}

/// Begin an interactive login. A busy redirect port is reported and retried
/// later instead of ending the process.
async fn start_login(client: &SessionClient) -> Result<Option<Instant>, SessionError> {
    match client.begin_interactive_login().await {
        Ok(attempt) => {
            tracing::debug!(port = attempt.port, "Login started");
            Ok(None)
        }
        Err(e @ SessionError::Bind { .. }) => {
            eprintln!("{e}; retrying in {}s", LOGIN_RETRY_DELAY.as_secs());
            Ok(Some(Instant::now() + LOGIN_RETRY_DELAY))
        }
        Err(e) => Err(e),
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Credentials, SessionConfig};

    #[tokio::test]
    async fn busy_redirect_port_schedules_a_retry() {
        let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();
        let config = SessionConfig::default().with_port(port).with_warm_up(false);
        let client = SessionClient::spawn_with_browser(config, Arc::new(PrintBrowser)).unwrap();
        client
            .configure(Credentials::new("client", "secret"))
            .await
            .unwrap();

        let retry_at = start_login(&client).await.unwrap();
        assert!(retry_at.is_some_and(|at| at > Instant::now()));

        drop(taken);
        assert_eq!(start_login(&client).await.unwrap(), None);
        client.shutdown().await;
    }
}
