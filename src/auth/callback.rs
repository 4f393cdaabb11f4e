//! Local HTTP listener receiving the SSO authorization-code redirect.

use std::net::SocketAddr;
use std::time::Duration;

use reqwest::Url;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::util::timeout::with_timeout;

pub const LOGIN_COMPLETE_BODY: &str = "SSO login success. You can now close this page.";

const REDIRECT_PATH: &str = "/";
const MAX_REQUEST_BYTES: usize = 8 * 1024;
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Correlation record for one outstanding login attempt.
///
/// Holds a freshly minted `state` value and the channel the authorization
/// code is delivered on. The channel is consumed by the first matching
/// redirect; later redirects are not forwarded.
#[derive(Debug)]
pub struct PendingCallback {
    expected_state: String,
    result: Option<oneshot::Sender<String>>,
}

impl PendingCallback {
    /// Mint an unpredictable correlation value for a new attempt.
    pub fn new() -> (Self, oneshot::Receiver<String>) {
        Self::with_state(uuid::Uuid::new_v4().to_string())
    }

    pub fn with_state(expected_state: impl Into<String>) -> (Self, oneshot::Receiver<String>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                expected_state: expected_state.into(),
                result: Some(tx),
            },
            rx,
        )
    }

    pub fn expected_state(&self) -> &str {
        &self.expected_state
    }

    /// Claim the delivery channel for `code` if `state` matches. Returns
    /// `Ok(None)` when a code was already claimed for this attempt.
    fn accept(&mut self, code: &str, state: &str) -> Result<Option<CodeDelivery>, SessionError> {
        if state != self.expected_state {
            return Err(SessionError::StateCorrelationMismatch);
        }
        Ok(self.result.take().map(|tx| CodeDelivery {
            tx,
            code: code.to_string(),
        }))
    }
}

/// An accepted code, handed over once the browser has its response.
#[derive(Debug)]
struct CodeDelivery {
    tx: oneshot::Sender<String>,
    code: String,
}

impl CodeDelivery {
    fn deliver(self) {
        // The receiver may be gone if the attempt was abandoned.
        let _ = self.tx.send(self.code);
    }
}

/// Single-purpose, disposable redirect listener.
///
/// # Example
/// ```no_run
/// use crestwatch::auth::callback::{CallbackListener, PendingCallback};
///
/// # async fn example() -> crestwatch::error::Result<()> {
/// let (pending, code_rx) = PendingCallback::new();
/// let mut listener = CallbackListener::start(4173, pending).await?;
/// let code = code_rx.await.ok();
/// listener.stop().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct CallbackListener {
    local_addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:<port>` and start serving. Port `0` picks a free port.
    pub async fn start(port: u16, pending: PendingCallback) -> Result<Self, SessionError> {
        let listener = TcpListener::bind(("127.0.0.1", port))
            .await
            .map_err(|e| SessionError::Bind {
                port,
                message: e.to_string(),
            })?;
        let local_addr = listener.local_addr()?;
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let task = tokio::spawn(serve(listener, pending, shutdown_rx));
        tracing::debug!(%local_addr, "Callback listener started");
        Ok(Self {
            local_addr,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Close the listener and wait for the serving task to exit, even if a
    /// request is in flight. Stopping twice is a no-op.
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
            tracing::debug!(local_addr = %self.local_addr, "Callback listener stopped");
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn serve(
    listener: TcpListener,
    mut pending: PendingCallback,
    mut shutdown: oneshot::Receiver<()>,
) {
    loop {
        let socket = tokio::select! {
            _ = &mut shutdown => break,
            accepted = listener.accept() => match accepted {
                Ok((socket, _)) => socket,
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to accept callback connection");
                    continue;
                }
            },
        };
        tokio::select! {
            _ = &mut shutdown => break,
            result = with_timeout(READ_TIMEOUT, handle_connection(socket, &mut pending)) => {
                if let Err(e) = result {
                    tracing::debug!(error = %e, "Callback connection failed");
                }
            }
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    pending: &mut PendingCallback,
) -> Result<(), SessionError> {
    let head = read_request_head(&mut socket).await?;
    let (body, delivery) = match request_target(&head) {
        Some(target) => route(target, pending),
        None => ("", None),
    };
    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: Close\r\n\r\n{}",
        body.len(),
        body
    );
    let written = write_response(&mut socket, &response).await;
    if let Some(delivery) = delivery {
        delivery.deliver();
    }
    written
}

async fn write_response(socket: &mut TcpStream, response: &str) -> Result<(), SessionError> {
    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await?;
    Ok(())
}

async fn read_request_head(socket: &mut TcpStream) -> Result<String, SessionError> {
    let mut buffer = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..n]);
        if buffer.windows(4).any(|w| w == b"\r\n\r\n") || buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    Ok(String::from_utf8_lossy(&buffer).into_owned())
}

/// Request target of a `GET` request line.
fn request_target(head: &str) -> Option<&str> {
    let mut parts = head.lines().next()?.split_whitespace();
    match (parts.next()?, parts.next()?) {
        ("GET", target) => Some(target),
        _ => None,
    }
}

fn route(target: &str, pending: &mut PendingCallback) -> (&'static str, Option<CodeDelivery>) {
    let Ok(url) = Url::parse(&format!("http://localhost{target}")) else {
        return ("", None);
    };
    // Browsers also ask for /favicon.ico and friends.
    if url.path() != REDIRECT_PATH {
        return ("", None);
    }

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            _ => {}
        }
    }
    let (Some(code), Some(state)) = (code, state) else {
        tracing::warn!("SSO redirect was missing the code or state parameter");
        return ("", None);
    };

    match pending.accept(&code, &state) {
        Ok(Some(delivery)) => {
            tracing::info!("Authorization code received");
            (LOGIN_COMPLETE_BODY, Some(delivery))
        }
        Ok(None) => (LOGIN_COMPLETE_BODY, None),
        Err(e) => {
            tracing::warn!(error = %e, "Ignoring SSO redirect");
            ("", None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route_and_deliver(target: &str, pending: &mut PendingCallback) -> &'static str {
        let (body, delivery) = route(target, pending);
        if let Some(delivery) = delivery {
            delivery.deliver();
        }
        body
    }

    #[test]
    fn pending_callback_mints_distinct_states() {
        let (a, _) = PendingCallback::new();
        let (b, _) = PendingCallback::new();
        assert_ne!(a.expected_state(), b.expected_state());
    }

    #[test]
    fn route_forwards_matching_code_once() {
        let (mut pending, mut rx) = PendingCallback::with_state("xyz");
        assert_eq!(route_and_deliver("/?code=abc&state=xyz", &mut pending), LOGIN_COMPLETE_BODY);
        assert_eq!(rx.try_recv().unwrap(), "abc");
        let (body, delivery) = route("/?code=def&state=xyz", &mut pending);
        assert_eq!(body, LOGIN_COMPLETE_BODY);
        assert!(delivery.is_none());
    }

    #[test]
    fn code_is_held_until_delivered() {
        let (mut pending, mut rx) = PendingCallback::with_state("xyz");
        let (_, delivery) = route("/?code=abc&state=xyz", &mut pending);
        assert!(rx.try_recv().is_err());
        delivery.unwrap().deliver();
        assert_eq!(rx.try_recv().unwrap(), "abc");
    }

    #[test]
    fn route_ignores_mismatched_state() {
        let (mut pending, mut rx) = PendingCallback::with_state("xyz");
        assert_eq!(route_and_deliver("/?code=abc&state=nope", &mut pending), "");
        assert!(rx.try_recv().is_err());
        assert_eq!(route_and_deliver("/?code=abc", &mut pending), "");
        assert_eq!(route_and_deliver("/?code=ok&state=xyz", &mut pending), LOGIN_COMPLETE_BODY);
        assert_eq!(rx.try_recv().unwrap(), "ok");
    }

    #[test]
    fn route_decodes_percent_escapes() {
        let (mut pending, mut rx) = PendingCallback::with_state("a b");
        route_and_deliver("/?code=x%2By&state=a%20b", &mut pending);
        assert_eq!(rx.try_recv().unwrap(), "x+y");
    }

    #[test]
    fn other_paths_are_noops() {
        let (mut pending, mut rx) = PendingCallback::with_state("xyz");
        assert_eq!(route_and_deliver("/favicon.ico", &mut pending), "");
        assert_eq!(route_and_deliver("/other?code=abc&state=xyz", &mut pending), "");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn request_target_requires_get() {
        assert_eq!(request_target("GET /?a=b HTTP/1.1\r\n\r\n"), Some("/?a=b"));
        assert_eq!(request_target("POST / HTTP/1.1\r\n\r\n"), None);
        assert_eq!(request_target(""), None);
    }
}
