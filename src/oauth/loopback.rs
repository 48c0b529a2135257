//! Loopback redirect listener
//!
//! A single-shot HTTP server on a local port that receives the provider's
//! authorization redirect. The first request on any path completes the flow;
//! the listener is shut down when the wait finishes or the value is dropped.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, Uri},
    response::{Html, IntoResponse},
};
use tokio::net::TcpListener;
use tokio::sync::{Mutex, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::AuthorizationError;
use crate::{Error, Result};

/// Time the server gets to flush the browser's response before it is aborted
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// State shared with the redirect handler
struct RedirectState {
    expected_state: Option<String>,
    tx: Option<oneshot::Sender<Result<String>>>,
}

/// A bound loopback listener waiting for one redirect
pub struct LoopbackListener {
    local_addr: SocketAddr,
    redirect_uri: String,
    result_rx: Option<oneshot::Receiver<Result<String>>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    server: JoinHandle<()>,
}

impl LoopbackListener {
    /// Bind `host:port` and start serving.
    ///
    /// Port 0 picks an ephemeral port; [`redirect_uri`](Self::redirect_uri)
    /// reflects the port actually bound. When `expected_state` is set, a
    /// redirect carrying a different `state` fails the flow.
    pub async fn bind(
        host: &str,
        port: u16,
        redirect_path: &str,
        expected_state: Option<String>,
    ) -> Result<Self> {
        let listener = TcpListener::bind((host, port)).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("failed to bind loopback listener on {host}:{port}: {e}"),
            ))
        })?;
        let local_addr = listener.local_addr()?;

        let path = if redirect_path.starts_with('/') {
            redirect_path.to_string()
        } else {
            format!("/{redirect_path}")
        };
        let redirect_uri = format!("http://{host}:{}{path}", local_addr.port());

        let (tx, result_rx) = oneshot::channel();
        let state = Arc::new(Mutex::new(RedirectState {
            expected_state,
            tx: Some(tx),
        }));

        let app = Router::new().fallback(handle_redirect).with_state(state);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            let shutdown = async move {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(shutdown)
                .await
            {
                warn!(error = %e, "Loopback listener failed");
            }
        });

        info!(addr = %local_addr, redirect_uri = %redirect_uri, "Loopback listener ready");

        Ok(Self {
            local_addr,
            redirect_uri,
            result_rx: Some(result_rx),
            shutdown_tx: Some(shutdown_tx),
            server,
        })
    }

    /// Address the listener is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Redirect URI served by this listener
    pub fn redirect_uri(&self) -> &str {
        &self.redirect_uri
    }

    /// Wait for the redirect and return its `code`.
    ///
    /// Consumes the listener: whatever the outcome, the server is stopped and
    /// the port released before this returns.
    pub async fn wait_for_code(mut self, timeout: Duration) -> Result<String> {
        let Some(rx) = self.result_rx.take() else {
            return Err(Error::Internal("loopback listener already used".to_string()));
        };

        let outcome = tokio::time::timeout(timeout, rx).await;
        self.shutdown().await;

        match outcome {
            Err(_) => Err(Error::Timeout(format!(
                "no authorization redirect within {}s",
                timeout.as_secs()
            ))),
            Ok(Err(_)) => Err(Error::Internal(
                "loopback listener stopped before a redirect arrived".to_string(),
            )),
            Ok(Ok(result)) => result,
        }
    }

    /// Stop the server without waiting for a redirect.
    ///
    /// Returns once the socket is closed, so the port can be bound again.
    pub async fn close(mut self) {
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if tokio::time::timeout(SHUTDOWN_GRACE, &mut self.server)
            .await
            .is_err()
        {
            debug!(addr = %self.local_addr, "Loopback listener did not drain, aborting");
            self.server.abort();
            // Resolves once the task and its socket are dropped
            let _ = (&mut self.server).await;
        }
        debug!(addr = %self.local_addr, "Loopback listener stopped");
    }
}

impl Drop for LoopbackListener {
    fn drop(&mut self) {
        self.server.abort();
    }
}

/// Look up the redirect's outcome in its query string
fn parse_redirect(query: Option<&str>, expected_state: Option<&str>) -> Result<String> {
    let mut code = None;
    let mut state = None;
    let mut error = None;
    let mut error_description = None;

    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()) {
        let slot = match &*key {
            "code" => &mut code,
            "state" => &mut state,
            "error" => &mut error,
            "error_description" => &mut error_description,
            _ => continue,
        };
        if slot.is_none() {
            *slot = Some(value.into_owned());
        }
    }

    if let Some(error) = error {
        return Err(AuthorizationError::new(error, error_description).into());
    }
    if let Some(expected) = expected_state {
        if state.as_deref() != Some(expected) {
            return Err(AuthorizationError::new(
                "state_mismatch",
                Some("redirect state does not match the authorize request".to_string()),
            )
            .into());
        }
    }
    code.filter(|c| !c.is_empty()).ok_or(Error::MissingCode)
}

async fn handle_redirect(
    State(state): State<Arc<Mutex<RedirectState>>>,
    uri: Uri,
) -> impl IntoResponse {
    debug!(path = uri.path(), "Received authorization redirect");

    let mut state = state.lock().await;
    let Some(tx) = state.tx.take() else {
        return (
            StatusCode::GONE,
            Html(page("Already handled", "This sign-in has already completed.")),
        );
    };

    let result = parse_redirect(uri.query(), state.expected_state.as_deref());
    let response = match &result {
        Ok(_) => (
            StatusCode::OK,
            Html(page("Authorization successful", "You can close this window.")),
        ),
        Err(e) => (
            StatusCode::BAD_REQUEST,
            Html(page("Authorization failed", &e.to_string())),
        ),
    };

    let _ = tx.send(result);
    response
}

fn page(title: &str, message: &str) -> String {
    let message = message
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>{title}</title></head>
<body style="font-family: sans-serif; text-align: center; margin-top: 20vh;">
    <h1>{title}</h1>
    <p>{message}</p>
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_code_before_other_parameters() {
        let code = parse_redirect(Some("code=ABC123&state=Israel"), None).unwrap();
        assert_eq!(code, "ABC123");
    }

    #[test]
    fn code_position_does_not_matter() {
        let code = parse_redirect(Some("state=S&code=xyz%2F1"), None).unwrap();
        assert_eq!(code, "xyz/1");
    }

    #[test]
    fn missing_code_fails_loudly() {
        assert!(matches!(parse_redirect(Some("state=S"), None), Err(Error::MissingCode)));
        assert!(matches!(parse_redirect(None, None), Err(Error::MissingCode)));
        assert!(matches!(parse_redirect(Some("code="), None), Err(Error::MissingCode)));
    }

    #[test]
    fn provider_error_in_redirect() {
        let err = parse_redirect(
            Some("error=access_denied&error_description=The+user+chose+not+to+give+access"),
            None,
        )
        .unwrap_err();
        match err {
            Error::Authorization(e) => {
                assert_eq!(e.message, "access_denied");
                assert_eq!(
                    e.description.as_deref(),
                    Some("The user chose not to give access")
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn state_is_checked_when_expected() {
        assert!(parse_redirect(Some("code=c&state=good"), Some("good")).is_ok());
        assert!(parse_redirect(Some("code=c&state=bad"), Some("good")).is_err());
        assert!(parse_redirect(Some("code=c"), Some("good")).is_err());
    }

    #[test]
    fn page_escapes_message() {
        let html = page("t", "<script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }
}
