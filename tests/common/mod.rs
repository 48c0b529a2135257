//! Shared helpers for integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Form, Router,
    extract::State,
    http::{StatusCode, header::CONTENT_TYPE},
    response::IntoResponse,
    routing::post,
};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use url::Url;

use dropbox_oauth_broker::oauth::{Browser, TokenExchanger};

/// Form bodies received by a fake provider
pub type Received = Arc<Mutex<Vec<HashMap<String, String>>>>;

#[derive(Clone)]
struct ProviderState {
    status: StatusCode,
    body: String,
    delay: Duration,
    received: Received,
}

/// In-process stand-in for the provider's token endpoint
pub struct FakeProvider {
    pub token_url: String,
    pub received: Received,
    server: JoinHandle<()>,
}

impl FakeProvider {
    /// Answer every token request with `status` and `body`
    pub async fn start(status: StatusCode, body: &str) -> Self {
        Self::start_with_delay(status, body, Duration::ZERO).await
    }

    /// Like [`start`](Self::start), sleeping `delay` before answering
    pub async fn start_with_delay(status: StatusCode, body: &str, delay: Duration) -> Self {
        let received = Received::default();
        let state = ProviderState {
            status,
            body: body.to_string(),
            delay,
            received: Arc::clone(&received),
        };

        let app = Router::new()
            .route("/oauth2/token", post(token_endpoint))
            .with_state(state);
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            token_url: format!("http://{addr}/oauth2/token"),
            received,
            server,
        }
    }

    /// Exchanger pointed at this provider
    pub fn exchanger(&self, timeout: Duration) -> TokenExchanger {
        TokenExchanger::new(reqwest::Client::new(), self.token_url.clone(), timeout)
    }

    /// Form fields of the last request received
    pub async fn last_request(&self) -> HashMap<String, String> {
        self.received
            .lock()
            .await
            .last()
            .cloned()
            .expect("provider received no request")
    }
}

impl Drop for FakeProvider {
    fn drop(&mut self) {
        self.server.abort();
    }
}

async fn token_endpoint(
    State(state): State<ProviderState>,
    Form(params): Form<HashMap<String, String>>,
) -> impl IntoResponse {
    state.received.lock().await.push(params);
    tokio::time::sleep(state.delay).await;
    (state.status, [(CONTENT_TYPE, "application/json")], state.body)
}

/// Browser that completes the redirect itself with a fixed code
pub struct RedirectingBrowser {
    pub code: String,
    pub opened: Arc<std::sync::Mutex<Vec<String>>>,
}

impl RedirectingBrowser {
    pub fn new(code: &str) -> Self {
        Self {
            code: code.to_string(),
            opened: Arc::default(),
        }
    }
}

impl Browser for RedirectingBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        self.opened
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?
            .push(url.to_string());

        let authorize = Url::parse(url).map_err(io::Error::other)?;
        let param = |name: &str| {
            authorize
                .query_pairs()
                .find(|(k, _)| k == name)
                .map(|(_, v)| v.into_owned())
                .unwrap_or_default()
        };

        let mut redirect = Url::parse(&param("redirect_uri")).map_err(io::Error::other)?;
        redirect
            .query_pairs_mut()
            .append_pair("code", &self.code)
            .append_pair("state", &param("state"));

        tokio::spawn(async move {
            let _ = reqwest::get(redirect).await;
        });
        Ok(())
    }
}

/// Browser whose launch always fails
pub struct BrokenBrowser;

impl Browser for BrokenBrowser {
    fn open(&self, _url: &str) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::NotFound, "no browser"))
    }
}

/// A port that was free a moment ago
pub fn free_port() -> u16 {
    std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|l| l.local_addr())
        .map(|a| a.port())
        .unwrap()
}
