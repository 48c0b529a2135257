//! Interactive authorization-code acquisition
//!
//! Binds the loopback listener, sends the user's browser to the authorize
//! URL and waits for the redirect. Flows are serialized: the listener port is
//! fixed, so a second caller waits for the first flow to finish.

use std::io;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};
use url::Url;

use super::authorize::{AuthorizeRequest, authorize_url};
use super::loopback::LoopbackListener;
use super::pkce::generate_state;
use super::types::CapturedCode;
use crate::Result;
use crate::config::{Config, LoopbackConfig};

/// Something that can show the user a URL
pub trait Browser: Send + Sync {
    /// Open `url` for the user
    fn open(&self, url: &str) -> io::Result<()>;
}

/// The platform's default browser
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl Browser for SystemBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        open::that(url)
    }
}

/// Only prints the URL; for headless hosts
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleBrowser;

impl Browser for ConsoleBrowser {
    fn open(&self, url: &str) -> io::Result<()> {
        println!("\nPlease authorize this app by visiting:\n{url}\n");
        Ok(())
    }
}

/// Runs the interactive authorization-code flow
pub struct CodeFlow {
    authorize_url: String,
    defaults: AuthorizeRequest,
    loopback: LoopbackConfig,
    browser: Arc<dyn Browser>,
    in_flight: Mutex<()>,
}

impl CodeFlow {
    /// Create a flow from explicit parts
    pub fn new(
        authorize_url: impl Into<String>,
        defaults: AuthorizeRequest,
        loopback: LoopbackConfig,
        browser: Arc<dyn Browser>,
    ) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            defaults,
            loopback,
            browser,
            in_flight: Mutex::new(()),
        }
    }

    /// Create a flow from configuration, picking the browser per `loopback.open_browser`
    pub fn from_config(config: &Config) -> Self {
        let browser: Arc<dyn Browser> = if config.loopback.open_browser {
            Arc::new(SystemBrowser)
        } else {
            Arc::new(ConsoleBrowser)
        };
        Self::new(
            config.provider.authorize_url.clone(),
            config.authorize.clone(),
            config.loopback.clone(),
            browser,
        )
    }

    /// Authorize URL for the configured redirect, without starting a listener
    pub fn authorization_url(&self, code_challenge: Option<&str>) -> Result<Url> {
        let request = self.request_for(self.loopback.redirect_uri(), code_challenge);
        authorize_url(&self.authorize_url, &request)
    }

    /// Run one flow and return the captured code.
    ///
    /// `code_challenge` adds a PKCE challenge to the authorize request; the
    /// caller keeps the matching verifier for the exchange.
    pub async fn acquire_code(&self, code_challenge: Option<&str>) -> Result<CapturedCode> {
        let _guard = self.in_flight.lock().await;

        // Reject unusable requests before taking the port
        self.request_for(self.loopback.redirect_uri(), code_challenge).validate()?;

        let state = self
            .defaults
            .state
            .clone()
            .filter(|s| !s.is_empty())
            .unwrap_or_else(generate_state);

        let listener = LoopbackListener::bind(
            &self.loopback.host,
            self.loopback.port,
            &self.loopback.redirect_path,
            Some(state.clone()),
        )
        .await?;

        let mut request = self.request_for(listener.redirect_uri().to_string(), code_challenge);
        request.state = Some(state);
        let redirect_uri = request.redirect_uri.clone().unwrap_or_default();
        let url = match authorize_url(&self.authorize_url, &request) {
            Ok(url) => url,
            Err(e) => {
                listener.close().await;
                return Err(e);
            }
        };

        info!(url = %url, "Opening browser for authorization");
        if let Err(e) = self.browser.open(url.as_str()) {
            warn!(error = %e, "Failed to open browser automatically");
            println!("\nPlease authorize this app by visiting:\n{url}\n");
        }

        let code = listener.wait_for_code(self.loopback.timeout).await?;
        info!("Authorization code received");
        Ok(CapturedCode { code, redirect_uri })
    }

    fn request_for(&self, redirect_uri: String, code_challenge: Option<&str>) -> AuthorizeRequest {
        let redirect_uri = self
            .defaults
            .redirect_uri
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or(redirect_uri);
        AuthorizeRequest {
            redirect_uri: Some(redirect_uri),
            code_challenge: code_challenge
                .map(str::to_string)
                .or_else(|| self.defaults.code_challenge.clone()),
            ..self.defaults.clone()
        }
    }
}
