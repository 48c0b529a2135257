//! Broker server

use std::net::SocketAddr;
use std::sync::Arc;

use reqwest::Client;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use super::router::{AppState, create_router};
use crate::config::Config;
use crate::oauth::{CodeFlow, TokenExchanger};
use crate::{Error, Result};

/// Dropbox OAuth broker server
pub struct Broker {
    config: Config,
    state: Arc<AppState>,
}

impl Broker {
    /// Create a broker from configuration
    pub fn new(config: Config) -> Result<Self> {
        let http_client = http_client()?;
        let state = Arc::new(AppState {
            exchanger: TokenExchanger::new(
                http_client,
                config.provider.token_url.clone(),
                config.provider.request_timeout,
            ),
            code_flow: CodeFlow::from_config(&config),
        });
        Ok(Self { config, state })
    }

    /// Serve until Ctrl-C / SIGTERM
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(
            self.config
                .server
                .host
                .parse()
                .map_err(|e| Error::Config(format!("Invalid host: {e}")))?,
            self.config.server.port,
        );

        let app = create_router(Arc::clone(&self.state), self.config.server.max_body_size);
        let listener = TcpListener::bind(addr).await?;

        info!(version = env!("CARGO_PKG_VERSION"), %addr, "Dropbox OAuth broker listening");
        info!("  POST http://{addr}/generateToken  (code -> token)");
        info!("  GET  http://{addr}/generateCode   (interactive login)");
        info!(
            token_url = %self.state.exchanger.token_url(),
            redirect_uri = %self.config.loopback.redirect_uri(),
            "Provider endpoints"
        );
        if self.config.authorize.client_id.is_empty() {
            warn!("authorize.client_id is not set - /generateCode will be rejected");
        }

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown_signal())
            .await
            .map_err(|e| Error::Internal(e.to_string()))?;

        info!("Broker shutdown complete");
        Ok(())
    }
}

/// Outbound HTTP client shared by all exchanges
pub fn http_client() -> Result<Client> {
    Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(Error::from)
}

/// Resolves on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Shutdown signal received");
}
