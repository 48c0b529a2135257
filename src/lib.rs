//! Dropbox OAuth2 Broker
//!
//! Brokers the OAuth2 authorization-code exchange with Dropbox over a small
//! HTTP API.
//!
//! # Features
//!
//! - **Token exchange**: `POST /generateToken` trades a code (with an app
//!   secret or PKCE verifier) for a normalized token response
//! - **Interactive login**: `GET /generateCode` opens the browser and captures
//!   the code on a loopback listener
//! - **Bounded waits**: outbound calls and redirect waits carry deadlines

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod broker;
pub mod cli;
pub mod config;
pub mod error;
pub mod oauth;

pub use error::{AuthorizationError, Error, Result};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Failed to install tracing subscriber: {e}")))
}
