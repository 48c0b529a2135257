//! Authorization code exchange
//!
//! Posts the grant to the provider's token endpoint and normalizes the JSON
//! answer. One request per call, no retries.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info, warn};

use super::types::{TokenRequest, TokenResponse};
use crate::error::AuthorizationError;
use crate::{Error, Result};

/// Dropbox token endpoint
pub const DEFAULT_TOKEN_URL: &str = "https://api.dropbox.com/oauth2/token";

/// Successful token endpoint body
#[derive(Debug, Deserialize)]
struct RawTokenResponse {
    access_token: Option<String>,
    uid: Option<String>,
    token_type: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<i64>,
    scope: Option<String>,
}

/// Error body; the provider may omit either field
#[derive(Debug, Default, Deserialize)]
struct ProviderError {
    error: Option<String>,
    error_description: Option<String>,
}

/// Exchanges authorization codes for tokens
#[derive(Debug, Clone)]
pub struct TokenExchanger {
    http_client: Client,
    token_url: String,
    timeout: Duration,
}

impl TokenExchanger {
    /// Create an exchanger for `token_url`; every request is bounded by `timeout`
    pub fn new(http_client: Client, token_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            http_client,
            token_url: token_url.into(),
            timeout,
        }
    }

    /// Token endpoint this exchanger posts to
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange the code in `request` for a token
    pub async fn exchange(&self, request: &TokenRequest) -> Result<TokenResponse> {
        request.validate()?;

        let params = form_params(request);
        debug!(
            token_url = %self.token_url,
            client_id = request.app_key().unwrap_or_default(),
            pkce = request.code_verifier().is_some(),
            "Exchanging authorization code"
        );

        let response = self
            .http_client
            .post(&self.token_url)
            .timeout(self.timeout)
            .form(&params)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| self.transport_error(e))?;

        if !status.is_success() {
            let rejection = provider_error(status, &body);
            warn!(%status, error = %rejection.message, "Token endpoint rejected the code");
            return Err(rejection.into());
        }

        let raw: RawTokenResponse = serde_json::from_str(&body)?;
        let token = normalize(raw)?;
        info!(uid = %token.uid, expires = token.expires_at.is_some(), "Token issued");
        Ok(token)
    }

    fn transport_error(&self, e: reqwest::Error) -> Error {
        if e.is_timeout() {
            Error::Timeout(format!(
                "token request to {} exceeded {}ms",
                self.token_url,
                self.timeout.as_millis()
            ))
        } else {
            Error::Http(e)
        }
    }
}

/// Form body in wire order; optional fields only when present
fn form_params(request: &TokenRequest) -> Vec<(&'static str, &str)> {
    let mut params = vec![
        ("code", request.code().unwrap_or_default()),
        ("grant_type", "authorization_code"),
        ("client_id", request.app_key().unwrap_or_default()),
    ];
    if let Some(secret) = request.app_secret() {
        params.push(("client_secret", secret));
    }
    if let Some(verifier) = request.code_verifier() {
        params.push(("code_verifier", verifier));
    }
    if let Some(redirect_uri) = request.redirect_uri() {
        params.push(("redirect_uri", redirect_uri));
    }
    params
}

/// Build the rejection from an error body.
///
/// `message` is the `error` code, falling back to `error_description`, then
/// to the raw body or status text when the body is not JSON.
fn provider_error(status: StatusCode, body: &str) -> AuthorizationError {
    let parsed: ProviderError = serde_json::from_str(body).unwrap_or_default();
    let fallback = || {
        let text = body.trim();
        if text.is_empty() || text.starts_with('{') {
            status
                .canonical_reason()
                .map_or_else(|| status.as_str().to_string(), str::to_string)
        } else {
            text.to_string()
        }
    };

    let message = parsed
        .error
        .clone()
        .or_else(|| parsed.error_description.clone())
        .unwrap_or_else(fallback);
    AuthorizationError::new(message, parsed.error_description)
}

fn normalize(raw: RawTokenResponse) -> Result<TokenResponse> {
    let access_token = raw
        .access_token
        .ok_or_else(|| Error::InvalidResponse("missing access_token".to_string()))?;
    let uid = raw
        .uid
        .ok_or_else(|| Error::InvalidResponse("missing uid".to_string()))?;
    let token_type = raw.token_type.unwrap_or_else(|| "bearer".to_string());

    match raw.expires_in {
        None => TokenResponse::without_expiry(access_token, uid, token_type),
        Some(expires_in) => {
            let scopes = raw
                .scope
                .map(|s| s.split_whitespace().map(str::to_string).collect::<Vec<_>>())
                .filter(|scopes| !scopes.is_empty());
            TokenResponse::with_expiry(
                access_token,
                raw.refresh_token,
                uid,
                token_type,
                expires_in,
                scopes,
            )
        }
    }
}
