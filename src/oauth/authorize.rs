//! Authorization URL construction
//!
//! Builds the provider's `/oauth2/authorize` URL. Parameters are appended in
//! a fixed order and omitted when their flag is off, so the same request
//! always yields the same URL.

use serde::{Deserialize, Serialize};
use url::Url;

use super::types::{IncludeGrantedScopes, OAuthResponseType, TokenAccessType};
use crate::{Error, Result};

/// Dropbox authorization endpoint
pub const DEFAULT_AUTHORIZE_URL: &str = "https://www.dropbox.com/oauth2/authorize";

/// Inputs of the authorize URL.
///
/// Also the `authorize` section of the configuration, where it holds the
/// defaults for the interactive code flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizeRequest {
    /// Grant handed back by the authorize endpoint
    pub response_type: OAuthResponseType,
    /// App key
    pub client_id: String,
    /// Where the provider redirects; required for the token response type
    pub redirect_uri: Option<String>,
    /// Opaque value echoed back in the redirect
    pub state: Option<String>,
    /// Show the approval page even if the app is already authorized
    pub force_reapprove: bool,
    /// Hide the sign-up link on the login page
    pub disable_signup: bool,
    /// Require a `personal` or `work` account
    pub require_role: Option<String>,
    /// Ask the user to log in again
    pub force_reauthentication: bool,
    /// Token lifetime requested
    pub token_access_type: TokenAccessType,
    /// Scopes requested
    pub scopes: Option<Vec<String>>,
    /// Fold previously granted scopes into this grant
    pub include_granted_scopes: IncludeGrantedScopes,
    /// PKCE S256 challenge
    pub code_challenge: Option<String>,
}

impl AuthorizeRequest {
    /// Code-flow request for a client id
    pub fn code(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            ..Self::default()
        }
    }

    /// Check the fields the authorize endpoint cannot do without
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(Error::MissingParameter("clientId"));
        }
        if self.redirect_uri().is_none() && self.response_type != OAuthResponseType::Code {
            return Err(Error::MissingParameter("redirectUri"));
        }
        Ok(())
    }

    fn redirect_uri(&self) -> Option<&str> {
        self.redirect_uri.as_deref().filter(|r| !r.is_empty())
    }
}

/// Build the authorize URL for `request` against `base_url`
pub fn authorize_url(base_url: &str, request: &AuthorizeRequest) -> Result<Url> {
    request.validate()?;
    let redirect_uri = request.redirect_uri();

    let mut url = Url::parse(base_url)
        .map_err(|e| Error::InvalidArgument(format!("authorize URL {base_url}: {e}")))?;

    let mut query = format!(
        "response_type={}&client_id={}",
        request.response_type.as_str(),
        urlencoding::encode(&request.client_id)
    );

    if let Some(redirect_uri) = redirect_uri {
        push(&mut query, "redirect_uri", &urlencoding::encode(redirect_uri));
    }
    if let Some(state) = non_blank(request.state.as_deref()) {
        push(&mut query, "state", &urlencoding::encode(state));
    }
    if request.force_reapprove {
        push(&mut query, "force_reapprove", "true");
    }
    if request.disable_signup {
        push(&mut query, "disable_signup", "true");
    }
    if let Some(role) = non_blank(request.require_role.as_deref()) {
        push(&mut query, "require_role", &urlencoding::encode(role));
    }
    if request.force_reauthentication {
        push(&mut query, "force_reauthentication", "true");
    }
    if let Some(access_type) = request.token_access_type.as_param() {
        push(&mut query, "token_access_type", access_type);
    }
    if let Some(scopes) = &request.scopes {
        push(&mut query, "scope", &urlencoding::encode(&scopes.join(" ")));
    }
    if let Some(include) = request.include_granted_scopes.as_param() {
        push(&mut query, "include_granted_scopes", include);
    }
    if let Some(challenge) = non_blank(request.code_challenge.as_deref()) {
        push(&mut query, "code_challenge", &urlencoding::encode(challenge));
        push(&mut query, "code_challenge_method", "S256");
    }

    url.set_query(Some(&query));
    Ok(url)
}

fn push(query: &mut String, key: &str, value: &str) {
    query.push('&');
    query.push_str(key);
    query.push('=');
    query.push_str(value);
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}
