//! OAuth request/response types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Token exchange request, as posted by API callers.
///
/// Every field is optional on the wire so that validation can name the one
/// that is missing instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TokenRequest {
    /// Authorization code received from the redirect
    pub code: Option<String>,
    /// App key (OAuth client id)
    pub app_key: Option<String>,
    /// App secret; not needed when a code verifier is supplied
    pub app_secret: Option<String>,
    /// PKCE code verifier
    pub code_verifier: Option<String>,
    /// Redirect URI used in the authorize request
    pub redirect_uri: Option<String>,
}

impl TokenRequest {
    /// Authorization code, if non-empty
    pub fn code(&self) -> Option<&str> {
        non_empty(self.code.as_deref())
    }

    /// App key, if non-empty
    pub fn app_key(&self) -> Option<&str> {
        non_empty(self.app_key.as_deref())
    }

    /// App secret, if non-empty
    pub fn app_secret(&self) -> Option<&str> {
        non_empty(self.app_secret.as_deref())
    }

    /// Code verifier, if non-empty
    pub fn code_verifier(&self) -> Option<&str> {
        non_empty(self.code_verifier.as_deref())
    }

    /// Redirect URI, if non-empty
    pub fn redirect_uri(&self) -> Option<&str> {
        non_empty(self.redirect_uri.as_deref())
    }

    /// Check the required fields, naming the first one that is missing
    pub fn validate(&self) -> Result<()> {
        if self.code().is_none() {
            return Err(Error::MissingParameter("code"));
        }
        if self.app_key().is_none() {
            return Err(Error::MissingParameter("appKey"));
        }
        if self.app_secret().is_none() && self.code_verifier().is_none() {
            return Err(Error::MissingParameter("appSecret or codeVerifier"));
        }
        Ok(())
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Normalized token response returned to API callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Token usable against the Dropbox API
    pub access_token: String,
    /// Dropbox user id of the authorizing user
    pub uid: String,
    /// Refresh token (online/offline access types only)
    pub refresh_token: Option<String>,
    /// Absolute expiry of the access token
    pub expires_at: Option<DateTime<Utc>>,
    /// Token type, `bearer` when set
    pub token_type: String,
    /// Granted scopes, in provider order
    pub scopes: Option<Vec<String>>,
}

impl TokenResponse {
    /// Response for a token that never expires (legacy access type)
    pub fn without_expiry(access_token: String, uid: String, token_type: String) -> Result<Self> {
        Self::check(&access_token, &uid)?;
        Ok(Self {
            access_token,
            uid,
            refresh_token: None,
            expires_at: None,
            token_type,
            scopes: None,
        })
    }

    /// Response for a short-lived token; `expires_at` is now + `expires_in` seconds
    pub fn with_expiry(
        access_token: String,
        refresh_token: Option<String>,
        uid: String,
        token_type: String,
        expires_in: i64,
        scopes: Option<Vec<String>>,
    ) -> Result<Self> {
        Self::check(&access_token, &uid)?;
        let expires_at = Duration::try_seconds(expires_in)
            .and_then(|d| Utc::now().checked_add_signed(d))
            .ok_or_else(|| Error::InvalidResponse(format!("expires_in out of range: {expires_in}")))?;
        Ok(Self {
            access_token,
            uid,
            refresh_token,
            expires_at: Some(expires_at),
            token_type,
            scopes,
        })
    }

    fn check(access_token: &str, uid: &str) -> Result<()> {
        if access_token.is_empty() || uid.is_empty() {
            return Err(Error::InvalidResponse(
                "missing access_token and/or uid".to_string(),
            ));
        }
        Ok(())
    }
}

/// Which grant the authorize endpoint should hand back
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthResponseType {
    /// Implicit grant, token returned in the URL fragment
    Token,
    /// Authorization code grant
    #[default]
    Code,
}

impl OAuthResponseType {
    /// Query-string value
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Token => "token",
            Self::Code => "code",
        }
    }
}

/// Lifetime of the tokens the provider issues
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenAccessType {
    /// Long-lived token, no refresh token
    #[default]
    Legacy,
    /// Short-lived token only
    Online,
    /// Short-lived token plus refresh token
    Offline,
}

impl TokenAccessType {
    /// Query-string value, `None` for legacy (parameter omitted)
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            Self::Legacy => None,
            Self::Online => Some("online"),
            Self::Offline => Some("offline"),
        }
    }
}

/// Whether previously granted scopes are folded into the new grant
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IncludeGrantedScopes {
    /// Only the requested scopes
    #[default]
    None,
    /// Include user scopes granted earlier
    User,
    /// Include team scopes granted earlier
    Team,
}

impl IncludeGrantedScopes {
    /// Query-string value, `None` when the parameter is omitted
    pub fn as_param(self) -> Option<&'static str> {
        match self {
            Self::None => None,
            Self::User => Some("user"),
            Self::Team => Some("team"),
        }
    }
}

/// PKCE challenge pair
#[derive(Debug, Clone)]
pub struct PkceChallenge {
    /// Secret sent with the token request
    pub verifier: String,
    /// S256 digest sent with the authorize request
    pub challenge: String,
}

/// Code captured by the loopback listener
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedCode {
    /// Authorization code
    pub code: String,
    /// Redirect URI the listener was serving; must be echoed in the exchange
    pub redirect_uri: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn request(code: &str, key: &str, secret: &str, verifier: &str) -> TokenRequest {
        let opt = |s: &str| Some(s.to_string());
        TokenRequest {
            code: opt(code),
            app_key: opt(key),
            app_secret: opt(secret),
            code_verifier: opt(verifier),
            redirect_uri: None,
        }
    }

    #[test]
    fn validate_names_missing_code() {
        let err = request("", "key", "secret", "").validate().unwrap_err();
        assert!(matches!(err, Error::MissingParameter("code")));

        let absent = TokenRequest {
            code: None,
            ..request("x", "key", "secret", "")
        };
        assert!(matches!(absent.validate(), Err(Error::MissingParameter("code"))));
    }

    #[test]
    fn validate_names_missing_app_key() {
        let err = request("abc", "", "secret", "").validate().unwrap_err();
        assert!(matches!(err, Error::MissingParameter("appKey")));
    }

    #[test]
    fn validate_requires_secret_or_verifier() {
        let err = request("abc", "key", "", "").validate().unwrap_err();
        assert!(err.to_string().contains("appSecret or codeVerifier"));

        assert!(request("abc", "key", "secret", "").validate().is_ok());
        assert!(request("abc", "key", "", "verifier").validate().is_ok());
    }

    #[test]
    fn token_request_reads_camel_case_json() {
        let req: TokenRequest = serde_json::from_str(
            r#"{"code":"c","appKey":"k","codeVerifier":"v","redirectUri":"http://127.0.0.1:52475/"}"#,
        )
        .unwrap();
        assert_eq!(req.code(), Some("c"));
        assert_eq!(req.app_key(), Some("k"));
        assert_eq!(req.app_secret(), None);
        assert_eq!(req.code_verifier(), Some("v"));
        assert_eq!(req.redirect_uri(), Some("http://127.0.0.1:52475/"));
    }

    #[test]
    fn response_requires_access_token_and_uid() {
        assert!(TokenResponse::without_expiry(String::new(), "u".into(), "bearer".into()).is_err());
        assert!(TokenResponse::without_expiry("a".into(), String::new(), "bearer".into()).is_err());
        assert!(
            TokenResponse::with_expiry(String::new(), None, "u".into(), "bearer".into(), 10, None)
                .is_err()
        );
    }

    #[test]
    fn with_expiry_sets_absolute_timestamp() {
        let before = Utc::now();
        let resp = TokenResponse::with_expiry(
            "a".into(),
            Some("r".into()),
            "u".into(),
            "bearer".into(),
            3600,
            None,
        )
        .unwrap();
        let expires_at = resp.expires_at.unwrap();
        assert!(expires_at >= before + Duration::seconds(3600));
        assert!(expires_at <= Utc::now() + Duration::seconds(3600));
    }

    #[test]
    fn out_of_range_expiry_is_invalid_response() {
        for expires_in in [i64::MAX, i64::MIN] {
            let err = TokenResponse::with_expiry(
                "a".into(),
                None,
                "u".into(),
                "bearer".into(),
                expires_in,
                None,
            )
            .unwrap_err();
            assert!(matches!(err, Error::InvalidResponse(_)), "got {err}");
        }
    }

    #[test]
    fn response_serializes_nulls_for_absent_fields() {
        let resp = TokenResponse::without_expiry("A".into(), "U".into(), "bearer".into()).unwrap();
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["accessToken"], "A");
        assert_eq!(json["uid"], "U");
        assert!(json["refreshToken"].is_null());
        assert!(json["expiresAt"].is_null());
        assert!(json["scopes"].is_null());
    }

    #[test]
    fn enum_query_values() {
        assert_eq!(OAuthResponseType::Code.as_str(), "code");
        assert_eq!(TokenAccessType::Legacy.as_param(), None);
        assert_eq!(TokenAccessType::Offline.as_param(), Some("offline"));
        assert_eq!(IncludeGrantedScopes::None.as_param(), None);
        assert_eq!(IncludeGrantedScopes::Team.as_param(), Some("team"));
    }
}
