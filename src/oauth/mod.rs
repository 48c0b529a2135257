//! OAuth 2.0 authorization-code brokering for Dropbox
//!
//! - Authorization URL construction
//! - Code-for-token exchange (app secret or PKCE)
//! - Loopback redirect capture for interactive logins

mod authorize;
mod exchange;
mod flow;
mod loopback;
mod pkce;
mod types;

pub use authorize::{AuthorizeRequest, DEFAULT_AUTHORIZE_URL, authorize_url};
pub use exchange::{DEFAULT_TOKEN_URL, TokenExchanger};
pub use flow::{Browser, CodeFlow, ConsoleBrowser, SystemBrowser};
pub use loopback::LoopbackListener;
pub use pkce::{challenge_for, generate_pkce, generate_state};
pub use types::{
    CapturedCode, IncludeGrantedScopes, OAuthResponseType, PkceChallenge, TokenAccessType,
    TokenRequest, TokenResponse,
};
