//! Configuration management

use std::{env, path::Path, time::Duration};

use figment::{
    Figment,
    providers::{Env, Format, Yaml},
};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::oauth::{AuthorizeRequest, DEFAULT_AUTHORIZE_URL, DEFAULT_TOKEN_URL};
use crate::{Error, Result};

/// Prefix of environment variables merged over the config file
pub const ENV_PREFIX: &str = "DROPBOX_BROKER_";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Environment files to load before processing config.
    /// Paths support ~ expansion. Loaded in order, later files override earlier.
    /// Variables are set into the process environment for `${VAR}` resolution.
    pub env_files: Vec<String>,
    /// HTTP API server
    pub server: ServerConfig,
    /// Provider endpoints
    pub provider: ProviderConfig,
    /// Authorize request defaults for the interactive code flow
    pub authorize: AuthorizeRequest,
    /// Loopback redirect listener
    pub loopback: LoopbackConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Maximum request body size (bytes)
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_body_size: 64 * 1024,
        }
    }
}

/// Provider endpoints and outbound call limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// OAuth2 token endpoint
    pub token_url: String,
    /// OAuth2 authorization endpoint
    pub authorize_url: String,
    /// Deadline for each token request
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            token_url: DEFAULT_TOKEN_URL.to_string(),
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

/// Loopback redirect listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Host the listener binds to; also used in the redirect URI
    pub host: String,
    /// Port the listener binds to (0 = ephemeral)
    pub port: u16,
    /// Path of the redirect URI
    pub redirect_path: String,
    /// How long to wait for the redirect
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Launch the system browser; when false the URL is only logged
    pub open_browser: bool,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 52475,
            redirect_path: "/".to_string(),
            timeout: Duration::from_secs(300),
            open_browser: true,
        }
    }
}

impl LoopbackConfig {
    /// Redirect URI for the configured host, port and path
    pub fn redirect_uri(&self) -> String {
        let path = self.redirect_path.trim_start_matches('/');
        format!("http://{}:{}/{path}", self.host, self.port)
    }
}

impl Config {
    /// Load configuration from file and environment
    ///
    /// # Errors
    ///
    /// Returns an error if the config file does not exist or cannot be parsed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut figment = Figment::new();

        if let Some(p) = path {
            if !p.exists() {
                return Err(Error::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            figment = figment.merge(Yaml::file(p));
        }

        // DROPBOX_BROKER_AUTHORIZE__CLIENT_ID -> authorize.client_id
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut config: Self = figment
            .extract()
            .map_err(|e| Error::Config(e.to_string()))?;

        config.load_env_files();
        config.expand_env_vars()?;

        Ok(config)
    }

    /// Load environment files into the process environment.
    /// Supports ~ expansion. Files that don't exist are silently skipped.
    fn load_env_files(&self) {
        for path_str in &self.env_files {
            let expanded = match (path_str.strip_prefix('~'), dirs::home_dir()) {
                (Some(rest), Some(home)) => format!("{}{rest}", home.display()),
                _ => path_str.clone(),
            };

            let path = Path::new(&expanded);
            if !path.exists() {
                tracing::debug!("Env file not found (skipped): {expanded}");
                continue;
            }
            match dotenvy::from_path(path) {
                Ok(()) => tracing::info!("Loaded env file: {expanded}"),
                Err(e) => tracing::warn!("Failed to load env file {expanded}: {e}"),
            }
        }
    }

    /// Expand ${VAR} and ${VAR:-default} in the app key and endpoint URLs
    fn expand_env_vars(&mut self) -> Result<()> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}")
            .map_err(|e| Error::Internal(e.to_string()))?;

        for value in [
            &mut self.authorize.client_id,
            &mut self.provider.token_url,
            &mut self.provider.authorize_url,
        ] {
            *value = Self::expand_string(&re, value);
        }
        Ok(())
    }

    fn expand_string(re: &Regex, value: &str) -> String {
        re.replace_all(value, |caps: &regex::Captures| {
            let default = caps.get(2).map_or("", |m| m.as_str());
            env::var(&caps[1]).unwrap_or_else(|_| default.to_string())
        })
        .into_owned()
    }
}

/// Serde adapter for human-readable durations ("30s", "5m", "250ms")
pub mod humantime_serde {
    use std::time::Duration;

    use serde::{self, Deserialize, Deserializer, Serializer};

    /// Serialize as whole seconds, or milliseconds when not a whole second
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_str(&format!("{}s", duration.as_secs()))
        } else {
            serializer.serialize_str(&format!("{}ms", duration.as_millis()))
        }
    }

    /// Deserialize "100ms", "30s", "5m", "1h" or a bare number of seconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Secs(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Secs(secs) => Ok(Duration::from_secs(secs)),
            Raw::Text(s) => parse(s.trim()).map_err(serde::de::Error::custom),
        }
    }

    pub(crate) fn parse(s: &str) -> Result<Duration, String> {
        let (digits, scale): (&str, fn(u64) -> Duration) = if let Some(ms) = s.strip_suffix("ms") {
            (ms, Duration::from_millis)
        } else if let Some(secs) = s.strip_suffix('s') {
            (secs, Duration::from_secs)
        } else if let Some(mins) = s.strip_suffix('m') {
            (mins, |m| Duration::from_secs(m * 60))
        } else if let Some(hours) = s.strip_suffix('h') {
            (hours, |h| Duration::from_secs(h * 3600))
        } else {
            (s, Duration::from_secs)
        };
        digits
            .trim()
            .parse::<u64>()
            .map(scale)
            .map_err(|e| format!("invalid duration {s:?}: {e}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oauth::{OAuthResponseType, TokenAccessType};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_point_at_dropbox() {
        let config = Config::default();
        assert_eq!(config.provider.token_url, "https://api.dropbox.com/oauth2/token");
        assert_eq!(
            config.provider.authorize_url,
            "https://www.dropbox.com/oauth2/authorize"
        );
        assert_eq!(config.loopback.port, 52475);
        assert_eq!(config.loopback.redirect_uri(), "http://127.0.0.1:52475/");
        assert_eq!(config.authorize.response_type, OAuthResponseType::Code);
    }

    #[test]
    fn load_reads_yaml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broker.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(
            f,
            r#"
server:
  port: 9000
provider:
  request_timeout: "250ms"
authorize:
  client_id: "mg8u3pah8i07t3q"
  token_access_type: offline
  scopes: ["files.read"]
loopback:
  port: 0
  redirect_path: "authorize"
  timeout: "2m"
"#
        )
        .unwrap();
        drop(f);

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.provider.request_timeout, Duration::from_millis(250));
        assert_eq!(config.authorize.client_id, "mg8u3pah8i07t3q");
        assert_eq!(config.authorize.token_access_type, TokenAccessType::Offline);
        assert_eq!(config.authorize.scopes, Some(vec!["files.read".to_string()]));
        assert_eq!(config.loopback.timeout, Duration::from_secs(120));
        assert_eq!(config.loopback.redirect_uri(), "http://127.0.0.1:0/authorize");
    }

    #[test]
    fn load_rejects_missing_file() {
        let err = Config::load(Some(Path::new("/nonexistent/broker.yaml"))).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn env_files_feed_variable_expansion() {
        let dir = tempfile::tempdir().unwrap();
        let env_path = dir.path().join("broker.env");
        std::fs::write(&env_path, "DROPBOX_BROKER_TEST_APP_KEY=from_env_file\n").unwrap();

        let mut config = Config {
            env_files: vec![env_path.to_string_lossy().to_string()],
            ..Default::default()
        };
        config.authorize.client_id = "${DROPBOX_BROKER_TEST_APP_KEY}".to_string();
        config.load_env_files();
        config.expand_env_vars().unwrap();

        assert_eq!(config.authorize.client_id, "from_env_file");
    }

    #[test]
    fn expansion_uses_default_when_unset() {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
        assert_eq!(
            Config::expand_string(&re, "${DROPBOX_BROKER_TEST_UNSET:-fallback}"),
            "fallback"
        );
        assert_eq!(Config::expand_string(&re, "plain"), "plain");
    }

    #[test]
    fn load_env_files_skips_missing() {
        let config = Config {
            env_files: vec!["/nonexistent/path/.env".to_string()],
            ..Default::default()
        };
        config.load_env_files();
    }

    #[test]
    fn duration_parsing() {
        use humantime_serde::parse;
        assert_eq!(parse("100ms").unwrap(), Duration::from_millis(100));
        assert_eq!(parse("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse("1h").unwrap(), Duration::from_secs(3600));
        assert_eq!(parse("7").unwrap(), Duration::from_secs(7));
        assert!(parse("soon").is_err());
    }
}
