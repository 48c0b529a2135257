//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Dropbox OAuth2 broker - code exchange and loopback login
#[derive(Parser, Debug)]
#[command(name = "dropbox-oauth-broker")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "DROPBOX_BROKER_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DROPBOX_BROKER_PORT")]
    pub port: Option<u16>,

    /// Host to bind to
    #[arg(long, env = "DROPBOX_BROKER_HOST")]
    pub host: Option<String>,

    /// App key, overriding `authorize.client_id`
    #[arg(long, env = "DROPBOX_APP_KEY", global = true)]
    pub app_key: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "DROPBOX_BROKER_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "DROPBOX_BROKER_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the broker server (default)
    Serve,

    /// Print the authorize URL for the configured loopback redirect
    Url {
        /// PKCE code challenge to include
        #[arg(long)]
        code_challenge: Option<String>,
    },

    /// Run the interactive login and print the authorization code
    Code,

    /// Run the interactive login and exchange the code for a token
    Login {
        /// App secret; PKCE is used when omitted
        #[arg(long, env = "DROPBOX_APP_SECRET", hide_env_values = true)]
        app_secret: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_server_mode() {
        let cli = Cli::try_parse_from(["dropbox-oauth-broker"]).unwrap();
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }

    #[test]
    fn parses_login_with_secret() {
        let cli = Cli::try_parse_from([
            "dropbox-oauth-broker",
            "login",
            "--app-secret",
            "s3cret",
            "--app-key",
            "key",
        ])
        .unwrap();
        assert_eq!(cli.app_key.as_deref(), Some("key"));
        match cli.command {
            Some(Command::Login { app_secret }) => assert_eq!(app_secret.as_deref(), Some("s3cret")),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn command_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
