//! Dropbox OAuth broker - authorization-code exchange and loopback login

use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info};

use dropbox_oauth_broker::{
    broker::{Broker, http_client},
    cli::{Cli, Command},
    config::Config,
    oauth::{CodeFlow, TokenExchanger, TokenRequest, generate_pkce},
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Some(Command::Url { code_challenge }) => run_url(&config, code_challenge.as_deref()),
        Some(Command::Code) => run_code(&config).await,
        Some(Command::Login { app_secret }) => run_login(&config, app_secret).await,
        Some(Command::Serve) | None => run_server(config).await,
    }
}

/// Load configuration and apply CLI overrides
fn load_config(cli: &Cli) -> dropbox_oauth_broker::Result<Config> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(ref host) = cli.host {
        config.server.host.clone_from(host);
    }
    if let Some(ref app_key) = cli.app_key {
        config.authorize.client_id.clone_from(app_key);
    }
    Ok(config)
}

/// Print the authorize URL
fn run_url(config: &Config, code_challenge: Option<&str>) -> ExitCode {
    match CodeFlow::from_config(config).authorization_url(code_challenge) {
        Ok(url) => {
            println!("{url}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::FAILURE
        }
    }
}

/// Interactive login, print the code
async fn run_code(config: &Config) -> ExitCode {
    match CodeFlow::from_config(config).acquire_code(None).await {
        Ok(captured) => {
            println!("{}", captured.code);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Authorization failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Interactive login followed by the token exchange
async fn run_login(config: &Config, app_secret: Option<String>) -> ExitCode {
    let flow = CodeFlow::from_config(config);
    let pkce = app_secret.is_none().then(generate_pkce);

    let captured = match flow
        .acquire_code(pkce.as_ref().map(|p| p.challenge.as_str()))
        .await
    {
        Ok(captured) => captured,
        Err(e) => {
            eprintln!("❌ Authorization failed: {e}");
            return ExitCode::FAILURE;
        }
    };

    let exchanger = match http_client() {
        Ok(client) => TokenExchanger::new(
            client,
            config.provider.token_url.clone(),
            config.provider.request_timeout,
        ),
        Err(e) => {
            eprintln!("❌ {e}");
            return ExitCode::FAILURE;
        }
    };

    let request = TokenRequest {
        code: Some(captured.code),
        app_key: Some(config.authorize.client_id.clone()),
        app_secret,
        code_verifier: pkce.map(|p| p.verifier),
        redirect_uri: Some(captured.redirect_uri),
    };

    match exchanger.exchange(&request).await {
        Ok(token) => match serde_json::to_string_pretty(&token) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("❌ Failed to serialize token: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("❌ Token exchange failed: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run the broker server
async fn run_server(config: Config) -> ExitCode {
    info!(
        version = env!("CARGO_PKG_VERSION"),
        port = config.server.port,
        "Starting Dropbox OAuth broker"
    );

    let broker = match Broker::new(config) {
        Ok(b) => b,
        Err(e) => {
            error!("Failed to create broker: {e}");
            return ExitCode::FAILURE;
        }
    };

    if let Err(e) = broker.run().await {
        error!("Broker error: {e}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
