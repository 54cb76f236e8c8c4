//! eBay connection service
//!
//! HTTP server and command-line tools for the eBay OAuth connection.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use reqwest::Method;
use tracing::{error, info, warn};

use ebay_connect::{
    Error, Result,
    api::RequestOptions,
    cli::{Cli, Command},
    config::{Config, EbayConfig, is_configured},
    oauth::{FileTokenStore, TokenStore},
    server::{AppState, Server},
    services::Services,
    setup_tracing,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = setup_tracing(&cli.log_level, cli.log_format.as_deref()) {
        eprintln!("Failed to setup tracing: {e}");
        return ExitCode::FAILURE;
    }

    if let Err(e) = dotenvy::dotenv() {
        tracing::debug!("No .env loaded: {e}");
    }

    let mut config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            error!(error = %e, "Failed to load configuration");
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = cli.token_path {
        config.storage.token_path = Some(path);
    }

    let result = match cli.command {
        Some(Command::Serve { port, host }) => run_server(config, port, host).await,
        None => run_server(config, None, None).await,
        Some(cmd) => run_command(&config, cmd).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("❌ {}", e.user_message());
            ExitCode::FAILURE
        }
    }
}

fn open_store(config: &Config) -> Result<Arc<dyn TokenStore>> {
    let path = config.token_path()?;
    Ok(Arc::new(FileTokenStore::new(path)?))
}

fn connect(config: &Config) -> Result<Services> {
    let ebay = EbayConfig::resolve()?;
    Services::new(config, ebay, open_store(config)?)
}

/// Run the HTTP server
async fn run_server(mut config: Config, port: Option<u16>, host: Option<String>) -> Result<()> {
    if let Some(port) = port {
        config.server.port = port;
    }
    if let Some(host) = host {
        config.server.host = host;
    }

    let store = open_store(&config)?;
    let services = if is_configured() {
        Some(Services::new(&config, EbayConfig::resolve()?, Arc::clone(&store))?)
    } else {
        warn!("eBay credentials are not configured");
        None
    };

    let state = AppState {
        services,
        store,
        settings_url: config.server.settings_url.clone(),
    };

    Server::new(config, state).run().await
}

/// Run a one-shot command
async fn run_command(config: &Config, cmd: Command) -> Result<()> {
    match cmd {
        Command::AuthUrl => {
            let services = connect(config)?;
            println!("{}", services.tokens.authorization_url()?);
        }
        Command::Exchange { code } => {
            let services = connect(config)?;
            let record = services.tokens.exchange_code(&code).await?;
            println!("✅ Connected. Access token expires at {}", record.access_expires_at);
        }
        Command::Status => {
            if !is_configured() {
                println!("eBay integration is not configured");
                return Ok(());
            }
            let status = connect(config)?.tokens.connection_status().await?;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }
        Command::Refresh => {
            let services = connect(config)?;
            let current = services
                .tokens
                .stored_token()
                .await?
                .ok_or(Error::NotConnected)?;
            let record = services.tokens.refresh(&current.refresh_token).await?;
            println!("✅ Refreshed. Access token expires at {}", record.access_expires_at);
        }
        Command::Disconnect => {
            open_store(config)?.delete().await?;
            println!("✅ Disconnected");
        }
        Command::Get { endpoint, query } => {
            let services = connect(config)?;
            let mut options = RequestOptions::new(Method::GET);
            options.query = query;
            let value: serde_json::Value = services.client.request(&endpoint, options).await?;
            println!("{}", serde_json::to_string_pretty(&value)?);
        }
        Command::Serve { .. } => {
            info!("Serve is handled by run_server");
        }
    }
    Ok(())
}
