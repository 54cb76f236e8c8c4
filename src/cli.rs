//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// eBay connection service - OAuth token lifecycle and listing API access
#[derive(Parser, Debug)]
#[command(name = "ebay-connect")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (YAML)
    #[arg(short, long, env = "EBAY_CONNECT_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Token file path (overrides config)
    #[arg(long, env = "EBAY_CONNECT_TOKEN_PATH", global = true)]
    pub token_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(
        long,
        default_value = "info",
        env = "EBAY_CONNECT_LOG_LEVEL",
        global = true
    )]
    pub log_level: String,

    /// Log format (text, json)
    #[arg(long, env = "EBAY_CONNECT_LOG_FORMAT", global = true)]
    pub log_format: Option<String>,

    /// Subcommand (optional - defaults to server mode)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server (default)
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Host to bind to
        #[arg(long)]
        host: Option<String>,
    },

    /// Print the eBay authorization URL
    AuthUrl,

    /// Exchange an authorization code for tokens
    Exchange {
        /// Code from the OAuth callback
        #[arg(required = true)]
        code: String,
    },

    /// Show connection status
    Status,

    /// Refresh the access token now
    Refresh,

    /// Delete stored tokens
    Disconnect,

    /// Authenticated GET against the eBay API
    Get {
        /// Path (e.g. `/sell/inventory/v1/offer`) or full URL
        #[arg(required = true)]
        endpoint: String,

        /// Query parameters as key=value
        #[arg(short, long = "query", value_parser = parse_key_val)]
        query: Vec<(String, String)>,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected key=value, got `{s}`"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_get_with_query() {
        let cli = Cli::parse_from([
            "ebay-connect",
            "get",
            "/sell/inventory/v1/offer",
            "-q",
            "sku=ITEM-1",
        ]);
        match cli.command {
            Some(Command::Get { endpoint, query }) => {
                assert_eq!(endpoint, "/sell/inventory/v1/offer");
                assert_eq!(query, vec![("sku".to_string(), "ITEM-1".to_string())]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_query() {
        assert!(Cli::try_parse_from(["ebay-connect", "get", "/x", "-q", "novalue"]).is_err());
    }

    #[test]
    fn defaults_to_server_mode() {
        let cli = Cli::parse_from(["ebay-connect"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.log_level, "info");
    }
}
