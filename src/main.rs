// Gatekeeper - Main Entry Point
//
// Management service for the API gateway:
// - Bearer token issuance and verification
// - Per-route quota admission
// - Cache owner usage reconciliation
// - Clock-aligned quota window resets

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gatekeeper::{Config, GatekeeperServer, TokenService};
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// Gatekeeper: token auth and route quotas for an API gateway
#[derive(Parser, Debug)]
#[command(name = "gatekeeper")]
#[command(author = "Gatekeeper Contributors")]
#[command(version = "0.1.0")]
#[command(about = "Token authentication and per-route quotas for an API gateway", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "gatekeeper.toml")]
    config: PathBuf,

    /// Command to run
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the management service
    Serve,
    /// Print a token signed with the configured key
    Token,
    /// Print a new hex-encoded signing key
    Keygen,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = Config::load_from_path(&args.config)
        .with_context(|| format!("Failed to load configuration from {:?}", args.config))?;

    init_tracing(&config, args.verbose)?;

    match args.command {
        Some(Commands::Serve) => {
            info!("Starting gatekeeper v{}", env!("CARGO_PKG_VERSION"));
            GatekeeperServer::from_config(config)?.run().await?;
        }
        Some(Commands::Token) => {
            if config.token.signing_key.is_none() {
                anyhow::bail!(
                    "No signing key configured; a token from an ephemeral key would not verify anywhere"
                );
            }
            let tokens = config.token.token_service()?;
            println!("{}", tokens.issue());
        }
        Some(Commands::Keygen) => {
            let tokens = TokenService::generate();
            println!("{}", tokens.seed_hex());
        }
        None => {
            info!("No command specified. Use \"gatekeeper --help\" for usage.");
        }
    }

    Ok(())
}

/// Logs go to stderr so command output on stdout stays clean
fn init_tracing(config: &Config, verbose: bool) -> Result<()> {
    let level = if verbose {
        Level::DEBUG
    } else {
        config.log_level()?
    };

    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    if config.logging.format.eq_ignore_ascii_case("pretty") {
        builder.pretty().init();
    } else {
        builder.compact().init();
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_parsing() {
        let args = Args::parse_from(["gatekeeper", "serve"]);
        assert!(matches!(args.command, Some(Commands::Serve)));
        assert_eq!(args.config, PathBuf::from("gatekeeper.toml"));

        let args = Args::parse_from(["gatekeeper", "-v", "--config", "/etc/gk.toml", "token"]);
        assert!(args.verbose);
        assert_eq!(args.config, PathBuf::from("/etc/gk.toml"));
        assert!(matches!(args.command, Some(Commands::Token)));
    }
}
