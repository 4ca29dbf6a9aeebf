//! onionmeet - private voice meetings over Tor onion services
//!
//! Hosts a local voice server behind an ephemeral onion service, or joins
//! one with a local voice client routed through Tor.
//!
//! # Tor
//!
//! An already running system Tor is adopted when its control port accepts
//! us, it is recent enough and traffic through it really exits via Tor.
//! Otherwise a private Tor is started for the lifetime of the process.
//!
//! # Usage
//!
//! ```bash
//! # Host a meeting and join it yourself
//! onionmeet host --join --username alice
//!
//! # Join someone else's meeting
//! onionmeet join --meeting-id <ID>.onion --username bob
//!
//! # Show which Tor and voice client would be used
//! onionmeet check
//! ```

#![allow(clippy::uninlined_format_args)]

use anyhow::Result;
use clap::Parser;
use onionmeet::cli::{self, Cli, Commands};
use onionmeet::{config, logging};
use tracing::{debug, Level};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init_with_level(Level::DEBUG);
    } else {
        logging::init();
    }
    debug!("onionmeet v{} starting", onionmeet::VERSION);

    let config = config::load_config(cli.config.as_deref(), &cli.config_dir)?;

    match &cli.command {
        Commands::Host(args) => {
            cli::run_host(config, args).await?;
        },
        Commands::Join(args) => {
            cli::run_join(config, args).await?;
        },
        Commands::Check(args) => {
            cli::run_check(config, args).await?;
        },
    }

    Ok(())
}
