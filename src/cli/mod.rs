//! Command-line interface for onionmeet
//!
//! Provides main commands:
//! - `host` - Host a meeting as an onion service
//! - `join` - Join a meeting by its onion address
//! - `check` - Show which Tor and voice client would be used

mod check;
mod host;
mod join;

pub use check::run_check;
pub use host::run_host;
pub use join::run_join;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// onionmeet - Private voice meetings over Tor onion services
#[derive(Parser, Debug)]
#[command(name = "onionmeet")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to configuration directory
    #[arg(long, default_value = "/etc/onionmeet")]
    pub config_dir: PathBuf,

    /// Path to config file (overrides config_dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Host a new meeting and print its meeting ID
    Host(HostArgs),

    /// Join an existing meeting
    Join(JoinArgs),

    /// Diagnose Tor and voice client detection
    Check(CheckArgs),
}

/// Arguments for host command
#[derive(Parser, Debug)]
pub struct HostArgs {
    /// Also open the voice client on the hosted meeting
    #[arg(long, default_value_t = false)]
    pub join: bool,

    /// Name shown to other participants
    #[arg(long)]
    pub username: Option<String>,

    /// Server password passed to the voice client
    #[arg(long)]
    pub password: Option<String>,
}

/// Arguments for join command
#[derive(Parser, Debug)]
pub struct JoinArgs {
    /// Meeting ID (56 chars + .onion)
    #[arg(long)]
    pub meeting_id: String,

    /// Name shown to other participants
    #[arg(long)]
    pub username: Option<String>,

    /// Server password passed to the voice client
    #[arg(long)]
    pub password: Option<String>,
}

/// Arguments for check command
#[derive(Parser, Debug)]
pub struct CheckArgs {
    /// Output format
    #[arg(long, default_value = "text")]
    pub format: String,
}
