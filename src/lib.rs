//! onionmeet library crate
//!
//! Private voice meetings hosted and joined over Tor onion services.
//!
//! # Modules
//!
//! - [`cli`] - Command-line interface (host, join, check)
//! - [`client`] - Voice client binary resolution and process supervision
//! - [`config`] - Configuration loading and validation
//! - [`error`] - Library error type
//! - [`meeting`] - Hosting, joining and teardown of meetings
//! - [`state`] - Session owning the Tor instance and client copy
//! - [`tor`] - Control port, onion services, Tor detection
//! - [`util`] - Fallback cascades, ports, processes, randomization

// Allow common stylistic patterns.
#![allow(clippy::doc_markdown)] // Doc formatting is secondary
#![allow(clippy::uninlined_format_args)] // Format string style preference
#![allow(clippy::missing_const_for_fn)] // Const fn optimization is low priority
#![allow(clippy::option_if_let_else)] // Style preference
#![allow(clippy::single_match_else)] // Match for clarity
#![allow(clippy::map_unwrap_or)] // map().unwrap_or is clearer
#![allow(clippy::redundant_closure_for_method_calls)] // Explicit closures
#![allow(clippy::significant_drop_tightening)] // Lock scope is intentional
#![allow(clippy::unnecessary_debug_formatting)] // Debug format for paths
#![allow(clippy::module_name_repetitions)] // VoiceServer in meeting::server

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod logging;
pub mod meeting;
pub mod state;
pub mod tor;
pub mod util;

pub use error::{Error, Result};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
