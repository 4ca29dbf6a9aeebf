//! Configuration loading and validation
//!
//! Handles TOML configuration parsing with strict validation.
//! Every field has a default so an absent or empty file is a valid config.
//! No runtime mutation - configuration is immutable after load.

pub mod file;
mod validation;

pub use file::{load_config, load_from_path};
pub use validation::validate;

use serde::Deserialize;
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub tor: TorConfig,
    pub client: ClientConfig,
    pub server: ServerConfig,
    pub connectivity: ConnectivityConfig,
}

/// Tor daemon discovery and control settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TorConfig {
    /// Host of the system Tor control port probed first
    pub control_host: String,
    pub control_port: u16,
    pub control_password: Option<String>,
    /// SOCKS port assumed when the daemon does not report its listeners
    pub socks_port: u16,
    /// User-configured Tor executable, tried before the search paths
    pub executable_path: Option<PathBuf>,
    /// Common install locations for the Tor executable
    pub search_paths: Vec<PathBuf>,
    /// Fall back to a `PATH` lookup for `tor`
    pub path_lookup: bool,
    /// Oldest Tor version accepted, dotted numeric
    pub min_version: String,
    /// How long a managed Tor may take to open its control port
    pub start_timeout_secs: u64,
    /// How long a managed Tor may take to finish bootstrapping
    pub bootstrap_timeout_secs: u64,
}

impl Default for TorConfig {
    fn default() -> Self {
        Self {
            control_host: "127.0.0.1".to_string(),
            control_port: 9051,
            control_password: None,
            socks_port: 9050,
            executable_path: None,
            search_paths: vec![
                PathBuf::from("/usr/bin/tor"),
                PathBuf::from("/usr/local/bin/tor"),
                PathBuf::from("/usr/sbin/tor"),
            ],
            path_lookup: true,
            min_version: "0.3.5".to_string(),
            start_timeout_secs: 30,
            bootstrap_timeout_secs: 120,
        }
    }
}

/// Voice client (Mumble) resolution and launch settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// User-configured client binary
    pub binary_path: Option<PathBuf>,
    /// Bundled client, relative to the working directory
    pub bundle_path: PathBuf,
    /// System-installed client
    pub system_path: PathBuf,
    /// Upper bound for the `-h` validation run
    pub validate_timeout_secs: u64,
    /// URI scheme passed to the client
    pub scheme: String,
    /// Route the client through `torsocks` when it is installed
    pub torsocks: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            bundle_path: PathBuf::from("mumble/mumble"),
            system_path: PathBuf::from("/usr/bin/mumble"),
            validate_timeout_secs: 10,
            scheme: "mumble".to_string(),
            torsocks: true,
        }
    }
}

/// Local voice server (Murmur) settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// User-configured server binary
    pub binary_path: Option<PathBuf>,
    pub search_paths: Vec<PathBuf>,
    /// Virtual port published on the onion service
    pub public_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            search_paths: vec![
                PathBuf::from("/usr/sbin/murmurd"),
                PathBuf::from("/usr/bin/murmurd"),
            ],
            public_port: 64738,
        }
    }
}

/// End-to-end Tor routing probe
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    /// Endpoint answering `{"IsTor": bool, "IP": "..."}`
    pub check_url: String,
    pub timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            check_url: "https://check.torproject.org/api/ip".to_string(),
            timeout_secs: 30,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.tor.control_port, 9051);
        assert_eq!(config.tor.socks_port, 9050);
        assert_eq!(config.server.public_port, 64738);
        assert!(config.tor.control_password.is_none());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        let config: Config = toml::from_str(
            r#"
            [tor]
            control_port = 9151
            control_password = "secret"
            "#,
        )
        .unwrap();
        assert_eq!(config.tor.control_port, 9151);
        assert_eq!(config.tor.control_host, "127.0.0.1");
        assert_eq!(config.tor.control_password.as_deref(), Some("secret"));
        assert_eq!(config.client.scheme, "mumble");
    }
}
