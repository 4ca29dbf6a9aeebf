//! Configuration validation
//!
//! Fail-fast validation of configuration invariants.

use super::Config;
use crate::tor::version::parse_version;
use anyhow::{bail, Result};

/// Validate configuration invariants
pub fn validate(config: &Config) -> Result<()> {
    validate_tor(config)?;
    validate_client(config)?;
    validate_server(config)?;
    validate_connectivity(config)?;
    Ok(())
}

fn validate_tor(config: &Config) -> Result<()> {
    if config.tor.control_host.is_empty() {
        bail!("tor.control_host cannot be empty");
    }
    if config.tor.control_port == 0 {
        bail!("tor.control_port cannot be 0");
    }
    if config.tor.socks_port == 0 {
        bail!("tor.socks_port cannot be 0");
    }
    if config.tor.control_port == config.tor.socks_port {
        bail!(
            "tor.control_port and tor.socks_port must differ (both {})",
            config.tor.control_port
        );
    }
    if parse_version(&config.tor.min_version).is_none() {
        bail!(
            "tor.min_version is not a dotted version: {:?}",
            config.tor.min_version
        );
    }
    if config.tor.start_timeout_secs == 0 {
        bail!("tor.start_timeout_secs cannot be 0");
    }
    Ok(())
}

fn validate_client(config: &Config) -> Result<()> {
    let scheme = &config.client.scheme;
    if scheme.is_empty()
        || !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
    {
        bail!("client.scheme is not a valid URI scheme: {:?}", scheme);
    }
    if config.client.validate_timeout_secs == 0 {
        bail!("client.validate_timeout_secs cannot be 0");
    }
    Ok(())
}

fn validate_server(config: &Config) -> Result<()> {
    if config.server.public_port == 0 {
        bail!("server.public_port cannot be 0");
    }
    Ok(())
}

fn validate_connectivity(config: &Config) -> Result<()> {
    if !config.connectivity.check_url.starts_with("https://") {
        bail!(
            "connectivity.check_url must be an https URL: {}",
            config.connectivity.check_url
        );
    }
    if config.connectivity.timeout_secs == 0 {
        bail!("connectivity.timeout_secs cannot be 0");
    }
    Ok(())
}
