//! End-to-end check that traffic is routed through Tor
//!
//! Makes one HTTPS request through the daemon's SOCKS proxy to an endpoint
//! that reports whether the request arrived from a Tor exit. Every failure
//! resolves to `false`; retry policy belongs to the caller.

use crate::config::ConnectivityConfig;
use serde::Deserialize;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info};

/// Probe confirming a SOCKS port routes through Tor
pub trait Connectivity: Send + Sync {
    fn check(&self, host: &str, socks_port: u16) -> impl Future<Output = bool> + Send;
}

/// Body returned by the check endpoint
#[derive(Debug, Deserialize)]
struct CheckTorResult {
    #[serde(rename = "IsTor")]
    is_tor: bool,
    #[serde(rename = "IP", default)]
    ip: Option<String>,
}

/// [`Connectivity`] backed by `check.torproject.org` (or a configured clone)
#[derive(Debug, Clone)]
pub struct TorCheck {
    url: String,
    timeout: Duration,
}

impl TorCheck {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
        }
    }

    pub fn from_config(config: &ConnectivityConfig) -> Self {
        Self::new(
            config.check_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn probe(&self, host: &str, socks_port: u16) -> anyhow::Result<bool> {
        // socks5h so name resolution also happens inside Tor
        let socks_url = format!("socks5h://{}:{}", host, socks_port);

        let client = reqwest::Client::builder()
            .proxy(reqwest::Proxy::all(&socks_url)?)
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()?;

        let result: CheckTorResult = client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!(
            "Check endpoint answered IsTor={} IP={}",
            result.is_tor,
            result.ip.as_deref().unwrap_or("?")
        );
        Ok(result.is_tor)
    }
}

impl Connectivity for TorCheck {
    async fn check(&self, host: &str, socks_port: u16) -> bool {
        match self.probe(host, socks_port).await {
            Ok(is_tor) => {
                info!("Connectivity over {}:{}: is_tor={}", host, socks_port, is_tor);
                is_tor
            },
            Err(e) => {
                debug!("Connectivity check via {}:{} failed: {}", host, socks_port, e);
                false
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{Ipv4Addr, TcpListener};

    #[test]
    fn test_decode_check_body() {
        let body = r#"{"IsTor":true,"IP":"185.220.101.1"}"#;
        let result: CheckTorResult = serde_json::from_str(body).unwrap();
        assert!(result.is_tor);
        assert_eq!(result.ip.as_deref(), Some("185.220.101.1"));

        let result: CheckTorResult = serde_json::from_str(r#"{"IsTor":false}"#).unwrap();
        assert!(!result.is_tor);
    }

    #[tokio::test]
    async fn test_unreachable_proxy_is_false() {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        let check = TorCheck::new("https://check.torproject.org/api/ip", Duration::from_secs(2));
        assert!(!check.check("127.0.0.1", port).await);
    }
}
