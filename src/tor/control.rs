//! Tor Control Port client
//!
//! Communicates with a Tor daemon via the line-oriented control protocol.
//! One client owns at most one TCP session. The session is opened lazily
//! during authentication and, once authenticated, is never reopened behind
//! the caller's back.

use super::onion::{self, HiddenService, KeyType};
use crate::config::TorConfig;
use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Common cookie file locations, tried when PROTOCOLINFO gives no path
const COOKIE_PATHS: &[&str] = &[
    "/run/tor/control.authcookie",
    "/var/run/tor/control.authcookie",
    "/var/lib/tor/control_auth_cookie",
];

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Authentication method accepted by a control port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMethod {
    None,
    Cookie,
    Password,
}

impl std::fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AuthMethod::None => "none",
            AuthMethod::Cookie => "cookie",
            AuthMethod::Password => "password",
        };
        f.write_str(name)
    }
}

/// Connection to a Tor control port
pub struct ControlPortClient {
    host: String,
    port: u16,
    password: Option<String>,
    cookie_paths: Vec<PathBuf>,
    session: Option<BufReader<TcpStream>>,
    auth_method: Option<AuthMethod>,
}

impl ControlPortClient {
    pub fn new(host: impl Into<String>, port: u16, password: Option<String>) -> Self {
        Self {
            host: host.into(),
            port,
            password: password.filter(|p| !p.is_empty()),
            cookie_paths: COOKIE_PATHS.iter().map(PathBuf::from).collect(),
            session: None,
            auth_method: None,
        }
    }

    /// Client for the control port named in the configuration
    pub fn from_config(config: &TorConfig) -> Self {
        Self::new(
            config.control_host.clone(),
            config.control_port,
            config.control_password.clone(),
        )
    }

    /// Override the fallback cookie locations
    pub fn with_cookie_paths(mut self, paths: Vec<PathBuf>) -> Self {
        self.cookie_paths = paths;
        self
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Method bound by a successful [`authenticate`](Self::authenticate)
    pub fn auth_method(&self) -> Option<AuthMethod> {
        self.auth_method
    }

    pub fn uses_cookie(&self) -> bool {
        self.auth_method == Some(AuthMethod::Cookie)
    }

    pub fn is_authenticated(&self) -> bool {
        self.auth_method.is_some()
    }

    /// Check that something accepts TCP connections on the control port
    pub async fn is_reachable(&self) -> bool {
        matches!(
            tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(self.addr())).await,
            Ok(Ok(_))
        )
    }

    async fn open_session(&mut self) -> Result<()> {
        if self.session.is_some() {
            return Ok(());
        }
        if self.auth_method.is_some() {
            // An authenticated session that went away is not replaced
            return Err(Error::Protocol(format!(
                "control session to {} was closed",
                self.addr()
            )));
        }

        let addr = self.addr();
        debug!("Connecting to Tor control port: {}", addr);
        let stream = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
            Ok(result) => result?,
            Err(_) => return Err(Error::Timeout(format!("connecting to {}", addr))),
        };
        self.session = Some(BufReader::new(stream));
        Ok(())
    }

    /// Negotiate authentication
    ///
    /// Tries none, then cookie, then password (only when one is configured),
    /// stopping at the first success. Tor closes the connection after a
    /// failed attempt, so every attempt after a failure starts a new session.
    /// The winning method stays bound to this client.
    pub async fn authenticate(&mut self) -> Result<AuthMethod> {
        if let Some(method) = self.auth_method {
            return Ok(method);
        }

        let mut methods = vec![AuthMethod::None, AuthMethod::Cookie];
        if self.password.is_some() {
            methods.push(AuthMethod::Password);
        }

        for method in methods {
            debug!("Checking Tor control port {} authentication", method);
            match self.try_authenticate(method).await {
                Ok(()) => {
                    info!("Authenticated to {} with {} authentication", self.addr(), method);
                    self.auth_method = Some(method);
                    return Ok(method);
                },
                Err(e) => {
                    debug!("auth-{}: {}", method, e);
                    self.session = None;
                    continue;
                },
            }
        }

        Err(Error::AuthenticationFailed(self.addr()))
    }

    async fn try_authenticate(&mut self, method: AuthMethod) -> Result<()> {
        self.open_session().await?;

        match method {
            AuthMethod::None => {
                self.send_command("AUTHENTICATE\r\n").await?;
            },
            AuthMethod::Cookie => {
                let cookie = self.read_cookie().await?;
                let cookie_hex = data_encoding::HEXLOWER.encode(&cookie);
                self.send_command(&format!("AUTHENTICATE {}\r\n", cookie_hex))
                    .await?;
            },
            AuthMethod::Password => {
                let password = self.password.clone().unwrap_or_default();
                self.send_command(&format!("AUTHENTICATE {}\r\n", quote(&password)))
                    .await?;
            },
        }
        Ok(())
    }

    /// Locate and read the authentication cookie
    async fn read_cookie(&mut self) -> Result<Vec<u8>> {
        let mut candidates = Vec::new();
        match self.send_command("PROTOCOLINFO 1\r\n").await {
            Ok(response) => {
                if let Some(path) = parse_cookie_file(&response) {
                    candidates.push(path);
                }
            },
            Err(e) => debug!("PROTOCOLINFO failed: {}", e),
        }
        candidates.extend(self.cookie_paths.iter().cloned());

        for path in &candidates {
            if let Ok(cookie) = tokio::fs::read(path).await {
                debug!("Read auth cookie from {}", path.display());
                return Ok(cookie);
            }
        }

        Err(Error::NotFound("readable control auth cookie".to_string()))
    }

    /// Send a command and read the response
    ///
    /// Returns every reply line except the final `250 OK`; data blocks keep
    /// their `250+keyword=` header and drop the terminating `.` line.
    async fn send_command(&mut self, cmd: &str) -> Result<String> {
        let addr = self.addr();
        let session = self
            .session
            .as_mut()
            .ok_or(Error::NotInitialized("control port session"))?;

        debug!("Sending Tor command: {}", redact(cmd));
        session.get_mut().write_all(cmd.as_bytes()).await?;
        session.get_mut().flush().await?;

        let mut response = String::new();
        let mut in_data_block = false;

        loop {
            let mut line = String::new();
            let bytes_read = match tokio::time::timeout(READ_TIMEOUT, session.read_line(&mut line)).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!("Timeout waiting for Tor response from {}", addr);
                    return Err(Error::Timeout(format!("reply from {}", addr)));
                },
            };

            if bytes_read == 0 {
                self.session = None;
                return Err(Error::Protocol(format!("connection closed by {}", addr)));
            }
            trace!("Read line: {:?}", line.trim_end());

            // Data block: 250+keyword=\r\n (data lines) .\r\n
            if !in_data_block && line.starts_with("250+") {
                in_data_block = true;
                response.push_str(&line);
                continue;
            }
            if in_data_block {
                if line.trim_end() == "." {
                    in_data_block = false;
                } else {
                    response.push_str(&line);
                }
                continue;
            }

            if is_error_line(&line) {
                let message = line.trim_end().to_string();
                debug!("Tor control error: {}", message);
                return Err(Error::Protocol(message));
            }

            if line.starts_with("250 ") {
                break;
            }

            response.push_str(&line);
        }

        Ok(response)
    }

    /// Get a single GETINFO value
    pub async fn get_info(&mut self, keyword: &str) -> Result<String> {
        let response = self.send_command(&format!("GETINFO {}\r\n", keyword)).await?;
        parse_info_value(&response, keyword)
            .ok_or_else(|| Error::Protocol(format!("GETINFO reply missing {}", keyword)))
    }

    /// Get the daemon version string, e.g. `0.4.8.10`
    pub async fn get_version(&mut self) -> Result<String> {
        let raw = self.get_info("version").await?;
        raw.split_whitespace()
            .next()
            .map(str::to_string)
            .ok_or_else(|| Error::Protocol("empty version reply".to_string()))
    }

    /// SOCKS port of the first SOCKS listener the daemon reports
    pub async fn get_socks_port(&mut self) -> Result<u16> {
        let raw = self.get_info("net/listeners/socks").await?;
        parse_first_listener_port(&raw)
            .ok_or_else(|| Error::Protocol(format!("no SOCKS listener in {:?}", raw)))
    }

    /// Check if Tor is fully bootstrapped
    pub async fn is_bootstrapped(&mut self) -> Result<bool> {
        let response = self.get_info("status/bootstrap-phase").await?;
        Ok(response.contains("PROGRESS=100"))
    }

    /// Create an onion service with a fresh ED25519-V3 key
    ///
    /// `public_port` comes straight from configuration or UI input and is
    /// parsed here; an invalid value fails before anything is sent.
    pub async fn create_hidden_service(
        &mut self,
        destination_host: &str,
        destination_port: u16,
        public_port: &str,
    ) -> Result<HiddenService> {
        let public_port = parse_port(public_port)?;
        self.authenticate().await?;

        let key_type = KeyType::Ed25519V3;
        let cmd = format!(
            "ADD_ONION {} Flags=DiscardPK Port={},{}:{}\r\n",
            key_type.new_key_spec(),
            public_port,
            destination_host,
            destination_port
        );

        info!(
            "Sending ADD_ONION command for port {} -> {}:{}",
            public_port, destination_host, destination_port
        );
        let response = self.send_command(&cmd).await?;

        // Response format: "250-ServiceID=<id>\r\n250 OK"
        let service_id = parse_info_value(&response, "ServiceID")
            .ok_or_else(|| Error::Protocol("ADD_ONION response missing ServiceID".to_string()))?;

        let service = HiddenService {
            onion_address: format!("{}.onion", service_id),
            public_port,
            destination_host: destination_host.to_string(),
            destination_port,
            key_type,
        };
        info!("Created hidden service: {}", service.onion_address);
        Ok(service)
    }

    /// Remove a previously created onion service
    ///
    /// Accepts the ID with or without `.onion`.
    pub async fn delete_hidden_service(&mut self, service_id: &str) -> Result<()> {
        let id = onion::service_id(service_id);
        self.authenticate().await?;
        self.send_command(&format!("DEL_ONION {}\r\n", id)).await?;
        info!("Removed hidden service: {}", id);
        Ok(())
    }

    /// Drop the session; a closed client cannot be reused
    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!("Closed control session to {}", self.addr());
        }
    }
}

/// Parse a port string into a usable, non-zero port
pub fn parse_port(raw: &str) -> Result<u16> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(Error::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

/// `4xx`/`5xx` status lines are errors
fn is_error_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    bytes.len() >= 3
        && matches!(bytes[0], b'4' | b'5')
        && bytes[1].is_ascii_digit()
        && bytes[2].is_ascii_digit()
}

/// Quote a string for the control protocol
fn quote(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Hide AUTHENTICATE arguments from logs
fn redact(cmd: &str) -> String {
    let cmd = cmd.trim_end();
    if cmd.starts_with("AUTHENTICATE ") {
        "AUTHENTICATE [redacted]".to_string()
    } else {
        cmd.chars().take(100).collect()
    }
}

/// Extract `keyword`'s value from a reply
///
/// Handles `250-keyword=value` lines and `250+keyword=` data blocks.
fn parse_info_value(response: &str, keyword: &str) -> Option<String> {
    let mut lines = response.lines();
    while let Some(line) = lines.next() {
        let line = line.trim_end();
        let body = line
            .strip_prefix("250-")
            .or_else(|| line.strip_prefix("250+"))
            .unwrap_or(line);
        let Some(value) = body
            .strip_prefix(keyword)
            .and_then(|rest| rest.strip_prefix('='))
        else {
            continue;
        };

        if line.starts_with("250+") {
            let data: Vec<&str> = lines.by_ref().map(str::trim_end).collect();
            return Some(data.join("\n"));
        }
        return Some(value.to_string());
    }
    None
}

/// Find `COOKIEFILE="..."` in a PROTOCOLINFO reply
fn parse_cookie_file(response: &str) -> Option<PathBuf> {
    let start = response.find("COOKIEFILE=\"")? + "COOKIEFILE=\"".len();
    let mut path = String::new();
    let mut chars = response[start..].chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => path.push(chars.next()?),
            '"' => return Some(PathBuf::from(path)),
            other => path.push(other),
        }
    }
    None
}

/// Port of the first `"host:port"` entry in a listener list
fn parse_first_listener_port(raw: &str) -> Option<u16> {
    raw.split_whitespace()
        .map(|entry| entry.trim_matches('"'))
        .find_map(|entry| entry.rsplit_once(':')?.1.parse().ok())
}
