//! Test doubles shared by the integration tests
//!
//! `FakeTor` speaks enough of the control protocol for authentication,
//! GETINFO and onion service management. Every command it receives is
//! appended to an event log, which the other doubles can share so tests can
//! assert on ordering across components.

#![allow(dead_code)]

use onionmeet::meeting::VoiceServer;
use onionmeet::tor::Connectivity;
use onionmeet::{Error, Result};
use std::net::{Ipv4Addr, TcpListener as StdListener};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

pub const SERVICE_ID: &str = "pg6mmjiyjmcrsslvykfwnntlaru7p5svn6y2ymmju6nubxndf4pscryd";

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// What the fake daemon accepts as AUTHENTICATE
#[derive(Debug, Clone)]
pub enum Accept {
    Null,
    Cookie(Vec<u8>),
    Password(String),
}

#[derive(Debug, Clone)]
pub struct FakeTorConfig {
    pub accept: Accept,
    pub cookie_file: Option<PathBuf>,
    pub version: String,
    pub socks_listener: Option<String>,
    pub reject_add_onion: bool,
    /// Answer every DEL_ONION as if the service were already gone
    pub forget_onions: bool,
}

impl Default for FakeTorConfig {
    fn default() -> Self {
        Self {
            accept: Accept::Null,
            cookie_file: None,
            version: "0.4.8.10".to_string(),
            socks_listener: Some("\"127.0.0.1:9050\"".to_string()),
            reject_add_onion: false,
            forget_onions: false,
        }
    }
}

pub struct FakeTor {
    pub port: u16,
    log: EventLog,
    handle: JoinHandle<()>,
}

impl FakeTor {
    pub async fn start(config: FakeTorConfig) -> Self {
        Self::start_with_log(config, EventLog::default()).await
    }

    pub async fn start_with_log(config: FakeTorConfig, log: EventLog) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        Self::listen(listener, config, log)
    }

    /// Serve on a port chosen elsewhere, e.g. from a generated torrc
    pub async fn start_on(port: u16, config: FakeTorConfig) -> Self {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port)).await.unwrap();
        Self::listen(listener, config, EventLog::default())
    }

    fn listen(listener: TcpListener, config: FakeTorConfig, log: EventLog) -> Self {
        let port = listener.local_addr().unwrap().port();
        let config = Arc::new(config);

        let accept_log = log.clone();
        let handle = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let config = config.clone();
                let log = accept_log.clone();
                tokio::spawn(async move {
                    let _ = serve(stream, &config, &log).await;
                });
            }
        });

        Self { port, log, handle }
    }

    pub fn log(&self) -> EventLog {
        self.log.clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.commands().iter().filter(|c| c.starts_with(prefix)).count()
    }

    /// AUTHENTICATE commands in the order received
    pub fn auth_attempts(&self) -> Vec<String> {
        self.commands()
            .into_iter()
            .filter(|c| c.starts_with("AUTHENTICATE"))
            .collect()
    }
}

impl Drop for FakeTor {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn serve(stream: TcpStream, config: &FakeTorConfig, log: &EventLog) -> std::io::Result<()> {
    let mut stream = BufReader::new(stream);
    let mut authenticated = false;

    loop {
        let mut line = String::new();
        if stream.read_line(&mut line).await? == 0 {
            return Ok(());
        }
        let line = line.trim_end().to_string();
        log.lock().unwrap().push(line.clone());

        let (verb, arg) = match line.split_once(' ') {
            Some((verb, arg)) => (verb, arg),
            None => (line.as_str(), ""),
        };

        let reply = match verb {
            "PROTOCOLINFO" => {
                let mut reply = String::from("250-PROTOCOLINFO 1\r\n250-AUTH METHODS=NULL,COOKIE,HASHEDPASSWORD");
                if let Some(path) = &config.cookie_file {
                    reply.push_str(&format!(" COOKIEFILE=\"{}\"", path.display()));
                }
                reply.push_str(&format!("\r\n250-VERSION Tor=\"{}\"\r\n250 OK\r\n", config.version));
                reply
            },
            "AUTHENTICATE" => {
                if accepts(&config.accept, arg) {
                    authenticated = true;
                    "250 OK\r\n".to_string()
                } else {
                    stream
                        .get_mut()
                        .write_all(b"515 Authentication failed: Wrong credentials.\r\n")
                        .await?;
                    return Ok(());
                }
            },
            _ if !authenticated => {
                stream
                    .get_mut()
                    .write_all(b"514 Authentication required.\r\n")
                    .await?;
                return Ok(());
            },
            "GETINFO" => match arg {
                "version" => format!("250-version={} (git-0123456789abcdef)\r\n250 OK\r\n", config.version),
                "net/listeners/socks" => match &config.socks_listener {
                    Some(listeners) => format!("250-net/listeners/socks={}\r\n250 OK\r\n", listeners),
                    None => "552 Unrecognized key \"net/listeners/socks\"\r\n".to_string(),
                },
                "status/bootstrap-phase" => {
                    "250-status/bootstrap-phase=NOTICE BOOTSTRAP PROGRESS=100 TAG=done SUMMARY=\"Done\"\r\n250 OK\r\n"
                        .to_string()
                },
                other => format!("552 Unrecognized key \"{}\"\r\n", other),
            },
            "ADD_ONION" if config.reject_add_onion => "512 Invalid VIRTPORT/TARGET\r\n".to_string(),
            "ADD_ONION" => format!("250-ServiceID={}\r\n250 OK\r\n", SERVICE_ID),
            "DEL_ONION" if arg == SERVICE_ID && !config.forget_onions => "250 OK\r\n".to_string(),
            "DEL_ONION" => "552 Unknown Onion Service id\r\n".to_string(),
            _ => format!("510 Unrecognized command \"{}\"\r\n", verb),
        };

        stream.get_mut().write_all(reply.as_bytes()).await?;
    }
}

fn accepts(accept: &Accept, arg: &str) -> bool {
    match accept {
        Accept::Null => arg.is_empty(),
        Accept::Cookie(cookie) => arg == data_encoding::HEXLOWER.encode(cookie),
        Accept::Password(password) => arg == format!("\"{}\"", password),
    }
}

/// A loopback port nothing listens on
pub fn closed_port() -> u16 {
    let listener = StdListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
    listener.local_addr().unwrap().port()
}

/// Connectivity probe with a fixed answer that records its calls
#[derive(Debug, Clone)]
pub struct FakeConnectivity {
    answer: bool,
    calls: Arc<Mutex<Vec<(String, u16)>>>,
}

impl FakeConnectivity {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            calls: Arc::default(),
        }
    }

    pub fn calls(&self) -> Vec<(String, u16)> {
        self.calls.lock().unwrap().clone()
    }
}

impl Connectivity for FakeConnectivity {
    async fn check(&self, host: &str, socks_port: u16) -> bool {
        self.calls.lock().unwrap().push((host.to_string(), socks_port));
        self.answer
    }
}

/// Voice server that only records start and stop into an event log
pub struct FakeVoiceServer {
    log: EventLog,
    port: Option<u16>,
    fail_start: bool,
}

impl FakeVoiceServer {
    pub fn new(log: EventLog) -> Self {
        Self {
            log,
            port: None,
            fail_start: false,
        }
    }

    pub fn failing(log: EventLog) -> Self {
        Self {
            fail_start: true,
            ..Self::new(log)
        }
    }

    pub fn port(&self) -> Option<u16> {
        self.port
    }
}

impl VoiceServer for FakeVoiceServer {
    async fn start(&mut self, port: u16) -> Result<()> {
        self.log.lock().unwrap().push(format!("server:start {}", port));
        if self.fail_start {
            return Err(Error::Invalid("voice server refused to start".into()));
        }
        self.port = Some(port);
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        self.log.lock().unwrap().push("server:stop".to_string());
        self.port = None;
        Ok(())
    }
}

/// Tor settings pointing at a fake daemon with no executables to fall back on
pub fn tor_config(control_port: u16, dir: &std::path::Path) -> onionmeet::config::TorConfig {
    onionmeet::config::TorConfig {
        control_host: "127.0.0.1".to_string(),
        control_port,
        control_password: None,
        executable_path: None,
        search_paths: vec![dir.join("no-tor-here")],
        path_lookup: false,
        start_timeout_secs: 2,
        bootstrap_timeout_secs: 2,
        ..onionmeet::config::TorConfig::default()
    }
}
