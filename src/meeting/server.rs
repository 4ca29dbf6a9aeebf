//! Local voice server
//!
//! The hosted meeting needs a voice server listening on loopback. The
//! process-backed implementation runs a murmur-compatible server in the
//! foreground with a throwaway configuration and database.

use crate::config::ServerConfig;
use crate::error::{Error, Result};
use crate::util::rand::backoff;
use crate::util::Cascade;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tracing::{debug, error, info};

const SERVER_INI: &str = "murmur.ini";
const START_ATTEMPTS: u32 = 20;

/// A voice server that can be started on a loopback port and stopped again
pub trait VoiceServer: Send {
    fn start(&mut self, port: u16) -> impl Future<Output = Result<()>> + Send;

    /// Stop the server; stopping a server that is not running is a no-op
    fn stop(&mut self) -> impl Future<Output = Result<()>> + Send;
}

struct RunningServer {
    child: Child,
    dir: TempDir,
}

/// [`VoiceServer`] running an external server executable
pub struct ProcessVoiceServer {
    executable: PathBuf,
    running: Option<RunningServer>,
}

impl ProcessVoiceServer {
    pub fn new(executable: PathBuf) -> Self {
        Self {
            executable,
            running: None,
        }
    }

    /// Locate the server executable: configured path, search paths, `PATH`
    pub async fn locate(config: &ServerConfig) -> Result<Self> {
        let mut cascade = Cascade::new("voice server");

        if let Some(path) = config.binary_path.clone() {
            cascade = cascade.step(format!("configured {}", path.display()), move || async move {
                existing_file(path)
            });
        }
        for path in config.search_paths.iter().cloned() {
            cascade = cascade.step(path.display().to_string(), move || async move { existing_file(path) });
        }
        cascade = cascade.step("PATH lookup", || async {
            which::which("murmurd").map_err(|e| Error::NotFound(format!("murmurd on PATH: {}", e)))
        });

        let executable = cascade.run().await.ok_or(Error::NoUsableServer)?;
        Ok(Self::new(executable))
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn pid(&self) -> Option<u32> {
        self.running.as_ref().and_then(|r| r.child.id())
    }
}

fn existing_file(path: PathBuf) -> Result<PathBuf> {
    if path.is_file() {
        Ok(path)
    } else {
        Err(Error::NotFound(path.display().to_string()))
    }
}

/// Server configuration bound to loopback with a private database
fn server_ini(dir: &Path, port: u16) -> String {
    format!(
        "host=127.0.0.1\n\
         port={port}\n\
         database={db}\n\
         logfile={log}\n\
         pidfile=\n\
         bonjour=false\n\
         registerName=\n\
         welcometext=\n",
        port = port,
        db = dir.join("murmur.sqlite").display(),
        log = dir.join("murmur.log").display(),
    )
}

async fn wait_for_listener(child: &mut Child, port: u16) -> Result<()> {
    for attempt in 0..START_ATTEMPTS {
        if let Some(status) = child.try_wait()? {
            return Err(Error::Invalid(format!(
                "voice server exited during startup with {}",
                status
            )));
        }
        if TcpStream::connect(("127.0.0.1", port)).await.is_ok() {
            return Ok(());
        }
        tokio::time::sleep(backoff(attempt, Duration::from_millis(100), Duration::from_secs(2))).await;
    }

    Err(Error::Timeout(format!("voice server on 127.0.0.1:{}", port)))
}

impl VoiceServer for ProcessVoiceServer {
    async fn start(&mut self, port: u16) -> Result<()> {
        if self.running.is_some() {
            return Err(Error::AlreadyExists("voice server is already running".into()));
        }

        let dir = tempfile::Builder::new().prefix("onionmeet-server-").tempdir()?;
        let ini = dir.path().join(SERVER_INI);
        std::fs::write(&ini, server_ini(dir.path(), port))?;

        let mut child = Command::new(&self.executable)
            .arg("-fg")
            .arg("-ini")
            .arg(&ini)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()?;

        debug!("Waiting for voice server on 127.0.0.1:{}", port);
        if let Err(e) = wait_for_listener(&mut child, port).await {
            let _ = child.kill().await;
            return Err(e);
        }

        info!("Voice server listening on 127.0.0.1:{} (pid {:?})", port, child.id());
        self.running = Some(RunningServer { child, dir });
        Ok(())
    }

    async fn stop(&mut self) -> Result<()> {
        let Some(RunningServer { mut child, dir }) = self.running.take() else {
            return Ok(());
        };

        let killed = child.kill().await;
        if let Err(e) = dir.close() {
            error!("An error occurred while removing the voice server directory: {}", e);
        }
        killed?;
        info!("Voice server stopped");
        Ok(())
    }
}
