//! Running voice client process
//!
//! The child is owned by a background task that waits for it to exit or for
//! a cancel request, whichever comes first. The exit is published exactly
//! once; dropping the handle cancels the child.

use crate::error::{Error, Result};
use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How a client run ended
#[derive(Debug)]
pub struct ClientExit {
    pub status: Option<ExitStatus>,
    pub cancelled: bool,
}

impl ClientExit {
    pub fn success(&self) -> bool {
        !self.cancelled && self.status.map(|s| s.success()).unwrap_or(false)
    }
}

/// Handle to a spawned voice client
#[derive(Debug)]
pub struct RunningClient {
    pid: Option<u32>,
    cancel: Option<oneshot::Sender<()>>,
    done: Option<oneshot::Receiver<ClientExit>>,
}

impl RunningClient {
    /// Spawn `program` with `args` and extra environment
    pub fn start(program: &Path, args: &[OsString], env: &[(String, String)]) -> Result<Self> {
        let mut command = Command::new(program);
        command
            .args(args)
            .envs(env.iter().map(|(k, v)| (k, v)))
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = command.spawn()?;
        let pid = child.id();
        info!("Started voice client {} (pid {:?})", program.display(), pid);

        let (cancel_tx, mut cancel_rx) = oneshot::channel::<()>();
        let (done_tx, done_rx) = oneshot::channel();

        tokio::spawn(async move {
            let exit = tokio::select! {
                status = child.wait() => {
                    let status = match status {
                        Ok(status) => Some(status),
                        Err(e) => {
                            warn!("Waiting on voice client failed: {}", e);
                            None
                        },
                    };
                    ClientExit { status, cancelled: false }
                },
                _ = &mut cancel_rx => {
                    debug!("Cancelling voice client (pid {:?})", pid);
                    if let Err(e) = child.kill().await {
                        warn!("Failed to kill voice client: {}", e);
                    }
                    ClientExit { status: child.try_wait().ok().flatten(), cancelled: true }
                },
            };

            info!("Voice client finished: {:?}", exit);
            // Nobody listening is fine
            let _ = done_tx.send(exit);
        });

        Ok(Self {
            pid,
            cancel: Some(cancel_tx),
            done: Some(done_rx),
        })
    }

    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Ask the background task to kill the child
    pub fn cancel(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
    }

    /// Hand the completion signal to another observer
    ///
    /// After this, [`RunningClient::wait`] on this handle fails.
    pub fn take_completion(&mut self) -> Option<oneshot::Receiver<ClientExit>> {
        self.done.take()
    }

    /// Wait for the child to exit
    ///
    /// Cancel safe: if this future is dropped before the exit arrives, a
    /// later `wait` or `stop` still observes it.
    pub async fn wait(&mut self) -> Result<ClientExit> {
        let done = self
            .done
            .as_mut()
            .ok_or_else(|| Error::Invalid("voice client exit already observed".into()))?;
        let exit = done.await;
        self.done = None;
        exit.map_err(|_| Error::Protocol("voice client monitor went away".into()))
    }

    /// Cancel the child and wait for it
    pub async fn stop(&mut self) -> Result<ClientExit> {
        self.cancel();
        self.wait().await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    fn sh(script: &str) -> Vec<OsString> {
        vec!["-c".into(), script.into()]
    }

    #[tokio::test]
    async fn test_natural_exit_is_reported() {
        let mut client = RunningClient::start(Path::new("sh"), &sh("exit 0"), &[]).unwrap();
        let exit = client.wait().await.unwrap();
        assert!(!exit.cancelled);
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_env_is_passed() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env");
        let env = vec![("ONIONMEET_TEST_VAR".to_string(), "present".to_string())];
        let script = format!("printf '%s' \"$ONIONMEET_TEST_VAR\" > '{}'", out.display());

        let mut client = RunningClient::start(Path::new("sh"), &sh(&script), &env).unwrap();
        client.wait().await.unwrap();
        assert_eq!(std::fs::read_to_string(&out).unwrap(), "present");
    }

    #[tokio::test]
    async fn test_cancel_kills_child() {
        let mut client = RunningClient::start(Path::new("sh"), &sh("sleep 30"), &[]).unwrap();
        assert!(client.pid().is_some());

        let exit = tokio::time::timeout(Duration::from_secs(5), client.stop())
            .await
            .unwrap()
            .unwrap();
        assert!(exit.cancelled);
        assert!(!exit.success());
    }

    #[tokio::test]
    async fn test_interrupted_wait_keeps_exit_for_stop() {
        let mut client = RunningClient::start(Path::new("sh"), &sh("sleep 30"), &[]).unwrap();

        let interrupted = tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(200)) => true,
            _ = client.wait() => false,
        };
        assert!(interrupted, "client exited on its own");

        let exit = tokio::time::timeout(Duration::from_secs(5), client.stop())
            .await
            .unwrap()
            .unwrap();
        assert!(exit.cancelled);
        assert!(matches!(client.wait().await, Err(Error::Invalid(_))));
    }

    #[tokio::test]
    async fn test_exit_observed_once() {
        let mut client = RunningClient::start(Path::new("sh"), &sh("exit 3"), &[]).unwrap();
        let receiver = client.take_completion().unwrap();
        let exit = receiver.await.unwrap();
        assert_eq!(exit.status.and_then(|s| s.code()), Some(3));
        assert!(matches!(client.wait().await, Err(Error::Invalid(_))));
    }

    #[test]
    fn test_missing_program_fails_to_start() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let _guard = runtime.enter();
        let result = RunningClient::start(Path::new("/nonexistent/voice-client"), &[], &[]);
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
