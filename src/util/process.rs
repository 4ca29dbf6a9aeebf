//! Bounded child-process execution

use crate::error::{Error, Result};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// Run a command to completion, capturing its output
///
/// The child is killed if it outlives `timeout`.
pub async fn capture_output(mut command: Command, timeout: Duration) -> Result<Output> {
    command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let program = format!("{:?}", command.as_std().get_program());
    let child = command.spawn()?;

    match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(output) => Ok(output?),
        Err(_) => {
            debug!("{} did not finish within {:?}", program, timeout);
            Err(Error::Timeout(program))
        },
    }
}
