//! Tor executable discovery
//!
//! Candidates are tried in order: configured path, common install paths,
//! then a `PATH` lookup. A candidate is accepted only when `--version`
//! parses and is at least the configured minimum.

use super::version::{version_compatible, version_from_output};
use crate::config::TorConfig;
use crate::error::{Error, Result};
use crate::util::process::capture_output;
use crate::util::Cascade;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

const VERSION_TIMEOUT: Duration = Duration::from_secs(10);

/// A Tor executable that passed the version check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TorExecutable {
    pub path: PathBuf,
    pub version: String,
}

/// Check one candidate executable
pub async fn probe_executable(path: &Path, min_version: &str) -> Result<TorExecutable> {
    if !path.is_file() {
        return Err(Error::NotFound(path.display().to_string()));
    }

    let mut command = Command::new(path);
    command.arg("--version");
    let output = capture_output(command, VERSION_TIMEOUT).await?;
    let stdout = String::from_utf8_lossy(&output.stdout);

    let version = version_from_output(&stdout).ok_or_else(|| {
        Error::Invalid(format!(
            "{}: unparsable --version output {:?}",
            path.display(),
            stdout.trim()
        ))
    })?;

    if !version_compatible(&version, min_version) {
        return Err(Error::IncompatibleVersion {
            found: version,
            minimum: min_version.to_string(),
        });
    }

    debug!("Tor executable {} has version {}", path.display(), version);
    Ok(TorExecutable {
        path: path.to_path_buf(),
        version,
    })
}

/// Find the first acceptable Tor executable
pub async fn find_executable(config: &TorConfig) -> Option<TorExecutable> {
    let min_version = config.min_version.as_str();
    let mut cascade = Cascade::new("tor executable");

    if let Some(path) = config.executable_path.clone() {
        cascade = cascade.step(format!("configured {}", path.display()), move || async move {
            probe_executable(&path, min_version).await
        });
    }

    for path in config.search_paths.iter().cloned() {
        cascade = cascade.step(path.display().to_string(), move || async move {
            probe_executable(&path, min_version).await
        });
    }

    if config.path_lookup {
        cascade = cascade.step("PATH lookup", move || async move {
            let path = which::which("tor").map_err(|e| Error::NotFound(format!("tor on PATH: {}", e)))?;
            probe_executable(&path, min_version).await
        });
    }

    cascade.run().await
}
