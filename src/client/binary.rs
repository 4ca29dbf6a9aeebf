//! Voice client binary resolution
//!
//! The client is looked for in the user-configured path, then a bundle next
//! to the working directory, then the system install. A bundle ships its own
//! libraries in a sibling `lib` directory and must be run from where it is;
//! any other binary may be relocated into a private temporary directory.

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::util::process::capture_output;
use crate::util::Cascade;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Sibling directory holding a bundle's shared libraries
const BUNDLE_LIBS_DIR: &str = "lib";

#[cfg(target_os = "macos")]
const LIBRARY_PATH_VAR: &str = "DYLD_LIBRARY_PATH";
#[cfg(not(target_os = "macos"))]
const LIBRARY_PATH_VAR: &str = "LD_LIBRARY_PATH";

/// A voice client executable
#[derive(Debug)]
pub struct Binary {
    path: PathBuf,
    env: Vec<(String, String)>,
    is_valid: bool,
    is_bundle: bool,
    is_temporary: bool,
    temp_dir: Option<TempDir>,
}

impl Binary {
    fn unchecked(path: PathBuf) -> Self {
        Self {
            path,
            env: Vec::new(),
            is_valid: false,
            is_bundle: false,
            is_temporary: false,
            temp_dir: None,
        }
    }

    /// Check a candidate path
    ///
    /// The binary is run once with `-h`; it is rejected only when that run
    /// fails without writing to stdout (or cannot start, or times out).
    pub async fn probe(path: &Path, timeout: Duration) -> Result<Binary> {
        debug!("Checking voice client binary in: <{}>", path.display());

        if path.as_os_str().is_empty() || !path.is_file() {
            return Err(Error::NotFound(format!(
                "voice client binary {:?}",
                path.display().to_string()
            )));
        }

        let mut binary = Binary::unchecked(path.to_path_buf());
        if let Some(libs) = bundle_libs_dir(path) {
            binary.is_bundle = true;
            binary.env = vec![(LIBRARY_PATH_VAR.to_string(), libs.display().to_string())];
        }

        let mut command = Command::new(path);
        command.arg("-h").envs(binary.env.iter().map(|(k, v)| (k, v)));

        match capture_output(command, timeout).await {
            Ok(output) if !output.status.success() && output.stdout.is_empty() => {
                return Err(Error::Invalid(format!(
                    "{} exited with {} and no output",
                    path.display(),
                    output.status
                )));
            },
            Ok(_) => {},
            Err(e) => {
                return Err(Error::Invalid(format!("{}: {}", path.display(), e)));
            },
        }

        binary.is_valid = true;
        Ok(binary)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Environment overrides the binary needs, e.g. a library search path
    pub fn env(&self) -> &[(String, String)] {
        &self.env
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn is_bundle(&self) -> bool {
        self.is_bundle
    }

    /// Bundles stay next to their libraries; anything else may be relocated
    pub fn should_be_copied(&self) -> bool {
        self.is_valid && !self.is_bundle && !self.is_temporary
    }

    pub fn is_temporary(&self) -> bool {
        self.is_temporary
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Fail unless the binary was validated and is still on disk
    pub fn require_ready(&self) -> Result<()> {
        if self.is_valid && self.exists() {
            Ok(())
        } else {
            Err(Error::NotInitialized("voice client binary"))
        }
    }

    /// Copy the binary into `dir` and use the copy from now on
    ///
    /// Contents and permission bits are copied exactly. Taking `&mut self`
    /// rules out two relocations of the same binary running at once.
    pub fn copy_to(&mut self, dir: &Path) -> Result<()> {
        if !self.is_valid || !self.exists() {
            return Err(Error::Invalid(format!(
                "cannot copy {}: binary is not valid",
                self.path.display()
            )));
        }
        if !dir.is_dir() {
            return Err(Error::DestinationNotDirectory(dir.display().to_string()));
        }

        let file_name = self
            .path
            .file_name()
            .ok_or_else(|| Error::Invalid(format!("{} has no file name", self.path.display())))?;
        let destination = dir.join(file_name);
        if destination.exists() {
            return Err(Error::AlreadyExists(destination.display().to_string()));
        }

        std::fs::copy(&self.path, &destination)?;
        let permissions = std::fs::metadata(&self.path)?.permissions();
        std::fs::set_permissions(&destination, permissions)?;

        info!(
            "Copied voice client {} to {}",
            self.path.display(),
            destination.display()
        );
        self.path = destination;
        self.is_temporary = true;
        Ok(())
    }

    /// Copy the binary into a fresh private temporary directory
    pub fn relocate(&mut self) -> Result<()> {
        let dir = tempfile::Builder::new().prefix("onionmeet-client-").tempdir()?;
        self.copy_to(dir.path())?;
        self.temp_dir = Some(dir);
        Ok(())
    }

    /// Delete the directory holding a temporary copy
    ///
    /// Does nothing for binaries that were not copied. Errors are logged.
    pub fn remove(&mut self) {
        if !self.is_temporary {
            return;
        }

        if let Some(dir) = self.path.parent() {
            if let Err(e) = std::fs::remove_dir_all(dir) {
                error!(
                    "An error occurred while removing the voice client temp directory {}: {}",
                    dir.display(),
                    e
                );
            }
        }
        self.temp_dir = None;
        self.is_temporary = false;
    }
}

/// The sibling library directory of a bundled binary, if there is one
fn bundle_libs_dir(path: &Path) -> Option<PathBuf> {
    let libs = path.parent()?.join(BUNDLE_LIBS_DIR);
    libs.is_dir().then_some(libs)
}

/// Finds the voice client through an ordered list of candidates
#[derive(Debug, Clone)]
pub struct BinaryResolver {
    candidates: Vec<PathBuf>,
    timeout: Duration,
}

impl BinaryResolver {
    pub fn new(candidates: Vec<PathBuf>, timeout: Duration) -> Self {
        Self {
            candidates,
            timeout,
        }
    }

    /// Configured path, then the bundle under the working directory, then
    /// the system install
    pub fn from_config(config: &ClientConfig) -> Self {
        let mut candidates = Vec::new();
        if let Some(path) = &config.binary_path {
            candidates.push(path.clone());
        }
        match std::env::current_dir() {
            Ok(cwd) => candidates.push(cwd.join(&config.bundle_path)),
            Err(e) => debug!("No working directory for bundle lookup: {}", e),
        }
        candidates.push(config.system_path.clone());

        Self::new(candidates, Duration::from_secs(config.validate_timeout_secs))
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// First candidate that exists and runs
    pub async fn resolve(&self) -> Result<Binary> {
        let timeout = self.timeout;
        let mut cascade = Cascade::new("voice client");
        for path in &self.candidates {
            cascade = cascade.step(path.display().to_string(), move || async move {
                Binary::probe(path, timeout).await
            });
        }

        cascade.run().await.ok_or(Error::NoUsableClient)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    fn script(dir: &Path, name: &str, body: &str, mode: u32) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode)).unwrap();
        path
    }

    fn timeout() -> Duration {
        Duration::from_secs(5)
    }

    #[tokio::test]
    async fn test_probe_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let result = Binary::probe(&dir.path().join("mumble"), timeout()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_probe_silent_failure_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "mumble", "exit 1", 0o755);
        let result = Binary::probe(&path, timeout()).await;
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[tokio::test]
    async fn test_probe_failure_with_only_stderr_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "mumble", "echo 'cannot open display' >&2; exit 1", 0o755);
        let result = Binary::probe(&path, timeout()).await;
        assert!(matches!(result, Err(Error::Invalid(_))));
    }

    #[tokio::test]
    async fn test_probe_failure_with_output_is_valid() {
        let dir = tempfile::tempdir().unwrap();
        let path = script(dir.path(), "mumble", "echo 'Usage: mumble [options]'; exit 1", 0o755);
        let binary = Binary::probe(&path, timeout()).await.unwrap();
        assert!(binary.is_valid());
        assert!(!binary.is_bundle());
        assert!(binary.should_be_copied());
        assert!(binary.env().is_empty());
    }

    #[tokio::test]
    async fn test_bundle_gets_library_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        let path = script(dir.path(), "mumble", "echo \"$LD_LIBRARY_PATH\"", 0o755);

        let binary = Binary::probe(&path, timeout()).await.unwrap();
        assert!(binary.is_bundle());
        assert!(!binary.should_be_copied());
        let (key, value) = &binary.env()[0];
        assert_eq!(key, LIBRARY_PATH_VAR);
        assert_eq!(PathBuf::from(value), dir.path().join("lib"));
    }

    #[tokio::test]
    async fn test_copy_preserves_permissions_and_rebinds_path() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let path = script(src.path(), "mumble", "echo ok", 0o751);

        let mut binary = Binary::probe(&path, timeout()).await.unwrap();
        binary.copy_to(dst.path()).unwrap();

        let copied = dst.path().join("mumble");
        assert_eq!(binary.path(), copied.as_path());
        assert!(binary.is_temporary());
        let mode = std::fs::metadata(&copied).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o751);
        assert_eq!(
            std::fs::read(&copied).unwrap(),
            std::fs::read(&path).unwrap()
        );
    }

    #[tokio::test]
    async fn test_copy_refuses_existing_destination() {
        let src = tempfile::tempdir().unwrap();
        let dst = tempfile::tempdir().unwrap();
        let path = script(src.path(), "mumble", "echo ok", 0o755);
        std::fs::write(dst.path().join("mumble"), b"already here").unwrap();

        let mut binary = Binary::probe(&path, timeout()).await.unwrap();
        let result = binary.copy_to(dst.path());
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(binary.path(), path.as_path());
        assert!(!binary.is_temporary());
    }

    #[tokio::test]
    async fn test_copy_refuses_non_directory() {
        let src = tempfile::tempdir().unwrap();
        let path = script(src.path(), "mumble", "echo ok", 0o755);
        let file = src.path().join("plain-file");
        std::fs::write(&file, b"x").unwrap();

        let mut binary = Binary::probe(&path, timeout()).await.unwrap();
        assert!(matches!(
            binary.copy_to(&file),
            Err(Error::DestinationNotDirectory(_))
        ));
        assert!(matches!(
            binary.copy_to(&src.path().join("missing")),
            Err(Error::DestinationNotDirectory(_))
        ));
    }

    #[test]
    fn test_copy_refuses_unvalidated_binary() {
        let dst = tempfile::tempdir().unwrap();
        let mut binary = Binary::unchecked(PathBuf::from("/nonexistent/mumble"));
        assert!(matches!(binary.copy_to(dst.path()), Err(Error::Invalid(_))));
        assert!(matches!(
            binary.require_ready(),
            Err(Error::NotInitialized(_))
        ));
    }

    #[tokio::test]
    async fn test_remove_deletes_temporary_copy_only() {
        let src = tempfile::tempdir().unwrap();
        let path = script(src.path(), "mumble", "echo ok", 0o755);

        let mut in_place = Binary::probe(&path, timeout()).await.unwrap();
        in_place.remove();
        assert!(path.exists());

        let mut relocated = Binary::probe(&path, timeout()).await.unwrap();
        relocated.relocate().unwrap();
        let copy_dir = relocated.path().parent().unwrap().to_path_buf();
        assert!(copy_dir.is_dir());

        relocated.remove();
        assert!(!copy_dir.exists());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_resolver_takes_first_valid_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("probed");
        let missing = dir.path().join("missing");
        let broken = script(dir.path(), "broken", "exit 3", 0o755);
        let good = script(dir.path(), "good", "echo usage", 0o755);
        let later = script(
            dir.path(),
            "later",
            &format!("touch '{}'; echo usage", marker.display()),
            0o755,
        );

        let resolver = BinaryResolver::new(vec![missing, broken, good.clone(), later], timeout());
        let binary = resolver.resolve().await.unwrap();
        assert_eq!(binary.path(), good.as_path());
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_resolver_exhaustion() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = BinaryResolver::new(vec![dir.path().join("a"), dir.path().join("b")], timeout());
        assert!(matches!(resolver.resolve().await, Err(Error::NoUsableClient)));
    }

    #[test]
    fn test_from_config_order() {
        let config = ClientConfig {
            binary_path: Some(PathBuf::from("/opt/custom/mumble")),
            ..ClientConfig::default()
        };
        let resolver = BinaryResolver::from_config(&config);
        let candidates = resolver.candidates();
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[0], PathBuf::from("/opt/custom/mumble"));
        assert!(candidates[1].ends_with("mumble/mumble"));
        assert_eq!(candidates[2], PathBuf::from("/usr/bin/mumble"));
    }
}
