//! Tor instance detection and lifecycle
//!
//! An [`Instance`] either adopts a system Tor that is already running and
//! usable, or starts and owns a private Tor process. Adopted daemons are
//! never started, stopped or reconfigured. A managed daemon gets its own
//! temporary data directory and is torn down by [`Instance::close`].
//!
//! ```text
//! Uninitialized -> ProbingSystem -> Adopted
//!                               \-> ProbingManaged -> Managed
//!                                                  \-> Failed
//! ```

use super::connectivity::Connectivity;
use super::control::{AuthMethod, ControlPortClient};
use super::executable::{find_executable, TorExecutable};
use super::onion::HiddenService;
use super::version::version_compatible;
use crate::config::TorConfig;
use crate::error::{Error, Result};
use crate::util::{net, rand::backoff};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Loopback address a managed Tor listens on
const MANAGED_HOST: &str = "127.0.0.1";

/// Cookie file Tor writes into its data directory
const MANAGED_COOKIE_FILE: &str = "control_auth_cookie";

const BOOTSTRAP_POLL: Duration = Duration::from_secs(1);

/// Detection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceState {
    Uninitialized,
    ProbingSystem,
    ProbingManaged,
    /// Using a system Tor this process did not start
    Adopted,
    /// Using a Tor process this instance started and owns
    Managed,
    Failed,
}

impl InstanceState {
    pub fn is_ready(self) -> bool {
        matches!(self, InstanceState::Adopted | InstanceState::Managed)
    }
}

/// A control session that passed authentication, version and connectivity
struct Verified {
    client: ControlPortClient,
    auth_method: AuthMethod,
    socks_port: u16,
    version: String,
}

/// A Tor process owned by this instance
struct ManagedTor {
    child: Child,
    data_dir: TempDir,
    executable: TorExecutable,
}

impl ManagedTor {
    /// Kill the process and delete its data directory, logging failures
    async fn shutdown(mut self) {
        info!(
            "Stopping managed Tor {} (pid {:?})",
            self.executable.path.display(),
            self.child.id()
        );
        if let Err(e) = self.child.kill().await {
            error!("Failed to stop managed Tor: {}", e);
        }

        let dir = self.data_dir.path().to_path_buf();
        if let Err(e) = self.data_dir.close() {
            error!("Failed to remove Tor data directory {}: {}", dir.display(), e);
        }
    }
}

/// The Tor instance used for every onion service of this process
pub struct Instance {
    config: TorConfig,
    state: InstanceState,
    is_local: bool,
    started: bool,
    control_host: String,
    control_port: u16,
    socks_port: u16,
    auth_method: Option<AuthMethod>,
    version: Option<String>,
    control: Mutex<Option<ControlPortClient>>,
    managed: Option<ManagedTor>,
}

impl Instance {
    pub fn new(config: TorConfig) -> Self {
        Self {
            control_host: config.control_host.clone(),
            control_port: config.control_port,
            socks_port: config.socks_port,
            config,
            state: InstanceState::Uninitialized,
            is_local: false,
            started: false,
            auth_method: None,
            version: None,
            control: Mutex::new(None),
            managed: None,
        }
    }

    /// Detect a usable Tor on a worker task
    pub async fn detect<C>(config: TorConfig, connectivity: C) -> Result<Instance>
    where
        C: Connectivity + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut instance = Instance::new(config);
            instance.initialize(&connectivity).await?;
            Ok::<_, Error>(instance)
        });

        handle
            .await
            .map_err(|e| Error::Protocol(format!("Tor detection task failed: {}", e)))?
    }

    /// Run detection once
    ///
    /// The system Tor is tried first. Every failure there is expected and
    /// only logged. Only when no private Tor can be started either does this
    /// fail, with [`Error::NoUsableTransport`].
    pub async fn initialize<C: Connectivity>(&mut self, connectivity: &C) -> Result<()> {
        match self.state {
            InstanceState::Uninitialized => {},
            InstanceState::Failed => return Err(Error::NoUsableTransport),
            state if state.is_ready() => return Ok(()),
            state => {
                return Err(Error::Invalid(format!(
                    "Tor detection already running ({:?})",
                    state
                )))
            },
        }

        self.transition(InstanceState::ProbingSystem);
        match probe_system(&self.config, connectivity).await {
            Ok(verified) => {
                self.adopt(verified);
                return Ok(());
            },
            Err(e) => info!("System Tor cannot be used: {}", e),
        }

        self.transition(InstanceState::ProbingManaged);
        match launch_managed(&self.config, connectivity).await {
            Ok((verified, managed, control_port)) => {
                self.manage(verified, managed, control_port);
                Ok(())
            },
            Err(e) => {
                warn!("Private Tor cannot be used: {}", e);
                self.transition(InstanceState::Failed);
                Err(Error::NoUsableTransport)
            },
        }
    }

    fn transition(&mut self, next: InstanceState) {
        debug!("Tor instance {:?} -> {:?}", self.state, next);
        self.state = next;
    }

    fn adopt(&mut self, verified: Verified) {
        info!(
            "Using system Tor {} at {} (SOCKS port {})",
            verified.version,
            verified.client.addr(),
            verified.socks_port
        );
        self.bind(verified);
        self.is_local = true;
        self.transition(InstanceState::Adopted);
    }

    fn manage(&mut self, verified: Verified, managed: ManagedTor, control_port: u16) {
        info!(
            "Using private Tor {} from {} (control {}, SOCKS {})",
            verified.version,
            managed.executable.path.display(),
            control_port,
            verified.socks_port
        );
        self.bind(verified);
        self.control_host = MANAGED_HOST.to_string();
        self.control_port = control_port;
        self.is_local = false;
        self.managed = Some(managed);
        self.transition(InstanceState::Managed);
    }

    fn bind(&mut self, verified: Verified) {
        self.socks_port = verified.socks_port;
        self.auth_method = Some(verified.auth_method);
        self.version = Some(verified.version);
        self.started = true;
        *self.control.get_mut() = Some(verified.client);
    }

    pub fn state(&self) -> InstanceState {
        self.state
    }

    /// True when the system Tor was adopted rather than started by us
    pub fn is_local(&self) -> bool {
        self.is_local
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn is_managed(&self) -> bool {
        self.managed.is_some()
    }

    pub fn control_host(&self) -> &str {
        &self.control_host
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn socks_port(&self) -> u16 {
        self.socks_port
    }

    pub fn auth_method(&self) -> Option<AuthMethod> {
        self.auth_method
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// PID of the managed Tor, if this instance owns one
    pub fn child_pid(&self) -> Option<u32> {
        self.managed.as_ref().and_then(|m| m.child.id())
    }

    /// Data directory of the managed Tor, if this instance owns one
    pub fn data_dir(&self) -> Option<&Path> {
        self.managed.as_ref().map(|m| m.data_dir.path())
    }

    fn require_ready(&self) -> Result<()> {
        if self.state.is_ready() && self.started {
            Ok(())
        } else {
            Err(Error::NotInitialized("Tor instance"))
        }
    }

    /// Publish `public_port` as an onion service forwarding to the destination
    pub async fn create_hidden_service(
        &self,
        destination_host: &str,
        destination_port: u16,
        public_port: &str,
    ) -> Result<HiddenService> {
        self.require_ready()?;
        let mut control = self.control.lock().await;
        let client = control
            .as_mut()
            .ok_or(Error::NotInitialized("Tor control session"))?;
        client
            .create_hidden_service(destination_host, destination_port, public_port)
            .await
    }

    /// Remove an onion service created by this instance
    pub async fn delete_hidden_service(&self, service_id: &str) -> Result<()> {
        self.require_ready()?;
        let mut control = self.control.lock().await;
        let client = control
            .as_mut()
            .ok_or(Error::NotInitialized("Tor control session"))?;
        client.delete_hidden_service(service_id).await
    }

    /// Release the instance
    ///
    /// An adopted Tor is left running; only our control session is dropped.
    /// A managed Tor is killed and its data directory removed. Cleanup
    /// failures are logged, never returned.
    pub async fn close(&mut self) {
        if let Some(mut client) = self.control.get_mut().take() {
            client.close();
        }

        match self.managed.take() {
            Some(managed) => managed.shutdown().await,
            None => debug!("Tor instance in state {:?} owns no process", self.state),
        }
        self.started = false;
    }
}

/// Try the Tor the configuration points at
async fn probe_system<C: Connectivity>(config: &TorConfig, connectivity: &C) -> Result<Verified> {
    let mut client = ControlPortClient::from_config(config);
    if !client.is_reachable().await {
        return Err(Error::NotFound(format!(
            "no Tor control port at {}",
            client.addr()
        )));
    }

    let auth_method = client.authenticate().await?;
    verify(
        client,
        auth_method,
        &config.min_version,
        config.socks_port,
        connectivity,
    )
    .await
}

/// Version and connectivity checks shared by adopted and managed Tor
async fn verify<C: Connectivity>(
    mut client: ControlPortClient,
    auth_method: AuthMethod,
    min_version: &str,
    fallback_socks_port: u16,
    connectivity: &C,
) -> Result<Verified> {
    let version = client.get_version().await?;
    if !version_compatible(&version, min_version) {
        return Err(Error::IncompatibleVersion {
            found: version,
            minimum: min_version.to_string(),
        });
    }

    let socks_port = match client.get_socks_port().await {
        Ok(port) => port,
        Err(e) => {
            debug!(
                "Could not read SOCKS listeners ({}), assuming port {}",
                e, fallback_socks_port
            );
            fallback_socks_port
        },
    };

    let host = client.host().to_string();
    if !connectivity.check(&host, socks_port).await {
        return Err(Error::ConnectivityFailed(format!("{}:{}", host, socks_port)));
    }

    Ok(Verified {
        client,
        auth_method,
        socks_port,
        version,
    })
}

/// Start a private Tor and verify it
///
/// Returns the verified session, the owned process and the control port.
async fn launch_managed<C: Connectivity>(
    config: &TorConfig,
    connectivity: &C,
) -> Result<(Verified, ManagedTor, u16)> {
    let executable = find_executable(config)
        .await
        .ok_or_else(|| Error::NotFound("acceptable Tor executable".to_string()))?;

    let data_dir = tempfile::Builder::new().prefix("onionmeet-tor-").tempdir()?;
    let ports = net::free_ports(2)?;
    let (control_port, socks_port) = (ports[0], ports[1]);
    let torrc = write_torrc(data_dir.path(), control_port, socks_port)?;

    info!(
        "Starting private Tor {} with data directory {}",
        executable.path.display(),
        data_dir.path().display()
    );
    let child = Command::new(&executable.path)
        .arg("-f")
        .arg(&torrc)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .kill_on_drop(true)
        .spawn()?;

    let mut managed = ManagedTor {
        child,
        data_dir,
        executable,
    };

    match bring_up(&mut managed, config, control_port, socks_port, connectivity).await {
        Ok(verified) => Ok((verified, managed, control_port)),
        Err(e) => {
            managed.shutdown().await;
            Err(e)
        },
    }
}

async fn bring_up<C: Connectivity>(
    managed: &mut ManagedTor,
    config: &TorConfig,
    control_port: u16,
    socks_port: u16,
    connectivity: &C,
) -> Result<Verified> {
    let start_timeout = Duration::from_secs(config.start_timeout_secs);
    wait_for_control_port(&mut managed.child, control_port, start_timeout).await?;

    let cookie = managed.data_dir.path().join(MANAGED_COOKIE_FILE);
    let mut client =
        ControlPortClient::new(MANAGED_HOST, control_port, None).with_cookie_paths(vec![cookie]);
    let auth_method = client.authenticate().await?;

    let bootstrap_timeout = Duration::from_secs(config.bootstrap_timeout_secs);
    wait_for_bootstrap(&mut client, bootstrap_timeout).await?;

    verify(
        client,
        auth_method,
        &config.min_version,
        socks_port,
        connectivity,
    )
    .await
}

/// Minimal torrc for a private instance
fn write_torrc(dir: &Path, control_port: u16, socks_port: u16) -> Result<PathBuf> {
    let torrc = dir.join("torrc");
    let contents = format!(
        "SocksPort {host}:{socks}\n\
         ControlPort {host}:{control}\n\
         DataDirectory {data}\n\
         CookieAuthentication 1\n",
        host = MANAGED_HOST,
        socks = socks_port,
        control = control_port,
        data = dir.display(),
    );
    std::fs::write(&torrc, contents)?;
    Ok(torrc)
}

/// Poll until the control port accepts connections
async fn wait_for_control_port(child: &mut Child, port: u16, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;
    let mut attempt = 0;

    loop {
        if let Some(status) = child.try_wait()? {
            return Err(Error::Invalid(format!("Tor exited during startup: {}", status)));
        }
        if TcpStream::connect((MANAGED_HOST, port)).await.is_ok() {
            debug!("Control port {} is up after {} attempts", port, attempt + 1);
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout(format!("control port {} to open", port)));
        }

        let delay = backoff(attempt, Duration::from_millis(100), Duration::from_secs(2));
        tokio::time::sleep(delay).await;
        attempt += 1;
    }
}

/// Poll the bootstrap phase until Tor reports 100%
async fn wait_for_bootstrap(client: &mut ControlPortClient, timeout: Duration) -> Result<()> {
    let deadline = Instant::now() + timeout;

    loop {
        if client.is_bootstrapped().await? {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(Error::Timeout("Tor to finish bootstrapping".to_string()));
        }
        tokio::time::sleep(BOOTSTRAP_POLL).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_torrc_contents() {
        let dir = tempfile::tempdir().unwrap();
        let torrc = write_torrc(dir.path(), 40001, 40002).unwrap();
        let contents = std::fs::read_to_string(torrc).unwrap();
        assert!(contents.contains("SocksPort 127.0.0.1:40002\n"));
        assert!(contents.contains("ControlPort 127.0.0.1:40001\n"));
        assert!(contents.contains(&format!("DataDirectory {}\n", dir.path().display())));
        assert!(contents.contains("CookieAuthentication 1\n"));
    }

    #[test]
    fn test_new_instance_is_not_ready() {
        let instance = Instance::new(TorConfig::default());
        assert_eq!(instance.state(), InstanceState::Uninitialized);
        assert!(!instance.is_started());
        assert!(instance.child_pid().is_none());
        assert!(instance.data_dir().is_none());
    }

    #[tokio::test]
    async fn test_use_before_initialize_fails() {
        let instance = Instance::new(TorConfig::default());
        let result = instance
            .create_hidden_service("127.0.0.1", 10000, "64738")
            .await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
        let result = instance.delete_hidden_service("abc.onion").await;
        assert!(matches!(result, Err(Error::NotInitialized(_))));
    }
}
