//! Runtime session model

use crate::client::{Binary, BinaryResolver};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::meeting::MeetingLauncher;
use crate::tor::{Instance, TorCheck};
use tracing::{debug, info};

/// Everything one run of the application owns
///
/// The session is the single owner of the Tor instance and of any
/// temporary copy of the voice client. Meetings borrow from it and must be
/// finished before [`Session::shutdown`].
pub struct Session {
    config: Config,
    instance: Instance,
    client: Option<Binary>,
}

impl Session {
    pub fn new(config: Config, instance: Instance) -> Self {
        Self {
            config,
            instance,
            client: None,
        }
    }

    /// Detect a Tor instance with the configured connectivity check
    pub async fn start(config: Config) -> Result<Self> {
        let connectivity = TorCheck::from_config(&config.connectivity);
        let instance = Instance::detect(config.tor.clone(), connectivity).await?;
        info!(
            "Tor ready: {:?}, control {}:{}, SOCKS {}",
            instance.state(),
            instance.control_host(),
            instance.control_port(),
            instance.socks_port()
        );
        Ok(Self::new(config, instance))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn launcher(&self) -> MeetingLauncher<'_> {
        MeetingLauncher::new(&self.instance, &self.config)
    }

    pub fn client(&self) -> Result<&Binary> {
        self.client.as_ref().ok_or(Error::NotInitialized("voice client binary"))
    }

    /// Resolve the voice client from configuration and attach it
    pub async fn prepare_client(&mut self) -> Result<&Binary> {
        if self.client.is_none() {
            let binary = BinaryResolver::from_config(&self.config.client).resolve().await?;
            self.attach_client(binary)?;
        }
        self.client()
    }

    /// Take ownership of a resolved client, relocating it when allowed
    pub fn attach_client(&mut self, mut binary: Binary) -> Result<()> {
        if binary.should_be_copied() {
            binary.relocate()?;
        }
        if let Some(mut previous) = self.client.replace(binary) {
            previous.remove();
        }
        Ok(())
    }

    /// Release the client copy and the Tor instance
    pub async fn shutdown(mut self) {
        if let Some(mut client) = self.client.take() {
            client.remove();
        }
        self.instance.close().await;
        debug!("Session closed");
    }
}
