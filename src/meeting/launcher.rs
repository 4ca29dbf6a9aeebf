//! Hosting, joining and tearing down meetings

use super::server::VoiceServer;
use crate::client::{generate_url, Binary, MeetingData, RunningClient};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::tor::onion::{is_valid_onion_address, normalize_address};
use crate::tor::{HiddenService, Instance};
use crate::util::net::free_port;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Loopback address the voice server is bound to
const LOCAL_HOST: &str = "127.0.0.1";

/// A program line ready to spawn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
}

impl LaunchCommand {
    /// Run the client directly with the meeting URI as its single argument
    pub fn direct(binary: &Binary, uri: &str) -> Self {
        Self {
            program: binary.path().to_path_buf(),
            args: vec![uri.into()],
            env: binary.env().to_vec(),
        }
    }

    /// Run the client under torsocks pointed at the given SOCKS listener
    pub fn torsocks(torsocks: &Path, socks_host: &str, socks_port: u16, binary: &Binary, uri: &str) -> Self {
        Self {
            program: torsocks.to_path_buf(),
            args: vec![
                "-a".into(),
                socks_host.into(),
                "-P".into(),
                socks_port.to_string().into(),
                binary.path().into(),
                uri.into(),
            ],
            env: binary.env().to_vec(),
        }
    }

    pub fn spawn(&self) -> Result<RunningClient> {
        RunningClient::start(&self.program, &self.args, &self.env)
    }
}

/// A meeting served from this machine
pub struct HostedMeeting<S: VoiceServer> {
    server: S,
    service: HiddenService,
    local_port: u16,
    client: Option<RunningClient>,
}

impl<S: VoiceServer> HostedMeeting<S> {
    /// The `.onion` address participants join
    pub fn meeting_id(&self) -> &str {
        &self.service.onion_address
    }

    pub fn service(&self) -> &HiddenService {
        &self.service
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    pub fn client_mut(&mut self) -> Option<&mut RunningClient> {
        self.client.as_mut()
    }

    pub fn has_client(&self) -> bool {
        self.client.is_some()
    }
}

/// Drives meetings over a ready [`Instance`]
pub struct MeetingLauncher<'a> {
    instance: &'a Instance,
    config: &'a Config,
}

impl<'a> MeetingLauncher<'a> {
    pub fn new(instance: &'a Instance, config: &'a Config) -> Self {
        Self { instance, config }
    }

    /// Start `server` on a free loopback port and publish it as an onion
    /// service
    ///
    /// If publishing fails the server is stopped again.
    pub async fn host<S: VoiceServer>(&self, mut server: S) -> Result<HostedMeeting<S>> {
        let local_port = free_port()?;
        server.start(local_port).await?;

        let public_port = self.config.server.public_port.to_string();
        let service = match self
            .instance
            .create_hidden_service(LOCAL_HOST, local_port, &public_port)
            .await
        {
            Ok(service) => service,
            Err(e) => {
                if let Err(stop_error) = server.stop().await {
                    error!("Failed to stop voice server after publish error: {}", stop_error);
                }
                return Err(e);
            },
        };

        info!("Hosting meeting {}", service);
        Ok(HostedMeeting {
            server,
            service,
            local_port,
            client: None,
        })
    }

    /// Launch the voice client against a meeting
    ///
    /// The meeting ID must be a well-formed onion address; nothing is spawned
    /// otherwise.
    pub fn join(&self, binary: &Binary, data: &MeetingData) -> Result<RunningClient> {
        if !is_valid_onion_address(&data.meeting_id) {
            return Err(Error::InvalidMeetingId(data.meeting_id.clone()));
        }
        binary.require_ready()?;

        let data = MeetingData {
            meeting_id: normalize_address(&data.meeting_id),
            ..data.clone()
        };
        let uri = generate_url(&self.config.client.scheme, &data)?;
        let command = self.client_command(binary, &uri);

        debug!(
            "Launching voice client {} with {} arguments",
            command.program.display(),
            command.args.len()
        );
        command.spawn()
    }

    /// Launch the voice client against our own meeting
    pub fn join_hosted<S: VoiceServer>(
        &self,
        meeting: &mut HostedMeeting<S>,
        binary: &Binary,
        username: Option<String>,
        password: Option<String>,
    ) -> Result<()> {
        if meeting.client.is_some() {
            return Err(Error::AlreadyExists("a voice client is already running".into()));
        }

        let data = MeetingData::new(meeting.meeting_id())
            .with_username(username)
            .with_password(password);
        meeting.client = Some(self.join(binary, &data)?);
        Ok(())
    }

    /// Build the client command line, wrapped in torsocks when configured
    pub fn client_command(&self, binary: &Binary, uri: &str) -> LaunchCommand {
        if self.config.client.torsocks {
            match which::which("torsocks") {
                Ok(torsocks) => {
                    return LaunchCommand::torsocks(
                        &torsocks,
                        self.instance.control_host(),
                        self.instance.socks_port(),
                        binary,
                        uri,
                    );
                },
                Err(e) => warn!("torsocks not available, launching client directly: {}", e),
            }
        }
        LaunchCommand::direct(binary, uri)
    }

    /// Tear a hosted meeting down: client, then onion service, then server
    ///
    /// Every step runs even if an earlier one fails; failures are logged.
    pub async fn finish<S: VoiceServer>(&self, meeting: HostedMeeting<S>) {
        let HostedMeeting {
            mut server,
            service,
            client,
            ..
        } = meeting;

        if let Some(mut client) = client {
            if let Err(e) = client.stop().await {
                debug!("Voice client already gone: {}", e);
            }
        }

        match self.instance.delete_hidden_service(service.service_id()).await {
            Ok(()) => {},
            Err(e) if e.is_unrecognized() => debug!("Onion service {} already removed: {}", service, e),
            Err(e) => error!("The onion service can't be deleted: {}", e),
        }

        if let Err(e) = server.stop().await {
            error!("The meeting can't be closed: {}", e);
        }

        info!("Meeting {} finished", service.onion_address);
    }
}
