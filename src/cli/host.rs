//! Host command - serve a meeting until interrupted
//!
//! Steps:
//! 1. Detect or start Tor
//! 2. Start the local voice server
//! 3. Publish it as an onion service and print the meeting ID
//! 4. Optionally open the voice client on it
//! 5. Wait for Ctrl-C, then tear everything down in reverse order

use super::HostArgs;
use crate::config::Config;
use crate::meeting::{HostedMeeting, ProcessVoiceServer, VoiceServer};
use crate::state::Session;
use anyhow::{Context, Result};
use tracing::info;

/// Run the host command
pub async fn run_host(config: Config, args: &HostArgs) -> Result<()> {
    let mut session = Session::start(config)
        .await
        .context("Failed to set up a Tor connection")?;

    let result = host_meeting(&mut session, args).await;
    session.shutdown().await;
    result
}

async fn host_meeting(session: &mut Session, args: &HostArgs) -> Result<()> {
    if args.join {
        session
            .prepare_client()
            .await
            .context("Failed to find a voice client")?;
    }

    let server = ProcessVoiceServer::locate(&session.config().server)
        .await
        .context("Failed to find a voice server")?;

    let launcher = session.launcher();
    let mut meeting = launcher.host(server).await.context("Failed to host the meeting")?;

    println!("Meeting ID: {}", meeting.meeting_id());
    println!("Share it with the participants. Press Ctrl-C to finish the meeting.");

    let outcome: Result<()> = async {
        if args.join {
            let binary = session.client()?;
            launcher.join_hosted(&mut meeting, binary, args.username.clone(), args.password.clone())?;
        }
        wait_until_finished(&mut meeting).await
    }
    .await;

    launcher.finish(meeting).await;
    outcome
}

/// Wait for Ctrl-C; a closed voice client keeps the meeting hosted
async fn wait_until_finished<S: VoiceServer>(meeting: &mut HostedMeeting<S>) -> Result<()> {
    if let Some(client) = meeting.client_mut() {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                info!("Interrupted, finishing meeting");
                return Ok(());
            },
            exit = client.wait() => {
                let exit = exit?;
                info!("Voice client closed ({:?}), meeting is still hosted", exit.status);
                println!("Voice client closed. The meeting is still running; press Ctrl-C to finish it.");
            },
        }
    }

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Interrupted, finishing meeting");
    Ok(())
}
