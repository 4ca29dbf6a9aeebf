//! Join command - open the voice client on someone else's meeting

use super::JoinArgs;
use crate::client::{BinaryResolver, MeetingData};
use crate::config::Config;
use crate::error::Error;
use crate::state::Session;
use crate::tor::is_valid_onion_address;
use anyhow::{Context, Result};
use tracing::info;

/// Run the join command
pub async fn run_join(config: Config, args: &JoinArgs) -> Result<()> {
    if !is_valid_onion_address(&args.meeting_id) {
        return Err(Error::InvalidMeetingId(args.meeting_id.clone()).into());
    }

    let binary = BinaryResolver::from_config(&config.client)
        .resolve()
        .await
        .context("Failed to find a voice client")?;

    let mut session = Session::start(config)
        .await
        .context("Failed to set up a Tor connection")?;

    let result: Result<()> = async {
        session.attach_client(binary)?;
        join_meeting(&session, args).await
    }
    .await;

    session.shutdown().await;
    result
}

async fn join_meeting(session: &Session, args: &JoinArgs) -> Result<()> {
    let binary = session.client()?;
    let data = MeetingData::new(args.meeting_id.as_str())
        .with_username(args.username.clone())
        .with_password(args.password.clone());

    let mut client = session
        .launcher()
        .join(binary, &data)
        .context("Failed to launch the voice client")?;
    println!("Joined {}. Close the voice client or press Ctrl-C to leave.", args.meeting_id.trim());

    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupted, leaving meeting");
            client.stop().await?;
        },
        exit = client.wait() => {
            let exit = exit?;
            info!("Voice client closed ({:?})", exit.status);
        },
    }

    Ok(())
}
