//! Check command - show what would be used for a meeting
//!
//! Displays:
//! - Tor instance (adopted or managed), ports and authentication
//! - Voice client binary and its environment
//! - Voice server executable

use super::CheckArgs;
use crate::client::BinaryResolver;
use crate::config::Config;
use crate::meeting::ProcessVoiceServer;
use crate::state::Session;
use anyhow::Result;
use serde::Serialize;

#[derive(Debug, Default, Serialize)]
struct CheckReport {
    tor: Option<TorReport>,
    tor_error: Option<String>,
    client: Option<ClientReport>,
    client_error: Option<String>,
    server: Option<String>,
    server_error: Option<String>,
}

#[derive(Debug, Serialize)]
struct TorReport {
    state: String,
    managed: bool,
    control: String,
    socks_port: u16,
    auth_method: Option<String>,
    version: Option<String>,
}

#[derive(Debug, Serialize)]
struct ClientReport {
    path: String,
    bundle: bool,
    relocatable: bool,
    env: Vec<(String, String)>,
}

/// Run the check command
pub async fn run_check(config: Config, args: &CheckArgs) -> Result<()> {
    let mut report = CheckReport::default();

    match BinaryResolver::from_config(&config.client).resolve().await {
        Ok(binary) => {
            report.client = Some(ClientReport {
                path: binary.path().display().to_string(),
                bundle: binary.is_bundle(),
                relocatable: binary.should_be_copied(),
                env: binary.env().to_vec(),
            })
        },
        Err(e) => report.client_error = Some(e.to_string()),
    }

    match ProcessVoiceServer::locate(&config.server).await {
        Ok(server) => report.server = Some(server.executable().display().to_string()),
        Err(e) => report.server_error = Some(e.to_string()),
    }

    match Session::start(config).await {
        Ok(session) => {
            let instance = session.instance();
            report.tor = Some(TorReport {
                state: format!("{:?}", instance.state()),
                managed: instance.is_managed(),
                control: format!("{}:{}", instance.control_host(), instance.control_port()),
                socks_port: instance.socks_port(),
                auth_method: instance.auth_method().map(|m| m.to_string()),
                version: instance.version().map(str::to_string),
            });
            session.shutdown().await;
        },
        Err(e) => report.tor_error = Some(e.to_string()),
    }

    if args.format == "json" {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_text(&report);
    }

    Ok(())
}

fn print_text(report: &CheckReport) {
    println!("Tor:");
    match (&report.tor, &report.tor_error) {
        (Some(tor), _) => {
            println!("  state:    {}{}", tor.state, if tor.managed { " (started by onionmeet)" } else { "" });
            println!("  control:  {}", tor.control);
            println!("  socks:    {}", tor.socks_port);
            println!("  auth:     {}", tor.auth_method.as_deref().unwrap_or("-"));
            println!("  version:  {}", tor.version.as_deref().unwrap_or("unknown"));
        },
        (None, Some(e)) => println!("  error:    {}", e),
        (None, None) => println!("  not checked"),
    }

    println!("Voice client:");
    match (&report.client, &report.client_error) {
        (Some(client), _) => {
            println!("  path:     {}", client.path);
            println!("  bundle:   {}", client.bundle);
            for (key, value) in &client.env {
                println!("  env:      {}={}", key, value);
            }
        },
        (None, Some(e)) => println!("  error:    {}", e),
        (None, None) => println!("  not checked"),
    }

    println!("Voice server:");
    match (&report.server, &report.server_error) {
        (Some(path), _) => println!("  path:     {}", path),
        (None, Some(e)) => println!("  error:    {}", e),
        (None, None) => println!("  not checked"),
    }
}
