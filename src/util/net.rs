//! Local port allocation

use crate::error::{Error, Result};
use std::collections::HashSet;
use std::net::{Ipv4Addr, TcpListener};
use tracing::trace;

/// Upper bound on random candidates before giving up
const MAX_PORT_ATTEMPTS: usize = 1000;

/// Check whether a loopback TCP port can currently be bound
pub fn is_port_available(port: u16) -> bool {
    TcpListener::bind((Ipv4Addr::LOCALHOST, port)).is_ok()
}

/// Pick a random port that is free right now
pub fn free_port() -> Result<u16> {
    free_port_excluding(&HashSet::new())
}

/// Pick `count` distinct free ports
pub fn free_ports(count: usize) -> Result<Vec<u16>> {
    let mut taken = HashSet::new();
    let mut ports = Vec::with_capacity(count);
    for _ in 0..count {
        let port = free_port_excluding(&taken)?;
        taken.insert(port);
        ports.push(port);
    }
    Ok(ports)
}

fn free_port_excluding(taken: &HashSet<u16>) -> Result<u16> {
    for _ in 0..MAX_PORT_ATTEMPTS {
        let port = super::rand::random_port();
        if taken.contains(&port) {
            continue;
        }
        if is_port_available(port) {
            return Ok(port);
        }
        trace!("Port {} is in use, trying another", port);
    }
    Err(Error::NotFound(format!(
        "no free local port after {} attempts",
        MAX_PORT_ATTEMPTS
    )))
}
