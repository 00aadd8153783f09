// src/core/probe/port_probe.rs

use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

use crate::core::models::PortState;

/// One TCP connect attempt.
///
/// A completed handshake is `Open` and an RST is `Closed`. Anything else
/// (timeout, unreachable, filtered by a firewall) reads as `Filtered`.
pub(crate) async fn connect(ip: IpAddr, port: u16, limit: Duration) -> PortState {
    let addr = SocketAddr::new(ip, port);
    match timeout(limit, TcpStream::connect(addr)).await {
        Ok(Ok(_stream)) => {
            debug!(%addr, "Port open.");
            PortState::Open
        }
        Ok(Err(e)) if e.kind() == ErrorKind::ConnectionRefused => PortState::Closed,
        Ok(Err(e)) => {
            debug!(%addr, error = %e, "Port connect failed.");
            PortState::Filtered
        }
        Err(_) => PortState::Filtered,
    }
}
