//! Socket probes behind `NetworkProbe`.
//!
//! `std::net` resolution and connects block, so each probe runs on the
//! blocking pool.

use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::NetworkProbe;

const REMOTE_TIMEOUT: Duration = Duration::from_secs(3);
/// A local listener answers at once or not at all.
const LOOPBACK_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Default, Clone, Copy)]
pub struct TokioNetworkProbe;

fn timeout_for(addr: &SocketAddr) -> Duration {
    if addr.ip().is_loopback() { LOOPBACK_TIMEOUT } else { REMOTE_TIMEOUT }
}

/// `host:port`, with IPv6 literals bracketed.
fn socket_target(host: &str, port: u16) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

/// True when any resolved address accepts a connection.
fn connect_any(target: &str) -> Result<bool> {
    let addrs = target
        .to_socket_addrs()
        .with_context(|| format!("resolving {target}"))?;
    Ok(addrs.into_iter().any(|addr| TcpStream::connect_timeout(&addr, timeout_for(&addr)).is_ok()))
}

async fn blocking<T, F>(what: &'static str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .with_context(|| format!("{what} probe task panicked"))?
}

impl NetworkProbe for TokioNetworkProbe {
    async fn check_tcp_connectivity(&self, host: &str, port: u16) -> Result<bool> {
        let target = socket_target(host, port);
        blocking("tcp", move || connect_any(&target)).await
    }

    async fn check_dns_resolution(&self, hostname: &str) -> Result<bool> {
        let target = format!("{hostname}:443");
        blocking("dns", move || Ok(target.to_socket_addrs().is_ok_and(|mut a| a.next().is_some())))
            .await
    }
}
