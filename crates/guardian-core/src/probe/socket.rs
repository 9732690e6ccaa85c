use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::{timeout_at, Instant};
use tracing::debug;

use super::{ProbeError, ProbeReport, Prober};
use crate::endpoint::{Endpoint, Protocol};

/// Prober backed by real TCP connects and UDP datagrams.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketProber;

impl SocketProber {
    pub fn new() -> Self {
        Self
    }

    /// Connect to `host:port`. Name resolution and the handshake share one
    /// `limit`.
    pub async fn probe_tcp(
        &self,
        host: &str,
        port: u16,
        limit: Duration,
    ) -> Result<Duration, ProbeError> {
        let target = format!("{host}:{port}");
        let start = Instant::now();
        let deadline = start + limit;

        let addrs = resolve(host, port, deadline, limit).await?;
        match timeout_at(deadline, TcpStream::connect(&addrs[..])).await {
            Ok(Ok(_stream)) => Ok(start.elapsed()),
            Ok(Err(source)) => Err(ProbeError::Connect { target, source }),
            Err(_) => Err(ProbeError::Timeout {
                target,
                after: limit,
            }),
        }
    }

    /// Send an empty datagram to `host:port` and wait for a reply until
    /// `limit` has passed since the probe started.
    ///
    /// Silence counts as reachable: many UDP services never answer, and the
    /// absence of a send error or ICMP unreachable means the path to the host
    /// is open. Only hard socket errors are reported as failures, so UDP
    /// checks report "alive" more readily than TCP checks.
    pub async fn probe_udp(
        &self,
        host: &str,
        port: u16,
        limit: Duration,
    ) -> Result<Duration, ProbeError> {
        let target = format!("{host}:{port}");
        let deadline = Instant::now() + limit;

        let addrs = resolve(host, port, deadline, limit).await?;
        let remote = addrs[0];
        let local: SocketAddr = if remote.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };

        let socket = UdpSocket::bind(local)
            .await
            .map_err(|source| ProbeError::Bind {
                target: target.clone(),
                source,
            })?;

        let sent_at = Instant::now();
        socket
            .send_to(&[], remote)
            .await
            .map_err(|source| ProbeError::Send {
                target: target.clone(),
                source,
            })?;

        let mut buf = [0u8; 1024];
        match timeout_at(deadline, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) => {
                debug!(%target, %from, len, "UDP probe got a reply");
                Ok(sent_at.elapsed())
            }
            Ok(Err(source)) => Err(ProbeError::Receive { target, source }),
            Err(_) => {
                debug!(%target, "UDP probe read timed out, treating as reachable");
                Ok(sent_at.elapsed())
            }
        }
    }
}

async fn resolve(
    host: &str,
    port: u16,
    deadline: Instant,
    limit: Duration,
) -> Result<Vec<SocketAddr>, ProbeError> {
    let target = format!("{host}:{port}");
    let addrs: Vec<SocketAddr> = match timeout_at(deadline, tokio::net::lookup_host((host, port)))
        .await
    {
        Ok(Ok(addrs)) => addrs.collect(),
        Ok(Err(e)) => {
            return Err(ProbeError::Resolve {
                target,
                reason: e.to_string(),
            })
        }
        Err(_) => {
            return Err(ProbeError::Timeout {
                target,
                after: limit,
            })
        }
    };

    if addrs.is_empty() {
        return Err(ProbeError::Resolve {
            target,
            reason: "no addresses returned".to_string(),
        });
    }
    Ok(addrs)
}

#[async_trait]
impl Prober for SocketProber {
    async fn probe(&self, endpoint: &Endpoint, timeout: Duration) -> ProbeReport {
        let result = match &endpoint.protocol {
            Protocol::Tcp => self.probe_tcp(&endpoint.host, endpoint.port, timeout).await,
            Protocol::Udp => self.probe_udp(&endpoint.host, endpoint.port, timeout).await,
            Protocol::Unsupported(raw) => Err(ProbeError::UnsupportedProtocol(raw.clone())),
        };

        if let Err(ref e) = result {
            debug!(endpoint = %endpoint, error = %e, "Probe failed");
        }
        result.into()
    }
}
