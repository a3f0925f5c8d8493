//! Outbound announcements.

use std::io;
use std::net::SocketAddrV4;
use std::sync::Arc;
use std::time::Duration;

use lan_discovery_core::logging::targets;
use socket2::{Domain, Protocol, SockAddr, Socket, Type};
use tokio::net::UdpSocket;
use tracing::{debug, trace};

use crate::config::DiscoveryConfig;
use crate::error::{DiscoveryError, Result};
use crate::resolver::Endpoints;

/// Map a socket setup failure to [`DiscoveryError::Socket`], naming the step.
pub(crate) fn socket_error(step: &'static str) -> impl FnOnce(io::Error) -> DiscoveryError {
    move |e| DiscoveryError::Socket(format!("{step}: {e}"))
}

/// Sends single announcements from the local endpoint to the group.
///
/// Every [`announce`](Self::announce) opens its own socket and releases it
/// before returning, whether the write succeeded or not. Nothing is carried
/// from one announcement to the next, so calls may run concurrently.
#[derive(Debug, Clone)]
pub struct Announcer {
    endpoints: Endpoints,
    payload: Arc<[u8]>,
    write_timeout: Option<Duration>,
    retries: u32,
    multicast_ttl: u32,
    multicast_loopback: bool,
}

impl Announcer {
    /// Create an announcer whose payload is the configured group name.
    pub fn new(endpoints: Endpoints, config: &DiscoveryConfig) -> Self {
        Self {
            endpoints,
            payload: Arc::from(config.group_name.as_bytes()),
            write_timeout: config.write_timeout,
            retries: config.announce_retries,
            multicast_ttl: config.multicast_ttl,
            multicast_loopback: config.multicast_loopback,
        }
    }

    /// The endpoints announcements are sent from and to.
    pub fn endpoints(&self) -> Endpoints {
        self.endpoints
    }

    /// The raw announcement payload.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Send one announcement. Returns the number of bytes written.
    pub async fn announce(&self) -> Result<usize> {
        let socket = self.open_socket()?;

        let mut attempt = 0;
        loop {
            match self.write_once(&socket).await {
                Ok(n) => {
                    trace!(
                        target: targets::ANNOUNCE,
                        "announced {} bytes {} -> {}",
                        n,
                        self.endpoints.local,
                        self.endpoints.remote
                    );
                    return Ok(n);
                }
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    debug!(
                        target: targets::ANNOUNCE,
                        "announce write failed ({}), retry {}/{}", e, attempt, self.retries
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Open a socket bound to the local endpoint and connected to the group.
    fn open_socket(&self) -> Result<UdpSocket> {
        let Endpoints { local, remote } = self.endpoints;

        let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))
            .map_err(socket_error("create"))?;
        socket
            .set_reuse_address(true)
            .map_err(socket_error("SO_REUSEADDR"))?;
        socket
            .bind(&SockAddr::from(local))
            .map_err(socket_error("bind"))?;

        if remote.ip().is_multicast() {
            Self::apply_multicast_options(&socket, local, self.multicast_ttl, self.multicast_loopback)?;
        }

        socket
            .connect(&SockAddr::from(remote))
            .map_err(socket_error("connect"))?;
        socket
            .set_nonblocking(true)
            .map_err(socket_error("set nonblocking"))?;

        UdpSocket::from_std(socket.into()).map_err(socket_error("register"))
    }

    fn apply_multicast_options(
        socket: &Socket,
        local: SocketAddrV4,
        ttl: u32,
        loopback: bool,
    ) -> Result<()> {
        // Leave through the interface that owns the local address.
        if !local.ip().is_unspecified() {
            socket
                .set_multicast_if_v4(local.ip())
                .map_err(socket_error("IP_MULTICAST_IF"))?;
        }
        socket
            .set_multicast_ttl_v4(ttl)
            .map_err(socket_error("IP_MULTICAST_TTL"))?;
        socket
            .set_multicast_loop_v4(loopback)
            .map_err(socket_error("IP_MULTICAST_LOOP"))?;
        Ok(())
    }

    async fn write_once(&self, socket: &UdpSocket) -> Result<usize> {
        let send = socket.send(&self.payload);
        let written = match self.write_timeout {
            Some(timeout) => tokio::time::timeout(timeout, send).await??,
            None => send.await?,
        };

        if written != self.payload.len() {
            return Err(DiscoveryError::Io(format!(
                "short write: {} of {} bytes",
                written,
                self.payload.len()
            )));
        }
        Ok(written)
    }
}
