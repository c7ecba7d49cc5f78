use std::net::{IpAddr, SocketAddr, TcpListener, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::LinkStream;

/// TCP transport to the rig controller.
pub struct TcpTransport;

impl TcpTransport {
    /// Port the rig firmware listens on.
    pub const DEFAULT_PORT: u16 = 8001;

    /// Resolve `addr` into candidate socket addresses.
    ///
    /// A bare host or IP without a port gets [`Self::DEFAULT_PORT`].
    pub fn resolve(addr: &str) -> Result<Vec<SocketAddr>> {
        let addr = addr.trim();
        if let Ok(socket) = addr.parse::<SocketAddr>() {
            return Ok(vec![socket]);
        }
        if let Ok(ip) = addr.parse::<IpAddr>() {
            return Ok(vec![SocketAddr::new(ip, Self::DEFAULT_PORT)]);
        }

        let target = if addr.contains(':') {
            addr.to_string()
        } else {
            format!("{addr}:{}", Self::DEFAULT_PORT)
        };

        let resolved: Vec<SocketAddr> = target
            .to_socket_addrs()
            .map_err(|source| TransportError::Resolve {
                addr: addr.to_string(),
                source,
            })?
            .collect();

        if resolved.is_empty() {
            return Err(TransportError::Resolve {
                addr: addr.to_string(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "no socket addresses found",
                ),
            });
        }
        Ok(resolved)
    }

    /// Connect to the rig (blocking, bounded by `timeout`).
    ///
    /// Every resolved address is tried in order; the last failure is returned.
    pub fn connect(addr: &str, timeout: Duration) -> Result<LinkStream> {
        let candidates = Self::resolve(addr)?;
        let mut last_err = None;

        for candidate in candidates {
            match std::net::TcpStream::connect_timeout(&candidate, timeout) {
                Ok(stream) => {
                    debug!(peer = %candidate, "connected to rig");
                    let link = LinkStream::from_tcp(stream);
                    link.set_nodelay(true)?;
                    return Ok(link);
                }
                Err(source) => {
                    debug!(peer = %candidate, error = %source, "connect attempt failed");
                    last_err = Some(TransportError::Connect {
                        addr: candidate,
                        source,
                    });
                }
            }
        }

        // resolve() never returns an empty list
        Err(last_err.unwrap_or_else(|| TransportError::Resolve {
            addr: addr.to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "no candidates"),
        }))
    }

    /// Transport name for diagnostics.
    pub fn transport_name() -> &'static str {
        "tcp"
    }
}

/// Rig-side TCP listener.
///
/// Used by the rig simulator and tests; the console itself only connects.
pub struct TcpLinkListener {
    listener: TcpListener,
    local: SocketAddr,
}

impl TcpLinkListener {
    /// Bind and listen. Port `0` picks an ephemeral port; see [`Self::local_addr`].
    pub fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local = listener.local_addr()?;
        info!(%local, "listening for console connections");
        Ok(Self { listener, local })
    }

    /// Accept an incoming connection (blocking).
    pub fn accept(&self) -> Result<LinkStream> {
        let (stream, peer) = self.listener.accept().map_err(TransportError::Accept)?;
        debug!(%peer, "accepted console connection");
        stream.set_nodelay(true)?;
        Ok(LinkStream::from_tcp(stream))
    }

    /// The address actually bound.
    pub fn local_addr(&self) -> SocketAddr {
        self.local
    }
}
