//! Datagram socket setup for the server
//!
//! The server never picks its own port: it binds port 0 and reads back what
//! the kernel assigned, so concurrent suites on one host never collide.

use socket2::{Domain, Protocol, Socket, Type};
use std::net::{SocketAddr, UdpSocket};

/// Result type for socket operations
pub type Result<T> = std::result::Result<T, Error>;

/// Socket setup errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve local address: {0}")]
    LocalAddr(String),
}

/// A bound, non-blocking UDP socket and the port it resolved to
#[derive(Debug)]
pub struct BoundSocket {
    socket: UdpSocket,
    local_addr: SocketAddr,
    port: String,
}

impl BoundSocket {
    /// Concrete local address
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Port as a number
    pub fn port_number(&self) -> u16 {
        self.local_addr.port()
    }

    /// Port as a string usable in URLs
    pub fn port(&self) -> &str {
        &self.port
    }

    /// Hand the socket over to the transport
    pub fn into_socket(self) -> UdpSocket {
        self.socket
    }
}

/// Bind a datagram socket on `addr` and resolve the assigned port
///
/// Pass a port of 0 to let the kernel choose.
pub fn bind_ephemeral_udp(addr: SocketAddr) -> Result<BoundSocket> {
    let bind_err = |source| Error::Bind { addr, source };

    let domain = if addr.is_ipv4() {
        Domain::IPV4
    } else {
        Domain::IPV6
    };

    let socket = Socket::new(domain, Type::DGRAM, Some(Protocol::UDP)).map_err(bind_err)?;
    socket.bind(&addr.into()).map_err(bind_err)?;
    socket.set_nonblocking(true).map_err(bind_err)?;

    let local_addr = socket
        .local_addr()
        .map_err(|e| Error::LocalAddr(e.to_string()))?
        .as_socket()
        .ok_or_else(|| Error::LocalAddr("not an inet address".to_string()))?;

    if local_addr.port() == 0 {
        return Err(Error::LocalAddr("kernel assigned port 0".to_string()));
    }

    tracing::debug!(%local_addr, "bound UDP socket");

    Ok(BoundSocket {
        socket: socket.into(),
        local_addr,
        port: local_addr.port().to_string(),
    })
}
