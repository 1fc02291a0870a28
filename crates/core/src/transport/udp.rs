use std::io;
use std::net::{SocketAddr, UdpSocket};

use crate::error::Result;

/// Where the packet ring hands finished datagrams.
///
/// [`UdpTransport`] is the production implementation; tests substitute a
/// sink that records packets instead of touching the network.
pub trait DatagramSink: Send + Sync {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize>;
}

/// UDP transport for outbound RTP and RTCP packets.
///
/// Binds a single ephemeral socket (`0.0.0.0:0`); both RTP and RTCP go
/// out through it to the server ports negotiated during SETUP.
///
/// This layer is address-only and knows nothing about sessions. The
/// ring resolves the destination before calling [`send_to`](Self::send_to).
pub struct UdpTransport {
    socket: UdpSocket,
}

impl UdpTransport {
    /// Bind an ephemeral UDP socket for outbound media.
    pub fn bind() -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        tracing::debug!(local = ?socket.local_addr().ok(), "UDP transport bound");
        Ok(Self { socket })
    }

    /// Bind and set the IP time-to-live of outgoing packets.
    pub fn bind_with_ttl(ttl: u32) -> Result<Self> {
        let transport = Self::bind()?;
        transport.socket.set_ttl(ttl)?;
        Ok(transport)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }
}

impl DatagramSink for UdpTransport {
    fn send_to(&self, payload: &[u8], addr: SocketAddr) -> io::Result<usize> {
        self.socket.send_to(payload, addr)
    }
}
