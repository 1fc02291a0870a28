//! Network transport for RTSP signaling and RTP/RTCP media.
//!
//! RTSP uses a split transport model:
//!
//! - **TCP** ([`tcp`]): carries the RTSP request/response exchange with
//!   the media server, one connection per publishing session.
//!
//! - **UDP** ([`udp`]): carries RTP and RTCP. Packets are staged in a
//!   [`PacketRing`] and sent by its background thread through a single
//!   ephemeral socket.

#[cfg(test)]
pub(crate) mod capture;
pub mod ring;
pub mod semaphore;
pub mod tcp;
pub mod udp;

pub use ring::{Destination, PacketRing, RingConfig, SlotGuard};
pub use tcp::RtspConnection;
pub use udp::{DatagramSink, UdpTransport};
