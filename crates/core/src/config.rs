//! Publisher settings.

use std::time::Duration;

use crate::media::rtcp::DEFAULT_REPORT_INTERVAL;
use crate::media::rtp;
use crate::protocol::Credentials;
use crate::transport::ring::{DEFAULT_IDLE_TIMEOUT, DEFAULT_RING_CAPACITY, RingConfig};

/// Everything a [`Publisher`](crate::Publisher) needs to reach the server
/// and shape the outgoing stream.
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// `rtsp[s]://host[:port]/app/stream`.
    pub url: String,
    /// Used only if the server challenges ANNOUNCE with a 401.
    pub credentials: Option<Credentials>,
    /// Informational; the encoder decides the real resolution.
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    /// RTP dynamic payload type announced in SDP.
    pub payload_type: u8,
    /// RTP media clock in Hz.
    pub clock_rate: u32,
    /// Largest RTP datagram, header included.
    pub mtu: usize,
    /// Number of pre-allocated packet slots.
    pub ring_capacity: usize,
    /// Minimum time between RTCP Sender Reports; zero disables them.
    pub report_interval: Duration,
    /// Sender thread exits after this long without packets.
    pub sender_idle_timeout: Duration,
    pub connect_timeout: Duration,
    /// Applied to every RTSP response read.
    pub read_timeout: Duration,
    pub track_id: u16,
    /// IP time-to-live of RTP/RTCP datagrams.
    pub ttl: u32,
    /// SDP origin username field (`o=<username> ...`).
    pub sdp_username: String,
    /// SDP session name (`s=`).
    pub sdp_session_name: String,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            credentials: None,
            width: 640,
            height: 480,
            fps: 30,
            payload_type: 96,
            clock_rate: 90_000,
            mtu: 1300,
            ring_capacity: DEFAULT_RING_CAPACITY,
            report_interval: DEFAULT_REPORT_INTERVAL,
            sender_idle_timeout: DEFAULT_IDLE_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
            read_timeout: Duration::from_secs(5),
            track_id: 1,
            ttl: 64,
            sdp_username: "-".to_string(),
            sdp_session_name: "Unnamed".to_string(),
        }
    }
}

impl PublisherConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.credentials = Some(Credentials::new(username, password));
        self
    }

    /// Packet ring settings for one session, with a fresh random SSRC.
    pub fn ring_config(&self) -> RingConfig {
        RingConfig {
            capacity: self.ring_capacity,
            slot_size: self.mtu,
            payload_type: self.payload_type,
            ssrc: rtp::random_ssrc(),
            idle_timeout: self.sender_idle_timeout,
            report_interval: self.report_interval,
        }
    }
}
