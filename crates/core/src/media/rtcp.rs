//! RTCP Sender Report generation (RFC 3550 §6.4.1).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|   RC=0  |    PT=200     |           length=6            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         SSRC of sender                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |              NTP timestamp, most significant word             |
//! |             NTP timestamp, least significant word             |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         RTP timestamp                         |
//! |                     sender's packet count                     |
//! |                      sender's octet count                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! The reporter only builds packets. The ring's sender thread owns it
//! and performs the UDP send, so this type stays synchronous.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Size of a Sender Report without reception report blocks.
pub const SENDER_REPORT_LEN: usize = 28;

/// Default minimum time between two reports.
pub const DEFAULT_REPORT_INTERVAL: Duration = Duration::from_millis(3000);

const PT_SENDER_REPORT: u8 = 200;

/// A ready-to-send Sender Report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SenderReport {
    pub ssrc: u32,
    pub ntp_seconds: u32,
    pub ntp_fraction: u32,
    pub rtp_timestamp: u32,
    pub packet_count: u32,
    pub octet_count: u32,
}

impl SenderReport {
    pub fn to_bytes(&self) -> [u8; SENDER_REPORT_LEN] {
        let mut buf = [0u8; SENDER_REPORT_LEN];
        buf[0] = 0x80;
        buf[1] = PT_SENDER_REPORT;
        buf[2..4].copy_from_slice(&((SENDER_REPORT_LEN / 4 - 1) as u16).to_be_bytes());
        buf[4..8].copy_from_slice(&self.ssrc.to_be_bytes());
        buf[8..12].copy_from_slice(&self.ntp_seconds.to_be_bytes());
        buf[12..16].copy_from_slice(&self.ntp_fraction.to_be_bytes());
        buf[16..20].copy_from_slice(&self.rtp_timestamp.to_be_bytes());
        buf[20..24].copy_from_slice(&self.packet_count.to_be_bytes());
        buf[24..28].copy_from_slice(&self.octet_count.to_be_bytes());
        buf
    }
}

/// Split wall-clock nanoseconds into NTP-style seconds and 2^-32 fractions.
///
/// No 1900 epoch offset is applied: receivers only use the value to pair
/// RTP timestamps with a common clock, and a Unix-epoch base serves that.
pub fn ntp_timestamp(wall_ns: u64) -> (u32, u32) {
    let seconds = wall_ns / 1_000_000_000;
    let remainder = wall_ns % 1_000_000_000;
    let fraction = (remainder << 32) / 1_000_000_000;
    (seconds as u32, fraction as u32)
}

/// Tracks what one RTP stream has sent and decides when to report it.
#[derive(Debug)]
pub struct RtcpReporter {
    ssrc: u32,
    packet_count: u32,
    octet_count: u32,
    interval: Duration,
    last_report: Option<Instant>,
}

impl RtcpReporter {
    pub fn new(ssrc: u32, interval: Duration) -> Self {
        Self {
            ssrc,
            packet_count: 0,
            octet_count: 0,
            interval,
            last_report: None,
        }
    }

    pub fn ssrc(&self) -> u32 {
        self.ssrc
    }

    pub fn packet_count(&self) -> u32 {
        self.packet_count
    }

    pub fn octet_count(&self) -> u32 {
        self.octet_count
    }

    /// Change the SSRC. Counters belong to the old stream and are cleared.
    pub fn set_ssrc(&mut self, ssrc: u32) {
        self.ssrc = ssrc;
        self.reset();
    }

    /// Zero the counters and restart the report timer.
    pub fn reset(&mut self) {
        self.packet_count = 0;
        self.octet_count = 0;
        self.last_report = None;
    }

    /// Account for one packet about to be sent; returns a report when one is due.
    pub fn on_packet_sent(&mut self, byte_len: usize, rtp_timestamp: u32) -> Option<SenderReport> {
        let wall_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);
        self.on_packet_sent_at(byte_len, rtp_timestamp, Instant::now(), wall_ns)
    }

    /// [`on_packet_sent`](Self::on_packet_sent) with explicit monotonic and wall clocks.
    ///
    /// The first packet after a reset starts the timer, so no report goes
    /// out before one full interval of traffic. A zero interval disables
    /// reporting.
    pub fn on_packet_sent_at(
        &mut self,
        byte_len: usize,
        rtp_timestamp: u32,
        now: Instant,
        wall_ns: u64,
    ) -> Option<SenderReport> {
        self.packet_count = self.packet_count.wrapping_add(1);
        self.octet_count = self.octet_count.wrapping_add(byte_len as u32);

        let started = *self.last_report.get_or_insert(now);
        if self.interval.is_zero() || now.duration_since(started) < self.interval {
            return None;
        }
        self.last_report = Some(now);

        let (ntp_seconds, ntp_fraction) = ntp_timestamp(wall_ns);
        let report = SenderReport {
            ssrc: self.ssrc,
            ntp_seconds,
            ntp_fraction,
            rtp_timestamp,
            packet_count: self.packet_count,
            octet_count: self.octet_count,
        };
        tracing::trace!(
            ssrc = format_args!("{:#010X}", self.ssrc),
            packets = self.packet_count,
            octets = self.octet_count,
            "sender report due"
        );
        Some(report)
    }
}
