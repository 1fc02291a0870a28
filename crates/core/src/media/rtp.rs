//! RTP fixed header layout (RFC 3550 §5.1), written in place into ring slots.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       Sequence Number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           Timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Slots are pre-allocated once, so the header is split in two phases:
//! [`write_template`] sets the fields that never change for a stream
//! (version, payload type, SSRC), and [`write_fields`] stamps the
//! per-packet marker, sequence number and timestamp.
//!
//! Version is always 2. Padding, extension, and CSRC count are always 0.

/// Size of the fixed RTP header.
pub const HEADER_LEN: usize = 12;

const VERSION_2: u8 = 2 << 6;
const MARKER_BIT: u8 = 0x80;

/// Write the per-stream header fields into `buf[..12]`.
pub fn write_template(buf: &mut [u8], pt: u8, ssrc: u32) {
    buf[0] = VERSION_2;
    buf[1] = pt & 0x7f;
    write_ssrc(buf, ssrc);
}

/// Overwrite the SSRC field (bytes 8–11).
pub fn write_ssrc(buf: &mut [u8], ssrc: u32) {
    buf[8..12].copy_from_slice(&ssrc.to_be_bytes());
}

/// Stamp marker, sequence number and timestamp, keeping the template fields.
///
/// The marker bit (RFC 3550 §5.1) signals the last packet of an access
/// unit for H.264 (RFC 6184 §5.1).
pub fn write_fields(buf: &mut [u8], marker: bool, sequence: u16, timestamp: u32) {
    set_marker(buf, marker);
    buf[2..4].copy_from_slice(&sequence.to_be_bytes());
    buf[4..8].copy_from_slice(&timestamp.to_be_bytes());
}

pub fn set_marker(buf: &mut [u8], marker: bool) {
    if marker {
        buf[1] |= MARKER_BIT;
    } else {
        buf[1] &= !MARKER_BIT;
    }
}

pub fn marker(buf: &[u8]) -> bool {
    buf[1] & MARKER_BIT != 0
}

pub fn payload_type(buf: &[u8]) -> u8 {
    buf[1] & 0x7f
}

pub fn sequence(buf: &[u8]) -> u16 {
    u16::from_be_bytes([buf[2], buf[3]])
}

pub fn timestamp(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]])
}

pub fn ssrc(buf: &[u8]) -> u32 {
    u32::from_be_bytes([buf[8], buf[9], buf[10], buf[11]])
}

/// Random SSRC per RFC 3550 §8.1, to avoid collisions between
/// independent senders.
pub fn random_ssrc() -> u32 {
    rand::random::<u32>()
}

/// Convert a presentation time in microseconds to the RTP media clock.
///
/// `pts_us × clock_rate / 1_000_000`, truncated to the 32-bit wire field.
pub fn rtp_timestamp(pts_us: u64, clock_rate: u32) -> u32 {
    (pts_us as u128 * clock_rate as u128 / 1_000_000) as u32
}
