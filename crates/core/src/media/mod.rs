//! Media input types, H.264 RTP packetization, and RTCP reporting.
//!
//! The encoder hands the publisher two kinds of values:
//!
//! - [`ParameterSets`]: the SPS/PPS pair, delivered once per encoder
//!   (re)start. It feeds both the SDP `fmtp` line of the ANNOUNCE body
//!   and the STAP-A packet sent ahead of every IDR frame.
//! - [`AccessUnit`]: one encoded NAL unit prefixed with a 4-byte Annex B
//!   start code, stamped with its presentation time in microseconds.
//!
//! ## RTP overview (RFC 3550)
//!
//! Every RTP packet carries a 12-byte fixed header ([`rtp`]) containing:
//!
//! - **Sequence number** (16-bit, wrapping): for reordering and loss detection.
//! - **Timestamp** (32-bit): media clock, 90 kHz for video.
//! - **SSRC** (32-bit): randomly chosen to identify the sender.
//! - **Marker bit**: set on the last packet of an access unit.
//!
//! | Payload mode | RFC 6184 | Used for |
//! |--------------|----------|----------|
//! | Single NAL unit | §5.6 | NALs that fit one packet |
//! | STAP-A | §5.7.1 | SPS + PPS ahead of each IDR |
//! | FU-A | §5.8 | NALs larger than one packet |

pub mod h264;
pub mod rtcp;
pub mod rtp;

use base64::prelude::{BASE64_STANDARD, Engine as _};

/// NAL unit type of an IDR slice.
pub const NAL_TYPE_IDR: u8 = 5;
/// NAL unit type of a sequence parameter set.
pub const NAL_TYPE_SPS: u8 = 7;
/// NAL unit type of a picture parameter set.
pub const NAL_TYPE_PPS: u8 = 8;

const START_CODE: [u8; 4] = [0, 0, 0, 1];

/// One encoded H.264 NAL unit as produced by the encoder.
///
/// `data` starts with the 4-byte Annex B start code; byte 4 is the NAL
/// header. The packetizer consumes it once and does not retain it.
#[derive(Debug, Clone)]
pub struct AccessUnit {
    pub data: Vec<u8>,
    /// Presentation time in microseconds.
    pub pts_us: u64,
    /// Set when the payload is codec configuration (SPS/PPS) rather than a slice.
    pub parameter_sets: bool,
}

impl AccessUnit {
    pub fn new(data: Vec<u8>, pts_us: u64) -> Self {
        Self {
            data,
            pts_us,
            parameter_sets: false,
        }
    }

    /// Build an access unit from a bare NAL unit, prepending the start code.
    pub fn from_nal(nal: &[u8], pts_us: u64) -> Self {
        let mut data = Vec::with_capacity(START_CODE.len() + nal.len());
        data.extend_from_slice(&START_CODE);
        data.extend_from_slice(nal);
        Self::new(data, pts_us)
    }

    /// Mark this unit as codec configuration.
    pub fn with_parameter_sets_flag(mut self) -> Self {
        self.parameter_sets = true;
        self
    }

    /// NAL unit type (low 5 bits of the header byte), if the unit is long enough.
    pub fn nal_type(&self) -> Option<u8> {
        self.data.get(START_CODE.len()).map(|b| b & 0x1f)
    }
}

/// The H.264 SPS/PPS pair, stored without start codes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterSets {
    pub sps: Vec<u8>,
    pub pps: Vec<u8>,
}

impl ParameterSets {
    /// Create from raw NAL bytes. A leading Annex B start code is stripped.
    pub fn new(sps: &[u8], pps: &[u8]) -> Self {
        Self {
            sps: strip_start_code(sps).to_vec(),
            pps: strip_start_code(pps).to_vec(),
        }
    }

    /// Pick the first SPS and PPS out of an Annex B buffer, e.g. the
    /// codec-config output of an encoder or the head of an `.h264` file.
    ///
    /// Returns `None` unless both are present.
    pub fn from_annex_b(data: &[u8]) -> Option<Self> {
        let mut sps = None;
        let mut pps = None;
        for nal in extract_nal_units(data) {
            let nal_type = nal.first().map(|b| b & 0x1f);
            match nal_type {
                Some(NAL_TYPE_SPS) if sps.is_none() => sps = Some(nal),
                Some(NAL_TYPE_PPS) if pps.is_none() => pps = Some(nal),
                _ => {}
            }
            if sps.is_some() && pps.is_some() {
                break;
            }
        }
        Some(Self {
            sps: sps?,
            pps: pps?,
        })
    }

    /// `profile-level-id` (RFC 6184 §8.1): SPS bytes 1–3 are profile_idc,
    /// constraint flags, and level_idc.
    pub fn profile_level_id(&self) -> Option<String> {
        if self.sps.len() < 4 {
            return None;
        }
        Some(format!(
            "{:02x}{:02x}{:02x}",
            self.sps[1], self.sps[2], self.sps[3]
        ))
    }

    /// `sprop-parameter-sets` value: base64 SPS and PPS joined by a comma.
    pub fn sprop_parameter_sets(&self) -> String {
        format!(
            "{},{}",
            BASE64_STANDARD.encode(&self.sps),
            BASE64_STANDARD.encode(&self.pps)
        )
    }
}

fn strip_start_code(data: &[u8]) -> &[u8] {
    data.strip_prefix(&START_CODE[..])
        .or_else(|| data.strip_prefix(&START_CODE[1..]))
        .unwrap_or(data)
}

/// Extract NAL units from an H.264 Annex B bitstream.
///
/// Scans for start codes (both 4-byte `00 00 00 01` and 3-byte
/// `00 00 01`) and returns the NAL data between them, excluding
/// the start codes themselves.
///
/// The start code length is tracked per-NAL so that boundaries between
/// adjacent NALs come out right when 3-byte and 4-byte start codes mix.
pub fn extract_nal_units(data: &[u8]) -> Vec<Vec<u8>> {
    let mut nal_units = Vec::new();
    let mut i = 0usize;

    // (nal_data_start_index, start_code_length)
    let mut start_entries: Vec<(usize, usize)> = Vec::new();

    while i < data.len() {
        if i + 3 < data.len() && data[i..i + 4] == START_CODE {
            start_entries.push((i + 4, 4));
            i += 4;
        } else if i + 2 < data.len() && data[i..i + 3] == START_CODE[1..] {
            start_entries.push((i + 3, 3));
            i += 3;
        } else {
            i += 1;
        }
    }

    for (idx, &(start, _)) in start_entries.iter().enumerate() {
        let end = match start_entries.get(idx + 1) {
            Some(&(next_start, next_sc_len)) => next_start - next_sc_len,
            None => data.len(),
        };

        if start < end {
            nal_units.push(data[start..end].to_vec());
        }
    }

    nal_units
}
