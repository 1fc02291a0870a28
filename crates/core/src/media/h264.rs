use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use super::rtp::{self, HEADER_LEN};
use super::{AccessUnit, NAL_TYPE_IDR, ParameterSets};
use crate::error::{Result, RtspError};
use crate::transport::PacketRing;

/// Length of the Annex B start code every access unit begins with.
const START_CODE_LEN: usize = 4;
/// FU indicator + FU header.
const FU_A_OVERHEAD: usize = 2;
const NAL_TYPE_STAP_A: u8 = 24;
const NAL_TYPE_FU_A: u8 = 28;

/// Packetizer shared between the session (which creates it) and the producer.
pub type SharedPacketizer = Arc<Mutex<H264Packetizer>>;

/// H.264 RTP packetizer (RFC 6184) writing straight into a [`PacketRing`].
///
/// Each [`AccessUnit`] holds one NAL unit behind a 4-byte start code and
/// leaves as one of:
///
/// - **Single NAL Unit** (§5.6): the NAL fits in `mtu - 12 - 2` bytes and
///   goes out as-is, marker set.
///
/// - **FU-A Fragmentation** (§5.8): larger NALs are split across packets,
///   each carrying a 2-byte FU header before the fragment:
///
///   ```text
///   FU indicator:  [F|NRI|Type=28]     (1 byte)
///   FU header:     [S|E|R|NAL_Type]    (1 byte)
///   Fragment data: [...]               (up to mtu - 14 bytes)
///   ```
///
///   S is set on the first fragment; E and the RTP marker on the last.
///
/// - **STAP-A** (§5.7.1): ahead of every IDR slice, one aggregate packet
///   carrying SPS and PPS so a receiver can join at any keyframe:
///
///   ```text
///   [24][SPS size u16][SPS][PPS size u16][PPS]
///   ```
///
/// All packets of one access unit share its RTP timestamp. Sequence numbers
/// advance by one per committed packet regardless of the mode.
///
/// Callers must serialize [`submit`](Self::submit); [`SharedPacketizer`]
/// does that with a mutex.
pub struct H264Packetizer {
    ring: Arc<PacketRing>,
    clock_rate: u32,
    next_sequence: u16,
    stap_a: Option<Vec<u8>>,
}

impl fmt::Debug for H264Packetizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("H264Packetizer")
            .field("clock_rate", &self.clock_rate)
            .field("next_sequence", &self.next_sequence)
            .field("stap_a_len", &self.stap_a.as_ref().map(Vec::len))
            .finish_non_exhaustive()
    }
}

impl H264Packetizer {
    pub fn new(ring: Arc<PacketRing>, clock_rate: u32) -> Self {
        Self {
            ring,
            clock_rate,
            next_sequence: 1,
            stap_a: None,
        }
    }

    /// Start numbering at `sequence` instead of 1.
    pub fn with_initial_sequence(mut self, sequence: u16) -> Self {
        self.next_sequence = sequence;
        self
    }

    pub fn ring(&self) -> &Arc<PacketRing> {
        &self.ring
    }

    pub fn next_sequence(&self) -> u16 {
        self.next_sequence
    }

    pub fn has_parameter_sets(&self) -> bool {
        self.stap_a.is_some()
    }

    /// Largest NAL (header included) that still fits a single packet.
    pub fn max_payload(&self) -> usize {
        self.ring
            .slot_payload_capacity()
            .saturating_sub(FU_A_OVERHEAD)
            .max(1)
    }

    /// Rebuild the STAP-A packet sent ahead of IDR frames.
    pub fn set_parameter_sets(&mut self, parameter_sets: &ParameterSets) {
        let ParameterSets { sps, pps } = parameter_sets;
        let mut stap_a = Vec::with_capacity(1 + 2 + sps.len() + 2 + pps.len());
        stap_a.push(NAL_TYPE_STAP_A);
        stap_a.extend_from_slice(&(sps.len() as u16).to_be_bytes());
        stap_a.extend_from_slice(sps);
        stap_a.extend_from_slice(&(pps.len() as u16).to_be_bytes());
        stap_a.extend_from_slice(pps);

        tracing::debug!(
            sps_len = sps.len(),
            pps_len = pps.len(),
            "STAP-A parameter sets updated"
        );
        self.stap_a = Some(stap_a);
    }

    /// Packetize one access unit into the ring.
    ///
    /// Blocks while the ring is full. If the ring is closed meanwhile, the
    /// rest of the unit is dropped and `Ok(())` is returned.
    pub fn submit(&mut self, au: &AccessUnit) -> Result<()> {
        if au.data.len() <= START_CODE_LEN {
            return Err(RtspError::InvalidAccessUnit { len: au.data.len() });
        }

        if au.parameter_sets {
            match ParameterSets::from_annex_b(&au.data) {
                Some(parameter_sets) => self.set_parameter_sets(&parameter_sets),
                None => tracing::debug!(
                    len = au.data.len(),
                    "codec config without SPS and PPS ignored"
                ),
            }
            return Ok(());
        }

        match self.packetize(au) {
            Err(RtspError::RingClosed) => {
                tracing::debug!(pts_us = au.pts_us, "packet ring closed, access unit dropped");
                Ok(())
            }
            other => other,
        }
    }

    /// Close the ring, stopping and joining its sender thread.
    pub fn close(&self) {
        self.ring.close();
    }

    fn packetize(&mut self, au: &AccessUnit) -> Result<()> {
        let nal = &au.data[START_CODE_LEN..];
        let nal_header = nal[0];
        let nal_type = nal_header & 0x1f;
        let timestamp = rtp::rtp_timestamp(au.pts_us, self.clock_rate);

        if nal_type == NAL_TYPE_IDR {
            self.send_parameter_sets(timestamp)?;
        }

        let max_payload = self.max_payload();
        if nal.len() <= max_payload {
            // Single NAL Unit mode (RFC 6184 §5.6)
            self.emit(true, timestamp, |payload| {
                payload[..nal.len()].copy_from_slice(nal);
                nal.len()
            })?;
            tracing::trace!(nal_type, nal_size = nal.len(), "single NAL unit packet");
            return Ok(());
        }

        // FU-A fragmentation (RFC 6184 §5.8)
        let fu_indicator = (nal_header & 0xe0) | NAL_TYPE_FU_A;
        let data = &nal[1..];
        // S and E must not both be set, so a NAL one byte over the limit
        // still yields two fragments.
        let fragment_size = if data.len() <= max_payload && data.len() > 1 {
            data.len() - 1
        } else {
            max_payload
        };

        let mut fragments = data.chunks(fragment_size).peekable();
        let mut first = true;
        let mut count = 0usize;
        while let Some(fragment) = fragments.next() {
            let last = fragments.peek().is_none();
            let mut fu_header = nal_type;
            if first {
                fu_header |= 0x80;
            }
            if last {
                fu_header |= 0x40;
            }

            self.emit(last, timestamp, |payload| {
                payload[0] = fu_indicator;
                payload[1] = fu_header;
                payload[FU_A_OVERHEAD..FU_A_OVERHEAD + fragment.len()].copy_from_slice(fragment);
                FU_A_OVERHEAD + fragment.len()
            })?;
            first = false;
            count += 1;
        }

        tracing::trace!(
            nal_type,
            nal_size = nal.len(),
            fragments = count,
            "FU-A fragmented NAL unit"
        );
        Ok(())
    }

    fn send_parameter_sets(&mut self, timestamp: u32) -> Result<()> {
        let Some(stap_a) = self.stap_a.take() else {
            tracing::warn!("IDR frame without SPS/PPS, STAP-A skipped");
            return Ok(());
        };

        let result = if stap_a.len() > self.ring.slot_payload_capacity() {
            tracing::warn!(
                len = stap_a.len(),
                capacity = self.ring.slot_payload_capacity(),
                "STAP-A larger than a packet, skipped"
            );
            Ok(())
        } else {
            self.emit(true, timestamp, |payload| {
                payload[..stap_a.len()].copy_from_slice(&stap_a);
                stap_a.len()
            })
        };
        self.stap_a = Some(stap_a);
        result
    }

    /// Fill one slot through `fill` (which returns the payload length),
    /// stamp the header with the next sequence number, and commit it.
    fn emit(
        &mut self,
        marker: bool,
        timestamp: u32,
        fill: impl FnOnce(&mut [u8]) -> usize,
    ) -> Result<()> {
        let mut slot = self.ring.acquire_slot()?;
        let payload_len = fill(slot.payload_mut());
        slot.write_header(marker, timestamp, self.next_sequence);
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.ring.commit(slot, HEADER_LEN + payload_len);
        Ok(())
    }
}
