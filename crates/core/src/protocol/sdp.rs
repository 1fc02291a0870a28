//! SDP (Session Description Protocol) generation (RFC 4566 / RFC 8866).
//!
//! Produces the body of the ANNOUNCE request. The format:
//!
//! ```text
//! v=0                                          ← protocol version
//! o=<user> <sess-id> <sess-ver> IN IP4 <addr>  ← origin
//! s=<session-name>                             ← session name
//! i=N/A                                        ← session information
//! c=IN IP4 <server-host>                       ← connection address
//! t=0 0                                        ← timing (live stream)
//! a=recvonly                                   ← direction, server side
//! m=video <port> RTP/AVP 96                    ← media description
//! a=rtpmap:96 H264/90000                       ← codec/clock rate
//! a=fmtp:96 packetization-mode=1;...           ← codec parameters
//! a=control:trackID=1                          ← track control URL
//! ```

use crate::media::ParameterSets;

/// Inputs of the ANNOUNCE session description that do not come from the
/// encoder.
#[derive(Debug, Clone)]
pub struct AnnounceSdp<'a> {
    pub username: &'a str,
    pub session_name: &'a str,
    /// Origin session id and version (an NTP-style timestamp).
    pub session_id: u64,
    /// Server host, used for the connection line.
    pub host: &'a str,
    pub payload_type: u8,
    pub clock_rate: u32,
    pub track_id: u16,
}

impl AnnounceSdp<'_> {
    /// Render the description with the stream's SPS/PPS in the `fmtp` line.
    pub fn render(&self, parameter_sets: &ParameterSets) -> String {
        let mut sdp: Vec<String> = Vec::new();

        sdp.push("v=0".to_string());
        sdp.push(format!(
            "o={} {} {} IN IP4 127.0.0.1",
            self.username, self.session_id, self.session_id
        ));
        sdp.push(format!("s={}", self.session_name));
        sdp.push("i=N/A".to_string());
        sdp.push(format!("c=IN IP4 {}", self.host));
        sdp.push("t=0 0".to_string());
        sdp.push("a=recvonly".to_string());
        sdp.push(format!(
            "m=video {} RTP/AVP {}",
            client_rtp_port(self.track_id),
            self.payload_type
        ));
        sdp.push(format!(
            "a=rtpmap:{} H264/{}",
            self.payload_type, self.clock_rate
        ));

        let mut fmtp = format!("a=fmtp:{} packetization-mode=1", self.payload_type);
        if let Some(profile) = parameter_sets.profile_level_id() {
            fmtp.push_str(&format!(";profile-level-id={}", profile));
        }
        fmtp.push_str(&format!(
            ";sprop-parameter-sets={}",
            parameter_sets.sprop_parameter_sets()
        ));
        sdp.push(fmtp);
        sdp.push(format!("a=control:trackID={}", self.track_id));

        tracing::debug!("SDP: {}", sdp.join("\r\n"));

        format!("{}\r\n", sdp.join("\r\n"))
    }
}

/// Client RTP port for a track: `5000 + 2 * track`. RTCP is the next port.
pub fn client_rtp_port(track_id: u16) -> u16 {
    5000u16.saturating_add(track_id.saturating_mul(2))
}
