use crate::error::{ParseErrorKind, RtspError};

/// Server RTP/RTCP port pair from a SETUP response (RFC 2326 §12.39).
///
/// ## Wire format example
///
/// ```text
/// Client → Server:
///   Transport: RTP/AVP/UDP;unicast;client_port=5002-5003;mode=record
///
/// Server → Client:
///   Transport: RTP/AVP/UDP;unicast;client_port=5002-5003;server_port=6970-6971
/// ```
///
/// The publisher sends RTP to `host:rtp` and Sender Reports to `host:rtcp`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerPorts {
    pub rtp: u16,
    pub rtcp: u16,
}

impl ServerPorts {
    /// Parse the `server_port=RTP-RTCP` parameter of a `Transport` header value.
    ///
    /// Returns `Ok(None)` when the parameter is absent and an error when it
    /// is present but malformed.
    ///
    /// ## Examples
    ///
    /// ```
    /// use rtsp_push::session::transport::ServerPorts;
    ///
    /// let ports = ServerPorts::parse("RTP/AVP;unicast;server_port=6970-6971")
    ///     .unwrap()
    ///     .unwrap();
    /// assert_eq!(ports.rtp, 6970);
    /// assert_eq!(ports.rtcp, 6971);
    ///
    /// assert!(ServerPorts::parse("RTP/AVP;unicast").unwrap().is_none());
    /// ```
    pub fn parse(header: &str) -> crate::error::Result<Option<Self>> {
        for part in header.split(';') {
            let part = part.trim();
            if let Some(ports) = part.strip_prefix("server_port=") {
                let invalid = || RtspError::Parse {
                    kind: ParseErrorKind::InvalidTransport,
                };
                let (rtp, rtcp) = match ports.split_once('-') {
                    Some((rtp, rtcp)) => (rtp, rtcp),
                    // A lone port implies RTCP on the next one.
                    None => (ports, ""),
                };
                let rtp: u16 = rtp.trim().parse().map_err(|_| invalid())?;
                let rtcp: u16 = if rtcp.is_empty() {
                    rtp.checked_add(1).ok_or_else(invalid)?
                } else {
                    rtcp.trim().parse().map_err(|_| invalid())?
                };
                return Ok(Some(ServerPorts { rtp, rtcp }));
            }
        }
        Ok(None)
    }
}
