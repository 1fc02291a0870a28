//! Error types for the RTSP publishing client.

use std::fmt;
use std::net::SocketAddr;

use crate::protocol::Method;

/// Errors that can occur while publishing a stream.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Connection**: [`Io`](Self::Io), [`Connection`](Self::Connection):
///   socket failures and timeouts. Fatal for the current attempt.
/// - **Negotiation**: [`AuthRequired`](Self::AuthRequired),
///   [`AuthFailed`](Self::AuthFailed), [`AccessDenied`](Self::AccessDenied),
///   [`UnexpectedStatus`](Self::UnexpectedStatus), [`Parse`](Self::Parse).
///   Any of these unwinds the whole `connect` attempt.
/// - **Media**: [`InvalidAccessUnit`](Self::InvalidAccessUnit),
///   [`SendFailure`](Self::SendFailure), [`RingClosed`](Self::RingClosed).
///   Local to one frame or packet; the session keeps going.
#[derive(Debug, thiserror::Error)]
pub enum RtspError {
    /// Underlying I/O or socket error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// TCP connect, read, or write on the RTSP connection failed or timed out.
    #[error("connection to {addr} failed: {source}")]
    Connection {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The URL does not match `rtsp[s]://host[:port]/app/stream`.
    #[error("invalid RTSP URL: {0}")]
    InvalidUrl(String),

    /// Server answered 401 and no credentials are configured.
    #[error("server requires authentication but no credentials are configured")]
    AuthRequired,

    /// Server answered 401 to the authenticated retry.
    #[error("server rejected the supplied credentials")]
    AuthFailed,

    /// Server answered 403.
    #[error("access denied by server")]
    AccessDenied,

    /// A request was answered with a non-success status that has no dedicated variant.
    #[error("{method} failed: {code} {reason}")]
    UnexpectedStatus {
        method: Method,
        code: u16,
        reason: String,
    },

    /// Access unit too short to hold a start code and a NAL header.
    #[error("invalid access unit ({len} bytes)")]
    InvalidAccessUnit { len: usize },

    /// UDP send of an RTP or RTCP packet failed.
    #[error("UDP send to {addr} failed: {source}")]
    SendFailure {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse an RTSP response message.
    #[error("RTSP parse error: {kind}")]
    Parse { kind: ParseErrorKind },

    /// The packet ring was reset or closed while the producer was waiting.
    #[error("packet ring closed")]
    RingClosed,

    /// No RTP destination has been negotiated yet.
    #[error("no destination configured")]
    NoDestination,

    /// `connect` was called while a session is already connecting or streaming.
    #[error("session already active")]
    AlreadyActive,

    /// SPS/PPS are required before the session can be announced.
    #[error("parameter sets (SPS/PPS) not available")]
    MissingParameterSets,
}

/// Specific kind of RTSP parse failure.
#[derive(Debug)]
pub enum ParseErrorKind {
    /// Input was empty (no status line).
    EmptyResponse,
    /// Status line did not have the expected `RTSP/<ver> <code> <reason>` format.
    InvalidStatusLine,
    /// A header line did not contain a colon separator.
    InvalidHeader,
    /// A `Transport` header carried a malformed port pair.
    InvalidTransport,
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyResponse => write!(f, "empty response"),
            Self::InvalidStatusLine => write!(f, "invalid status line"),
            Self::InvalidHeader => write!(f, "invalid header"),
            Self::InvalidTransport => write!(f, "invalid transport"),
        }
    }
}

/// Convenience alias for `Result<T, RtspError>`.
pub type Result<T> = std::result::Result<T, RtspError>;
