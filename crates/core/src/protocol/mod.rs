//! RTSP protocol implementation (RFC 2326), client side.
//!
//! This module builds requests, parses responses, answers authentication
//! challenges, and generates the SDP announced to the server.
//!
//! ## RTSP message format (RFC 2326 §4)
//!
//! RTSP messages follow HTTP/1.1 syntax with a different method set:
//!
//! ```text
//! SETUP rtsp://server:1935/live/cam/trackID=1 RTSP/1.0\r\n
//! CSeq: 3\r\n
//! Transport: RTP/AVP/UDP;unicast;client_port=5002-5003;mode=record\r\n
//! \r\n
//! ```
//!
//! Key differences from HTTP:
//! - Stateful: sessions persist across requests (RFC 2326 §3).
//! - Session header carries a server-assigned ID (RFC 2326 §12.37).
//!
//! ## Methods used for publishing
//!
//! | Method | RFC section | Purpose |
//! |--------|-------------|---------|
//! | OPTIONS | §10.1 | Capability discovery |
//! | ANNOUNCE | §10.3 | Post the SDP of the outgoing stream |
//! | SETUP | §10.4 | Negotiate transport (UDP ports) |
//! | RECORD | §10.11 | Start accepting media |
//! | TEARDOWN | §10.7 | Destroy session |

pub mod auth;
pub mod request;
pub mod response;
pub mod sdp;

pub use auth::{AuthChallenge, AuthState, Credentials};
pub use request::{Method, RtspRequest};
pub use response::RtspResponse;
pub use sdp::AnnounceSdp;
