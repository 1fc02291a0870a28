//! RTSP publishing session (RFC 2326 §10, ANNOUNCE/RECORD flow).
//!
//! One [`RtspSession`] drives the request sequence that turns a TCP
//! connection into an accepted ingest stream, then hands out the
//! [`SharedPacketizer`] that feeds media to the negotiated UDP ports.
//!
//! ## Session lifecycle
//!
//! ```text
//! Idle
//!  └─ connect ─▶ Connecting (TCP)
//!                 └─▶ Negotiating: OPTIONS ─▶ ANNOUNCE ─▶ [Authenticating]
//!                                  ─▶ SETUP ─▶ RECORD
//!                                                └─▶ Streaming
//!                                                      └─ disconnect ─▶ Disconnecting ─▶ Idle
//! any failure ─▶ Idle (connection dropped, CSeq and session id cleared)
//! ```
//!
//! Authentication is attempted at most once: a 401 to ANNOUNCE is answered
//! with Digest (realm and nonce offered) or Basic credentials, and a second
//! 401 ends the attempt with [`RtspError::AuthFailed`].

pub mod transport;

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use parking_lot::Mutex;

use crate::config::PublisherConfig;
use crate::error::{Result, RtspError};
use crate::media::ParameterSets;
use crate::media::h264::{H264Packetizer, SharedPacketizer};
use crate::protocol::sdp::{AnnounceSdp, client_rtp_port};
use crate::protocol::{AuthState, Method, RtspRequest, RtspResponse};
use crate::transport::{PacketRing, RtspConnection, UdpTransport};
use crate::url::RtspUrl;
pub use transport::ServerPorts;

/// Position inside the negotiation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationStep {
    Options,
    Announce,
    /// Re-sending ANNOUNCE with credentials after a 401.
    Authenticating,
    Setup,
    Record,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Negotiating(NegotiationStep),
    Streaming,
    Disconnecting,
}

/// Client side of one RTSP publishing session.
///
/// Not internally synchronized: callers must not start a second
/// [`connect`](Self::connect) before the first one or a
/// [`disconnect`](Self::disconnect) has returned.
pub struct RtspSession {
    url: RtspUrl,
    config: PublisherConfig,
    state: SessionState,
    connection: Option<RtspConnection>,
    cseq: u32,
    session_id: Option<String>,
    auth: AuthState,
    server_ports: Option<ServerPorts>,
    parameter_sets: Option<ParameterSets>,
    packetizer: Option<SharedPacketizer>,
}

impl RtspSession {
    /// Validate the configured URL. No network activity happens here.
    pub fn new(config: PublisherConfig) -> Result<Self> {
        let url = RtspUrl::parse(&config.url)?;
        if url.secure {
            tracing::warn!(url = %url, "rtsps requested, signaling will use plain TCP");
        }
        Ok(Self {
            url,
            config,
            state: SessionState::Idle,
            connection: None,
            cseq: 0,
            session_id: None,
            auth: AuthState::None,
            server_ports: None,
            parameter_sets: None,
            packetizer: None,
        })
    }

    pub fn url(&self) -> &RtspUrl {
        &self.url
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_streaming(&self) -> bool {
        self.state == SessionState::Streaming
    }

    /// CSeq of the last request sent.
    pub fn cseq(&self) -> u32 {
        self.cseq
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn server_ports(&self) -> Option<ServerPorts> {
        self.server_ports
    }

    /// SPS/PPS announced for the current session.
    pub fn parameter_sets(&self) -> Option<&ParameterSets> {
        self.parameter_sets.as_ref()
    }

    pub fn packetizer(&self) -> Option<&SharedPacketizer> {
        self.packetizer.as_ref()
    }

    /// Negotiate a publishing session and return the packetizer feeding it.
    ///
    /// Blocks for the whole OPTIONS → RECORD exchange. On any failure the
    /// session is back in [`SessionState::Idle`] with nothing left open.
    pub fn connect(&mut self, parameter_sets: &ParameterSets) -> Result<SharedPacketizer> {
        if self.state != SessionState::Idle {
            return Err(RtspError::AlreadyActive);
        }
        if parameter_sets.sps.is_empty() || parameter_sets.pps.is_empty() {
            return Err(RtspError::MissingParameterSets);
        }
        self.parameter_sets = Some(parameter_sets.clone());

        match self.negotiate(parameter_sets) {
            Ok(packetizer) => {
                self.set_state(SessionState::Streaming);
                tracing::info!(
                    url = %self.url,
                    session = self.session_id.as_deref().unwrap_or("-"),
                    "streaming"
                );
                Ok(packetizer)
            }
            Err(e) => {
                tracing::error!(url = %self.url, state = ?self.state, error = %e, "RTSP negotiation failed");
                self.teardown_local();
                Err(e)
            }
        }
    }

    /// Stop streaming and end the session on the server.
    ///
    /// TEARDOWN is best-effort: a failure is logged and local state is
    /// reset anyway.
    pub fn disconnect(&mut self) {
        if self.state == SessionState::Idle {
            return;
        }
        self.set_state(SessionState::Disconnecting);

        if let Some(packetizer) = &self.packetizer {
            packetizer.lock().close();
        }

        if self.connection.is_some() {
            let uri = self.url.base_uri();
            let request = self.build_request(Method::Teardown, &uri);
            if let Some(connection) = self.connection.as_mut()
                && let Err(e) = connection.send(&request)
            {
                tracing::warn!(error = %e, "TEARDOWN failed");
            }
        }

        self.teardown_local();
        tracing::info!(url = %self.url, "session closed");
    }

    fn negotiate(&mut self, parameter_sets: &ParameterSets) -> Result<SharedPacketizer> {
        self.set_state(SessionState::Connecting);
        self.connection = Some(RtspConnection::connect(
            &self.url.host,
            self.url.port,
            self.config.connect_timeout,
            self.config.read_timeout,
        )?);

        let base_uri = self.url.base_uri();

        self.set_state(SessionState::Negotiating(NegotiationStep::Options));
        let response = self.request(Method::Options, &base_uri, |r| r)?;
        tracing::debug!(
            status = response.status_code,
            public = response.get_header("Public"),
            "OPTIONS answered"
        );

        self.set_state(SessionState::Negotiating(NegotiationStep::Announce));
        self.announce(&base_uri, parameter_sets)?;

        self.set_state(SessionState::Negotiating(NegotiationStep::Setup));
        let ports = self.setup()?;

        let ring = PacketRing::new(
            self.config.ring_config(),
            Arc::new(UdpTransport::bind_with_ttl(self.config.ttl)?),
        );
        ring.set_destination(&self.url.host, ports.rtp, ports.rtcp)?;
        let mut packetizer = H264Packetizer::new(ring, self.config.clock_rate);
        packetizer.set_parameter_sets(parameter_sets);
        let packetizer = Arc::new(Mutex::new(packetizer));
        self.packetizer = Some(Arc::clone(&packetizer));

        self.set_state(SessionState::Negotiating(NegotiationStep::Record));
        let response = self.request(Method::Record, &base_uri, |r| {
            r.add_header("Range", "npt=0.000-")
        })?;
        self.expect_success(Method::Record, &response)?;

        Ok(packetizer)
    }

    fn announce(&mut self, uri: &str, parameter_sets: &ParameterSets) -> Result<()> {
        let body = self.sdp(parameter_sets);
        let response = self.request(Method::Announce, uri, |r| {
            r.with_body("application/sdp", body.clone())
        })?;

        match response.status_code {
            403 => return Err(RtspError::AccessDenied),
            401 => {}
            _ => return self.expect_success(Method::Announce, &response),
        }

        if self.config.credentials.is_none() {
            return Err(RtspError::AuthRequired);
        }
        self.auth = AuthState::from_challenge(&response);
        let scheme = match self.auth {
            AuthState::Digest(_) => "digest",
            _ => "basic",
        };
        tracing::info!(scheme, "server requested authentication");

        self.set_state(SessionState::Negotiating(NegotiationStep::Authenticating));
        let response = self.request(Method::Announce, uri, |r| {
            r.with_body("application/sdp", body)
        })?;
        self.expect_success(Method::Announce, &response)
    }

    fn setup(&mut self) -> Result<ServerPorts> {
        let track_id = self.config.track_id;
        let client_rtp = client_rtp_port(track_id);
        let client_rtcp = client_rtp.saturating_add(1);
        let uri = self.url.track_uri(track_id);

        let response = self.request(Method::Setup, &uri, |r| {
            r.add_header(
                "Transport",
                format!(
                    "RTP/AVP/UDP;unicast;client_port={}-{};mode=record",
                    client_rtp, client_rtcp
                ),
            )
        })?;
        self.expect_success(Method::Setup, &response)?;

        let advertised = match response.get_header("Transport") {
            Some(transport) => ServerPorts::parse(transport)?,
            None => None,
        };
        let ports = advertised.unwrap_or_else(|| {
            tracing::warn!(
                client_rtp,
                client_rtcp,
                "SETUP response without server_port, using client ports"
            );
            ServerPorts {
                rtp: client_rtp,
                rtcp: client_rtcp,
            }
        });
        tracing::debug!(
            session = self.session_id.as_deref(),
            server_rtp = ports.rtp,
            server_rtcp = ports.rtcp,
            "SETUP accepted"
        );
        self.server_ports = Some(ports);
        Ok(ports)
    }

    fn sdp(&self, parameter_sets: &ParameterSets) -> String {
        let session_id = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        AnnounceSdp {
            username: &self.config.sdp_username,
            session_name: &self.config.sdp_session_name,
            session_id,
            host: &self.url.host,
            payload_type: self.config.payload_type,
            clock_rate: self.config.clock_rate,
            track_id: self.config.track_id,
        }
        .render(parameter_sets)
    }

    /// Next request with CSeq plus, once known, Session and Authorization.
    fn build_request(&mut self, method: Method, uri: &str) -> RtspRequest {
        self.cseq += 1;
        let mut request = RtspRequest::new(method, uri).add_header("CSeq", self.cseq);
        if let Some(id) = &self.session_id {
            request = request.add_header("Session", id);
        }
        if let Some(authorization) =
            self.auth
                .authorization(self.config.credentials.as_ref(), method, uri)
        {
            request = request.add_header("Authorization", authorization);
        }
        request
    }

    fn request(
        &mut self,
        method: Method,
        uri: &str,
        build: impl FnOnce(RtspRequest) -> RtspRequest,
    ) -> Result<RtspResponse> {
        let request = build(self.build_request(method, uri));
        let connection = self.connection.as_mut().ok_or_else(|| {
            RtspError::Io(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "no RTSP connection",
            ))
        })?;
        connection.send(&request)?;
        let response = connection.read_response()?;

        if let Some(id) = response.session_id() {
            if self.session_id.as_deref() != Some(id) {
                tracing::debug!(session = id, "session id assigned");
            }
            self.session_id = Some(id.to_string());
        }
        Ok(response)
    }

    fn expect_success(&self, method: Method, response: &RtspResponse) -> Result<()> {
        if response.is_success() {
            return Ok(());
        }
        Err(match response.status_code {
            403 => RtspError::AccessDenied,
            401 if self.config.credentials.is_none() => RtspError::AuthRequired,
            401 => RtspError::AuthFailed,
            code => RtspError::UnexpectedStatus {
                method,
                code,
                reason: response.reason.clone(),
            },
        })
    }

    /// Drop the connection and ring and forget the negotiated session.
    ///
    /// The auth state survives so the next ANNOUNCE can present the cached
    /// credentials up front. A fresh 401 replaces it.
    fn teardown_local(&mut self) {
        if let Some(packetizer) = self.packetizer.take() {
            packetizer.lock().close();
        }
        self.connection = None;
        self.cseq = 0;
        self.session_id = None;
        self.server_ports = None;
        self.parameter_sets = None;
        self.set_state(SessionState::Idle);
    }

    fn set_state(&mut self, state: SessionState) {
        if self.state != state {
            tracing::debug!(from = ?self.state, to = ?state, "session state");
            self.state = state;
        }
    }
}
