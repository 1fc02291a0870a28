//! TCP signaling channel: one RTSP connection per session.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use crate::error::{Result, RtspError};
use crate::protocol::{RtspRequest, RtspResponse};

/// Blocking TCP connection carrying one RTSP session's signaling.
///
/// Requests and responses strictly alternate: [`send`](Self::send) then
/// [`read_response`](Self::read_response). Both honor the read timeout set
/// at connect time, so a silent server surfaces as
/// [`RtspError::Connection`] instead of hanging the negotiation thread.
pub struct RtspConnection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    peer_addr: SocketAddr,
}

impl RtspConnection {
    /// Resolve `host:port` and connect to the first address that answers.
    pub fn connect(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        read_timeout: Duration,
    ) -> Result<Self> {
        let target = format!("{}:{}", host, port);
        let failed = |source: std::io::Error| RtspError::Connection {
            addr: target.clone(),
            source,
        };

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(failed)?
            .collect();

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, connect_timeout) {
                Ok(stream) => {
                    stream.set_read_timeout(Some(read_timeout))?;
                    stream.set_write_timeout(Some(read_timeout))?;
                    let _ = stream.set_nodelay(true);
                    let reader = BufReader::new(stream.try_clone()?);
                    tracing::info!(peer = %addr, "RTSP connection established");
                    return Ok(Self {
                        reader,
                        writer: stream,
                        peer_addr: addr,
                    });
                }
                Err(e) => {
                    tracing::debug!(%addr, error = %e, "connect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(failed(last_error.unwrap_or_else(|| {
            std::io::Error::new(std::io::ErrorKind::NotFound, "host did not resolve")
        })))
    }

    pub fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    pub fn send(&mut self, request: &RtspRequest) -> Result<()> {
        tracing::debug!(
            peer = %self.peer_addr,
            method = %request.method,
            uri = %request.uri,
            cseq = request.get_header("CSeq"),
            "request"
        );
        let text = request.serialize();
        tracing::trace!("{}", text);
        self.writer
            .write_all(text.as_bytes())
            .and_then(|_| self.writer.flush())
            .map_err(|source| connection_error(self.peer_addr, source))
    }

    /// Read one response head.
    ///
    /// Lines are collected until a blank line or one shorter than three
    /// characters. A `Content-Length` body, if announced, is read and
    /// discarded so the next response starts on a clean boundary.
    pub fn read_response(&mut self) -> Result<RtspResponse> {
        let mut response_text = String::new();
        loop {
            let mut line = String::new();
            match self.reader.read_line(&mut line) {
                Ok(0) => {
                    return Err(connection_error(
                        self.peer_addr,
                        std::io::Error::new(
                            std::io::ErrorKind::UnexpectedEof,
                            "connection closed by server",
                        ),
                    ));
                }
                Ok(_) => {
                    // Skip keep-alive blank lines before the status line.
                    if response_text.is_empty() && line.trim().is_empty() {
                        continue;
                    }
                    let end = line.trim_end().len() < 3;
                    response_text.push_str(&line);
                    if end {
                        break;
                    }
                }
                Err(e) => return Err(connection_error(self.peer_addr, e)),
            }
        }

        let response = RtspResponse::parse(&response_text)?;
        tracing::debug!(
            peer = %self.peer_addr,
            status = response.status_code,
            reason = %response.reason,
            cseq = response.cseq(),
            "response"
        );

        let body_len = response
            .get_header("Content-Length")
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        if body_len > 0 {
            let peer_addr = self.peer_addr;
            let mut body = Vec::new();
            (&mut self.reader)
                .take(body_len)
                .read_to_end(&mut body)
                .map_err(|source| connection_error(peer_addr, source))?;
            tracing::trace!(len = body.len(), "response body skipped");
        }

        Ok(response)
    }
}

fn connection_error(peer_addr: SocketAddr, source: std::io::Error) -> RtspError {
    RtspError::Connection {
        addr: peer_addr.to_string(),
        source,
    }
}
