//! RTSP publishing URL: `rtsp[s]://host[:port]/app/stream`.

use std::fmt;

use crate::error::{Result, RtspError};

/// Port used when the URL names none (the Wowza/RTMP-style ingest default).
pub const DEFAULT_PORT: u16 = 1935;

/// A parsed publishing URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtspUrl {
    pub host: String,
    pub port: u16,
    /// Application name, the first path segment.
    pub app: String,
    /// Stream name, everything after the application segment.
    pub stream: String,
    /// `rtsps` scheme. Accepted, but the connection is plain TCP.
    pub secure: bool,
}

impl RtspUrl {
    pub fn parse(url: &str) -> Result<Self> {
        let invalid = || RtspError::InvalidUrl(url.to_string());

        let url = url.trim();
        let (secure, rest) = if let Some(rest) = strip_prefix_ignore_case(url, "rtsp://") {
            (false, rest)
        } else if let Some(rest) = strip_prefix_ignore_case(url, "rtsps://") {
            (true, rest)
        } else {
            return Err(invalid());
        };

        let (authority, path) = rest.split_once('/').ok_or_else(invalid)?;
        let (host, port) = match authority.split_once(':') {
            Some((host, port)) => (host, port.parse::<u16>().map_err(|_| invalid())?),
            None => (authority, DEFAULT_PORT),
        };
        if host.is_empty() {
            return Err(invalid());
        }

        let (app, stream) = match path.split_once('/') {
            Some((app, stream)) => (app, stream),
            None => (path, ""),
        };
        if app.is_empty() {
            return Err(invalid());
        }

        Ok(Self {
            host: host.to_string(),
            port,
            app: app.to_string(),
            stream: stream.to_string(),
            secure,
        })
    }

    /// `/app/stream`, as used in request URIs.
    pub fn path(&self) -> String {
        format!("/{}/{}", self.app, self.stream)
    }

    /// Request URI of the whole presentation: `rtsp://host:port/app/stream`.
    pub fn base_uri(&self) -> String {
        format!("rtsp://{}:{}{}", self.host, self.port, self.path())
    }

    /// Request URI of one track: `<base>/trackID=<n>`.
    pub fn track_uri(&self, track_id: u16) -> String {
        format!("{}/trackID={}", self.base_uri(), track_id)
    }
}

impl fmt::Display for RtspUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_uri())
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    if s.len() >= prefix.len()
        && s.is_char_boundary(prefix.len())
        && s[..prefix.len()].eq_ignore_ascii_case(prefix)
    {
        Some(&s[prefix.len()..])
    } else {
        None
    }
}
