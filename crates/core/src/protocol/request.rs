use std::fmt;

/// RTSP methods used by a publishing client (RFC 2326 §10).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Options,
    Announce,
    Setup,
    Record,
    Teardown,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Options => "OPTIONS",
            Self::Announce => "ANNOUNCE",
            Self::Setup => "SETUP",
            Self::Record => "RECORD",
            Self::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An outgoing RTSP request (RFC 2326 §6).
///
/// Serializes to the standard text format:
///
/// ```text
/// ANNOUNCE rtsp://server:1935/live/cam RTSP/1.0\r\n
/// CSeq: 2\r\n
/// Content-Type: application/sdp\r\n
/// Content-Length: 312\r\n
/// \r\n
/// v=0\r\n...
/// ```
///
/// Chain [`add_header`](Self::add_header) and [`with_body`](Self::with_body),
/// then call [`serialize`](Self::serialize). `Content-Length` is computed
/// automatically when a body is present.
#[must_use]
#[derive(Debug, Clone)]
pub struct RtspRequest {
    pub method: Method,
    pub uri: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl RtspRequest {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        RtspRequest {
            method,
            uri: uri.into(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn add_header(mut self, name: &str, value: impl fmt::Display) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, content_type: &str, body: String) -> Self {
        self.headers
            .push(("Content-Type".to_string(), content_type.to_string()));
        self.body = Some(body);
        self
    }

    /// Look up a header value by name (case-insensitive).
    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Serialize to the RTSP text wire format.
    pub fn serialize(&self) -> String {
        let mut request = format!("{} {} RTSP/1.0\r\n", self.method, self.uri);

        for (name, value) in &self.headers {
            request.push_str(&format!("{}: {}\r\n", name, value));
        }

        if let Some(body) = &self.body {
            request.push_str(&format!("Content-Length: {}\r\n", body.len()));
            request.push_str("\r\n");
            request.push_str(body);
        } else {
            request.push_str("\r\n");
        }
        request
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_no_body() {
        let req = RtspRequest::new(Method::Options, "rtsp://host:1935/live/cam")
            .add_header("CSeq", 1);
        let s = req.serialize();
        assert_eq!(s, "OPTIONS rtsp://host:1935/live/cam RTSP/1.0\r\nCSeq: 1\r\n\r\n");
    }

    #[test]
    fn serialize_with_body() {
        let req = RtspRequest::new(Method::Announce, "rtsp://host:1935/live/cam")
            .add_header("CSeq", 2)
            .with_body("application/sdp", "v=0\r\n".to_string());
        let s = req.serialize();
        assert!(s.starts_with("ANNOUNCE rtsp://host:1935/live/cam RTSP/1.0\r\n"));
        assert!(s.contains("Content-Type: application/sdp\r\n"));
        assert!(s.contains("Content-Length: 5\r\n\r\nv=0\r\n"));
        assert!(s.ends_with("v=0\r\n"));
    }

    #[test]
    fn header_lookup_case_insensitive() {
        let req = RtspRequest::new(Method::Setup, "rtsp://h/a/b").add_header("CSeq", 42);
        assert_eq!(req.get_header("cseq"), Some("42"));
        assert_eq!(req.get_header("CSEQ"), Some("42"));
        assert_eq!(req.get_header("Session"), None);
    }

    #[test]
    fn method_names() {
        assert_eq!(Method::Teardown.to_string(), "TEARDOWN");
        assert_eq!(Method::Record.as_str(), "RECORD");
    }
}
