//! Integration tests: full publishing handshake against a scripted server.
//!
//! Each test starts a one-connection RTSP server on an ephemeral port whose
//! replies come from a closure, then drives the client through
//! OPTIONS → ANNOUNCE → SETUP → RECORD and checks both sides.

use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, UdpSocket};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use rtsp_push::{
    AccessUnit, ParameterSets, Publisher, PublisherConfig, RtspError, RtspSession, SessionEvent,
    SessionState,
};

const SPS: [u8; 4] = [0x67, 0x42, 0x00, 0x1e];
const PPS: [u8; 2] = [0x68, 0xce];

/// One request as the server saw it.
#[derive(Debug, Clone)]
struct Seen {
    method: String,
    uri: String,
    headers: Vec<(String, String)>,
    body: String,
}

impl Seen {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

fn read_request(reader: &mut impl BufRead) -> Option<Seen> {
    let mut head = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).ok()? == 0 {
            return None;
        }
        if line == "\r\n" || line == "\n" {
            break;
        }
        head.push(line.trim_end().to_string());
    }

    let mut parts = head.first()?.split_whitespace();
    let method = parts.next()?.to_string();
    let uri = parts.next()?.to_string();
    let headers: Vec<(String, String)> = head[1..]
        .iter()
        .filter_map(|l| l.split_once(':'))
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .collect();

    let len = headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case("Content-Length"))
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).ok()?;

    Some(Seen {
        method,
        uri,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

/// Serve one connection; `reply(request, index)` returns the status line
/// plus extra headers (without CSeq or the final blank line).
fn scripted_server<F>(reply: F) -> (u16, JoinHandle<Vec<Seen>>)
where
    F: Fn(&Seen, usize) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || serve(&listener, &reply));
    (port, handle)
}

/// Like [`scripted_server`], but accepts `connections` clients in turn and
/// returns what each one sent.
fn scripted_server_for<F>(connections: usize, reply: F) -> (u16, JoinHandle<Vec<Vec<Seen>>>)
where
    F: Fn(&Seen, usize) -> String + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let handle = thread::spawn(move || {
        (0..connections)
            .map(|_| serve(&listener, &reply))
            .collect()
    });
    (port, handle)
}

fn serve<F>(listener: &TcpListener, reply: &F) -> Vec<Seen>
where
    F: Fn(&Seen, usize) -> String,
{
    let (stream, _) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    let mut reader = BufReader::new(stream.try_clone().unwrap());
    let mut writer = stream;
    let mut seen = Vec::new();
    while let Some(request) = read_request(&mut reader) {
        let cseq = request.header("CSeq").unwrap_or("0").to_string();
        let mut response = reply(&request, seen.len());
        response.insert_str(
            response.find("\r\n").map(|i| i + 2).unwrap_or(response.len()),
            &format!("CSeq: {}\r\n", cseq),
        );
        response.push_str("\r\n");
        seen.push(request);
        if writer.write_all(response.as_bytes()).is_err() {
            break;
        }
    }
    seen
}

fn ok() -> String {
    "RTSP/1.0 200 OK\r\n".to_string()
}

fn setup_ok(rtp: u16, rtcp: u16) -> String {
    format!(
        "RTSP/1.0 200 OK\r\nSession: 12345678;timeout=60\r\n\
         Transport: RTP/AVP/UDP;unicast;client_port=5002-5003;server_port={}-{}\r\n",
        rtp, rtcp
    )
}

fn config(port: u16) -> PublisherConfig {
    let mut config = PublisherConfig::new(format!("rtsp://127.0.0.1:{}/live/cam", port));
    config.connect_timeout = Duration::from_secs(2);
    config.read_timeout = Duration::from_secs(2);
    config
}

fn parameter_sets() -> ParameterSets {
    ParameterSets::new(&SPS, &PPS)
}

fn udp_receiver() -> UdpSocket {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(2)))
        .unwrap();
    socket
}

fn recv(socket: &UdpSocket) -> Vec<u8> {
    let mut buf = [0u8; 2048];
    let (n, _) = socket.recv_from(&mut buf).unwrap();
    buf[..n].to_vec()
}

#[test]
fn digest_publish_end_to_end() {
    let rtp = udp_receiver();
    let rtcp = udp_receiver();
    let (rtp_port, rtcp_port) = (
        rtp.local_addr().unwrap().port(),
        rtcp.local_addr().unwrap().port(),
    );

    let (port, server) = scripted_server(move |req, _| match req.method.as_str() {
        "ANNOUNCE" if req.header("Authorization").is_none() => "RTSP/1.0 401 Unauthorized\r\n\
             WWW-Authenticate: Digest realm=\"Streaming Server\", nonce=\"0a4f113b\"\r\n"
            .to_string(),
        "SETUP" => setup_ok(rtp_port, rtcp_port),
        _ => ok(),
    });

    let publisher =
        Publisher::new(config(port).with_credentials("user", "secret")).unwrap();
    let events = publisher.events().unwrap();
    publisher.on_parameter_sets(parameter_sets());

    let event = events.recv_timeout(Duration::from_secs(5)).unwrap();
    assert!(matches!(event, SessionEvent::Connected), "{:?}", event);
    assert!(publisher.is_streaming());

    // IDR: STAP-A with SPS/PPS first, then the slice itself.
    publisher.on_access_unit(&AccessUnit::from_nal(&[0x65, 0x88, 0x84, 0x21], 1_000_000));

    let stap = recv(&rtp);
    assert_eq!(stap[0] >> 6, 2, "RTP version");
    assert_eq!(stap[1] & 0x7f, 96);
    assert_eq!(&stap[12..], &[24, 0, 4, 0x67, 0x42, 0x00, 0x1e, 0, 2, 0x68, 0xce]);

    let idr = recv(&rtp);
    assert_eq!(&idr[12..], &[0x65, 0x88, 0x84, 0x21]);
    assert_ne!(idr[1] & 0x80, 0, "marker on the last packet of the unit");
    assert_eq!(u32::from_be_bytes([idr[4], idr[5], idr[6], idr[7]]), 90_000);
    assert_eq!(
        u16::from_be_bytes([idr[2], idr[3]]),
        u16::from_be_bytes([stap[2], stap[3]]).wrapping_add(1)
    );
    assert_eq!(&idr[8..12], &stap[8..12], "same SSRC");

    publisher.stop();
    let event = events.recv_timeout(Duration::from_secs(2)).unwrap();
    assert!(matches!(event, SessionEvent::Disconnected));
    assert!(!publisher.is_streaming());

    let seen = server.join().unwrap();
    let methods: Vec<&str> = seen.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(
        methods,
        ["OPTIONS", "ANNOUNCE", "ANNOUNCE", "SETUP", "RECORD", "TEARDOWN"]
    );
    for (i, req) in seen.iter().enumerate() {
        assert_eq!(req.header("CSeq"), Some((i + 1).to_string().as_str()));
    }

    let base = format!("rtsp://127.0.0.1:{}/live/cam", port);
    assert_eq!(seen[0].uri, base);

    // ANNOUNCE carries the SDP with base64 parameter sets.
    let announce = &seen[1];
    assert_eq!(announce.header("Content-Type"), Some("application/sdp"));
    assert!(announce.body.contains("m=video 5002 RTP/AVP 96\r\n"));
    assert!(announce.body.contains("sprop-parameter-sets=Z0IAHg==,aM4="));
    assert!(announce.body.contains("profile-level-id=42001e"));

    // Authenticated retry with an RFC 2617 digest over ANNOUNCE.
    let ha1 = format!("{:x}", md5::compute("user:Streaming Server:secret"));
    let ha2 = format!("{:x}", md5::compute(format!("ANNOUNCE:{}", base)));
    let expected = format!("{:x}", md5::compute(format!("{}:0a4f113b:{}", ha1, ha2)));
    let auth = seen[2].header("Authorization").unwrap();
    assert!(auth.starts_with("Digest username=\"user\",realm=\"Streaming Server\""));
    assert!(auth.contains(&format!("uri=\"{}\"", base)));
    assert!(auth.contains(&format!("response=\"{}\"", expected)));
    assert_eq!(seen[2].body, announce.body);

    let setup = &seen[3];
    assert_eq!(setup.uri, format!("{}/trackID=1", base));
    assert_eq!(
        setup.header("Transport"),
        Some("RTP/AVP/UDP;unicast;client_port=5002-5003;mode=record")
    );
    assert!(setup.header("Authorization").unwrap().starts_with("Digest "));
    assert!(setup.header("Session").is_none());

    assert_eq!(seen[4].header("Range"), Some("npt=0.000-"));
    assert_eq!(seen[4].header("Session"), Some("12345678"));
    assert_eq!(seen[5].header("Session"), Some("12345678"));
}

#[test]
fn sender_report_reaches_rtcp_port() {
    let rtp = udp_receiver();
    let rtcp = udp_receiver();
    let (rtp_port, rtcp_port) = (
        rtp.local_addr().unwrap().port(),
        rtcp.local_addr().unwrap().port(),
    );
    let (port, server) = scripted_server(move |req, _| match req.method.as_str() {
        "SETUP" => setup_ok(rtp_port, rtcp_port),
        _ => ok(),
    });

    let mut config = config(port);
    config.report_interval = Duration::from_millis(50);
    let mut session = RtspSession::new(config).unwrap();
    let packetizer = session.connect(&parameter_sets()).unwrap();

    packetizer
        .lock()
        .submit(&AccessUnit::from_nal(&[0x41, 1, 2, 3], 0))
        .unwrap();
    recv(&rtp);
    thread::sleep(Duration::from_millis(100));
    packetizer
        .lock()
        .submit(&AccessUnit::from_nal(&[0x41, 4, 5, 6], 33_333))
        .unwrap();

    let sr = recv(&rtcp);
    assert_eq!(sr.len(), 28);
    assert_eq!(sr[0], 0x80);
    assert_eq!(sr[1], 200);
    assert_eq!(u16::from_be_bytes([sr[2], sr[3]]), 6);
    assert_eq!(u32::from_be_bytes([sr[20], sr[21], sr[22], sr[23]]), 2, "packet count");

    session.disconnect();
    server.join().unwrap();
}

#[test]
fn access_denied() {
    let (port, server) = scripted_server(|req, _| match req.method.as_str() {
        "ANNOUNCE" => "RTSP/1.0 403 Forbidden\r\n".to_string(),
        _ => ok(),
    });
    let mut session = RtspSession::new(config(port).with_credentials("u", "p")).unwrap();

    let err = session.connect(&parameter_sets()).unwrap_err();
    assert!(matches!(err, RtspError::AccessDenied));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(session.cseq(), 0);

    let seen = server.join().unwrap();
    assert_eq!(seen.len(), 2, "no retry after 403");
}

#[test]
fn second_401_fails_without_further_retry() {
    let (port, server) = scripted_server(|req, _| match req.method.as_str() {
        "ANNOUNCE" => "RTSP/1.0 401 Unauthorized\r\n\
                       WWW-Authenticate: Digest realm=\"r\", nonce=\"n\"\r\n"
            .to_string(),
        _ => ok(),
    });
    let mut session = RtspSession::new(config(port).with_credentials("u", "wrong")).unwrap();

    let err = session.connect(&parameter_sets()).unwrap_err();
    assert!(matches!(err, RtspError::AuthFailed));
    assert_eq!(session.state(), SessionState::Idle);

    let seen = server.join().unwrap();
    let methods: Vec<&str> = seen.iter().map(|r| r.method.as_str()).collect();
    assert_eq!(methods, ["OPTIONS", "ANNOUNCE", "ANNOUNCE"]);
}

#[test]
fn challenge_without_credentials() {
    let (port, server) = scripted_server(|req, _| match req.method.as_str() {
        "ANNOUNCE" => "RTSP/1.0 401 Unauthorized\r\n\
                       WWW-Authenticate: Basic realm=\"r\"\r\n"
            .to_string(),
        _ => ok(),
    });
    let mut session = RtspSession::new(config(port)).unwrap();

    let err = session.connect(&parameter_sets()).unwrap_err();
    assert!(matches!(err, RtspError::AuthRequired));
    assert_eq!(server.join().unwrap().len(), 2);
}

#[test]
fn basic_auth_fallback_and_default_ports() {
    let (port, server) = scripted_server(|req, _| match req.method.as_str() {
        "ANNOUNCE" if req.header("Authorization").is_none() => {
            "RTSP/1.0 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"wowza\"\r\n".to_string()
        }
        // No server_port: the client pair is used as destination.
        "SETUP" => "RTSP/1.0 200 OK\r\nSession: 77;timeout=30\r\n\
                    Transport: RTP/AVP/UDP;unicast;client_port=5002-5003\r\n"
            .to_string(),
        _ => ok(),
    });
    let mut session = RtspSession::new(config(port).with_credentials("u", "p")).unwrap();

    session.connect(&parameter_sets()).unwrap();
    assert_eq!(session.state(), SessionState::Streaming);
    assert_eq!(session.session_id(), Some("77"));
    let ports = session.server_ports().unwrap();
    assert_eq!((ports.rtp, ports.rtcp), (5002, 5003));

    session.disconnect();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.session_id().is_none());

    let seen = server.join().unwrap();
    assert_eq!(seen[2].header("Authorization"), Some("Basic dTpw"));
    assert_eq!(seen[3].header("Authorization"), Some("Basic dTpw"));
    assert_eq!(seen.last().unwrap().method, "TEARDOWN");
}

#[test]
fn setup_rejection_is_unexpected_status() {
    let (port, server) = scripted_server(|req, _| match req.method.as_str() {
        "SETUP" => "RTSP/1.0 461 Unsupported Transport\r\n".to_string(),
        _ => ok(),
    });
    let mut session = RtspSession::new(config(port)).unwrap();

    match session.connect(&parameter_sets()) {
        Err(RtspError::UnexpectedStatus { method, code, reason }) => {
            assert_eq!(method.as_str(), "SETUP");
            assert_eq!(code, 461);
            assert_eq!(reason, "Unsupported Transport");
        }
        other => panic!("expected UnexpectedStatus, got {:?}", other.map(|_| ())),
    }
    assert_eq!(session.state(), SessionState::Idle);
    server.join().unwrap();
}

#[test]
fn connect_twice_is_rejected() {
    let (port, server) = scripted_server(|_, _| ok());
    let mut session = RtspSession::new(config(port)).unwrap();
    session.connect(&parameter_sets()).unwrap();
    assert!(matches!(
        session.connect(&parameter_sets()),
        Err(RtspError::AlreadyActive)
    ));
    assert_eq!(session.state(), SessionState::Streaming);
    session.disconnect();
    server.join().unwrap();
}

#[test]
fn reconnect_presents_cached_credentials() {
    let (port, server) = scripted_server_for(2, |req, _| match req.method.as_str() {
        "ANNOUNCE" if req.header("Authorization").is_none() => {
            "RTSP/1.0 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"r\"\r\n".to_string()
        }
        "SETUP" => setup_ok(6970, 6971),
        _ => ok(),
    });
    let mut session = RtspSession::new(config(port).with_credentials("u", "p")).unwrap();

    session.connect(&parameter_sets()).unwrap();
    session.disconnect();
    session.connect(&parameter_sets()).unwrap();
    assert!(session.is_streaming());
    session.disconnect();

    let rounds = server.join().unwrap();
    let trace = |round: &[Seen]| -> Vec<(String, Option<String>)> {
        round
            .iter()
            .map(|r| (r.method.clone(), r.header("Authorization").map(str::to_string)))
            .collect()
    };
    let first = trace(&rounds[0]);
    assert_eq!(first[1], ("ANNOUNCE".to_string(), None));
    assert_eq!(first[2], ("ANNOUNCE".to_string(), Some("Basic dTpw".to_string())));

    let second = trace(&rounds[1]);
    let methods: Vec<&str> = second.iter().map(|(m, _)| m.as_str()).collect();
    assert_eq!(methods, ["OPTIONS", "ANNOUNCE", "SETUP", "RECORD", "TEARDOWN"]);
    assert_eq!(second[1].1.as_deref(), Some("Basic dTpw"));
    assert_eq!(rounds[1][0].header("CSeq"), Some("1"));
}
