//! Protocol-level integration tests: a real `ConnectionSet` bound to a
//! loopback port, driven by its `mio` poll loop on a background thread,
//! exercised by a genuine TLS client connection. Mirrors the handshake
//! and framing coverage already unit-tested inline, but end to end
//! through the actual socket/TLS/HTTP/WebSocket stack.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener as StdListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, ClientConnection, DigitallySignedStruct, Error as RustlsError, SignatureScheme};

use hremote::capture::{Codec, PlanarEncoder, SyntheticFrameSource};
use hremote::connection_set::ConnectionSet;
use hremote::input::{InMemoryClipboard, LoopbackInputSink};
use hremote::protocol::input_event::InputEvent;
use hremote::protocol::ws;
use hremote::supervisor::Supervisor;
use hremote::tls;

#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, RustlsError> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, RustlsError> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::ED25519,
        ]
    }
}

fn client_config() -> Arc<ClientConfig> {
    Arc::new(
        ClientConfig::builder()
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth(),
    )
}

/// Binds a `ConnectionSet` on an ephemeral loopback port and spawns a
/// background thread driving its readiness loop, stopped via the
/// returned flag when the test is done.
fn spawn_server(web_root: std::path::PathBuf) -> (SocketAddr, Arc<Mutex<ConnectionSet>>, Arc<AtomicBool>) {
    let dir = tempfile::tempdir().unwrap();
    let cert_path = dir.path().join("server.crt");
    let key_path = dir.path().join("server.key");
    tls::load_or_generate(&cert_path, &key_path).unwrap();
    let config = tls::server_config(&cert_path, &key_path).unwrap();

    let probe = StdListener::bind("127.0.0.1:0").unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let connection_set = Arc::new(Mutex::new(
        ConnectionSet::bind(addr, config, web_root).unwrap(),
    ));
    let stop = Arc::new(AtomicBool::new(false));

    let cs = connection_set.clone();
    let stop_clone = stop.clone();
    std::thread::spawn(move || {
        let mut supervisor = Supervisor::new(64, 64, 30, 2000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut source = SyntheticFrameSource::new(64, 64);
        let mut input_sink = LoopbackInputSink::new();
        let mut clipboard = InMemoryClipboard::default();

        while !stop_clone.load(Ordering::Relaxed) {
            let mut guard = cs.lock().unwrap();
            let Ok((dispatched, edges)) = guard.poll_once() else { continue };
            supervisor.handle_edges(edges, &mut encoder, &mut source, &mut guard);
            for effect in dispatched {
                supervisor.handle_effect(
                    effect,
                    &mut encoder,
                    &mut input_sink,
                    &mut clipboard,
                    &mut guard,
                );
            }
        }
    });

    // Give the listener thread a moment to start driving `poll_once`.
    std::thread::sleep(Duration::from_millis(20));

    (addr, connection_set, stop)
}

fn connect_tls(addr: SocketAddr) -> (ClientConnection, TcpStream) {
    let server_name = ServerName::try_from("localhost").unwrap();
    let conn = ClientConnection::new(client_config(), server_name).unwrap();
    let sock = TcpStream::connect(addr).unwrap();
    sock.set_read_timeout(Some(Duration::from_secs(5))).unwrap();
    (conn, sock)
}

fn mask_client_frame(opcode: u8, payload: &[u8], key: [u8; 4]) -> Vec<u8> {
    let mut frame = Vec::new();
    frame.push(0x80 | opcode);
    let len = payload.len();
    if len < 126 {
        frame.push(0x80 | len as u8);
    } else {
        frame.push(0x80 | 126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    }
    frame.extend_from_slice(&key);
    let mut masked = payload.to_vec();
    for (i, byte) in masked.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
    frame.extend_from_slice(&masked);
    frame
}

/// Bound on how long a test waits for server data before failing instead
/// of spinning on `WouldBlock`/`TimedOut` forever.
const READ_DEADLINE: Duration = Duration::from_secs(5);

/// Reads from `stream` into `out`, calling `done` after each chunk;
/// returns once `done` reports true or the peer closes. Panics rather
/// than retrying forever if no data arrives within [`READ_DEADLINE`].
fn read_until(
    stream: &mut rustls::Stream<'_, ClientConnection, TcpStream>,
    out: &mut Vec<u8>,
    mut done: impl FnMut(&[u8]) -> bool,
) {
    let deadline = Instant::now() + READ_DEADLINE;
    let mut buf = [0u8; 4096];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                out.extend_from_slice(&buf[..n]);
                if done(out) {
                    break;
                }
            }
            Err(e) if matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut) => {
                if Instant::now() >= deadline {
                    panic!("timed out waiting for server data, got so far: {out:?}");
                }
            }
            Err(e) => panic!("read failed: {e}"),
        }
    }
}

/// Reads one unmasked server->client frame from `buf`, returning its
/// opcode and payload. Good enough for this test's own assertions; the
/// crate's `parse_client_frame` only accepts masked frames by design.
fn read_one_server_frame(buf: &[u8]) -> (u8, Vec<u8>) {
    let opcode = buf[0] & 0x0F;
    let len_field = buf[1] & 0x7F;
    let (len, offset) = match len_field {
        126 => (u16::from_be_bytes([buf[2], buf[3]]) as usize, 4),
        127 => {
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(bytes) as usize, 10)
        }
        n => (n as usize, 2),
    };
    (opcode, buf[offset..offset + len].to_vec())
}

#[test]
fn handshake_accept_key_matches_rfc_vector() {
    assert_eq!(
        ws::accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
        "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
    );
}

#[test]
fn client_frames_round_trip_at_boundary_lengths() {
    for &len in &[0usize, 125, 126, 65536] {
        let payload = vec![0x5Au8; len];
        let key = [1, 2, 3, 4];
        let frame = mask_client_frame(0x2, &payload, key);
        match ws::parse_client_frame(&frame).unwrap() {
            ws::ParseOutcome::Consumed { n, frame: Some(ws::ClientFrame::Binary(data)) } => {
                assert_eq!(n, frame.len());
                assert_eq!(data, payload);
            }
            other => panic!("len {len}: unexpected outcome: {other:?}"),
        }
    }
}

#[test]
fn loopback_tls_http_get_serves_static_file() {
    let web_dir = tempfile::tempdir().unwrap();
    std::fs::write(web_dir.path().join("index.html"), b"hello from hremote").unwrap();
    let (addr, _connection_set, stop) = spawn_server(web_dir.path().to_path_buf());

    let (mut conn, mut sock) = connect_tls(addr);
    {
        let mut stream = rustls::Stream::new(&mut conn, &mut sock);
        stream
            .write_all(b"GET /index.html HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .unwrap();

        let mut response = Vec::new();
        read_until(&mut stream, &mut response, |buf| {
            buf.windows(4).any(|w| w == b"\r\n\r\n") && buf.ends_with(b"hello from hremote")
        });

        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 200 OK"), "unexpected response: {text}");
        assert!(text.contains("Content-Type: text/html"));
        assert!(text.ends_with("hello from hremote"));
    }

    stop.store(true, Ordering::Relaxed);
}

#[test]
fn loopback_ws_upgrade_and_ping_pong() {
    let web_dir = tempfile::tempdir().unwrap();
    let (addr, _connection_set, stop) = spawn_server(web_dir.path().to_path_buf());

    let (mut conn, mut sock) = connect_tls(addr);
    {
        let mut stream = rustls::Stream::new(&mut conn, &mut sock);
        let client_key = "dGhlIHNhbXBsZSBub25jZQ==";
        let request = format!(
            "GET /ws HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: Upgrade\r\nSec-WebSocket-Key: {client_key}\r\n\r\n"
        );
        stream.write_all(request.as_bytes()).unwrap();

        let mut response = Vec::new();
        read_until(&mut stream, &mut response, |buf| buf.windows(4).any(|w| w == b"\r\n\r\n"));
        let text = String::from_utf8_lossy(&response);
        assert!(text.starts_with("HTTP/1.1 101 Switching Protocols"), "unexpected response: {text}");
        let expected_accept = ws::accept_key(client_key);
        assert!(text.contains(&expected_accept), "accept key mismatch in: {text}");

        // First frame off the wire post-upgrade is the init text frame.
        let mut inbound = Vec::new();
        read_until(&mut stream, &mut inbound, |buf| !buf.is_empty());
        let (opcode, payload) = read_one_server_frame(&inbound);
        assert_eq!(opcode, 0x1, "expected a text frame for the init message");
        let init_text = String::from_utf8(payload).unwrap();
        assert!(init_text.contains("\"type\":\"init\""));

        // Send a PING InputEvent and expect it echoed back verbatim.
        use prost::Message as _;
        let ping = InputEvent::ping(17);
        let encoded = ping.encode_to_vec();
        let frame = mask_client_frame(0x2, &encoded, [9, 8, 7, 6]);
        stream.write_all(&frame).unwrap();

        let mut echo_buf = Vec::new();
        read_until(&mut stream, &mut echo_buf, |buf| !buf.is_empty());
        let (opcode, payload) = read_one_server_frame(&echo_buf);
        assert_eq!(opcode, 0x2, "expected a binary frame for the ping echo");
        let echoed = InputEvent::decode(payload.as_slice()).unwrap();
        assert_eq!(echoed, ping);
    }

    stop.store(true, Ordering::Relaxed);
}
