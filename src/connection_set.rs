//! ConnectionSet (§4.6): owns the listening socket and every client
//! session, drives the `mio` readiness loop on the network thread, and
//! flattens the capture thread's video packets into per-session
//! scatter/gather-free writes (TLS doesn't support true scatter/gather).

use std::collections::HashMap;
use std::io::ErrorKind;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use mio::net::{TcpListener, TcpStream};
use mio::{Events, Interest, Poll, Token};
use prost::Message as _;
use rustls::ServerConfig;

use crate::capture::loop_::BroadcastSink;
use crate::control::{self, ControlEffect};
use crate::error::{Error, ErrorCounters, Result, Severity};
use crate::protocol::http;
use crate::protocol::input_event::InputEvent;
use crate::protocol::ws::{self, ClientFrame, Opcode, ParseOutcome};
use crate::session::{ClientSession, Phase, SessionId};
use crate::tls::TlsTransport;

const LISTENER_TOKEN: Token = Token(0);
const READINESS_TIMEOUT: Duration = Duration::from_millis(10);
const CLIPBOARD_POLL_INTERVAL: Duration = Duration::from_secs(1);
/// A broadcast that cannot fully drain within one frame interval is
/// treated as a stuck session and closed (§5 backpressure policy (b)).
const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);

pub struct ConnectionEdges {
    pub clients_connected: bool,
    pub no_clients: bool,
}

struct Entry {
    socket: TcpStream,
    session: ClientSession,
}

/// What the caller (Supervisor, on the network thread) should do with a
/// parsed control message, paired with the session it arrived on.
pub struct DispatchedEffect {
    pub session_id: SessionId,
    pub effect: ControlEffect,
}

pub struct ConnectionSet {
    listener: TcpListener,
    poll: Poll,
    events: Events,
    tls_config: Arc<ServerConfig>,
    web_root: PathBuf,
    sessions: HashMap<Token, Entry>,
    next_token: usize,
    viewer_count: usize,
    last_clipboard: String,
    next_clipboard_poll: Instant,
    pub init_width: u32,
    pub init_height: u32,
    pub init_codec: String,
    errors: ErrorCounters,
}

impl ConnectionSet {
    pub fn bind(addr: SocketAddr, tls_config: Arc<ServerConfig>, web_root: PathBuf) -> Result<Self> {
        let mut listener = TcpListener::bind(addr).map_err(|e| Error::Bind(addr.to_string(), e))?;
        let poll = Poll::new().map_err(|e| Error::Bind(addr.to_string(), e))?;
        poll.registry()
            .register(&mut listener, LISTENER_TOKEN, Interest::READABLE)
            .map_err(|e| Error::Bind(addr.to_string(), e))?;

        Ok(ConnectionSet {
            listener,
            poll,
            events: Events::with_capacity(256),
            tls_config,
            web_root,
            sessions: HashMap::new(),
            next_token: 1,
            viewer_count: 0,
            last_clipboard: String::new(),
            next_clipboard_poll: Instant::now() + CLIPBOARD_POLL_INTERVAL,
            init_width: 1920,
            init_height: 1080,
            init_codec: "vp8".to_string(),
            errors: ErrorCounters::default(),
        })
    }

    pub fn viewer_count(&self) -> usize {
        self.viewer_count
    }

    /// Counters for errors logged-and-swallowed on this connection set's
    /// sessions (§7); never incremented for `ProcessFatal` failures, since
    /// those unwind out of `main` instead.
    pub fn error_counters(&self) -> &ErrorCounters {
        &self.errors
    }

    fn alloc_token(&mut self) -> Token {
        let token = Token(self.next_token);
        self.next_token += 1;
        token
    }

    fn init_json(&self) -> String {
        init_json_static(self.init_width, self.init_height, &self.init_codec)
    }

    /// Called by the Supervisor after an encoder reconfigure; re-sends
    /// the init text frame to every connected viewer.
    pub fn rebroadcast_init(&mut self) {
        let frame = ws::build_text_frame(&self.init_json());
        for entry in self.sessions.values_mut() {
            if entry.session.is_websocket() {
                entry.session.queue_write(frame.clone());
            }
        }
    }

    fn accept_all(&mut self) {
        loop {
            match self.listener.accept() {
                Ok((mut socket, addr)) => {
                    let token = self.alloc_token();
                    if let Err(e) = self.poll.registry().register(
                        &mut socket,
                        token,
                        Interest::READABLE | Interest::WRITABLE,
                    ) {
                        warn!("failed to register session socket: {e}");
                        continue;
                    }
                    let tls = match TlsTransport::new(self.tls_config.clone()) {
                        Ok(tls) => tls,
                        Err(e) => {
                            warn!("failed to allocate TLS state for {addr}: {e}");
                            continue;
                        }
                    };
                    debug!("accepted connection from {addr}");
                    let session = ClientSession::new(token.0 as SessionId, tls);
                    self.sessions.insert(token, Entry { socket, session });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => break,
                Err(e) => {
                    warn!("accept failed: {e}");
                    break;
                }
            }
        }
    }

    /// Drives one session's phase machine as far as the current readiness
    /// event and buffered bytes allow. Returns the control effects parsed
    /// from any complete WebSocket frames and whether the session should
    /// be dropped.
    fn service_session(&self, entry: &mut Entry) -> (Vec<ControlEffect>, bool) {
        let mut effects = Vec::new();
        let mut drop_session = false;

        if entry.session.tls.wants_read() || entry.session.phase == Phase::TlsHandshake {
            match entry.session.tls.read_tls_from(&mut entry.socket) {
                Ok(0) => {}
                Ok(_) => {}
                Err(e) if e.severity() == Severity::Transient => {
                    self.errors.record(Severity::Transient);
                }
                Err(e) => {
                    warn!("TLS read failed for session {}: {e}", entry.session.id);
                    self.errors.record(e.severity());
                    drop_session = true;
                }
            }
        }

        if drop_session {
            return (effects, true);
        }

        if entry.session.phase == Phase::TlsHandshake {
            if !entry.session.tls.is_handshaking() {
                entry.session.advance_to(Phase::HttpRequest);
            }
        }

        if entry.session.phase == Phase::HttpRequest {
            let _ = entry.session.tls.read_plaintext(&mut entry.session.inbound);
            if let Some(end) = http::header_end(&entry.session.inbound) {
                if let Some(request) = http::parse_request(&entry.session.inbound, end) {
                    if request.method != "GET" {
                        let response = http::not_found_response();
                        let _ = entry.session.tls.write_plaintext(&response);
                        entry.session.inbound.drain(..end);
                        entry.session.request_close();
                    } else if let Some(key) = http::websocket_upgrade_key(&request) {
                        let accept = ws::accept_key(key);
                        let response = http::switching_protocols_response(&accept);
                        let _ = entry.session.tls.write_plaintext(&response);
                        entry.session.inbound.drain(..end);
                        entry.session.advance_to(Phase::WebSocket);
                        let init = ws::build_text_frame(&self.init_json());
                        entry.session.queue_write(init);
                    } else {
                        let path = http::sanitize_path(&self.web_root, &request.path);
                        let response = match path.and_then(|p| std::fs::read(&p).ok().map(|b| (p, b))) {
                            Some((p, body)) => http::ok_response(http::mime_type(&p), &body),
                            None => http::not_found_response(),
                        };
                        let _ = entry.session.tls.write_plaintext(&response);
                        entry.session.inbound.drain(..end);
                        entry.session.request_close();
                    }
                } else {
                    entry.session.request_close();
                }
            }
        }

        if entry.session.phase == Phase::WebSocket {
            let _ = entry.session.tls.read_plaintext(&mut entry.session.inbound);
            loop {
                let outcome = match ws::parse_client_frame(&entry.session.inbound) {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        self.errors.record(e.severity());
                        entry.session.request_close();
                        break;
                    }
                };
                match outcome {
                    ParseOutcome::NeedMore => break,
                    ParseOutcome::Consumed { n, frame } => {
                        entry.session.inbound.drain(..n);
                        match frame {
                            Some(ClientFrame::Binary(bytes)) => {
                                match InputEvent::decode(bytes.as_slice()) {
                                    Ok(event) => effects.push(control::dispatch(&event)),
                                    Err(e) => {
                                        warn!("malformed InputEvent: {e}");
                                        self.errors.record(Error::from(e).severity());
                                    }
                                }
                            }
                            Some(ClientFrame::Close) => entry.session.request_close(),
                            Some(ClientFrame::Text(_)) | None => {}
                        }
                    }
                }
            }
        }

        self.flush_outbound(entry);

        (effects, entry.session.close_requested)
    }

    fn flush_outbound(&self, entry: &mut Entry) {
        while let Some(bytes) = entry.session.outbound.pop_front() {
            if let Err(e) = entry.session.tls.write_plaintext(&bytes) {
                warn!("write to session {} failed: {e}", entry.session.id);
                self.errors.record(e.severity());
                entry.session.request_close();
                return;
            }
        }
        let _ = entry.session.tls.write_tls_to(&mut entry.socket);
    }

    /// One readiness-wait iteration (§4.6 steps 1-4). Returns any control
    /// effects parsed off the wire and the connect/disconnect edges that
    /// fired this iteration.
    pub fn poll_once(&mut self) -> Result<(Vec<DispatchedEffect>, ConnectionEdges)> {
        self.poll
            .poll(&mut self.events, Some(READINESS_TIMEOUT))
            .map_err(Error::Io)?;

        let tokens: Vec<Token> = self.events.iter().map(|e| e.token()).collect();
        if tokens.contains(&LISTENER_TOKEN) {
            self.accept_all();
        }

        let viewers_before = self.count_websocket_sessions();
        let mut dispatched = Vec::new();
        let mut to_drop = Vec::new();

        for token in tokens {
            if token == LISTENER_TOKEN {
                continue;
            }
            let Some(mut entry) = self.sessions.remove(&token) else { continue };
            let (effects, drop_now) = self.service_session(&mut entry);
            for effect in effects {
                dispatched.push(DispatchedEffect { session_id: entry.session.id, effect });
            }
            if drop_now {
                to_drop.push(token);
            } else {
                self.sessions.insert(token, entry);
            }
        }

        for token in to_drop {
            if let Some(mut entry) = self.sessions.remove(&token) {
                let _ = self.poll.registry().deregister(&mut entry.socket);
            }
        }

        let viewers_after = self.count_websocket_sessions();
        self.viewer_count = viewers_after;

        Ok((
            dispatched,
            ConnectionEdges {
                clients_connected: viewers_before == 0 && viewers_after > 0,
                no_clients: viewers_before > 0 && viewers_after == 0,
            },
        ))
    }

    /// Queues `bytes` (already frame-built) for one specific session, e.g.
    /// a PING echo (§4.7) that must go back to the sender rather than be
    /// broadcast.
    pub fn send_to(&mut self, session_id: SessionId, bytes: Vec<u8>) {
        for entry in self.sessions.values_mut() {
            if entry.session.id == session_id {
                entry.session.queue_write(bytes);
                return;
            }
        }
    }

    fn count_websocket_sessions(&self) -> usize {
        self.sessions.values().filter(|e| e.session.is_websocket()).count()
    }

    /// Polls the (externally supplied) host clipboard text against the
    /// last-broadcast value; broadcasts a Clipboard InputEvent to every
    /// viewer if it changed. Reading the real host clipboard is an
    /// external collaborator — callers pass in whatever they read.
    pub fn poll_clipboard(&mut self, now: Instant, current: &str) {
        if now < self.next_clipboard_poll {
            return;
        }
        self.next_clipboard_poll = now + CLIPBOARD_POLL_INTERVAL;
        if current != self.last_clipboard {
            self.last_clipboard = current.to_string();
            let event = InputEvent::clipboard(current);
            let frame = ws::build_binary_frame(&event.encode_to_vec());
            for entry in self.sessions.values_mut() {
                if entry.session.is_websocket() {
                    entry.session.queue_write(frame.clone());
                }
            }
        }
    }

    /// Sends `payload` (already framed per `assemble_video_frame`) to
    /// every websocket session, closing any that cannot drain within one
    /// frame interval (§5 backpressure policy (b)).
    pub fn broadcast(&mut self, payload: &[u8]) {
        let frame = ws::build_frame(Opcode::Binary, payload);
        let mut to_drop = Vec::new();
        for (token, entry) in self.sessions.iter_mut() {
            if !entry.session.is_websocket() {
                continue;
            }
            entry.session.queue_write(frame.clone());
            let mut write_failed = false;
            while let Some(bytes) = entry.session.outbound.pop_front() {
                if let Err(e) = entry.session.tls.write_plaintext(&bytes) {
                    warn!("broadcast write failed for session {}: {e}", entry.session.id);
                    self.errors.record(e.severity());
                    to_drop.push(*token);
                    write_failed = true;
                    break;
                }
            }
            if write_failed {
                continue;
            }

            // The frame must arrive atomically: spin with a short sleep
            // until rustls has handed every byte to the socket, rather
            // than let a partial write interleave with the next tick's
            // broadcast. A session that cannot keep up within one frame
            // interval is stuck and gets closed.
            let deadline = Instant::now() + DEFAULT_FRAME_INTERVAL;
            let mut stalled = false;
            loop {
                match entry.session.tls.write_tls_to(&mut entry.socket) {
                    Ok(_) if !entry.session.tls.wants_write() => break,
                    Ok(_) => {}
                    Err(e) if e.severity() == Severity::Transient => {}
                    Err(e) => {
                        warn!("broadcast write failed for session {}: {e}", entry.session.id);
                        self.errors.record(e.severity());
                        stalled = true;
                        break;
                    }
                }
                if Instant::now() >= deadline {
                    stalled = true;
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            if stalled {
                info!("session {} could not drain broadcast in time, closing", entry.session.id);
                self.errors.record(Error::BroadcastStalled.severity());
                to_drop.push(*token);
            }
        }
        for token in to_drop {
            if let Some(mut entry) = self.sessions.remove(&token) {
                let _ = self.poll.registry().deregister(&mut entry.socket);
            }
        }
    }
}

impl BroadcastSink for ConnectionSet {
    fn broadcast_video(&mut self, payload: &[u8]) {
        self.broadcast(payload);
    }
}

fn init_json_static(width: u32, height: u32, codec: &str) -> String {
    format!("{{\"type\":\"init\",\"width\":{width},\"height\":{height},\"codec\":\"{codec}\"}}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_json_matches_wire_schema() {
        let json = init_json_static(1920, 1080, "vp9");
        assert_eq!(json, r#"{"type":"init","width":1920,"height":1080,"codec":"vp9"}"#);
    }
}
