//! ClientSession (§3, §4.6): one viewer connection's protocol phase,
//! inbound parse buffer and outbound write queue. Owned exclusively by
//! `ConnectionSet`; mutated only on the network thread.

use std::collections::VecDeque;

use crate::tls::TlsTransport;

/// Monotonic phase progression, never regresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    TlsHandshake,
    HttpRequest,
    WebSocket,
}

pub type SessionId = u64;

pub struct ClientSession {
    pub id: SessionId,
    pub tls: TlsTransport,
    pub phase: Phase,
    pub inbound: Vec<u8>,
    pub outbound: VecDeque<Vec<u8>>,
    pub close_requested: bool,
}

impl ClientSession {
    pub fn new(id: SessionId, tls: TlsTransport) -> Self {
        ClientSession {
            id,
            tls,
            phase: Phase::TlsHandshake,
            inbound: Vec::new(),
            outbound: VecDeque::new(),
            close_requested: false,
        }
    }

    pub fn is_websocket(&self) -> bool {
        self.phase == Phase::WebSocket
    }

    /// Advances the phase forward. Panics if called with a phase that
    /// would regress — phase only ever moves TLS_HANDSHAKE -> HTTP_REQUEST
    /// -> WEBSOCKET.
    pub fn advance_to(&mut self, next: Phase) {
        let ok = matches!(
            (self.phase, next),
            (Phase::TlsHandshake, Phase::HttpRequest)
                | (Phase::HttpRequest, Phase::WebSocket)
                | (Phase::HttpRequest, Phase::HttpRequest)
        );
        debug_assert!(ok, "session phase must progress monotonically");
        self.phase = next;
    }

    pub fn queue_write(&mut self, bytes: Vec<u8>) {
        self.outbound.push_back(bytes);
    }

    pub fn request_close(&mut self) {
        self.close_requested = true;
    }

    /// Drains complete protocol units from `inbound` using `parse`, which
    /// returns `Some(bytes_consumed)` for each unit it recognizes (and
    /// `None` when the buffer holds an incomplete unit). Consumed bytes
    /// are removed from the front of the buffer after each call so the
    /// caller's `parse` always sees the buffer starting at a unit
    /// boundary.
    pub fn drain_with<F>(&mut self, mut parse: F)
    where
        F: FnMut(&[u8]) -> Option<usize>,
    {
        loop {
            match parse(&self.inbound) {
                Some(0) => break,
                Some(n) => {
                    self.inbound.drain(..n);
                }
                None => break,
            }
        }
    }
}
