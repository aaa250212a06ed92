//! RFC 6455 handshake and framing.
//!
//! The frame parser is a pure function: `(buffer) -> NeedMore | Consumed
//! { n, frame }`. It never mutates caller state and is safe to call
//! repeatedly against a growing session buffer — the re-architecture this
//! crate makes over a hand-rolled, buffer-rewriting parser (see the
//! teacher's ad-hoc protocol state machines for the pattern this replaces).

use base64::Engine;
use sha1::{Digest, Sha1};

use crate::error::{Error, Result};

const WS_MAGIC: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Computes `Sec-WebSocket-Accept` from the client's `Sec-WebSocket-Key`.
pub fn accept_key(client_key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(client_key.as_bytes());
    hasher.update(WS_MAGIC.as_bytes());
    let digest = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(digest)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Opcode {
    Continuation,
    Text,
    Binary,
    Close,
    Ping,
    Pong,
    Other(u8),
}

impl Opcode {
    fn from_raw(raw: u8) -> Opcode {
        match raw {
            0x0 => Opcode::Continuation,
            0x1 => Opcode::Text,
            0x2 => Opcode::Binary,
            0x8 => Opcode::Close,
            0x9 => Opcode::Ping,
            0xA => Opcode::Pong,
            other => Opcode::Other(other),
        }
    }
}

/// A complete client frame, after unmasking. Fragmented frames (FIN=0)
/// and control opcodes we don't act on are consumed but never produce a
/// `ClientFrame` — see [`parse_client_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    Binary(Vec<u8>),
    Text(String),
    Close,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseOutcome {
    NeedMore,
    Consumed {
        n: usize,
        frame: Option<ClientFrame>,
    },
}

/// Parses one client-to-server frame out of `buf`, if a complete one is
/// present. Never mutates `buf`; the caller is responsible for draining
/// `n` bytes on `Consumed`. Client frames MUST be masked per RFC 6455
/// §5.3 — an unmasked frame is session-fatal.
pub fn parse_client_frame(buf: &[u8]) -> Result<ParseOutcome> {
    if buf.len() < 2 {
        return Ok(ParseOutcome::NeedMore);
    }

    let fin = buf[0] & 0x80 != 0;
    let opcode = Opcode::from_raw(buf[0] & 0x0F);
    let masked = buf[1] & 0x80 != 0;
    let len_field = buf[1] & 0x7F;

    if !masked {
        return Err(Error::UnmaskedClientFrame);
    }

    let (payload_len, mut offset): (u64, usize) = match len_field {
        126 => {
            if buf.len() < 4 {
                return Ok(ParseOutcome::NeedMore);
            }
            (u16::from_be_bytes([buf[2], buf[3]]) as u64, 4)
        }
        127 => {
            if buf.len() < 10 {
                return Ok(ParseOutcome::NeedMore);
            }
            let mut bytes = [0u8; 8];
            bytes.copy_from_slice(&buf[2..10]);
            (u64::from_be_bytes(bytes), 10)
        }
        n => (n as u64, 2),
    };

    if buf.len() < offset + 4 {
        return Ok(ParseOutcome::NeedMore);
    }
    let mask_key = [
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ];
    offset += 4;

    let payload_len = payload_len as usize;
    let total = offset + payload_len;
    if buf.len() < total {
        return Ok(ParseOutcome::NeedMore);
    }

    let mut payload = buf[offset..total].to_vec();
    for (i, byte) in payload.iter_mut().enumerate() {
        *byte ^= mask_key[i % 4];
    }

    let frame = if !fin {
        // Fragmented frames are accepted (so the stream stays in sync)
        // but discarded: fragment reassembly is out of scope.
        None
    } else {
        match opcode {
            Opcode::Binary => Some(ClientFrame::Binary(payload)),
            Opcode::Text => {
                let text = String::from_utf8(payload)
                    .map_err(|_| Error::MalformedFrame("text payload is not valid UTF-8"))?;
                Some(ClientFrame::Text(text))
            }
            Opcode::Close => Some(ClientFrame::Close),
            _ => None,
        }
    };

    Ok(ParseOutcome::Consumed { n: total, frame })
}

/// Builds an unmasked server->client frame. Server frames are always
/// FIN=1 and never masked, per spec.
pub fn build_frame(opcode: Opcode, payload: &[u8]) -> Vec<u8> {
    let opcode_byte = match opcode {
        Opcode::Continuation => 0x0,
        Opcode::Text => 0x1,
        Opcode::Binary => 0x2,
        Opcode::Close => 0x8,
        Opcode::Ping => 0x9,
        Opcode::Pong => 0xA,
        Opcode::Other(n) => n,
    };

    let mut frame = Vec::with_capacity(payload.len() + 10);
    frame.push(0x80 | opcode_byte);

    let len = payload.len();
    if len < 126 {
        frame.push(len as u8);
    } else if len < 65536 {
        frame.push(126);
        frame.extend_from_slice(&(len as u16).to_be_bytes());
    } else {
        frame.push(127);
        frame.extend_from_slice(&(len as u64).to_be_bytes());
    }

    frame.extend_from_slice(payload);
    frame
}

pub fn build_text_frame(payload: &str) -> Vec<u8> {
    build_frame(Opcode::Text, payload.as_bytes())
}

pub fn build_binary_frame(payload: &[u8]) -> Vec<u8> {
    build_frame(Opcode::Binary, payload)
}
