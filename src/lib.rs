//! `hremote`: captures the host framebuffer, encodes it as VP8/VP9 video
//! and broadcasts it over a TLS WebSocket to browser viewers, accepting
//! remote mouse/keyboard input, clipboard sync and a protobuf-encoded
//! control plane (bitrate, resolution, codec, fps) in return.
//!
//! The binary (`src/bin/hremoted.rs`) wires three long-lived threads —
//! network, capture, supervisor — around the components in this crate;
//! see each module for its piece of the contract.

pub mod capture;
pub mod config;
pub mod congestion;
pub mod connection_set;
pub mod control;
pub mod error;
pub mod input;
pub mod protocol;
pub mod session;
pub mod supervisor;
pub mod tls;

pub use error::{Error, Result, Severity};
