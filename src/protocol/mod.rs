//! Wire-level concerns: HTTP handshake, WebSocket framing, and the
//! protobuf-encoded control-plane messages carried inside binary frames.

pub mod http;
pub mod input_event;
pub mod ws;

pub use input_event::{EventType, InputEvent};
