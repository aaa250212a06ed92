//! ControlPlane (§4.7): dispatches a parsed `InputEvent` to the handler
//! for its `type` tag. Dispatch is pure — it never touches a socket or a
//! thread directly, it returns an effect for the caller (network thread)
//! to apply against `InputSink` / `Supervisor` / `CongestionGovernor` /
//! `Encoder`, matching the data flow in §2.

use crate::input::{self, DriverPacket};
use crate::protocol::input_event::{EventType, InputEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum ControlEffect {
    Input(DriverPacket),
    /// Echo the same event back to the sender as a binary frame, and feed
    /// `rtt_ms` into the CongestionGovernor.
    Ping { echo: InputEvent, rtt_ms: i32 },
    ChangeResolution { width: u32, height: u32 },
    ChangeCodec { codec: String },
    Clipboard { text: String },
    /// Already clamped to [1, 120].
    ChangeFps { fps: u32 },
    /// Tag recognized but the required sub-message was absent, or the
    /// tag itself was unrecognized — the packet is dropped and counted,
    /// never causes the control plane to abort (§7).
    Dropped,
}

pub fn dispatch(event: &InputEvent) -> ControlEffect {
    match event.event_type() {
        Some(EventType::Mouse) => match &event.mouse {
            Some(m) => ControlEffect::Input(DriverPacket::Mouse {
                x: input::clamp_unit(m.x),
                y: input::clamp_unit(m.y),
                buttons: m.buttons,
                wheel_dx: m.wheel_dx,
                wheel_dy: m.wheel_dy,
            }),
            None => ControlEffect::Dropped,
        },
        Some(EventType::Key) => match &event.key {
            Some(k) => ControlEffect::Input(input::resolve_key_event(k)),
            None => ControlEffect::Dropped,
        },
        Some(EventType::Ping) => match &event.ping {
            Some(p) => ControlEffect::Ping { echo: event.clone(), rtt_ms: p.last_rtt_ms },
            None => ControlEffect::Dropped,
        },
        Some(EventType::Resolution) => match &event.resolution {
            Some(r) => ControlEffect::ChangeResolution { width: r.width, height: r.height },
            None => ControlEffect::Dropped,
        },
        Some(EventType::Codec) => match &event.codec {
            Some(c) => ControlEffect::ChangeCodec { codec: c.codec.clone() },
            None => ControlEffect::Dropped,
        },
        Some(EventType::Clipboard) => match &event.clipboard {
            Some(c) => ControlEffect::Clipboard { text: c.text.clone() },
            None => ControlEffect::Dropped,
        },
        Some(EventType::Fps) => match &event.fps {
            Some(f) => ControlEffect::ChangeFps { fps: f.fps.clamp(1, 120) },
            None => ControlEffect::Dropped,
        },
        None => ControlEffect::Dropped,
    }
}

/// Picks the closest display mode to the requested (width, height) from
/// `modes`, by minimal `|Δw| + |Δh|`; an exact match short-circuits.
/// Returns `None` if `modes` is empty.
pub fn closest_mode(modes: &[(u32, u32)], width: u32, height: u32) -> Option<(u32, u32)> {
    modes
        .iter()
        .copied()
        .min_by_key(|&(w, h)| w.abs_diff(width) + h.abs_diff(height))
}
