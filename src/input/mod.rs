//! The input port (§4.3): `ControlPlane` resolves MOUSE/KEY `InputEvent`s
//! into fixed-size `DriverPacket`s and forwards them to an `InputSink`.
//! The real virtual input driver is an external, platform-specific
//! collaborator (out of scope); this module defines the contract plus a
//! loopback sink used by tests, which applies the click aggregation and
//! Control-ASCII collapse documented for that external driver.

pub mod keymap;

use std::time::{Duration, Instant};

use crate::protocol::input_event::KeyEvent;

/// Default double-click threshold used when the host reports none
/// (recovered from `VirtualMouse.cpp`).
pub const DEFAULT_CLICK_SPEED: Duration = Duration::from_micros(500_000);

/// Bit 0 of a `KeyEvent`'s `modifiers` mask.
pub const MODIFIER_CONTROL: u32 = 0x1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DriverPacket {
    Mouse { x: f32, y: f32, buttons: u32, wheel_dx: f32, wheel_dy: f32 },
    Key { scancode: u32, is_down: bool, modifiers: u32, codepoint: u32 },
}

/// Non-blocking, at-most-once delivery to the platform input sink. A real
/// backend drops the packet and counts it if the channel is momentarily
/// full; callers must not treat a `false` return as fatal.
pub trait InputSink: Send {
    fn send(&mut self, packet: DriverPacket) -> bool;
}

/// §4.7 MOUSE handling: clamp into `[0, 1]`.
pub fn clamp_unit(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

/// §4.7 KEY handling: resolve a missing `key_code` and/or missing char
/// via the fixed string table; nonzero wire values always win.
pub fn resolve_key_event(event: &KeyEvent) -> DriverPacket {
    let mut scancode = event.key_code;
    let mut codepoint = event.key_utf32;

    if scancode == 0 || codepoint == 0 {
        if let Some(entry) = keymap::lookup(&event.key_string) {
            if scancode == 0 {
                scancode = entry.scancode;
            }
            if codepoint == 0 {
                if let Some(c) = entry.default_char {
                    codepoint = c as u32;
                }
            }
        }
    }

    DriverPacket::Key {
        scancode,
        is_down: event.down,
        modifiers: event.modifiers,
        codepoint,
    }
}

/// Collapses a Control-modified ASCII letter to its C0 code (`c - 96` for
/// lowercase, `c - 64` for uppercase). No-op outside that case.
pub fn collapse_control_ascii(modifiers: u32, codepoint: u32) -> u32 {
    if modifiers & MODIFIER_CONTROL == 0 {
        return codepoint;
    }
    match char::from_u32(codepoint) {
        Some(c @ 'a'..='z') => (c as u32) - 96,
        Some(c @ 'A'..='Z') => (c as u32) - 64,
        _ => codepoint,
    }
}

/// Reference `InputSink` for tests and local development: records what it
/// receives, applying the Control-ASCII collapse and exposing the
/// double-click aggregator so those documented behaviors have code to
/// actually run. Not a platform driver — there is no host to drive.
pub struct LoopbackInputSink {
    click_speed: Duration,
    last_click: Option<(u32, Instant)>,
    click_count: u32,
    pub received: Vec<DriverPacket>,
    dropped: u64,
}

impl LoopbackInputSink {
    pub fn new() -> Self {
        LoopbackInputSink {
            click_speed: DEFAULT_CLICK_SPEED,
            last_click: None,
            click_count: 0,
            received: Vec::new(),
            dropped: 0,
        }
    }

    pub fn with_click_speed(click_speed: Duration) -> Self {
        LoopbackInputSink { click_speed, ..Self::new() }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Feeds one button-down edge at `now`. Returns the aggregated click
    /// count: 1 for an isolated click, 2+ for consecutive same-button
    /// clicks within the threshold.
    pub fn observe_button_down(&mut self, button: u32, now: Instant) -> u32 {
        let continues = matches!(
            self.last_click,
            Some((last_button, last_time))
                if last_button == button && now.duration_since(last_time) <= self.click_speed
        );
        self.click_count = if continues { self.click_count + 1 } else { 1 };
        self.last_click = Some((button, now));
        self.click_count
    }
}

impl Default for LoopbackInputSink {
    fn default() -> Self {
        Self::new()
    }
}

impl InputSink for LoopbackInputSink {
    fn send(&mut self, packet: DriverPacket) -> bool {
        let packet = match packet {
            DriverPacket::Key { scancode, is_down, modifiers, codepoint } => DriverPacket::Key {
                scancode,
                is_down,
                modifiers,
                codepoint: collapse_control_ascii(modifiers, codepoint),
            },
            other => other,
        };
        self.received.push(packet);
        true
    }
}

/// The host clipboard, read by `ConnectionSet`'s periodic poll and
/// written by the CLIPBOARD control message (§4.7). The real host
/// clipboard is an external, platform-specific collaborator; this trait
/// is its contract.
pub trait ClipboardSink: Send {
    fn get(&self) -> String;
    fn set(&mut self, text: &str);
}

/// In-process stand-in for tests/dev — there is no host clipboard to
/// reach for outside a real desktop session.
#[derive(Default)]
pub struct InMemoryClipboard {
    text: String,
}

impl ClipboardSink for InMemoryClipboard {
    fn get(&self) -> String {
        self.text.clone()
    }

    fn set(&mut self, text: &str) {
        self.text = text.to_string();
    }
}
