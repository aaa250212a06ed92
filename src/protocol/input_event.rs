//! Wire schema for the control-plane `InputEvent` messages (§6). Hand-authored
//! `prost::Message` impls via the `derive` feature, so the crate stays
//! wire-compatible with a real `.proto`-generated client without needing a
//! `protoc`/build-script step. Field numbers are fixed and must not change.

#[derive(Clone, Copy, PartialEq, Eq, Debug, prost::Enumeration)]
#[repr(i32)]
pub enum EventType {
    Mouse = 1,
    Key = 2,
    Ping = 3,
    Resolution = 4,
    Codec = 5,
    Clipboard = 6,
    Fps = 7,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct MouseEvent {
    #[prost(float, tag = "1")]
    pub x: f32,
    #[prost(float, tag = "2")]
    pub y: f32,
    #[prost(uint32, tag = "3")]
    pub buttons: u32,
    #[prost(float, tag = "4")]
    pub wheel_dx: f32,
    #[prost(float, tag = "5")]
    pub wheel_dy: f32,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct KeyEvent {
    #[prost(bool, tag = "1")]
    pub down: bool,
    #[prost(uint32, tag = "2")]
    pub modifiers: u32,
    #[prost(uint32, tag = "3")]
    pub key_utf32: u32,
    #[prost(uint32, tag = "4")]
    pub key_code: u32,
    #[prost(string, tag = "5")]
    pub key_string: String,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct PingEvent {
    #[prost(int32, tag = "1")]
    pub last_rtt_ms: i32,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct ResolutionEvent {
    #[prost(uint32, tag = "1")]
    pub width: u32,
    #[prost(uint32, tag = "2")]
    pub height: u32,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct CodecChangeEvent {
    #[prost(string, tag = "1")]
    pub codec: String,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct ClipboardEvent {
    #[prost(string, tag = "1")]
    pub text: String,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct FpsChangeEvent {
    #[prost(uint32, tag = "1")]
    pub fps: u32,
}

#[derive(Clone, PartialEq, Default, prost::Message)]
pub struct InputEvent {
    #[prost(enumeration = "EventType", tag = "1")]
    pub r#type: i32,
    #[prost(message, optional, tag = "2")]
    pub mouse: Option<MouseEvent>,
    #[prost(message, optional, tag = "3")]
    pub key: Option<KeyEvent>,
    #[prost(message, optional, tag = "4")]
    pub ping: Option<PingEvent>,
    #[prost(message, optional, tag = "5")]
    pub resolution: Option<ResolutionEvent>,
    #[prost(message, optional, tag = "6")]
    pub codec: Option<CodecChangeEvent>,
    #[prost(message, optional, tag = "7")]
    pub clipboard: Option<ClipboardEvent>,
    #[prost(message, optional, tag = "8")]
    pub fps: Option<FpsChangeEvent>,
}

impl InputEvent {
    pub fn ping(last_rtt_ms: i32) -> InputEvent {
        InputEvent {
            r#type: EventType::Ping as i32,
            ping: Some(PingEvent { last_rtt_ms }),
            ..Default::default()
        }
    }

    pub fn clipboard(text: impl Into<String>) -> InputEvent {
        InputEvent {
            r#type: EventType::Clipboard as i32,
            clipboard: Some(ClipboardEvent { text: text.into() }),
            ..Default::default()
        }
    }

    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_i32(self.r#type)
    }
}
