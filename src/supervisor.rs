//! Supervisor (§4.10): the IDLE/STREAMING state machine. Owns the
//! Encoder, FrameSource and CongestionGovernor exclusively; wires parsed
//! control effects from the network thread to the right collaborator.
//! The actual capture *thread* is started/stopped by the binary (it owns
//! the `JoinHandle`); this type only decides when that should happen.

use std::time::Duration;

use log::{info, warn};
use prost::Message as _;

use crate::capture::encoder::{Codec, Encoder};
use crate::capture::frame::FrameSource;
use crate::congestion::CongestionGovernor;
use crate::connection_set::{ConnectionEdges, ConnectionSet, DispatchedEffect};
use crate::control::ControlEffect;
use crate::input::{ClipboardSink, InputSink};
use crate::protocol::ws;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Streaming,
}

/// What the caller's main loop should do with the capture thread as a
/// result of processing one batch of edges/effects. The Supervisor
/// itself never spawns threads (see module docs).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureAction {
    None,
    Start,
    Stop,
    Restart,
}

pub struct Supervisor {
    state: SupervisorState,
    width: u32,
    height: u32,
    fps: u32,
    bitrate_kbps: u32,
    codec: Codec,
    congestion: CongestionGovernor,
}

impl Supervisor {
    pub fn new(width: u32, height: u32, fps: u32, bitrate_kbps: u32, codec: Codec) -> Self {
        Supervisor {
            state: SupervisorState::Idle,
            width,
            height,
            fps: fps.clamp(1, 120),
            bitrate_kbps,
            codec,
            congestion: CongestionGovernor::new(bitrate_kbps),
        }
    }

    pub fn state(&self) -> SupervisorState {
        self.state
    }

    pub fn frame_wait(&self) -> Duration {
        Duration::from_micros(1_000_000 / self.fps as u64)
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Processes connect/disconnect edges observed this network-thread
    /// iteration. `configure` is called to (re)configure the Encoder
    /// whenever one is needed; failures keep the Supervisor in IDLE per
    /// §4.10's failure semantics.
    pub fn handle_edges(
        &mut self,
        edges: ConnectionEdges,
        encoder: &mut dyn Encoder,
        frame_source: &mut dyn FrameSource,
        connection_set: &mut ConnectionSet,
    ) -> CaptureAction {
        match (self.state, edges.clients_connected, edges.no_clients) {
            (SupervisorState::Idle, true, _) => {
                if let Err(e) = frame_source.init() {
                    warn!("FrameSource init failed, staying IDLE: {e}");
                    return CaptureAction::None;
                }
                if let Err(e) = encoder.configure(self.width, self.height, self.bitrate_kbps, self.codec)
                {
                    warn!("Encoder configure failed, staying IDLE: {e}");
                    return CaptureAction::None;
                }
                connection_set.init_width = self.width;
                connection_set.init_height = self.height;
                connection_set.init_codec = self.codec.tag().to_string();
                connection_set.rebroadcast_init();
                self.state = SupervisorState::Streaming;
                info!("first viewer connected, entering STREAMING");
                CaptureAction::Start
            }
            (SupervisorState::Streaming, _, true) => {
                self.state = SupervisorState::Idle;
                info!("last viewer disconnected, entering IDLE");
                CaptureAction::Stop
            }
            _ => CaptureAction::None,
        }
    }

    /// Applies one dispatched control effect. Returns a `CaptureAction`
    /// telling the caller whether the capture thread must be
    /// stopped/restarted to pick up a resolution/codec change.
    pub fn handle_effect(
        &mut self,
        dispatched: DispatchedEffect,
        encoder: &mut dyn Encoder,
        input_sink: &mut dyn InputSink,
        clipboard: &mut dyn ClipboardSink,
        connection_set: &mut ConnectionSet,
    ) -> CaptureAction {
        match dispatched.effect {
            ControlEffect::Input(packet) => {
                if !input_sink.send(packet) {
                    warn!("InputSink dropped a packet for session {}", dispatched.session_id);
                }
                CaptureAction::None
            }
            ControlEffect::Ping { echo, rtt_ms } => {
                if let Some(new_bitrate) = self.congestion.observe_rtt(rtt_ms) {
                    self.bitrate_kbps = new_bitrate;
                    encoder.set_bitrate(new_bitrate);
                }
                let frame = ws::build_binary_frame(&echo.encode_to_vec());
                connection_set.send_to(dispatched.session_id, frame);
                CaptureAction::None
            }
            ControlEffect::ChangeResolution { width, height } => {
                if (width, height) != (self.width, self.height) {
                    self.width = width;
                    self.height = height;
                    connection_set.init_width = width;
                    connection_set.init_height = height;
                    if self.state == SupervisorState::Streaming {
                        let _ = encoder.configure(self.width, self.height, self.bitrate_kbps, self.codec);
                        connection_set.rebroadcast_init();
                        return CaptureAction::Restart;
                    }
                }
                CaptureAction::None
            }
            ControlEffect::ChangeCodec { codec } => match Codec::parse(&codec) {
                Ok(new_codec) if new_codec != self.codec => {
                    self.codec = new_codec;
                    connection_set.init_codec = new_codec.tag().to_string();
                    if self.state == SupervisorState::Streaming {
                        let _ = encoder.configure(self.width, self.height, self.bitrate_kbps, self.codec);
                        connection_set.rebroadcast_init();
                        return CaptureAction::Restart;
                    }
                    CaptureAction::None
                }
                Ok(_) => CaptureAction::None,
                Err(e) => {
                    warn!("ignoring unsupported codec change: {e}");
                    CaptureAction::None
                }
            },
            ControlEffect::ChangeFps { fps } => {
                self.fps = fps;
                CaptureAction::None
            }
            ControlEffect::Clipboard { text } => {
                clipboard.set(&text);
                CaptureAction::None
            }
            ControlEffect::Dropped => CaptureAction::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::encoder::PlanarEncoder;
    use crate::capture::frame::SyntheticFrameSource;
    use crate::input::{InMemoryClipboard, LoopbackInputSink};
    use crate::protocol::input_event::InputEvent;
    use std::net::{SocketAddr, TcpListener as StdListener};

    fn test_connection_set() -> ConnectionSet {
        let dir = tempfile::tempdir().unwrap();
        let cert_path = dir.path().join("server.crt");
        let key_path = dir.path().join("server.key");
        crate::tls::load_or_generate(&cert_path, &key_path).unwrap();
        let config = crate::tls::server_config(&cert_path, &key_path).unwrap();
        // Bind to an ephemeral port on loopback, let the OS assign it
        // by binding a throwaway std listener first to find a free port.
        let probe = StdListener::bind("127.0.0.1:0").unwrap();
        let addr: SocketAddr = probe.local_addr().unwrap();
        drop(probe);
        ConnectionSet::bind(addr, config, dir.path().join("web")).unwrap()
    }

    #[test]
    fn idle_transitions_to_streaming_on_first_viewer() {
        let mut supervisor = Supervisor::new(1920, 1080, 30, 2000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut source = SyntheticFrameSource::new(1920, 1080);
        let mut connection_set = test_connection_set();
        let edges = ConnectionEdges { clients_connected: true, no_clients: false };
        let action = supervisor.handle_edges(edges, &mut encoder, &mut source, &mut connection_set);
        assert_eq!(action, CaptureAction::Start);
        assert_eq!(supervisor.state(), SupervisorState::Streaming);
    }

    #[test]
    fn streaming_transitions_to_idle_on_last_viewer() {
        let mut supervisor = Supervisor::new(1920, 1080, 30, 2000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut source = SyntheticFrameSource::new(1920, 1080);
        let mut connection_set = test_connection_set();
        supervisor.handle_edges(
            ConnectionEdges { clients_connected: true, no_clients: false },
            &mut encoder,
            &mut source,
            &mut connection_set,
        );
        let action = supervisor.handle_edges(
            ConnectionEdges { clients_connected: false, no_clients: true },
            &mut encoder,
            &mut source,
            &mut connection_set,
        );
        assert_eq!(action, CaptureAction::Stop);
        assert_eq!(supervisor.state(), SupervisorState::Idle);
    }

    #[test]
    fn fps_change_is_hot_applied_without_restart() {
        let mut supervisor = Supervisor::new(1920, 1080, 30, 2000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut input_sink = LoopbackInputSink::new();
        let mut clipboard = InMemoryClipboard::default();
        let mut connection_set = test_connection_set();
        let effect = DispatchedEffect {
            session_id: 1,
            effect: ControlEffect::ChangeFps { fps: 60 },
        };
        let action = supervisor.handle_effect(
            effect,
            &mut encoder,
            &mut input_sink,
            &mut clipboard,
            &mut connection_set,
        );
        assert_eq!(action, CaptureAction::None);
        assert_eq!(supervisor.frame_wait(), Duration::from_micros(1_000_000 / 60));
    }

    #[test]
    fn resolution_change_while_streaming_requests_restart() {
        let mut supervisor = Supervisor::new(1920, 1080, 30, 2000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut source = SyntheticFrameSource::new(1920, 1080);
        let mut input_sink = LoopbackInputSink::new();
        let mut clipboard = InMemoryClipboard::default();
        let mut connection_set = test_connection_set();
        supervisor.handle_edges(
            ConnectionEdges { clients_connected: true, no_clients: false },
            &mut encoder,
            &mut source,
            &mut connection_set,
        );
        let effect = DispatchedEffect {
            session_id: 1,
            effect: ControlEffect::ChangeResolution { width: 1280, height: 720 },
        };
        let action = supervisor.handle_effect(
            effect,
            &mut encoder,
            &mut input_sink,
            &mut clipboard,
            &mut connection_set,
        );
        assert_eq!(action, CaptureAction::Restart);
        assert_eq!(supervisor.dimensions(), (1280, 720));
    }

    #[test]
    fn clipboard_effect_writes_through_to_sink() {
        let mut supervisor = Supervisor::new(1920, 1080, 30, 2000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut input_sink = LoopbackInputSink::new();
        let mut clipboard = InMemoryClipboard::default();
        let mut connection_set = test_connection_set();
        let effect = DispatchedEffect {
            session_id: 1,
            effect: ControlEffect::Clipboard { text: "copied text".into() },
        };
        supervisor.handle_effect(effect, &mut encoder, &mut input_sink, &mut clipboard, &mut connection_set);
        assert_eq!(clipboard.get(), "copied text");
    }

    #[test]
    fn ping_effect_feeds_congestion_governor() {
        let mut supervisor = Supervisor::new(1920, 1080, 30, 4000, Codec::Vp8);
        let mut encoder = PlanarEncoder::new();
        let mut input_sink = LoopbackInputSink::new();
        let mut clipboard = InMemoryClipboard::default();
        let mut connection_set = test_connection_set();
        let effect = DispatchedEffect {
            session_id: 1,
            effect: ControlEffect::Ping { echo: InputEvent::ping(200), rtt_ms: 200 },
        };
        supervisor.handle_effect(effect, &mut encoder, &mut input_sink, &mut clipboard, &mut connection_set);
        assert!(supervisor.congestion.bitrate_kbps() < 4000);
    }
}
