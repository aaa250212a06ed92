//! Binary entry point: wires the three long-lived threads from §5 around
//! the library's components. Thin by design — policy lives in
//! `hremote::supervisor`/`hremote::control`; this is wiring and the
//! cross-thread message passing that policy deliberately abstracts away.

use std::net::SocketAddr;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{error, info, warn};

use hremote::capture::encoder::{Codec, Encoder, PlanarEncoder};
use hremote::capture::frame::{FrameSource, SyntheticFrameSource};
use hremote::capture::loop_::{BroadcastSink, CaptureLoop};
use hremote::config::Args;
use hremote::connection_set::ConnectionSet;
use hremote::control::ControlEffect;
use hremote::input::{ClipboardSink, InMemoryClipboard, LoopbackInputSink};
use hremote::supervisor::{CaptureAction, Supervisor};
use hremote::tls;

/// Messages the supervisor/network thread posts to the capture thread.
/// The Encoder itself is never shared (§5) — only these commands cross
/// the boundary, applied between ticks.
enum CaptureCommand {
    SetBitrate(u32),
    SetFrameWait(Duration),
    Reconfigure { width: u32, height: u32, codec: Codec, bitrate_kbps: u32 },
    Stop,
}

struct CaptureHandle {
    tx: Sender<CaptureCommand>,
    join: JoinHandle<()>,
}

struct SinkGuard<'a>(std::sync::MutexGuard<'a, ConnectionSet>);

impl BroadcastSink for SinkGuard<'_> {
    fn broadcast_video(&mut self, payload: &[u8]) {
        self.0.broadcast_video(payload);
    }
}

fn run_capture_thread(
    connection_set: Arc<Mutex<ConnectionSet>>,
    width: u32,
    height: u32,
    fps: u32,
    bitrate_kbps: u32,
    codec: Codec,
    rx: Receiver<CaptureCommand>,
) {
    let mut source = SyntheticFrameSource::new(width, height);
    if let Err(e) = source.init() {
        error!("FrameSource init failed on capture thread: {e}");
        return;
    }
    let mut encoder = PlanarEncoder::new();
    if let Err(e) = encoder.configure(width, height, bitrate_kbps, codec) {
        error!("Encoder configure failed on capture thread: {e}");
        return;
    }

    let mut capture_loop = CaptureLoop::new(Duration::from_micros(1_000_000 / fps as u64));
    let mut pts: u64 = 0;

    loop {
        match rx.try_recv() {
            Ok(CaptureCommand::Stop) => break,
            Ok(CaptureCommand::SetBitrate(kbps)) => encoder.set_bitrate(kbps),
            Ok(CaptureCommand::SetFrameWait(d)) => capture_loop.set_frame_wait(d),
            Ok(CaptureCommand::Reconfigure { width, height, codec, bitrate_kbps }) => {
                if let Err(e) = encoder.configure(width, height, bitrate_kbps, codec) {
                    warn!("hot reconfigure failed: {e}");
                }
            }
            Err(mpsc::TryRecvError::Empty) => {}
            Err(mpsc::TryRecvError::Disconnected) => break,
        }

        let now = Instant::now();
        let mut guard = SinkGuard(connection_set.lock().expect("connection set mutex poisoned"));
        match capture_loop.tick(now, pts, &mut source, &mut encoder, &mut guard) {
            Ok(_) => {}
            Err(e) => warn!("capture tick failed: {e}"),
        }
        drop(guard);
        pts += 1;

        std::thread::sleep(Duration::from_millis(1));
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let settings = match args.resolve_settings() {
        Ok(s) => s,
        Err(e) => {
            error!("failed to load settings: {e}");
            std::process::exit(1);
        }
    };

    if let Err(e) = tls::load_or_generate(&settings.cert_path, &settings.key_path) {
        error!("failed to provision TLS identity: {e}");
        std::process::exit(1);
    }
    let tls_config = match tls::server_config(&settings.cert_path, &settings.key_path) {
        Ok(c) => c,
        Err(e) => {
            error!("failed to build TLS server config: {e}");
            std::process::exit(1);
        }
    };

    let codec = match Codec::parse(&args.codec) {
        Ok(c) => c,
        Err(e) => {
            error!("{e}");
            std::process::exit(1);
        }
    };

    let addr: SocketAddr = match format!("0.0.0.0:{}", settings.port).parse() {
        Ok(a) => a,
        Err(e) => {
            error!("invalid listen address: {e}");
            std::process::exit(1);
        }
    };

    let connection_set = match ConnectionSet::bind(addr, tls_config, args.web_root.clone()) {
        Ok(cs) => Arc::new(Mutex::new(cs)),
        Err(e) => {
            error!("failed to bind listener: {e}");
            std::process::exit(1);
        }
    };

    info!("hremoted listening on {addr}");

    let width = 1920;
    let height = 1080;
    let mut supervisor = Supervisor::new(width, height, args.fps, args.bitrate_kbps, codec);
    let mut input_sink = LoopbackInputSink::new();
    let mut clipboard = InMemoryClipboard::default();
    let mut capture_handle: Option<CaptureHandle> = None;

    loop {
        let (dispatched, edges) = {
            let mut cs = connection_set.lock().expect("connection set mutex poisoned");
            match cs.poll_once() {
                Ok(result) => result,
                Err(e) => {
                    warn!("network poll failed: {e}");
                    continue;
                }
            }
        };

        {
            let mut source = NullFrameSource;
            let mut encoder = PlanarEncoder::new();
            let mut cs = connection_set.lock().expect("connection set mutex poisoned");
            let action = supervisor.handle_edges(edges, &mut encoder, &mut source, &mut cs);
            drop(cs);
            apply_capture_action(
                action,
                &mut capture_handle,
                &connection_set,
                &supervisor,
            );
        }

        for item in dispatched {
            let session_id = item.session_id;
            match &item.effect {
                ControlEffect::ChangeFps { fps } => {
                    if let Some(handle) = &capture_handle {
                        let wait = Duration::from_micros(1_000_000 / (*fps).max(1) as u64);
                        let _ = handle.tx.send(CaptureCommand::SetFrameWait(wait));
                    }
                }
                _ => {}
            }

            let mut encoder = PlanarEncoder::new();
            let mut cs = connection_set.lock().expect("connection set mutex poisoned");
            let action = supervisor.handle_effect(
                hremote::connection_set::DispatchedEffect { session_id, effect: item.effect },
                &mut encoder,
                &mut input_sink,
                &mut clipboard,
                &mut cs,
            );
            drop(cs);
            apply_capture_action(action, &mut capture_handle, &connection_set, &supervisor);

            if let Some(handle) = &capture_handle {
                let (w, h) = supervisor.dimensions();
                let _ = handle.tx.send(CaptureCommand::Reconfigure {
                    width: w,
                    height: h,
                    codec: supervisor.codec(),
                    bitrate_kbps: args.bitrate_kbps,
                });
                let _ = handle.tx.send(CaptureCommand::SetBitrate(args.bitrate_kbps));
            }
        }

        {
            let mut cs = connection_set.lock().expect("connection set mutex poisoned");
            cs.poll_clipboard(Instant::now(), &clipboard.get());
        }
    }
}

/// Stand-in passed to `Supervisor::handle_edges` on the network thread:
/// the real FrameSource lives exclusively on the capture thread, so this
/// call site only ever observes the IDLE->STREAMING transition itself,
/// never reads frames.
struct NullFrameSource;

impl FrameSource for NullFrameSource {
    fn init(&mut self) -> hremote::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn bits(&self) -> (*const u8, u32, u32, u32) {
        (std::ptr::null(), 0, 0, 0)
    }
}

fn apply_capture_action(
    action: CaptureAction,
    capture_handle: &mut Option<CaptureHandle>,
    connection_set: &Arc<Mutex<ConnectionSet>>,
    supervisor: &Supervisor,
) {
    match action {
        CaptureAction::None => {}
        CaptureAction::Start => {
            let (tx, rx) = mpsc::channel();
            let (width, height) = supervisor.dimensions();
            let fps = (1_000_000 / supervisor.frame_wait().as_micros().max(1)) as u32;
            let codec = supervisor.codec();
            let cs = connection_set.clone();
            let join = std::thread::spawn(move || {
                run_capture_thread(cs, width, height, fps.max(1), 2000, codec, rx);
            });
            *capture_handle = Some(CaptureHandle { tx, join });
        }
        CaptureAction::Stop => {
            if let Some(handle) = capture_handle.take() {
                let _ = handle.tx.send(CaptureCommand::Stop);
                let _ = handle.join.join();
            }
        }
        CaptureAction::Restart => {
            if let Some(handle) = capture_handle.take() {
                let _ = handle.tx.send(CaptureCommand::Stop);
                let _ = handle.join.join();
            }
            let (tx, rx) = mpsc::channel();
            let (width, height) = supervisor.dimensions();
            let fps = (1_000_000 / supervisor.frame_wait().as_micros().max(1)) as u32;
            let codec = supervisor.codec();
            let cs = connection_set.clone();
            let join = std::thread::spawn(move || {
                run_capture_thread(cs, width, height, fps.max(1), 2000, codec, rx);
            });
            *capture_handle = Some(CaptureHandle { tx, join });
        }
    }
}
