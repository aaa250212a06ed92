//! The capture thread's absolute-time scheduler (§4.9): decides when the
//! next tick fires, pulls a frame, encodes it and hands finished packets
//! to a broadcast sink. Kept independent of `ConnectionSet` so it can be
//! unit-tested without a network stack — the real capture thread wires a
//! `ConnectionSet` in as the `BroadcastSink`.

use std::time::{Duration, Instant};

use crate::capture::encoder::{EncodedPacket, Encoder};
use crate::capture::frame::{Frame, FrameSource};
use crate::error::Result;

/// Frames the viewer's demuxer on the other end of the WebSocket.
pub const MAGIC_SENTINEL: [u8; 4] = [0xDE, 0xAD, 0xBE, 0xEF];

/// How far behind schedule the loop tolerates before dropping accumulated
/// debt and resetting to "now" (§4.9 step 1).
const MAX_DEBT: Duration = Duration::from_millis(100);

/// How long since the last keyframe before one is forced (§4.9 step 5).
const KEYFRAME_INTERVAL: Duration = Duration::from_secs(60);

pub trait BroadcastSink {
    fn broadcast_video(&mut self, payload: &[u8]);
}

/// `[meta(1B)][frame][magic(4B)]`, meta bit 0 = is_keyframe.
pub fn assemble_video_frame(packet: &EncodedPacket) -> Vec<u8> {
    let meta: u8 = if packet.is_keyframe { 1 } else { 0 };
    let mut out = Vec::with_capacity(1 + packet.bytes.len() + MAGIC_SENTINEL.len());
    out.push(meta);
    out.extend_from_slice(&packet.bytes);
    out.extend_from_slice(&MAGIC_SENTINEL);
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureTick {
    /// How long the caller should have blocked on the wake semaphore
    /// before this tick fired.
    pub wait: Duration,
    pub produced_frame: bool,
    pub forced_keyframe: bool,
}

pub struct CaptureLoop {
    next_frame_time: Instant,
    frame_wait: Duration,
    last_keyframe: Instant,
}

impl CaptureLoop {
    pub fn new(frame_wait: Duration) -> Self {
        let now = Instant::now();
        CaptureLoop {
            next_frame_time: now,
            frame_wait,
            last_keyframe: now,
        }
    }

    /// Applied hot by the Supervisor on `ChangeFps`; takes effect on the
    /// schedule starting at the next tick, per §4.7.
    pub fn set_frame_wait(&mut self, frame_wait: Duration) {
        self.frame_wait = frame_wait;
    }

    pub fn frame_wait(&self) -> Duration {
        self.frame_wait
    }

    /// Steps 1 and 3 of §4.9: compute this tick's wait, unconditionally
    /// advance the schedule, and reset if the loop has fallen more than
    /// [`MAX_DEBT`] behind.
    fn advance(&mut self, now: Instant) -> Duration {
        if self.next_frame_time < now && now.duration_since(self.next_frame_time) > MAX_DEBT {
            self.next_frame_time = now;
        }
        let wait = if self.next_frame_time > now {
            self.next_frame_time - now
        } else {
            Duration::ZERO
        };
        self.next_frame_time += self.frame_wait;
        wait
    }

    fn should_force_keyframe(&self, now: Instant) -> bool {
        now.duration_since(self.last_keyframe) > KEYFRAME_INTERVAL
    }

    /// Drives one full tick: schedule, pull a frame (skipping if the
    /// source is transiently disconnected), encode, drain packets and
    /// broadcast each as a framed binary WS payload.
    pub fn tick(
        &mut self,
        now: Instant,
        pts: u64,
        source: &mut dyn FrameSource,
        encoder: &mut dyn Encoder,
        sink: &mut dyn BroadcastSink,
    ) -> Result<CaptureTick> {
        let wait = self.advance(now);

        if !source.is_connected() {
            return Ok(CaptureTick { wait, produced_frame: false, forced_keyframe: false });
        }

        let force_keyframe = self.should_force_keyframe(now);
        let (ptr, stride, width, height) = source.bits();
        // Safety: `FrameSource::bits` guarantees the pointer is valid for
        // `stride * height` bytes while `is_connected()` holds, which we
        // just checked above.
        let bgrx = unsafe { std::slice::from_raw_parts(ptr, stride as usize * height as usize) };
        let frame = Frame { width, height, stride, bgrx, pts };

        encoder.encode(&frame, force_keyframe)?;

        let mut produced_frame = false;
        while let Some(packet) = encoder.next_packet() {
            produced_frame = true;
            if packet.is_keyframe {
                self.last_keyframe = now;
            }
            sink.broadcast_video(&assemble_video_frame(&packet));
        }

        Ok(CaptureTick { wait, produced_frame, forced_keyframe: force_keyframe })
    }
}
