//! The `Encoder` contract (§4.2): a black-box compressor (vp8/vp9) that a
//! real backend (e.g. an FFI binding to libvpx) sits behind. This module
//! owns the one piece of the contract that is a pure numeric spec rather
//! than an external black box: BGRX -> I420 (BT.601, limited range)
//! colour conversion and 4:2:0 chroma subsampling.

use crate::capture::frame::Frame;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    Vp8,
    Vp9,
}

impl Codec {
    pub fn tag(self) -> &'static str {
        match self {
            Codec::Vp8 => "vp8",
            Codec::Vp9 => "vp9",
        }
    }

    pub fn parse(tag: &str) -> Result<Codec> {
        match tag {
            "vp8" => Ok(Codec::Vp8),
            "vp9" => Ok(Codec::Vp9),
            other => Err(Error::UnsupportedCodec(other.to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EncodedPacket {
    pub bytes: Vec<u8>,
    pub is_keyframe: bool,
    pub pts: u64,
}

/// Configure/encode/iterate-packets contract. Owned exclusively by the
/// capture thread while streaming; `set_bitrate` is the one call the
/// supervisor thread is allowed to post (between ticks, never
/// concurrently with `encode`).
pub trait Encoder: Send {
    fn configure(&mut self, width: u32, height: u32, kbps: u32, codec: Codec) -> Result<()>;
    fn set_bitrate(&mut self, kbps: u32);
    fn encode(&mut self, frame: &Frame, force_keyframe: bool) -> Result<()>;
    fn next_packet(&mut self) -> Option<EncodedPacket>;
}

/// BT.601 limited-range planar I420 buffer: a full-resolution Y plane and
/// half-resolution, even-row/even-column-sampled U and V planes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct I420 {
    pub width: u32,
    pub height: u32,
    pub y: Vec<u8>,
    pub u: Vec<u8>,
    pub v: Vec<u8>,
}

impl I420 {
    pub fn chroma_width(width: u32) -> u32 {
        (width + 1) / 2
    }

    pub fn chroma_height(height: u32) -> u32 {
        (height + 1) / 2
    }
}

/// The integer formula from §4.2, applied to one BGRX pixel.
pub fn bt601_y(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((66 * r + 129 * g + 25 * b + 128) >> 8) + 16).clamp(0, 255) as u8
}

pub fn bt601_u(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((-38 * r - 74 * g + 112 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

pub fn bt601_v(r: u8, g: u8, b: u8) -> u8 {
    let (r, g, b) = (r as i32, g as i32, b as i32);
    (((112 * r - 94 * g - 18 * b + 128) >> 8) + 128).clamp(0, 255) as u8
}

/// Floating-point restatement of the same transform, used only to bound
/// the integer formula's rounding error in tests (≤1 LSB per §8).
fn bt601_y_reference(r: u8, g: u8, b: u8) -> f64 {
    16.0 + (66.0 * r as f64 + 129.0 * g as f64 + 25.0 * b as f64) / 256.0
}

fn bt601_u_reference(r: u8, g: u8, b: u8) -> f64 {
    128.0 + (-38.0 * r as f64 - 74.0 * g as f64 + 112.0 * b as f64) / 256.0
}

fn bt601_v_reference(r: u8, g: u8, b: u8) -> f64 {
    128.0 + (112.0 * r as f64 - 94.0 * g as f64 - 18.0 * b as f64) / 256.0
}

/// Converts one interleaved 32-bit-per-pixel BGRX frame to I420. `stride`
/// is bytes-per-row and may exceed `width * 4` (row padding).
pub fn bgrx_to_i420(width: u32, height: u32, stride: u32, bgrx: &[u8]) -> I420 {
    let cw = I420::chroma_width(width) as usize;
    let ch = I420::chroma_height(height) as usize;
    let mut y_plane = vec![0u8; (width as usize) * (height as usize)];
    let mut u_plane = vec![0u8; cw * ch];
    let mut v_plane = vec![0u8; cw * ch];

    for row in 0..height as usize {
        let row_start = row * stride as usize;
        for col in 0..width as usize {
            let px = row_start + col * 4;
            let (b, g, r) = (bgrx[px], bgrx[px + 1], bgrx[px + 2]);
            y_plane[row * width as usize + col] = bt601_y(r, g, b);

            if row % 2 == 0 && col % 2 == 0 {
                let cy = row / 2;
                let cx = col / 2;
                u_plane[cy * cw + cx] = bt601_u(r, g, b);
                v_plane[cy * cw + cx] = bt601_v(r, g, b);
            }
        }
    }

    I420 {
        width,
        height,
        y: y_plane,
        u: u_plane,
        v: v_plane,
    }
}

/// A frame-accurate stand-in for a real video codec: it performs the BGRX
/// -> I420 conversion faithfully and emits one packet per `encode` call
/// whose payload is the raw I420 planes, tagged keyframe/non-keyframe as
/// requested. A real backend (libvpx et al.) implements the same
/// `Encoder` trait behind an FFI boundary; this implementation exists so
/// the pipeline is exercisable without one.
pub struct PlanarEncoder {
    width: u32,
    height: u32,
    kbps: u32,
    codec: Option<Codec>,
    pending: std::collections::VecDeque<EncodedPacket>,
}

impl PlanarEncoder {
    pub fn new() -> Self {
        PlanarEncoder {
            width: 0,
            height: 0,
            kbps: 0,
            codec: None,
            pending: std::collections::VecDeque::new(),
        }
    }
}

impl Default for PlanarEncoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Encoder for PlanarEncoder {
    fn configure(&mut self, width: u32, height: u32, kbps: u32, codec: Codec) -> Result<()> {
        // Idempotent: tearing down previous state means simply dropping
        // whatever packets hadn't been drained yet.
        self.pending.clear();
        self.width = width;
        self.height = height;
        self.kbps = kbps;
        self.codec = Some(codec);
        Ok(())
    }

    fn set_bitrate(&mut self, kbps: u32) {
        self.kbps = kbps;
    }

    fn encode(&mut self, frame: &Frame, force_keyframe: bool) -> Result<()> {
        if self.codec.is_none() {
            return Err(Error::EncoderConfigure("encode called before configure".into()));
        }
        let i420 = bgrx_to_i420(frame.width, frame.height, frame.stride, frame.bgrx);
        let mut bytes = Vec::with_capacity(i420.y.len() + i420.u.len() + i420.v.len());
        bytes.extend_from_slice(&i420.y);
        bytes.extend_from_slice(&i420.u);
        bytes.extend_from_slice(&i420.v);
        self.pending.push_back(EncodedPacket {
            bytes,
            is_keyframe: force_keyframe,
            pts: frame.pts,
        });
        Ok(())
    }

    fn next_packet(&mut self) -> Option<EncodedPacket> {
        self.pending.pop_front()
    }
}
