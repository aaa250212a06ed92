//! Framebuffer acquisition, colour conversion and encode scheduling
//! (§4.1–§4.3): the capture thread's whole world.

pub mod encoder;
pub mod frame;
pub mod loop_;

pub use encoder::{Codec, EncodedPacket, Encoder, PlanarEncoder};
pub use frame::{Frame, FrameSource, SyntheticFrameSource};
pub use loop_::{CaptureLoop, CaptureTick};
