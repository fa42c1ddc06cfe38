//! framing-io: Frame buffers and the photo capture sink.
//!
//! Camera and display I/O live outside the workspace; this crate only holds
//! what the agent needs to pass frames around and save the photos it takes.

pub mod capture;
pub mod frame;

pub use capture::{CaptureError, CaptureSink, DirectoryCapturer, PhotoFormat};
pub use frame::{Frame, FrameError, PixelLayout};
