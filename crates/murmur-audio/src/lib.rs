//! Microphone capture for murmur.
//!
//! [`AudioInput`] abstracts the device layer; [`CpalInput`] talks to the OS
//! default input device and converts whatever format it delivers into mono
//! samples at [`SAMPLE_RATE`]. [`CaptureSession`] buffers those samples
//! between push-to-talk presses.

pub mod capture;
pub mod input;
pub mod level;

pub use capture::{CaptureSession, LevelFn};
pub use input::{AudioInput, ChunkFn, CpalInput, MockInput};
pub use level::{meter_level, rms, METER_GAIN};
pub use murmur_core::SAMPLE_RATE;
