//! Webcam attention monitor.
//!
//! Each camera frame is classified as focused or not from face landmarks
//! and blendshape scores. Looking away for longer than the configured limit
//! starts a looping penalty video and soundtrack, which stop as soon as the
//! user looks back at the screen.

pub mod app;
pub mod audio;
pub mod camera;
pub mod config;
pub mod display;
pub mod error;
pub mod face;
pub mod focus;
pub mod inference;
pub mod penalty;
pub mod timer;

#[cfg(test)]
mod test_support;

pub use error::{GuardianError, Result};
