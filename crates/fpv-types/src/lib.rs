//! Shared value types for the FPV ground-station pipeline.
//!
//! This crate is deliberately free of FFmpeg and GL dependencies so that the
//! decode and display crates only meet through plain data: the exported frame
//! descriptor, the shared overlay framebuffer, and the error taxonomy.

mod error;
mod frame;
mod overlay;

pub use error::PipelineError;
pub use frame::{FrameDescriptor, PlaneDescriptor, DRM_FORMAT_GR88, DRM_FORMAT_R8};
pub use overlay::OverlayBuffer;
