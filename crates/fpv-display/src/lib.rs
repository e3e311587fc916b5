//! Windowed GPU presenter for the FPV pipeline.
//!
//! Imports decoded frames (as two-plane DRM-PRIME descriptors) into GL
//! textures through EGL without a CPU copy, composites the shared OSD
//! overlay on top, and presents on a window surface. One thread owns the
//! whole presenter for its lifetime.

mod config;
mod egl;
mod presenter;
mod shell;

pub use config::{DisplayConfig, VsyncMode};
pub use presenter::Presenter;
pub use shell::ResizeCallback;
