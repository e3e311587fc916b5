//! VAAPI hardware video decoding for the FPV pipeline.
//!
//! The decode session owns an FFmpeg demuxer and a decoder bound to a VAAPI
//! device context, and turns a compressed stream into a sequence of
//! DRM-PRIME frame descriptors that the display crate imports without a CPU
//! copy.
//!
//! # Thread Safety
//! A session is not thread-safe and is driven from a single thread for the
//! lifetime of the stream. The hardware context may be shared across
//! sessions via `Arc`.

mod export;
mod hardware;
mod session;

pub use hardware::HardwareContext;
pub use session::DecodeSession;

use fpv_types::PipelineError;

/// One-time FFmpeg global initialization; call before opening a session.
pub fn init() -> Result<(), PipelineError> {
    ffmpeg_next::init().map_err(|e| PipelineError::Init(format!("ffmpeg init failed: {e}")))
}
