use ffmpeg_next::ffi::{av_buffer_unref, av_hwdevice_ctx_create, AVBufferRef, AVHWDeviceType};
use fpv_types::PipelineError;
use std::ffi::CString;
use std::ptr::null_mut;
use std::sync::Arc;

/// RAII wrapper for the FFmpeg VAAPI device context.
///
/// Created from a DRM render node path and unref'd on drop. The decoder
/// context takes its own reference, so dropping this wrapper never pulls the
/// device out from under an open decoder.
pub struct HardwareContext {
    ctx: *mut AVBufferRef,
}

impl HardwareContext {
    /// Opens the VAAPI device behind the given DRM render node.
    pub fn new(device: &str) -> Result<Arc<Self>, PipelineError> {
        let node = CString::new(device)
            .map_err(|_| PipelineError::Init(format!("invalid device path: {device:?}")))?;
        let mut hw_device_ctx = null_mut();

        unsafe {
            if av_hwdevice_ctx_create(
                &mut hw_device_ctx,
                AVHWDeviceType::AV_HWDEVICE_TYPE_VAAPI,
                node.as_ptr(),
                null_mut(),
                0,
            ) < 0
            {
                return Err(PipelineError::Init(format!(
                    "failed to open VAAPI device {device}"
                )));
            }
        }

        Ok(Arc::new(Self { ctx: hw_device_ctx }))
    }

    pub fn as_ptr(&self) -> *mut AVBufferRef {
        self.ctx
    }
}

impl Drop for HardwareContext {
    fn drop(&mut self) {
        unsafe {
            if !self.ctx.is_null() {
                av_buffer_unref(&mut self.ctx);
            }
        }
    }
}

unsafe impl Send for HardwareContext {}
unsafe impl Sync for HardwareContext {}
