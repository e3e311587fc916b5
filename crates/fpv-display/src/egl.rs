//! EGL dma-buf image import.
//!
//! The extension entry points (`EGL_KHR_image_base`, `EGL_EXT_image_dma_buf_import`,
//! `GL_OES_EGL_image`) are not part of any loader-generated binding, so they
//! are looked up once through `eglGetProcAddress` at init and kept as typed
//! function pointers.

use fpv_types::{PipelineError, PlaneDescriptor};
use glow::HasContext;
use glutin::display::{AsRawDisplay, Display, GlDisplay, RawDisplay};
use std::ffi::CString;
use std::mem;
use std::os::fd::AsRawFd;
use std::os::raw::{c_uint, c_void};
use std::ptr::null_mut;

// EGL/eglext.h
const EGL_LINUX_DMA_BUF_EXT: c_uint = 0x3270;
const EGL_LINUX_DRM_FOURCC_EXT: i32 = 0x3271;
const EGL_DMA_BUF_PLANE0_FD_EXT: i32 = 0x3272;
const EGL_DMA_BUF_PLANE0_OFFSET_EXT: i32 = 0x3273;
const EGL_DMA_BUF_PLANE0_PITCH_EXT: i32 = 0x3274;
const EGL_WIDTH: i32 = 0x3057;
const EGL_HEIGHT: i32 = 0x3056;
const EGL_NONE: i32 = 0x3038;

type EglCreateImageKhr = unsafe extern "C" fn(
    display: *mut c_void,
    context: *mut c_void,
    target: c_uint,
    buffer: *mut c_void,
    attrib_list: *const i32,
) -> *mut c_void;
type EglDestroyImageKhr = unsafe extern "C" fn(display: *mut c_void, image: *mut c_void) -> c_uint;
type GlEglImageTargetTexture2dOes = unsafe extern "C" fn(target: c_uint, image: *mut c_void);

/// Builds the attribute list describing one dma-buf plane to
/// `eglCreateImageKHR`.
fn dma_buf_attribs(plane: &PlaneDescriptor) -> [i32; 13] {
    [
        EGL_LINUX_DRM_FOURCC_EXT,
        plane.drm_format as i32,
        EGL_WIDTH,
        plane.width as i32,
        EGL_HEIGHT,
        plane.height as i32,
        EGL_DMA_BUF_PLANE0_FD_EXT,
        plane.fd.as_raw_fd(),
        EGL_DMA_BUF_PLANE0_OFFSET_EXT,
        plane.offset as i32,
        EGL_DMA_BUF_PLANE0_PITCH_EXT,
        plane.stride as i32,
        EGL_NONE,
    ]
}

/// Looked-up extension entry points, bound to one EGL display.
pub struct EglDmaBufImport {
    egl_display: *mut c_void,
    create_image: EglCreateImageKhr,
    destroy_image: EglDestroyImageKhr,
    image_target_texture_2d: GlEglImageTargetTexture2dOes,
}

impl EglDmaBufImport {
    pub fn load(display: &Display) -> Result<Self, PipelineError> {
        let egl_display = match display.raw_display() {
            RawDisplay::Egl(ptr) => ptr as *mut c_void,
            _ => {
                return Err(PipelineError::Init(
                    "dma-buf import requires an EGL display".into(),
                ))
            }
        };

        unsafe {
            Ok(Self {
                egl_display,
                create_image: mem::transmute::<*const c_void, EglCreateImageKhr>(lookup(
                    display,
                    "eglCreateImageKHR",
                )?),
                destroy_image: mem::transmute::<*const c_void, EglDestroyImageKhr>(lookup(
                    display,
                    "eglDestroyImageKHR",
                )?),
                image_target_texture_2d: mem::transmute::<*const c_void, GlEglImageTargetTexture2dOes>(
                    lookup(display, "glEGLImageTargetTexture2DOES")?,
                ),
            })
        }
    }

    /// Wraps one exported plane as an EGL image.
    ///
    /// The returned image borrows the importer and is destroyed on drop, so
    /// it cannot outlive the display connection and is never cached across
    /// frames.
    pub fn import_plane(&self, plane: &PlaneDescriptor) -> Result<PlaneImage<'_>, PipelineError> {
        let attribs = dma_buf_attribs(plane);
        let image = unsafe {
            (self.create_image)(
                self.egl_display,
                null_mut(), // EGL_NO_CONTEXT
                EGL_LINUX_DMA_BUF_EXT,
                null_mut(),
                attribs.as_ptr(),
            )
        };
        if image.is_null() {
            return Err(PipelineError::Present(format!(
                "eglCreateImageKHR failed for DRM format {:#010x}",
                plane.drm_format
            )));
        }
        Ok(PlaneImage {
            importer: self,
            image,
        })
    }
}

/// A transient EGL image over one dma-buf plane.
///
/// The hardware decoder recycles its surfaces, so an image is only valid for
/// the frame it was created for; drop destroys it within the same `present`
/// call.
pub struct PlaneImage<'a> {
    importer: &'a EglDmaBufImport,
    image: *mut c_void,
}

impl PlaneImage<'_> {
    /// Attaches the image as the backing store of the currently bound 2D
    /// texture.
    pub fn bind_to_current_texture(&self, gl: &glow::Context) -> Result<(), PipelineError> {
        unsafe {
            while gl.get_error() != glow::NO_ERROR {}
            (self.importer.image_target_texture_2d)(glow::TEXTURE_2D, self.image);
            if gl.get_error() != glow::NO_ERROR {
                return Err(PipelineError::Present(
                    "failed to attach dma-buf image to texture".into(),
                ));
            }
        }
        Ok(())
    }
}

impl Drop for PlaneImage<'_> {
    fn drop(&mut self) {
        unsafe {
            (self.importer.destroy_image)(self.importer.egl_display, self.image);
        }
    }
}

fn lookup(display: &Display, name: &str) -> Result<*const c_void, PipelineError> {
    let symbol = CString::new(name)
        .map_err(|_| PipelineError::Init(format!("invalid symbol name {name:?}")))?;
    let ptr = display.get_proc_address(symbol.as_c_str());
    if ptr.is_null() {
        return Err(PipelineError::Init(format!(
            "missing EGL/GL extension function {name}"
        )));
    }
    Ok(ptr)
}

#[cfg(test)]
mod tests {
    use super::*;
    use fpv_types::DRM_FORMAT_R8;
    use std::fs::File;

    #[test]
    fn attribute_list_describes_the_plane() {
        let fd: std::os::fd::OwnedFd = File::open("/dev/null").expect("open /dev/null").into();
        let raw = fd.as_raw_fd();
        let plane = PlaneDescriptor {
            drm_format: DRM_FORMAT_R8,
            width: 1920,
            height: 1088,
            fd,
            offset: 0,
            stride: 2048,
        };
        let attribs = dma_buf_attribs(&plane);
        assert_eq!(attribs[0], EGL_LINUX_DRM_FOURCC_EXT);
        assert_eq!(attribs[1], DRM_FORMAT_R8 as i32);
        assert_eq!(attribs[2..4], [EGL_WIDTH, 1920]);
        assert_eq!(attribs[4..6], [EGL_HEIGHT, 1088]);
        assert_eq!(attribs[6..8], [EGL_DMA_BUF_PLANE0_FD_EXT, raw]);
        assert_eq!(attribs[8..10], [EGL_DMA_BUF_PLANE0_OFFSET_EXT, 0]);
        assert_eq!(attribs[10..12], [EGL_DMA_BUF_PLANE0_PITCH_EXT, 2048]);
        assert_eq!(attribs[12], EGL_NONE);
    }
}
