//! DRM-PRIME export of decoded VAAPI frames.
//!
//! A decoded frame stays GPU-resident; this module maps it to an
//! `AV_PIX_FMT_DRM_PRIME` frame and reads the resulting descriptor. The fds
//! in the descriptor belong to the mapping, so each one is dup'd into an
//! [`OwnedFd`] before the mapping is released; from then on the exported
//! frame's lifetime is independent of the decoder's surface pool.

use ffmpeg_next::ffi::{av_hwframe_map, AVHWFramesContext, AVPixelFormat};
use ffmpeg_next::format::Pixel;
use ffmpeg_next::frame;
use fpv_types::{FrameDescriptor, PipelineError, PlaneDescriptor, DRM_FORMAT_GR88, DRM_FORMAT_R8};
use std::os::fd::{BorrowedFd, OwnedFd};
use std::os::raw::c_int;

// libavutil/hwcontext.h, AVHWFrameMapFlags
const HWFRAME_MAP_READ: c_int = 1;

// Mirrors libavutil/hwcontext_drm.h. The layout is stable public ABI; the
// generated bindings do not cover this header.
const AV_DRM_MAX_PLANES: usize = 4;

#[repr(C)]
struct AVDRMObjectDescriptor {
    fd: c_int,
    size: usize,
    format_modifier: u64,
}

#[repr(C)]
struct AVDRMPlaneDescriptor {
    object_index: c_int,
    offset: isize,
    pitch: isize,
}

#[repr(C)]
struct AVDRMLayerDescriptor {
    format: u32,
    nb_planes: c_int,
    planes: [AVDRMPlaneDescriptor; AV_DRM_MAX_PLANES],
}

#[repr(C)]
struct AVDRMFrameDescriptor {
    nb_objects: c_int,
    objects: [AVDRMObjectDescriptor; AV_DRM_MAX_PLANES],
    nb_layers: c_int,
    layers: [AVDRMLayerDescriptor; AV_DRM_MAX_PLANES],
}

/// Checks an exported layer layout against the only supported format:
/// two single-plane layers, R8 luma then GR88 chroma. Anything else aborts
/// the stream rather than guessing at a conversion path.
fn validate_layers(layers: &[(u32, c_int)]) -> Result<(), PipelineError> {
    if layers.len() != 2 {
        return Err(PipelineError::Format(format!(
            "{} layers exported, expected 2 (4:2:0 two-plane)",
            layers.len()
        )));
    }
    let expected = [DRM_FORMAT_R8, DRM_FORMAT_GR88];
    for (i, &(format, nb_planes)) in layers.iter().enumerate() {
        if format != expected[i] {
            return Err(PipelineError::Format(format!(
                "layer {i} has DRM format {format:#010x}, expected {:#010x}",
                expected[i]
            )));
        }
        if nb_planes != 1 {
            return Err(PipelineError::Format(format!(
                "layer {i} has {nb_planes} planes, expected 1"
            )));
        }
    }
    Ok(())
}

fn dup_fd(fd: c_int) -> Result<OwnedFd, PipelineError> {
    unsafe { BorrowedFd::borrow_raw(fd) }
        .try_clone_to_owned()
        .map_err(|e| PipelineError::Decode(format!("failed to dup dma-buf fd: {e}")))
}

/// Exports one decoded VAAPI frame as a two-plane DRM-PRIME descriptor.
pub fn export_frame(decoded: &frame::Video) -> Result<FrameDescriptor, PipelineError> {
    if decoded.format() != Pixel::VAAPI {
        return Err(PipelineError::Format(format!(
            "decoder produced a non-VAAPI frame ({:?})",
            decoded.format()
        )));
    }

    // The allocated surface may be padded beyond the display size; EGL needs
    // the allocated dimensions, which live in the frames context.
    let (surface_width, surface_height) = unsafe {
        let frames_ref = (*decoded.as_ptr()).hw_frames_ctx;
        if frames_ref.is_null() {
            return Err(PipelineError::Decode(
                "decoded frame has no hardware frames context".into(),
            ));
        }
        let frames_ctx = (*frames_ref).data as *const AVHWFramesContext;
        ((*frames_ctx).width as u32, (*frames_ctx).height as u32)
    };

    let mut mapped = frame::Video::empty();
    unsafe {
        (*mapped.as_mut_ptr()).format = AVPixelFormat::AV_PIX_FMT_DRM_PRIME as c_int;
        if av_hwframe_map(mapped.as_mut_ptr(), decoded.as_ptr(), HWFRAME_MAP_READ) < 0 {
            return Err(PipelineError::Decode(
                "failed to map VAAPI surface to DRM-PRIME".into(),
            ));
        }
    }

    // `mapped` owns the descriptor and its fds until it drops at the end of
    // this function; everything handed out is dup'd first.
    let desc = unsafe { &*((*mapped.as_ptr()).data[0] as *const AVDRMFrameDescriptor) };

    let layers: Vec<(u32, c_int)> = desc.layers[..desc.nb_layers as usize]
        .iter()
        .map(|layer| (layer.format, layer.nb_planes))
        .collect();
    validate_layers(&layers)?;

    let build_plane = |layer: &AVDRMLayerDescriptor,
                       width: u32,
                       height: u32|
     -> Result<PlaneDescriptor, PipelineError> {
        let plane = &layer.planes[0];
        let object = &desc.objects[plane.object_index as usize];
        Ok(PlaneDescriptor {
            drm_format: layer.format,
            width,
            height,
            fd: dup_fd(object.fd)?,
            offset: plane.offset as u32,
            stride: plane.pitch as u32,
        })
    };

    let luma = build_plane(&desc.layers[0], surface_width, surface_height)?;
    // half size for chroma (4:2:0)
    let chroma = build_plane(&desc.layers[1], surface_width / 2, surface_height / 2)?;

    Ok(FrameDescriptor {
        width: surface_width,
        height: surface_height,
        luma,
        chroma,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nv12_layout_is_accepted() {
        assert!(validate_layers(&[(DRM_FORMAT_R8, 1), (DRM_FORMAT_GR88, 1)]).is_ok());
    }

    #[test]
    fn wrong_layer_count_is_rejected() {
        let err = validate_layers(&[(DRM_FORMAT_R8, 1)]).unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
        let err = validate_layers(&[
            (DRM_FORMAT_R8, 1),
            (DRM_FORMAT_GR88, 1),
            (DRM_FORMAT_GR88, 1),
        ])
        .unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }

    #[test]
    fn swapped_plane_order_is_rejected() {
        let err = validate_layers(&[(DRM_FORMAT_GR88, 1), (DRM_FORMAT_R8, 1)]).unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }

    #[test]
    fn multi_plane_layers_are_rejected() {
        let err = validate_layers(&[(DRM_FORMAT_R8, 1), (DRM_FORMAT_GR88, 2)]).unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
    }
}
