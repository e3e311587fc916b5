use std::os::fd::OwnedFd;

/// DRM fourcc for a single-channel 8-bit plane (luma).
pub const DRM_FORMAT_R8: u32 = u32::from_le_bytes(*b"R8  ");

/// DRM fourcc for a two-channel 8-bit plane (interleaved chroma).
pub const DRM_FORMAT_GR88: u32 = u32::from_le_bytes(*b"GR88");

/// One plane of an exported frame, importable as an EGL dma-buf image.
///
/// The fd is owned: it is closed exactly once, when the descriptor is
/// dropped, on success and error paths alike. Descriptors are move-only so a
/// plane can never be imported twice from two copies of the same fd.
#[derive(Debug)]
pub struct PlaneDescriptor {
    /// DRM fourcc describing the plane's pixel layout.
    pub drm_format: u32,
    pub width: u32,
    pub height: u32,
    pub fd: OwnedFd,
    /// Byte offset of the plane within the buffer behind `fd`.
    pub offset: u32,
    /// Row pitch in bytes.
    pub stride: u32,
}

/// A decoded frame exported from the hardware decoder.
///
/// Exactly two planes, enforced by construction: plane 0 is single-channel
/// luma ([`DRM_FORMAT_R8`]), plane 1 is two-channel chroma at half resolution
/// in both dimensions ([`DRM_FORMAT_GR88`], 4:2:0). `width`/`height` are the
/// allocated surface dimensions, which may be padded beyond the codec's
/// display size; the presenter corrects for the difference with a texture
/// coordinate scale.
#[derive(Debug)]
pub struct FrameDescriptor {
    pub width: u32,
    pub height: u32,
    pub luma: PlaneDescriptor,
    pub chroma: PlaneDescriptor,
}

impl FrameDescriptor {
    /// Planes in import order: luma, then chroma.
    pub fn planes(&self) -> [&PlaneDescriptor; 2] {
        [&self.luma, &self.chroma]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::os::fd::{AsRawFd, BorrowedFd, RawFd};

    fn dummy_fd() -> OwnedFd {
        File::open("/dev/null").expect("open /dev/null").into()
    }

    fn plane(drm_format: u32, width: u32, height: u32) -> PlaneDescriptor {
        PlaneDescriptor {
            drm_format,
            width,
            height,
            fd: dummy_fd(),
            offset: 0,
            stride: width,
        }
    }

    fn fd_is_open(fd: RawFd) -> bool {
        // Duplicating a closed fd fails with EBADF.
        unsafe { BorrowedFd::borrow_raw(fd) }.try_clone_to_owned().is_ok()
    }

    #[test]
    fn fourcc_values_match_drm_headers() {
        assert_eq!(DRM_FORMAT_R8, 0x2020_3852);
        assert_eq!(DRM_FORMAT_GR88, 0x3838_5247);
    }

    #[test]
    fn planes_are_ordered_luma_then_chroma() {
        let frame = FrameDescriptor {
            width: 1920,
            height: 1088,
            luma: plane(DRM_FORMAT_R8, 1920, 1088),
            chroma: plane(DRM_FORMAT_GR88, 960, 544),
        };
        let [luma, chroma] = frame.planes();
        assert_eq!(luma.drm_format, DRM_FORMAT_R8);
        assert_eq!(chroma.drm_format, DRM_FORMAT_GR88);
        assert_eq!(chroma.width, luma.width / 2);
        assert_eq!(chroma.height, luma.height / 2);
    }

    #[test]
    fn dropping_a_descriptor_closes_both_fds_once() {
        let frame = FrameDescriptor {
            width: 64,
            height: 64,
            luma: plane(DRM_FORMAT_R8, 64, 64),
            chroma: plane(DRM_FORMAT_GR88, 32, 32),
        };
        let luma_fd = frame.luma.fd.as_raw_fd();
        let chroma_fd = frame.chroma.fd.as_raw_fd();
        assert!(fd_is_open(luma_fd));
        assert!(fd_is_open(chroma_fd));

        drop(frame);
        assert!(!fd_is_open(luma_fd));
        assert!(!fd_is_open(chroma_fd));
    }
}
