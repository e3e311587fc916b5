use std::sync::atomic::{AtomicU32, Ordering};

/// Shared on-screen-display framebuffer.
///
/// One external component draws overlay content into this buffer while the
/// presenter reads it once per frame, without any handshake. Pixels are
/// packed `0xAARRGGBB`; alpha 0 means the video shows through.
///
/// Reads and writes are `Relaxed` atomic operations on individual pixels.
/// The presenter may observe a frame that mixes old and new overlay content
/// (a torn read), which is tolerated by contract: overlay content is
/// cosmetic, and the next frame repairs it. What this buys is that the
/// presentation thread never blocks on the OSD writer, and vice versa.
pub struct OverlayBuffer {
    width: u32,
    height: u32,
    pixels: Box<[AtomicU32]>,
}

impl OverlayBuffer {
    /// Creates a fully transparent overlay.
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        let mut pixels = Vec::with_capacity(len);
        pixels.resize_with(len, || AtomicU32::new(0));
        Self {
            width,
            height,
            pixels: pixels.into_boxed_slice(),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Writes one pixel. Out-of-bounds coordinates are ignored.
    pub fn put(&self, x: u32, y: u32, argb: u32) {
        if x < self.width && y < self.height {
            let idx = y as usize * self.width as usize + x as usize;
            self.pixels[idx].store(argb, Ordering::Relaxed);
        }
    }

    /// Fills the whole overlay with one pixel value.
    pub fn fill(&self, argb: u32) {
        for px in self.pixels.iter() {
            px.store(argb, Ordering::Relaxed);
        }
    }

    /// Copies the current contents into `staging` as native-endian bytes,
    /// sized for a `width × height` RGBA8 texture upload.
    pub fn copy_into(&self, staging: &mut Vec<u8>) {
        staging.resize(self.pixels.len() * 4, 0);
        for (dst, px) in staging.chunks_exact_mut(4).zip(self.pixels.iter()) {
            dst.copy_from_slice(&px.load(Ordering::Relaxed).to_ne_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_overlay_is_transparent() {
        let osd = OverlayBuffer::new(4, 2);
        let mut staging = Vec::new();
        osd.copy_into(&mut staging);
        assert_eq!(staging.len(), 4 * 2 * 4);
        assert!(staging.iter().all(|&b| b == 0));
    }

    #[test]
    fn put_is_visible_in_the_staging_copy() {
        let osd = OverlayBuffer::new(4, 4);
        osd.put(2, 1, 0xFF11_2233);
        let mut staging = Vec::new();
        osd.copy_into(&mut staging);
        let idx = (1 * 4 + 2) * 4;
        let px = u32::from_ne_bytes(staging[idx..idx + 4].try_into().unwrap());
        assert_eq!(px, 0xFF11_2233);
    }

    #[test]
    fn out_of_bounds_put_is_ignored() {
        let osd = OverlayBuffer::new(2, 2);
        osd.put(2, 0, 0xFFFF_FFFF);
        osd.put(0, 2, 0xFFFF_FFFF);
        let mut staging = Vec::new();
        osd.copy_into(&mut staging);
        assert!(staging.iter().all(|&b| b == 0));
    }

    #[test]
    fn fill_overwrites_every_pixel() {
        let osd = OverlayBuffer::new(3, 3);
        osd.fill(0x8000_FF00);
        let mut staging = Vec::new();
        osd.copy_into(&mut staging);
        for chunk in staging.chunks_exact(4) {
            assert_eq!(u32::from_ne_bytes(chunk.try_into().unwrap()), 0x8000_FF00);
        }
    }
}
