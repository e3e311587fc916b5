use crate::export;
use crate::hardware::HardwareContext;
use ffmpeg_next::codec::Context;
use ffmpeg_next::ffi::{av_buffer_ref, AVCodecContext, AVPixelFormat};
use ffmpeg_next::{codec, format, frame, media, Error, Packet};
use fpv_types::{FrameDescriptor, PipelineError};
use std::sync::Arc;

/// Output pixel format negotiation callback. We don't negotiate: the
/// pipeline is hardware-only, so the session picks the VAAPI surface format
/// when offered and refuses otherwise. No state is shared with the decoder.
extern "C" fn hw_pixel_format(
    _ctx: *mut AVCodecContext,
    pix_fmts: *const AVPixelFormat,
) -> AVPixelFormat {
    let mut i = 0;
    unsafe {
        loop {
            let format = *pix_fmts.offset(i);
            if format == AVPixelFormat::AV_PIX_FMT_NONE {
                break;
            }
            if format == AVPixelFormat::AV_PIX_FMT_VAAPI {
                return format;
            }
            i += 1;
        }
    }
    AVPixelFormat::AV_PIX_FMT_NONE
}

/// Turns a compressed stream into a sequence of GPU-importable frame
/// descriptors.
///
/// Packet feeding and frame retrieval are interleaved one step at a time:
/// the decoder's internal buffering is opaque and bounded, so `EAGAIN` from
/// frame retrieval triggers feeding exactly one more packet rather than a
/// blocking batch call. At most one decoded surface is held between retrieve
/// and export.
pub struct DecodeSession {
    // The decoder context holds its own reference; this one pins the device
    // for the session's whole lifetime regardless of decoder teardown order.
    _hardware: Arc<HardwareContext>,
    decoder: codec::decoder::Video,
    input: format::context::Input,
    stream_index: usize,
    eof_sent: bool,
}

impl DecodeSession {
    /// Opens the input, selects the best video stream, and binds a decoder
    /// to the VAAPI device behind `device`.
    ///
    /// Fails with [`PipelineError::Init`] if the device, input, stream, or
    /// decoder cannot be set up; partially acquired FFmpeg objects are
    /// released by their owners on the error path.
    pub fn open(source: &str, device: &str) -> Result<Self, PipelineError> {
        let hardware = HardwareContext::new(device)?;

        let input = format::input(&source)
            .map_err(|e| PipelineError::Init(format!("failed to open {source}: {e}")))?;

        let (stream_index, parameters) = {
            let stream = input
                .streams()
                .best(media::Type::Video)
                .ok_or_else(|| PipelineError::Init("no video stream found".into()))?;
            (stream.index(), stream.parameters())
        };

        let mut decoder_context = Context::from_parameters(parameters)
            .map_err(|e| PipelineError::Init(format!("failed to create decoder context: {e}")))?;

        unsafe {
            let ptr = decoder_context.as_mut_ptr();
            (*ptr).get_format = Some(hw_pixel_format);
            let hw_ref = av_buffer_ref(hardware.as_ptr());
            if hw_ref.is_null() {
                return Err(PipelineError::Init(
                    "failed to reference hardware device context".into(),
                ));
            }
            (*ptr).hw_device_ctx = hw_ref;
        }

        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|e| PipelineError::Init(format!("failed to open decoder: {e}")))?;

        log::info!(
            "opened video stream {}: {}x{}",
            stream_index,
            decoder.width(),
            decoder.height()
        );

        Ok(Self {
            _hardware: hardware,
            decoder,
            input,
            stream_index,
            eof_sent: false,
        })
    }

    /// Codec-reported frame width (may be smaller than the allocated
    /// surface width).
    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    /// Codec-reported frame height.
    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// Drives the decode loop, handing each exported frame to `consumer`.
    ///
    /// The consumer owns the descriptor and closes its fds when it drops it,
    /// before the loop requests the next frame. Returning `false` stops the
    /// loop cleanly. `Ok(())` means the consumer stopped or the stream
    /// drained to its end; errors are fatal for the session.
    pub fn run<F>(&mut self, mut consumer: F) -> Result<(), PipelineError>
    where
        F: FnMut(FrameDescriptor) -> bool,
    {
        while let Some(result) = self.next_frame() {
            let decoded = result?;
            let exported = export::export_frame(&decoded)?;
            if !consumer(exported) {
                log::debug!("consumer stopped the decode loop");
                return Ok(());
            }
        }
        log::info!("end of stream, decoder drained");
        Ok(())
    }

    /// Retrieves one decoded frame, feeding packets on demand. `None` means
    /// the stream is fully drained.
    fn next_frame(&mut self) -> Option<Result<frame::Video, PipelineError>> {
        let mut decoded = frame::Video::empty();
        loop {
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return Some(Ok(decoded)),
                Err(Error::Other { errno }) if errno == libc::EAGAIN => {
                    if self.eof_sent {
                        // Nothing buffered and nothing left to feed.
                        return None;
                    }
                    match self.next_video_packet() {
                        Some(Ok(packet)) => {
                            if let Err(e) = self.decoder.send_packet(&packet) {
                                return Some(Err(PipelineError::Decode(e.to_string())));
                            }
                        }
                        Some(Err(e)) => return Some(Err(e)),
                        // Demuxer exhausted: EOF was signalled to the
                        // decoder, keep draining buffered frames.
                        None => {}
                    }
                }
                Err(Error::Eof) => return None,
                Err(e) => return Some(Err(PipelineError::Decode(e.to_string()))),
            }
        }
    }

    /// Reads the next packet belonging to the selected stream. On demuxer
    /// exhaustion, signals EOF to the decoder (once) and returns `None`;
    /// end of input is not an error.
    fn next_video_packet(&mut self) -> Option<Result<Packet, PipelineError>> {
        loop {
            match self.input.packets().next() {
                Some((stream, packet)) => {
                    if stream.index() == self.stream_index {
                        return Some(Ok(packet));
                    }
                }
                None => {
                    if let Err(e) = self.decoder.send_eof() {
                        return Some(Err(PipelineError::Decode(e.to_string())));
                    }
                    self.eof_sent = true;
                    return None;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::null_mut;

    #[test]
    fn format_callback_picks_vaapi_when_offered() {
        let offered = [
            AVPixelFormat::AV_PIX_FMT_YUV420P,
            AVPixelFormat::AV_PIX_FMT_VAAPI,
            AVPixelFormat::AV_PIX_FMT_NV12,
            AVPixelFormat::AV_PIX_FMT_NONE,
        ];
        assert_eq!(
            hw_pixel_format(null_mut(), offered.as_ptr()),
            AVPixelFormat::AV_PIX_FMT_VAAPI
        );
    }

    #[test]
    fn format_callback_refuses_software_only_lists() {
        let offered = [
            AVPixelFormat::AV_PIX_FMT_YUV420P,
            AVPixelFormat::AV_PIX_FMT_NV12,
            AVPixelFormat::AV_PIX_FMT_NONE,
        ];
        assert_eq!(
            hw_pixel_format(null_mut(), offered.as_ptr()),
            AVPixelFormat::AV_PIX_FMT_NONE
        );
    }

    #[test]
    fn open_reports_init_error_for_missing_input() {
        ffmpeg_next::init().expect("ffmpeg init");
        let result = DecodeSession::open("/nonexistent/stream.mp4", "/dev/dri/renderD128");
        assert!(matches!(result, Err(PipelineError::Init(_))));
    }

    #[test]
    #[ignore = "requires a VAAPI render node and a decodable test stream"]
    fn decodes_and_exports_frames() {
        ffmpeg_next::init().expect("ffmpeg init");
        let source = std::env::var("FPV_TEST_STREAM").expect("FPV_TEST_STREAM not set");
        let mut session =
            DecodeSession::open(&source, "/dev/dri/renderD128").expect("failed to open session");
        assert!(session.width() > 0);
        assert!(session.height() > 0);

        let mut frames = 0u32;
        session
            .run(|frame| {
                assert_eq!(frame.luma.width, frame.width);
                assert_eq!(frame.chroma.width, frame.width / 2);
                frames += 1;
                frames < 10
            })
            .expect("decode loop failed");
        assert!(frames > 0, "no frames were decoded");
    }
}
