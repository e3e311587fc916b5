use clap::Parser;
use fpv_decode::DecodeSession;
use fpv_display::{DisplayConfig, Presenter, VsyncMode};
use fpv_types::{OverlayBuffer, PipelineError};
use log::{error, info};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Hardware-accelerated FPV ground-station video monitor.
///
/// Decodes the source with VAAPI, imports each frame into GL through EGL
/// dma-buf sharing, composites the OSD overlay, and presents in a window.
#[derive(Parser)]
#[command(name = "fpv-monitor")]
struct Cli {
    /// Video source: file path or stream URL.
    source: String,

    /// DRM render node backing the VAAPI decoder.
    #[arg(long, default_value = "/dev/dri/renderD128")]
    device: String,

    /// Initial window width.
    #[arg(long, default_value_t = 1280)]
    width: u32,

    /// Initial window height.
    #[arg(long, default_value_t = 720)]
    height: u32,

    /// Swap interval: 0 = unthrottled, 1 = vsync, 2 = half-rate vsync.
    #[arg(long, default_value_t = 0)]
    swap_interval: u32,

    /// Overlay framebuffer width.
    #[arg(long, default_value_t = 640)]
    osd_width: u32,

    /// Overlay framebuffer height.
    #[arg(long, default_value_t = 480)]
    osd_height: u32,
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    fpv_decode::init()?;

    let vsync = VsyncMode::from_interval(cli.swap_interval).ok_or_else(|| {
        PipelineError::Init(format!("invalid swap interval {}", cli.swap_interval))
    })?;

    // The OSD generator is an external component; it shares this buffer and
    // draws into it on its own schedule. Until one is attached the overlay
    // stays fully transparent.
    let overlay = Arc::new(OverlayBuffer::new(cli.osd_width, cli.osd_height));

    let mut session = DecodeSession::open(&cli.source, &cli.device)?;

    let config = DisplayConfig {
        width: cli.width,
        height: cli.height,
        vsync,
    };
    let mut presenter = Presenter::new(
        &config,
        overlay.clone(),
        Some(Box::new(|width, height| {
            info!("output resized to {width}x{height}");
        })),
    )?;

    let codec_width = session.width();
    let codec_height = session.height();

    let mut fatal = None;
    let mut frames = 0u32;
    let mut last_report = Instant::now();

    session.run(|frame| {
        // The allocated surface can be padded beyond the codec size; the
        // first frame pins the correction for the rest of the stream.
        presenter.set_frame_scale(
            codec_width as f32 / frame.width as f32,
            codec_height as f32 / frame.height as f32,
        );

        if !presenter.poll_events() {
            return false;
        }
        if let Err(e) = presenter.present(frame) {
            fatal = Some(e);
            return false;
        }

        frames += 1;
        if last_report.elapsed() >= Duration::from_secs(1) {
            info!("fps: {frames}");
            frames = 0;
            last_report = Instant::now();
        }
        true
    })?;

    match fatal {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn main() -> ExitCode {
    pretty_env_logger::init();
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
