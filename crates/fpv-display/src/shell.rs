use crate::config::{DisplayConfig, VsyncMode};
use fpv_types::PipelineError;
use glow::HasContext;
use glutin::config::ConfigTemplateBuilder;
use glutin::context::{ContextApi, ContextAttributesBuilder, GlProfile, PossiblyCurrentContext, Version};
use glutin::display::{Display, GetGlDisplay};
use glutin::prelude::*;
use glutin::surface::{Surface, SurfaceAttributesBuilder, SwapInterval, WindowSurface};
use glutin_winit::{ApiPreference, DisplayBuilder, GlWindow};
use raw_window_handle::HasRawWindowHandle;
use std::ffi::CString;
use std::num::NonZeroU32;
use std::os::raw::c_void;
use std::time::Duration;
use winit::dpi::LogicalSize;
use winit::event::{ElementState, Event, WindowEvent};
use winit::event_loop::EventLoop;
use winit::keyboard::{Key, NamedKey};
use winit::platform::pump_events::EventLoopExtPumpEvents;
use winit::window::Window;

/// Invoked with the new logical width/height after a window resize.
pub type ResizeCallback = Box<dyn FnMut(u32, u32)>;

struct ShellState {
    width: u32,
    height: u32,
    running: bool,
    pending_resize: Option<(u32, u32)>,
    resize_cb: Option<ResizeCallback>,
}

impl ShellState {
    fn handle_window_event(&mut self, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                self.running = false;
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state == ElementState::Pressed {
                    match event.logical_key {
                        Key::Named(NamedKey::Escape) => self.running = false,
                        Key::Character(c) if c == "q" => self.running = false,
                        _ => {}
                    }
                }
            }
            WindowEvent::Resized(size) => {
                self.width = size.width;
                self.height = size.height;
                self.pending_resize = Some((size.width, size.height));
                if let Some(cb) = self.resize_cb.as_mut() {
                    cb(size.width, size.height);
                }
            }
            _ => {}
        }
    }
}

/// Owns the native window, the EGL surface/context, and the GL bindings.
///
/// Field order matters: the context must be torn down before the surface,
/// the surface before the window, and the window before the event loop.
pub struct WindowShell {
    gl: glow::Context,
    context: PossiblyCurrentContext,
    surface: Surface<WindowSurface>,
    window: Window,
    state: ShellState,
    event_loop: EventLoop<()>,
}

impl WindowShell {
    /// Creates the window and an OpenGL 3.3 core context over EGL.
    ///
    /// EGL is requested explicitly because the dma-buf image import path
    /// does not exist under GLX.
    pub fn new(
        config: &DisplayConfig,
        resize_cb: Option<ResizeCallback>,
    ) -> Result<Self, PipelineError> {
        let event_loop = EventLoop::new()
            .map_err(|e| PipelineError::Init(format!("failed to create event loop: {e}")))?;

        let window_builder = winit::window::WindowBuilder::new()
            .with_title("FPV Monitor")
            .with_inner_size(LogicalSize::new(config.width as f64, config.height as f64));

        let template = ConfigTemplateBuilder::new().with_alpha_size(8);

        let display_builder = DisplayBuilder::new()
            .with_preference(ApiPreference::PreferEgl)
            .with_window_builder(Some(window_builder));
        let (window_opt, gl_config) = display_builder
            .build(&event_loop, template, |mut configs| {
                configs.next().expect("no matching GL framebuffer config")
            })
            .map_err(|e| PipelineError::Init(format!("failed to create window: {e}")))?;
        let window = window_opt
            .ok_or_else(|| PipelineError::Init("window creation returned no window".into()))?;

        let raw_window_handle = window.raw_window_handle();
        let gl_display = gl_config.display();

        let context_attributes = ContextAttributesBuilder::new()
            .with_profile(GlProfile::Core)
            .with_context_api(ContextApi::OpenGl(Some(Version::new(3, 3))))
            .build(Some(raw_window_handle));
        let not_current = unsafe { gl_display.create_context(&gl_config, &context_attributes) }
            .map_err(|e| PipelineError::Init(format!("failed to create GL context: {e}")))?;

        let attrs =
            window.build_surface_attributes(SurfaceAttributesBuilder::<WindowSurface>::new());
        let surface = unsafe { gl_display.create_window_surface(&gl_config, &attrs) }
            .map_err(|e| PipelineError::Init(format!("failed to create window surface: {e}")))?;

        let context = not_current
            .make_current(&surface)
            .map_err(|e| PipelineError::Init(format!("failed to make GL context current: {e}")))?;

        let interval = match config.vsync {
            VsyncMode::Unthrottled => SwapInterval::DontWait,
            VsyncMode::Full => SwapInterval::Wait(NonZeroU32::MIN),
            VsyncMode::Half => SwapInterval::Wait(NonZeroU32::MIN.saturating_add(1)),
        };
        if let Err(e) = surface.set_swap_interval(&context, interval) {
            log::warn!("failed to set swap interval: {e}");
        }

        let gl = unsafe {
            glow::Context::from_loader_function(|name| {
                let symbol = CString::new(name).expect("invalid GL symbol name");
                gl_display
                    .get_proc_address(symbol.as_c_str())
                    .cast::<c_void>()
            })
        };

        log::info!(
            "OpenGL vendor: {}, renderer: {}, version: {}",
            unsafe { gl.get_parameter_string(glow::VENDOR) },
            unsafe { gl.get_parameter_string(glow::RENDERER) },
            unsafe { gl.get_parameter_string(glow::VERSION) },
        );

        let size = window.inner_size();
        unsafe {
            gl.viewport(0, 0, size.width as i32, size.height as i32);
        }

        Ok(Self {
            gl,
            context,
            surface,
            window,
            state: ShellState {
                width: size.width,
                height: size.height,
                running: true,
                pending_resize: None,
                resize_cb,
            },
            event_loop,
        })
    }

    pub fn gl(&self) -> &glow::Context {
        &self.gl
    }

    pub fn gl_display(&self) -> Display {
        self.context.display()
    }

    pub fn size(&self) -> (u32, u32) {
        (self.state.width, self.state.height)
    }

    /// Drains pending window-system events without blocking.
    ///
    /// Returns `false` once a close request or quit key was observed. A
    /// resize updates the tracked size, the GL surface, and the viewport
    /// before the next frame is drawn, and invokes the registered callback
    /// once per event.
    pub fn poll_events(&mut self) -> bool {
        let state = &mut self.state;
        let _ = self
            .event_loop
            .pump_events(Some(Duration::ZERO), |event, _elwt| {
                if let Event::WindowEvent { event, .. } = event {
                    state.handle_window_event(event);
                }
            });

        if let Some((width, height)) = self.state.pending_resize.take() {
            if width > 0 && height > 0 {
                self.window.resize_surface(&self.surface, &self.context);
                unsafe {
                    self.gl.viewport(0, 0, width as i32, height as i32);
                }
            }
        }

        self.state.running
    }

    pub fn swap_buffers(&self) -> Result<(), PipelineError> {
        self.surface
            .swap_buffers(&self.context)
            .map_err(|e| PipelineError::Present(format!("buffer swap failed: {e}")))
    }
}
