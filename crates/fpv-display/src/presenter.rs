use crate::config::DisplayConfig;
use crate::egl::EglDmaBufImport;
use crate::shell::{ResizeCallback, WindowShell};
use fpv_types::{FrameDescriptor, OverlayBuffer, PipelineError};
use glow::HasContext;
use std::sync::Arc;

const VERTEX_SHADER: &str = r#"#version 330 core
const vec2 coords[4] = vec2[](vec2(0., 0.), vec2(1., 0.), vec2(0., 1.), vec2(1., 1.));
uniform vec2 uTexCoordScale;
out vec2 vTexCoord;
void main() {
    vec2 c = coords[gl_VertexID];
    vTexCoord = c * uTexCoordScale;
    gl_Position = vec4(c * vec2(2., -2.) + vec2(-1., 1.), 0., 1.);
}
"#;

// BT.601 limited-range YUV to RGB. The overlay texel wins wherever its alpha
// is non-zero; the .zyxw swizzle turns the 0xAARRGGBB overlay packing into
// RGBA without touching the upload path.
const FRAGMENT_SHADER: &str = r#"#version 330 core
in vec2 vTexCoord;
uniform sampler2D uTexY;
uniform sampler2D uTexC;
uniform sampler2D uTexO;
const mat4 yuv2rgb = mat4(
    vec4( 1.1644,  1.1644,  1.1644, 0.0000),
    vec4( 0.0000, -0.2132,  2.1124, 0.0000),
    vec4( 1.7927, -0.5329,  0.0000, 0.0000),
    vec4(-0.9729,  0.3015, -1.1334, 1.0000));
out vec4 oColor;
void main() {
    vec4 osd = texture(uTexO, vTexCoord).zyxw;
    vec4 video = yuv2rgb * vec4(texture(uTexY, vTexCoord).x, texture(uTexC, vTexCoord).xy, 1.);
    oColor = osd.w > 0. ? osd : video;
}
"#;

/// First-assignment-wins texture coordinate scale.
///
/// The scale corrects for decoder surface padding and is a property of the
/// stream: the allocated surface size does not change mid-stream, so the
/// first reported value is authoritative and later calls are no-ops.
#[derive(Default)]
struct FrameScale {
    applied: Option<(f32, f32)>,
}

impl FrameScale {
    /// Returns the value to upload on the first call, `None` afterwards.
    fn set(&mut self, sx: f32, sy: f32) -> Option<(f32, f32)> {
        if self.applied.is_none() {
            self.applied = Some((sx, sy));
            return self.applied;
        }
        None
    }
}

/// Composites decoded frames with the shared OSD overlay and presents them.
///
/// Holds exactly three textures (luma, chroma, overlay), created once; only
/// their backing content changes per frame. Any GPU failure during `present`
/// leaves the GL state undefined, so the presenter transitions to a terminal
/// broken state instead of retrying.
pub struct Presenter {
    shell: WindowShell,
    egl: EglDmaBufImport,
    program: glow::Program,
    textures: [glow::Texture; 3],
    scale_location: Option<glow::UniformLocation>,
    scale: FrameScale,
    overlay: Arc<OverlayBuffer>,
    overlay_staging: Vec<u8>,
    broken: bool,
}

impl Presenter {
    /// Creates the window, GL context, shader program, and texture set.
    ///
    /// Any failure is [`PipelineError::Init`] and nothing usable is left
    /// behind; construct a fresh presenter to retry.
    pub fn new(
        config: &DisplayConfig,
        overlay: Arc<OverlayBuffer>,
        resize_cb: Option<ResizeCallback>,
    ) -> Result<Self, PipelineError> {
        let shell = WindowShell::new(config, resize_cb)?;
        let egl = EglDmaBufImport::load(&shell.gl_display())?;
        let gl = shell.gl();

        let program;
        let textures;
        let scale_location;
        unsafe {
            // Core profile requires a bound VAO even for attribute-less
            // draws.
            let vao = gl
                .create_vertex_array()
                .map_err(|e| PipelineError::Init(format!("failed to create VAO: {e}")))?;
            gl.bind_vertex_array(Some(vao));

            program = link_program(gl, VERTEX_SHADER, FRAGMENT_SHADER)?;
            gl.use_program(Some(program));
            gl.uniform_1_i32(gl.get_uniform_location(program, "uTexY").as_ref(), 0);
            gl.uniform_1_i32(gl.get_uniform_location(program, "uTexC").as_ref(), 1);
            gl.uniform_1_i32(gl.get_uniform_location(program, "uTexO").as_ref(), 2);
            scale_location = gl.get_uniform_location(program, "uTexCoordScale");
            // Neutral scale until the stream geometry is known.
            gl.uniform_2_f32(scale_location.as_ref(), 1.0, 1.0);

            let mut created = Vec::with_capacity(3);
            for _ in 0..3 {
                let texture = gl
                    .create_texture()
                    .map_err(|e| PipelineError::Init(format!("failed to create texture: {e}")))?;
                gl.bind_texture(glow::TEXTURE_2D, Some(texture));
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_WRAP_S,
                    glow::CLAMP_TO_EDGE as i32,
                );
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_WRAP_T,
                    glow::CLAMP_TO_EDGE as i32,
                );
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_MIN_FILTER,
                    glow::LINEAR as i32,
                );
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_MAG_FILTER,
                    glow::LINEAR as i32,
                );
                created.push(texture);
            }
            gl.bind_texture(glow::TEXTURE_2D, None);
            textures = [created[0], created[1], created[2]];
        }

        Ok(Self {
            shell,
            egl,
            program,
            textures,
            scale_location,
            scale: FrameScale::default(),
            overlay,
            overlay_staging: Vec::new(),
            broken: false,
        })
    }

    /// `false` once the presenter hit a GPU error and became unusable.
    pub fn is_ready(&self) -> bool {
        !self.broken
    }

    /// Drains window events; `false` means the loop should stop.
    pub fn poll_events(&mut self) -> bool {
        if self.broken {
            return false;
        }
        self.shell.poll_events()
    }

    /// Current logical output size.
    pub fn size(&self) -> (u32, u32) {
        self.shell.size()
    }

    /// Sets the texture coordinate scale correcting for surface padding.
    /// Idempotent: the first call wins, later calls are no-ops.
    pub fn set_frame_scale(&mut self, sx: f32, sy: f32) {
        if self.broken {
            return;
        }
        if let Some((sx, sy)) = self.scale.set(sx, sy) {
            unsafe {
                self.shell
                    .gl()
                    .uniform_2_f32(self.scale_location.as_ref(), sx, sy);
            }
            log::debug!("frame texture scale set to {sx}x{sy}");
        }
    }

    /// Imports the frame's planes, refreshes the overlay texture, draws the
    /// composited quad, and swaps.
    ///
    /// The descriptor is consumed; its fds close when it drops at the end of
    /// this call, after the import, on success and failure alike. A GPU
    /// error is terminal: the presenter is marked broken and every later
    /// call fails fast.
    pub fn present(&mut self, frame: FrameDescriptor) -> Result<(), PipelineError> {
        if self.broken {
            return Err(PipelineError::Present("presenter is broken".into()));
        }
        let result = self.draw(&frame);
        if result.is_err() {
            self.broken = true;
        }
        result
    }

    fn draw(&mut self, frame: &FrameDescriptor) -> Result<(), PipelineError> {
        self.overlay.copy_into(&mut self.overlay_staging);

        let gl = self.shell.gl();

        // Transient per-frame images; dropped before this call returns
        // because the decoder recycles the underlying surfaces.
        let images = [
            self.egl.import_plane(&frame.luma)?,
            self.egl.import_plane(&frame.chroma)?,
        ];

        unsafe {
            gl.use_program(Some(self.program));
            for (i, image) in images.iter().enumerate() {
                gl.active_texture(glow::TEXTURE0 + i as u32);
                gl.bind_texture(glow::TEXTURE_2D, Some(self.textures[i]));
                image.bind_to_current_texture(gl)?;
            }

            gl.active_texture(glow::TEXTURE0 + 2);
            gl.bind_texture(glow::TEXTURE_2D, Some(self.textures[2]));
            while gl.get_error() != glow::NO_ERROR {}
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                glow::RGBA as i32,
                self.overlay.width() as i32,
                self.overlay.height() as i32,
                0,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                Some(self.overlay_staging.as_slice()),
            );
            if gl.get_error() != glow::NO_ERROR {
                return Err(PipelineError::Present("overlay texture upload failed".into()));
            }

            gl.clear(glow::COLOR_BUFFER_BIT);
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            if gl.get_error() != glow::NO_ERROR {
                return Err(PipelineError::Present("draw call failed".into()));
            }
        }

        self.shell.swap_buffers()
    }
}

unsafe fn link_program(
    gl: &glow::Context,
    vertex_src: &str,
    fragment_src: &str,
) -> Result<glow::Program, PipelineError> {
    let program = gl
        .create_program()
        .map_err(|e| PipelineError::Init(format!("failed to create program: {e}")))?;
    for (stage, src) in [
        (glow::VERTEX_SHADER, vertex_src),
        (glow::FRAGMENT_SHADER, fragment_src),
    ] {
        let shader = gl
            .create_shader(stage)
            .map_err(|e| PipelineError::Init(format!("failed to create shader: {e}")))?;
        gl.shader_source(shader, src);
        gl.compile_shader(shader);
        if !gl.get_shader_compile_status(shader) {
            let info = gl.get_shader_info_log(shader);
            gl.delete_shader(shader);
            return Err(PipelineError::Init(format!(
                "shader compilation failed: {info}"
            )));
        }
        gl.attach_shader(program, shader);
        // Flagged for deletion; freed once detached by program deletion.
        gl.delete_shader(shader);
    }
    gl.link_program(program);
    if !gl.get_program_link_status(program) {
        let info = gl.get_program_info_log(program);
        return Err(PipelineError::Init(format!(
            "shader program link failed: {info}"
        )));
    }
    Ok(program)
}

#[cfg(test)]
mod tests {
    use super::FrameScale;

    #[test]
    fn first_scale_assignment_wins() {
        let mut scale = FrameScale::default();
        assert_eq!(scale.set(0.9375, 0.9926), Some((0.9375, 0.9926)));
        assert_eq!(scale.set(0.5, 0.5), None);
        assert_eq!(scale.applied, Some((0.9375, 0.9926)));
    }

    #[test]
    fn repeated_identical_calls_are_noops() {
        let mut scale = FrameScale::default();
        assert!(scale.set(1.0, 1.0).is_some());
        assert!(scale.set(1.0, 1.0).is_none());
    }
}
