//! Graphics context boundary
//!
//! Everything the display core does to the GPU goes through [`GlContext`]. The
//! trait mirrors the WebGL 1 call surface closely enough that a browser or
//! desktop GL binding can implement it directly, while staying small enough
//! for the headless [`RecordingContext`] used in tests and tooling.
//!
//! Handles are opaque newtypes. Implementations decide what the numbers mean.

pub mod recording;

pub use recording::{GlCall, RecordingContext};

use serde::{Deserialize, Serialize};

/// Compiled shader object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlShader(pub u32);

/// Linked program object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlProgram(pub u32);

/// Vertex or index buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GlBuffer(pub u32);

/// 2D texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlTexture(pub u32);

/// Off-screen framebuffer with colour and depth attachments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GlFramebuffer(pub u32);

/// Location of a uniform within one linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation(pub u32);

/// Location of a vertex attribute within one linked program
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttribLocation(pub u32);

/// Shader pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Fragment shader
    Fragment,
}

/// Buffer binding point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufferTarget {
    /// Vertex attribute data
    Array,
    /// Index data
    ElementArray,
}

/// Server-side capabilities toggled with enable/disable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Colour blending
    Blend,
    /// Depth testing
    DepthTest,
    /// Face culling
    CullFace,
    /// Scissor testing
    ScissorTest,
}

/// Depth comparison function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DepthFunc {
    /// Never passes
    Never,
    /// Passes if incoming depth is less
    #[default]
    Less,
    /// Passes if equal
    Equal,
    /// Passes if less or equal
    LessEqual,
    /// Passes if greater
    Greater,
    /// Passes if not equal
    NotEqual,
    /// Passes if greater or equal
    GreaterEqual,
    /// Always passes
    Always,
}

/// Blend factor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendFactor {
    /// 0
    Zero,
    /// 1
    One,
    /// Source alpha
    SrcAlpha,
    /// 1 - source alpha
    OneMinusSrcAlpha,
}

/// Winding order of front-facing polygons
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FrontFace {
    /// Counter-clockwise
    #[default]
    Ccw,
    /// Clockwise
    Cw,
}

/// Faces removed when culling is enabled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullFace {
    /// Back faces
    Back,
    /// Front faces
    Front,
}

/// Primitive topology for indexed draws
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Primitive {
    /// Points
    Points,
    /// Line segments
    Lines,
    /// Connected line strip
    LineStrip,
    /// Closed line loop
    LineLoop,
    /// Triangles
    #[default]
    Triangles,
    /// Triangle strip
    TriangleStrip,
    /// Triangle fan
    TriangleFan,
}

bitflags::bitflags! {
    /// Buffers cleared by [`GlContext::clear`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearMask: u8 {
        /// Colour buffer
        const COLOR = 0b001;
        /// Depth buffer
        const DEPTH = 0b010;
        /// Stencil buffer
        const STENCIL = 0b100;
    }
}

/// RGBA8 pixel data for texture uploads
#[derive(Debug, Clone, Copy)]
pub struct TextureImage<'a> {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Tightly packed RGBA8 rows
    pub pixels: &'a [u8],
}

/// The graphics API as seen by cores, chunks and the display
///
/// Fallible calls return the driver's info log as the error string; callers
/// wrap it into a [`RenderError`](crate::render::RenderError).
pub trait GlContext {
    /// Whether the context has been lost since it was created or restored
    fn is_context_lost(&self) -> bool;

    /// Number of combined texture image units
    fn max_texture_units(&self) -> u32;

    /// Size of the default framebuffer in pixels
    fn drawing_buffer_size(&self) -> (u32, u32);

    /// Compile one shader stage
    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GlShader, String>;

    /// Delete a shader object
    fn delete_shader(&mut self, shader: GlShader);

    /// Link a program from a vertex and fragment shader
    fn link_program(&mut self, vertex: GlShader, fragment: GlShader) -> Result<GlProgram, String>;

    /// Delete a program object
    fn delete_program(&mut self, program: GlProgram);

    /// Make a program current
    fn use_program(&mut self, program: Option<GlProgram>);

    /// Look up a uniform by name
    fn uniform_location(&mut self, program: GlProgram, name: &str) -> Option<UniformLocation>;

    /// Look up a vertex attribute by name
    fn attrib_location(&mut self, program: GlProgram, name: &str) -> Option<AttribLocation>;

    /// Set an int or sampler uniform on the current program
    fn uniform_1i(&mut self, location: UniformLocation, value: i32);

    /// Set a float uniform on the current program
    fn uniform_1f(&mut self, location: UniformLocation, value: f32);

    /// Set a vec3 uniform on the current program
    fn uniform_3f(&mut self, location: UniformLocation, value: [f32; 3]);

    /// Set a vec4 uniform on the current program
    fn uniform_4f(&mut self, location: UniformLocation, value: [f32; 4]);

    /// Set a column-major mat4 uniform on the current program
    fn uniform_matrix_4f(&mut self, location: UniformLocation, value: &[f32; 16]);

    /// Create a buffer and upload its contents
    fn create_buffer(&mut self, target: BufferTarget, data: &[u8]) -> Result<GlBuffer, String>;

    /// Delete a buffer
    fn delete_buffer(&mut self, buffer: GlBuffer);

    /// Bind a buffer to a target
    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GlBuffer>);

    /// Point an attribute at the bound array buffer (float components)
    fn vertex_attrib_pointer(&mut self, location: AttribLocation, components: i32, stride: i32, offset: i32);

    /// Enable an attribute array
    fn enable_vertex_attrib_array(&mut self, location: AttribLocation);

    /// Create a texture from RGBA8 pixels
    fn create_texture(&mut self, image: &TextureImage<'_>) -> Result<GlTexture, String>;

    /// Delete a texture
    fn delete_texture(&mut self, texture: GlTexture);

    /// Select the active texture unit
    fn active_texture(&mut self, unit: u32);

    /// Bind a texture to the active unit
    fn bind_texture(&mut self, texture: Option<GlTexture>);

    /// Enable a capability
    fn enable(&mut self, capability: Capability);

    /// Disable a capability
    fn disable(&mut self, capability: Capability);

    /// Set the depth comparison
    fn depth_func(&mut self, func: DepthFunc);

    /// Enable or disable depth writes
    fn depth_mask(&mut self, write: bool);

    /// Set the blend function
    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor);

    /// Set the front-face winding
    fn front_face(&mut self, face: FrontFace);

    /// Select which faces are culled
    fn cull_face(&mut self, face: CullFace);

    /// Enable or disable writes per colour channel
    fn color_mask(&mut self, mask: [bool; 4]);

    /// Set rasterised line width
    fn line_width(&mut self, width: f32);

    /// Set the viewport rectangle
    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32);

    /// Set the clear colour
    fn clear_color(&mut self, color: [f32; 4]);

    /// Clear the selected buffers of the bound framebuffer
    fn clear(&mut self, mask: ClearMask);

    /// Issue an indexed draw from the bound element buffer (u32 indices)
    fn draw_elements(&mut self, primitive: Primitive, count: u32, offset: u32);

    /// Create an RGBA8 framebuffer with a depth attachment
    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<GlFramebuffer, String>;

    /// Delete a framebuffer
    fn delete_framebuffer(&mut self, framebuffer: GlFramebuffer);

    /// Bind a framebuffer, or the default framebuffer for `None`
    fn bind_framebuffer(&mut self, framebuffer: Option<GlFramebuffer>);

    /// Read one RGBA8 pixel from the bound framebuffer (origin bottom-left)
    fn read_pixel(&mut self, x: u32, y: u32) -> [u8; 4];

    /// Flush queued commands
    fn flush(&mut self);

    /// Block until queued commands complete
    fn finish(&mut self);
}
