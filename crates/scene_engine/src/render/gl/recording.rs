//! Headless graphics context
//!
//! [`RecordingContext`] implements [`GlContext`] without a GPU. It records
//! every call so tests and tools can count state changes, resolves uniform and
//! attribute locations against the linked shader source, and rasterises a
//! crude approximation of coverage so picking can be exercised end to end:
//! each index buffer can be registered as covering a set of pixels, and a draw
//! from that buffer writes the current pick colour (or material colour) into
//! those pixels of the bound framebuffer.
//!
//! It can also simulate context loss and shader compilation failure.

use std::collections::{HashMap, HashSet};

use super::{
    AttribLocation, BlendFactor, BufferTarget, Capability, ClearMask, CullFace, DepthFunc,
    FrontFace, GlBuffer, GlContext, GlFramebuffer, GlProgram, GlShader, GlTexture, Primitive,
    ShaderStage, TextureImage, UniformLocation,
};
use crate::render::program::source::{U_MATERIAL_BASE_COLOR, U_PICK_COLOR};

/// One recorded call
#[derive(Debug, Clone, PartialEq)]
pub enum GlCall {
    /// `compile_shader`
    CompileShader(ShaderStage),
    /// `link_program`
    LinkProgram(GlProgram),
    /// `delete_program`
    DeleteProgram(GlProgram),
    /// `use_program`
    UseProgram(Option<GlProgram>),
    /// Any `uniform_*` setter
    SetUniform(UniformLocation),
    /// `create_buffer`
    CreateBuffer(GlBuffer),
    /// `delete_buffer`
    DeleteBuffer(GlBuffer),
    /// `bind_buffer`
    BindBuffer(BufferTarget, Option<GlBuffer>),
    /// `vertex_attrib_pointer`
    VertexAttribPointer(AttribLocation),
    /// `enable_vertex_attrib_array`
    EnableVertexAttribArray(AttribLocation),
    /// `create_texture`
    CreateTexture(GlTexture),
    /// `delete_texture`
    DeleteTexture(GlTexture),
    /// `active_texture`
    ActiveTexture(u32),
    /// `bind_texture`
    BindTexture(Option<GlTexture>),
    /// `enable`
    Enable(Capability),
    /// `disable`
    Disable(Capability),
    /// `depth_func`
    DepthFunc(DepthFunc),
    /// `depth_mask`
    DepthMask(bool),
    /// `blend_func`
    BlendFunc(BlendFactor, BlendFactor),
    /// `front_face`
    FrontFace(FrontFace),
    /// `cull_face`
    CullFace(CullFace),
    /// `color_mask`
    ColorMask([bool; 4]),
    /// `line_width`
    LineWidth(f32),
    /// `viewport`
    Viewport([i32; 4]),
    /// `clear_color`
    ClearColor([f32; 4]),
    /// `clear`
    Clear(ClearMask),
    /// `draw_elements`
    DrawElements {
        /// Topology
        primitive: Primitive,
        /// Index count
        count: u32,
        /// Element buffer bound at the time of the draw
        index_buffer: Option<GlBuffer>,
    },
    /// `create_framebuffer`
    CreateFramebuffer(GlFramebuffer),
    /// `delete_framebuffer`
    DeleteFramebuffer(GlFramebuffer),
    /// `bind_framebuffer`
    BindFramebuffer(Option<GlFramebuffer>),
    /// `read_pixel`
    ReadPixel(u32, u32),
    /// `flush`
    Flush,
    /// `finish`
    Finish,
}

#[derive(Debug, Default)]
struct LinkedProgram {
    source: String,
    uniforms: HashMap<String, UniformLocation>,
    attribs: HashMap<String, AttribLocation>,
    values: HashMap<UniformLocation, Vec<f32>>,
}

#[derive(Debug)]
struct Surface {
    width: u32,
    height: u32,
    cleared_to: [u8; 4],
    pixels: HashMap<(u32, u32), [u8; 4]>,
}

impl Surface {
    fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            cleared_to: [0; 4],
            pixels: HashMap::new(),
        }
    }
}

/// Headless [`GlContext`] that records calls
#[derive(Debug)]
pub struct RecordingContext {
    calls: Vec<GlCall>,
    next_handle: u32,
    shaders: HashMap<GlShader, String>,
    programs: HashMap<GlProgram, LinkedProgram>,
    current_program: Option<GlProgram>,
    buffers: HashSet<GlBuffer>,
    textures: HashSet<GlTexture>,
    framebuffers: HashMap<GlFramebuffer, Surface>,
    default_surface: Surface,
    bound_framebuffer: Option<GlFramebuffer>,
    bound_elements: Option<GlBuffer>,
    clear_color: [f32; 4],
    coverage: HashMap<GlBuffer, Vec<(u32, u32)>>,
    max_texture_units: u32,
    context_lost: bool,
    lose_after_draws: Option<usize>,
    failing_shader_marker: Option<String>,
}

impl RecordingContext {
    /// Create a context with a drawing buffer of the given size and 8 texture units
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            calls: Vec::new(),
            next_handle: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            current_program: None,
            buffers: HashSet::new(),
            textures: HashSet::new(),
            framebuffers: HashMap::new(),
            default_surface: Surface::new(width, height),
            bound_framebuffer: None,
            bound_elements: None,
            clear_color: [0.0; 4],
            coverage: HashMap::new(),
            max_texture_units: 8,
            context_lost: false,
            lose_after_draws: None,
            failing_shader_marker: None,
        }
    }

    /// Report a different number of texture units
    pub fn with_max_texture_units(mut self, units: u32) -> Self {
        self.max_texture_units = units;
        self
    }

    /// Every call recorded since creation or the last [`clear_calls`](Self::clear_calls)
    pub fn calls(&self) -> &[GlCall] {
        &self.calls
    }

    /// Forget recorded calls, keeping all GPU-side state
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Count recorded calls matching a predicate
    pub fn count(&self, predicate: impl Fn(&GlCall) -> bool) -> usize {
        self.calls.iter().filter(|call| predicate(call)).count()
    }

    /// Number of `use_program` calls that bound a program
    pub fn program_binds(&self) -> usize {
        self.count(|call| matches!(call, GlCall::UseProgram(Some(_))))
    }

    /// Number of indexed draws
    pub fn draw_calls(&self) -> usize {
        self.count(|call| matches!(call, GlCall::DrawElements { .. }))
    }

    /// Number of `enable` calls for one capability
    pub fn enables(&self, capability: Capability) -> usize {
        self.count(|call| *call == GlCall::Enable(capability))
    }

    /// Number of `disable` calls for one capability
    pub fn disables(&self, capability: Capability) -> usize {
        self.count(|call| *call == GlCall::Disable(capability))
    }

    /// Number of shader compilations attempted
    pub fn shader_compiles(&self) -> usize {
        self.count(|call| matches!(call, GlCall::CompileShader(_)))
    }

    /// Buffers created and not yet deleted
    pub fn live_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Textures created and not yet deleted
    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    /// Programs linked and not yet deleted
    pub fn live_programs(&self) -> usize {
        self.programs.len()
    }

    /// Linked source (vertex followed by fragment) of a program
    pub fn program_source(&self, program: GlProgram) -> Option<&str> {
        self.programs.get(&program).map(|p| p.source.as_str())
    }

    /// Last value written to a named uniform of a program
    pub fn uniform_value(&self, program: GlProgram, name: &str) -> Option<&[f32]> {
        let linked = self.programs.get(&program)?;
        let location = linked.uniforms.get(name)?;
        linked.values.get(location).map(Vec::as_slice)
    }

    /// Register the framebuffer pixel an index buffer's geometry covers
    ///
    /// Coordinates are in framebuffer space with the origin at the bottom-left.
    pub fn cover(&mut self, index_buffer: GlBuffer, x: u32, y: u32) {
        self.coverage.entry(index_buffer).or_default().push((x, y));
    }

    /// Register coverage using canvas coordinates (origin top-left)
    pub fn cover_canvas(&mut self, index_buffer: GlBuffer, x: u32, y: u32) {
        let flipped = self.default_surface.height.saturating_sub(1).saturating_sub(y);
        self.cover(index_buffer, x, flipped);
    }

    /// Pixel of the default framebuffer (origin bottom-left)
    pub fn screen_pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let surface = &self.default_surface;
        surface.pixels.get(&(x, y)).copied().unwrap_or(surface.cleared_to)
    }

    /// Simulate losing the context immediately
    pub fn lose_context(&mut self) {
        self.context_lost = true;
    }

    /// Simulate losing the context after `draws` more draw calls
    pub fn lose_context_after_draws(&mut self, draws: usize) {
        self.lose_after_draws = Some(draws);
    }

    /// Restore a lost context; every previously created object becomes invalid
    pub fn restore_context(&mut self) {
        self.context_lost = false;
        self.lose_after_draws = None;
        self.shaders.clear();
        self.programs.clear();
        self.current_program = None;
        self.buffers.clear();
        self.textures.clear();
        self.framebuffers.clear();
        self.bound_framebuffer = None;
        self.bound_elements = None;
        self.coverage.clear();
        self.default_surface.pixels.clear();
    }

    /// Make every shader whose source contains `marker` fail to compile
    pub fn fail_shaders_containing(&mut self, marker: impl Into<String>) {
        self.failing_shader_marker = Some(marker.into());
    }

    fn next_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn surface_mut(&mut self) -> &mut Surface {
        let Self {
            framebuffers,
            default_surface,
            bound_framebuffer,
            ..
        } = self;
        match bound_framebuffer.and_then(|fb| framebuffers.get_mut(&fb)) {
            Some(surface) => surface,
            None => default_surface,
        }
    }

    fn set_uniform(&mut self, location: UniformLocation, value: Vec<f32>) {
        self.calls.push(GlCall::SetUniform(location));
        if let Some(program) = self.current_program.and_then(|p| self.programs.get_mut(&p)) {
            program.values.insert(location, value);
        }
    }

    fn coverage_color(&self) -> [u8; 4] {
        let value = self.current_program.and_then(|p| {
            self.uniform_value(p, U_PICK_COLOR)
                .or_else(|| self.uniform_value(p, U_MATERIAL_BASE_COLOR))
        });
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
        match value {
            Some([r, g, b, a, ..]) => [channel(*r), channel(*g), channel(*b), channel(*a)],
            Some([r, g, b]) => [channel(*r), channel(*g), channel(*b), 255],
            _ => [255; 4],
        }
    }
}

fn declares(source: &str, name: &str) -> bool {
    let is_ident = |c: char| c.is_ascii_alphanumeric() || c == '_';
    source.match_indices(name).any(|(i, _)| {
        let before = source[..i].chars().next_back();
        let after = source[i + name.len()..].chars().next();
        !before.is_some_and(is_ident) && !after.is_some_and(is_ident)
    })
}

impl GlContext for RecordingContext {
    fn is_context_lost(&self) -> bool {
        self.context_lost
    }

    fn max_texture_units(&self) -> u32 {
        self.max_texture_units
    }

    fn drawing_buffer_size(&self) -> (u32, u32) {
        (self.default_surface.width, self.default_surface.height)
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<GlShader, String> {
        self.calls.push(GlCall::CompileShader(stage));
        if self.context_lost {
            return Err("context lost".to_string());
        }
        if let Some(marker) = &self.failing_shader_marker {
            if source.contains(marker.as_str()) {
                return Err(format!("ERROR: 0:1: '{marker}' : syntax error"));
            }
        }
        let shader = GlShader(self.next_handle());
        self.shaders.insert(shader, source.to_string());
        Ok(shader)
    }

    fn delete_shader(&mut self, shader: GlShader) {
        self.shaders.remove(&shader);
    }

    fn link_program(&mut self, vertex: GlShader, fragment: GlShader) -> Result<GlProgram, String> {
        let (Some(vs), Some(fs)) = (self.shaders.get(&vertex), self.shaders.get(&fragment)) else {
            return Err("invalid shader handle".to_string());
        };
        let source = format!("{vs}\n{fs}");
        let program = GlProgram(self.next_handle());
        self.programs.insert(
            program,
            LinkedProgram {
                source,
                ..LinkedProgram::default()
            },
        );
        self.calls.push(GlCall::LinkProgram(program));
        Ok(program)
    }

    fn delete_program(&mut self, program: GlProgram) {
        self.calls.push(GlCall::DeleteProgram(program));
        self.programs.remove(&program);
        if self.current_program == Some(program) {
            self.current_program = None;
        }
    }

    fn use_program(&mut self, program: Option<GlProgram>) {
        self.calls.push(GlCall::UseProgram(program));
        self.current_program = program;
    }

    fn uniform_location(&mut self, program: GlProgram, name: &str) -> Option<UniformLocation> {
        let linked = self.programs.get_mut(&program)?;
        if let Some(location) = linked.uniforms.get(name) {
            return Some(*location);
        }
        if !declares(&linked.source, name) {
            return None;
        }
        let location = UniformLocation(linked.uniforms.len() as u32);
        linked.uniforms.insert(name.to_string(), location);
        Some(location)
    }

    fn attrib_location(&mut self, program: GlProgram, name: &str) -> Option<AttribLocation> {
        let linked = self.programs.get_mut(&program)?;
        if let Some(location) = linked.attribs.get(name) {
            return Some(*location);
        }
        if !declares(&linked.source, name) {
            return None;
        }
        let location = AttribLocation(linked.attribs.len() as u32);
        linked.attribs.insert(name.to_string(), location);
        Some(location)
    }

    fn uniform_1i(&mut self, location: UniformLocation, value: i32) {
        self.set_uniform(location, vec![value as f32]);
    }

    fn uniform_1f(&mut self, location: UniformLocation, value: f32) {
        self.set_uniform(location, vec![value]);
    }

    fn uniform_3f(&mut self, location: UniformLocation, value: [f32; 3]) {
        self.set_uniform(location, value.to_vec());
    }

    fn uniform_4f(&mut self, location: UniformLocation, value: [f32; 4]) {
        self.set_uniform(location, value.to_vec());
    }

    fn uniform_matrix_4f(&mut self, location: UniformLocation, value: &[f32; 16]) {
        self.set_uniform(location, value.to_vec());
    }

    fn create_buffer(&mut self, _target: BufferTarget, _data: &[u8]) -> Result<GlBuffer, String> {
        if self.context_lost {
            return Err("context lost".to_string());
        }
        let buffer = GlBuffer(self.next_handle());
        self.buffers.insert(buffer);
        self.calls.push(GlCall::CreateBuffer(buffer));
        Ok(buffer)
    }

    fn delete_buffer(&mut self, buffer: GlBuffer) {
        self.calls.push(GlCall::DeleteBuffer(buffer));
        self.buffers.remove(&buffer);
        self.coverage.remove(&buffer);
    }

    fn bind_buffer(&mut self, target: BufferTarget, buffer: Option<GlBuffer>) {
        self.calls.push(GlCall::BindBuffer(target, buffer));
        if target == BufferTarget::ElementArray {
            self.bound_elements = buffer;
        }
    }

    fn vertex_attrib_pointer(&mut self, location: AttribLocation, _components: i32, _stride: i32, _offset: i32) {
        self.calls.push(GlCall::VertexAttribPointer(location));
    }

    fn enable_vertex_attrib_array(&mut self, location: AttribLocation) {
        self.calls.push(GlCall::EnableVertexAttribArray(location));
    }

    fn create_texture(&mut self, image: &TextureImage<'_>) -> Result<GlTexture, String> {
        if self.context_lost {
            return Err("context lost".to_string());
        }
        let expected = image.width as usize * image.height as usize * 4;
        if image.pixels.len() != expected {
            return Err(format!(
                "texture data is {} bytes, expected {expected}",
                image.pixels.len()
            ));
        }
        let texture = GlTexture(self.next_handle());
        self.textures.insert(texture);
        self.calls.push(GlCall::CreateTexture(texture));
        Ok(texture)
    }

    fn delete_texture(&mut self, texture: GlTexture) {
        self.calls.push(GlCall::DeleteTexture(texture));
        self.textures.remove(&texture);
    }

    fn active_texture(&mut self, unit: u32) {
        self.calls.push(GlCall::ActiveTexture(unit));
    }

    fn bind_texture(&mut self, texture: Option<GlTexture>) {
        self.calls.push(GlCall::BindTexture(texture));
    }

    fn enable(&mut self, capability: Capability) {
        self.calls.push(GlCall::Enable(capability));
    }

    fn disable(&mut self, capability: Capability) {
        self.calls.push(GlCall::Disable(capability));
    }

    fn depth_func(&mut self, func: DepthFunc) {
        self.calls.push(GlCall::DepthFunc(func));
    }

    fn depth_mask(&mut self, write: bool) {
        self.calls.push(GlCall::DepthMask(write));
    }

    fn blend_func(&mut self, src: BlendFactor, dst: BlendFactor) {
        self.calls.push(GlCall::BlendFunc(src, dst));
    }

    fn front_face(&mut self, face: FrontFace) {
        self.calls.push(GlCall::FrontFace(face));
    }

    fn cull_face(&mut self, face: CullFace) {
        self.calls.push(GlCall::CullFace(face));
    }

    fn color_mask(&mut self, mask: [bool; 4]) {
        self.calls.push(GlCall::ColorMask(mask));
    }

    fn line_width(&mut self, width: f32) {
        self.calls.push(GlCall::LineWidth(width));
    }

    fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) {
        self.calls.push(GlCall::Viewport([x, y, width, height]));
    }

    fn clear_color(&mut self, color: [f32; 4]) {
        self.calls.push(GlCall::ClearColor(color));
        self.clear_color = color;
    }

    fn clear(&mut self, mask: ClearMask) {
        self.calls.push(GlCall::Clear(mask));
        if mask.contains(ClearMask::COLOR) {
            let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u8;
            let [r, g, b, a] = self.clear_color;
            let cleared = [channel(r), channel(g), channel(b), channel(a)];
            let surface = self.surface_mut();
            surface.cleared_to = cleared;
            surface.pixels.clear();
        }
    }

    fn draw_elements(&mut self, primitive: Primitive, count: u32, _offset: u32) {
        self.calls.push(GlCall::DrawElements {
            primitive,
            count,
            index_buffer: self.bound_elements,
        });
        if self.context_lost {
            return;
        }

        let covered = self
            .bound_elements
            .and_then(|buffer| self.coverage.get(&buffer))
            .cloned()
            .unwrap_or_default();
        if !covered.is_empty() {
            let color = self.coverage_color();
            let surface = self.surface_mut();
            for pixel in covered {
                surface.pixels.insert(pixel, color);
            }
        }

        if let Some(remaining) = self.lose_after_draws.as_mut() {
            *remaining = remaining.saturating_sub(1);
            if *remaining == 0 {
                self.lose_after_draws = None;
                self.context_lost = true;
            }
        }
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> Result<GlFramebuffer, String> {
        if self.context_lost {
            return Err("context lost".to_string());
        }
        if width == 0 || height == 0 {
            return Err(format!("framebuffer size {width}x{height} is incomplete"));
        }
        let framebuffer = GlFramebuffer(self.next_handle());
        self.framebuffers.insert(framebuffer, Surface::new(width, height));
        self.calls.push(GlCall::CreateFramebuffer(framebuffer));
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: GlFramebuffer) {
        self.calls.push(GlCall::DeleteFramebuffer(framebuffer));
        self.framebuffers.remove(&framebuffer);
        if self.bound_framebuffer == Some(framebuffer) {
            self.bound_framebuffer = None;
        }
    }

    fn bind_framebuffer(&mut self, framebuffer: Option<GlFramebuffer>) {
        self.calls.push(GlCall::BindFramebuffer(framebuffer));
        self.bound_framebuffer = framebuffer;
    }

    fn read_pixel(&mut self, x: u32, y: u32) -> [u8; 4] {
        self.calls.push(GlCall::ReadPixel(x, y));
        let surface = self.surface_mut();
        surface.pixels.get(&(x, y)).copied().unwrap_or(surface.cleared_to)
    }

    fn flush(&mut self) {
        self.calls.push(GlCall::Flush);
    }

    fn finish(&mut self) {
        self.calls.push(GlCall::Finish);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linked(gl: &mut RecordingContext, vs: &str, fs: &str) -> GlProgram {
        let vs = gl.compile_shader(ShaderStage::Vertex, vs).unwrap();
        let fs = gl.compile_shader(ShaderStage::Fragment, fs).unwrap();
        gl.link_program(vs, fs).unwrap()
    }

    #[test]
    fn test_locations_resolve_against_source() {
        let mut gl = RecordingContext::new(4, 4);
        let program = linked(&mut gl, "uniform mat4 u_modelMatrix;", "uniform vec4 u_pickColor;");

        assert!(gl.uniform_location(program, "u_modelMatrix").is_some());
        assert!(gl.uniform_location(program, "u_pickColor").is_some());
        assert!(gl.uniform_location(program, "u_model").is_none());
        assert_eq!(
            gl.uniform_location(program, "u_pickColor"),
            gl.uniform_location(program, "u_pickColor")
        );
    }

    #[test]
    fn test_draw_writes_pick_colour_into_covered_pixels() {
        let mut gl = RecordingContext::new(4, 4);
        let program = linked(&mut gl, "void main() {}", "uniform vec4 u_pickColor;");
        let index = gl.create_buffer(BufferTarget::ElementArray, &[]).unwrap();
        gl.cover(index, 1, 2);

        gl.use_program(Some(program));
        let location = gl.uniform_location(program, "u_pickColor").unwrap();
        gl.uniform_4f(location, [1.0 / 255.0, 0.0, 0.0, 1.0]);
        gl.bind_buffer(BufferTarget::ElementArray, Some(index));
        gl.draw_elements(Primitive::Triangles, 3, 0);

        assert_eq!(gl.read_pixel(1, 2), [1, 0, 0, 255]);
        assert_eq!(gl.read_pixel(0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_framebuffer_isolated_from_screen() {
        let mut gl = RecordingContext::new(4, 4);
        let fb = gl.create_framebuffer(4, 4).unwrap();
        gl.bind_framebuffer(Some(fb));
        gl.clear_color([1.0, 1.0, 1.0, 1.0]);
        gl.clear(ClearMask::COLOR);
        assert_eq!(gl.read_pixel(0, 0), [255; 4]);
        assert_eq!(gl.screen_pixel(0, 0), [0; 4]);
    }

    #[test]
    fn test_context_loss_after_draws() {
        let mut gl = RecordingContext::new(4, 4);
        gl.lose_context_after_draws(2);
        gl.draw_elements(Primitive::Triangles, 3, 0);
        assert!(!gl.is_context_lost());
        gl.draw_elements(Primitive::Triangles, 3, 0);
        assert!(gl.is_context_lost());
        assert!(gl.create_buffer(BufferTarget::Array, &[]).is_err());

        gl.restore_context();
        assert!(!gl.is_context_lost());
        assert_eq!(gl.live_buffers(), 0);
    }

    #[test]
    fn test_failing_shader_marker() {
        let mut gl = RecordingContext::new(4, 4);
        gl.fail_shaders_containing("broken");
        assert!(gl.compile_shader(ShaderStage::Fragment, "void broken()").is_err());
        assert!(gl.compile_shader(ShaderStage::Fragment, "void main()").is_ok());
    }
}
