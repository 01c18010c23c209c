//! Vertex bindings and the draw call

use super::{BuildContext, ChunkBehavior, DrawContext, PassLocations};
use crate::render::cores::CoreData;
use crate::render::display::set_cached;
use crate::render::gl::{AttribLocation, BufferTarget, GlBuffer, GlContext, UniformLocation};
use crate::render::program::source::{
    indexed, A_COLOR, A_MORPH_NORMAL, A_MORPH_POSITION, A_NORMAL, A_POSITION, A_UV, U_MORPH_FACTOR,
};
use crate::render::{RenderError, RenderResult};

fn bind_attribute(gl: &mut dyn GlContext, location: Option<AttribLocation>, buffer: Option<GlBuffer>, components: i32) {
    if let (Some(location), Some(buffer)) = (location, buffer) {
        gl.bind_buffer(BufferTarget::Array, Some(buffer));
        gl.vertex_attrib_pointer(location, components, 0, 0);
        gl.enable_vertex_attrib_array(location);
    }
}

/// Binds vertex arrays and the element buffer
#[derive(Debug, Default)]
pub(super) struct GeometryChunk {
    position: PassLocations<AttribLocation>,
    normal: PassLocations<AttribLocation>,
    uvs: Vec<PassLocations<AttribLocation>>,
    color: PassLocations<AttribLocation>,
}

impl GeometryChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for GeometryChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        let geometry = cx.core_as(CoreData::as_geometry)?;
        self.position = cx.attrib(A_POSITION);
        self.normal = cx.attrib(A_NORMAL);
        self.uvs = (0..geometry.arrays.uvs.len())
            .map(|i| cx.attrib(&indexed(A_UV, i)))
            .collect();
        self.color = cx.attrib(A_COLOR);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let geometry = cx.core_as(CoreData::as_geometry)?;
        let buffers = geometry
            .buffers
            .as_ref()
            .ok_or_else(|| RenderError::ResourceCreation("geometry has no GPU buffers".to_string()))?;
        let pass = cx.pass();

        bind_attribute(cx.gl, self.position.get(pass), Some(buffers.positions), 3);
        bind_attribute(cx.gl, self.normal.get(pass), buffers.normals, 3);
        for (location, buffer) in self.uvs.iter().zip(&buffers.uvs) {
            bind_attribute(cx.gl, location.get(pass), Some(*buffer), 2);
        }
        bind_attribute(cx.gl, self.color.get(pass), buffers.colors, 4);

        if set_cached(&mut cx.frame.index_buffer, buffers.indices) {
            cx.gl.bind_buffer(BufferTarget::ElementArray, Some(buffers.indices));
        }
        Ok(())
    }
}

/// Binds the two morph targets around the current factor
///
/// Runs after [`GeometryChunk`] and rebinds its positions and normals to the
/// lower target. The element buffer stays the geometry's.
#[derive(Debug, Default)]
pub(super) struct MorphGeometryChunk {
    position: PassLocations<AttribLocation>,
    morph_position: PassLocations<AttribLocation>,
    normal: PassLocations<AttribLocation>,
    morph_normal: PassLocations<AttribLocation>,
    factor: PassLocations<UniformLocation>,
}

impl MorphGeometryChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for MorphGeometryChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        cx.core_as(CoreData::as_morph_geometry)?;
        self.position = cx.attrib(A_POSITION);
        self.morph_position = cx.attrib(A_MORPH_POSITION);
        self.normal = cx.attrib(A_NORMAL);
        self.morph_normal = cx.attrib(A_MORPH_NORMAL);
        self.factor = cx.uniform(U_MORPH_FACTOR);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let morph = cx.core_as(CoreData::as_morph_geometry)?;
        let frame = morph.frame();
        let (Some(lower), Some(upper)) = (morph.buffers.get(frame.key1), morph.buffers.get(frame.key2)) else {
            return Err(RenderError::ResourceCreation("morph geometry has no GPU buffers".to_string()));
        };
        let pass = cx.pass();

        bind_attribute(cx.gl, self.position.get(pass), Some(lower.positions), 3);
        bind_attribute(cx.gl, self.morph_position.get(pass), Some(upper.positions), 3);
        bind_attribute(cx.gl, self.normal.get(pass), lower.normals, 3);
        bind_attribute(cx.gl, self.morph_normal.get(pass), upper.normals, 3);
        if let Some(location) = self.factor.get(pass) {
            cx.gl.uniform_1f(location, frame.factor);
        }
        Ok(())
    }
}

/// Issues the indexed draw
#[derive(Debug, Default)]
pub(super) struct DrawChunk;

impl DrawChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }
}

impl ChunkBehavior for DrawChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let geometry = cx.core_as(CoreData::as_geometry)?;
        cx.gl.draw_elements(geometry.primitive, geometry.index_count(), 0);
        cx.frame.stats.draw_calls += 1;
        Ok(())
    }
}
