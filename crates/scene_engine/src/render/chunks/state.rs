//! Fixed-function state chunks
//!
//! These chunks are program-global: the state they set does not depend on
//! the bound program, so one chunk per core serves every program.

use super::{ChunkBehavior, DrawContext};
use crate::render::cores::CoreData;
use crate::render::display::{set_cached, Pass};
use crate::render::gl::{BlendFactor, Capability, CullFace};
use crate::render::RenderResult;

/// Culling, winding and the transparency switch
#[derive(Debug, Default)]
pub(super) struct FlagsChunk;

impl FlagsChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }

    fn apply(cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let flags = cx.core_as(CoreData::as_flags)?;

        // Entering or leaving the transparency bin forces blend state,
        // whatever the colour buffer chunk last cached.
        if cx.pass() == Pass::Color && cx.frame.transparent != flags.transparent {
            cx.frame.transparent = flags.transparent;
            cx.frame.set_blend(cx.gl, flags.transparent, true);
            if flags.transparent {
                cx.gl.blend_func(BlendFactor::SrcAlpha, BlendFactor::OneMinusSrcAlpha);
            }
        }

        if set_cached(&mut cx.frame.backfaces, flags.backfaces) {
            if flags.backfaces {
                cx.gl.disable(Capability::CullFace);
            } else {
                cx.gl.enable(Capability::CullFace);
                cx.gl.cull_face(CullFace::Back);
            }
            cx.frame.stats.state_changes += 1;
        }

        if set_cached(&mut cx.frame.front_face, flags.front_face) {
            cx.gl.front_face(flags.front_face);
            cx.frame.stats.state_changes += 1;
        }
        Ok(())
    }
}

impl ChunkBehavior for FlagsChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        Self::apply(cx)
    }

    fn pick(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        Self::apply(cx)
    }
}

/// Depth test, function and writes
#[derive(Debug, Default)]
pub(super) struct DepthBufferChunk;

impl DepthBufferChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }
}

impl ChunkBehavior for DepthBufferChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let depth = cx.core_as(CoreData::as_depth_buffer)?;
        cx.frame
            .set_capability(cx.gl, |f| &mut f.depth_test, Capability::DepthTest, depth.enabled);
        if set_cached(&mut cx.frame.depth_func, depth.func) {
            cx.gl.depth_func(depth.func);
            cx.frame.stats.state_changes += 1;
        }
        if set_cached(&mut cx.frame.depth_mask, depth.write) {
            cx.gl.depth_mask(depth.write);
            cx.frame.stats.state_changes += 1;
        }
        Ok(())
    }
}

/// Blending and colour write mask
#[derive(Debug, Default)]
pub(super) struct ColorBufferChunk;

impl ColorBufferChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }
}

impl ChunkBehavior for ColorBufferChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let color = cx.core_as(CoreData::as_color_buffer)?;
        if !cx.frame.transparent {
            cx.frame.set_blend(cx.gl, color.blend_enabled, false);
        }
        if set_cached(&mut cx.frame.color_mask, color.color_mask) {
            cx.gl.color_mask(color.color_mask);
            cx.frame.stats.state_changes += 1;
        }
        Ok(())
    }
}

/// Scissor test
#[derive(Debug, Default)]
pub(super) struct ViewChunk;

impl ViewChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }
}

impl ChunkBehavior for ViewChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let view = cx.core_as(CoreData::as_view)?;
        cx.frame
            .set_capability(cx.gl, |f| &mut f.scissor_test, Capability::ScissorTest, view.scissor_test);
        Ok(())
    }
}

/// Line width and viewport
#[derive(Debug, Default)]
pub(super) struct RendererChunk;

impl RendererChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }
}

impl ChunkBehavior for RendererChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let renderer = cx.core_as(CoreData::as_renderer)?;
        if set_cached(&mut cx.frame.line_width, renderer.line_width) {
            cx.gl.line_width(renderer.line_width);
            cx.frame.stats.state_changes += 1;
        }

        // Without an explicit viewport a bound render target keeps the one
        // it set.
        let (width, height) = cx.frame.drawing_buffer_size;
        let viewport = match (renderer.viewport, cx.frame.render_target) {
            (Some(viewport), _) => viewport,
            (None, Some(_)) => return Ok(()),
            (None, None) => [0, 0, width as i32, height as i32],
        };
        if set_cached(&mut cx.frame.viewport, viewport) {
            let [x, y, w, h] = viewport;
            cx.gl.viewport(x, y, w, h);
            cx.frame.stats.state_changes += 1;
        }
        Ok(())
    }
}
