use super::{ChunkBehavior, DrawContext};
use crate::render::display::set_cached;
use crate::render::gl::ClearMask;
use crate::render::{RenderError, RenderResult};

/// Switches rendering into a target framebuffer, or back to the canvas
///
/// Appended to the draw list between bins. A chunk without a core unbinds
/// whatever target is current.
#[derive(Debug, Default)]
pub(super) struct RenderTargetChunk;

impl RenderTargetChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }
}

impl ChunkBehavior for RenderTargetChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let Some(core) = cx.core else {
            if cx.frame.render_target.take().is_some() {
                cx.gl.bind_framebuffer(None);
                let (width, height) = cx.frame.drawing_buffer_size;
                let viewport = [0, 0, width as i32, height as i32];
                cx.frame.viewport = Some(viewport);
                cx.gl.viewport(0, 0, viewport[2], viewport[3]);
            }
            return Ok(());
        };

        let target = core
            .data()
            .as_render_target()
            .ok_or_else(|| RenderError::Configuration(format!("render target chunk bound to a {:?} core", core.core_type())))?;
        let framebuffer = target
            .framebuffer
            .ok_or_else(|| RenderError::ResourceCreation("render target has no framebuffer".to_string()))?;

        log::trace!("Binding {}x{} render target", target.width, target.height);
        cx.frame.render_target = Some(framebuffer);
        cx.gl.bind_framebuffer(Some(framebuffer));
        let viewport = [0, 0, target.width as i32, target.height as i32];
        if set_cached(&mut cx.frame.viewport, viewport) {
            cx.gl.viewport(0, 0, viewport[2], viewport[3]);
        }
        cx.gl.clear(ClearMask::COLOR | ClearMask::DEPTH);
        Ok(())
    }
}
