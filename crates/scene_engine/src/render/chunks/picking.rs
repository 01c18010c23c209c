use super::{BuildContext, ChunkBehavior, DrawContext, PassLocations};
use crate::render::display::encode_pick_color;
use crate::render::gl::UniformLocation;
use crate::render::program::source::U_PICK_COLOR;
use crate::render::RenderResult;

/// Assigns the drawable a pick index and sets its pick colour
///
/// Unique, so every drawable registers its own index even when the previous
/// drawable shares its name core.
#[derive(Debug, Default)]
pub(super) struct NameChunk {
    pick_color: PassLocations<UniformLocation>,
}

impl NameChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for NameChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        self.pick_color = cx.uniform(U_PICK_COLOR);
        Ok(())
    }

    fn pick(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let index = cx.frame.register_pick();
        if let Some(location) = self.pick_color.pick {
            cx.gl.uniform_4f(location, encode_pick_color(index));
        }
        Ok(())
    }
}
