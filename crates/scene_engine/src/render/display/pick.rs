//! Colour-indexed picking
//!
//! The pick pass draws every pickable drawable in a flat colour that encodes
//! its pick index, then reads back the single pixel under the cursor. Index
//! `i` is stored as `i + 1` across the red, green and blue bytes so that the
//! cleared background (all zero) decodes to "nothing hit".

use crate::render::gl::{GlContext, GlFramebuffer};
use crate::render::{RenderError, RenderResult};

/// Largest pick index; 24 bits minus the background value
pub const MAX_PICK_INDEX: u32 = 0x00FF_FFFE;

/// Pick colour for an index, as normalised RGBA
pub fn encode_pick_color(index: u32) -> [f32; 4] {
    let value = (index % (MAX_PICK_INDEX + 1)) + 1;
    let channel = |shift: u32| ((value >> shift) & 0xFF) as f32 / 255.0;
    [channel(0), channel(8), channel(16), 1.0]
}

/// Pick index encoded in a read-back pixel; `None` for the background
pub fn decode_pick_color(pixel: [u8; 4]) -> Option<u32> {
    let [r, g, b, _] = pixel;
    let value = u32::from(r) | (u32::from(g) << 8) | (u32::from(b) << 16);
    value.checked_sub(1)
}

/// What a pick hit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PickHit {
    /// Id of the drawable under the cursor
    pub object_id: String,
    /// Name from the drawable's name core
    pub name: Option<String>,
    /// Scene node that owns the name
    pub node_id: Option<String>,
    /// Path of enclosing names
    pub path: Option<String>,
    /// Canvas position that was picked
    pub canvas_pos: [u32; 2],
}

/// Off-screen framebuffer the pick pass renders into
#[derive(Debug)]
pub struct PickBuffer {
    framebuffer: GlFramebuffer,
    width: u32,
    height: u32,
}

impl PickBuffer {
    /// Create a pick buffer matching the drawing buffer
    pub fn create(gl: &mut dyn GlContext) -> RenderResult<Self> {
        let (width, height) = gl.drawing_buffer_size();
        let framebuffer = gl
            .create_framebuffer(width, height)
            .map_err(RenderError::ResourceCreation)?;
        log::debug!("Created {width}x{height} pick buffer");
        Ok(Self {
            framebuffer,
            width,
            height,
        })
    }

    /// Recreate the buffer if the drawing buffer was resized
    pub fn ensure_size(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        if gl.drawing_buffer_size() != (self.width, self.height) {
            gl.delete_framebuffer(self.framebuffer);
            *self = Self::create(gl)?;
        }
        Ok(())
    }

    /// Bind for rendering
    pub fn bind(&self, gl: &mut dyn GlContext) {
        gl.bind_framebuffer(Some(self.framebuffer));
    }

    /// Restore the default framebuffer
    pub fn unbind(&self, gl: &mut dyn GlContext) {
        gl.bind_framebuffer(None);
    }

    /// Read the pixel under a canvas position (origin top-left)
    ///
    /// Positions outside the buffer read as background.
    pub fn read(&self, gl: &mut dyn GlContext, x: u32, y: u32) -> [u8; 4] {
        if x >= self.width || y >= self.height {
            return [0; 4];
        }
        gl.read_pixel(x, self.height - 1 - y)
    }

    /// Delete the framebuffer
    pub fn destroy(self, gl: &mut dyn GlContext) {
        gl.delete_framebuffer(self.framebuffer);
    }
}
