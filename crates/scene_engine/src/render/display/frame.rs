//! Per-pass frame context
//!
//! Chunks consult the frame context before touching GL state and skip the
//! call when the cached value already matches. Every cached state starts out
//! unknown at the beginning of a pass, so the first chunk to care about a
//! state always sets it.

use std::collections::HashMap;

use super::pick::MAX_PICK_INDEX;
use crate::render::gl::{Capability, DepthFunc, FrontFace, GlBuffer, GlContext, GlFramebuffer, GlProgram};

/// Which pass a draw list is executed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Pass {
    /// Visible colour pass
    #[default]
    Color,
    /// Colour-indexed pick pass
    Pick,
}

/// Counters gathered while executing a draw list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Programs made current
    pub program_binds: u32,
    /// Indexed draws issued
    pub draw_calls: u32,
    /// Blend state flips from a known value to the opposite value
    pub blend_toggles: u32,
    /// Cached GL state changes actually applied
    pub state_changes: u32,
    /// Chunk hooks invoked
    pub chunks_applied: u32,
    /// Chunks left out of the draw list because the previous object shared them
    pub chunks_skipped: u32,
    /// Drawables reached by the pass
    pub objects_drawn: u32,
}

/// Store `value` in `cache`, returning whether it changed
///
/// Callers apply the GL call only when this returns true.
pub fn set_cached<T: PartialEq + Copy>(cache: &mut Option<T>, value: T) -> bool {
    if *cache == Some(value) {
        false
    } else {
        *cache = Some(value);
        true
    }
}

/// Mutable state shared by all chunks during one pass
#[derive(Debug, Default)]
pub struct FrameContext {
    /// Pass being executed
    pub pass: Pass,
    /// Current GL program
    pub program: Option<GlProgram>,
    /// Blending enabled
    pub blend_enabled: Option<bool>,
    /// Inside the transparency bin; blending is owned by the flags chunk
    pub transparent: bool,
    /// Depth test enabled
    pub depth_test: Option<bool>,
    /// Depth function
    pub depth_func: Option<DepthFunc>,
    /// Depth writes enabled
    pub depth_mask: Option<bool>,
    /// Back faces drawn (culling disabled)
    pub backfaces: Option<bool>,
    /// Front-face winding
    pub front_face: Option<FrontFace>,
    /// Scissor test enabled
    pub scissor_test: Option<bool>,
    /// Colour write mask
    pub color_mask: Option<[bool; 4]>,
    /// Line width
    pub line_width: Option<f32>,
    /// Viewport rectangle
    pub viewport: Option<[i32; 4]>,
    /// Bound element buffer
    pub index_buffer: Option<GlBuffer>,
    /// Bound render target; `None` is the default framebuffer
    pub render_target: Option<GlFramebuffer>,
    /// Next texture unit to assign
    pub texture_unit: u32,
    /// Texture units available before wrapping
    pub max_texture_units: u32,
    /// Drawing buffer size in pixels
    pub drawing_buffer_size: (u32, u32),
    /// Index (in display order) of the drawable being executed
    pub current_object: usize,
    /// Next pick index
    pub pick_index: u32,
    /// Drawable index for each assigned pick index
    pub pick_objects: HashMap<u32, usize>,
    /// Counters
    pub stats: FrameStats,
    pick_wrapped: bool,
}

impl FrameContext {
    /// Create a context for a colour pass
    pub fn new() -> Self {
        Self {
            max_texture_units: 1,
            ..Self::default()
        }
    }

    /// Forget every cached state and counter before a pass
    pub fn reset(&mut self, pass: Pass, max_texture_units: u32, drawing_buffer_size: (u32, u32)) {
        let mut pick_objects = std::mem::take(&mut self.pick_objects);
        pick_objects.clear();
        *self = Self {
            pass,
            max_texture_units: max_texture_units.max(1),
            drawing_buffer_size,
            pick_objects,
            ..Self::default()
        };
    }

    /// Enable or disable blending
    ///
    /// Skipped when the cache already holds `enabled`, unless `force` is set.
    pub fn set_blend(&mut self, gl: &mut dyn GlContext, enabled: bool, force: bool) {
        if !force && self.blend_enabled == Some(enabled) {
            return;
        }
        if self.blend_enabled.is_some_and(|current| current != enabled) {
            self.stats.blend_toggles += 1;
        }
        if enabled {
            gl.enable(Capability::Blend);
        } else {
            gl.disable(Capability::Blend);
        }
        self.blend_enabled = Some(enabled);
        self.stats.state_changes += 1;
    }

    /// Enable or disable a capability through its cache slot
    pub fn set_capability(
        &mut self,
        gl: &mut dyn GlContext,
        slot: fn(&mut Self) -> &mut Option<bool>,
        capability: Capability,
        enabled: bool,
    ) {
        if !set_cached(slot(self), enabled) {
            return;
        }
        if enabled {
            gl.enable(capability);
        } else {
            gl.disable(capability);
        }
        self.stats.state_changes += 1;
    }

    /// Take the next texture unit, wrapping at the platform limit
    pub fn next_texture_unit(&mut self) -> u32 {
        let unit = self.texture_unit;
        self.texture_unit = (unit + 1) % self.max_texture_units.max(1);
        unit
    }

    /// Assign the next pick index to the current drawable
    ///
    /// Indices wrap to 0 after [`MAX_PICK_INDEX`]; a warning is logged once
    /// per pass and wrapped indices replace earlier assignments.
    pub fn register_pick(&mut self) -> u32 {
        let index = self.pick_index;
        self.pick_objects.insert(index, self.current_object);

        self.pick_index = if index >= MAX_PICK_INDEX {
            if !self.pick_wrapped {
                log::warn!("More than {} pickable drawables; pick indices wrapped", MAX_PICK_INDEX + 1);
                self.pick_wrapped = true;
            }
            0
        } else {
            index + 1
        };
        index
    }

    /// Drawable registered under a pick index in the last pick pass
    pub fn picked_object(&self, index: u32) -> Option<usize> {
        self.pick_objects.get(&index).copied()
    }
}
