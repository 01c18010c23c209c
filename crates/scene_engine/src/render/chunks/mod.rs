//! Chunks: the units a draw list is made of
//!
//! A chunk applies one slice of GL state (a program, a transform, a material,
//! a geometry binding, the draw itself) for a drawable. Chunks are shared:
//! two drawables that use the same program and the same core get the same
//! chunk, which is what lets the draw-list builder drop a chunk when the
//! previous drawable already applied it.
//!
//! Each chunk kind has a fixed slot in a drawable's chunk list; the slot
//! order is the order chunks run in. [`ChunkFactory`] owns the registered
//! [`ChunkType`]s and every live chunk.

mod geometry;
mod picking;
mod shading;
mod state;
mod target;
mod transform;

use std::collections::HashMap;
use std::fmt;

use crate::foundation::collections::{new_key_type, SlotMap};
use crate::render::cores::{Core, CoreData, CoreKey, CoreRegistry, CoreType};
use crate::render::display::{FrameContext, Pass};
use crate::render::gl::{AttribLocation, GlContext, UniformLocation};
use crate::render::program::{Program, ProgramFactory};
use crate::render::{RenderError, RenderResult};

new_key_type! {
    /// Handle to a live chunk
    pub struct ChunkKey;
}

/// Chunk kinds, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ChunkKind {
    /// Binds the drawable's program
    Program,
    /// Model matrix
    Xform,
    /// View matrix
    LookAt,
    /// Projection matrix
    Camera,
    /// Culling, winding and transparency
    Flags,
    /// Custom shader parameters
    Shader,
    /// Custom shader parameter overrides
    ShaderParams,
    /// Depth test and writes
    DepthBuffer,
    /// Blending and colour mask
    ColorBuffer,
    /// Scissor test
    View,
    /// Pick colour
    Name,
    /// Light uniforms
    Lights,
    /// Material uniforms
    Material,
    /// Texture bindings
    Texture,
    /// Clip plane uniforms
    Clips,
    /// Line width and viewport
    Renderer,
    /// Vertex and index buffer bindings
    Geometry,
    /// Morph target bindings, replacing the geometry's positions and normals
    MorphGeometry,
    /// The indexed draw
    Draw,
    /// Render target switch; appended between bins rather than per drawable
    RenderTarget,
}

impl ChunkKind {
    /// Number of per-drawable slots
    pub const OBJECT_SLOTS: usize = 19;

    /// Per-drawable kinds in slot order
    pub const OBJECT_KINDS: [Self; Self::OBJECT_SLOTS] = [
        Self::Program,
        Self::Xform,
        Self::LookAt,
        Self::Camera,
        Self::Flags,
        Self::Shader,
        Self::ShaderParams,
        Self::DepthBuffer,
        Self::ColorBuffer,
        Self::View,
        Self::Name,
        Self::Lights,
        Self::Material,
        Self::Texture,
        Self::Clips,
        Self::Renderer,
        Self::Geometry,
        Self::MorphGeometry,
        Self::Draw,
    ];

    /// Slot in a drawable's chunk list
    pub fn slot(self) -> Option<usize> {
        match self {
            Self::RenderTarget => None,
            kind => Some(kind as usize),
        }
    }

    /// Type of the core the chunk reads, if any
    pub fn core_type(self) -> Option<CoreType> {
        match self {
            Self::Program => None,
            Self::Xform => Some(CoreType::Xform),
            Self::LookAt => Some(CoreType::LookAt),
            Self::Camera => Some(CoreType::Camera),
            Self::Flags => Some(CoreType::Flags),
            Self::Shader => Some(CoreType::Shader),
            Self::ShaderParams => Some(CoreType::ShaderParams),
            Self::DepthBuffer => Some(CoreType::DepthBuffer),
            Self::ColorBuffer => Some(CoreType::ColorBuffer),
            Self::View => Some(CoreType::View),
            Self::Name => Some(CoreType::Name),
            Self::Lights => Some(CoreType::Lights),
            Self::Material => Some(CoreType::Material),
            Self::Texture => Some(CoreType::Texture),
            Self::Clips => Some(CoreType::Clips),
            Self::Renderer => Some(CoreType::Renderer),
            Self::Geometry | Self::Draw => Some(CoreType::Geometry),
            Self::MorphGeometry => Some(CoreType::MorphGeometry),
            Self::RenderTarget => Some(CoreType::RenderTarget),
        }
    }
}

bitflags::bitflags! {
    /// Hooks a chunk type implements
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ChunkHooks: u8 {
        /// Resolves locations once the program is compiled
        const BUILD = 0b0001;
        /// Runs in the colour pass
        const DRAW = 0b0010;
        /// Runs its pick hook in the pick pass
        const PICK = 0b0100;
        /// Runs its draw hook in both passes
        const DRAW_AND_PICK = 0b1000;
    }
}

/// Registration record for a chunk kind
#[derive(Debug, Clone, Copy)]
pub struct ChunkType {
    /// Kind registered
    pub kind: ChunkKind,
    /// Shared across programs; the chunk id ignores the program
    pub program_global: bool,
    /// Never dropped from a draw list even when the previous drawable used it
    pub unique: bool,
    /// Hooks implemented
    pub hooks: ChunkHooks,
    /// Creates the behaviour for a new chunk
    pub create: fn() -> Box<dyn ChunkBehavior>,
}

/// Location resolved against both programs of a [`Program`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassLocations<T> {
    /// Location in the colour-pass program
    pub draw: Option<T>,
    /// Location in the pick-pass program
    pub pick: Option<T>,
}

impl<T> Default for PassLocations<T> {
    fn default() -> Self {
        Self { draw: None, pick: None }
    }
}

impl<T: Copy> PassLocations<T> {
    /// Location for a pass
    pub fn get(&self, pass: Pass) -> Option<T> {
        match pass {
            Pass::Color => self.draw,
            Pass::Pick => self.pick,
        }
    }
}

/// Inputs to a chunk's build hook
pub struct BuildContext<'a> {
    /// Graphics context
    pub gl: &'a mut dyn GlContext,
    /// Compiled program the chunk belongs to; `None` for program-global chunks
    pub program: Option<&'a Program>,
    /// Core the chunk reads
    pub core: Option<&'a Core>,
}

impl<'a> BuildContext<'a> {
    /// Resolve a uniform in both passes
    pub fn uniform(&mut self, name: &str) -> PassLocations<UniformLocation> {
        let Some(program) = self.program else {
            return PassLocations::default();
        };
        PassLocations {
            draw: program
                .handle(Pass::Color)
                .and_then(|handle| self.gl.uniform_location(handle, name)),
            pick: program
                .handle(Pass::Pick)
                .and_then(|handle| self.gl.uniform_location(handle, name)),
        }
    }

    /// Resolve a vertex attribute in both passes
    pub fn attrib(&mut self, name: &str) -> PassLocations<AttribLocation> {
        let Some(program) = self.program else {
            return PassLocations::default();
        };
        PassLocations {
            draw: program
                .handle(Pass::Color)
                .and_then(|handle| self.gl.attrib_location(handle, name)),
            pick: program
                .handle(Pass::Pick)
                .and_then(|handle| self.gl.attrib_location(handle, name)),
        }
    }

    /// The core's payload, viewed as one variant
    pub fn core_as<T>(&self, view: impl FnOnce(&'a CoreData) -> Option<&'a T>) -> RenderResult<&'a T> {
        core_as(self.core, view)
    }
}

fn core_as<'a, T>(core: Option<&'a Core>, view: impl FnOnce(&'a CoreData) -> Option<&'a T>) -> RenderResult<&'a T> {
    let core = core.ok_or(RenderError::UnknownCore)?;
    view(core.data())
        .ok_or_else(|| RenderError::Configuration(format!("chunk bound to a {:?} core", core.core_type())))
}

/// Inputs to a chunk's draw and pick hooks
pub struct DrawContext<'a> {
    /// Graphics context
    pub gl: &'a mut dyn GlContext,
    /// Frame state cache
    pub frame: &'a mut FrameContext,
    /// Program the chunk belongs to; `None` for program-global chunks
    pub program: Option<&'a Program>,
    /// Core the chunk reads
    pub core: Option<&'a Core>,
}

impl<'a> DrawContext<'a> {
    /// Pass being executed
    pub fn pass(&self) -> Pass {
        self.frame.pass
    }

    /// The core's payload, viewed as one variant
    pub fn core_as<T>(&self, view: impl FnOnce(&'a CoreData) -> Option<&'a T>) -> RenderResult<&'a T> {
        core_as(self.core, view)
    }
}

/// Behaviour of one chunk instance
///
/// `build` runs once per chunk after its program is compiled (and again
/// after a context restore). `draw` and `pick` run every time the chunk is
/// reached in a draw list.
pub trait ChunkBehavior: fmt::Debug + Send {
    /// Resolve program locations
    fn build(&mut self, _cx: &mut BuildContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Apply state for the colour pass (and the pick pass for `DRAW_AND_PICK` chunks)
    fn draw(&self, _cx: &mut DrawContext<'_>) -> RenderResult<()> {
        Ok(())
    }

    /// Apply state for the pick pass
    fn pick(&self, _cx: &mut DrawContext<'_>) -> RenderResult<()> {
        Ok(())
    }
}

/// Identity of a chunk
///
/// Program-global chunks carry no program, so every program shares them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId {
    /// Kind
    pub kind: ChunkKind,
    /// Program id for program-scoped chunks
    pub program: Option<u32>,
    /// Core read by the chunk
    pub core: Option<CoreKey>,
}

/// A live chunk
#[derive(Debug)]
pub struct Chunk {
    id: ChunkId,
    hooks: ChunkHooks,
    unique: bool,
    use_count: u32,
    built: bool,
    behavior: Box<dyn ChunkBehavior>,
}

impl Chunk {
    /// Identity
    pub fn id(&self) -> ChunkId {
        self.id
    }

    /// Kind
    pub fn kind(&self) -> ChunkKind {
        self.id.kind
    }

    /// Never deduplicated in draw lists
    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Build hook has run against the current context
    pub fn is_built(&self) -> bool {
        self.built
    }

    /// Number of drawables holding the chunk
    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    /// Whether the chunk does anything in a pass
    pub fn runs_in(&self, pass: Pass) -> bool {
        match pass {
            Pass::Color => self.hooks.intersects(ChunkHooks::DRAW | ChunkHooks::DRAW_AND_PICK),
            Pass::Pick => self.hooks.intersects(ChunkHooks::PICK | ChunkHooks::DRAW_AND_PICK),
        }
    }

    /// Run the hook for the context's pass; returns whether a hook ran
    pub fn apply(&self, cx: &mut DrawContext<'_>) -> RenderResult<bool> {
        match cx.pass() {
            Pass::Color if self.runs_in(Pass::Color) => self.behavior.draw(cx)?,
            Pass::Pick if self.hooks.contains(ChunkHooks::PICK) => self.behavior.pick(cx)?,
            Pass::Pick if self.hooks.contains(ChunkHooks::DRAW_AND_PICK) => self.behavior.draw(cx)?,
            _ => return Ok(false),
        }
        Ok(true)
    }
}

/// Registry of chunk types and owner of live chunks
#[derive(Debug)]
pub struct ChunkFactory {
    types: HashMap<ChunkKind, ChunkType>,
    chunks: SlotMap<ChunkKey, Chunk>,
    by_id: HashMap<ChunkId, ChunkKey>,
}

impl ChunkFactory {
    /// Create a factory with no chunk types
    pub fn new() -> Self {
        Self {
            types: HashMap::new(),
            chunks: SlotMap::with_key(),
            by_id: HashMap::new(),
        }
    }

    /// Create a factory with every built-in chunk type registered
    pub fn with_builtin_types() -> Self {
        let mut factory = Self::new();
        for chunk_type in builtin_types() {
            factory.create_chunk_type(chunk_type);
        }
        factory
    }

    /// Register a chunk type, replacing any previous registration for its kind
    pub fn create_chunk_type(&mut self, chunk_type: ChunkType) {
        if self.types.insert(chunk_type.kind, chunk_type).is_some() {
            log::debug!("Replaced chunk type {:?}", chunk_type.kind);
        }
    }

    /// Registered type for a kind
    pub fn chunk_type(&self, kind: ChunkKind) -> Option<&ChunkType> {
        self.types.get(&kind)
    }

    /// Get the chunk for a kind, program and core, creating it if needed
    ///
    /// The program is ignored for program-global kinds. A new chunk is not
    /// built until [`build_pending`](Self::build_pending) runs.
    pub fn get_chunk(&mut self, kind: ChunkKind, program: Option<u32>, core: Option<CoreKey>) -> RenderResult<ChunkKey> {
        let chunk_type = *self
            .types
            .get(&kind)
            .ok_or_else(|| RenderError::Configuration(format!("no chunk type registered for {kind:?}")))?;
        let id = ChunkId {
            kind,
            program: if chunk_type.program_global { None } else { program },
            core,
        };

        if let Some(&key) = self.by_id.get(&id) {
            if let Some(chunk) = self.chunks.get_mut(key) {
                chunk.use_count += 1;
                return Ok(key);
            }
        }

        let key = self.chunks.insert(Chunk {
            id,
            hooks: chunk_type.hooks,
            unique: chunk_type.unique,
            use_count: 1,
            built: !chunk_type.hooks.contains(ChunkHooks::BUILD),
            behavior: (chunk_type.create)(),
        });
        self.by_id.insert(id, key);
        Ok(key)
    }

    /// Release one hold on a chunk, destroying it at zero
    pub fn put_chunk(&mut self, key: ChunkKey) {
        let Some(chunk) = self.chunks.get_mut(key) else {
            return;
        };
        chunk.use_count -= 1;
        if chunk.use_count == 0 {
            if let Some(chunk) = self.chunks.remove(key) {
                self.by_id.remove(&chunk.id);
            }
        }
    }

    /// Look up a chunk
    pub fn get(&self, key: ChunkKey) -> Option<&Chunk> {
        self.chunks.get(key)
    }

    /// Number of live chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether no chunks are live
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Run the build hook of every unbuilt chunk whose program is compiled
    ///
    /// Returns how many chunks were built.
    pub fn build_pending(
        &mut self,
        gl: &mut dyn GlContext,
        programs: &ProgramFactory,
        cores: &CoreRegistry,
    ) -> RenderResult<usize> {
        let mut built = 0;
        for chunk in self.chunks.values_mut().filter(|chunk| !chunk.built) {
            let program = match chunk.id.program {
                Some(id) => match programs.get(id) {
                    Some(program) if program.is_compiled() => Some(program),
                    _ => continue,
                },
                None => None,
            };
            let core = match chunk.id.core {
                Some(key) => Some(cores.get(key).ok_or(RenderError::UnknownCore)?),
                None => None,
            };
            let mut cx = BuildContext { gl: &mut *gl, program, core };
            chunk.behavior.build(&mut cx)?;
            chunk.built = true;
            built += 1;
        }
        Ok(built)
    }

    /// Mark every chunk for rebuild after a context restore
    pub fn webgl_restored(&mut self) {
        for chunk in self.chunks.values_mut() {
            chunk.built = !chunk.hooks.contains(ChunkHooks::BUILD);
        }
    }
}

impl Default for ChunkFactory {
    fn default() -> Self {
        Self::with_builtin_types()
    }
}

fn builtin_types() -> Vec<ChunkType> {
    let draw_and_pick = ChunkHooks::BUILD | ChunkHooks::DRAW_AND_PICK;
    let draw = ChunkHooks::BUILD | ChunkHooks::DRAW;
    let entry = |kind, program_global, unique, hooks, create: fn() -> Box<dyn ChunkBehavior>| ChunkType {
        kind,
        program_global,
        unique,
        hooks,
        create,
    };
    vec![
        entry(ChunkKind::Program, false, false, ChunkHooks::DRAW | ChunkHooks::PICK, shading::ProgramChunk::boxed),
        entry(ChunkKind::Xform, false, false, draw_and_pick, transform::XformChunk::boxed),
        entry(ChunkKind::LookAt, false, false, draw_and_pick, transform::LookAtChunk::boxed),
        entry(ChunkKind::Camera, false, false, draw_and_pick, transform::CameraChunk::boxed),
        entry(ChunkKind::Flags, true, false, ChunkHooks::DRAW | ChunkHooks::PICK, state::FlagsChunk::boxed),
        entry(ChunkKind::Shader, false, false, draw_and_pick, shading::ShaderChunk::boxed),
        entry(ChunkKind::ShaderParams, false, false, draw_and_pick, shading::ShaderParamsChunk::boxed),
        entry(ChunkKind::DepthBuffer, true, false, ChunkHooks::DRAW_AND_PICK, state::DepthBufferChunk::boxed),
        entry(ChunkKind::ColorBuffer, true, false, ChunkHooks::DRAW, state::ColorBufferChunk::boxed),
        entry(ChunkKind::View, true, false, ChunkHooks::DRAW_AND_PICK, state::ViewChunk::boxed),
        entry(ChunkKind::Name, false, true, ChunkHooks::BUILD | ChunkHooks::PICK, picking::NameChunk::boxed),
        entry(ChunkKind::Lights, false, false, draw, shading::LightsChunk::boxed),
        entry(ChunkKind::Material, false, false, draw, shading::MaterialChunk::boxed),
        entry(ChunkKind::Texture, false, false, draw, shading::TextureChunk::boxed),
        entry(ChunkKind::Clips, false, false, draw_and_pick, shading::ClipsChunk::boxed),
        entry(ChunkKind::Renderer, true, false, ChunkHooks::DRAW_AND_PICK, state::RendererChunk::boxed),
        entry(ChunkKind::Geometry, false, false, draw_and_pick, geometry::GeometryChunk::boxed),
        entry(ChunkKind::MorphGeometry, false, false, draw_and_pick, geometry::MorphGeometryChunk::boxed),
        entry(ChunkKind::Draw, false, true, ChunkHooks::DRAW_AND_PICK, geometry::DrawChunk::boxed),
        entry(ChunkKind::RenderTarget, true, false, ChunkHooks::DRAW, target::RenderTargetChunk::boxed),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::cores::FlagsCore;

    #[test]
    fn test_slots_follow_kind_order() {
        for (slot, kind) in ChunkKind::OBJECT_KINDS.iter().enumerate() {
            assert_eq!(kind.slot(), Some(slot));
        }
        assert_eq!(ChunkKind::RenderTarget.slot(), None);
    }

    #[test]
    fn test_every_kind_has_a_builtin_type() {
        let factory = ChunkFactory::with_builtin_types();
        for kind in ChunkKind::OBJECT_KINDS {
            assert!(factory.chunk_type(kind).is_some(), "{kind:?}");
        }
        assert!(factory.chunk_type(ChunkKind::RenderTarget).is_some());
    }

    #[test]
    fn test_chunks_shared_by_program_and_core() {
        let mut cores = CoreRegistry::new();
        let flags = cores.get_or_insert_core(None, CoreData::Flags(FlagsCore::default()));
        let mut factory = ChunkFactory::with_builtin_types();

        let a = factory.get_chunk(ChunkKind::Material, Some(1), Some(flags)).unwrap();
        let b = factory.get_chunk(ChunkKind::Material, Some(1), Some(flags)).unwrap();
        let c = factory.get_chunk(ChunkKind::Material, Some(2), Some(flags)).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(factory.get(a).unwrap().use_count(), 2);

        let global_1 = factory.get_chunk(ChunkKind::Flags, Some(1), Some(flags)).unwrap();
        let global_2 = factory.get_chunk(ChunkKind::Flags, Some(2), Some(flags)).unwrap();
        assert_eq!(global_1, global_2);
        assert_eq!(factory.get(global_1).unwrap().id().program, None);
    }

    #[test]
    fn test_put_chunk_destroys_at_zero() {
        let mut factory = ChunkFactory::with_builtin_types();
        let a = factory.get_chunk(ChunkKind::Program, Some(1), None).unwrap();
        factory.get_chunk(ChunkKind::Program, Some(1), None).unwrap();
        factory.put_chunk(a);
        assert!(factory.get(a).is_some());
        factory.put_chunk(a);
        assert!(factory.get(a).is_none());
        assert!(factory.is_empty());

        let fresh = factory.get_chunk(ChunkKind::Program, Some(1), None).unwrap();
        assert_eq!(factory.get(fresh).unwrap().use_count(), 1);
    }

    #[test]
    fn test_unregistered_kind_is_a_configuration_error() {
        let mut factory = ChunkFactory::new();
        assert!(matches!(
            factory.get_chunk(ChunkKind::Draw, Some(1), None),
            Err(RenderError::Configuration(_))
        ));
    }

    #[test]
    fn test_pass_participation() {
        let mut factory = ChunkFactory::with_builtin_types();
        let color_buffer = factory.get_chunk(ChunkKind::ColorBuffer, None, None).unwrap();
        let name = factory.get_chunk(ChunkKind::Name, Some(1), None).unwrap();
        let draw = factory.get_chunk(ChunkKind::Draw, Some(1), None).unwrap();

        let color_buffer = factory.get(color_buffer).unwrap();
        assert!(color_buffer.runs_in(Pass::Color));
        assert!(!color_buffer.runs_in(Pass::Pick));

        let name = factory.get(name).unwrap();
        assert!(!name.runs_in(Pass::Color));
        assert!(name.runs_in(Pass::Pick));
        assert!(name.is_unique());

        let draw = factory.get(draw).unwrap();
        assert!(draw.runs_in(Pass::Color) && draw.runs_in(Pass::Pick));
    }
}
