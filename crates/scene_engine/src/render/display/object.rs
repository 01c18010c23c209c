//! Drawables and their pool
//!
//! A [`DisplayObject`] is one drawable as the display sees it: the cores it
//! was built from, the program chosen for them and the chunk in every slot.
//! Objects are recycled through the [`ObjectFactory`] so that scenes which
//! rebuild their drawables every few frames do not churn allocations.

use crate::core::config::PoolingPolicy;
use crate::render::chunks::{ChunkKey, ChunkKind};
use crate::render::cores::{CoreKey, CoreType};

use super::draw_list::SortKey;

/// Cores a drawable is built from
///
/// Only `geometry` is required. Missing transform, state and material cores
/// fall back to the display's defaults; missing shader, lights, texture,
/// clips and morph cores leave their slots empty.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrawState {
    /// Vertex data
    pub geometry: Option<CoreKey>,
    /// Morph targets animating the geometry
    pub morph_geometry: Option<CoreKey>,
    /// Custom shader code
    pub shader: Option<CoreKey>,
    /// Custom shader parameter overrides
    pub shader_params: Option<CoreKey>,
    /// Model transform
    pub xform: Option<CoreKey>,
    /// View transform
    pub look_at: Option<CoreKey>,
    /// Projection
    pub camera: Option<CoreKey>,
    /// Culling, picking and transparency flags
    pub flags: Option<CoreKey>,
    /// Depth test state
    pub depth_buffer: Option<CoreKey>,
    /// Blend and colour mask state
    pub color_buffer: Option<CoreKey>,
    /// Scissor state
    pub view: Option<CoreKey>,
    /// Pick name
    pub name: Option<CoreKey>,
    /// Lights
    pub lights: Option<CoreKey>,
    /// Material
    pub material: Option<CoreKey>,
    /// Texture layers
    pub texture: Option<CoreKey>,
    /// Clip planes
    pub clips: Option<CoreKey>,
    /// Line width and viewport
    pub renderer: Option<CoreKey>,
    /// Render stage
    pub stage: Option<CoreKey>,
    /// Layer
    pub layer: Option<CoreKey>,
    /// Enable switch
    pub enable: Option<CoreKey>,
    /// Off-screen target
    pub render_target: Option<CoreKey>,
}

impl DrawState {
    /// State with only a geometry
    pub fn with_geometry(geometry: CoreKey) -> Self {
        Self {
            geometry: Some(geometry),
            ..Self::default()
        }
    }

    /// Every field paired with the core type it must hold
    pub fn typed_cores(&self) -> [(CoreType, Option<CoreKey>); 21] {
        [
            (CoreType::Geometry, self.geometry),
            (CoreType::MorphGeometry, self.morph_geometry),
            (CoreType::Shader, self.shader),
            (CoreType::ShaderParams, self.shader_params),
            (CoreType::Xform, self.xform),
            (CoreType::LookAt, self.look_at),
            (CoreType::Camera, self.camera),
            (CoreType::Flags, self.flags),
            (CoreType::DepthBuffer, self.depth_buffer),
            (CoreType::ColorBuffer, self.color_buffer),
            (CoreType::View, self.view),
            (CoreType::Name, self.name),
            (CoreType::Lights, self.lights),
            (CoreType::Material, self.material),
            (CoreType::Texture, self.texture),
            (CoreType::Clips, self.clips),
            (CoreType::Renderer, self.renderer),
            (CoreType::Stage, self.stage),
            (CoreType::Layer, self.layer),
            (CoreType::Enable, self.enable),
            (CoreType::RenderTarget, self.render_target),
        ]
    }

    /// Core feeding a chunk slot
    pub fn core_for(&self, kind: ChunkKind) -> Option<CoreKey> {
        match kind {
            ChunkKind::Program => None,
            ChunkKind::Xform => self.xform,
            ChunkKind::LookAt => self.look_at,
            ChunkKind::Camera => self.camera,
            ChunkKind::Flags => self.flags,
            ChunkKind::Shader => self.shader,
            ChunkKind::ShaderParams => self.shader_params,
            ChunkKind::DepthBuffer => self.depth_buffer,
            ChunkKind::ColorBuffer => self.color_buffer,
            ChunkKind::View => self.view,
            ChunkKind::Name => self.name,
            ChunkKind::Lights => self.lights,
            ChunkKind::Material => self.material,
            ChunkKind::Texture => self.texture,
            ChunkKind::Clips => self.clips,
            ChunkKind::Renderer => self.renderer,
            ChunkKind::Geometry | ChunkKind::Draw => self.geometry,
            ChunkKind::MorphGeometry => self.morph_geometry,
            ChunkKind::RenderTarget => self.render_target,
        }
    }
}

/// A drawable owned by a display
#[derive(Debug)]
pub struct DisplayObject {
    pub(super) id: String,
    pub(super) instance_id: u64,
    pub(super) seq: u64,
    pub(super) state: DrawState,
    pub(super) program: Option<u32>,
    pub(super) chunks: [Option<ChunkKey>; ChunkKind::OBJECT_SLOTS],
    pub(super) sort_key: SortKey,
}

impl DisplayObject {
    fn new(id: String, instance_id: u64) -> Self {
        Self {
            id,
            instance_id,
            seq: 0,
            state: DrawState::default(),
            program: None,
            chunks: [None; ChunkKind::OBJECT_SLOTS],
            sort_key: SortKey::default(),
        }
    }

    /// Id given by the scene
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Identity of the underlying pooled instance
    pub fn instance_id(&self) -> u64 {
        self.instance_id
    }

    /// Resolved cores
    pub fn state(&self) -> &DrawState {
        &self.state
    }

    /// Program id
    pub fn program(&self) -> Option<u32> {
        self.program
    }

    /// Chunk in a slot
    pub fn chunk(&self, kind: ChunkKind) -> Option<ChunkKey> {
        kind.slot().and_then(|slot| self.chunks[slot])
    }

    /// Sort key from the last time the object was built or re-keyed
    pub fn sort_key(&self) -> SortKey {
        self.sort_key
    }
}

/// Pool of display objects
///
/// Release returns an object to a LIFO free list, so the next acquisition
/// reuses the most recently released instance. With
/// [`PoolingPolicy::Disabled`] released objects are dropped instead.
#[derive(Debug)]
pub struct ObjectFactory {
    free: Vec<DisplayObject>,
    policy: PoolingPolicy,
    next_instance: u64,
}

impl ObjectFactory {
    /// Create a pool
    pub fn new(policy: PoolingPolicy, capacity: usize) -> Self {
        Self {
            free: Vec::with_capacity(capacity),
            policy,
            next_instance: 0,
        }
    }

    /// Take an object for `id`, reusing a released one if possible
    ///
    /// Reused objects come back as released. The caller rebuilds their
    /// chunks before use.
    pub fn acquire(&mut self, id: &str) -> DisplayObject {
        if let Some(mut object) = self.free.pop() {
            log::trace!("Reusing object instance {} for {id}", object.instance_id);
            id.clone_into(&mut object.id);
            return object;
        }
        let instance_id = self.next_instance;
        self.next_instance += 1;
        DisplayObject::new(id.to_string(), instance_id)
    }

    /// Return an object to the pool
    pub fn release(&mut self, object: DisplayObject) {
        match self.policy {
            PoolingPolicy::Recycle => self.free.push(object),
            PoolingPolicy::Disabled => {}
        }
    }

    /// Number of objects waiting for reuse
    pub fn free_len(&self) -> usize {
        self.free.len()
    }

    /// Number of instances ever allocated
    pub fn allocated(&self) -> u64 {
        self.next_instance
    }

    /// Pooling policy
    pub fn policy(&self) -> PoolingPolicy {
        self.policy
    }
}

impl Default for ObjectFactory {
    fn default() -> Self {
        Self::new(PoolingPolicy::default(), 0)
    }
}
