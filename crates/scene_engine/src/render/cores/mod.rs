//! Cores: shared, reference-counted units of render state
//!
//! Scene nodes do not talk to the GPU directly. Each node owns (or shares)
//! a core holding its state, and drawables reference cores by [`CoreKey`].
//! Two drawables that hold the same key are guaranteed to receive identical
//! GPU state, which is what lets the display skip redundant state changes.

pub mod data;
pub mod registry;

pub use data::{
    CameraCore, Clip, ClipMode, ClipsCore, ColorBufferCore, CoreData, DepthBufferCore, EnableCore,
    FlagsCore, GeometryArrays, GeometryBuffers, GeometryCore, LayerCore, Light, LightMode,
    LightSpace, LightsCore, LookAtCore, MaterialCore, MorphFrame, MorphGeometryCore, MorphTarget,
    MorphTargetArrays, MorphTargetBuffers, NameCore, RenderTargetCore, RendererCore,
    ShaderCore, ShaderParamsCore, StageCore, TextureApplyTo, TextureBlendMode, TextureCore,
    TextureLayer, UniformValue, ViewCore, XformCore,
};
pub use registry::CoreRegistry;

use crate::foundation::collections::new_key_type;

new_key_type! {
    /// Handle to a live core
    pub struct CoreKey;
}

/// Kinds of core; every core has exactly one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CoreType {
    /// Vertex data
    Geometry,
    /// Morph targets over a geometry
    MorphGeometry,
    /// Custom shader code
    Shader,
    /// Custom shader parameters
    ShaderParams,
    /// Model transform
    Xform,
    /// View transform
    LookAt,
    /// Projection
    Camera,
    /// Rendering flags
    Flags,
    /// Depth buffer state
    DepthBuffer,
    /// Colour buffer state
    ColorBuffer,
    /// View state
    View,
    /// Pick name
    Name,
    /// Lights
    Lights,
    /// Material
    Material,
    /// Texture stack
    Texture,
    /// Clipping planes
    Clips,
    /// Rasteriser state
    Renderer,
    /// Render stage
    Stage,
    /// Layer within a stage
    Layer,
    /// Enable switch
    Enable,
    /// Off-screen target
    RenderTarget,
}

/// Identity of a core within its type
///
/// Named cores are shared by every node that asks for the same name.
/// Anonymous cores are private to the node that created them and are
/// identified by their state id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CoreId {
    /// Caller-chosen shared id
    Named(String),
    /// Private core, keyed by its state id
    Anonymous(u32),
}

/// A registered core
#[derive(Debug)]
pub struct Core {
    core_type: CoreType,
    core_id: CoreId,
    state_id: u32,
    use_count: u32,
    data: CoreData,
}

impl Core {
    /// Type tag
    pub fn core_type(&self) -> CoreType {
        self.core_type
    }

    /// Identity within the type
    pub fn core_id(&self) -> &CoreId {
        &self.core_id
    }

    /// Globally unique state id; stable for the core's lifetime, reused after release
    pub fn state_id(&self) -> u32 {
        self.state_id
    }

    /// Number of holders
    pub fn use_count(&self) -> u32 {
        self.use_count
    }

    /// State payload
    pub fn data(&self) -> &CoreData {
        &self.data
    }
}
