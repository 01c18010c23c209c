//! State payloads carried by cores
//!
//! Each core type has one payload struct. Payloads that own GPU resources
//! (geometry, textures, render targets) keep their CPU-side source data so
//! the resources can be recreated after a context restore.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::CoreType;
use crate::foundation::math::{normal_matrix, Mat4, Point3, Vec3};
use crate::render::gl::{
    BufferTarget, DepthFunc, FrontFace, GlBuffer, GlContext, GlFramebuffer, GlTexture, Primitive,
    TextureImage, UniformLocation,
};
use crate::render::{RenderError, RenderResult};

/// Value of a custom shader parameter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum UniformValue {
    /// `int`
    Int(i32),
    /// `float`
    Float(f32),
    /// `vec3`
    Vec3([f32; 3]),
    /// `vec4`
    Vec4([f32; 4]),
    /// `mat4`, column-major
    Mat4([f32; 16]),
}

impl UniformValue {
    /// GLSL type used when declaring the parameter
    pub fn glsl_type(&self) -> &'static str {
        match self {
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Vec3(_) => "vec3",
            Self::Vec4(_) => "vec4",
            Self::Mat4(_) => "mat4",
        }
    }

    /// Upload to a location of the current program
    pub fn apply(&self, gl: &mut dyn GlContext, location: UniformLocation) {
        match self {
            Self::Int(v) => gl.uniform_1i(location, *v),
            Self::Float(v) => gl.uniform_1f(location, *v),
            Self::Vec3(v) => gl.uniform_3f(location, *v),
            Self::Vec4(v) => gl.uniform_4f(location, *v),
            Self::Mat4(v) => gl.uniform_matrix_4f(location, v),
        }
    }
}

/// CPU-side vertex data for a geometry core
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeometryArrays {
    /// xyz per vertex
    pub positions: Vec<f32>,
    /// xyz per vertex
    pub normals: Option<Vec<f32>>,
    /// One uv set per layer, two floats per vertex
    pub uvs: Vec<Vec<f32>>,
    /// rgba per vertex
    pub colors: Option<Vec<f32>>,
    /// Triangle (or line/point) indices
    pub indices: Vec<u32>,
}

impl GeometryArrays {
    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len() / 3
    }

    /// Check array lengths agree and indices are in range
    pub fn validate(&self) -> RenderResult<()> {
        let vertices = self.vertex_count();
        if self.positions.is_empty() || self.positions.len() % 3 != 0 {
            return Err(RenderError::Configuration(format!(
                "geometry positions must be a non-empty multiple of 3, got {}",
                self.positions.len()
            )));
        }
        if self.indices.is_empty() {
            return Err(RenderError::Configuration("geometry has no indices".to_string()));
        }
        if let Some(index) = self.indices.iter().find(|&&i| i as usize >= vertices) {
            return Err(RenderError::Configuration(format!(
                "geometry index {index} out of range for {vertices} vertices"
            )));
        }
        if self.normals.as_ref().is_some_and(|n| n.len() != vertices * 3) {
            return Err(RenderError::Configuration("normal count does not match vertices".to_string()));
        }
        if self.uvs.iter().any(|uv| uv.len() != vertices * 2) {
            return Err(RenderError::Configuration("uv count does not match vertices".to_string()));
        }
        if self.colors.as_ref().is_some_and(|c| c.len() != vertices * 4) {
            return Err(RenderError::Configuration("colour count does not match vertices".to_string()));
        }
        Ok(())
    }
}

/// GPU buffers of an uploaded geometry
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBuffers {
    /// Position buffer
    pub positions: GlBuffer,
    /// Normal buffer
    pub normals: Option<GlBuffer>,
    /// One buffer per uv layer
    pub uvs: Vec<GlBuffer>,
    /// Vertex colour buffer
    pub colors: Option<GlBuffer>,
    /// Element buffer
    pub indices: GlBuffer,
}

impl GeometryBuffers {
    fn all(&self) -> impl Iterator<Item = GlBuffer> + '_ {
        std::iter::once(self.positions)
            .chain(self.normals)
            .chain(self.uvs.iter().copied())
            .chain(self.colors)
            .chain(std::iter::once(self.indices))
    }
}

/// Geometry core payload
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryCore {
    /// Topology
    pub primitive: Primitive,
    /// Source arrays
    pub arrays: GeometryArrays,
    /// Uploaded buffers; `None` while the context is lost
    pub buffers: Option<GeometryBuffers>,
}

impl GeometryCore {
    /// Validate arrays and upload them
    pub fn upload(gl: &mut dyn GlContext, primitive: Primitive, arrays: GeometryArrays) -> RenderResult<Self> {
        arrays.validate()?;
        let buffers = create_geometry_buffers(gl, &arrays)?;
        Ok(Self {
            primitive,
            arrays,
            buffers: Some(buffers),
        })
    }

    /// Number of indices drawn
    pub fn index_count(&self) -> u32 {
        self.arrays.indices.len() as u32
    }

    fn release(&mut self, gl: &mut dyn GlContext) {
        if let Some(buffers) = self.buffers.take() {
            for buffer in buffers.all() {
                gl.delete_buffer(buffer);
            }
        }
    }

    fn restore(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        self.buffers = Some(create_geometry_buffers(gl, &self.arrays)?);
        Ok(())
    }
}

fn upload_buffer(
    gl: &mut dyn GlContext,
    created: &mut Vec<GlBuffer>,
    target: BufferTarget,
    bytes: &[u8],
) -> RenderResult<GlBuffer> {
    let buffer = gl
        .create_buffer(target, bytes)
        .map_err(RenderError::ResourceCreation)?;
    created.push(buffer);
    Ok(buffer)
}

fn try_create_geometry_buffers(
    gl: &mut dyn GlContext,
    arrays: &GeometryArrays,
    created: &mut Vec<GlBuffer>,
) -> RenderResult<GeometryBuffers> {
    let positions = upload_buffer(gl, created, BufferTarget::Array, bytemuck::cast_slice(&arrays.positions))?;
    let normals = match &arrays.normals {
        Some(normals) => Some(upload_buffer(gl, created, BufferTarget::Array, bytemuck::cast_slice(normals))?),
        None => None,
    };
    let mut uvs = Vec::with_capacity(arrays.uvs.len());
    for uv in &arrays.uvs {
        uvs.push(upload_buffer(gl, created, BufferTarget::Array, bytemuck::cast_slice(uv))?);
    }
    let colors = match &arrays.colors {
        Some(colors) => Some(upload_buffer(gl, created, BufferTarget::Array, bytemuck::cast_slice(colors))?),
        None => None,
    };
    let indices = upload_buffer(
        gl,
        created,
        BufferTarget::ElementArray,
        bytemuck::cast_slice(&arrays.indices),
    )?;
    Ok(GeometryBuffers {
        positions,
        normals,
        uvs,
        colors,
        indices,
    })
}

/// Upload every array; on failure delete whatever was already created
fn create_geometry_buffers(gl: &mut dyn GlContext, arrays: &GeometryArrays) -> RenderResult<GeometryBuffers> {
    let mut created = Vec::new();
    let result = try_create_geometry_buffers(gl, arrays, &mut created);
    if result.is_err() {
        for buffer in created {
            gl.delete_buffer(buffer);
        }
    }
    result
}

/// Arrays of one morph target as supplied by the caller
///
/// Missing arrays are inherited from the nearest earlier target that has
/// them, or from the first target that does.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MorphTargetArrays {
    /// xyz per vertex
    pub positions: Option<Vec<f32>>,
    /// xyz per vertex
    pub normals: Option<Vec<f32>>,
}

/// Resolved arrays of one morph target
#[derive(Debug, Clone, PartialEq)]
pub struct MorphTarget {
    /// xyz per vertex
    pub positions: Vec<f32>,
    /// xyz per vertex
    pub normals: Option<Vec<f32>>,
}

/// GPU buffers of one morph target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MorphTargetBuffers {
    /// Position buffer
    pub positions: GlBuffer,
    /// Normal buffer
    pub normals: Option<GlBuffer>,
}

/// Pair of targets being interpolated and the blend between them
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MorphFrame {
    /// Target blended from
    pub key1: usize,
    /// Target blended to
    pub key2: usize,
    /// Blend factor between the two targets
    pub factor: f32,
}

/// Keyframed vertex animation over a geometry
///
/// Each target replaces the positions (and optionally normals) of the
/// geometry it is drawn with. The morph factor is given on the key scale and
/// selects the two neighbouring targets to interpolate; factors outside the
/// key range extrapolate from the first or last pair.
#[derive(Debug, Clone, PartialEq)]
pub struct MorphGeometryCore {
    keys: Vec<f32>,
    targets: Vec<MorphTarget>,
    /// Uploaded buffers, one per target; empty while the context is lost
    pub buffers: Vec<MorphTargetBuffers>,
    factor: f32,
    frame: MorphFrame,
}

impl MorphGeometryCore {
    /// Validate and upload morph targets
    ///
    /// Needs at least two targets, one strictly increasing key per target
    /// and a position array on at least one target.
    pub fn upload(
        gl: &mut dyn GlContext,
        keys: Vec<f32>,
        targets: Vec<MorphTargetArrays>,
        factor: f32,
    ) -> RenderResult<Self> {
        if targets.len() < 2 {
            return Err(RenderError::Configuration(
                "morph geometry needs at least two targets".to_string(),
            ));
        }
        if keys.len() != targets.len() {
            return Err(RenderError::Configuration(format!(
                "morph geometry has {} keys for {} targets",
                keys.len(),
                targets.len()
            )));
        }
        if keys.windows(2).any(|pair| pair[0].partial_cmp(&pair[1]) != Some(Ordering::Less)) {
            return Err(RenderError::Configuration("morph keys must be strictly increasing".to_string()));
        }

        let targets = resolve_morph_targets(targets)?;
        let buffers = create_morph_buffers(gl, &targets)?;
        let mut core = Self {
            keys,
            targets,
            buffers,
            factor: 0.0,
            frame: MorphFrame {
                key1: 0,
                key2: 1,
                factor: 0.0,
            },
        };
        core.set_factor(factor);
        Ok(core)
    }

    /// Morph factor on the key scale
    pub fn factor(&self) -> f32 {
        self.factor
    }

    /// Move the morph to a new factor on the key scale
    pub fn set_factor(&mut self, factor: f32) {
        let last = self.keys.len() - 1;
        let (mut key1, mut key2) = (self.frame.key1, self.frame.key2);
        if factor < self.keys[0] {
            (key1, key2) = (0, 1);
        } else if factor > self.keys[last] {
            (key1, key2) = (last - 1, last);
        } else {
            while key1 > 0 && self.keys[key1] > factor {
                key1 -= 1;
                key2 -= 1;
            }
            while key2 < last && self.keys[key2] < factor {
                key1 += 1;
                key2 += 1;
            }
        }
        self.factor = factor;
        self.frame = MorphFrame {
            key1,
            key2,
            factor: (factor - self.keys[key1]) / (self.keys[key2] - self.keys[key1]),
        };
    }

    /// Current pair of targets and the blend between them
    pub fn frame(&self) -> MorphFrame {
        self.frame
    }

    /// Keys, one per target
    pub fn keys(&self) -> &[f32] {
        &self.keys
    }

    /// Resolved targets
    pub fn targets(&self) -> &[MorphTarget] {
        &self.targets
    }

    /// Whether the targets carry normals
    pub fn has_normals(&self) -> bool {
        self.targets.iter().all(|target| target.normals.is_some())
    }

    /// Vertices per target
    pub fn vertex_count(&self) -> usize {
        self.targets.first().map_or(0, |target| target.positions.len() / 3)
    }

    fn release(&mut self, gl: &mut dyn GlContext) {
        for buffers in self.buffers.drain(..) {
            gl.delete_buffer(buffers.positions);
            if let Some(normals) = buffers.normals {
                gl.delete_buffer(normals);
            }
        }
    }

    fn restore(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        self.buffers = create_morph_buffers(gl, &self.targets)?;
        Ok(())
    }
}

fn resolve_morph_targets(targets: Vec<MorphTargetArrays>) -> RenderResult<Vec<MorphTarget>> {
    let mut positions = targets.iter().find_map(|target| target.positions.clone());
    let mut normals = targets.iter().find_map(|target| target.normals.clone());
    let vertices = positions.as_ref().map_or(0, Vec::len);
    if vertices == 0 || vertices % 3 != 0 {
        return Err(RenderError::Configuration(
            "morph targets need a non-empty multiple of 3 position floats".to_string(),
        ));
    }

    let mut resolved = Vec::with_capacity(targets.len());
    for (i, target) in targets.into_iter().enumerate() {
        if let Some(own) = target.positions {
            positions = Some(own);
        }
        if let Some(own) = target.normals {
            normals = Some(own);
        }
        let target_positions = positions.clone().unwrap_or_default();
        if target_positions.len() != vertices {
            return Err(RenderError::Configuration(format!(
                "morph target {i} has {} position floats, expected {vertices}",
                target_positions.len()
            )));
        }
        if normals.as_ref().is_some_and(|n| n.len() != vertices) {
            return Err(RenderError::Configuration(format!("morph target {i} normal count does not match")));
        }
        resolved.push(MorphTarget {
            positions: target_positions,
            normals: normals.clone(),
        });
    }
    Ok(resolved)
}

fn create_morph_buffers(gl: &mut dyn GlContext, targets: &[MorphTarget]) -> RenderResult<Vec<MorphTargetBuffers>> {
    let mut created = Vec::new();
    let result: RenderResult<Vec<MorphTargetBuffers>> = targets
        .iter()
        .map(|target| {
            let positions = upload_buffer(gl, &mut created, BufferTarget::Array, bytemuck::cast_slice(&target.positions))?;
            let normals = match &target.normals {
                Some(normals) => Some(upload_buffer(gl, &mut created, BufferTarget::Array, bytemuck::cast_slice(normals))?),
                None => None,
            };
            Ok(MorphTargetBuffers { positions, normals })
        })
        .collect();
    if result.is_err() {
        for buffer in created {
            gl.delete_buffer(buffer);
        }
    }
    result
}

/// Custom shader code and its parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShaderCore {
    /// Statements run at the end of the vertex shader; may modify `worldVertex`
    pub vertex_code: Option<String>,
    /// Statements run at the end of the fragment shader; may modify `color`
    pub fragment_code: Option<String>,
    /// Uniforms declared for the custom code, with initial values
    pub params: BTreeMap<String, UniformValue>,
}

/// Parameter overrides for the nearest custom shader
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaderParamsCore {
    /// Uniform values by name
    pub params: BTreeMap<String, UniformValue>,
}

/// Modelling transform
#[derive(Debug, Clone, PartialEq)]
pub struct XformCore {
    /// Model matrix
    pub matrix: Mat4,
    /// Inverse-transpose of the model matrix
    pub normal_matrix: Mat4,
}

impl XformCore {
    /// Wrap a model matrix
    pub fn new(matrix: Mat4) -> Self {
        Self {
            normal_matrix: normal_matrix(&matrix),
            matrix,
        }
    }
}

impl Default for XformCore {
    fn default() -> Self {
        Self::new(Mat4::identity())
    }
}

/// Viewing transform
#[derive(Debug, Clone, PartialEq)]
pub struct LookAtCore {
    /// Eye position in world space
    pub eye: Vec3,
    /// View matrix
    pub matrix: Mat4,
    /// Inverse-transpose of the view matrix
    pub normal_matrix: Mat4,
}

impl LookAtCore {
    /// Right-handed view matrix looking from `eye` towards `look`
    pub fn new(eye: Vec3, look: Vec3, up: Vec3) -> Self {
        let matrix = Mat4::look_at_rh(&Point3::from(eye), &Point3::from(look), &up);
        Self {
            eye,
            normal_matrix: normal_matrix(&matrix),
            matrix,
        }
    }
}

impl Default for LookAtCore {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 0.0, 10.0), Vec3::zeros(), Vec3::y())
    }
}

/// Projection transform
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCore {
    /// Projection matrix
    pub matrix: Mat4,
}

impl CameraCore {
    /// Perspective projection; `fovy` in degrees
    pub fn perspective(fovy: f32, aspect: f32, near: f32, far: f32) -> Self {
        Self {
            matrix: Mat4::new_perspective(aspect, fovy.to_radians(), near, far),
        }
    }

    /// Orthographic projection
    pub fn orthographic(left: f32, right: f32, bottom: f32, top: f32, near: f32, far: f32) -> Self {
        Self {
            matrix: Mat4::new_orthographic(left, right, bottom, top, near, far),
        }
    }
}

impl Default for CameraCore {
    fn default() -> Self {
        Self::perspective(60.0, 1.0, 0.1, 5000.0)
    }
}

/// Rendering flags
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagsCore {
    /// Drawables are skipped entirely when false
    pub enabled: bool,
    /// Drawables are left out of the pick pass when false
    pub picking: bool,
    /// Draw in the transparency bin with blending forced on
    pub transparent: bool,
    /// Draw back faces (culling disabled)
    pub backfaces: bool,
    /// Front-face winding
    pub front_face: FrontFace,
    /// Light back faces as well as front faces
    pub backface_lighting: bool,
}

impl Default for FlagsCore {
    fn default() -> Self {
        Self {
            enabled: true,
            picking: true,
            transparent: false,
            backfaces: true,
            front_face: FrontFace::Ccw,
            backface_lighting: true,
        }
    }
}

/// Depth buffer state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DepthBufferCore {
    /// Depth test on or off
    pub enabled: bool,
    /// Comparison function
    pub func: DepthFunc,
    /// Depth writes on or off
    pub write: bool,
}

impl Default for DepthBufferCore {
    fn default() -> Self {
        Self {
            enabled: true,
            func: DepthFunc::Less,
            write: true,
        }
    }
}

/// Colour buffer state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColorBufferCore {
    /// Blending on or off
    pub blend_enabled: bool,
    /// Per-channel write mask
    pub color_mask: [bool; 4],
}

impl Default for ColorBufferCore {
    fn default() -> Self {
        Self {
            blend_enabled: false,
            color_mask: [true; 4],
        }
    }
}

/// View state
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ViewCore {
    /// Scissor test on or off
    pub scissor_test: bool,
}

/// Pick name
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NameCore {
    /// Name reported by picking
    pub name: String,
    /// Id of the scene node that owns the name
    pub node_id: Option<String>,
    /// Slash-separated path of enclosing names
    pub path: Option<String>,
}

/// Light type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightMode {
    /// Uniform ambient term
    Ambient,
    /// Directional light
    Dir,
    /// Point light with attenuation
    Point,
}

/// Coordinate space a light is defined in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LightSpace {
    /// Moves with the camera
    #[default]
    View,
    /// Fixed in the world
    World,
}

/// One light source
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Light {
    /// Light type
    pub mode: LightMode,
    /// RGB colour
    pub color: [f32; 3],
    /// Direction for directional lights
    pub dir: [f32; 3],
    /// Position for point lights
    pub pos: [f32; 3],
    /// Coordinate space
    pub space: LightSpace,
    /// Contributes diffuse light
    pub diffuse: bool,
    /// Contributes specular light
    pub specular: bool,
    /// Constant, linear and quadratic attenuation
    pub attenuation: [f32; 3],
}

impl Light {
    /// Ambient light
    pub fn ambient(color: [f32; 3]) -> Self {
        Self {
            mode: LightMode::Ambient,
            color,
            dir: [0.0; 3],
            pos: [0.0; 3],
            space: LightSpace::View,
            diffuse: false,
            specular: false,
            attenuation: [1.0, 0.0, 0.0],
        }
    }

    /// Directional light shining along `dir`
    pub fn directional(color: [f32; 3], dir: [f32; 3], space: LightSpace) -> Self {
        Self {
            mode: LightMode::Dir,
            dir,
            space,
            diffuse: true,
            specular: true,
            ..Self::ambient(color)
        }
    }

    /// Point light at `pos`
    pub fn point(color: [f32; 3], pos: [f32; 3], space: LightSpace) -> Self {
        Self {
            mode: LightMode::Point,
            pos,
            space,
            diffuse: true,
            specular: true,
            ..Self::ambient(color)
        }
    }
}

/// Light set
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LightsCore {
    /// Lights in shader order
    pub lights: Vec<Light>,
}

impl LightsCore {
    /// Colour of the first ambient light
    pub fn ambient_color(&self) -> Option<[f32; 3]> {
        self.lights
            .iter()
            .find(|light| light.mode == LightMode::Ambient)
            .map(|light| light.color)
    }
}

/// Surface material
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaterialCore {
    /// Diffuse colour
    pub base_color: [f32; 3],
    /// Specular colour
    pub specular_color: [f32; 3],
    /// Specular factor
    pub specular: f32,
    /// Shininess exponent
    pub shine: f32,
    /// Opacity
    pub alpha: f32,
    /// Emissive factor
    pub emit: f32,
}

impl Default for MaterialCore {
    fn default() -> Self {
        Self {
            base_color: [1.0, 1.0, 1.0],
            specular_color: [1.0, 1.0, 1.0],
            specular: 1.0,
            shine: 70.0,
            alpha: 1.0,
            emit: 0.0,
        }
    }
}

/// Material property a texture layer modulates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextureApplyTo {
    /// Diffuse colour
    #[default]
    BaseColor,
    /// Specular factor
    Specular,
    /// Emission
    Emit,
    /// Opacity
    Alpha,
    /// Normal perturbation
    Normals,
}

/// How a texture layer combines with the value below it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TextureBlendMode {
    /// Multiply
    #[default]
    Multiply,
    /// Add
    Add,
}

/// One texture layer
#[derive(Debug, Clone, PartialEq)]
pub struct TextureLayer {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// RGBA8 pixels
    pub pixels: Vec<u8>,
    /// Target property
    pub apply_to: TextureApplyTo,
    /// Blend mode
    pub blend_mode: TextureBlendMode,
    /// Geometry uv layer sampled
    pub uv_layer: usize,
    /// Uploaded texture; `None` until uploaded or while the context is lost
    pub texture: Option<GlTexture>,
}

impl TextureLayer {
    /// Layer modulating base colour through uv layer 0
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
            apply_to: TextureApplyTo::BaseColor,
            blend_mode: TextureBlendMode::Multiply,
            uv_layer: 0,
            texture: None,
        }
    }

    /// Set the target property
    pub fn with_apply_to(mut self, apply_to: TextureApplyTo) -> Self {
        self.apply_to = apply_to;
        self
    }

    /// Set the uv layer
    pub fn with_uv_layer(mut self, uv_layer: usize) -> Self {
        self.uv_layer = uv_layer;
        self
    }
}

/// Texture stack
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TextureCore {
    /// Layers in application order
    pub layers: Vec<TextureLayer>,
}

impl TextureCore {
    /// Upload every layer
    pub fn upload(gl: &mut dyn GlContext, layers: Vec<TextureLayer>) -> RenderResult<Self> {
        let mut core = Self { layers };
        core.restore(gl)?;
        Ok(core)
    }

    fn release(&mut self, gl: &mut dyn GlContext) {
        for layer in &mut self.layers {
            if let Some(texture) = layer.texture.take() {
                gl.delete_texture(texture);
            }
        }
    }

    fn restore(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        for index in 0..self.layers.len() {
            let layer = &self.layers[index];
            let image = TextureImage {
                width: layer.width,
                height: layer.height,
                pixels: &layer.pixels,
            };
            match gl.create_texture(&image) {
                Ok(texture) => self.layers[index].texture = Some(texture),
                Err(log) => {
                    self.release(gl);
                    return Err(RenderError::ResourceCreation(log));
                }
            }
        }
        Ok(())
    }
}

/// Clipping plane behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClipMode {
    /// Plane ignored
    Disabled,
    /// Discard fragments in front of the plane
    #[default]
    Inside,
    /// Discard fragments behind the plane
    Outside,
}

/// One clipping plane
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    /// Behaviour
    pub mode: ClipMode,
    /// Plane normal in world space
    pub normal: [f32; 3],
    /// Distance from the origin along the normal
    pub dist: f32,
}

/// Clipping planes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClipsCore {
    /// Planes in shader order
    pub clips: Vec<Clip>,
}

/// Rasteriser state
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RendererCore {
    /// Line width for line primitives
    pub line_width: f32,
    /// Viewport override; the full drawing buffer when `None`
    pub viewport: Option<[i32; 4]>,
}

impl Default for RendererCore {
    fn default() -> Self {
        Self {
            line_width: 1.0,
            viewport: None,
        }
    }
}

/// Render stage; lower priorities draw first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageCore {
    /// Sort priority
    pub priority: i32,
    /// Whether drawables in this stage can be picked
    pub pickable: bool,
}

impl Default for StageCore {
    fn default() -> Self {
        Self {
            priority: 0,
            pickable: true,
        }
    }
}

/// Layer within a stage; lower priorities draw first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerCore {
    /// Sort priority
    pub priority: i32,
    /// Drawables are skipped when false
    pub enabled: bool,
}

impl Default for LayerCore {
    fn default() -> Self {
        Self {
            priority: 0,
            enabled: true,
        }
    }
}

/// Enable switch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnableCore {
    /// Drawables are skipped when false
    pub enabled: bool,
}

impl Default for EnableCore {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Off-screen colour target
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetCore {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Framebuffer; `None` while the context is lost
    pub framebuffer: Option<GlFramebuffer>,
}

impl RenderTargetCore {
    /// Create the framebuffer
    pub fn create(gl: &mut dyn GlContext, width: u32, height: u32) -> RenderResult<Self> {
        let framebuffer = gl
            .create_framebuffer(width, height)
            .map_err(RenderError::ResourceCreation)?;
        Ok(Self {
            width,
            height,
            framebuffer: Some(framebuffer),
        })
    }
}

/// Payload of a core, one variant per [`CoreType`]
#[derive(Debug, Clone, PartialEq)]
pub enum CoreData {
    /// Vertex data
    Geometry(GeometryCore),
    /// Morph targets
    MorphGeometry(MorphGeometryCore),
    /// Custom shader
    Shader(ShaderCore),
    /// Shader parameter overrides
    ShaderParams(ShaderParamsCore),
    /// Model transform
    Xform(XformCore),
    /// View transform
    LookAt(LookAtCore),
    /// Projection
    Camera(CameraCore),
    /// Flags
    Flags(FlagsCore),
    /// Depth buffer state
    DepthBuffer(DepthBufferCore),
    /// Colour buffer state
    ColorBuffer(ColorBufferCore),
    /// View state
    View(ViewCore),
    /// Pick name
    Name(NameCore),
    /// Lights
    Lights(LightsCore),
    /// Material
    Material(MaterialCore),
    /// Textures
    Texture(TextureCore),
    /// Clipping planes
    Clips(ClipsCore),
    /// Rasteriser state
    Renderer(RendererCore),
    /// Stage
    Stage(StageCore),
    /// Layer
    Layer(LayerCore),
    /// Enable switch
    Enable(EnableCore),
    /// Render target
    RenderTarget(RenderTargetCore),
}

macro_rules! core_accessors {
    ($($variant:ident => $name:ident: $ty:ty),* $(,)?) => {
        impl CoreData {
            /// Type tag of this payload
            pub fn core_type(&self) -> CoreType {
                match self {
                    $(Self::$variant(_) => CoreType::$variant,)*
                }
            }

            $(
                #[doc = concat!("Borrow as [`", stringify!($ty), "`]")]
                pub fn $name(&self) -> Option<&$ty> {
                    match self {
                        Self::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            )*
        }
    };
}

core_accessors! {
    Geometry => as_geometry: GeometryCore,
    MorphGeometry => as_morph_geometry: MorphGeometryCore,
    Shader => as_shader: ShaderCore,
    ShaderParams => as_shader_params: ShaderParamsCore,
    Xform => as_xform: XformCore,
    LookAt => as_look_at: LookAtCore,
    Camera => as_camera: CameraCore,
    Flags => as_flags: FlagsCore,
    DepthBuffer => as_depth_buffer: DepthBufferCore,
    ColorBuffer => as_color_buffer: ColorBufferCore,
    View => as_view: ViewCore,
    Name => as_name: NameCore,
    Lights => as_lights: LightsCore,
    Material => as_material: MaterialCore,
    Texture => as_texture: TextureCore,
    Clips => as_clips: ClipsCore,
    Renderer => as_renderer: RendererCore,
    Stage => as_stage: StageCore,
    Layer => as_layer: LayerCore,
    Enable => as_enable: EnableCore,
    RenderTarget => as_render_target: RenderTargetCore,
}

impl CoreData {
    /// Delete any GPU resources owned by the payload
    pub(crate) fn release_gpu(&mut self, gl: &mut dyn GlContext) {
        match self {
            Self::Geometry(geometry) => geometry.release(gl),
            Self::MorphGeometry(morph) => morph.release(gl),
            Self::Texture(texture) => texture.release(gl),
            Self::RenderTarget(target) => {
                if let Some(framebuffer) = target.framebuffer.take() {
                    gl.delete_framebuffer(framebuffer);
                }
            }
            _ => {}
        }
    }

    /// Recreate GPU resources after a context restore
    ///
    /// Old handles belong to the lost context and are dropped without deletion.
    pub(crate) fn restore_gpu(&mut self, gl: &mut dyn GlContext) -> RenderResult<()> {
        match self {
            Self::Geometry(geometry) => geometry.restore(gl),
            Self::MorphGeometry(morph) => morph.restore(gl),
            Self::Texture(texture) => {
                for layer in &mut texture.layers {
                    layer.texture = None;
                }
                texture.restore(gl)
            }
            Self::RenderTarget(target) => {
                target.framebuffer = Some(
                    gl.create_framebuffer(target.width, target.height)
                        .map_err(RenderError::ResourceCreation)?,
                );
                Ok(())
            }
            _ => Ok(()),
        }
    }
}
