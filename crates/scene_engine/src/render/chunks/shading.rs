//! Program-scoped shading chunks
//!
//! Locations differ between programs, so each of these chunks is built
//! against one program and only shared by drawables using that program.
//! Values are read from the core on every draw so core updates show up
//! without a rebuild.

use std::collections::BTreeMap;

use super::{BuildContext, ChunkBehavior, DrawContext, PassLocations};
use crate::render::cores::{ClipMode, CoreData, LightMode, UniformValue};
use crate::render::display::set_cached;
use crate::render::gl::UniformLocation;
use crate::render::program::source::{
    indexed, U_CLIP_MODE, U_CLIP_PLANE, U_LIGHT_ATTENUATION, U_LIGHT_COLOR, U_LIGHT_DIR, U_LIGHT_POS,
    U_MATERIAL_ALPHA, U_MATERIAL_BASE_COLOR, U_MATERIAL_EMIT, U_MATERIAL_SHINE, U_MATERIAL_SPECULAR,
    U_MATERIAL_SPECULAR_COLOR, U_SAMPLER,
};
use crate::render::{RenderError, RenderResult};

/// Makes the drawable's program current
#[derive(Debug, Default)]
pub(super) struct ProgramChunk;

impl ProgramChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::new(Self)
    }

    fn bind(cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let program = cx
            .program
            .ok_or_else(|| RenderError::Configuration("program chunk has no program".to_string()))?;
        let handle = program
            .handle(cx.pass())
            .ok_or_else(|| RenderError::Configuration(format!("program {} is not compiled", program.id())))?;
        if set_cached(&mut cx.frame.program, handle) {
            cx.gl.use_program(Some(handle));
            cx.frame.stats.program_binds += 1;
        }
        Ok(())
    }
}

impl ChunkBehavior for ProgramChunk {
    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        Self::bind(cx)
    }

    fn pick(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        Self::bind(cx)
    }
}

type ParamLocations = Vec<(String, PassLocations<UniformLocation>)>;

fn resolve_params(cx: &mut BuildContext<'_>, params: &BTreeMap<String, UniformValue>) -> ParamLocations {
    params
        .keys()
        .map(|name| (name.clone(), cx.uniform(name)))
        .filter(|(_, locations)| locations.draw.is_some() || locations.pick.is_some())
        .collect()
}

fn apply_params(cx: &mut DrawContext<'_>, locations: &ParamLocations, params: &BTreeMap<String, UniformValue>) {
    let pass = cx.pass();
    for (name, location) in locations {
        if let (Some(location), Some(value)) = (location.get(pass), params.get(name)) {
            value.apply(cx.gl, location);
        }
    }
}

/// Initial values of custom shader parameters
#[derive(Debug, Default)]
pub(super) struct ShaderChunk {
    params: ParamLocations,
}

impl ShaderChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for ShaderChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        let shader = cx.core_as(CoreData::as_shader)?;
        self.params = resolve_params(cx, &shader.params);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let shader = cx.core_as(CoreData::as_shader)?;
        apply_params(cx, &self.params, &shader.params);
        Ok(())
    }
}

/// Overrides for custom shader parameters
#[derive(Debug, Default)]
pub(super) struct ShaderParamsChunk {
    params: ParamLocations,
}

impl ShaderParamsChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for ShaderParamsChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        let params = cx.core_as(CoreData::as_shader_params)?;
        self.params = resolve_params(cx, &params.params);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let params = cx.core_as(CoreData::as_shader_params)?;
        apply_params(cx, &self.params, &params.params);
        Ok(())
    }
}

#[derive(Debug, Default)]
struct LightLocations {
    color: PassLocations<UniformLocation>,
    dir: PassLocations<UniformLocation>,
    pos: PassLocations<UniformLocation>,
    attenuation: PassLocations<UniformLocation>,
}

/// Light colours, directions and positions
#[derive(Debug, Default)]
pub(super) struct LightsChunk {
    lights: Vec<LightLocations>,
}

impl LightsChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for LightsChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        let lights = cx.core_as(CoreData::as_lights)?;
        self.lights = (0..lights.lights.len())
            .map(|i| LightLocations {
                color: cx.uniform(&indexed(U_LIGHT_COLOR, i)),
                dir: cx.uniform(&indexed(U_LIGHT_DIR, i)),
                pos: cx.uniform(&indexed(U_LIGHT_POS, i)),
                attenuation: cx.uniform(&indexed(U_LIGHT_ATTENUATION, i)),
            })
            .collect();
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let lights = cx.core_as(CoreData::as_lights)?;
        let pass = cx.pass();
        for (light, locations) in lights.lights.iter().zip(&self.lights) {
            if let Some(location) = locations.color.get(pass) {
                cx.gl.uniform_3f(location, light.color);
            }
            match light.mode {
                LightMode::Ambient => {}
                LightMode::Dir => {
                    if let Some(location) = locations.dir.get(pass) {
                        cx.gl.uniform_3f(location, light.dir);
                    }
                }
                LightMode::Point => {
                    if let Some(location) = locations.pos.get(pass) {
                        cx.gl.uniform_3f(location, light.pos);
                    }
                    if let Some(location) = locations.attenuation.get(pass) {
                        cx.gl.uniform_3f(location, light.attenuation);
                    }
                }
            }
        }
        Ok(())
    }
}

/// Material uniforms
#[derive(Debug, Default)]
pub(super) struct MaterialChunk {
    base_color: PassLocations<UniformLocation>,
    specular_color: PassLocations<UniformLocation>,
    specular: PassLocations<UniformLocation>,
    shine: PassLocations<UniformLocation>,
    alpha: PassLocations<UniformLocation>,
    emit: PassLocations<UniformLocation>,
}

impl MaterialChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for MaterialChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        self.base_color = cx.uniform(U_MATERIAL_BASE_COLOR);
        self.specular_color = cx.uniform(U_MATERIAL_SPECULAR_COLOR);
        self.specular = cx.uniform(U_MATERIAL_SPECULAR);
        self.shine = cx.uniform(U_MATERIAL_SHINE);
        self.alpha = cx.uniform(U_MATERIAL_ALPHA);
        self.emit = cx.uniform(U_MATERIAL_EMIT);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let material = cx.core_as(CoreData::as_material)?;
        let pass = cx.pass();
        for (location, value) in [(&self.base_color, material.base_color), (&self.specular_color, material.specular_color)] {
            if let Some(location) = location.get(pass) {
                cx.gl.uniform_3f(location, value);
            }
        }
        for (location, value) in [
            (&self.specular, material.specular),
            (&self.shine, material.shine),
            (&self.alpha, material.alpha),
            (&self.emit, material.emit),
        ] {
            if let Some(location) = location.get(pass) {
                cx.gl.uniform_1f(location, value);
            }
        }
        Ok(())
    }
}

/// Texture unit assignment and sampler uniforms
#[derive(Debug, Default)]
pub(super) struct TextureChunk {
    samplers: Vec<PassLocations<UniformLocation>>,
}

impl TextureChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for TextureChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        let layers = cx.program.map_or(0, |program| program.states().texture_layers.len());
        self.samplers = (0..layers).map(|i| cx.uniform(&indexed(U_SAMPLER, i))).collect();
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let texture = cx.core_as(CoreData::as_texture)?;
        let uv_layers = cx.program.map_or(0, |program| program.states().uv_layers);
        let pass = cx.pass();

        // Samplers were generated only for layers the geometry has uvs for.
        let layers = texture.layers.iter().filter(|layer| layer.uv_layer < uv_layers);
        for (layer, sampler) in layers.zip(&self.samplers) {
            let (Some(location), Some(handle)) = (sampler.get(pass), layer.texture) else {
                continue;
            };
            let unit = cx.frame.next_texture_unit();
            cx.gl.active_texture(unit);
            cx.gl.bind_texture(Some(handle));
            cx.gl.uniform_1i(location, unit as i32);
        }
        Ok(())
    }
}

/// Clip plane uniforms
#[derive(Debug, Default)]
pub(super) struct ClipsChunk {
    clips: Vec<(PassLocations<UniformLocation>, PassLocations<UniformLocation>)>,
}

impl ClipsChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for ClipsChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        let clips = cx.core_as(CoreData::as_clips)?;
        self.clips = (0..clips.clips.len())
            .map(|i| (cx.uniform(&indexed(U_CLIP_MODE, i)), cx.uniform(&indexed(U_CLIP_PLANE, i))))
            .collect();
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let clips = cx.core_as(CoreData::as_clips)?;
        let pass = cx.pass();
        for (clip, (mode, plane)) in clips.clips.iter().zip(&self.clips) {
            if let Some(location) = mode.get(pass) {
                let value = match clip.mode {
                    ClipMode::Disabled => 0.0,
                    ClipMode::Inside => 1.0,
                    ClipMode::Outside => 2.0,
                };
                cx.gl.uniform_1f(location, value);
            }
            if let Some(location) = plane.get(pass) {
                let [x, y, z] = clip.normal;
                cx.gl.uniform_4f(location, [x, y, z, clip.dist]);
            }
        }
        Ok(())
    }
}
