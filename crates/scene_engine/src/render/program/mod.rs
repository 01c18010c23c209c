//! Shader programs
//!
//! A program is the pair of GL programs (colour pass and pick pass) generated
//! for one combination of program-affecting state: which vertex attributes
//! the geometry provides, which lights, texture layers and clip planes are
//! active, and any custom shader code. Drawables with the same combination
//! share one program, found by its hash.
//!
//! Programs get their id as soon as they are requested so that drawables can
//! be sorted by program before anything is compiled. Compilation happens in
//! a later pipeline stage via [`ProgramFactory::compile_pending`].

pub mod source;

use std::collections::HashMap;
use std::fmt::Write as _;

use crate::foundation::collections::IdMap;
use crate::render::cores::{
    ClipMode, ClipsCore, FlagsCore, GeometryCore, LightMode, LightSpace, LightsCore, MorphGeometryCore,
    ShaderCore, TextureApplyTo, TextureBlendMode, TextureCore,
};
use crate::render::display::Pass;
use crate::render::gl::{GlContext, GlProgram, ShaderStage};
use crate::render::{RenderError, RenderResult};

pub use source::ProgramSources;

/// Program-relevant description of one texture layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureLayerState {
    /// Target property
    pub apply_to: TextureApplyTo,
    /// Blend mode
    pub blend_mode: TextureBlendMode,
    /// Sampled uv layer
    pub uv_layer: usize,
}

/// Program-relevant description of one light
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct LightState {
    /// Light type
    pub mode: LightMode,
    /// Coordinate space
    pub space: LightSpace,
    /// Contributes diffuse
    pub diffuse: bool,
    /// Contributes specular
    pub specular: bool,
}

/// Everything that decides which shader code a drawable needs
#[derive(Debug, Clone, PartialEq)]
pub struct ProgramStates {
    /// Geometry has normals
    pub normals: bool,
    /// Number of uv layers the geometry provides
    pub uv_layers: usize,
    /// Geometry has vertex colours
    pub vertex_colors: bool,
    /// Positions blend between two morph targets
    pub morph: bool,
    /// Normals blend between two morph targets
    pub morph_normals: bool,
    /// Texture layers whose uv layer exists on the geometry
    pub texture_layers: Vec<TextureLayerState>,
    /// Lights; empty unless the geometry has normals
    pub lights: Vec<LightState>,
    /// Clip plane modes
    pub clips: Vec<ClipMode>,
    /// Light back faces
    pub backface_lighting: bool,
    /// Custom vertex statements
    pub custom_vertex: Option<String>,
    /// Custom fragment statements
    pub custom_fragment: Option<String>,
    /// Custom uniform declarations, sorted by name
    pub params: Vec<(String, &'static str)>,
}

impl Default for ProgramStates {
    fn default() -> Self {
        Self {
            normals: false,
            uv_layers: 0,
            vertex_colors: false,
            morph: false,
            morph_normals: false,
            texture_layers: Vec::new(),
            lights: Vec::new(),
            clips: Vec::new(),
            backface_lighting: true,
            custom_vertex: None,
            custom_fragment: None,
            params: Vec::new(),
        }
    }
}

impl ProgramStates {
    /// Derive program states from a drawable's cores
    pub fn from_cores(
        geometry: &GeometryCore,
        flags: Option<&FlagsCore>,
        lights: Option<&LightsCore>,
        texture: Option<&TextureCore>,
        clips: Option<&ClipsCore>,
        shader: Option<&ShaderCore>,
    ) -> Self {
        let arrays = &geometry.arrays;
        let normals = arrays.normals.is_some();
        let uv_layers = arrays.uvs.len();

        let texture_layers = texture
            .map(|texture| {
                texture
                    .layers
                    .iter()
                    .filter(|layer| layer.uv_layer < uv_layers)
                    .map(|layer| TextureLayerState {
                        apply_to: layer.apply_to,
                        blend_mode: layer.blend_mode,
                        uv_layer: layer.uv_layer,
                    })
                    .collect()
            })
            .unwrap_or_default();

        let lights = match lights {
            Some(lights) if normals => lights
                .lights
                .iter()
                .map(|light| LightState {
                    mode: light.mode,
                    space: light.space,
                    diffuse: light.diffuse,
                    specular: light.specular,
                })
                .collect(),
            _ => Vec::new(),
        };

        let params = shader
            .map(|shader| {
                shader
                    .params
                    .iter()
                    .map(|(name, value)| (name.clone(), value.glsl_type()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            normals,
            uv_layers,
            vertex_colors: arrays.colors.is_some(),
            morph: false,
            morph_normals: false,
            texture_layers,
            lights,
            clips: clips
                .map(|clips| clips.clips.iter().map(|clip| clip.mode).collect())
                .unwrap_or_default(),
            backface_lighting: flags.map_or(true, |flags| flags.backface_lighting),
            custom_vertex: shader.and_then(|shader| shader.vertex_code.clone()),
            custom_fragment: shader.and_then(|shader| shader.fragment_code.clone()),
            params,
        }
    }

    /// Add morph target blending
    ///
    /// Normals only blend when the geometry itself has normals.
    #[must_use]
    pub fn with_morph(mut self, morph: Option<&MorphGeometryCore>) -> Self {
        self.morph = morph.is_some();
        self.morph_normals = self.normals && morph.is_some_and(MorphGeometryCore::has_normals);
        self
    }

    /// Whether lighting code is emitted
    pub fn lighting(&self) -> bool {
        self.normals && !self.lights.is_empty()
    }

    /// Content hash; equal states always produce equal hashes
    pub fn hash(&self) -> String {
        let mut hash = format!(
            "n{}u{}c{}b{}",
            u8::from(self.normals),
            self.uv_layers,
            u8::from(self.vertex_colors),
            u8::from(self.backface_lighting)
        );
        if self.morph {
            let _ = write!(hash, ";m{}", u8::from(self.morph_normals));
        }
        for layer in &self.texture_layers {
            let _ = write!(hash, ";t{:?}{:?}{}", layer.apply_to, layer.blend_mode, layer.uv_layer);
        }
        for light in &self.lights {
            let _ = write!(
                hash,
                ";l{:?}{:?}{}{}",
                light.mode,
                light.space,
                u8::from(light.diffuse),
                u8::from(light.specular)
            );
        }
        for mode in &self.clips {
            let _ = write!(hash, ";k{mode:?}");
        }
        for (name, glsl_type) in &self.params {
            let _ = write!(hash, ";p{name}:{glsl_type}");
        }
        if let Some(code) = &self.custom_vertex {
            let _ = write!(hash, ";vs{{{code}}}");
        }
        if let Some(code) = &self.custom_fragment {
            let _ = write!(hash, ";fs{{{code}}}");
        }
        hash
    }
}

/// A shared program
#[derive(Debug)]
pub struct Program {
    id: u32,
    hash: String,
    states: ProgramStates,
    sources: ProgramSources,
    draw: Option<GlProgram>,
    pick: Option<GlProgram>,
    failed: bool,
    use_count: u32,
}

impl Program {
    /// Display-level id; participates in sort keys
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Content hash
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// States the program was generated from
    pub fn states(&self) -> &ProgramStates {
        &self.states
    }

    /// Generated sources
    pub fn sources(&self) -> &ProgramSources {
        &self.sources
    }

    /// Whether both passes are compiled and linked
    pub fn is_compiled(&self) -> bool {
        self.draw.is_some() && self.pick.is_some()
    }

    /// Whether compilation failed; failed programs are never retried
    pub fn is_failed(&self) -> bool {
        self.failed
    }

    /// Linked GL program for a pass
    pub fn handle(&self, pass: Pass) -> Option<GlProgram> {
        match pass {
            Pass::Color => self.draw,
            Pass::Pick => self.pick,
        }
    }

    /// Number of drawables holding the program
    pub fn use_count(&self) -> u32 {
        self.use_count
    }
}

/// Shares programs between drawables by hash
#[derive(Debug)]
pub struct ProgramFactory {
    programs: IdMap<Program>,
    by_hash: HashMap<String, u32>,
}

impl ProgramFactory {
    /// Create an empty factory
    pub fn new() -> Self {
        Self {
            programs: IdMap::with_base(1),
            by_hash: HashMap::new(),
        }
    }

    /// Get the program for a set of states, creating an uncompiled one if needed
    pub fn get_program(&mut self, states: &ProgramStates) -> u32 {
        let hash = states.hash();
        if let Some(&id) = self.by_hash.get(&hash) {
            if let Some(program) = self.programs.get_mut(id) {
                program.use_count += 1;
                return id;
            }
        }

        let id = self.programs.insert(Program {
            id: 0,
            hash: hash.clone(),
            states: states.clone(),
            sources: source::compose(states),
            draw: None,
            pick: None,
            failed: false,
            use_count: 1,
        });
        if let Some(program) = self.programs.get_mut(id) {
            program.id = id;
        }
        log::debug!("Created program {id} for {hash}");
        self.by_hash.insert(hash, id);
        id
    }

    /// Release one hold on a program, deleting it at zero
    pub fn put_program(&mut self, gl: &mut dyn GlContext, id: u32) {
        let Some(program) = self.programs.get_mut(id) else {
            log::warn!("Released unknown program {id}");
            return;
        };
        program.use_count -= 1;
        if program.use_count > 0 {
            return;
        }
        if let Some(program) = self.programs.remove(id) {
            if self.by_hash.get(&program.hash) == Some(&id) {
                self.by_hash.remove(&program.hash);
            }
            for handle in [program.draw, program.pick].into_iter().flatten() {
                gl.delete_program(handle);
            }
            log::debug!("Deleted program {id}");
        }
    }

    /// Look up a program
    pub fn get(&self, id: u32) -> Option<&Program> {
        self.programs.get(id)
    }

    /// Number of live programs
    pub fn len(&self) -> usize {
        self.programs.len()
    }

    /// Whether no programs are live
    pub fn is_empty(&self) -> bool {
        self.programs.is_empty()
    }

    /// Compile and link every program that has no GL objects yet
    ///
    /// Returns how many programs were compiled. A program that fails is
    /// dropped from the hash index so no further drawables share it.
    pub fn compile_pending(&mut self, gl: &mut dyn GlContext) -> RenderResult<usize> {
        let pending: Vec<u32> = self
            .programs
            .iter()
            .filter(|(_, program)| !program.is_compiled() && !program.failed)
            .map(|(id, _)| id)
            .collect();

        for &id in &pending {
            let Some(program) = self.programs.get_mut(id) else {
                continue;
            };
            match compile_program(gl, program) {
                Ok(()) => log::debug!("Compiled program {id}"),
                Err(_) if gl.is_context_lost() => return Err(RenderError::ContextLost),
                Err(err) => {
                    log::error!("Program {id} failed: {err}");
                    program.failed = true;
                    let hash = program.hash.clone();
                    if self.by_hash.get(&hash) == Some(&id) {
                        self.by_hash.remove(&hash);
                    }
                    return Err(err);
                }
            }
        }
        Ok(pending.len())
    }

    /// Forget GL objects after a context restore so everything recompiles
    pub fn webgl_restored(&mut self) {
        let ids: Vec<u32> = self.programs.iter().map(|(id, _)| id).collect();
        for id in ids {
            if let Some(program) = self.programs.get_mut(id) {
                program.draw = None;
                program.pick = None;
            }
        }
    }
}

impl Default for ProgramFactory {
    fn default() -> Self {
        Self::new()
    }
}

fn compile_program(gl: &mut dyn GlContext, program: &mut Program) -> RenderResult<()> {
    let draw = link(gl, program.id, &program.sources.draw_vertex, &program.sources.draw_fragment)?;
    let pick = match link(gl, program.id, &program.sources.pick_vertex, &program.sources.pick_fragment) {
        Ok(pick) => pick,
        Err(err) => {
            gl.delete_program(draw);
            return Err(err);
        }
    };

    if gl.uniform_location(pick, source::U_PICK_COLOR).is_none() {
        gl.delete_program(draw);
        gl.delete_program(pick);
        return Err(RenderError::MissingUniform {
            program: program.id,
            name: source::U_PICK_COLOR.to_string(),
        });
    }

    program.draw = Some(draw);
    program.pick = Some(pick);
    Ok(())
}

fn link(gl: &mut dyn GlContext, id: u32, vertex: &str, fragment: &str) -> RenderResult<GlProgram> {
    let vs = gl
        .compile_shader(ShaderStage::Vertex, vertex)
        .map_err(|log| RenderError::ShaderCompile {
            stage: ShaderStage::Vertex,
            log,
        })?;
    let fs = match gl.compile_shader(ShaderStage::Fragment, fragment) {
        Ok(fs) => fs,
        Err(log) => {
            gl.delete_shader(vs);
            return Err(RenderError::ShaderCompile {
                stage: ShaderStage::Fragment,
                log,
            });
        }
    };
    let linked = gl.link_program(vs, fs);
    gl.delete_shader(vs);
    gl.delete_shader(fs);
    linked.map_err(|log| RenderError::ProgramLink { program: id, log })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::cores::{GeometryArrays, Light, MorphTargetArrays, ShaderCore};
    use crate::render::gl::{Primitive, RecordingContext};

    fn geometry(normals: bool) -> GeometryCore {
        GeometryCore {
            primitive: Primitive::Triangles,
            arrays: GeometryArrays {
                positions: vec![0.0; 9],
                normals: normals.then(|| vec![0.0; 9]),
                indices: vec![0, 1, 2],
                ..GeometryArrays::default()
            },
            buffers: None,
        }
    }

    #[test]
    fn test_lights_ignored_without_normals() {
        let lights = LightsCore {
            lights: vec![Light::ambient([0.1; 3])],
        };
        let unlit = ProgramStates::from_cores(&geometry(false), None, Some(&lights), None, None, None);
        let lit = ProgramStates::from_cores(&geometry(true), None, Some(&lights), None, None, None);
        assert!(unlit.lights.is_empty());
        assert!(!unlit.lighting());
        assert!(lit.lighting());
        assert_ne!(unlit.hash(), lit.hash());
    }

    #[test]
    fn test_morph_changes_the_hash() {
        let mut gl = RecordingContext::new(4, 4);
        let targets = vec![
            MorphTargetArrays {
                positions: Some(vec![0.0; 9]),
                normals: Some(vec![0.0; 9]),
            },
            MorphTargetArrays {
                positions: Some(vec![1.0; 9]),
                normals: None,
            },
        ];
        let morph = MorphGeometryCore::upload(&mut gl, vec![0.0, 1.0], targets, 0.0).unwrap();

        let plain = ProgramStates::from_cores(&geometry(false), None, None, None, None, None);
        let morphed = plain.clone().with_morph(Some(&morph));
        assert!(morphed.morph);
        assert!(!morphed.morph_normals);
        assert_ne!(plain.hash(), morphed.hash());

        let lit = ProgramStates::from_cores(&geometry(true), None, None, None, None, None).with_morph(Some(&morph));
        assert!(lit.morph_normals);
        assert_ne!(lit.hash(), morphed.hash());
        assert_eq!(plain.clone().with_morph(None), plain);
    }

    #[test]
    fn test_equal_states_share_a_program() {
        let mut gl = RecordingContext::new(4, 4);
        let mut factory = ProgramFactory::new();
        let states = ProgramStates::from_cores(&geometry(true), None, None, None, None, None);

        let a = factory.get_program(&states);
        let b = factory.get_program(&states.clone());
        let c = factory.get_program(&ProgramStates::default());
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(factory.get(a).unwrap().use_count(), 2);

        assert_eq!(factory.compile_pending(&mut gl).unwrap(), 2);
        assert_eq!(factory.compile_pending(&mut gl).unwrap(), 0);
        assert_eq!(gl.live_programs(), 4);

        factory.put_program(&mut gl, a);
        assert_eq!(gl.live_programs(), 4);
        factory.put_program(&mut gl, a);
        assert!(factory.get(a).is_none());
        assert_eq!(gl.live_programs(), 2);
    }

    #[test]
    fn test_compile_failure_is_not_shared() {
        let mut gl = RecordingContext::new(4, 4);
        gl.fail_shaders_containing("broken_call");
        let mut factory = ProgramFactory::new();
        let shader = ShaderCore {
            fragment_code: Some("broken_call();".to_string()),
            ..ShaderCore::default()
        };
        let states = ProgramStates::from_cores(&geometry(false), None, None, None, None, Some(&shader));
        let id = factory.get_program(&states);

        let err = factory.compile_pending(&mut gl).unwrap_err();
        assert!(matches!(err, RenderError::ShaderCompile { stage: ShaderStage::Fragment, .. }));
        assert!(err.is_fatal());
        assert!(!factory.get(id).unwrap().is_compiled());
        assert!(factory.get(id).unwrap().is_failed());
        assert_eq!(gl.live_programs(), 0);
        assert_eq!(factory.compile_pending(&mut gl).unwrap(), 0);

        let again = factory.get_program(&states);
        assert_ne!(again, id);
    }

    #[test]
    fn test_restore_forces_recompile() {
        let mut gl = RecordingContext::new(4, 4);
        let mut factory = ProgramFactory::new();
        let id = factory.get_program(&ProgramStates::default());
        factory.compile_pending(&mut gl).unwrap();
        assert!(factory.get(id).unwrap().is_compiled());

        gl.restore_context();
        factory.webgl_restored();
        assert!(!factory.get(id).unwrap().is_compiled());
        assert_eq!(factory.compile_pending(&mut gl).unwrap(), 1);
    }
}
