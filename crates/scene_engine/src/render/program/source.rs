//! GLSL source composition
//!
//! Builds the draw and pick shader pairs for a [`ProgramStates`] description.
//! Only the features present in the states are emitted, so uniform and
//! attribute lookups for absent features fail and the corresponding chunk
//! work is skipped.

use std::fmt::Write as _;

use super::ProgramStates;
use crate::render::cores::{ClipMode, LightMode, LightSpace, TextureApplyTo, TextureBlendMode};

/// Vertex position attribute
pub const A_POSITION: &str = "a_position";
/// Vertex normal attribute
pub const A_NORMAL: &str = "a_normal";
/// Vertex uv attribute prefix; layer index is appended
pub const A_UV: &str = "a_uv";
/// Vertex colour attribute
pub const A_COLOR: &str = "a_color";
/// Position of the morph target blended towards
pub const A_MORPH_POSITION: &str = "a_morphPosition";
/// Normal of the morph target blended towards
pub const A_MORPH_NORMAL: &str = "a_morphNormal";
/// Blend factor between the two bound morph targets
pub const U_MORPH_FACTOR: &str = "u_morphFactor";

/// Model matrix
pub const U_MODEL_MATRIX: &str = "u_modelMatrix";
/// Model normal matrix
pub const U_MODEL_NORMAL_MATRIX: &str = "u_modelNormalMatrix";
/// View matrix
pub const U_VIEW_MATRIX: &str = "u_viewMatrix";
/// View normal matrix
pub const U_VIEW_NORMAL_MATRIX: &str = "u_viewNormalMatrix";
/// Projection matrix
pub const U_PROJ_MATRIX: &str = "u_projMatrix";
/// Eye position in world space
pub const U_WORLD_EYE: &str = "u_worldEye";
/// Pick colour, required by every pick program
pub const U_PICK_COLOR: &str = "u_pickColor";

/// Material diffuse colour
pub const U_MATERIAL_BASE_COLOR: &str = "u_materialBaseColor";
/// Material specular colour
pub const U_MATERIAL_SPECULAR_COLOR: &str = "u_materialSpecularColor";
/// Material specular factor
pub const U_MATERIAL_SPECULAR: &str = "u_materialSpecular";
/// Material shininess
pub const U_MATERIAL_SHINE: &str = "u_materialShine";
/// Material opacity
pub const U_MATERIAL_ALPHA: &str = "u_materialAlpha";
/// Material emission
pub const U_MATERIAL_EMIT: &str = "u_materialEmit";

/// Light colour prefix
pub const U_LIGHT_COLOR: &str = "u_lightColor";
/// Light direction prefix
pub const U_LIGHT_DIR: &str = "u_lightDir";
/// Light position prefix
pub const U_LIGHT_POS: &str = "u_lightPos";
/// Light attenuation prefix
pub const U_LIGHT_ATTENUATION: &str = "u_lightAttenuation";

/// Texture sampler prefix
pub const U_SAMPLER: &str = "u_sampler";

/// Clip mode prefix
pub const U_CLIP_MODE: &str = "u_clipMode";
/// Clip plane prefix
pub const U_CLIP_PLANE: &str = "u_clipPlane";

/// Name of the `index`th element of an indexed uniform or attribute family
pub fn indexed(prefix: &str, index: usize) -> String {
    format!("{prefix}{index}")
}

/// Shader pair sources for both passes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramSources {
    /// Colour pass vertex shader
    pub draw_vertex: String,
    /// Colour pass fragment shader
    pub draw_fragment: String,
    /// Pick pass vertex shader
    pub pick_vertex: String,
    /// Pick pass fragment shader
    pub pick_fragment: String,
}

/// Compose every shader for a set of program states
pub fn compose(states: &ProgramStates) -> ProgramSources {
    ProgramSources {
        draw_vertex: draw_vertex(states),
        draw_fragment: draw_fragment(states),
        pick_vertex: pick_vertex(states),
        pick_fragment: pick_fragment(states),
    }
}

// `write!` into a String cannot fail; results are discarded throughout.

fn declare_params(src: &mut String, states: &ProgramStates) {
    for (name, glsl_type) in &states.params {
        let _ = writeln!(src, "uniform {glsl_type} {name};");
    }
}

fn declare_clips(src: &mut String, states: &ProgramStates) {
    for i in 0..states.clips.len() {
        let _ = writeln!(src, "uniform float {};", indexed(U_CLIP_MODE, i));
        let _ = writeln!(src, "uniform vec4 {};", indexed(U_CLIP_PLANE, i));
    }
}

fn apply_clips(src: &mut String, states: &ProgramStates) {
    for (i, mode) in states.clips.iter().enumerate() {
        if *mode == ClipMode::Disabled {
            continue;
        }
        let plane = indexed(U_CLIP_PLANE, i);
        let mode_uniform = indexed(U_CLIP_MODE, i);
        let _ = writeln!(
            src,
            "    if ({mode_uniform} > 0.0) {{\n        float dist{i} = dot(v_worldPosition.xyz, {plane}.xyz) - {plane}.w;\n        if ({mode_uniform} < 1.5 ? dist{i} > 0.0 : dist{i} < 0.0) discard;\n    }}"
        );
    }
}

fn declare_morph(src: &mut String, states: &ProgramStates, normals: bool) {
    if !states.morph {
        return;
    }
    let _ = writeln!(src, "attribute vec3 {A_MORPH_POSITION};");
    if normals {
        let _ = writeln!(src, "attribute vec3 {A_MORPH_NORMAL};");
    }
    let _ = writeln!(src, "uniform float {U_MORPH_FACTOR};");
}

/// Attribute expression, blended towards the morph target when morphing
fn morphed(morph: bool, attribute: &str, target: &str) -> String {
    if morph {
        format!("mix({attribute}, {target}, {U_MORPH_FACTOR})")
    } else {
        attribute.to_string()
    }
}

fn draw_vertex(states: &ProgramStates) -> String {
    let mut src = String::from("precision highp float;\n");
    let _ = writeln!(src, "attribute vec3 {A_POSITION};");
    if states.normals {
        let _ = writeln!(src, "attribute vec3 {A_NORMAL};");
    }
    for i in 0..states.uv_layers {
        let _ = writeln!(src, "attribute vec2 {};", indexed(A_UV, i));
    }
    if states.vertex_colors {
        let _ = writeln!(src, "attribute vec4 {A_COLOR};");
    }
    declare_morph(&mut src, states, states.morph_normals && states.lighting());

    let _ = writeln!(src, "uniform mat4 {U_MODEL_MATRIX};");
    let _ = writeln!(src, "uniform mat4 {U_VIEW_MATRIX};");
    let _ = writeln!(src, "uniform mat4 {U_PROJ_MATRIX};");
    if states.lighting() {
        let _ = writeln!(src, "uniform mat4 {U_MODEL_NORMAL_MATRIX};");
        let _ = writeln!(src, "uniform mat4 {U_VIEW_NORMAL_MATRIX};");
        src.push_str("varying vec3 v_viewNormal;\nvarying vec3 v_viewPosition;\n");
    }
    for i in 0..states.uv_layers {
        let _ = writeln!(src, "varying vec2 v_uv{i};");
    }
    if states.vertex_colors {
        src.push_str("varying vec4 v_color;\n");
    }
    if !states.clips.is_empty() {
        src.push_str("varying vec4 v_worldPosition;\n");
    }
    declare_params(&mut src, states);

    src.push_str("void main() {\n");
    let position = morphed(states.morph, A_POSITION, A_MORPH_POSITION);
    let _ = writeln!(src, "    vec4 worldVertex = {U_MODEL_MATRIX} * vec4({position}, 1.0);");
    if let Some(code) = &states.custom_vertex {
        let _ = writeln!(src, "    {code}");
    }
    let _ = writeln!(src, "    vec4 viewVertex = {U_VIEW_MATRIX} * worldVertex;");
    if states.lighting() {
        let normal = morphed(states.morph_normals, A_NORMAL, A_MORPH_NORMAL);
        let _ = writeln!(
            src,
            "    v_viewNormal = normalize(({U_VIEW_NORMAL_MATRIX} * ({U_MODEL_NORMAL_MATRIX} * vec4({normal}, 0.0))).xyz);"
        );
        src.push_str("    v_viewPosition = viewVertex.xyz;\n");
    }
    for i in 0..states.uv_layers {
        let _ = writeln!(src, "    v_uv{i} = {};", indexed(A_UV, i));
    }
    if states.vertex_colors {
        let _ = writeln!(src, "    v_color = {A_COLOR};");
    }
    if !states.clips.is_empty() {
        src.push_str("    v_worldPosition = worldVertex;\n");
    }
    let _ = writeln!(src, "    gl_Position = {U_PROJ_MATRIX} * viewVertex;");
    src.push_str("}\n");
    src
}

fn draw_fragment(states: &ProgramStates) -> String {
    let mut src = String::from("precision highp float;\n");
    for name in [U_MATERIAL_BASE_COLOR, U_MATERIAL_SPECULAR_COLOR] {
        let _ = writeln!(src, "uniform vec3 {name};");
    }
    for name in [U_MATERIAL_SPECULAR, U_MATERIAL_SHINE, U_MATERIAL_ALPHA, U_MATERIAL_EMIT] {
        let _ = writeln!(src, "uniform float {name};");
    }

    let lighting = states.lighting();
    if lighting {
        src.push_str("varying vec3 v_viewNormal;\nvarying vec3 v_viewPosition;\n");
        if states.lights.iter().any(|l| l.space == LightSpace::World && l.mode != LightMode::Ambient) {
            let _ = writeln!(src, "uniform mat4 {U_VIEW_MATRIX};");
        }
    }
    for (i, light) in states.lights.iter().enumerate() {
        let _ = writeln!(src, "uniform vec3 {};", indexed(U_LIGHT_COLOR, i));
        if !lighting {
            continue;
        }
        match light.mode {
            LightMode::Ambient => {}
            LightMode::Dir => {
                let _ = writeln!(src, "uniform vec3 {};", indexed(U_LIGHT_DIR, i));
            }
            LightMode::Point => {
                let _ = writeln!(src, "uniform vec3 {};", indexed(U_LIGHT_POS, i));
                let _ = writeln!(src, "uniform vec3 {};", indexed(U_LIGHT_ATTENUATION, i));
            }
        }
    }
    for (i, _) in states.texture_layers.iter().enumerate() {
        let _ = writeln!(src, "uniform sampler2D {};", indexed(U_SAMPLER, i));
    }
    for i in 0..states.uv_layers {
        let _ = writeln!(src, "varying vec2 v_uv{i};");
    }
    if states.vertex_colors {
        src.push_str("varying vec4 v_color;\n");
    }
    if !states.clips.is_empty() {
        src.push_str("varying vec4 v_worldPosition;\n");
    }
    declare_clips(&mut src, states);
    declare_params(&mut src, states);

    src.push_str("void main() {\n");
    apply_clips(&mut src, states);
    let _ = writeln!(src, "    vec3 baseColor = {U_MATERIAL_BASE_COLOR};");
    let _ = writeln!(src, "    float specular = {U_MATERIAL_SPECULAR};");
    let _ = writeln!(src, "    float emit = {U_MATERIAL_EMIT};");
    let _ = writeln!(src, "    float alpha = {U_MATERIAL_ALPHA};");
    if states.vertex_colors {
        src.push_str("    baseColor *= v_color.rgb;\n    alpha *= v_color.a;\n");
    }
    if lighting {
        src.push_str("    vec3 normal = normalize(v_viewNormal);\n");
    }

    for (i, layer) in states.texture_layers.iter().enumerate() {
        let _ = writeln!(
            src,
            "    vec4 texel{i} = texture2D({}, v_uv{});",
            indexed(U_SAMPLER, i),
            layer.uv_layer
        );
        let op = match layer.blend_mode {
            TextureBlendMode::Multiply => "*=",
            TextureBlendMode::Add => "+=",
        };
        let line = match layer.apply_to {
            TextureApplyTo::BaseColor => format!("baseColor {op} texel{i}.rgb;"),
            TextureApplyTo::Specular => format!("specular {op} texel{i}.r;"),
            TextureApplyTo::Emit => format!("emit {op} texel{i}.r;"),
            TextureApplyTo::Alpha => format!("alpha {op} texel{i}.a;"),
            TextureApplyTo::Normals if lighting => {
                format!("normal = normalize(normal + (texel{i}.rgb * 2.0 - 1.0));")
            }
            TextureApplyTo::Normals => String::new(),
        };
        let _ = writeln!(src, "    {line}");
    }

    if lighting {
        if states.backface_lighting {
            src.push_str("    if (!gl_FrontFacing) normal = -normal;\n");
        }
        src.push_str(
            "    vec3 viewDir = normalize(-v_viewPosition);\n    vec3 ambient = vec3(0.0);\n    vec3 diffuse = vec3(0.0);\n    vec3 highlight = vec3(0.0);\n",
        );
        for (i, light) in states.lights.iter().enumerate() {
            let color = indexed(U_LIGHT_COLOR, i);
            let world = light.space == LightSpace::World;
            match light.mode {
                LightMode::Ambient => {
                    let _ = writeln!(src, "    ambient += {color};");
                    continue;
                }
                LightMode::Dir => {
                    let dir = indexed(U_LIGHT_DIR, i);
                    let dir = if world {
                        format!("({U_VIEW_MATRIX} * vec4({dir}, 0.0)).xyz")
                    } else {
                        dir
                    };
                    let _ = writeln!(src, "    vec3 lightVec{i} = normalize(-{dir});\n    float atten{i} = 1.0;");
                }
                LightMode::Point => {
                    let pos = indexed(U_LIGHT_POS, i);
                    let pos = if world {
                        format!("({U_VIEW_MATRIX} * vec4({pos}, 1.0)).xyz")
                    } else {
                        pos
                    };
                    let _ = writeln!(
                        src,
                        "    vec3 lightVec{i} = {pos} - v_viewPosition;\n    float dist{i} = length(lightVec{i});\n    lightVec{i} /= dist{i};\n    float atten{i} = 1.0 / dot({}, vec3(1.0, dist{i}, dist{i} * dist{i}));",
                        indexed(U_LIGHT_ATTENUATION, i)
                    );
                }
            }
            if light.diffuse {
                let _ = writeln!(src, "    diffuse += {color} * max(dot(normal, lightVec{i}), 0.0) * atten{i};");
            }
            if light.specular {
                let _ = writeln!(
                    src,
                    "    highlight += {color} * specular * pow(max(dot(reflect(-lightVec{i}, normal), viewDir), 0.0), {U_MATERIAL_SHINE}) * atten{i};"
                );
            }
        }
        let _ = writeln!(
            src,
            "    vec3 rgb = (ambient + diffuse + emit) * baseColor + highlight * {U_MATERIAL_SPECULAR_COLOR};"
        );
    } else {
        src.push_str("    vec3 rgb = baseColor + emit * baseColor;\n");
    }

    src.push_str("    vec4 color = vec4(rgb, alpha);\n");
    if let Some(code) = &states.custom_fragment {
        let _ = writeln!(src, "    {code}");
    }
    src.push_str("    gl_FragColor = color;\n}\n");
    src
}

fn pick_vertex(states: &ProgramStates) -> String {
    let mut src = String::from("precision highp float;\n");
    let _ = writeln!(src, "attribute vec3 {A_POSITION};");
    declare_morph(&mut src, states, false);
    let _ = writeln!(src, "uniform mat4 {U_MODEL_MATRIX};");
    let _ = writeln!(src, "uniform mat4 {U_VIEW_MATRIX};");
    let _ = writeln!(src, "uniform mat4 {U_PROJ_MATRIX};");
    if !states.clips.is_empty() {
        src.push_str("varying vec4 v_worldPosition;\n");
    }
    declare_params(&mut src, states);
    src.push_str("void main() {\n");
    let position = morphed(states.morph, A_POSITION, A_MORPH_POSITION);
    let _ = writeln!(src, "    vec4 worldVertex = {U_MODEL_MATRIX} * vec4({position}, 1.0);");
    if let Some(code) = &states.custom_vertex {
        let _ = writeln!(src, "    {code}");
    }
    if !states.clips.is_empty() {
        src.push_str("    v_worldPosition = worldVertex;\n");
    }
    let _ = writeln!(src, "    gl_Position = {U_PROJ_MATRIX} * ({U_VIEW_MATRIX} * worldVertex);");
    src.push_str("}\n");
    src
}

fn pick_fragment(states: &ProgramStates) -> String {
    let mut src = String::from("precision highp float;\n");
    let _ = writeln!(src, "uniform vec4 {U_PICK_COLOR};");
    if !states.clips.is_empty() {
        src.push_str("varying vec4 v_worldPosition;\n");
    }
    declare_clips(&mut src, states);
    src.push_str("void main() {\n");
    apply_clips(&mut src, states);
    let _ = writeln!(src, "    gl_FragColor = {U_PICK_COLOR};");
    src.push_str("}\n");
    src
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::program::{LightState, TextureLayerState};

    #[test]
    fn test_unlit_program_has_no_lighting_uniforms() {
        let sources = compose(&ProgramStates::default());
        assert!(sources.draw_vertex.contains(U_MODEL_MATRIX));
        assert!(!sources.draw_vertex.contains(U_MODEL_NORMAL_MATRIX));
        assert!(!sources.draw_fragment.contains(U_LIGHT_COLOR));
        assert!(sources.pick_fragment.contains(U_PICK_COLOR));
    }

    #[test]
    fn test_lit_textured_program() {
        let states = ProgramStates {
            normals: true,
            uv_layers: 1,
            texture_layers: vec![TextureLayerState {
                apply_to: TextureApplyTo::BaseColor,
                blend_mode: TextureBlendMode::Multiply,
                uv_layer: 0,
            }],
            lights: vec![
                LightState {
                    mode: LightMode::Ambient,
                    space: LightSpace::View,
                    diffuse: false,
                    specular: false,
                },
                LightState {
                    mode: LightMode::Point,
                    space: LightSpace::World,
                    diffuse: true,
                    specular: true,
                },
            ],
            ..ProgramStates::default()
        };
        let sources = compose(&states);
        assert!(sources.draw_vertex.contains("attribute vec3 a_normal;"));
        assert!(sources.draw_vertex.contains("attribute vec2 a_uv0;"));
        assert!(sources.draw_fragment.contains("uniform sampler2D u_sampler0;"));
        assert!(sources.draw_fragment.contains("uniform vec3 u_lightPos1;"));
        assert!(sources.draw_fragment.contains("uniform mat4 u_viewMatrix;"));
        assert!(!sources.draw_fragment.contains("u_lightDir"));
    }

    #[test]
    fn test_morph_blends_in_both_passes() {
        let states = ProgramStates {
            normals: true,
            morph: true,
            morph_normals: true,
            lights: vec![LightState {
                mode: LightMode::Dir,
                space: LightSpace::View,
                diffuse: true,
                specular: false,
            }],
            ..ProgramStates::default()
        };
        let sources = compose(&states);
        assert!(sources.draw_vertex.contains("attribute vec3 a_morphPosition;"));
        assert!(sources.draw_vertex.contains("mix(a_normal, a_morphNormal, u_morphFactor)"));
        assert!(sources.pick_vertex.contains("mix(a_position, a_morphPosition, u_morphFactor)"));
        assert!(!sources.pick_vertex.contains(A_MORPH_NORMAL));
        assert!(!compose(&ProgramStates::default()).draw_vertex.contains(U_MORPH_FACTOR));
    }

    #[test]
    fn test_custom_code_reaches_both_passes() {
        let states = ProgramStates {
            custom_vertex: Some("worldVertex.y += u_wave;".to_string()),
            custom_fragment: Some("color.rgb *= 0.5;".to_string()),
            params: vec![("u_wave".to_string(), "float")],
            ..ProgramStates::default()
        };
        let sources = compose(&states);
        assert!(sources.draw_vertex.contains("uniform float u_wave;"));
        assert!(sources.pick_vertex.contains("worldVertex.y += u_wave;"));
        assert!(sources.draw_fragment.contains("color.rgb *= 0.5;"));
        assert!(!sources.pick_fragment.contains("color.rgb"));
    }
}
