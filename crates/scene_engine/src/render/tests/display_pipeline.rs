use std::collections::HashSet;
use std::sync::Arc;

use super::{triangle, Fixture};
use crate::core::config::{DisplayConfig, PoolingPolicy};
use crate::foundation::math::{mat4_to_array, Mat4, Vec3};
use crate::render::cores::{
    CameraCore, ColorBufferCore, CoreData, CoreKey, CoreType, EnableCore, FlagsCore, GeometryArrays, GeometryCore, Light,
    LightSpace, LightsCore, MorphGeometryCore, MorphTargetArrays, NameCore, RenderTargetCore, RendererCore, ShaderCore, StageCore, TextureCore, TextureLayer,
    XformCore,
};
use crate::render::display::{Display, DrawState, Pass, RenderParams};
use crate::render::gl::{BufferTarget, Capability, GlCall, Primitive, RecordingContext};
use crate::render::{RenderError, RendererContext};

fn custom_shader() -> CoreData {
    CoreData::Shader(ShaderCore {
        fragment_code: Some("color.rgb *= 0.5;".into()),
        ..ShaderCore::default()
    })
}

fn blend(enabled: bool) -> CoreData {
    CoreData::ColorBuffer(ColorBufferCore {
        blend_enabled: enabled,
        ..ColorBufferCore::default()
    })
}

#[test]
fn test_sorted_state_changes() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let blend_on = f.insert(blend(true));
    let blend_off = f.insert(blend(false));
    let shader = f.insert(custom_shader());

    let opaque = DrawState {
        color_buffer: Some(blend_on),
        ..DrawState::with_geometry(g1)
    };
    f.build("a", opaque);
    f.build("b", opaque);
    f.build(
        "c",
        DrawState {
            color_buffer: Some(blend_off),
            shader: Some(shader),
            ..DrawState::with_geometry(g1)
        },
    );

    let stats = f.render();
    assert_eq!(f.display.draw_order(), ["a", "b", "c"]);
    assert_eq!(stats.program_binds, 2);
    assert_eq!(stats.blend_toggles, 1);
    assert_eq!(stats.draw_calls, 3);
    assert_eq!(f.gl.program_binds(), 2);
    assert_eq!(f.gl.draw_calls(), 3);
    assert_eq!(f.gl.enables(Capability::Blend), 1);
    assert_eq!(f.gl.disables(Capability::Blend), 1);
}

#[test]
fn test_shared_chunks_are_left_out() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    f.build("first", DrawState::with_geometry(g1));
    f.build("second", DrawState::with_geometry(g1));

    let stats = f.render();
    let list = f.display.draw_list();

    // Everything but the draw is shared with the first drawable
    assert_eq!(list.skipped(), 11);
    assert_eq!(list.len(), 13);
    assert_eq!(stats.chunks_skipped, 11);
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(f.gl.enables(Capability::DepthTest), 1);
}

#[test]
fn test_equal_keys_keep_insertion_order() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    for id in ["e", "a", "d", "b", "c"] {
        f.build(id, DrawState::with_geometry(g1));
    }
    f.render();
    assert_eq!(f.display.draw_order(), ["e", "a", "d", "b", "c"]);

    f.build("a", DrawState::with_geometry(g1));
    f.render();
    assert_eq!(f.display.draw_order(), ["e", "a", "d", "b", "c"]);
}

#[test]
fn test_program_groups_drawables() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let shader = f.insert(custom_shader());
    let shaded = DrawState {
        shader: Some(shader),
        ..DrawState::with_geometry(g1)
    };

    f.build("x", shaded);
    f.build("y", DrawState::with_geometry(g1));
    f.build("z", shaded);

    let stats = f.render();
    assert_eq!(f.display.draw_order(), ["x", "z", "y"]);
    assert_eq!(stats.program_binds, 2);
}

#[test]
fn test_pick_round_trip() {
    let mut f = Fixture::new();
    let geometries: Vec<_> = (0..3).map(|i| f.geometry(&format!("g{i}"))).collect();
    for (i, &geometry) in geometries.iter().enumerate() {
        let buffer = f.index_buffer(geometry);
        f.gl.cover_canvas(buffer, 10 + 10 * i as u32, 20);
    }
    let name = f.insert(CoreData::Name(NameCore {
        name: "middle".into(),
        node_id: Some("node-7".into()),
        path: Some("root/middle".into()),
    }));

    f.build("left", DrawState::with_geometry(geometries[0]));
    f.build(
        "middle",
        DrawState {
            name: Some(name),
            ..DrawState::with_geometry(geometries[1])
        },
    );
    f.build("right", DrawState::with_geometry(geometries[2]));

    let hit = f.display.pick(&mut f.gl, 20, 20).unwrap().unwrap();
    assert_eq!(hit.object_id, "middle");
    assert_eq!(hit.name.as_deref(), Some("middle"));
    assert_eq!(hit.node_id.as_deref(), Some("node-7"));
    assert_eq!(hit.path.as_deref(), Some("root/middle"));
    assert_eq!(hit.canvas_pos, [20, 20]);

    let unnamed = f.display.pick(&mut f.gl, 30, 20).unwrap().unwrap();
    assert_eq!(unnamed.object_id, "right");
    assert_eq!(unnamed.name, None);

    assert_eq!(f.display.pick(&mut f.gl, 5, 50).unwrap(), None);
}

#[test]
fn test_pick_skips_unpickable() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let buffer = f.index_buffer(g1);
    f.gl.cover_canvas(buffer, 8, 8);
    let flags = f.insert(CoreData::Flags(FlagsCore {
        picking: false,
        ..FlagsCore::default()
    }));

    f.build(
        "ghost",
        DrawState {
            flags: Some(flags),
            ..DrawState::with_geometry(g1)
        },
    );

    assert_eq!(f.display.pick(&mut f.gl, 8, 8).unwrap(), None);
    assert_eq!(f.display.pick_list().object_count(), 0);
    assert_eq!(f.display.draw_list().object_count(), 1);
}

#[test]
fn test_pick_renders_stale_image_first() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    f.build("only", DrawState::with_geometry(g1));

    f.display.pick(&mut f.gl, 0, 0).unwrap();
    assert_eq!(f.display.stats().draw_calls, 1);
    // One draw for the colour pass, one for the pick pass
    assert_eq!(f.gl.draw_calls(), 2);

    f.display.pick(&mut f.gl, 0, 0).unwrap();
    assert_eq!(f.gl.draw_calls(), 3);
}

#[test]
fn test_removed_objects_are_recycled() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    for i in 0..4 {
        f.build(&format!("o{i}"), DrawState::with_geometry(g1));
    }

    let mut released = HashSet::new();
    for id in ["o1", "o2"] {
        released.insert(f.display.object(id).unwrap().instance_id());
        f.display.remove_object(&mut f.gl, id).unwrap();
    }
    assert_eq!(f.context.objects().unwrap().free_len(), 2);

    let mut reused = HashSet::new();
    for id in ["n0", "n1"] {
        f.build(id, DrawState::with_geometry(g1));
        reused.insert(f.display.object(id).unwrap().instance_id());
    }
    assert_eq!(reused, released);

    let objects = f.context.objects().unwrap();
    assert_eq!(objects.free_len(), 0);
    assert_eq!(objects.allocated(), 4);
}

#[test]
fn test_remove_unknown_object() {
    let mut f = Fixture::new();
    let err = f.display.remove_object(&mut f.gl, "missing").unwrap_err();
    assert!(matches!(err, RenderError::UnknownObject(id) if id == "missing"));
    assert_eq!(f.error_count(), 1);
}

#[test]
fn test_context_loss_aborts_frame_and_recovers() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    f.build("a", DrawState::with_geometry(g1));
    f.build("b", DrawState::with_geometry(g1));
    f.render();

    f.gl.lose_context_after_draws(1);
    let err = f
        .display
        .render(
            &mut f.gl,
            RenderParams {
                force: true,
                ..RenderParams::default()
            },
        )
        .unwrap_err();
    assert_eq!(err, RenderError::ContextLost);
    assert_eq!(f.error_count(), 0);

    // Still lost: nothing is attempted
    assert_eq!(f.display.render(&mut f.gl, RenderParams::default()), Err(RenderError::ContextLost));

    f.gl.restore_context();
    let stats = f.render();
    assert_eq!(stats.draw_calls, 2);
    assert_eq!(f.error_count(), 0);
}

#[test]
fn test_failed_program_is_reported_and_culled() {
    let mut f = Fixture::new();
    f.gl.fail_shaders_containing("broken_call");
    let g1 = f.geometry("g1");
    let broken = f.insert(CoreData::Shader(ShaderCore {
        fragment_code: Some("broken_call();".into()),
        ..ShaderCore::default()
    }));

    f.build("good", DrawState::with_geometry(g1));
    f.build(
        "bad",
        DrawState {
            shader: Some(broken),
            ..DrawState::with_geometry(g1)
        },
    );

    let err = f.display.render(&mut f.gl, RenderParams::default()).unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(f.error_count(), 1);

    let stats = f.render();
    assert_eq!(stats.draw_calls, 1);
    assert_eq!(f.error_count(), 1);

    let program = f.display.object("bad").unwrap().program().unwrap();
    assert!(f.display.programs().get(program).unwrap().is_failed());
}

#[test]
fn test_texture_units_wrap() {
    let gl = RecordingContext::new(64, 64).with_max_texture_units(2);
    let mut f = Fixture::with(gl, DisplayConfig::default());
    let g1 = f.geometry_with(
        "uv",
        GeometryArrays {
            uvs: vec![vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0]],
            ..triangle()
        },
    );
    let texture = f
        .context
        .cores()
        .unwrap()
        .get_or_create_core(&mut f.gl, CoreType::Texture, Some("stack"), |gl| {
            let mut layers: Vec<_> = (0..3).map(|_| TextureLayer::new(1, 1, vec![255; 4])).collect();
            // No second uv layer on the geometry, so this one is ignored
            layers.push(TextureLayer::new(1, 1, vec![0; 4]).with_uv_layer(1));
            Ok(CoreData::Texture(TextureCore::upload(gl, layers)?))
        })
        .unwrap();

    f.build(
        "textured",
        DrawState {
            texture: Some(texture),
            ..DrawState::with_geometry(g1)
        },
    );
    f.render();

    let units: Vec<u32> = f
        .gl
        .calls()
        .iter()
        .filter_map(|call| match call {
            GlCall::ActiveTexture(unit) => Some(*unit),
            _ => None,
        })
        .collect();
    assert_eq!(units, [0, 1, 0]);
}

#[test]
fn test_opaque_only_stops_before_transparent() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let glass = f.insert(CoreData::Flags(FlagsCore {
        transparent: true,
        ..FlagsCore::default()
    }));

    f.build(
        "glass",
        DrawState {
            flags: Some(glass),
            ..DrawState::with_geometry(g1)
        },
    );
    f.build("wall", DrawState::with_geometry(g1));

    let opaque = f
        .display
        .render(
            &mut f.gl,
            RenderParams {
                opaque_only: true,
                ..RenderParams::default()
            },
        )
        .unwrap();
    assert_eq!(f.display.draw_order(), ["wall", "glass"]);
    assert!(f.display.draw_list().transparent_index().is_some());
    assert_eq!(opaque.draw_calls, 1);
    assert_eq!(f.gl.enables(Capability::Blend), 0);

    // The image is still incomplete, so a plain render draws both
    let full = f.render();
    assert_eq!(full.draw_calls, 2);
    assert_eq!(f.gl.enables(Capability::Blend), 1);
}

#[test]
fn test_render_target_bin_draws_first() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let target = f
        .context
        .cores()
        .unwrap()
        .get_or_create_core(&mut f.gl, CoreType::RenderTarget, Some("mirror"), |gl| {
            Ok(CoreData::RenderTarget(RenderTargetCore::create(gl, 16, 16)?))
        })
        .unwrap();
    let framebuffer = f
        .context
        .cores()
        .unwrap()
        .get(target)
        .and_then(|core| core.data().as_render_target())
        .and_then(|target| target.framebuffer)
        .unwrap();

    f.build("main", DrawState::with_geometry(g1));
    f.build(
        "reflection",
        DrawState {
            render_target: Some(target),
            ..DrawState::with_geometry(g1)
        },
    );
    f.gl.clear_calls();
    let stats = f.render();
    assert_eq!(stats.draw_calls, 2);

    let calls = f.gl.calls();
    let position = |wanted: &dyn Fn(&GlCall) -> bool| calls.iter().position(|call| wanted(call)).unwrap();
    let bind = position(&|call: &GlCall| matches!(call, GlCall::BindFramebuffer(Some(fb)) if *fb == framebuffer));
    let unbind = position(&|call: &GlCall| matches!(call, GlCall::BindFramebuffer(None)));
    let draws: Vec<usize> = calls
        .iter()
        .enumerate()
        .filter(|(_, call)| matches!(call, GlCall::DrawElements { .. }))
        .map(|(i, _)| i)
        .collect();

    assert!(bind < draws[0]);
    assert!(draws[0] < unbind);
    assert!(unbind < draws[1]);
    assert!(calls[bind..draws[0]].contains(&GlCall::Viewport([0, 0, 16, 16])));

    // Drawables rendering into a target cannot be picked
    assert_eq!(f.display.pick_list().object_count(), 1);
}

#[test]
fn test_missing_geometry_is_rejected() {
    let mut f = Fixture::new();
    let err = f
        .display
        .build_object(&mut f.gl, "empty", DrawState::default())
        .unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)));
    assert_eq!(f.error_count(), 1);
    assert_eq!(f.display.object_count(), 0);
}

#[test]
fn test_core_of_wrong_type_is_rejected() {
    let mut f = Fixture::new();
    let flags = f.insert(CoreData::Flags(FlagsCore::default()));
    let err = f
        .display
        .build_object(&mut f.gl, "confused", DrawState::with_geometry(flags))
        .unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)));
    assert_eq!(f.display.programs().len(), 0);
    assert_eq!(f.display.chunks().len(), 0);
}

#[test]
fn test_unchanged_frame_is_not_redrawn() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let xform = f.insert(CoreData::Xform(XformCore::default()));
    f.build(
        "moving",
        DrawState {
            xform: Some(xform),
            ..DrawState::with_geometry(g1)
        },
    );

    let first = f.render();
    let second = f.render();
    assert_eq!(first, second);
    assert_eq!(f.gl.draw_calls(), 1);

    f.context
        .cores()
        .unwrap()
        .update(xform, |data| {
            if let CoreData::Xform(xform) = data {
                *xform = XformCore::new(Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)));
            }
        })
        .unwrap();
    f.render();
    assert_eq!(f.gl.draw_calls(), 2);

    f.display
        .render(
            &mut f.gl,
            RenderParams {
                force: true,
                ..RenderParams::default()
            },
        )
        .unwrap();
    assert_eq!(f.gl.draw_calls(), 3);
}

#[test]
fn test_disabled_drawables_are_culled() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let switch = f.insert(CoreData::Enable(EnableCore { enabled: false }));
    f.build(
        "hidden",
        DrawState {
            enable: Some(switch),
            ..DrawState::with_geometry(g1)
        },
    );

    assert_eq!(f.render().draw_calls, 0);

    f.context
        .cores()
        .unwrap()
        .update(switch, |data| {
            if let CoreData::Enable(enable) = data {
                enable.enabled = true;
            }
        })
        .unwrap();
    assert_eq!(f.render().draw_calls, 1);
}

#[test]
fn test_clear_color_follows_ambient_light() {
    let mut f = Fixture::new();
    let g1 = f.geometry_with(
        "lit",
        GeometryArrays {
            normals: Some(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
            ..triangle()
        },
    );
    let lights = f.insert(CoreData::Lights(LightsCore {
        lights: vec![Light::ambient([0.2, 0.3, 0.4])],
    }));
    f.build(
        "lit",
        DrawState {
            lights: Some(lights),
            ..DrawState::with_geometry(g1)
        },
    );
    f.render();
    assert!(f.gl.calls().contains(&GlCall::ClearColor([0.2, 0.3, 0.4, 1.0])));
}

#[test]
fn test_transparent_background_clears_to_zero() {
    let config = DisplayConfig {
        transparent_background: true,
        ..DisplayConfig::default()
    };
    let mut f = Fixture::with(RecordingContext::new(32, 32), config);
    let g1 = f.geometry("g1");
    f.build("a", DrawState::with_geometry(g1));
    f.render();
    assert!(f.gl.calls().contains(&GlCall::ClearColor([0.0; 4])));
}

#[test]
fn test_destroy_releases_everything() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    f.build("a", DrawState::with_geometry(g1));
    f.build("b", DrawState::with_geometry(g1));
    f.display.pick(&mut f.gl, 1, 1).unwrap();
    assert!(f.gl.live_programs() > 0);

    let Fixture {
        mut gl,
        context,
        display,
        ..
    } = f;
    display.destroy(&mut gl).unwrap();

    assert_eq!(gl.live_programs(), 0);
    let cores = context.cores().unwrap();
    // Only the geometry created by the caller remains
    assert_eq!(cores.len(), 1);
    assert!(cores.has_core(CoreType::Geometry, "g1"));
}

#[test]
fn test_light_update_switches_program() {
    let mut f = Fixture::new();
    let g1 = f.geometry_with(
        "lit",
        GeometryArrays {
            normals: Some(vec![0.0, 0.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 1.0]),
            ..triangle()
        },
    );
    let lights = f.insert(CoreData::Lights(LightsCore {
        lights: vec![Light::ambient([0.1, 0.1, 0.1])],
    }));
    f.build(
        "a",
        DrawState {
            lights: Some(lights),
            ..DrawState::with_geometry(g1)
        },
    );
    f.render();
    let before = f.display.object("a").unwrap().program().unwrap();
    assert_eq!(f.display.programs().get(before).unwrap().states().lights.len(), 1);

    f.context
        .cores()
        .unwrap()
        .update(lights, |data| {
            if let CoreData::Lights(lights) = data {
                lights
                    .lights
                    .push(Light::directional([0.5, 0.6, 0.7], [0.0, 0.0, -1.0], LightSpace::View));
            }
        })
        .unwrap();
    let stats = f.render();
    assert_eq!(stats.draw_calls, 1);

    let after = f.display.object("a").unwrap().program().unwrap();
    assert_ne!(after, before);
    let program = f.display.programs().get(after).unwrap();
    assert_eq!(program.states().lights.len(), 2);
    assert!(program.is_compiled());
    // The old program had no other users
    assert!(f.display.programs().get(before).is_none());
    assert_eq!(f.display.programs().len(), 1);

    let handle = program.handle(Pass::Color).unwrap();
    assert_eq!(f.gl.uniform_value(handle, "u_lightColor1"), Some(&[0.5, 0.6, 0.7][..]));
}

#[test]
fn test_unrelated_update_keeps_program() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let xform = f.insert(CoreData::Xform(XformCore::default()));
    f.build(
        "a",
        DrawState {
            xform: Some(xform),
            ..DrawState::with_geometry(g1)
        },
    );
    f.render();
    let before = f.display.object("a").unwrap().program();
    let chunks = f.display.chunks().len();

    f.context
        .cores()
        .unwrap()
        .update(xform, |data| {
            if let CoreData::Xform(xform) = data {
                *xform = XformCore::new(Mat4::new_translation(&Vec3::new(0.0, 2.0, 0.0)));
            }
        })
        .unwrap();
    f.render();

    assert_eq!(f.display.object("a").unwrap().program(), before);
    assert_eq!(f.display.chunks().len(), chunks);
    assert_eq!(f.gl.shader_compiles(), 4);
}

/// Whether blending was on when the `n`th draw call was issued
fn blend_at_draw(gl: &RecordingContext, n: usize) -> Option<bool> {
    let mut blend = None;
    let mut draws = 0;
    for call in gl.calls() {
        match call {
            GlCall::Enable(Capability::Blend) => blend = Some(true),
            GlCall::Disable(Capability::Blend) => blend = Some(false),
            GlCall::DrawElements { .. } => {
                if draws == n {
                    return blend;
                }
                draws += 1;
            }
            _ => {}
        }
    }
    None
}

#[test]
fn test_blend_restored_after_transparent_bin() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let blend_on = f.insert(blend(true));
    let glass_flags = f.insert(CoreData::Flags(FlagsCore {
        transparent: true,
        ..FlagsCore::default()
    }));
    let front = f.insert(CoreData::Stage(StageCore {
        priority: 0,
        ..StageCore::default()
    }));
    let back = f.insert(CoreData::Stage(StageCore {
        priority: 1,
        ..StageCore::default()
    }));

    f.build(
        "glass",
        DrawState {
            flags: Some(glass_flags),
            stage: Some(front),
            color_buffer: Some(blend_on),
            ..DrawState::with_geometry(g1)
        },
    );
    f.build(
        "wall",
        DrawState {
            stage: Some(back),
            color_buffer: Some(blend_on),
            ..DrawState::with_geometry(g1)
        },
    );
    f.gl.clear_calls();
    f.render();

    assert_eq!(f.display.draw_order(), ["glass", "wall"]);
    assert_eq!(blend_at_draw(&f.gl, 0), Some(true));
    assert_eq!(blend_at_draw(&f.gl, 1), Some(true));
}

#[test]
fn test_viewport_restored_after_target_bin() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let target = f
        .context
        .cores()
        .unwrap()
        .get_or_create_core(&mut f.gl, CoreType::RenderTarget, Some("inset"), |gl| {
            Ok(CoreData::RenderTarget(RenderTargetCore::create(gl, 16, 16)?))
        })
        .unwrap();
    let inset = f.insert(CoreData::Renderer(RendererCore {
        viewport: Some([2, 2, 8, 8]),
        ..RendererCore::default()
    }));

    f.build(
        "offscreen",
        DrawState {
            render_target: Some(target),
            renderer: Some(inset),
            ..DrawState::with_geometry(g1)
        },
    );
    f.build(
        "onscreen",
        DrawState {
            renderer: Some(inset),
            ..DrawState::with_geometry(g1)
        },
    );
    f.gl.clear_calls();
    f.render();

    let calls = f.gl.calls();
    let unbind = calls
        .iter()
        .position(|call| matches!(call, GlCall::BindFramebuffer(None)))
        .unwrap();
    let last_draw = calls
        .iter()
        .rposition(|call| matches!(call, GlCall::DrawElements { .. }))
        .unwrap();
    let viewport = calls[unbind..last_draw]
        .iter()
        .rev()
        .find_map(|call| match call {
            GlCall::Viewport(viewport) => Some(*viewport),
            _ => None,
        });
    assert_eq!(viewport, Some([2, 2, 8, 8]));
}

#[test]
fn test_pool_policy_comes_from_context() {
    let context = RendererContext::new(&DisplayConfig::default());
    let config = DisplayConfig::new().with_pooling(PoolingPolicy::Disabled);
    let mut display = Display::new(Arc::clone(&context), config).unwrap();
    let mut gl = RecordingContext::new(8, 8);
    let g1 = context
        .cores()
        .unwrap()
        .get_or_create_core(&mut gl, CoreType::Geometry, Some("g1"), |gl| {
            Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, triangle())?))
        })
        .unwrap();

    display.build_object(&mut gl, "a", DrawState::with_geometry(g1)).unwrap();
    display.remove_object(&mut gl, "a").unwrap();

    let objects = context.objects().unwrap();
    assert_eq!(objects.policy(), PoolingPolicy::Recycle);
    assert_eq!(objects.free_len(), 1);
}

#[test]
fn test_camera_projection_set_in_both_passes() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let camera = CameraCore::orthographic(-2.0, 2.0, -1.0, 1.0, 0.1, 10.0);
    let expected = mat4_to_array(&camera.matrix);
    let key = f.insert(CoreData::Camera(camera));
    f.build(
        "a",
        DrawState {
            camera: Some(key),
            ..DrawState::with_geometry(g1)
        },
    );
    f.render();
    f.display.pick(&mut f.gl, 0, 0).unwrap();

    let program = f.display.object("a").unwrap().program().unwrap();
    let program = f.display.programs().get(program).unwrap();
    for pass in [Pass::Color, Pass::Pick] {
        let handle = program.handle(pass).unwrap();
        assert_eq!(f.gl.uniform_value(handle, "u_projMatrix"), Some(&expected[..]));
    }
}

fn morph_core(f: &mut Fixture, id: &str, vertices: usize, factor: f32) -> CoreKey {
    let targets = (0..2)
        .map(|i| MorphTargetArrays {
            positions: Some(vec![i as f32; vertices * 3]),
            normals: None,
        })
        .collect();
    f.context
        .cores()
        .unwrap()
        .get_or_create_core(&mut f.gl, CoreType::MorphGeometry, Some(id), |gl| {
            Ok(CoreData::MorphGeometry(MorphGeometryCore::upload(gl, vec![0.0, 1.0], targets, factor)?))
        })
        .unwrap()
}

#[test]
fn test_morph_factor_reaches_program() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let morph = morph_core(&mut f, "wave", 3, 0.25);
    f.build(
        "a",
        DrawState {
            morph_geometry: Some(morph),
            ..DrawState::with_geometry(g1)
        },
    );
    assert_eq!(f.render().draw_calls, 1);

    let program = f.display.object("a").unwrap().program().unwrap();
    let program = f.display.programs().get(program).unwrap();
    assert!(program.states().morph);
    let handle = program.handle(Pass::Color).unwrap();
    assert_eq!(f.gl.uniform_value(handle, "u_morphFactor"), Some(&[0.25][..]));

    f.context
        .cores()
        .unwrap()
        .update(morph, |data| {
            if let CoreData::MorphGeometry(morph) = data {
                morph.set_factor(0.75);
            }
        })
        .unwrap();
    f.render();
    assert_eq!(f.gl.uniform_value(handle, "u_morphFactor"), Some(&[0.75][..]));
}

#[test]
fn test_shared_morph_rebinds_after_geometry_change() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let g2 = f.geometry("g2");
    let morph = morph_core(&mut f, "wave", 3, 0.5);
    for (id, geometry) in [("a", g1), ("b", g2)] {
        f.build(
            id,
            DrawState {
                morph_geometry: Some(morph),
                ..DrawState::with_geometry(geometry)
            },
        );
    }
    let lower = {
        let cores = f.context.cores().unwrap();
        cores.get(morph).unwrap().data().as_morph_geometry().unwrap().buffers[0].positions
    };

    f.gl.clear_calls();
    assert_eq!(f.render().draw_calls, 2);
    let binds = f
        .gl
        .calls()
        .iter()
        .filter(|call| **call == GlCall::BindBuffer(BufferTarget::Array, Some(lower)))
        .count();
    assert_eq!(binds, 2);
}

#[test]
fn test_morph_vertex_count_must_match_geometry() {
    let mut f = Fixture::new();
    let g1 = f.geometry("g1");
    let morph = morph_core(&mut f, "wide", 4, 0.0);
    let err = f
        .display
        .build_object(
            &mut f.gl,
            "a",
            DrawState {
                morph_geometry: Some(morph),
                ..DrawState::with_geometry(g1)
            },
        )
        .unwrap_err();
    assert!(matches!(err, RenderError::Configuration(_)));
    assert!(f.display.object("a").is_none());
}
