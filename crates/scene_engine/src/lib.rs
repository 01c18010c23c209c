//! # Scene Engine
//!
//! The display core of a declarative scene-graph renderer.
//!
//! ## Features
//!
//! - **Shared Cores**: render state is reference-counted and shared by id
//! - **State Sorting**: drawables ordered by stage, transparency, layer, program, texture and geometry
//! - **State Diffing**: chunks skip GL calls whose state is already current
//! - **Colour Picking**: a pick pass encodes drawable indices into colours
//! - **Object Pooling**: drawables are recycled instead of reallocated
//! - **Headless**: `RecordingContext` runs the full pipeline without a GPU
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use scene_engine::prelude::*;
//!
//! fn main() -> Result<(), RenderError> {
//!     let config = DisplayConfig::default();
//!     let context = RendererContext::new(&config);
//!     let mut gl = RecordingContext::new(640, 480);
//!     let mut display = Display::new(context.clone(), config)?;
//!
//!     let geometry = context.cores()?.get_or_create_core(&mut gl, CoreType::Geometry, Some("tri"), |gl| {
//!         let arrays = GeometryArrays {
//!             positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
//!             indices: vec![0, 1, 2],
//!             ..GeometryArrays::default()
//!         };
//!         Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, arrays)?))
//!     })?;
//!
//!     display.build_object(&mut gl, "triangle", DrawState::with_geometry(geometry))?;
//!     let stats = display.render(&mut gl, RenderParams::default())?;
//!     println!("{} draw calls", stats.draw_calls);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, DisplayConfig, EngineConfig, PoolingPolicy},
        foundation::math::{Mat4, Point3, Vec3},
        render::{
            cores::{
                CameraCore, ColorBufferCore, CoreData, CoreKey, CoreRegistry, CoreType, FlagsCore,
                GeometryArrays, GeometryCore, Light, LightsCore, LookAtCore, MaterialCore, NameCore,
                ShaderCore, TextureCore, TextureLayer, XformCore,
            },
            display::{Display, DrawState, FrameStats, PickHit, RenderParams},
            gl::{GlContext, Primitive, RecordingContext},
            RenderError, RenderResult, RendererContext,
        },
    };
}
