//! # Rendering System
//!
//! The display core of the scene engine. Scene traversal hands the display
//! a set of drawables, each described by the cores it uses; the display
//! turns them into a sorted list of state chunks and executes it against a
//! [`GlContext`](gl::GlContext).
//!
//! ## Architecture
//!
//! - **Cores** (`cores`): shared, reference-counted render state
//! - **Programs** (`program`): generated shaders, shared by state hash
//! - **Chunks** (`chunks`): one slice of GL state bound to a core and program
//! - **Display** (`display`): sorting, draw-list building, colour and pick passes
//! - **Context** (`context`): registries shared by every display of a renderer
//!
//! ## Design Goals
//!
//! - **Minimal state changes**: sort by cost, skip chunks the previous drawable applied,
//!   diff the rest against a per-pass frame cache
//! - **Backend agnostic**: everything goes through `GlContext`; `RecordingContext`
//!   runs the whole pipeline headless

// Graphics context boundary
pub mod gl;

// State
pub mod cores;
pub mod program;
pub mod chunks;

// Drawing
pub mod context;
pub mod display;

mod error;

#[cfg(test)]
mod tests;

pub use context::RendererContext;
pub use display::{Display, DrawState, FrameStats, PickHit, RenderParams};
pub use error::{RenderError, RenderResult};
