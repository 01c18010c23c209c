//! Integration tests for the display pipeline
//!
//! Everything runs against a [`RecordingContext`], so the tests check the
//! GL call stream and simulated pixels rather than images.

mod display_pipeline;

use std::sync::{Arc, Mutex};

use crate::core::config::DisplayConfig;
use crate::render::cores::{CoreData, CoreKey, CoreType, GeometryArrays, GeometryCore};
use crate::render::display::{Display, DrawState, FrameStats, RenderParams};
use crate::render::gl::{GlBuffer, Primitive, RecordingContext};
use crate::render::{RenderError, RendererContext};

/// A display with its context and a recording GL backend
pub(super) struct Fixture {
    pub gl: RecordingContext,
    pub context: Arc<RendererContext>,
    pub display: Display,
    pub errors: Arc<Mutex<Vec<String>>>,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with(RecordingContext::new(64, 64), DisplayConfig::default())
    }

    pub fn with(gl: RecordingContext, config: DisplayConfig) -> Self {
        let context = RendererContext::new(&config);
        let mut display = Display::new(Arc::clone(&context), config).unwrap();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        display.on_error(move |err: &RenderError| sink.lock().unwrap().push(err.to_string()));
        Self {
            gl,
            context,
            display,
            errors,
        }
    }

    /// Upload a named one-triangle geometry
    pub fn geometry(&mut self, id: &str) -> CoreKey {
        self.geometry_with(id, triangle())
    }

    pub fn geometry_with(&mut self, id: &str, arrays: GeometryArrays) -> CoreKey {
        self.context
            .cores()
            .unwrap()
            .get_or_create_core(&mut self.gl, CoreType::Geometry, Some(id), |gl| {
                Ok(CoreData::Geometry(GeometryCore::upload(gl, Primitive::Triangles, arrays)?))
            })
            .unwrap()
    }

    /// Register a private core with no GPU resources
    pub fn insert(&mut self, data: CoreData) -> CoreKey {
        self.context.cores().unwrap().get_or_insert_core(None, data)
    }

    /// Index buffer a geometry core was uploaded to
    pub fn index_buffer(&self, geometry: CoreKey) -> GlBuffer {
        let cores = self.context.cores().unwrap();
        let core = cores.get(geometry).unwrap();
        core.data().as_geometry().unwrap().buffers.as_ref().unwrap().indices
    }

    pub fn build(&mut self, id: &str, state: DrawState) {
        self.display.build_object(&mut self.gl, id, state).unwrap();
    }

    pub fn render(&mut self) -> FrameStats {
        self.display.render(&mut self.gl, RenderParams::default()).unwrap()
    }

    pub fn error_count(&self) -> usize {
        self.errors.lock().unwrap().len()
    }
}

pub(super) fn triangle() -> GeometryArrays {
    GeometryArrays {
        positions: vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0],
        indices: vec![0, 1, 2],
        ..GeometryArrays::default()
    }
}
