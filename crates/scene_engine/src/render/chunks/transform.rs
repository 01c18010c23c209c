//! Matrix chunks: model, view and projection

use super::{BuildContext, ChunkBehavior, DrawContext, PassLocations};
use crate::foundation::math::{mat4_to_array, Mat4};
use crate::render::cores::CoreData;
use crate::render::gl::{GlContext, UniformLocation};
use crate::render::program::source::{
    U_MODEL_MATRIX, U_MODEL_NORMAL_MATRIX, U_PROJ_MATRIX, U_VIEW_MATRIX, U_VIEW_NORMAL_MATRIX, U_WORLD_EYE,
};
use crate::render::RenderResult;

fn set_matrix(gl: &mut dyn GlContext, location: Option<UniformLocation>, matrix: &Mat4) {
    if let Some(location) = location {
        gl.uniform_matrix_4f(location, &mat4_to_array(matrix));
    }
}

/// Model matrix and its normal matrix
#[derive(Debug, Default)]
pub(super) struct XformChunk {
    matrix: PassLocations<UniformLocation>,
    normal_matrix: PassLocations<UniformLocation>,
}

impl XformChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for XformChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        self.matrix = cx.uniform(U_MODEL_MATRIX);
        self.normal_matrix = cx.uniform(U_MODEL_NORMAL_MATRIX);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let xform = cx.core_as(CoreData::as_xform)?;
        let pass = cx.pass();
        set_matrix(cx.gl, self.matrix.get(pass), &xform.matrix);
        set_matrix(cx.gl, self.normal_matrix.get(pass), &xform.normal_matrix);
        Ok(())
    }
}

/// View matrix, its normal matrix and the eye position
#[derive(Debug, Default)]
pub(super) struct LookAtChunk {
    matrix: PassLocations<UniformLocation>,
    normal_matrix: PassLocations<UniformLocation>,
    eye: PassLocations<UniformLocation>,
}

impl LookAtChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for LookAtChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        self.matrix = cx.uniform(U_VIEW_MATRIX);
        self.normal_matrix = cx.uniform(U_VIEW_NORMAL_MATRIX);
        self.eye = cx.uniform(U_WORLD_EYE);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let look_at = cx.core_as(CoreData::as_look_at)?;
        let pass = cx.pass();
        set_matrix(cx.gl, self.matrix.get(pass), &look_at.matrix);
        set_matrix(cx.gl, self.normal_matrix.get(pass), &look_at.normal_matrix);
        if let Some(location) = self.eye.get(pass) {
            cx.gl.uniform_3f(location, [look_at.eye.x, look_at.eye.y, look_at.eye.z]);
        }
        Ok(())
    }
}

/// Projection matrix
#[derive(Debug, Default)]
pub(super) struct CameraChunk {
    matrix: PassLocations<UniformLocation>,
}

impl CameraChunk {
    pub(super) fn boxed() -> Box<dyn ChunkBehavior> {
        Box::<Self>::default()
    }
}

impl ChunkBehavior for CameraChunk {
    fn build(&mut self, cx: &mut BuildContext<'_>) -> RenderResult<()> {
        self.matrix = cx.uniform(U_PROJ_MATRIX);
        Ok(())
    }

    fn draw(&self, cx: &mut DrawContext<'_>) -> RenderResult<()> {
        let camera = cx.core_as(CoreData::as_camera)?;
        let pass = cx.pass();
        set_matrix(cx.gl, self.matrix.get(pass), &camera.matrix);
        Ok(())
    }
}
